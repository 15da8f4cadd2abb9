//! Path and Namespace Service
//!
//! Every artifact the pipeline produces has exactly one path, derived from
//! its kind and a set of facets (time, integration window, forecast target,
//! model, member, ...). The functions here are pure: equal facets always
//! produce equal strings.
//!
//! # Structure
//!
//! - [`vardef`]: `FILE::VAR` references into multi-variable files
//! - [`workspace`]: the [`Workspace`] path generator and its [`Facets`]

pub mod vardef;
pub mod workspace;

use std::fmt;

use serde::{Deserialize, Serialize};

pub use vardef::{read_vars, strip_qualifier, Vardef};
pub use workspace::{Facets, Workspace};

/// Spatial unit results are expressed over.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
#[serde(rename_all = "snake_case")]
pub enum Basis {
    #[default]
    Pixel,
    Basin,
    Country,
    Province,
    PowerPlant,
}

impl Basis {
    /// Filename and directory prefix; pixels carry none.
    pub fn prefix(&self) -> Option<&'static str> {
        match self {
            Self::Pixel => None,
            Self::Basin => Some("basin"),
            Self::Country => Some("country"),
            Self::Province => Some("province"),
            Self::PowerPlant => Some("power_plant"),
        }
    }
}

/// Analytical sector with its own output tree.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum Sector {
    ElectricPower,
    Agriculture,
}

impl Sector {
    pub fn name(&self) -> &'static str {
        match self {
            Self::ElectricPower => "electric_power",
            Self::Agriculture => "agriculture",
        }
    }
}

impl fmt::Display for Sector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Crop cultivation method.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum Method {
    Irrigated,
    Rainfed,
}

impl Method {
    pub const ALL: [Method; 2] = [Method::Irrigated, Method::Rainfed];

    pub fn name(&self) -> &'static str {
        match self {
            Self::Irrigated => "irrigated",
            Self::Rainfed => "rainfed",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basis_prefix() {
        assert_eq!(Basis::Pixel.prefix(), None);
        assert_eq!(Basis::PowerPlant.prefix(), Some("power_plant"));
    }

    #[test]
    fn test_sector_and_method_names() {
        assert_eq!(Sector::ElectricPower.to_string(), "electric_power");
        assert_eq!(Method::Rainfed.to_string(), "rainfed");
    }

    #[test]
    fn test_sector_deserializes_snake_case() {
        let s: Sector = serde_yaml::from_str("agriculture").unwrap();
        assert_eq!(s, Sector::Agriculture);
    }
}
