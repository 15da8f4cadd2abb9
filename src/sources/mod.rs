//! Data-Source Abstractions
//!
//! Capabilities the phase builders need from input datasets, expressed as
//! traits so that configurations can combine any observed dataset with any
//! forecast system and static layer set.
//!
//! # Structure
//!
//! - [`cpc`]: GHCN+CAMS temperature and PREC/L precipitation observations
//! - [`fldas`]: FLDAS monthly land-surface outputs
//! - [`cfsv2`]: NCEP CFSv2 lagged-ensemble forecasts
//! - [`static_layers`]: soil, terrain, boundary and sector layers

pub mod cfsv2;
pub mod cpc;
pub mod fldas;
pub mod static_layers;

use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::grid::Grid;
use crate::paths::{Method, Vardef};
use crate::workflow::Step;

pub use cfsv2::Cfsv2;
pub use cpc::Cpc;
pub use fldas::Fldas;
pub use static_layers::{AgricultureData, DefaultStatic, ElectricityData};

/// Observed monthly climate inputs.
///
/// Path-returning methods accept range expressions in place of a yearmon.
pub trait ObservedForcing {
    fn name(&self) -> &str;

    fn grid(&self) -> &Grid;

    /// Monthly precipitation total, mm.
    fn precip_monthly(&self, yearmon: &str) -> Vardef;

    /// Monthly mean temperature, degrees C.
    fn temp_monthly(&self, yearmon: &str) -> Vardef;

    /// Fraction of days with precipitation. `None` for datasets that do not
    /// drive the land-surface model.
    fn p_wetdays(&self, yearmon: &str) -> Result<Option<Vardef>>;

    /// Long-term mean wet-day fraction for a calendar month.
    fn mean_p_wetdays(&self, month: u32) -> Option<Vardef>;

    /// Fetch and convert the inputs of one timestep.
    fn prep_steps(&self, yearmon: &str) -> Result<Vec<Step>>;

    /// Preparation done once per build.
    fn global_prep_steps(&self) -> Result<Vec<Step>>;
}

/// One forecast system.
pub trait ForecastForcing {
    fn name(&self) -> &str;

    /// Observed dataset the forecasts are corrected against.
    fn observed(&self) -> &dyn ObservedForcing;

    /// Every ensemble member issued for `yearmon`, oldest first.
    fn ensemble_members(&self, yearmon: &str) -> Result<Vec<String>>;

    /// Issue time of a member, as `YYYYMMDDHH`.
    fn member_issue_time(&self, member: &str) -> Result<chrono::NaiveDateTime>;

    /// Target yearmons predicted by a forecast issued at `yearmon`.
    fn targets(&self, yearmon: &str) -> Result<Vec<String>>;

    /// Variables produced by bias correction.
    fn forcing_vars(&self) -> &[&'static str];

    /// Distribution of observations for a calendar month.
    fn fit_obs(&self, var: &str, month: u32) -> String;

    /// Distribution of retrospective forecasts for a target month and lead.
    fn fit_retro(&self, var: &str, target_month: u32, lead_months: u32) -> String;

    /// One variable of a member's raw forecast, converted to observed units.
    fn raw(&self, target: &str, member: &str, var: &str) -> Result<Vardef>;

    /// Bias-corrected forecast of a member.
    fn corrected(&self, target: &str, member: &str) -> String;

    fn prep_steps(&self, yearmon: &str, target: &str, member: &str) -> Result<Vec<Step>>;

    fn global_prep_steps(&self) -> Result<Vec<Step>>;

    fn requires_bias_correction(&self) -> bool {
        true
    }
}

/// A polygon layer and the attribute identifying its features.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolygonLayer {
    pub file: String,
    pub id_field: String,
}

/// Layers every configuration needs.
pub trait StaticData {
    fn wc(&self) -> Vardef;
    fn flowdir(&self) -> Vardef;
    fn elevation(&self) -> Vardef;
    fn countries(&self) -> PolygonLayer;
    fn provinces(&self) -> PolygonLayer;
    /// Population count raster on the model grid.
    fn population_density(&self) -> String;
    fn global_prep_steps(&self) -> Result<Vec<Step>>;
}

/// Layers used by the electric power overlay.
pub trait ElectricityStatic {
    fn basins(&self) -> PolygonLayer;
    /// Table of downstream basin ids.
    fn basin_downstream_ids(&self) -> String;
    fn dams(&self) -> String;
    fn water_stress(&self) -> String;
    fn power_plants(&self) -> String;
    fn global_prep_steps(&self) -> Result<Vec<Step>>;
}

/// Layers used by the agriculture overlay.
pub trait AgricultureStatic {
    fn crop_calendar(&self, method: Method) -> String;
    fn production(&self, method: Method) -> String;
    fn yield_model(&self, crop: Crop) -> String;
    fn global_prep_steps(&self) -> Result<Vec<Step>>;
}

/// Crops with a yield-anomaly model.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum Crop {
    SpringWheat,
    WinterWheat,
    Maize,
    Rice,
    Soybeans,
    Potatoes,
}

impl Crop {
    pub const ALL: [Crop; 6] = [
        Crop::SpringWheat,
        Crop::WinterWheat,
        Crop::Maize,
        Crop::Rice,
        Crop::Soybeans,
        Crop::Potatoes,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Self::SpringWheat => "spring_wheat",
            Self::WinterWheat => "winter_wheat",
            Self::Maize => "maize",
            Self::Rice => "rice",
            Self::Soybeans => "soybeans",
            Self::Potatoes => "potatoes",
        }
    }
}

impl fmt::Display for Crop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

pub(crate) fn join(dir: &str, name: &str) -> String {
    Path::new(dir).join(name).to_string_lossy().into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_crop_names() {
        let names: Vec<&str> = Crop::ALL.iter().map(|c| c.name()).collect();
        assert_eq!(
            names,
            vec!["spring_wheat", "winter_wheat", "maize", "rice", "soybeans", "potatoes"]
        );
    }
}
