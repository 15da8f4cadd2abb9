//! Sector Overlays
//!
//! Additional products built on top of the hydrological results for the
//! sectors a configuration enables.
//!
//! # Structure
//!
//! - [`electricity`]: basin flows, loss factors and power plant losses
//! - [`agriculture`]: crop yield anomalies per cultivation method

pub mod agriculture;
pub mod electricity;

use log::info;

use crate::config::Config;
use crate::error::Result;
use crate::paths::Sector;
use crate::phases::actions::EnsembleMembers;
use crate::workflow::{MetaStepRegistry, Step};

pub use agriculture::agriculture_steps;
pub use electricity::{electricity_forecast, electricity_observed, electricity_spinup};

/// Spinup steps of every enabled sector.
pub fn sector_spinup(config: &dyn Config) -> Result<Vec<Step>> {
    let mut steps = Vec::new();
    for sector in config.sectors() {
        match sector {
            Sector::ElectricPower => steps.extend(electricity_spinup(config)?),
            Sector::Agriculture => {}
        }
    }
    Ok(steps)
}

/// Per-timestep steps of every enabled sector. `ensembles` holds the
/// forecast members used at `yearmon`, if forecasts are planned.
pub fn sector_monthly(
    config: &dyn Config,
    yearmon: &str,
    meta: &mut MetaStepRegistry,
    ensembles: Option<&EnsembleMembers>,
) -> Result<Vec<Step>> {
    let mut steps = Vec::new();
    for sector in config.sectors() {
        info!("Generating {} steps for {}", sector, yearmon);
        match sector {
            Sector::ElectricPower => {
                steps.extend(electricity_observed(config, yearmon, meta)?);
                if let Some(ensembles) = ensembles {
                    steps.extend(electricity_forecast(config, yearmon, meta, ensembles)?);
                }
            }
            Sector::Agriculture => {
                steps.extend(agriculture_steps(config, yearmon, meta, ensembles.is_some())?);
            }
        }
    }
    Ok(steps)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CfsConfig, Options};

    #[test]
    fn test_no_sectors_no_steps() {
        let config = CfsConfig::new("/src", "/out", Options::default()).unwrap();
        let mut meta = MetaStepRegistry::new();
        assert!(sector_spinup(&config).unwrap().is_empty());
        assert!(sector_monthly(&config, "201701", &mut meta, None)
            .unwrap()
            .is_empty());
        assert!(meta.is_empty());
    }

    #[test]
    fn test_enabled_sectors_register_collectors() {
        let options = Options {
            sectors: vec![Sector::ElectricPower, Sector::Agriculture],
            ..Options::default()
        };
        let config = CfsConfig::new("/src", "/out", options).unwrap();
        let mut meta = MetaStepRegistry::new();
        sector_monthly(&config, "201701", &mut meta, None).unwrap();
        assert_eq!(
            meta.names().collect::<Vec<_>>(),
            vec!["agriculture", "electric_power"]
        );
    }
}
