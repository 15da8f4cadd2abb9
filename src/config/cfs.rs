//! CPC observations driving the LSM, with CFSv2 forecasts.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::paths::Workspace;
use crate::sources::{
    AgricultureData, AgricultureStatic, Cfsv2, Cpc, DefaultStatic, ElectricityData,
    ElectricityStatic, ForecastForcing, ObservedForcing, StaticData,
};

use super::{CompositeVar, Config, Options};

const HISTORICAL_YEARS: (i32, i32) = (1948, 2016);
const FIT_YEARS: (i32, i32) = (1950, 2009);

pub struct CfsConfig {
    options: Options,
    historical_years: (i32, i32),
    fit_years: (i32, i32),
    workspace: Workspace,
    observed: Arc<Cpc>,
    cfsv2: Cfsv2,
    statics: DefaultStatic,
    electricity: ElectricityData,
    agriculture: AgricultureData,
}

impl CfsConfig {
    pub fn new(source: &str, derived: &str, options: Options) -> Result<Self> {
        let (historical_years, fit_years) = options.resolve_years(HISTORICAL_YEARS, FIT_YEARS)?;
        let workspace =
            Workspace::new(derived).with_distribution(&options.distribution, fit_years.0, fit_years.1);

        let observed = Arc::new(Cpc::new(source));
        let cfsv2 = Cfsv2::new(source, observed.clone());

        if let Some(models) = &options.models {
            if let Some(unknown) = models.iter().find(|m| m.as_str() != cfsv2.name()) {
                return Err(Error::Config(format!(
                    "unknown forecast model '{}'",
                    unknown
                )));
            }
        }

        Ok(Self {
            options,
            historical_years,
            fit_years,
            workspace,
            observed,
            cfsv2,
            statics: DefaultStatic::new(source),
            electricity: ElectricityData::new(source),
            agriculture: AgricultureData::new(source),
        })
    }

    pub(crate) fn boxed(source: &str, derived: &str, options: Options) -> Result<Box<dyn Config>> {
        Ok(Box::new(Self::new(source, derived, options)?))
    }
}

impl Config for CfsConfig {
    fn name(&self) -> &str {
        "cfs"
    }

    fn options(&self) -> &Options {
        &self.options
    }

    fn workspace(&self) -> &Workspace {
        &self.workspace
    }

    fn observed(&self) -> &dyn ObservedForcing {
        self.observed.as_ref()
    }

    fn forecasts(&self) -> Vec<&dyn ForecastForcing> {
        vec![&self.cfsv2]
    }

    fn static_data(&self) -> &dyn StaticData {
        &self.statics
    }

    fn electricity_data(&self) -> Option<&dyn ElectricityStatic> {
        Some(&self.electricity)
    }

    fn agriculture_data(&self) -> Option<&dyn AgricultureStatic> {
        Some(&self.agriculture)
    }

    fn historical_years(&self) -> (i32, i32) {
        self.historical_years
    }

    fn fit_years(&self) -> (i32, i32) {
        self.fit_years
    }

    fn lsm_rp_base_vars(&self) -> Vec<&'static str> {
        vec!["Bt_RO", "Bt_Runoff", "EmPET", "PETmE", "P_net", "RO_m3", "RO_mm", "Ws"]
    }

    fn state_rp_base_vars(&self) -> Vec<&'static str> {
        vec!["Snowpack"]
    }

    fn lsm_integrated_stats(&self) -> BTreeMap<&'static str, Vec<&'static str>> {
        BTreeMap::from([
            ("Bt_RO", vec!["min", "max", "sum"]),
            ("Bt_Runoff", vec!["sum"]),
            ("E", vec!["sum"]),
            ("EmPET", vec!["sum"]),
            ("P_net", vec!["sum"]),
            ("PETmE", vec!["sum"]),
            ("PET", vec!["sum"]),
            ("RO_m3", vec!["sum"]),
            ("RO_mm", vec!["sum"]),
            ("Ws", vec!["ave"]),
        ])
    }

    fn composite_surplus_base_vars(&self) -> Vec<CompositeVar> {
        vec![CompositeVar::plain("Bt_RO"), CompositeVar::plain("RO_mm")]
    }

    fn composite_deficit_base_vars(&self) -> Vec<CompositeVar> {
        vec![
            CompositeVar::negated("PETmE"),
            CompositeVar::plain("Ws"),
            CompositeVar::plain("Bt_RO"),
        ]
    }

    fn should_run_lsm(&self, _yearmon: &str) -> bool {
        true
    }
}
