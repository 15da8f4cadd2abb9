//! FLDAS land-surface outputs used directly as monthly results.
//!
//! No model run is needed: results are extracted from the converted FLDAS
//! files, so the spinup reduces to integration and fitting. No forecasts.

use std::collections::BTreeMap;

use crate::commands::wsim_merge;
use crate::error::Result;
use crate::paths::{read_vars, Facets, Workspace};
use crate::sources::fldas::RESULT_VARS;
use crate::sources::{DefaultStatic, Fldas, ObservedForcing, StaticData};
use crate::workflow::Step;

use super::{CompositeVar, Config, Options};

const HISTORICAL_YEARS: (i32, i32) = (1982, 2016);
const FIT_YEARS: (i32, i32) = (1982, 2016);

pub struct FldasConfig {
    options: Options,
    historical_years: (i32, i32),
    fit_years: (i32, i32),
    workspace: Workspace,
    observed: Fldas,
    statics: DefaultStatic,
}

impl FldasConfig {
    pub fn new(source: &str, derived: &str, options: Options) -> Result<Self> {
        let (historical_years, fit_years) = options.resolve_years(HISTORICAL_YEARS, FIT_YEARS)?;
        let workspace =
            Workspace::new(derived).with_distribution(&options.distribution, fit_years.0, fit_years.1);

        Ok(Self {
            options,
            historical_years,
            fit_years,
            workspace,
            observed: Fldas::new(source),
            statics: DefaultStatic::new(source),
        })
    }

    pub(crate) fn boxed(source: &str, derived: &str, options: Options) -> Result<Box<dyn Config>> {
        Ok(Box::new(Self::new(source, derived, options)?))
    }
}

impl Config for FldasConfig {
    fn name(&self) -> &str {
        "fldas"
    }

    fn options(&self) -> &Options {
        &self.options
    }

    fn workspace(&self) -> &Workspace {
        &self.workspace
    }

    fn observed(&self) -> &dyn ObservedForcing {
        &self.observed
    }

    fn static_data(&self) -> &dyn StaticData {
        &self.statics
    }

    fn historical_years(&self) -> (i32, i32) {
        self.historical_years
    }

    fn fit_years(&self) -> (i32, i32) {
        self.fit_years
    }

    fn lsm_rp_base_vars(&self) -> Vec<&'static str> {
        vec!["PETmE", "P_net", "RO_mm", "Ws"]
    }

    fn lsm_integrated_stats(&self) -> BTreeMap<&'static str, Vec<&'static str>> {
        BTreeMap::from([
            ("E", vec!["sum"]),
            ("P_net", vec!["sum"]),
            ("PETmE", vec!["sum"]),
            ("RO_mm", vec!["sum"]),
            ("Ws", vec!["ave"]),
        ])
    }

    fn composite_surplus_base_vars(&self) -> Vec<CompositeVar> {
        vec![CompositeVar::plain("RO_mm")]
    }

    fn composite_deficit_base_vars(&self) -> Vec<CompositeVar> {
        vec![
            CompositeVar::negated("PETmE"),
            CompositeVar::plain("Ws"),
            CompositeVar::plain("RO_mm"),
        ]
    }

    fn should_run_lsm(&self, _yearmon: &str) -> bool {
        false
    }

    fn result_postprocess_steps(&self, yearmon: &str) -> Result<Vec<Step>> {
        let input = read_vars(&self.observed.converted(yearmon), &RESULT_VARS);
        let output = self.workspace.results(&Facets::at(yearmon))?;
        let attrs = vec![format!("yearmon={}", yearmon)];

        let step = wsim_merge(&[input], &output, &attrs)?
            .with_comment(format!("FLDAS results for {}", yearmon));
        Ok(vec![step])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn config() -> FldasConfig {
        FldasConfig::new("/mnt/source", "/mnt/fig", Options::default()).unwrap()
    }

    #[test]
    fn test_no_forecasts() {
        let c = config();
        assert!(c.forecasts().is_empty());
        assert!(c.models().is_empty());
        assert!(c.forecast_targets("201701").unwrap().is_empty());
        assert!(c.forecast("CFSv2").is_err());
    }

    #[test]
    fn test_years() {
        let c = config();
        assert_eq!(c.historical_years(), (1982, 2016));
        assert_eq!(
            c.workspace().distribution_subdir(),
            Some("gev_1982_2016")
        );
    }

    #[test]
    fn test_no_state_vars() {
        let c = config();
        assert!(c.state_rp_vars(1).is_empty());
        assert_eq!(c.forcing_rp_vars(6), vec!["T_ave", "Pr_sum"]);
    }

    #[test]
    fn test_results_extracted_from_fldas() {
        let c = config();
        let steps = c.result_postprocess_steps("201701").unwrap();
        assert_eq!(steps.len(), 1);
        assert!(steps[0].targets().contains("/mnt/fig/results/results_201701.nc"));
        assert!(steps[0].dependencies().contains("/mnt/source/FLDAS/fldas_201701.nc"));
        assert!(steps[0].commands()[0]
            .contains(&"/mnt/source/FLDAS/fldas_201701.nc::E,P_net,PETmE,RO_mm,Ws".to_string()));
    }
}
