//! Workflow Planner
//!
//! Assembles the complete step list of a run:
//! - Once-per-build preparation of inputs
//! - Model spinup and distribution fitting (optional)
//! - Observed and forecast steps of every requested timestep
//! - Sector overlays
//! - Named collector steps

use std::collections::HashSet;

use log::{debug, info, warn};

use crate::config::Config;
use crate::dates;
use crate::error::{Error, Result};
use crate::phases::{ensemble_members, forecast_steps, monthly_observed, spinup};
use crate::sectors::{sector_monthly, sector_spinup};

use super::registry::MetaStepRegistry;
use super::step::Step;
use super::validator::{validate_steps, ValidationError};

/// What a run covers.
#[derive(Debug, Clone, PartialEq)]
pub struct PlanOptions {
    /// First timestep, `YYYYMM`.
    pub start: String,
    /// Last timestep, `YYYYMM`, inclusive.
    pub stop: String,
    /// Include spinup and fitting steps.
    pub spinup: bool,
    /// Overrides the configured freshness cut-off of forecast members.
    pub forecast_lag_hours: Option<u32>,
}

impl PlanOptions {
    /// A run over `start..=stop` with spinup.
    pub fn new(start: impl Into<String>, stop: impl Into<String>) -> Self {
        Self {
            start: start.into(),
            stop: stop.into(),
            spinup: true,
            forecast_lag_hours: None,
        }
    }

    pub fn with_spinup(mut self, spinup: bool) -> Self {
        self.spinup = spinup;
        self
    }

    pub fn with_forecast_lag_hours(mut self, hours: Option<u32>) -> Self {
        self.forecast_lag_hours = hours;
        self
    }
}

/// Generates the build graph of one configuration.
pub struct WorkflowPlanner<'a> {
    config: &'a dyn Config,
    options: PlanOptions,
}

impl<'a> WorkflowPlanner<'a> {
    pub fn new(config: &'a dyn Config, options: PlanOptions) -> Self {
        Self { config, options }
    }

    pub fn options(&self) -> &PlanOptions {
        &self.options
    }

    /// Every timestep of the run, oldest first.
    pub fn timesteps(&self) -> Result<Vec<String>> {
        let PlanOptions { start, stop, .. } = &self.options;
        for token in [start, stop] {
            if !dates::is_yearmon(token) {
                return Err(Error::InvalidDate(token.clone()));
            }
        }
        if start > stop {
            return Err(Error::InvalidRange(format!(
                "start {} is after stop {}",
                start, stop
            )));
        }
        dates::expand_date_range(start, stop, 1)
    }

    /// Generates all steps of the run.
    ///
    /// Structurally identical steps are kept once, in the position of their
    /// first occurrence.
    pub fn plan(&self) -> Result<Vec<Step>> {
        let config = self.config;
        let timesteps = self.timesteps()?;
        info!(
            "Planning {} timesteps ({} to {}) with configuration '{}'",
            timesteps.len(),
            self.options.start,
            self.options.stop,
            config.name()
        );

        let mut meta = MetaStepRegistry::new();
        let mut steps = config.global_prep_steps()?;
        info!("Global preparation: {} steps", steps.len());

        if self.options.spinup && config.should_run_spinup() {
            steps.extend(spinup(config, &mut meta)?);
            steps.extend(sector_spinup(config)?);
        } else {
            debug!("Skipping spinup");
        }

        let lag = self
            .options
            .forecast_lag_hours
            .or(config.forecast_lag_hours());
        let with_forecasts = !config.models().is_empty();
        if !with_forecasts {
            info!("Configuration '{}' has no forecasts", config.name());
        }

        for yearmon in &timesteps {
            steps.extend(monthly_observed(config, yearmon, &mut meta)?);

            let ensembles = if with_forecasts {
                let ensembles = ensemble_members(config, yearmon, lag)?;
                steps.extend(forecast_steps(config, yearmon, &mut meta, &ensembles)?);
                Some(ensembles)
            } else {
                None
            };

            steps.extend(sector_monthly(config, yearmon, &mut meta, ensembles.as_ref())?);
        }

        steps.extend(meta.into_steps());

        let steps = dedupe(steps);
        info!("Planned {} steps", steps.len());
        Ok(steps)
    }

    /// Checks the graph for duplicate and unbuildable targets.
    pub fn validate<F>(&self, steps: &[Step], is_external: F) -> std::result::Result<(), Vec<ValidationError>>
    where
        F: Fn(&str) -> bool,
    {
        let result = validate_steps(steps, is_external);
        if let Err(errors) = &result {
            warn!("Build graph has {} problems", errors.len());
        }
        result
    }
}

/// Drops repeated copies of identical steps.
fn dedupe(steps: Vec<Step>) -> Vec<Step> {
    let total = steps.len();
    let mut seen = HashSet::new();
    let unique: Vec<Step> = steps
        .into_iter()
        .filter(|step| seen.insert(step.clone()))
        .collect();
    debug!("Removed {} repeated steps", total - unique.len());
    unique
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CfsConfig, Config, FldasConfig, Options};
    use crate::paths::{Facets, Sector};
    use crate::workflow::validator::{find_duplicate_targets, unbuildable_targets};
    use chrono::NaiveDate;
    use pretty_assertions::assert_eq;
    use std::collections::{BTreeSet, HashMap};

    fn cfs() -> CfsConfig {
        CfsConfig::new("/src", "/out", Options::default()).unwrap()
    }

    fn cfs_with_sectors() -> CfsConfig {
        let options = Options {
            sectors: vec![Sector::ElectricPower, Sector::Agriculture],
            ..Options::default()
        };
        CfsConfig::new("/src", "/out", options).unwrap()
    }

    fn unbuildable(steps: &[Step]) -> Vec<String> {
        unbuildable_targets(steps, is_source)
            .into_iter()
            .flat_map(|s| s.targets().iter().cloned())
            .collect()
    }

    fn plan(config: &dyn Config, yearmon: &str) -> Vec<Step> {
        WorkflowPlanner::new(config, PlanOptions::new(yearmon, yearmon))
            .plan()
            .unwrap()
    }

    fn is_source(path: &str) -> bool {
        path.starts_with("/src/")
    }

    fn all_targets(steps: &[Step]) -> BTreeSet<String> {
        steps.iter().flat_map(|s| s.targets().iter().cloned()).collect()
    }

    fn all_targets_ref(steps: &[Step]) -> Vec<&String> {
        steps.iter().flat_map(|s| s.targets()).collect()
    }

    #[test]
    fn test_ensemble_selection() {
        let config = cfs();
        let now = NaiveDate::from_ymd_opt(2017, 3, 1)
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .unwrap();
        let members = config
            .forecast_ensemble_members_at("CFSv2", "201701", Some(12), now)
            .unwrap();
        assert_eq!(members.len(), 28);

        let days: BTreeSet<String> = members.iter().map(|m| m[..8].to_string()).collect();
        let expected: BTreeSet<String> = (25..=31).map(|d| format!("201701{}", d)).collect();
        assert_eq!(days, expected);
    }

    #[test]
    fn test_date_arithmetic() {
        assert_eq!(dates::add_months("199606", 96).unwrap(), "200406");
        assert_eq!(dates::add_days("20000301", -1).unwrap(), "20000229");
        assert_eq!(
            dates::available_yearmon_range(6, Some(3), 2015, 2017).unwrap(),
            "[201603:201703:12]"
        );
    }

    #[test]
    fn test_path_determinism() {
        let config = cfs();
        let f = Facets::at("201612").window(24);
        let first = config.workspace().return_period(&f).unwrap();
        assert_eq!(first, "/out/gev_1950_2009/rp_integrated/rp_24mo_201612.nc");
        assert_eq!(config.workspace().return_period(&f).unwrap(), first);
    }

    #[test]
    fn test_no_duplicate_targets() {
        for config in [cfs(), cfs_with_sectors()] {
            let steps = plan(&config, "201701");
            assert_eq!(find_duplicate_targets(&steps), Vec::<String>::new());
        }
    }

    #[test]
    fn test_complete_inside_fit_period() {
        for config in [cfs(), cfs_with_sectors()] {
            let steps = plan(&config, "196404");
            assert_eq!(unbuildable(&steps), Vec::<String>::new());
        }
    }

    #[test]
    fn test_complete_outside_fit_period() {
        for config in [cfs(), cfs_with_sectors()] {
            let steps = plan(&config, "201504");
            assert_eq!(find_duplicate_targets(&steps), Vec::<String>::new());
            assert_eq!(unbuildable(&steps), Vec::<String>::new());
        }
    }

    #[test]
    fn test_complete_with_sectors_after_history() {
        let config = cfs_with_sectors();
        let steps = plan(&config, "201701");
        assert_eq!(unbuildable(&steps), Vec::<String>::new());
    }

    #[test]
    fn test_collectors_reach_meta_and_tag_targets() {
        let config = cfs_with_sectors();
        let steps = plan(&config, "201701");

        let mut producers: HashMap<&str, &Step> = HashMap::new();
        for step in &steps {
            for target in step.targets() {
                producers.insert(target.as_str(), step);
            }
        }

        let collectors: Vec<&Step> = steps.iter().filter(|s| s.is_meta()).collect();
        let mut reached: HashSet<&str> = HashSet::new();
        let mut pending: Vec<&str> = Vec::new();
        for collector in &collectors {
            assert!(!collector.dependencies().is_empty());
            pending.extend(collector.targets().iter().map(String::as_str));
        }
        while let Some(target) = pending.pop() {
            if !reached.insert(target) {
                continue;
            }
            if let Some(step) = producers.get(target) {
                pending.extend(step.dependencies().iter().map(String::as_str));
            }
        }

        let tags: Vec<&String> = all_targets_ref(&steps)
            .into_iter()
            .filter(|t| t.ends_with(".tag"))
            .collect();
        assert!(!tags.is_empty());
        for tag in tags {
            assert!(reached.contains(tag.as_str()), "no collector reaches {}", tag);
        }
        for name in ["all_fits", "electric_power", "agriculture"] {
            assert!(reached.contains(name), "collector {} missing", name);
        }
    }

    #[test]
    fn test_adjusted_composite_suppressed_in_fit_period() {
        let config = cfs();
        let adjusted = |yearmon: &str| {
            config
                .workspace()
                .composite_adjusted(&Facets::at(yearmon).window(1))
                .unwrap()
        };

        let inside = all_targets(&plan(&config, "196404"));
        assert!(!inside.contains(&adjusted("196404")));

        let outside = all_targets(&plan(&config, "201504"));
        assert!(outside.contains(&adjusted("201504")));
    }

    #[test]
    fn test_validate_reports_every_problem() {
        let config = cfs();
        let planner = WorkflowPlanner::new(&config, PlanOptions::new("201701", "201701"));
        let step = |dep: &str| {
            Step::builder()
                .with_target("/out/x.nc")
                .with_dependency(dep)
                .with_command(["make-x"])
                .build()
                .unwrap()
        };
        let errors = planner
            .validate(&[step("/missing/a.nc"), step("/missing/b.nc")], is_source)
            .unwrap_err();
        assert_eq!(errors.len(), 3);
    }

    #[test]
    fn test_identical_steps_kept_once() {
        let step = Step::builder()
            .with_target("/src/raw.zip")
            .with_command(["wget", "http://example.org/raw.zip"])
            .build()
            .unwrap();
        let other = Step::builder()
            .with_target("/src/raw.zip")
            .with_command(["curl", "http://example.org/raw.zip"])
            .build()
            .unwrap();
        let unique = dedupe(vec![step.clone(), step.clone(), other.clone()]);
        assert_eq!(unique, vec![step, other]);
    }

    #[test]
    fn test_meta_steps_join_graph() {
        let config = cfs();
        let steps = plan(&config, "201701");
        let meta: Vec<&str> = steps
            .iter()
            .filter(|s| s.is_meta())
            .flat_map(|s| s.targets().iter().map(String::as_str))
            .collect();
        assert_eq!(
            meta,
            vec![
                "all_adjusted_composites",
                "all_composites",
                "all_fits",
                "all_forecasts",
                "all_monthly"
            ]
        );
    }

    #[test]
    fn test_without_spinup_or_forecasts() {
        let config = FldasConfig::new("/src", "/out", Options::default()).unwrap();
        let options = PlanOptions::new("201701", "201702").with_spinup(false);
        let steps = WorkflowPlanner::new(&config, options).plan().unwrap();
        let targets = all_targets(&steps);
        assert!(targets.contains("/out/results/results_201702.nc"));
        assert!(!targets.iter().any(|t| t.contains("fits")));
        assert!(!targets.iter().any(|t| t.contains("trgt")));
    }

    #[test]
    fn test_timestep_validation() {
        let config = cfs();
        let reversed = WorkflowPlanner::new(&config, PlanOptions::new("201702", "201701"));
        assert!(matches!(reversed.timesteps(), Err(Error::InvalidRange(_))));
        let malformed = WorkflowPlanner::new(&config, PlanOptions::new("2017", "2017"));
        assert!(matches!(malformed.timesteps(), Err(Error::InvalidDate(_))));
    }
}
