//! Pipeline Configuration
//!
//! A configuration ties together one observed dataset, any number of
//! forecast systems, the static layers and the output workspace, and
//! answers the questions the phase builders ask: which years are
//! historical, which variables get return periods, which ensemble members
//! exist for a month.
//!
//! Configurations are selected by name from a registry and read their
//! options from YAML:
//!
//! ```yaml
//! config: cfs
//! options:
//!   distribution: gev
//!   fit_years: [1950, 2009]
//!   sectors: [electric_power]
//! ```
//!
//! # Structure
//!
//! - [`cfs`]: CPC observations with CFSv2 forecasts
//! - [`fldas`]: FLDAS land-surface outputs, no forecasts

pub mod cfs;
pub mod fldas;

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use chrono::{Duration, NaiveDateTime, Utc};
use log::{debug, info, warn};
use once_cell::sync::Lazy;
use serde::Deserialize;

use crate::commands::LsmStatics;
use crate::dates;
use crate::error::{Error, Result};
use crate::paths::{Sector, Workspace};
use crate::sources::{AgricultureStatic, ElectricityStatic, ForecastForcing, ObservedForcing, StaticData};
use crate::workflow::Step;

pub use cfs::CfsConfig;
pub use fldas::FldasConfig;

/// Integration windows used unless configured otherwise.
pub const DEFAULT_INTEGRATION_WINDOWS: [u32; 6] = [3, 6, 12, 24, 36, 60];

/// File a return-period variable is read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum VarSource {
    Results,
    Forcing,
    /// The state at the end of the month.
    State,
}

/// A variable with a fitted distribution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RpVar {
    pub source: VarSource,
    pub name: String,
}

/// One input of a composite indicator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompositeVar {
    pub name: String,
    /// High values indicate deficit rather than surplus.
    pub negate: bool,
}

impl CompositeVar {
    pub fn plain(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            negate: false,
        }
    }

    pub fn negated(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            negate: true,
        }
    }
}

/// Options shared by every configuration.
#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct Options {
    #[serde(default = "default_distribution")]
    pub distribution: String,
    #[serde(default)]
    pub historical_years: Option<(i32, i32)>,
    #[serde(default)]
    pub fit_years: Option<(i32, i32)>,
    #[serde(default)]
    pub integration_windows: Option<Vec<u32>>,
    #[serde(default)]
    pub sectors: Vec<Sector>,
    #[serde(default)]
    pub forecast_lag_hours: Option<u32>,
    /// Restricts the forecast systems used.
    #[serde(default)]
    pub models: Option<Vec<String>>,
}

fn default_distribution() -> String {
    "gev".to_string()
}

impl Default for Options {
    fn default() -> Self {
        Self {
            distribution: default_distribution(),
            historical_years: None,
            fit_years: None,
            integration_windows: None,
            sectors: Vec::new(),
            forecast_lag_hours: None,
            models: None,
        }
    }
}

impl Options {
    /// Reads options from a YAML value; `null` yields the defaults.
    pub fn from_value(value: serde_yaml::Value) -> Result<Self> {
        if value.is_null() {
            return Ok(Self::default());
        }
        serde_yaml::from_value(value).map_err(|e| Error::Config(e.to_string()))
    }

    /// Checks the options against a configuration's year defaults and
    /// returns the effective `(historical, fit)` year ranges.
    pub fn resolve_years(
        &self,
        historical: (i32, i32),
        fit: (i32, i32),
    ) -> Result<((i32, i32), (i32, i32))> {
        let historical = self.historical_years.unwrap_or(historical);
        let fit = self.fit_years.unwrap_or(fit);

        if historical.0 > historical.1 || fit.0 > fit.1 {
            return Err(Error::Config("year ranges must be increasing".to_string()));
        }
        if fit.0 < historical.0 || fit.1 > historical.1 {
            return Err(Error::Config(format!(
                "fit years {}-{} outside historical years {}-{}",
                fit.0, fit.1, historical.0, historical.1
            )));
        }
        if let Some(windows) = &self.integration_windows {
            if windows.iter().any(|w| *w < 2) {
                return Err(Error::Config(
                    "integration windows must span at least two months".to_string(),
                ));
            }
        }
        Ok((historical, fit))
    }
}

/// Capabilities the planner needs from a configuration.
pub trait Config {
    fn name(&self) -> &str;

    fn options(&self) -> &Options;

    fn workspace(&self) -> &Workspace;

    fn observed(&self) -> &dyn ObservedForcing;

    /// Every forecast system the configuration knows.
    fn forecasts(&self) -> Vec<&dyn ForecastForcing> {
        Vec::new()
    }

    fn static_data(&self) -> &dyn StaticData;

    fn electricity_data(&self) -> Option<&dyn ElectricityStatic> {
        None
    }

    fn agriculture_data(&self) -> Option<&dyn AgricultureStatic> {
        None
    }

    /// First and last year of the historical record, inclusive.
    fn historical_years(&self) -> (i32, i32);

    /// Years distributions are fitted to, inclusive.
    fn fit_years(&self) -> (i32, i32);

    fn lsm_rp_base_vars(&self) -> Vec<&'static str>;

    fn forcing_rp_base_vars(&self) -> Vec<&'static str> {
        vec!["T", "Pr"]
    }

    /// State variables with return periods; monthly only.
    fn state_rp_base_vars(&self) -> Vec<&'static str> {
        Vec::new()
    }

    /// Statistics computed per variable when integrating model results.
    fn lsm_integrated_stats(&self) -> BTreeMap<&'static str, Vec<&'static str>>;

    fn forcing_integrated_stats(&self) -> BTreeMap<&'static str, Vec<&'static str>> {
        BTreeMap::from([("Pr", vec!["sum"]), ("T", vec!["ave"])])
    }

    fn composite_surplus_base_vars(&self) -> Vec<CompositeVar>;

    fn composite_deficit_base_vars(&self) -> Vec<CompositeVar>;

    fn should_run_spinup(&self) -> bool {
        true
    }

    /// Whether results for `yearmon` come from a model run.
    fn should_run_lsm(&self, yearmon: &str) -> bool;

    /// Steps turning model output (or a dataset's own outputs) into the
    /// results file for `yearmon`.
    fn result_postprocess_steps(&self, _yearmon: &str) -> Result<Vec<Step>> {
        Ok(Vec::new())
    }

    fn distribution(&self) -> &str {
        &self.options().distribution
    }

    fn sectors(&self) -> &[Sector] {
        &self.options().sectors
    }

    fn forecast_lag_hours(&self) -> Option<u32> {
        self.options().forecast_lag_hours
    }

    fn integration_windows(&self) -> Vec<u32> {
        self.options()
            .integration_windows
            .clone()
            .unwrap_or_else(|| DEFAULT_INTEGRATION_WINDOWS.to_vec())
    }

    /// The monthly window followed by the integration windows.
    fn windows(&self) -> Vec<u32> {
        let mut windows = vec![1];
        windows.extend(self.integration_windows());
        windows
    }

    fn lsm_statics(&self) -> LsmStatics {
        let s = self.static_data();
        LsmStatics {
            wc: s.wc().to_string(),
            flowdir: s.flowdir().to_string(),
            elevation: s.elevation().to_string(),
        }
    }

    fn first_historical_yearmon(&self) -> String {
        dates::format_yearmon(self.historical_years().0, 1)
    }

    fn last_historical_yearmon(&self) -> String {
        dates::format_yearmon(self.historical_years().1, 12)
    }

    fn historical_yearmons(&self) -> Vec<String> {
        let (first, last) = self.historical_years();
        dates::yearmons_of_years(first, last)
    }

    fn is_historical(&self, yearmon: &str) -> Result<bool> {
        let year = dates::year_of(yearmon)?;
        let (first, last) = self.historical_years();
        Ok((first..=last).contains(&year))
    }

    fn is_fit_yearmon(&self, yearmon: &str) -> Result<bool> {
        let year = dates::year_of(yearmon)?;
        let (first, last) = self.fit_years();
        Ok((first..=last).contains(&year))
    }

    /// Name of a variable after integration over `window` months.
    fn integrated_name(&self, var: &str, window: u32) -> String {
        if window == 1 {
            return var.to_string();
        }
        let stats = self.lsm_integrated_stats();
        let forcing = self.forcing_integrated_stats();
        let stat = stats
            .get(var)
            .or_else(|| forcing.get(var))
            .and_then(|s| if s.contains(&"sum") { Some("sum") } else { s.first().copied() })
            .unwrap_or("ave");
        format!("{}_{}", var, stat)
    }

    fn lsm_rp_vars(&self, window: u32) -> Vec<String> {
        self.lsm_rp_base_vars()
            .into_iter()
            .map(|v| self.integrated_name(v, window))
            .collect()
    }

    fn forcing_rp_vars(&self, window: u32) -> Vec<String> {
        self.forcing_rp_base_vars()
            .into_iter()
            .map(|v| self.integrated_name(v, window))
            .collect()
    }

    fn state_rp_vars(&self, window: u32) -> Vec<String> {
        if window > 1 {
            return Vec::new();
        }
        self.state_rp_base_vars().into_iter().map(str::to_string).collect()
    }

    /// Every variable with a return period at `window`, tagged with the file
    /// it is read from.
    fn rp_vars(&self, window: u32) -> Vec<RpVar> {
        let tag = |source: VarSource| move |name: String| RpVar { source, name };
        let mut vars: Vec<RpVar> = self
            .lsm_rp_vars(window)
            .into_iter()
            .map(tag(VarSource::Results))
            .collect();
        vars.extend(self.forcing_rp_vars(window).into_iter().map(tag(VarSource::Forcing)));
        vars.extend(self.state_rp_vars(window).into_iter().map(tag(VarSource::State)));
        vars
    }

    fn composite_surplus_vars(&self, window: u32) -> Vec<CompositeVar> {
        self.composite_surplus_base_vars()
            .into_iter()
            .map(|c| CompositeVar {
                name: self.integrated_name(&c.name, window),
                negate: c.negate,
            })
            .collect()
    }

    fn composite_deficit_vars(&self, window: u32) -> Vec<CompositeVar> {
        self.composite_deficit_base_vars()
            .into_iter()
            .map(|c| CompositeVar {
                name: self.integrated_name(&c.name, window),
                negate: c.negate,
            })
            .collect()
    }

    /// Names of the forecast systems in use.
    fn models(&self) -> Vec<String> {
        let selected = self.options().models.as_ref();
        self.forecasts()
            .iter()
            .map(|f| f.name().to_string())
            .filter(|name| selected.map_or(true, |s| s.contains(name)))
            .collect()
    }

    fn forecast(&self, model: &str) -> Result<&dyn ForecastForcing> {
        self.forecasts()
            .into_iter()
            .find(|f| f.name() == model)
            .ok_or_else(|| Error::contract(format!("no forecast model named '{}'", model)))
    }

    /// Ensemble members of `model` for `yearmon`, omitting members issued
    /// less than `lag_hours` before now.
    fn forecast_ensemble_members(
        &self,
        model: &str,
        yearmon: &str,
        lag_hours: Option<u32>,
    ) -> Result<Vec<String>> {
        self.forecast_ensemble_members_at(model, yearmon, lag_hours, Utc::now().naive_utc())
    }

    fn forecast_ensemble_members_at(
        &self,
        model: &str,
        yearmon: &str,
        lag_hours: Option<u32>,
        now: NaiveDateTime,
    ) -> Result<Vec<String>> {
        let forecast = self.forecast(model)?;
        let members = forecast.ensemble_members(yearmon)?;
        let total = members.len();

        let Some(lag) = lag_hours else {
            return Ok(members);
        };

        let cutoff = now - Duration::hours(lag as i64);
        let mut kept = Vec::with_capacity(members.len());
        for member in members {
            if forecast.member_issue_time(&member)? <= cutoff {
                kept.push(member);
            }
        }

        let omitted = total - kept.len();
        if omitted > 0 {
            warn!(
                "Omitted {} {} members for {} issued within the last {} hours",
                omitted, model, yearmon, lag
            );
        }
        Ok(kept)
    }

    /// Target yearmons of the forecasts issued at `yearmon`.
    fn forecast_targets(&self, yearmon: &str) -> Result<Vec<String>> {
        let mut targets = Vec::new();
        for model in self.models() {
            for target in self.forecast(&model)?.targets(yearmon)? {
                if !targets.contains(&target) {
                    targets.push(target);
                }
            }
        }
        targets.sort();
        Ok(targets)
    }

    /// Forecast systems whose inputs are prepared once per build.
    fn global_prep_steps(&self) -> Result<Vec<Step>> {
        let mut steps = self.observed().global_prep_steps()?;
        for model in self.models() {
            steps.extend(self.forecast(&model)?.global_prep_steps()?);
        }
        steps.extend(self.static_data().global_prep_steps()?);
        if self.sectors().contains(&Sector::ElectricPower) {
            if let Some(data) = self.electricity_data() {
                steps.extend(data.global_prep_steps()?);
            }
        }
        if self.sectors().contains(&Sector::Agriculture) {
            if let Some(data) = self.agriculture_data() {
                steps.extend(data.global_prep_steps()?);
            }
        }
        Ok(steps)
    }
}

/// Constructor of a registered configuration.
pub type Factory = fn(&str, &str, Options) -> Result<Box<dyn Config>>;

static REGISTRY: Lazy<BTreeMap<&'static str, Factory>> = Lazy::new(|| {
    let mut registry: BTreeMap<&'static str, Factory> = BTreeMap::new();
    registry.insert("cfs", CfsConfig::boxed);
    registry.insert("fldas", FldasConfig::boxed);
    registry
});

/// Names of the registered configurations.
pub fn available_configs() -> Vec<&'static str> {
    REGISTRY.keys().copied().collect()
}

/// Builds the configuration registered as `name`.
pub fn build_config(
    name: &str,
    source: &str,
    derived: &str,
    options: serde_yaml::Value,
) -> Result<Box<dyn Config>> {
    let factory = REGISTRY
        .get(name)
        .ok_or_else(|| Error::UnknownConfig(name.to_string()))?;
    let options = Options::from_value(options)?;
    debug!("Building configuration '{}' with {:?}", name, options);
    factory(source, derived, options)
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigFile {
    config: String,
    #[serde(default)]
    options: serde_yaml::Value,
}

/// Loads a configuration file and applies `KEY=VALUE` overrides to its
/// options before construction.
pub fn load_config<P: AsRef<Path>>(
    path: P,
    source: &str,
    derived: &str,
    overrides: &[String],
) -> Result<Box<dyn Config>> {
    let path = path.as_ref();
    info!("Loading configuration: {}", path.display());

    let text = fs::read_to_string(path)?;
    let file: ConfigFile = serde_yaml::from_str(&text)?;

    let mut options = match file.options {
        serde_yaml::Value::Null => serde_yaml::Mapping::new(),
        serde_yaml::Value::Mapping(m) => m,
        _ => return Err(Error::Config("'options' must be a mapping".to_string())),
    };
    for item in overrides {
        let (key, value) = parse_override(item)?;
        debug!("Option override: {} = {:?}", key, value);
        options.insert(serde_yaml::Value::String(key), value);
    }

    build_config(&file.config, source, derived, serde_yaml::Value::Mapping(options))
}

/// Splits `KEY=VALUE`, reading the value as a YAML scalar or flow sequence.
pub fn parse_override(item: &str) -> Result<(String, serde_yaml::Value)> {
    let (key, value) = item
        .split_once('=')
        .filter(|(k, _)| !k.trim().is_empty())
        .ok_or_else(|| Error::Config(format!("expected KEY=VALUE, got '{}'", item)))?;
    let value: serde_yaml::Value = serde_yaml::from_str(value)?;
    Ok((key.trim().to_string(), value))
}
