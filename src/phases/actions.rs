//! Step builders shared by the spinup, observed and forecast phases.
//!
//! Each builder works on one [`Realization`]: observed values, a single
//! forecast ensemble member, or the ensemble summary for a target month.

use std::collections::BTreeMap;

use crate::commands::{
    wsim_anom, wsim_composite, wsim_fit, wsim_lsm, wsim_merge, Integrate, ZonalStats,
};
use crate::config::{CompositeVar, Config, VarSource};
use crate::dates;
use crate::error::{Error, Result};
use crate::paths::{read_vars, Basis, Facets, Vardef, Workspace};
use crate::workflow::Step;

/// Return period, in years, above which surplus and deficit may coexist.
pub const BOTH_THRESHOLD: f64 = 3.0;

/// Quantiles reported for ensemble summaries.
pub const SUMMARY_QUANTILES: [&str; 3] = ["q25", "q50", "q75"];

/// Whose values an artifact holds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Realization {
    Observed,
    Member {
        target: String,
        model: String,
        member: String,
    },
    /// Ensemble summary over every member of every model.
    Summary { target: String },
}

impl Realization {
    pub fn member(target: &str, model: &str, member: &str) -> Self {
        Self::Member {
            target: target.to_string(),
            model: model.to_string(),
            member: member.to_string(),
        }
    }

    pub fn summary(target: &str) -> Self {
        Self::Summary {
            target: target.to_string(),
        }
    }

    /// Facets of the artifact produced at `yearmon` for `window`.
    pub fn facets(&self, yearmon: &str, window: u32) -> Facets {
        let f = Facets::at(yearmon).window(window);
        match self {
            Self::Observed => f,
            Self::Member {
                target,
                model,
                member,
            } => f.forecast(target, model, member),
            Self::Summary { target } => f.target(target.as_str()).summary(),
        }
    }

    /// The month the values describe.
    pub fn valid_yearmon<'a>(&'a self, yearmon: &'a str) -> &'a str {
        match self {
            Self::Observed => yearmon,
            Self::Member { target, .. } | Self::Summary { target } => target,
        }
    }

    /// Calendar month whose fits apply.
    pub fn fit_month(&self, yearmon: &str) -> Result<u32> {
        dates::month_of(self.valid_yearmon(yearmon))
    }

    fn describe(&self, yearmon: &str) -> String {
        match self {
            Self::Observed => yearmon.to_string(),
            Self::Member {
                target,
                model,
                member,
            } => format!("{} {} member {} for {}", yearmon, model, member, target),
            Self::Summary { target } => format!("{} ensemble summary for {}", yearmon, target),
        }
    }

    /// Facets of the state at the end of the valid month.
    fn end_state(&self, yearmon: &str) -> Result<Facets> {
        match self {
            Self::Observed => Ok(Facets::at(dates::next_yearmon(yearmon)?)),
            Self::Member {
                target,
                model,
                member,
            } => Ok(Facets::at(yearmon).forecast(&dates::next_yearmon(target)?, model, member)),
            Self::Summary { .. } => Err(Error::contract("ensemble summaries have no model state")),
        }
    }

    fn require_single(&self, what: &str) -> Result<()> {
        if let Self::Summary { .. } = self {
            return Err(Error::contract(format!(
                "{} is computed per member, not for an ensemble summary",
                what
            )));
        }
        Ok(())
    }
}

/// `.csv` counterpart of a workspace path.
pub fn csv(path: &str) -> String {
    match path.strip_suffix(".nc") {
        Some(stem) => format!("{}.csv", stem),
        None => path.to_string(),
    }
}

/// Merges the monthly observed inputs into the LSM forcing file.
pub fn create_forcing_file(config: &dyn Config, yearmon: &str) -> Result<Step> {
    let obs = config.observed();
    let mut inputs = vec![
        obs.precip_monthly(yearmon).read_as("Pr"),
        obs.temp_monthly(yearmon).read_as("T"),
    ];
    if let Some(wetdays) = obs.p_wetdays(yearmon)? {
        inputs.push(wetdays.read_as("pWetDays"));
    }

    let output = config.workspace().forcing(&Facets::at(yearmon))?;
    let step = wsim_merge(&inputs, &output, &[format!("yearmon={}", yearmon)])?;
    Ok(step.with_comment(format!("Forcing for {}", yearmon)))
}

/// Runs the LSM over one month of observed or member forcing.
///
/// A member's first target starts from the observed state; later targets
/// continue from the member's own state.
pub fn run_lsm(config: &dyn Config, yearmon: &str, realization: &Realization) -> Result<Step> {
    realization.require_single("the land surface model")?;
    let ws = config.workspace();

    let continues_member = match realization {
        Realization::Member { target, .. } => dates::get_lead_months(yearmon, target)? > 1,
        _ => false,
    };
    let state = match realization {
        Realization::Member {
            target,
            model,
            member,
        } if continues_member => ws.state(&Facets::at(yearmon).forecast(target, model, member))?,
        _ => ws.state(&Facets::at(realization.valid_yearmon(yearmon)))?,
    };

    let f = realization.facets(yearmon, 1);
    let forcing = ws.forcing(&f)?;
    let results = ws.results(&f)?;
    let next_state = ws.state(&realization.end_state(yearmon)?)?;

    let step = wsim_lsm(
        &config.lsm_statics(),
        &state,
        &[forcing],
        Some(&results),
        Some(&next_state),
        None,
    )?;
    Ok(step.with_comment(format!("LSM for {}", realization.describe(yearmon))))
}

/// `--stat` arguments integrating every LSM and forcing variable.
pub fn integrated_stats(config: &dyn Config) -> Vec<String> {
    let mut by_stat: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
    for (var, stats) in config
        .lsm_integrated_stats()
        .into_iter()
        .chain(config.forcing_integrated_stats())
    {
        for stat in stats {
            by_stat.entry(stat).or_default().push(var);
        }
    }
    by_stat
        .into_iter()
        .map(|(stat, vars)| format!("{}::{}", stat, vars.join(",")))
        .collect()
}

/// Results and forcing files of one month, restricted to the integrated
/// variables.
pub fn integration_inputs(config: &dyn Config, f: &Facets) -> Result<Vec<String>> {
    let ws = config.workspace();
    let lsm_vars: Vec<&str> = config.lsm_integrated_stats().keys().copied().collect();
    let forcing_vars: Vec<&str> = config.forcing_integrated_stats().keys().copied().collect();
    Ok(vec![
        read_vars(&ws.results(f)?, &lsm_vars),
        read_vars(&ws.forcing(f)?, &forcing_vars),
    ])
}

/// Integrates the `window` months ending at the valid month.
///
/// Member integrations read observed months up to the issue month and the
/// member's own months after it.
pub fn time_integrate(
    config: &dyn Config,
    yearmon: &str,
    window: u32,
    realization: &Realization,
) -> Result<Step> {
    realization.require_single("time integration")?;
    if window < 2 {
        return Err(Error::argument("time integration requires a window of two or more months"));
    }

    let ws = config.workspace();
    let valid = realization.valid_yearmon(yearmon);

    let mut inputs = Vec::new();
    for month in dates::rolling_window(valid, window)? {
        let f = match realization {
            Realization::Member { model, member, .. } if month.as_str() > yearmon => {
                Facets::at(yearmon).forecast(&month, model, member)
            }
            _ => Facets::at(month.as_str()),
        };
        inputs.extend(integration_inputs(config, &f)?);
    }

    let output = ws.results(&realization.facets(yearmon, window))?;
    let step = Integrate::new(output)
        .with_stats(integrated_stats(config))
        .with_inputs(inputs)
        .with_attrs([
            format!("yearmon={}", valid),
            format!("integration_window_months={}", window),
        ])
        .build()?;
    Ok(step.with_comment(format!(
        "{}-month integration for {}",
        window,
        realization.describe(yearmon)
    )))
}

/// Return periods and standard anomalies of every fitted variable.
pub fn compute_return_periods(
    config: &dyn Config,
    yearmon: &str,
    window: u32,
    realization: &Realization,
) -> Result<Step> {
    realization.require_single("return periods")?;
    let month = realization.fit_month(yearmon)?;
    let step = return_period_step(
        config,
        &realization.facets(yearmon, window),
        &realization.end_state(yearmon)?,
        window,
        month,
    )?;
    Ok(step.with_comment(format!(
        "{}-month return periods for {}",
        window,
        realization.describe(yearmon)
    )))
}

/// Return periods for the artifact at `f`, which may name a range of
/// yearmons sharing calendar month `month`.
pub(crate) fn return_period_step(
    config: &dyn Config,
    f: &Facets,
    end_state: &Facets,
    window: u32,
    month: u32,
) -> Result<Step> {
    let ws = config.workspace();
    let fit_facets = Facets::default().window(window).month(month);

    let mut fits = Vec::new();
    let mut by_file: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for var in config.rp_vars(window) {
        fits.push(ws.fit_obs(&var.name, &fit_facets, None)?);
        let file = match var.source {
            VarSource::State => ws.state(end_state)?,
            VarSource::Forcing if window == 1 => ws.forcing(f)?,
            _ => ws.results(f)?,
        };
        by_file.entry(file).or_default().push(var.name);
    }
    let obs: Vec<String> = by_file
        .iter()
        .map(|(file, vars)| read_vars(file, vars))
        .collect();

    let rp = ws.return_period(f)?;
    let sa = ws.standard_anomaly(f)?;
    wsim_anom(&fits, &obs, Some(&rp), Some(&sa))
}

/// Fits the distribution of `var` over the fit years, for integrations
/// ending in calendar month `month`.
pub fn fit_var(config: &dyn Config, var: &str, window: u32, month: u32) -> Result<Step> {
    let source = config
        .rp_vars(window)
        .into_iter()
        .find(|v| v.name == var)
        .map(|v| v.source)
        .ok_or_else(|| {
            Error::contract(format!(
                "'{}' has no return period at a {}-month window",
                var, window
            ))
        })?;

    let ws = config.workspace();
    let (fit_start, fit_end) = config.fit_years();
    let (begin, end, step) = dates::available_yearmon_bounds(window, Some(month), fit_start, fit_end)?;
    let range = dates::format_range(&begin, &end, step);

    let input = match source {
        VarSource::State => ws.state(&Facets::at(dates::format_range(
            &dates::next_yearmon(&begin)?,
            &dates::next_yearmon(&end)?,
            step,
        )))?,
        VarSource::Forcing if window == 1 => ws.forcing(&Facets::at(range))?,
        _ => ws.results(&Facets::at(range).window(window))?,
    };

    let output = ws.fit_obs(var, &Facets::default().window(window).month(month), None)?;
    let step = wsim_fit(
        config.distribution(),
        &[read_vars(&input, &[var])],
        &output,
        window,
        &[],
    )?;
    Ok(step.with_comment(format!("Fit of {} ({}-month, month {:02})", var, window, month)))
}

/// Composite-variable readers of `file`, appending `suffix` to the stored
/// variable names.
fn composite_inputs(file: &str, vars: &[CompositeVar], suffix: &str) -> Vec<String> {
    vars.iter()
        .map(|v| {
            let mut def = Vardef::new(file, format!("{}{}", v.name, suffix));
            if v.negate {
                def = def.with_transform("negate");
                def.read_as(&format!("Neg_{}", v.name))
            } else if suffix.is_empty() {
                def.to_string()
            } else {
                def.read_as(&v.name)
            }
        })
        .collect()
}

/// Composite indicators from return periods (or anomalies) in `input`.
pub(crate) fn composite_step(
    config: &dyn Config,
    input: &str,
    window: u32,
    suffix: &str,
    output: &str,
) -> Result<Step> {
    let surplus = composite_inputs(input, &config.composite_surplus_vars(window), suffix);
    let deficit = composite_inputs(input, &config.composite_deficit_vars(window), suffix);
    let mask = config.static_data().wc().to_string();
    wsim_composite(&surplus, &deficit, BOTH_THRESHOLD, Some(&mask), output)
}

fn summary_suffix(realization: &Realization) -> &'static str {
    match realization {
        Realization::Summary { .. } => "_q50",
        _ => "",
    }
}

/// Surplus, deficit and both indicators from return periods.
pub fn composite_indicators(
    config: &dyn Config,
    yearmon: &str,
    window: u32,
    realization: &Realization,
) -> Result<Step> {
    let ws = config.workspace();
    let f = realization.facets(yearmon, window);
    let step = composite_step(
        config,
        &ws.return_period(&f)?,
        window,
        summary_suffix(realization),
        &ws.composite(&f)?,
    )?;
    Ok(step.with_comment(format!(
        "{}-month composite for {}",
        window,
        realization.describe(yearmon)
    )))
}

/// Composite indicators from standard anomalies.
pub fn composite_anomalies(
    config: &dyn Config,
    yearmon: &str,
    window: u32,
    realization: &Realization,
) -> Result<Step> {
    let ws = config.workspace();
    let f = realization.facets(yearmon, window);
    composite_step(
        config,
        &ws.standard_anomaly(&f)?,
        window,
        summary_suffix(realization),
        &ws.composite_anomaly(&f)?,
    )
}

/// Return periods of the composite anomaly indicators.
pub fn composite_anomaly_return_periods(
    config: &dyn Config,
    yearmon: &str,
    window: u32,
    realization: &Realization,
) -> Result<Step> {
    let ws = config.workspace();
    let month = realization.fit_month(yearmon)?;
    let f = realization.facets(yearmon, window);

    let fits = vec![
        ws.fit_composite_anomalies("deficit", window, month)?,
        ws.fit_composite_anomalies("surplus", window, month)?,
    ];
    let obs = vec![read_vars(&ws.composite_anomaly(&f)?, &["deficit", "surplus"])];
    wsim_anom(&fits, &obs, Some(&ws.composite_anomaly_rp(&f)?), None)
}

/// Composite with surplus and deficit replaced by the return periods of
/// the composite anomalies.
pub fn adjusted_composite(
    config: &dyn Config,
    yearmon: &str,
    window: u32,
    realization: &Realization,
) -> Result<Step> {
    let ws = config.workspace();
    let f = realization.facets(yearmon, window);

    let inputs = vec![
        read_vars(&ws.composite_anomaly_rp(&f)?, &["deficit", "surplus"]),
        read_vars(&ws.composite(&f)?, &["deficit_cause", "surplus_cause", "both"]),
    ];
    let attrs = vec![format!("yearmon={}", realization.valid_yearmon(yearmon))];
    let step = wsim_merge(&inputs, &ws.composite_adjusted(&f)?, &attrs)?;
    Ok(step.with_comment(format!(
        "{}-month adjusted composite for {}",
        window,
        realization.describe(yearmon)
    )))
}

/// Population-weighted surplus and deficit of the adjusted composite, per
/// country and per province.
pub fn population_summaries(
    config: &dyn Config,
    yearmon: &str,
    window: u32,
    realization: &Realization,
) -> Result<Vec<Step>> {
    let ws = config.workspace();
    let statics = config.static_data();
    let f = realization.facets(yearmon, window);
    let adjusted = ws.composite_adjusted(&f)?;
    let population = statics.population_density();

    let mut steps = Vec::new();
    for (basis, layer) in [
        (Basis::Country, statics.countries()),
        (Basis::Province, statics.provinces()),
    ] {
        let output = csv(&ws.composite_adjusted(&f.clone().basis(basis))?);
        let step = ZonalStats::new(layer.file, layer.id_field, output)
            .with_raster("deficit", &adjusted, Some("deficit"))
            .with_raster("surplus", &adjusted, Some("surplus"))
            .with_weights("population", &population)
            .with_stat("deficit_pop=weighted_mean(deficit,population)")
            .with_stat("surplus_pop=weighted_mean(surplus,population)")
            .with_stat("population=sum(population)")
            .build()?;
        steps.push(step);
    }
    Ok(steps)
}

/// Ensemble members of each model for one issue month.
pub type EnsembleMembers = Vec<(String, Vec<String>)>;

/// Weight of every member so that each model counts equally.
pub fn member_weights(members: &EnsembleMembers) -> Vec<f64> {
    let models = members.iter().filter(|(_, m)| !m.is_empty()).count();
    members
        .iter()
        .flat_map(|(_, ms)| {
            let w = 1.0 / (models * ms.len()) as f64;
            std::iter::repeat(w).take(ms.len())
        })
        .collect()
}

type PathOf = fn(&Workspace, &Facets) -> Result<String>;

/// Weighted quantiles across the ensemble of results, return periods and
/// standard anomalies for one target and window. Monthly summaries also
/// cover the forcing.
pub fn ensemble_summaries(
    config: &dyn Config,
    yearmon: &str,
    target: &str,
    window: u32,
    members: &EnsembleMembers,
) -> Result<Vec<Step>> {
    if members.iter().all(|(_, m)| m.is_empty()) {
        return Err(Error::contract(format!(
            "no ensemble members to summarize for {} target {}",
            yearmon, target
        )));
    }

    let ws = config.workspace();
    let weights = member_weights(members);
    let summary = Realization::summary(target).facets(yearmon, window);

    let mut result_vars = config.lsm_rp_vars(window);
    if window > 1 {
        result_vars.extend(config.forcing_rp_vars(window));
    }
    let rp_vars: Vec<String> = config.rp_vars(window).into_iter().map(|v| v.name).collect();

    let forcing_vars: Vec<String> = config
        .forcing_rp_base_vars()
        .into_iter()
        .map(String::from)
        .collect();

    let mut kinds: Vec<(&str, PathOf, &Vec<String>)> = vec![
        ("results", Workspace::results, &result_vars),
        ("return periods", Workspace::return_period, &rp_vars),
        ("anomalies", Workspace::standard_anomaly, &rp_vars),
    ];
    // Integrated forcing is already part of the integrated results.
    if window == 1 {
        kinds.push(("forcing", Workspace::forcing, &forcing_vars));
    }

    let mut steps = Vec::new();
    for (what, path_of, vars) in kinds {
        let mut inputs = Vec::new();
        for (model, ms) in members {
            for member in ms {
                let f = Realization::member(target, model, member).facets(yearmon, window);
                inputs.push(read_vars(&path_of(ws, &f)?, vars));
            }
        }

        let step = Integrate::new(path_of(ws, &summary)?)
            .with_stats(SUMMARY_QUANTILES)
            .with_inputs(inputs)
            .with_weights(weights.clone())
            .with_attrs([format!("yearmon={}", yearmon), format!("target={}", target)])
            .build()?
            .with_comment(format!(
                "{}-month {} summary for {} target {}",
                window, what, yearmon, target
            ));
        steps.push(step);
    }
    Ok(steps)
}
