//! Steps for the forecasts issued in one month.

use log::{debug, info};

use crate::commands::{wsim_correct, wsim_merge};
use crate::config::Config;
use crate::dates;
use crate::error::{Error, Result};
use crate::paths::read_vars;
use crate::sources::ForecastForcing;
use crate::workflow::{MetaStepRegistry, Step};

use super::actions::{
    adjusted_composite, composite_anomalies, composite_anomaly_return_periods,
    composite_indicators, compute_return_periods, ensemble_summaries, population_summaries,
    run_lsm, time_integrate, EnsembleMembers, Realization,
};

/// Whether a `window`-month integration ending at `target` starts within
/// the record.
fn window_available(config: &dyn Config, target: &str, window: u32) -> Result<bool> {
    let start = dates::add_months(target, -(window as i64 - 1))?;
    Ok(start >= config.first_historical_yearmon())
}

/// Ensemble members per model, after omitting members issued within
/// `lag_hours`.
pub fn ensemble_members(
    config: &dyn Config,
    yearmon: &str,
    lag_hours: Option<u32>,
) -> Result<EnsembleMembers> {
    let mut ensembles = Vec::new();
    for model in config.models() {
        let members = config.forecast_ensemble_members(&model, yearmon, lag_hours)?;
        ensembles.push((model, members));
    }
    Ok(ensembles)
}

/// Builds the steps for every forecast issued at `yearmon`.
pub fn monthly_forecast(
    config: &dyn Config,
    yearmon: &str,
    meta: &mut MetaStepRegistry,
    lag_hours: Option<u32>,
) -> Result<Vec<Step>> {
    if config.models().is_empty() {
        return Err(Error::contract(format!(
            "configuration '{}' has no forecast models",
            config.name()
        )));
    }
    let lag = lag_hours.or(config.forecast_lag_hours());
    let ensembles = ensemble_members(config, yearmon, lag)?;
    forecast_steps(config, yearmon, meta, &ensembles)
}

/// Builds the forecast steps of `yearmon` for an already selected set of
/// ensemble members.
pub fn forecast_steps(
    config: &dyn Config,
    yearmon: &str,
    meta: &mut MetaStepRegistry,
    ensembles: &EnsembleMembers,
) -> Result<Vec<Step>> {
    let targets = config.forecast_targets(yearmon)?;
    if targets.is_empty() {
        return Err(Error::contract(format!("no forecast targets for {}", yearmon)));
    }
    info!(
        "Generating forecast steps for {}: {} targets, {} members",
        yearmon,
        targets.len(),
        ensembles.iter().map(|(_, m)| m.len()).sum::<usize>()
    );

    let mut steps = Vec::new();
    let mut summaries = Vec::new();
    for target in &targets {
        let mut covering: EnsembleMembers = Vec::new();
        for (model, members) in ensembles {
            let forecast = config.forecast(model)?;
            if !forecast.targets(yearmon)?.contains(target) {
                continue;
            }
            for member in members {
                steps.extend(member_steps(config, forecast, yearmon, target, member)?);
            }
            covering.push((model.clone(), members.clone()));
        }
        summaries.extend(summary_steps(config, yearmon, target, &covering)?);
    }
    steps.extend(meta.require("all_forecasts", summaries));

    debug!("Forecast {} produced {} steps", yearmon, steps.len());
    Ok(steps)
}

/// Quantile-maps each forcing variable of a member onto the observed
/// climatology of its target month.
fn correct_forecast(
    forecast: &dyn ForecastForcing,
    yearmon: &str,
    target: &str,
    member: &str,
) -> Result<Step> {
    let lead = dates::get_lead_months(yearmon, target)?;
    let month = dates::month_of(target)?;
    let output = forecast.corrected(target, member);

    let mut corrections = Vec::new();
    for (i, var) in forecast.forcing_vars().iter().enumerate() {
        let raw = forecast.raw(target, member, var)?.read_as(var);
        corrections.push(wsim_correct(
            &forecast.fit_retro(var, month, lead),
            &forecast.fit_obs(var, month),
            &raw,
            &output,
            i > 0,
        )?);
    }

    let (first, rest) = corrections
        .split_first()
        .ok_or_else(|| Error::contract(format!("{} has no forcing variables", forecast.name())))?;
    Ok(first.merge(rest)?.with_comment(format!(
        "Bias correction of {} member {} for {}",
        forecast.name(),
        member,
        target
    )))
}

fn member_forcing(
    config: &dyn Config,
    forecast: &dyn ForecastForcing,
    yearmon: &str,
    target: &str,
    member: &str,
) -> Result<Step> {
    let mut inputs = if forecast.requires_bias_correction() {
        vec![read_vars(&forecast.corrected(target, member), forecast.forcing_vars())]
    } else {
        forecast
            .forcing_vars()
            .iter()
            .map(|var| Ok(forecast.raw(target, member, var)?.read_as(var)))
            .collect::<Result<Vec<_>>>()?
    };
    if let Some(wetdays) = forecast.observed().mean_p_wetdays(dates::month_of(target)?) {
        inputs.push(wetdays.read_as("pWetDays"));
    }

    let realization = Realization::member(target, forecast.name(), member);
    let output = config.workspace().forcing(&realization.facets(yearmon, 1))?;
    wsim_merge(&inputs, &output, &[format!("yearmon={}", target)])
}

/// Preparation, model run, integration and return periods of one member.
fn member_steps(
    config: &dyn Config,
    forecast: &dyn ForecastForcing,
    yearmon: &str,
    target: &str,
    member: &str,
) -> Result<Vec<Step>> {
    let realization = Realization::member(target, forecast.name(), member);

    let mut steps = forecast.prep_steps(yearmon, target, member)?;
    if forecast.requires_bias_correction() {
        steps.push(correct_forecast(forecast, yearmon, target, member)?);
    }
    steps.push(member_forcing(config, forecast, yearmon, target, member)?);
    steps.push(run_lsm(config, yearmon, &realization)?);

    for window in config.integration_windows() {
        if window_available(config, target, window)? {
            steps.push(time_integrate(config, yearmon, window, &realization)?);
        }
    }
    for window in config.windows() {
        if window_available(config, target, window)? {
            steps.push(compute_return_periods(config, yearmon, window, &realization)?);
        }
    }
    Ok(steps)
}

/// Ensemble summaries and the composite products derived from them.
fn summary_steps(
    config: &dyn Config,
    yearmon: &str,
    target: &str,
    ensembles: &EnsembleMembers,
) -> Result<Vec<Step>> {
    let summary = Realization::summary(target);

    let mut steps = Vec::new();
    for window in config.windows() {
        if !window_available(config, target, window)? {
            continue;
        }
        steps.extend(ensemble_summaries(config, yearmon, target, window, ensembles)?);
        steps.push(composite_indicators(config, yearmon, window, &summary)?);
        steps.push(composite_anomalies(config, yearmon, window, &summary)?);
        steps.push(composite_anomaly_return_periods(config, yearmon, window, &summary)?);
        steps.push(adjusted_composite(config, yearmon, window, &summary)?);
        steps.extend(population_summaries(config, yearmon, window, &summary)?);
    }
    Ok(steps)
}
