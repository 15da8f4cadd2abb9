//! One-time spinup: model state initialization, the historical run,
//! historical integrations and every distribution fit.

use log::{debug, info};

use crate::commands::external::ncatted_yearmon;
use crate::commands::{wsim_fit, wsim_lsm, wsim_merge, Integrate};
use crate::config::Config;
use crate::dates;
use crate::error::Result;
use crate::paths::{read_vars, Facets};
use crate::workflow::{MetaStepRegistry, Step};

use super::actions::{
    composite_step, create_forcing_file, fit_var, integrated_stats, integration_inputs,
    return_period_step,
};

/// Repetitions of the climate-normal year.
pub const CLIMATE_NORM_LOOPS: u32 = 100;

/// Years of the first forward pass left out of the mean states.
pub const SPINUP_SKIP_YEARS: i32 = 2;

/// Builds every spinup step.
pub fn spinup(config: &dyn Config, meta: &mut MetaStepRegistry) -> Result<Vec<Step>> {
    let first = config.first_historical_yearmon();
    info!(
        "Generating spinup steps for {} ({}-{})",
        config.name(),
        config.historical_years().0,
        config.historical_years().1
    );

    let mut steps = historical_inputs(config)?;

    if config.should_run_lsm(&first) {
        steps.extend(model_spinup(config)?);
    }
    for yearmon in config.historical_yearmons() {
        steps.extend(config.result_postprocess_steps(&yearmon)?);
    }

    steps.extend(historical_integration(config)?);
    let fits = fits(config)?;
    steps.extend(meta.require("all_fits", fits));
    steps.extend(historical_anomalies(config, meta)?);

    debug!("Spinup produced {} steps", steps.len());
    Ok(steps)
}

fn historical_range(config: &dyn Config) -> String {
    dates::format_range(
        &config.first_historical_yearmon(),
        &config.last_historical_yearmon(),
        1,
    )
}

/// Input preparation and forcing for every historical month.
fn historical_inputs(config: &dyn Config) -> Result<Vec<Step>> {
    let mut steps = Vec::new();
    for yearmon in config.historical_yearmons() {
        steps.extend(config.observed().prep_steps(&yearmon)?);
        steps.push(create_forcing_file(config, &yearmon)?);
    }
    Ok(steps)
}

/// Initial state from soil water capacity.
fn initial_state(config: &dyn Config) -> Result<Step> {
    let wc = config.static_data().wc();
    let inputs = vec![
        wc.clone().with_transform("[x*0.3]").read_as("Ws"),
        wc.clone().with_transform("[x*0]").read_as("Snowpack"),
        wc.clone().with_transform("[x*0]").read_as("Dr"),
        wc.clone().with_transform("[x*0]").read_as("Ds"),
        wc.with_transform("[x*0]").read_as("snowmelt_month"),
    ];
    let attrs = vec!["Snowpack:units=mm".to_string(), "Ws:units=mm".to_string()];
    Ok(wsim_merge(&inputs, &config.workspace().initial_state(), &attrs)?
        .with_comment("Initial state"))
}

/// Mean forcing of one calendar month over the historical record.
fn climate_norm_forcing(config: &dyn Config, month: u32) -> Result<Step> {
    let obs = config.observed();
    let (first_year, last_year) = config.historical_years();
    let range = dates::format_range(
        &dates::format_yearmon(first_year, month),
        &dates::format_yearmon(last_year, month),
        12,
    );

    let mut inputs = vec![
        obs.precip_monthly(&range).read_as("Pr"),
        obs.temp_monthly(&range).read_as("T"),
    ];
    if let Some(wetdays) = obs.mean_p_wetdays(month) {
        inputs.push(wetdays.read_as("pWetDays"));
    }

    Ok(Integrate::new(config.workspace().climate_norm_forcing(month))
        .with_stats(["ave"])
        .with_inputs(inputs)
        .keep_varnames()
        .with_attrs([format!("month={}", month)])
        .build()?
        .with_comment(format!("Climate-normal forcing for month {:02}", month)))
}

/// Model state spinup and the historical model run.
fn model_spinup(config: &dyn Config) -> Result<Vec<Step>> {
    let ws = config.workspace();
    let statics = config.lsm_statics();
    let (first_year, last_year) = config.historical_years();
    let first = config.first_historical_yearmon();
    let last = config.last_historical_yearmon();
    let forcing = ws.forcing(&Facets::at(historical_range(config)))?;
    let states_range = dates::format_range(
        &dates::next_yearmon(&first)?,
        &dates::next_yearmon(&last)?,
        1,
    );

    let mut steps = vec![initial_state(config)?];

    let mut norms = Vec::new();
    for month in 1..=12 {
        steps.push(climate_norm_forcing(config, month)?);
        norms.push(ws.climate_norm_forcing(month));
    }

    steps.push(
        wsim_lsm(
            &statics,
            &ws.initial_state(),
            &norms,
            None,
            Some(&ws.final_norm_state()),
            Some(CLIMATE_NORM_LOOPS),
        )?
        .with_comment("Climate-normal spinup"),
    );
    steps.push(ncatted_yearmon(
        &ws.final_norm_state(),
        &ws.final_norm_state_at(&first),
        &first,
    )?);

    // The forward pass writes one state per month; a tag file stands in
    // for all of them.
    let tag = ws.tag("spinup_states");
    let forward = wsim_lsm(
        &statics,
        &ws.final_norm_state_at(&first),
        &[forcing.as_str()],
        None,
        Some(&ws.spinup_state(&states_range)),
        None,
    )?
    .with_comment("Forward pass over the historical record");
    steps.push(forward.replace_targets_with_tag_file(&tag));

    for month in 1..=12 {
        let range = dates::format_range(
            &dates::format_yearmon(first_year + SPINUP_SKIP_YEARS, month),
            &dates::format_yearmon(last_year, month),
            12,
        );
        let mean = Integrate::new(ws.spinup_mean_state(month))
            .with_stats(["ave"])
            .with_inputs([ws.spinup_state(&range)])
            .keep_varnames()
            .build()?
            .replace_dependencies([tag.as_str()])?
            .with_comment(format!("Mean spinup state for month {:02}", month));
        steps.push(mean);
    }

    let first_state = ws.state(&Facets::at(first.as_str()))?;
    steps.push(ncatted_yearmon(
        &ws.spinup_mean_state(dates::month_of(&first)?),
        &first_state,
        &first,
    )?);

    steps.push(
        wsim_lsm(
            &statics,
            &first_state,
            &[forcing.as_str()],
            Some(&ws.results(&Facets::at(historical_range(config)))?),
            Some(&ws.state(&Facets::at(states_range))?),
            None,
        )?
        .with_comment("Historical model run"),
    );

    Ok(steps)
}

/// Rolling integrations of the whole historical record, one step per
/// window.
fn historical_integration(config: &dyn Config) -> Result<Vec<Step>> {
    let ws = config.workspace();
    let (first_year, last_year) = config.historical_years();
    let inputs = integration_inputs(config, &Facets::at(historical_range(config)))?;

    let mut steps = Vec::new();
    for window in config.integration_windows() {
        let outputs = dates::available_yearmon_range(window, None, first_year, last_year)?;
        let step = Integrate::new(ws.results(&Facets::at(outputs).window(window))?)
            .with_stats(integrated_stats(config))
            .with_inputs(inputs.clone())
            .with_window(window)
            .with_attrs([format!("integration_window_months={}", window)])
            .build()?
            .with_comment(format!("Historical {}-month integration", window));
        steps.push(step);
    }
    Ok(steps)
}

/// Fits of every return-period variable, window and calendar month.
fn fits(config: &dyn Config) -> Result<Vec<Step>> {
    let mut steps = Vec::new();
    for window in config.windows() {
        for month in 1..=12 {
            for var in config.rp_vars(window) {
                steps.push(fit_var(config, &var.name, window, month)?);
            }
        }
    }
    info!("Generated {} distribution fits", steps.len());
    Ok(steps)
}

/// Return periods, anomalies and composite anomalies over the fit years,
/// and the fits of the composite anomalies.
fn historical_anomalies(config: &dyn Config, meta: &mut MetaStepRegistry) -> Result<Vec<Step>> {
    let ws = config.workspace();
    let (fit_start, fit_end) = config.fit_years();

    let mut steps = Vec::new();
    for window in config.windows() {
        for month in 1..=12 {
            let (begin, end, step) =
                dates::available_yearmon_bounds(window, Some(month), fit_start, fit_end)?;
            let f = Facets::at(dates::format_range(&begin, &end, step)).window(window);
            let end_state = Facets::at(dates::format_range(
                &dates::next_yearmon(&begin)?,
                &dates::next_yearmon(&end)?,
                step,
            ));

            steps.push(return_period_step(config, &f, &end_state, window, month)?);

            let composite_anom = ws.composite_anomaly(&f)?;
            steps.push(composite_step(
                config,
                &ws.standard_anomaly(&f)?,
                window,
                "",
                &composite_anom,
            )?);

            let mut anomaly_fits = Vec::new();
            for indicator in ["deficit", "surplus"] {
                anomaly_fits.push(wsim_fit(
                    config.distribution(),
                    &[read_vars(&composite_anom, &[indicator])],
                    &ws.fit_composite_anomalies(indicator, window, month)?,
                    window,
                    &[],
                )?);
            }
            steps.extend(meta.require("all_fits", anomaly_fits));
        }
    }
    Ok(steps)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CfsConfig, FldasConfig, Options};
    use pretty_assertions::assert_eq;

    fn targets_of(steps: &[Step]) -> Vec<&String> {
        steps.iter().flat_map(|s| s.targets()).collect()
    }

    #[test]
    fn test_cfs_spinup_chain() {
        let config = CfsConfig::new("/src", "/out", Options::default()).unwrap();
        let mut meta = MetaStepRegistry::new();
        let steps = spinup(&config, &mut meta).unwrap();
        let targets = targets_of(&steps);

        for expected in [
            "/out/spinup/initial_state.nc",
            "/out/spinup/final_state_norms.nc",
            "/out/spinup/final_state_norms_194801.nc",
            "/out/.tmp/tags/spinup_states.tag",
            "/out/state/state_194801.nc",
            "/out/state/state_201701.nc",
            "/out/results/results_201612.nc",
            "/out/results_integrated/results_60mo_201612.nc",
            "/out/gev_1950_2009/fits/Snowpack_month_02.nc",
            "/out/gev_1950_2009/fits/composite_anom_surplus_24mo_month_07.nc",
            "/out/gev_1950_2009/rp/rp_196404.nc",
        ] {
            assert!(targets.contains(&&expected.to_string()), "missing {}", expected);
        }

        assert!(!targets.contains(&&"/out/results_integrated/results_60mo_195112.nc".to_string()));
        assert!(!meta.is_empty());
    }

    #[test]
    fn test_climate_norm_spans_historical_record() {
        let config = CfsConfig::new("/src", "/out", Options::default()).unwrap();
        let step = climate_norm_forcing(&config, 3).unwrap();
        let precip = |yearmon: &str| config.observed().precip_monthly(yearmon).file;

        assert!(step.dependencies().contains(&precip("194803")));
        assert!(step.dependencies().contains(&precip("201603")));
        assert!(!step.dependencies().contains(&precip("201703")));
        assert!(!step.dependencies().contains(&precip("194804")));
    }

    #[test]
    fn test_mean_states_wait_for_forward_pass() {
        let config = CfsConfig::new("/src", "/out", Options::default()).unwrap();
        let steps = model_spinup(&config).unwrap();
        let mean = steps
            .iter()
            .find(|s| s.targets().contains("/out/spinup/spinup_mean_state/spinup_mean_state_month_05.nc"))
            .unwrap();
        assert_eq!(
            mean.dependencies().iter().collect::<Vec<_>>(),
            vec!["/out/.tmp/tags/spinup_states.tag"]
        );
        assert!(mean.commands()[0].contains(
            &"/out/spinup/spinup_state/spinup_state_[195005:201605:12].nc".to_string()
        ));
    }

    #[test]
    fn test_norms_loop() {
        let config = CfsConfig::new("/src", "/out", Options::default()).unwrap();
        let steps = model_spinup(&config).unwrap();
        let looped = steps
            .iter()
            .find(|s| s.targets().contains("/out/spinup/final_state_norms.nc"))
            .unwrap();
        assert_eq!(looped.dependencies().len(), 12 + 4);
        assert!(looped.commands()[0].ends_with(&["--loop".to_string(), "100".to_string()]));
    }

    #[test]
    fn test_fldas_spinup_skips_model() {
        let config = FldasConfig::new("/src", "/out", Options::default()).unwrap();
        let mut meta = MetaStepRegistry::new();
        let steps = spinup(&config, &mut meta).unwrap();
        let targets = targets_of(&steps);

        assert!(!targets.contains(&&"/out/spinup/initial_state.nc".to_string()));
        assert!(targets.contains(&&"/out/results/results_198201.nc".to_string()));
        assert!(targets.contains(&&"/out/gev_1982_2016/fits/RO_mm_sum_3mo_month_01.nc".to_string()));
    }
}
