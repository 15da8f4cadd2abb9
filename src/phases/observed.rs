//! Steps for one month of observed data.

use log::{debug, info};

use crate::config::Config;
use crate::dates;
use crate::error::Result;
use crate::workflow::{MetaStepRegistry, Step};

use super::actions::{
    adjusted_composite, composite_anomalies, composite_anomaly_return_periods,
    composite_indicators, compute_return_periods, create_forcing_file, population_summaries,
    run_lsm, time_integrate, Realization,
};

/// Whether integrated results for `window` months ending at `yearmon` can
/// be computed. Within the fit years they must also lie entirely within
/// them.
pub fn window_available(config: &dyn Config, yearmon: &str, window: u32) -> Result<bool> {
    let start = dates::add_months(yearmon, -(window as i64 - 1))?;
    let earliest = if config.is_fit_yearmon(yearmon)? {
        dates::format_yearmon(config.fit_years().0, 1)
    } else {
        config.first_historical_yearmon()
    };
    Ok(start >= earliest)
}

/// Builds the steps for observed month `yearmon`.
///
/// Months inside the historical record were already run during spinup, and
/// months inside the fit years already have return periods; only the
/// remaining products are generated for them.
pub fn monthly_observed(
    config: &dyn Config,
    yearmon: &str,
    meta: &mut MetaStepRegistry,
) -> Result<Vec<Step>> {
    let historical = config.is_historical(yearmon)?;
    let in_fit = config.is_fit_yearmon(yearmon)?;
    info!(
        "Generating observed steps for {} (historical: {}, fit years: {})",
        yearmon, historical, in_fit
    );

    let observed = Realization::Observed;
    let mut steps = Vec::new();

    if !historical {
        steps.extend(config.observed().prep_steps(yearmon)?);
        steps.push(create_forcing_file(config, yearmon)?);
        if config.should_run_lsm(yearmon) {
            steps.push(run_lsm(config, yearmon, &observed)?);
        }
        steps.extend(config.result_postprocess_steps(yearmon)?);

        for window in config.integration_windows() {
            if window_available(config, yearmon, window)? {
                steps.push(time_integrate(config, yearmon, window, &observed)?);
            }
        }
    }

    let mut monthly = Vec::new();
    for window in config.windows() {
        if !window_available(config, yearmon, window)? {
            debug!("No {}-month window available at {}", window, yearmon);
            continue;
        }

        if !in_fit {
            monthly.push(compute_return_periods(config, yearmon, window, &observed)?);
        }

        let composite = composite_indicators(config, yearmon, window, &observed)?;
        steps.extend(meta.require("all_composites", vec![composite]));

        if !in_fit {
            steps.push(composite_anomalies(config, yearmon, window, &observed)?);
            steps.push(composite_anomaly_return_periods(config, yearmon, window, &observed)?);
            let adjusted = adjusted_composite(config, yearmon, window, &observed)?;
            steps.extend(meta.require("all_adjusted_composites", vec![adjusted]));
            monthly.extend(population_summaries(config, yearmon, window, &observed)?);
        }
    }
    steps.extend(meta.require("all_monthly", monthly));

    debug!("Observed {} produced {} steps", yearmon, steps.len());
    Ok(steps)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CfsConfig, Options};
    use pretty_assertions::assert_eq;

    fn config() -> CfsConfig {
        CfsConfig::new("/src", "/out", Options::default()).unwrap()
    }

    fn targets_of(steps: &[Step]) -> Vec<String> {
        steps.iter().flat_map(|s| s.targets().iter().cloned()).collect()
    }

    #[test]
    fn test_window_availability() {
        let c = config();
        // inside the fit years the window must start in 1950 or later
        assert!(!window_available(&c, "195005", 6).unwrap());
        assert!(window_available(&c, "195006", 6).unwrap());
        // 1948-1949 lie outside the fit years
        assert!(window_available(&c, "194903", 3).unwrap());
        assert!(!window_available(&c, "194802", 3).unwrap());
    }

    #[test]
    fn test_historical_month_in_fit_years() {
        let c = config();
        let mut meta = MetaStepRegistry::new();
        let targets = targets_of(&monthly_observed(&c, "196404", &mut meta).unwrap());

        assert!(targets.contains(&"/out/gev_1950_2009/composite/composite_196404.nc".to_string()));
        assert!(!targets.iter().any(|t| t.contains("results_")));
        assert!(!targets.iter().any(|t| t.contains("composite_adjusted")));
        assert!(!targets.iter().any(|t| t.contains("/rp/")));
    }

    #[test]
    fn test_historical_month_after_fit_years() {
        let c = config();
        let mut meta = MetaStepRegistry::new();
        let targets = targets_of(&monthly_observed(&c, "201504", &mut meta).unwrap());

        assert!(targets.contains(&"/out/gev_1950_2009/rp/rp_201504.nc".to_string()));
        assert!(targets.contains(
            &"/out/gev_1950_2009/composite_adjusted_integrated/composite_adjusted_60mo_201504.nc"
                .to_string()
        ));
        assert!(!targets.iter().any(|t| t.contains("forcing")));
    }

    #[test]
    fn test_new_month_runs_model() {
        let c = config();
        let mut meta = MetaStepRegistry::new();
        let steps = monthly_observed(&c, "201701", &mut meta).unwrap();
        let targets = targets_of(&steps);

        assert!(targets.contains(&"/out/results/results_201701.nc".to_string()));
        assert!(targets.contains(&"/out/state/state_201702.nc".to_string()));
        assert!(targets.contains(&"/out/results_integrated/results_36mo_201701.nc".to_string()));
        assert_eq!(meta.len(), 3);
    }
}
