//! Agriculture overlay: crop yield anomalies per cultivation method.

use log::debug;

use crate::commands::{bin, ZonalStats};
use crate::config::Config;
use crate::dates;
use crate::error::{Error, Result};
use crate::paths::{Basis, Facets, Method, Sector};
use crate::phases::actions::{
    compute_return_periods, create_forcing_file, csv, run_lsm, Realization,
};
use crate::sources::{AgricultureStatic, Crop};
use crate::workflow::{MetaStepRegistry, Step};

/// Months of observed anomalies preceding a yield estimate.
pub const OBSERVED_MONTHS: u32 = 23;

fn data(config: &dyn Config) -> Result<&dyn AgricultureStatic> {
    config.agriculture_data().ok_or_else(|| {
        Error::contract(format!(
            "configuration '{}' provides no agriculture data",
            config.name()
        ))
    })
}

/// Standard anomalies the yield models read for `yearmon`: the observed
/// months ending at `yearmon`, then the ensemble summary of each forecast
/// target when forecasts are included.
pub fn anomaly_inputs(config: &dyn Config, yearmon: &str, with_forecast: bool) -> Result<Vec<String>> {
    let ws = config.workspace();
    let mut inputs = dates::rolling_window(yearmon, OBSERVED_MONTHS)?
        .iter()
        .map(|month| ws.standard_anomaly(&Facets::at(month.as_str())))
        .collect::<Result<Vec<_>>>()?;

    if with_forecast {
        for target in config.forecast_targets(yearmon)? {
            inputs.push(ws.standard_anomaly(&Realization::summary(&target).facets(yearmon, 1))?);
        }
    }
    Ok(inputs)
}

/// Producers of the observed anomalies preceding `yearmon`.
///
/// Anomalies of the fit years come from spinup. Other historical months
/// only need their return periods; later months also need forcing and a
/// model run. Steps shared with the observed phase are identical and
/// collapse when the planner removes repeats.
pub fn observed_anomaly_steps(config: &dyn Config, yearmon: &str) -> Result<Vec<Step>> {
    let observed = Realization::Observed;
    let mut steps = Vec::new();
    for month in dates::rolling_window(yearmon, OBSERVED_MONTHS)? {
        if config.is_fit_yearmon(&month)? {
            continue;
        }
        if !config.is_historical(&month)? {
            steps.extend(config.observed().prep_steps(&month)?);
            steps.push(create_forcing_file(config, &month)?);
            if config.should_run_lsm(&month) {
                steps.push(run_lsm(config, &month, &observed)?);
            }
            steps.extend(config.result_postprocess_steps(&month)?);
        }
        steps.push(compute_return_periods(config, &month, 1, &observed)?);
    }
    Ok(steps)
}

/// Gridded yield anomalies of every crop grown with `method`.
pub fn yield_anomaly(
    config: &dyn Config,
    yearmon: &str,
    method: Method,
    anomalies: &[String],
) -> Result<Step> {
    let data = data(config)?;
    let output = config
        .workspace()
        .yield_anomaly(&Facets::at(yearmon).sector(Sector::Agriculture).method(method))?;
    let calendar = data.crop_calendar(method);
    let production = data.production(method);

    let mut cmd = vec![
        bin("utils/agriculture/yield_anomaly.R"),
        "--calendar".to_string(),
        calendar.clone(),
        "--production".to_string(),
        production.clone(),
    ];
    let mut deps = vec![calendar, production];
    for crop in Crop::ALL {
        let model = data.yield_model(crop);
        cmd.push("--model".to_string());
        cmd.push(format!("{}={}", crop.name(), model));
        deps.push(model);
    }
    for anom in anomalies {
        cmd.push("--anom".to_string());
        cmd.push(anom.clone());
    }
    cmd.extend([
        "--yearmon".to_string(),
        yearmon.to_string(),
        "--output".to_string(),
        output.clone(),
    ]);
    deps.extend(anomalies.iter().cloned());

    Ok(Step::builder()
        .with_target(output)
        .with_dependencies(deps)
        .with_command(cmd)
        .build()?
        .with_comment(format!("{} yield anomalies for {}", method, yearmon)))
}

/// Production-weighted yield anomalies per country.
pub fn country_yield_anomaly(config: &dyn Config, yearmon: &str, method: Method) -> Result<Step> {
    let data = data(config)?;
    let ws = config.workspace();
    let countries = config.static_data().countries();
    let f = Facets::at(yearmon).sector(Sector::Agriculture).method(method);

    let gridded = ws.yield_anomaly(&f)?;
    let output = csv(&ws.yield_anomaly(&f.basis(Basis::Country))?);
    ZonalStats::new(&countries.file, &countries.id_field, output)
        .with_raster("yield_anom", &gridded, None)
        .with_weights("production", &data.production(method))
        .with_stat("yield_anom=weighted_mean(yield_anom)")
        .build()
}

/// Yield anomaly steps of every cultivation method for `yearmon`.
pub fn agriculture_steps(
    config: &dyn Config,
    yearmon: &str,
    meta: &mut MetaStepRegistry,
    with_forecast: bool,
) -> Result<Vec<Step>> {
    let anomalies = anomaly_inputs(config, yearmon, with_forecast)?;
    debug!(
        "Yield anomalies for {} read {} anomaly files",
        yearmon,
        anomalies.len()
    );

    let mut steps = observed_anomaly_steps(config, yearmon)?;
    for method in Method::ALL {
        steps.push(yield_anomaly(config, yearmon, method, &anomalies)?);
        let summary = country_yield_anomaly(config, yearmon, method)?;
        steps.extend(meta.require("agriculture", vec![summary]));
    }
    Ok(steps)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CfsConfig, FldasConfig, Options};
    use pretty_assertions::assert_eq;

    fn config() -> CfsConfig {
        let options = Options {
            sectors: vec![Sector::Agriculture],
            ..Options::default()
        };
        CfsConfig::new("/src", "/out", options).unwrap()
    }

    #[test]
    fn test_anomaly_inputs_cover_observed_window() {
        let c = config();
        let observed = anomaly_inputs(&c, "201701", false).unwrap();
        assert_eq!(observed.len(), 23);
        assert_eq!(observed[0], "/out/gev_1950_2009/anom/anom_201503.nc");
        assert_eq!(observed[22], "/out/gev_1950_2009/anom/anom_201701.nc");

        let with_forecast = anomaly_inputs(&c, "201701", true).unwrap();
        assert_eq!(with_forecast.len(), 32);
        assert_eq!(
            with_forecast[23],
            "/out/gev_1950_2009/anom_summary/anom_summary_201701_trgt201702.nc"
        );
    }

    #[test]
    fn test_yield_anomaly_per_method() {
        let c = config();
        let mut meta = MetaStepRegistry::new();
        let steps = agriculture_steps(&c, "201701", &mut meta, false).unwrap();
        let targets: Vec<&String> = steps.iter().flat_map(|s| s.targets()).collect();

        let yield_steps = steps
            .iter()
            .filter(|s| s.targets().iter().any(|t| t.contains("yield_anom")))
            .count();
        assert_eq!(yield_steps, 4);
        assert!(targets.contains(
            &&"/out/agriculture/yield_anom_irrigated/yield_anom_irrigated_201701.nc".to_string()
        ));
        assert!(targets.contains(
            &&"/out/agriculture/country_yield_anom_rainfed/country_yield_anom_rainfed_201701.csv"
                .to_string()
        ));
        assert_eq!(meta.names().collect::<Vec<_>>(), vec!["agriculture"]);
    }

    #[test]
    fn test_yield_models_are_dependencies() {
        let c = config();
        let anomalies = anomaly_inputs(&c, "201701", false).unwrap();
        let step = yield_anomaly(&c, "201701", Method::Rainfed, &anomalies).unwrap();
        // calendar, production, six crop models and the anomalies
        assert_eq!(step.dependencies().len(), 2 + 6 + 23);
    }

    #[test]
    fn test_observed_window_has_producers() {
        let c = config();
        let steps = observed_anomaly_steps(&c, "201701").unwrap();
        let targets: Vec<&String> = steps.iter().flat_map(|s| s.targets()).collect();
        for month in dates::rolling_window("201701", OBSERVED_MONTHS).unwrap() {
            let anom = c.workspace().standard_anomaly(&Facets::at(month.as_str())).unwrap();
            assert!(targets.contains(&&anom), "no producer for {}", anom);
        }
    }

    #[test]
    fn test_fit_years_left_to_spinup() {
        let c = config();
        let steps = observed_anomaly_steps(&c, "196404").unwrap();
        assert!(steps.is_empty());
    }

    #[test]
    fn test_requires_agriculture_data() {
        let c = FldasConfig::new("/src", "/out", Options::default()).unwrap();
        let mut meta = MetaStepRegistry::new();
        assert!(matches!(
            agriculture_steps(&c, "201701", &mut meta, false),
            Err(Error::Contract(_))
        ));
    }
}
