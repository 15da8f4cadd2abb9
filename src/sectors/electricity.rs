//! Electric power overlay.
//!
//! Flows are aggregated to hydrological basins and routed downstream, fitted
//! per basin, and turned into loss factors for the power plants each basin
//! supplies. Plant losses are then summarized per country, province and
//! basin.

use log::{debug, info};

use crate::commands::{bin, wsim_anom, wsim_fit, wsim_flow, wsim_polygon_summary, Integrate, ZonalStats};
use crate::commands::external;
use crate::config::Config;
use crate::dates;
use crate::error::{Error, Result};
use crate::paths::{read_vars, Basis, Facets, Sector, Vardef};
use crate::phases::actions::{csv, member_weights, EnsembleMembers, Realization, SUMMARY_QUANTILES};
use crate::sources::ElectricityStatic;
use crate::workflow::{MetaStepRegistry, Step};

/// Windows over which basin flows are integrated and fitted.
pub const BASIN_WINDOWS: [u32; 3] = [12, 24, 36];

/// Statistics of plant losses reported per polygon.
const LOSS_STATS: [&str; 2] = ["sum(loss_mw)", "sum(capacity_mw)"];

fn data(config: &dyn Config) -> Result<&dyn ElectricityStatic> {
    config.electricity_data().ok_or_else(|| {
        Error::contract(format!(
            "configuration '{}' provides no electric power data",
            config.name()
        ))
    })
}

fn basin(f: Facets) -> Facets {
    f.basis(Basis::Basin).sector(Sector::ElectricPower)
}

fn flow_var(window: u32) -> &'static str {
    if window == 1 {
        "Bt_RO"
    } else {
        "Bt_RO_sum"
    }
}

fn storage_table(config: &dyn Config) -> String {
    config
        .workspace()
        .sector_spinup(Sector::ElectricPower, "basin_upstream_storage.csv")
}

fn water_stress_table(config: &dyn Config) -> String {
    config
        .workspace()
        .sector_spinup(Sector::ElectricPower, "basin_water_stress.csv")
}

fn enriched_plants(config: &dyn Config) -> String {
    config
        .workspace()
        .sector_spinup(Sector::ElectricPower, "power_plants_enriched.csv")
}

/// Runoff summed over each basin and accumulated downstream.
pub fn basin_results(config: &dyn Config, yearmon: &str, realization: &Realization) -> Result<Step> {
    let data = data(config)?;
    let ws = config.workspace();
    let basins = data.basins();

    let pixel = ws.results(&realization.facets(yearmon, 1))?;
    let f = basin(realization.facets(yearmon, 1));
    let table = csv(&ws.results(&f.clone().temporary())?);
    let output = ws.results(&f)?;

    let zonal = ZonalStats::new(&basins.file, &basins.id_field, &table)
        .with_raster("RO_m3", &pixel, Some("RO_m3"))
        .with_stat("RO_m3=sum(RO_m3)")
        .build()?;
    let flow = wsim_flow(&table, &data.basin_downstream_ids(), "RO_m3", &output)?;
    let cleanup = Step::builder()
        .with_target(&output)
        .with_consumes([table.as_str()])
        .with_command(external::rm(&[&table]))
        .build()?;

    Ok(zonal
        .merge(&[flow, cleanup])?
        .with_comment(format!("Basin flows for {} {:?}", yearmon, realization)))
}

/// Integrates basin flows over the `window` months ending at the valid
/// month.
pub fn basin_integrate(
    config: &dyn Config,
    yearmon: &str,
    window: u32,
    realization: &Realization,
) -> Result<Step> {
    let ws = config.workspace();
    let valid = realization.valid_yearmon(yearmon);

    let mut inputs = Vec::new();
    for month in dates::rolling_window(valid, window)? {
        let f = match realization {
            Realization::Member { model, member, .. } if month.as_str() > yearmon => {
                Facets::at(yearmon).forecast(&month, model, member)
            }
            Realization::Summary { .. } => {
                return Err(Error::contract("basin flows are integrated per member"))
            }
            _ => Facets::at(month.as_str()),
        };
        inputs.push(read_vars(&ws.results(&basin(f))?, &["Bt_RO"]));
    }

    Integrate::new(ws.results(&basin(realization.facets(yearmon, window)))?)
        .with_stats(["sum::Bt_RO"])
        .with_inputs(inputs)
        .with_attrs([format!("yearmon={}", valid)])
        .build()
}

/// Return periods of integrated basin flows.
pub fn basin_return_periods(
    config: &dyn Config,
    yearmon: &str,
    window: u32,
    realization: &Realization,
) -> Result<Step> {
    let ws = config.workspace();
    let var = flow_var(window);
    let month = realization.fit_month(yearmon)?;
    let f = basin(realization.facets(yearmon, window));

    let fit = ws.fit_obs(var, &basin(Facets::default().window(window).month(month)), None)?;
    let obs = read_vars(&ws.results(&f)?, &[var]);
    wsim_anom(&[fit], &[obs], Some(&ws.return_period(&f)?), None)
}

/// Loss factors per basin from flow return periods, upstream storage and
/// water stress.
pub fn loss_factors(config: &dyn Config, yearmon: &str, realization: &Realization) -> Result<Step> {
    let ws = config.workspace();
    let output = ws.loss_factors(&basin(realization.facets(yearmon, 1)))?;

    let mut cmd = vec![bin("utils/electricity/basin_loss_factors.R")];
    let mut deps = Vec::new();
    for window in BASIN_WINDOWS {
        let rp = ws.return_period(&basin(realization.facets(yearmon, window)))?;
        cmd.push("--rp".to_string());
        cmd.push(Vardef::new(&rp, flow_var(window)).read_as(&format!("Bt_RO_{}mo", window)));
        deps.push(rp);
    }
    let storage = storage_table(config);
    let stress = water_stress_table(config);
    cmd.extend([
        "--storage".to_string(),
        storage.clone(),
        "--water_stress".to_string(),
        stress.clone(),
        "--output".to_string(),
        output.clone(),
    ]);
    deps.extend([storage, stress]);

    Step::builder()
        .with_target(output)
        .with_dependencies(deps)
        .with_command(cmd)
        .build()
}

/// Plant-level losses and their summaries per country, province and basin.
///
/// `basin_losses` reads the loss factor variable, possibly renamed.
pub fn plant_losses(
    config: &dyn Config,
    yearmon: &str,
    realization: &Realization,
    basin_losses: &str,
) -> Result<Vec<Step>> {
    let data = data(config)?;
    let ws = config.workspace();
    let statics = config.static_data();
    let f = realization.facets(yearmon, 1).sector(Sector::ElectricPower);
    let plants = enriched_plants(config);
    let plant_table = csv(&ws.loss_factors(&f.clone().basis(Basis::PowerPlant))?);

    let mut steps = vec![Step::builder()
        .with_target(&plant_table)
        .with_dependencies([plants.as_str(), basin_losses])
        .with_command([
            bin("utils/electricity/plant_losses.R").as_str(),
            "--plants",
            &plants,
            "--basin_losses",
            basin_losses,
            "--output",
            &plant_table,
        ])
        .build()?];

    for (basis, layer) in [
        (Basis::Country, statics.countries()),
        (Basis::Province, statics.provinces()),
        (Basis::Basin, data.basins()),
    ] {
        let output = csv(&ws.loss_factors(&f.clone().basis(basis))?);
        steps.push(wsim_polygon_summary(
            &plant_table,
            &layer.id_field,
            &LOSS_STATS,
            &output,
        )?);
    }
    Ok(steps)
}

fn window_available(config: &dyn Config, target: &str, window: u32) -> Result<bool> {
    let start = dates::add_months(target, -(window as i64 - 1))?;
    Ok(start >= config.first_historical_yearmon())
}

/// Basin flows, fits, storage and plant attributes over the historical
/// record.
pub fn electricity_spinup(config: &dyn Config) -> Result<Vec<Step>> {
    let data = data(config)?;
    let ws = config.workspace();
    let statics = config.static_data();
    let (first_year, last_year) = config.historical_years();
    let (fit_start, fit_end) = config.fit_years();
    info!("Generating electric power spinup steps");

    let mut steps = Vec::new();
    for yearmon in config.historical_yearmons() {
        steps.push(basin_results(config, &yearmon, &Realization::Observed)?);
    }

    let history = dates::format_range(
        &config.first_historical_yearmon(),
        &config.last_historical_yearmon(),
        1,
    );
    let monthly_flows = read_vars(&ws.results(&basin(Facets::at(history)))?, &["Bt_RO"]);

    for window in BASIN_WINDOWS {
        let outputs = dates::available_yearmon_range(window, None, first_year, last_year)?;
        steps.push(
            Integrate::new(ws.results(&basin(Facets::at(outputs).window(window)))?)
                .with_stats(["sum::Bt_RO"])
                .with_inputs([monthly_flows.as_str()])
                .with_window(window)
                .build()?,
        );

        for month in 1..=12 {
            let range = dates::available_yearmon_range(window, Some(month), fit_start, fit_end)?;
            let input = read_vars(&ws.results(&basin(Facets::at(range).window(window)))?, &["Bt_RO_sum"]);
            let output = ws.fit_obs(
                "Bt_RO_sum",
                &basin(Facets::default().window(window).month(month)),
                None,
            )?;
            steps.push(wsim_fit(config.distribution(), &[input], &output, window, &[])?);
        }
    }

    for year in first_year..=last_year {
        let months: Vec<String> = dates::yearmons_of_years(year, year)
            .iter()
            .map(|ym| Ok(read_vars(&ws.results(&basin(Facets::at(ym.as_str())))?, &["Bt_RO"])))
            .collect::<Result<_>>()?;
        steps.push(
            Integrate::new(ws.results_annual(&basin(Facets::default().year(year)))?)
                .with_stats(["sum::Bt_RO"])
                .with_inputs(months)
                .with_attrs([format!("year={}", year)])
                .build()?,
        );
    }

    let annual: Vec<String> = (fit_start..=fit_end)
        .map(|year| {
            Ok(read_vars(
                &ws.results_annual(&basin(Facets::default().year(year)))?,
                &["Bt_RO_sum"],
            ))
        })
        .collect::<Result<_>>()?;
    let annual_fit = ws.fit_obs("Bt_RO", &basin(Facets::default()), Some("sum"))?;
    steps.push(wsim_fit(config.distribution(), &annual, &annual_fit, 12, &[])?);

    let basins = data.basins();
    let storage = storage_table(config);
    let downstream = data.basin_downstream_ids();
    let dams = data.dams();
    steps.push(
        Step::builder()
            .with_target(&storage)
            .with_dependencies([basins.file.as_str(), dams.as_str(), downstream.as_str(), annual_fit.as_str()])
            .with_command([
                bin("utils/electricity/basin_upstream_storage.R").as_str(),
                "--basins",
                &basins.file,
                "--dams",
                &dams,
                "--downstream",
                &downstream,
                "--flow_fit",
                &annual_fit,
                "--output",
                &storage,
            ])
            .with_comment("Upstream reservoir storage per basin")
            .build()?,
    );

    steps.push(
        ZonalStats::new(&basins.file, &basins.id_field, water_stress_table(config))
            .with_raster("bws", &data.water_stress(), None)
            .with_stat("baseline_water_stress=mean(bws)")
            .build()?,
    );

    let plants = enriched_plants(config);
    let source_plants = data.power_plants();
    let countries = statics.countries();
    let provinces = statics.provinces();
    steps.push(
        Step::builder()
            .with_target(&plants)
            .with_dependencies([
                source_plants.as_str(),
                countries.file.as_str(),
                provinces.file.as_str(),
                basins.file.as_str(),
            ])
            .with_command([
                bin("utils/electricity/assign_plant_ids.R").as_str(),
                "--plants",
                &source_plants,
                "--countries",
                &countries.file,
                "--provinces",
                &provinces.file,
                "--basins",
                &basins.file,
                "--output",
                &plants,
            ])
            .with_comment("Power plants with country, province and basin ids")
            .build()?,
    );

    debug!("Electric power spinup produced {} steps", steps.len());
    Ok(steps)
}

/// Basin flows, return periods and losses for observed month `yearmon`.
pub fn electricity_observed(
    config: &dyn Config,
    yearmon: &str,
    meta: &mut MetaStepRegistry,
) -> Result<Vec<Step>> {
    let observed = Realization::Observed;
    let mut steps = Vec::new();

    if !config.is_historical(yearmon)? {
        steps.push(basin_results(config, yearmon, &observed)?);
        for window in BASIN_WINDOWS {
            if window_available(config, yearmon, window)? {
                steps.push(basin_integrate(config, yearmon, window, &observed)?);
            }
        }
    }

    let mut complete = true;
    for window in BASIN_WINDOWS {
        if window_available(config, yearmon, window)? {
            steps.push(basin_return_periods(config, yearmon, window, &observed)?);
        } else {
            complete = false;
        }
    }

    if complete {
        steps.push(loss_factors(config, yearmon, &observed)?);
        let losses = config
            .workspace()
            .loss_factors(&basin(observed.facets(yearmon, 1)))?;
        let reader = read_vars(&losses, &["loss_factor"]);
        let summaries = plant_losses(config, yearmon, &observed, &reader)?;
        steps.extend(meta.require("electric_power", summaries));
    }
    Ok(steps)
}

/// Member basin flows and losses, and their ensemble summary, for the
/// forecasts issued at `yearmon`.
pub fn electricity_forecast(
    config: &dyn Config,
    yearmon: &str,
    meta: &mut MetaStepRegistry,
    ensembles: &EnsembleMembers,
) -> Result<Vec<Step>> {
    let ws = config.workspace();
    let mut steps = Vec::new();

    for target in config.forecast_targets(yearmon)? {
        let mut available = true;
        for window in BASIN_WINDOWS {
            available &= window_available(config, &target, window)?;
        }
        if !available {
            debug!("Skipping basin losses for target {}", target);
            continue;
        }

        let mut covering: EnsembleMembers = Vec::new();
        let mut member_losses = Vec::new();
        for (model, members) in ensembles {
            if !config.forecast(model)?.targets(yearmon)?.contains(&target) {
                continue;
            }
            for member in members {
                let realization = Realization::member(&target, model, member);
                steps.push(basin_results(config, yearmon, &realization)?);
                for window in BASIN_WINDOWS {
                    steps.push(basin_integrate(config, yearmon, window, &realization)?);
                    steps.push(basin_return_periods(config, yearmon, window, &realization)?);
                }
                steps.push(loss_factors(config, yearmon, &realization)?);
                member_losses.push(read_vars(
                    &ws.loss_factors(&basin(realization.facets(yearmon, 1)))?,
                    &["loss_factor"],
                ));
            }
            covering.push((model.clone(), members.clone()));
        }
        if member_losses.is_empty() {
            continue;
        }

        let summary = Realization::summary(&target);
        let summary_losses = ws.loss_factors(&basin(summary.facets(yearmon, 1)))?;
        steps.push(
            Integrate::new(&summary_losses)
                .with_stats(SUMMARY_QUANTILES)
                .with_inputs(member_losses)
                .with_weights(member_weights(&covering))
                .build()?
                .with_comment(format!("Basin loss summary for {} target {}", yearmon, target)),
        );

        let reader = Vardef::new(&summary_losses, "loss_factor_q50").read_as("loss_factor");
        let summaries = plant_losses(config, yearmon, &summary, &reader)?;
        steps.extend(meta.require("electric_power", summaries));
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
            sectors: vec![Sector::ElectricPower],
            ..Options::default()
        };
        CfsConfig::new("/src", "/out", options).unwrap()
    }

    #[test]
    fn test_basin_results_consume_temporary_table() {
        let c = config();
        let step = basin_results(&c, "201701", &Realization::Observed).unwrap();
        let tmp = "/out/.tmp/electric_power/basin_results/basin_results_201701.csv";

        assert_eq!(
            step.targets().iter().collect::<Vec<_>>(),
            vec!["/out/electric_power/basin_results/basin_results_201701.nc"]
        );
        assert!(step.consumes().contains(tmp));
        assert!(!step.dependencies().contains(tmp));
        assert_eq!(step.commands().len(), 3);
        assert_eq!(step.commands()[2], vec!["rm", "-f", tmp]);
    }

    #[test]
    fn test_observed_losses_summarized() {
        let c = config();
        let mut meta = MetaStepRegistry::new();
        let steps = electricity_observed(&c, "201701", &mut meta).unwrap();
        let targets: Vec<&String> = steps.iter().flat_map(|s| s.targets()).collect();

        assert!(targets.contains(&&"/out/electric_power/gev_1950_2009/basin_loss/basin_loss_201701.nc".to_string()));
        assert!(targets.contains(&&"/out/electric_power/gev_1950_2009/basin_loss/basin_loss_201701.csv".to_string()));
        assert!(targets.contains(&&"/out/electric_power/gev_1950_2009/country_loss/country_loss_201701.csv".to_string()));
        assert_eq!(meta.names().collect::<Vec<_>>(), vec!["electric_power"]);
    }

    #[test]
    fn test_spinup_fits_each_window_and_month() {
        let c = config();
        let steps = electricity_spinup(&c).unwrap();
        let targets: Vec<&String> = steps.iter().flat_map(|s| s.targets()).collect();

        assert!(targets.contains(&&"/out/electric_power/gev_1950_2009/basin_fits/basin_Bt_RO_sum_36mo_month_11.nc".to_string()));
        assert!(targets.contains(&&"/out/electric_power/gev_1950_2009/basin_fits/basin_Bt_RO_annual_sum.nc".to_string()));
        assert!(targets.contains(&&"/out/electric_power/spinup/basin_upstream_storage.csv".to_string()));
        assert!(targets.contains(&&"/out/electric_power/basin_results_annual/basin_results_1948.nc".to_string()));
    }

    #[test]
    fn test_requires_electricity_data() {
        let c = FldasConfig::new("/src", "/out", Options::default()).unwrap();
        assert!(matches!(electricity_spinup(&c), Err(Error::Contract(_))));
    }
}
