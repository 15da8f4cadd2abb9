//! NCEP Climate Forecast System v2 lagged-ensemble forecasts.
//!
//! Four runs a day are issued; the ensemble for a month is formed from the
//! runs of its last seven days, each predicting the following nine months.

use std::sync::Arc;

use chrono::NaiveDateTime;

use crate::commands::external;
use crate::dates;
use crate::error::{Error, Result};
use crate::grid::Grid;
use crate::paths::Vardef;
use crate::workflow::Step;

use super::{join, ForecastForcing, ObservedForcing};

const FORECAST_URL: &str = "https://nomads.ncep.noaa.gov/pub/data/nccf/com/cfs/prod";
const HINDCAST_FITS_URL: &str = "https://nomads.ncep.noaa.gov/pub/data/nccf/com/cfs/hindcast_fits.tar.gz";

const RUN_HOURS: [u32; 4] = [0, 6, 12, 18];
const ENSEMBLE_DAYS: u32 = 7;
const MAX_LEAD_MONTHS: u32 = 9;
const FORCING_VARS: [&str; 2] = ["T", "Pr"];

/// CFSv2 forecasts corrected against an observed dataset.
#[derive(Clone)]
pub struct Cfsv2 {
    source: String,
    grid: Grid,
    observed: Arc<dyn ObservedForcing>,
}

impl Cfsv2 {
    pub fn new(source: impl Into<String>, observed: Arc<dyn ObservedForcing>) -> Self {
        Self {
            source: source.into(),
            grid: Grid::global_half_degree(),
            observed,
        }
    }

    fn dir(&self) -> String {
        join(&self.source, "NCEP_CFSv2")
    }

    fn hindcast_dir(&self) -> String {
        join(&self.dir(), "hindcast_fits")
    }

    fn grib_name(target: &str, member: &str) -> String {
        format!("flxf.01.{}.{}.avrg.grib.grb2", member, target)
    }

    fn raw_grib(&self, target: &str, member: &str) -> String {
        join(
            &join(&join(&self.dir(), "raw"), member),
            &Self::grib_name(target, member),
        )
    }

    fn raw_nc(&self, target: &str, member: &str) -> String {
        join(
            &join(&self.dir(), "raw_nc"),
            &format!("cfsv2_trgt{}_fcst{}.nc", target, member),
        )
    }

    fn obs_fit_name(var: &str, month: u32) -> String {
        format!("obs_{}_month_{:02}.nc", var, month)
    }

    fn retro_fit_name(var: &str, target_month: u32, lead_months: u32) -> String {
        format!("retro_{}_month_{:02}_lead_{}.nc", var, target_month, lead_months)
    }
}

impl ForecastForcing for Cfsv2 {
    fn name(&self) -> &str {
        "CFSv2"
    }

    fn observed(&self) -> &dyn ObservedForcing {
        self.observed.as_ref()
    }

    fn ensemble_members(&self, yearmon: &str) -> Result<Vec<String>> {
        let year = dates::year_of(yearmon)?;
        let month = dates::month_of(yearmon)?;
        let last_day = dates::days_in_month(year, month);

        let mut members = Vec::new();
        for day in (last_day + 1 - ENSEMBLE_DAYS)..=last_day {
            for hour in RUN_HOURS {
                members.push(format!("{}{:02}{:02}", yearmon, day, hour));
            }
        }
        Ok(members)
    }

    fn member_issue_time(&self, member: &str) -> Result<NaiveDateTime> {
        if member.len() != 10 || !member.chars().all(|c| c.is_ascii_digit()) {
            return Err(Error::InvalidDate(member.to_string()));
        }
        NaiveDateTime::parse_from_str(&format!("{}00", member), "%Y%m%d%H%M")
            .map_err(|_| Error::InvalidDate(member.to_string()))
    }

    fn targets(&self, yearmon: &str) -> Result<Vec<String>> {
        (1..=MAX_LEAD_MONTHS)
            .map(|lead| dates::add_months(yearmon, lead as i64))
            .collect()
    }

    fn forcing_vars(&self) -> &[&'static str] {
        &FORCING_VARS
    }

    fn fit_obs(&self, var: &str, month: u32) -> String {
        join(&self.hindcast_dir(), &Self::obs_fit_name(var, month))
    }

    fn fit_retro(&self, var: &str, target_month: u32, lead_months: u32) -> String {
        join(
            &self.hindcast_dir(),
            &Self::retro_fit_name(var, target_month, lead_months),
        )
    }

    fn raw(&self, target: &str, member: &str, var: &str) -> Result<Vardef> {
        let file = self.raw_nc(target, member);
        match var {
            "T" => Ok(Vardef::new(file, "tmp2m").with_transform("[x-273.15]")),
            // kg/m^2/s to mm/month
            "Pr" => Ok(Vardef::new(file, "prate").with_transform("[x*2628000]")),
            other => Err(Error::argument(format!(
                "CFSv2 forecasts do not provide '{}'",
                other
            ))),
        }
    }

    fn corrected(&self, target: &str, member: &str) -> String {
        join(
            &join(&self.dir(), "corrected"),
            &format!("cfsv2_trgt{}_fcst{}.nc", target, member),
        )
    }

    fn prep_steps(&self, _yearmon: &str, target: &str, member: &str) -> Result<Vec<Step>> {
        let grib = self.raw_grib(target, member);
        let regridded = format!("{}.regrid", grib);
        let out = self.raw_nc(target, member);

        let url = format!(
            "{}/cfs.{}/{}/monthly_grib_01/{}",
            FORECAST_URL,
            &member[..8],
            &member[8..],
            Self::grib_name(target, member)
        );

        let convert = Step::builder()
            .with_target(&out)
            .with_dependency(&grib)
            .with_command(external::wgrib2_regrid(
                &self.grid,
                &grib,
                "(PRATE:surface|TMP:2 m above ground)",
                &regridded,
            ))
            .with_command(external::wgrib2_netcdf(&regridded, &out))
            .with_command(external::ncrename(
                &out,
                &[("PRATE_surface", "prate"), ("TMP_2maboveground", "tmp2m")],
            ))
            .with_command(external::rm(&[&regridded]))
            .with_comment(format!("CFSv2 member {} for {}", member, target))
            .build()?;

        Ok(vec![external::wget(&url, &grib)?, convert])
    }

    fn global_prep_steps(&self) -> Result<Vec<Step>> {
        let archive = join(&self.dir(), "hindcast_fits.tar.gz");

        let mut members = Vec::new();
        for var in FORCING_VARS {
            for month in 1..=12 {
                members.push(Self::obs_fit_name(var, month));
                for lead in 1..=MAX_LEAD_MONTHS {
                    members.push(Self::retro_fit_name(var, month, lead));
                }
            }
        }

        Ok(vec![
            external::wget(HINDCAST_FITS_URL, &archive)?,
            external::untar(&archive, &self.hindcast_dir(), &members)?,
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sources::Cpc;
    use pretty_assertions::assert_eq;
    use std::collections::BTreeSet;

    fn cfsv2() -> Cfsv2 {
        Cfsv2::new("/src", Arc::new(Cpc::new("/src")))
    }

    #[test]
    fn test_ensemble_of_january_2017() {
        let members = cfsv2().ensemble_members("201701").unwrap();
        assert_eq!(members.len(), 28);

        let days: BTreeSet<&str> = members.iter().map(|m| &m[..8]).collect();
        let expected: BTreeSet<&str> = [
            "20170125", "20170126", "20170127", "20170128", "20170129", "20170130", "20170131",
        ]
        .into_iter()
        .collect();
        assert_eq!(days, expected);
        assert_eq!(members[0], "2017012500");
        assert_eq!(members[27], "2017013118");
    }

    #[test]
    fn test_ensemble_of_february() {
        let members = cfsv2().ensemble_members("201602").unwrap();
        assert_eq!(members.first().unwrap(), "2016022300");
        assert_eq!(members.last().unwrap(), "2016022918");
    }

    #[test]
    fn test_targets() {
        let targets = cfsv2().targets("201705").unwrap();
        assert_eq!(targets.len(), 9);
        assert_eq!(targets[0], "201706");
        assert_eq!(targets[8], "201802");
    }

    #[test]
    fn test_member_issue_time() {
        let t = cfsv2().member_issue_time("2017012518").unwrap();
        assert_eq!(t.to_string(), "2017-01-25 18:00:00");
        assert!(cfsv2().member_issue_time("20170125").is_err());
    }

    #[test]
    fn test_raw_units() {
        let c = cfsv2();
        let t = c.raw("201702", "2017012500", "T").unwrap();
        assert_eq!(
            t.read_as("T"),
            "/src/NCEP_CFSv2/raw_nc/cfsv2_trgt201702_fcst2017012500.nc::tmp2m@[x-273.15]->T"
        );
        assert!(c.raw("201702", "2017012500", "Ws").is_err());
    }

    #[test]
    fn test_prep_url() {
        let steps = cfsv2().prep_steps("201701", "201702", "2017012506").unwrap();
        assert_eq!(
            steps[0].commands()[0].last().unwrap(),
            "https://nomads.ncep.noaa.gov/pub/data/nccf/com/cfs/prod/cfs.20170125/06/monthly_grib_01/flxf.01.2017012506.201702.avrg.grib.grb2"
        );
    }

    #[test]
    fn test_hindcast_fits_cover_every_lead() {
        let c = cfsv2();
        let steps = c.global_prep_steps().unwrap();
        let extracted = steps[1].targets();
        assert_eq!(extracted.len(), 2 * 12 * 10);
        assert!(extracted.contains(&c.fit_retro("Pr", 3, 9)));
        assert!(extracted.contains(&c.fit_obs("T", 12)));
    }
}
