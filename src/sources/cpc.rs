//! NOAA CPC observations: GHCN+CAMS temperature and PREC/L precipitation.

use crate::commands::{bin, external};
use crate::dates;
use crate::error::Result;
use crate::grid::Grid;
use crate::paths::Vardef;
use crate::workflow::Step;

use super::{join, ObservedForcing};

const GHCN_CAMS_URL: &str = "https://ftp.cpc.ncep.noaa.gov/wd51yf/GHCN_CAMS/ghcn_cams_1948_cur_2.5.grb";
const PRECL_URL: &str = "https://ftp.cpc.ncep.noaa.gov/precip/50yr/gauge/0.5deg/format_bin_lnx";
const WETDAYS_URL: &str = "https://ftp.cpc.ncep.noaa.gov/precip/CPC_UNI_PRCP/GAUGE_GLB/wetdays_ltmean.tar.gz";

/// GHCN+CAMS and PREC/L, regridded to the model grid.
#[derive(Debug, Clone)]
pub struct Cpc {
    source: String,
    grid: Grid,
}

impl Cpc {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            grid: Grid::global_half_degree(),
        }
    }

    fn ghcn_cams_dir(&self) -> String {
        join(&self.source, "NCEP/GHCN_CAMS")
    }

    fn precl_dir(&self) -> String {
        join(&self.source, "NCEP/PRECL")
    }

    fn wetdays_dir(&self) -> String {
        join(&self.source, "NCEP/wetdays_ltmean")
    }

    fn ghcn_cams_raw(&self) -> String {
        join(&self.ghcn_cams_dir(), "raw/ghcn_cams_1948_cur_2.5.grb")
    }

    fn precl_raw_name(year: i32) -> String {
        format!("precl_mon_v1.0.lnx.{}.gri0.5m.gz", year)
    }

    fn precl_raw(&self, year: i32) -> String {
        join(&join(&self.precl_dir(), "raw"), &Self::precl_raw_name(year))
    }

    fn wetdays_name(month: u32) -> String {
        format!("wetdays_ltmean_month_{:02}.nc", month)
    }

    fn temp_steps(&self, yearmon: &str) -> Result<Vec<Step>> {
        let raw = self.ghcn_cams_raw();
        let out = self.temp_monthly(yearmon).file;
        let regridded = join(&self.ghcn_cams_dir(), &format!("ghcn_cams_{}.grb2", yearmon));

        let convert = Step::builder()
            .with_target(&out)
            .with_dependency(&raw)
            .with_command(external::wgrib2_regrid(
                &self.grid,
                &raw,
                &format!(":d={}", yearmon),
                &regridded,
            ))
            .with_command(external::wgrib2_netcdf(&regridded, &out))
            .with_command(external::ncrename(&out, &[("TMP_2maboveground", "T")]))
            .with_command(external::rm(&[&regridded]))
            .with_comment(format!("GHCN+CAMS temperature for {}", yearmon))
            .build()?;

        Ok(vec![external::wget(GHCN_CAMS_URL, &raw)?, convert])
    }

    fn precip_steps(&self, yearmon: &str) -> Result<Vec<Step>> {
        let year = dates::year_of(yearmon)?;
        let month = dates::month_of(yearmon)?;
        let raw = self.precl_raw(year);
        let out = self.precip_monthly(yearmon).file;

        let download = external::wget(
            &format!("{}/{}", PRECL_URL, Self::precl_raw_name(year)),
            &raw,
        )?;

        let convert = Step::builder()
            .with_target(&out)
            .with_dependency(&raw)
            .with_command([
                bin("utils/noaa_global_leaky_bucket/read_binary_grid.R"),
                "--input".to_string(),
                raw.clone(),
                "--month".to_string(),
                month.to_string(),
                "--var".to_string(),
                "Pr".to_string(),
                "--output".to_string(),
                out.clone(),
            ])
            .with_comment(format!("PREC/L precipitation for {}", yearmon))
            .build()?;

        Ok(vec![download, convert])
    }
}

impl ObservedForcing for Cpc {
    fn name(&self) -> &str {
        "NCEP"
    }

    fn grid(&self) -> &Grid {
        &self.grid
    }

    fn precip_monthly(&self, yearmon: &str) -> Vardef {
        Vardef::new(join(&self.precl_dir(), &format!("precl_{}.nc", yearmon)), "Pr")
    }

    fn temp_monthly(&self, yearmon: &str) -> Vardef {
        Vardef::new(
            join(&self.ghcn_cams_dir(), &format!("ghcn_cams_{}.nc", yearmon)),
            "T",
        )
        .with_transform("[x-273.15]")
    }

    fn p_wetdays(&self, yearmon: &str) -> Result<Option<Vardef>> {
        Ok(self.mean_p_wetdays(dates::month_of(yearmon)?))
    }

    fn mean_p_wetdays(&self, month: u32) -> Option<Vardef> {
        Some(Vardef::new(
            join(&self.wetdays_dir(), &Self::wetdays_name(month)),
            "pWetDays",
        ))
    }

    fn prep_steps(&self, yearmon: &str) -> Result<Vec<Step>> {
        let mut steps = self.temp_steps(yearmon)?;
        steps.extend(self.precip_steps(yearmon)?);
        Ok(steps)
    }

    fn global_prep_steps(&self) -> Result<Vec<Step>> {
        let archive = join(&self.source, "NCEP/wetdays_ltmean.tar.gz");
        let members: Vec<String> = (1..=12).map(Self::wetdays_name).collect();
        Ok(vec![
            external::wget(WETDAYS_URL, &archive)?,
            external::untar(&archive, &self.wetdays_dir(), &members)?,
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_vardefs() {
        let cpc = Cpc::new("/mnt/source");
        assert_eq!(
            cpc.precip_monthly("201701").to_string(),
            "/mnt/source/NCEP/PRECL/precl_201701.nc::Pr"
        );
        assert_eq!(
            cpc.temp_monthly("201701").to_string(),
            "/mnt/source/NCEP/GHCN_CAMS/ghcn_cams_201701.nc::T@[x-273.15]"
        );
        assert_eq!(
            cpc.p_wetdays("201703").unwrap().unwrap().to_string(),
            "/mnt/source/NCEP/wetdays_ltmean/wetdays_ltmean_month_03.nc::pWetDays"
        );
    }

    #[test]
    fn test_prep_steps_produce_monthly_inputs() {
        let cpc = Cpc::new("/mnt/source");
        let steps = cpc.prep_steps("201701").unwrap();
        let targets: Vec<&String> = steps.iter().flat_map(|s| s.targets()).collect();

        assert!(targets.contains(&&cpc.temp_monthly("201701").file));
        assert!(targets.contains(&&cpc.precip_monthly("201701").file));
        assert!(targets.contains(&&"/mnt/source/NCEP/PRECL/raw/precl_mon_v1.0.lnx.2017.gri0.5m.gz".to_string()));
    }

    #[test]
    fn test_yearly_download_shared_by_months() {
        let cpc = Cpc::new("/mnt/source");
        let jan = cpc.prep_steps("201701").unwrap();
        let feb = cpc.prep_steps("201702").unwrap();
        // identical downloads collapse during planning
        assert_eq!(jan[0], feb[0]);
        assert_eq!(jan[2], feb[2]);
        assert_ne!(jan[3], feb[3]);
    }

    #[test]
    fn test_global_prep_extracts_all_months() {
        let cpc = Cpc::new("/mnt/source");
        let steps = cpc.global_prep_steps().unwrap();
        assert_eq!(steps[1].targets().len(), 12);
        for m in 1..=12 {
            let wetdays = cpc.mean_p_wetdays(m).unwrap();
            assert!(steps[1].targets().contains(&wetdays.file));
        }
    }
}
