//! FLDAS monthly land-surface outputs used in place of a model run.

use crate::commands::{bin, external};
use crate::dates;
use crate::error::Result;
use crate::grid::Grid;
use crate::paths::Vardef;
use crate::workflow::Step;

use super::{join, ObservedForcing};

const FLDAS_URL: &str = "https://hydro1.gesdisc.eosdis.nasa.gov/data/FLDAS/FLDAS_NOAH01_C_GL_M.001";

/// Variables of the converted FLDAS files that stand in for LSM results.
pub const RESULT_VARS: [&str; 5] = ["E", "P_net", "PETmE", "RO_mm", "Ws"];

/// FLDAS Noah 0.1 degree monthly, aggregated to the model grid.
#[derive(Debug, Clone)]
pub struct Fldas {
    source: String,
    grid: Grid,
}

impl Fldas {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            grid: Grid::global_half_degree(),
        }
    }

    fn dir(&self) -> String {
        join(&self.source, "FLDAS")
    }

    fn raw_name(yearmon: &str) -> String {
        format!("FLDAS_NOAH01_C_GL_M.A{}.001.nc", yearmon)
    }

    fn raw(&self, yearmon: &str) -> String {
        join(&join(&self.dir(), "raw"), &Self::raw_name(yearmon))
    }

    /// Converted file holding forcing and land-surface variables.
    pub fn converted(&self, yearmon: &str) -> String {
        join(&self.dir(), &format!("fldas_{}.nc", yearmon))
    }
}

impl ObservedForcing for Fldas {
    fn name(&self) -> &str {
        "FLDAS"
    }

    fn grid(&self) -> &Grid {
        &self.grid
    }

    fn precip_monthly(&self, yearmon: &str) -> Vardef {
        Vardef::new(self.converted(yearmon), "Pr")
    }

    fn temp_monthly(&self, yearmon: &str) -> Vardef {
        Vardef::new(self.converted(yearmon), "T")
    }

    fn p_wetdays(&self, _yearmon: &str) -> Result<Option<Vardef>> {
        Ok(None)
    }

    fn mean_p_wetdays(&self, _month: u32) -> Option<Vardef> {
        None
    }

    fn prep_steps(&self, yearmon: &str) -> Result<Vec<Step>> {
        let year = dates::year_of(yearmon)?;
        let raw = self.raw(yearmon);
        let out = self.converted(yearmon);

        let download = external::wget(
            &format!("{}/{}/{}", FLDAS_URL, year, Self::raw_name(yearmon)),
            &raw,
        )?;

        let convert = Step::builder()
            .with_target(&out)
            .with_dependency(&raw)
            .with_command([
                bin("utils/fldas/read_fldas.R"),
                "--input".to_string(),
                raw.clone(),
                "--yearmon".to_string(),
                yearmon.to_string(),
                "--output".to_string(),
                out.clone(),
            ])
            .with_comment(format!("FLDAS conversion for {}", yearmon))
            .build()?;

        Ok(vec![download, convert])
    }

    fn global_prep_steps(&self) -> Result<Vec<Step>> {
        Ok(Vec::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_wetdays() {
        let fldas = Fldas::new("/src");
        assert!(fldas.p_wetdays("201701").unwrap().is_none());
        assert!(fldas.mean_p_wetdays(1).is_none());
    }

    #[test]
    fn test_forcing_read_from_converted_file() {
        let fldas = Fldas::new("/src");
        assert_eq!(fldas.precip_monthly("201701").file, "/src/FLDAS/fldas_201701.nc");
        assert_eq!(fldas.temp_monthly("201701").var.as_deref(), Some("T"));
    }

    #[test]
    fn test_prep_steps() {
        let fldas = Fldas::new("/src");
        let steps = fldas.prep_steps("201701").unwrap();
        assert_eq!(steps.len(), 2);
        assert!(steps[0].commands()[0]
            .last()
            .unwrap()
            .ends_with("/2017/FLDAS_NOAH01_C_GL_M.A201701.001.nc"));
        assert!(steps[1].targets().contains("/src/FLDAS/fldas_201701.nc"));
    }
}
