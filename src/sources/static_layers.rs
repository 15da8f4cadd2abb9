//! Static layers: soils, terrain, boundaries and sector inputs.
//!
//! Rasters are brought onto the model grid once, during global
//! preparation; vector layers are used as published.

use crate::commands::{bin, external};
use crate::error::Result;
use crate::grid::Grid;
use crate::paths::{Method, Vardef};
use crate::workflow::Step;

use super::{join, AgricultureStatic, Crop, ElectricityStatic, PolygonLayer, StaticData};

const SHAPEFILE_PARTS: [&str; 4] = ["shp", "shx", "dbf", "prj"];

fn shapefile_members(stem: &str) -> Vec<String> {
    SHAPEFILE_PARTS
        .iter()
        .map(|ext| format!("{}.{}", stem, ext))
        .collect()
}

/// Downloads a raster and resamples it onto the grid as one variable.
fn gridded_raster(grid: &Grid, url: &str, raw: &str, out: &Vardef, resampling: &str) -> Result<Vec<Step>> {
    let var = out.var.as_deref().unwrap_or("Band1");
    let warp = external::gdalwarp_to_grid(grid, raw, &out.file, resampling)?;
    let rename = Step::builder()
        .with_target(&out.file)
        .with_command(external::ncrename(&out.file, &[("Band1", var)]))
        .build()?;

    Ok(vec![external::wget(url, raw)?, warp.merge(&[rename])?])
}

/// Soil, terrain, boundary and population layers.
#[derive(Debug, Clone)]
pub struct DefaultStatic {
    source: String,
    grid: Grid,
}

impl DefaultStatic {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            grid: Grid::global_half_degree(),
        }
    }

    fn dir(&self, dataset: &str) -> String {
        join(&self.source, dataset)
    }

    fn gadm_archive(&self) -> String {
        join(&self.dir("GADM"), "gadm36_levels_shp.zip")
    }

    fn population_archive(&self) -> String {
        join(&self.dir("GPW"), "gpw-v4-population-count-rev11_2020_30_min_tif.zip")
    }
}

impl StaticData for DefaultStatic {
    fn wc(&self) -> Vardef {
        Vardef::new(join(&self.dir("ISRIC"), "wise_30sec_v1_tawc.nc"), "Wc")
    }

    fn flowdir(&self) -> Vardef {
        Vardef::new(join(&self.dir("UNH_Data"), "g_network.nc"), "flowdir")
    }

    fn elevation(&self) -> Vardef {
        Vardef::new(join(&self.dir("ISciences"), "elevation_half_degree.nc"), "elevation")
    }

    fn countries(&self) -> PolygonLayer {
        PolygonLayer {
            file: join(&self.dir("GADM"), "gadm36_0.shp"),
            id_field: "GID_0".to_string(),
        }
    }

    fn provinces(&self) -> PolygonLayer {
        PolygonLayer {
            file: join(&self.dir("GADM"), "gadm36_1.shp"),
            id_field: "GID_1".to_string(),
        }
    }

    fn population_density(&self) -> String {
        join(&self.dir("GPW"), "gpw_v4_population_count_rev11_2020_30_min.tif")
    }

    fn global_prep_steps(&self) -> Result<Vec<Step>> {
        let mut steps = Vec::new();

        steps.extend(gridded_raster(
            &self.grid,
            "https://files.isric.org/public/wise/wise_30sec_v1_tawc.tif",
            &join(&self.dir("ISRIC"), "wise_30sec_v1_tawc.tif"),
            &self.wc(),
            "average",
        )?);

        let network_raw = join(&self.dir("UNH_Data"), "g_network.asc");
        let flowdir = self.flowdir();
        steps.push(external::wget("https://wsag.unh.edu/Stn-30/0.5/g_network.asc", &network_raw)?);
        steps.push(
            external::gdal_translate(&network_raw, &flowdir.file)?.merge(&[Step::builder()
                .with_target(&flowdir.file)
                .with_command(external::ncrename(&flowdir.file, &[("Band1", "flowdir")]))
                .build()?])?,
        );

        steps.extend(gridded_raster(
            &self.grid,
            "https://topotools.cr.usgs.gov/gmted_viewer/data/Grid_ZipFiles/mn30_grd.tif",
            &join(&self.dir("ISciences"), "gmted2010_mn30.tif"),
            &self.elevation(),
            "average",
        )?);

        let gadm = self.gadm_archive();
        steps.push(external::wget(
            "https://biogeo.ucdavis.edu/data/gadm3.6/gadm36_levels_shp.zip",
            &gadm,
        )?);
        let mut boundaries = shapefile_members("gadm36_0");
        boundaries.extend(shapefile_members("gadm36_1"));
        steps.push(external::unzip(&gadm, &self.dir("GADM"), &boundaries)?);

        let population = self.population_archive();
        steps.push(external::wget(
            "https://sedac.ciesin.columbia.edu/downloads/data/gpw-v4/gpw-v4-population-count-rev11/gpw-v4-population-count-rev11_2020_30_min_tif.zip",
            &population,
        )?);
        steps.push(external::unzip(
            &population,
            &self.dir("GPW"),
            &["gpw_v4_population_count_rev11_2020_30_min.tif"],
        )?);

        Ok(steps)
    }
}

/// HydroBASINS, GRanD, Aqueduct and the Global Power Plant Database.
#[derive(Debug, Clone)]
pub struct ElectricityData {
    source: String,
    grid: Grid,
}

impl ElectricityData {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            grid: Grid::global_half_degree(),
        }
    }

    fn dir(&self, dataset: &str) -> String {
        join(&self.source, dataset)
    }
}

impl ElectricityStatic for ElectricityData {
    fn basins(&self) -> PolygonLayer {
        PolygonLayer {
            file: join(&self.dir("HydroBASINS"), "hybas_lev05_v1c.shp"),
            id_field: "HYBAS_ID".to_string(),
        }
    }

    fn basin_downstream_ids(&self) -> String {
        join(&self.dir("HydroBASINS"), "basin_downstream_ids.csv")
    }

    fn dams(&self) -> String {
        join(&self.dir("GRanD"), "GRanD_dams_v1_1.shp")
    }

    fn water_stress(&self) -> String {
        join(&self.dir("Aqueduct"), "baseline_water_stress.nc")
    }

    fn power_plants(&self) -> String {
        join(&self.dir("GPPD"), "global_power_plant_database.csv")
    }

    fn global_prep_steps(&self) -> Result<Vec<Step>> {
        let mut steps = Vec::new();

        let basins = self.basins();
        let hybas = join(&self.dir("HydroBASINS"), "hybas_lev05_v1c.zip");
        steps.push(external::wget(
            "https://data.hydrosheds.org/file/HydroBASINS/standard/hybas_lev05_v1c.zip",
            &hybas,
        )?);
        steps.push(external::unzip(&hybas, &self.dir("HydroBASINS"), &shapefile_members("hybas_lev05_v1c"))?);
        steps.push(
            Step::builder()
                .with_target(self.basin_downstream_ids())
                .with_dependency(&basins.file)
                .with_command([
                    bin("utils/hydrobasins/downstream_ids.R"),
                    "--basins".to_string(),
                    basins.file.clone(),
                    "--output".to_string(),
                    self.basin_downstream_ids(),
                ])
                .build()?,
        );

        let grand = join(&self.dir("GRanD"), "GRanD_Version_1_1.zip");
        steps.push(external::wget(
            "https://sedac.ciesin.columbia.edu/downloads/data/grand-v1/grand-v1-dams-rev01/GRanD_Version_1_1.zip",
            &grand,
        )?);
        steps.push(external::unzip(&grand, &self.dir("GRanD"), &shapefile_members("GRanD_dams_v1_1"))?);

        let aqueduct = join(&self.dir("Aqueduct"), "aqueduct_baseline.zip");
        steps.push(external::wget(
            "https://wri-projects.s3.amazonaws.com/Aqueduct30/finalData/Y2019M07D12_Aqueduct30_V01.zip",
            &aqueduct,
        )?);
        steps.push(external::unzip(&aqueduct, &self.dir("Aqueduct"), &shapefile_members("aqueduct_baseline"))?);
        steps.push(external::gdal_rasterize(
            &self.grid,
            &join(&self.dir("Aqueduct"), "aqueduct_baseline.shp"),
            "bws_score",
            &self.water_stress(),
        )?);

        let gppd = join(&self.dir("GPPD"), "globalpowerplantdatabasev120.zip");
        steps.push(external::wget(
            "https://wri-dataportal-prod.s3.amazonaws.com/manual/global_power_plant_database_v_1_3.zip",
            &gppd,
        )?);
        steps.push(external::unzip(&gppd, &self.dir("GPPD"), &["global_power_plant_database.csv"])?);

        Ok(steps)
    }
}

/// MIRCA2000 calendars, SPAM2010 production and yield models.
#[derive(Debug, Clone)]
pub struct AgricultureData {
    source: String,
    grid: Grid,
}

impl AgricultureData {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            grid: Grid::global_half_degree(),
        }
    }

    fn dir(&self, dataset: &str) -> String {
        join(&self.source, dataset)
    }

    fn spam_raw(&self, method: Method) -> String {
        join(&self.dir("SPAM2010"), &format!("spam2010_production_{}.tif", method))
    }
}

impl AgricultureStatic for AgricultureData {
    fn crop_calendar(&self, method: Method) -> String {
        join(&self.dir("MIRCA2000"), &format!("crop_calendar_{}.txt", method))
    }

    fn production(&self, method: Method) -> String {
        join(&self.dir("SPAM2010"), &format!("production_{}.nc", method))
    }

    fn yield_model(&self, crop: Crop) -> String {
        join(&self.dir("ag_models"), &format!("{}.rds", crop))
    }

    fn global_prep_steps(&self) -> Result<Vec<Step>> {
        let mut steps = Vec::new();

        let mirca = join(&self.dir("MIRCA2000"), "CELL_SPECIFIC_CROPPING_CALENDARS.zip");
        steps.push(external::wget(
            "https://www.uni-frankfurt.de/45218039/CELL_SPECIFIC_CROPPING_CALENDARS.zip",
            &mirca,
        )?);
        let calendars: Vec<String> = Method::ALL
            .iter()
            .map(|m| format!("crop_calendar_{}.txt", m))
            .collect();
        steps.push(external::unzip(&mirca, &self.dir("MIRCA2000"), &calendars)?);

        let spam = join(&self.dir("SPAM2010"), "spam2010v2r0_global_prod.geotiff.zip");
        steps.push(external::wget(
            "https://s3.amazonaws.com/mapspam/2010/v2.0/geotiff/spam2010v2r0_global_prod.geotiff.zip",
            &spam,
        )?);
        let rasters: Vec<String> = Method::ALL
            .iter()
            .map(|m| format!("spam2010_production_{}.tif", m))
            .collect();
        steps.push(external::unzip(&spam, &self.dir("SPAM2010"), &rasters)?);
        for method in Method::ALL {
            steps.push(external::gdalwarp_to_grid(
                &self.grid,
                &self.spam_raw(method),
                &self.production(method),
                "sum",
            )?);
        }

        let models = join(&self.dir("ag_models"), "ag_models.tar.gz");
        steps.push(external::wget(
            "https://github.com/isciences/wsim/releases/download/ag_models/ag_models.tar.gz",
            &models,
        )?);
        let files: Vec<String> = Crop::ALL.iter().map(|c| format!("{}.rds", c)).collect();
        steps.push(external::untar(&models, &self.dir("ag_models"), &files)?);

        Ok(steps)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    fn targets(steps: &[Step]) -> BTreeSet<String> {
        steps.iter().flat_map(|s| s.targets().iter().cloned()).collect()
    }

    #[test]
    fn test_default_layers_are_prepared() {
        let s = DefaultStatic::new("/src");
        let produced = targets(&StaticData::global_prep_steps(&s).unwrap());

        for file in [
            s.wc().file,
            s.flowdir().file,
            s.elevation().file,
            s.countries().file,
            s.provinces().file,
            s.population_density(),
        ] {
            assert!(produced.contains(&file), "{} not produced", file);
        }
    }

    #[test]
    fn test_gridded_raster_renames_band() {
        let s = DefaultStatic::new("/src");
        let steps = StaticData::global_prep_steps(&s).unwrap();
        let wc = steps
            .iter()
            .find(|st| st.targets().contains(&s.wc().file))
            .unwrap();
        assert_eq!(wc.commands().len(), 2);
        assert_eq!(wc.commands()[1], vec!["ncrename", "-O", "-v", "Band1,Wc", "/src/ISRIC/wise_30sec_v1_tawc.nc"]);
    }

    #[test]
    fn test_electricity_layers_are_prepared() {
        let e = ElectricityData::new("/src");
        let produced = targets(&ElectricityStatic::global_prep_steps(&e).unwrap());
        for file in [
            e.basins().file,
            e.basin_downstream_ids(),
            e.dams(),
            e.water_stress(),
            e.power_plants(),
        ] {
            assert!(produced.contains(&file), "{} not produced", file);
        }
    }

    #[test]
    fn test_agriculture_layers_are_prepared() {
        let a = AgricultureData::new("/src");
        let produced = targets(&AgricultureStatic::global_prep_steps(&a).unwrap());
        for method in Method::ALL {
            assert!(produced.contains(&a.crop_calendar(method)));
            assert!(produced.contains(&a.production(method)));
        }
        for crop in Crop::ALL {
            assert!(produced.contains(&a.yield_model(crop)));
        }
    }
}
