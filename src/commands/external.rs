//! Download, archive and format-conversion helpers.
//!
//! Functions returning [`Step`] describe a whole rule; functions returning
//! [`Command`] are building blocks for rules assembled elsewhere.

use std::path::Path;

use crate::error::Result;
use crate::grid::Grid;
use crate::workflow::step::{Command, Step};

use super::{command, require_some};

/// Downloads `url` to `output`.
pub fn wget(url: &str, output: &str) -> Result<Step> {
    Step::builder()
        .with_target(output)
        .with_command(["wget", "--quiet", "--output-document", output, url])
        .build()
}

/// Extracts `members` of a zip archive into `dir`.
pub fn unzip<S: AsRef<str>>(archive: &str, dir: &str, members: &[S]) -> Result<Step> {
    require_some("unzip", "member", members)?;

    let mut cmd = command(&["unzip", "-o", archive]);
    cmd.extend(members.iter().map(|m| m.as_ref().to_string()));
    cmd.extend(["-d".to_string(), dir.to_string()]);

    Step::builder()
        .with_targets(members.iter().map(|m| join(dir, m.as_ref())))
        .with_dependency(archive)
        .with_command(cmd)
        .build()
}

/// Extracts `members` of a gzipped tarball into `dir`.
pub fn untar<S: AsRef<str>>(archive: &str, dir: &str, members: &[S]) -> Result<Step> {
    require_some("tar", "member", members)?;

    let mut cmd = command(&["tar", "xzf", archive, "-C", dir]);
    cmd.extend(members.iter().map(|m| m.as_ref().to_string()));

    Step::builder()
        .with_targets(members.iter().map(|m| join(dir, m.as_ref())))
        .with_dependency(archive)
        .with_command(cmd)
        .build()
}

/// Resamples a raster onto `grid` and writes netCDF.
pub fn gdalwarp_to_grid(grid: &Grid, input: &str, output: &str, resampling: &str) -> Result<Step> {
    let mut cmd = command(&["gdalwarp", "-overwrite", "-of", "netCDF", "-r", resampling, "-tr"]);
    cmd.extend(grid.gdal_tr().split_whitespace().map(str::to_string));
    cmd.push("-te".to_string());
    cmd.extend(grid.gdal_te().split_whitespace().map(str::to_string));
    cmd.extend([input.to_string(), output.to_string()]);

    Step::builder()
        .with_target(output)
        .with_dependency(input)
        .with_command(cmd)
        .build()
}

/// Copies a raster into compressed netCDF-4.
pub fn gdal_translate(input: &str, output: &str) -> Result<Step> {
    Step::builder()
        .with_target(output)
        .with_dependency(input)
        .with_command(["gdal_translate", "-of", "netCDF", "-co", "FORMAT=NC4", input, output])
        .build()
}

/// Burns polygon attribute `field` into a raster on `grid`.
pub fn gdal_rasterize(grid: &Grid, polygons: &str, field: &str, output: &str) -> Result<Step> {
    let mut cmd = command(&["gdal_rasterize", "-a", field, "-of", "netCDF", "-a_nodata", "-1", "-tr"]);
    cmd.extend(grid.gdal_tr().split_whitespace().map(str::to_string));
    cmd.push("-te".to_string());
    cmd.extend(grid.gdal_te().split_whitespace().map(str::to_string));
    cmd.extend([polygons.to_string(), output.to_string()]);

    Step::builder()
        .with_target(output)
        .with_dependency(polygons)
        .with_command(cmd)
        .build()
}

/// Extracts the GRIB messages matching `pattern` and interpolates them
/// onto `grid`.
pub fn wgrib2_regrid(grid: &Grid, input: &str, pattern: &str, output: &str) -> Command {
    let mut cmd = command(&["wgrib2", input, "-match", pattern, "-new_grid_winds", "earth", "-new_grid", "latlon"]);
    cmd.extend(grid.wgrib_def().split_whitespace().map(str::to_string));
    cmd.push(output.to_string());
    cmd
}

/// Converts GRIB2 to netCDF.
pub fn wgrib2_netcdf(input: &str, output: &str) -> Command {
    command(&["wgrib2", input, "-netcdf", output])
}

/// Renames variables of a netCDF file in place.
pub fn ncrename(file: &str, renames: &[(&str, &str)]) -> Command {
    let mut cmd = command(&["ncrename", "-O"]);
    for (from, to) in renames {
        cmd.extend(["-v".to_string(), format!("{},{}", from, to)]);
    }
    cmd.push(file.to_string());
    cmd
}

/// Copies `input` to `output` with the global `yearmon` attribute set.
pub fn ncatted_yearmon(input: &str, output: &str, yearmon: &str) -> Result<Step> {
    Step::builder()
        .with_target(output)
        .with_dependency(input)
        .with_command([
            "ncatted",
            "-O",
            "-a",
            &format!("yearmon,global,o,c,{}", yearmon),
            input,
            output,
        ])
        .build()
}

/// Deflates a netCDF file.
pub fn nccopy(input: &str, output: &str) -> Command {
    command(&["nccopy", "-d1", "-s", input, output])
}

pub fn mv(from: &str, to: &str) -> Command {
    command(&["mv", from, to])
}

pub fn rm<S: AsRef<str>>(paths: &[S]) -> Command {
    let mut cmd = command(&["rm", "-f"]);
    cmd.extend(paths.iter().map(|p| p.as_ref().to_string()));
    cmd
}

pub fn touch(path: &str) -> Command {
    command(&["touch", path])
}

fn join(dir: &str, name: &str) -> String {
    Path::new(dir).join(name).to_string_lossy().into_owned()
}
