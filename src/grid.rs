//! Grid Descriptor
//!
//! A rectangular latitude-longitude grid, and its two encodings for the
//! external tools: GDAL's `-tr`/`-te` pair (cell size and outer extent) and
//! wgrib2's `-new_grid latlon` definition (first cell center, count, step).

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// A regular lat-lon grid.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Grid {
    pub name: String,
    pub xmin: f64,
    pub ymin: f64,
    pub xmax: f64,
    pub ymax: f64,
    pub nx: u32,
    pub ny: u32,
}

impl Grid {
    /// Creates a grid, rejecting empty or inverted extents.
    pub fn new(
        name: impl Into<String>,
        (xmin, ymin, xmax, ymax): (f64, f64, f64, f64),
        (nx, ny): (u32, u32),
    ) -> Result<Self> {
        let name = name.into();
        if xmax <= xmin || ymax <= ymin {
            return Err(Error::argument(format!("grid '{}' has an empty extent", name)));
        }
        if nx == 0 || ny == 0 {
            return Err(Error::argument(format!("grid '{}' has no cells", name)));
        }
        Ok(Self { name, xmin, ymin, xmax, ymax, nx, ny })
    }

    /// The half-degree global grid used by the observed and forecast forcing.
    pub fn global_half_degree() -> Self {
        Self {
            name: "global_0_5_degree".to_string(),
            xmin: -180.0,
            ymin: -90.0,
            xmax: 180.0,
            ymax: 90.0,
            nx: 720,
            ny: 360,
        }
    }

    /// Cell width.
    pub fn dx(&self) -> f64 {
        (self.xmax - self.xmin) / self.nx as f64
    }

    /// Cell height.
    pub fn dy(&self) -> f64 {
        (self.ymax - self.ymin) / self.ny as f64
    }

    /// GDAL target resolution: `"dx dy"`.
    pub fn gdal_tr(&self) -> String {
        format!("{} {}", format_number(self.dx()), format_number(self.dy()))
    }

    /// GDAL target extent: `"xmin ymin xmax ymax"`.
    pub fn gdal_te(&self) -> String {
        format!(
            "{} {} {} {}",
            format_number(self.xmin),
            format_number(self.ymin),
            format_number(self.xmax),
            format_number(self.ymax)
        )
    }

    /// wgrib2 grid definition: `"x0:nx:dx y0:ny:dy"` where `x0`/`y0` are the
    /// centers of the first column and row.
    pub fn wgrib_def(&self) -> String {
        let x0 = self.xmin + self.dx() / 2.0;
        let y0 = self.ymin + self.dy() / 2.0;
        format!(
            "{}:{}:{} {}:{}:{}",
            format_number(x0),
            self.nx,
            format_number(self.dx()),
            format_number(y0),
            self.ny,
            format_number(self.dy())
        )
    }
}

/// Formats a coordinate without trailing zeros (`-179.750000` → `-179.75`,
/// `1.000000` → `1`).
fn format_number(value: f64) -> String {
    let fixed = format!("{:.6}", value);
    let trimmed = fixed.trim_end_matches('0').trim_end_matches('.');
    match trimmed {
        "-0" | "" => "0".to_string(),
        other => other.to_string(),
    }
}
