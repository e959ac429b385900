//! Sampling a source grid at fractional pixel positions
//!
//! Positions are in the pixel space of [`Raster::geo_to_pixel`], where the
//! center of cell (col, row) sits at (col + 0.5, row + 0.5).

use rainband_core::raster::Raster;
use serde::{Deserialize, Serialize};

/// Interpolation used when a grid is reprojected or resized
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Resampling {
    /// Value of the cell containing the position
    Nearest,
    /// Distance-weighted mean of the four surrounding cell centers
    #[default]
    Bilinear,
}

impl Resampling {
    /// Sample `raster` at fractional pixel position (col, row).
    ///
    /// Returns `None` outside the grid or where the result would depend on a
    /// no-data cell.
    pub fn sample(&self, raster: &Raster<f64>, col: f64, row: f64) -> Option<f64> {
        match self {
            Resampling::Nearest => nearest(raster, col, row),
            Resampling::Bilinear => bilinear(raster, col, row),
        }
    }
}

impl std::str::FromStr for Resampling {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "nearest" | "near" => Ok(Resampling::Nearest),
            "bilinear" | "linear" => Ok(Resampling::Bilinear),
            other => Err(format!("unknown resampling '{other}' (nearest, bilinear)")),
        }
    }
}

impl std::fmt::Display for Resampling {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Resampling::Nearest => write!(f, "nearest"),
            Resampling::Bilinear => write!(f, "bilinear"),
        }
    }
}

fn inside(raster: &Raster<f64>, col: f64, row: f64) -> bool {
    col >= 0.0 && row >= 0.0 && col < raster.cols() as f64 && row < raster.rows() as f64
}

fn valid(raster: &Raster<f64>, row: usize, col: usize) -> Option<f64> {
    let value = raster.data()[[row, col]];
    (!raster.is_nodata(value)).then_some(value)
}

fn nearest(raster: &Raster<f64>, col: f64, row: f64) -> Option<f64> {
    if !inside(raster, col, row) {
        return None;
    }
    valid(raster, row.floor() as usize, col.floor() as usize)
}

fn bilinear(raster: &Raster<f64>, col: f64, row: f64) -> Option<f64> {
    if !inside(raster, col, row) {
        return None;
    }

    // Shift to cell-center space; the outer half cell clamps to the edge
    let x = col - 0.5;
    let y = row - 0.5;
    let x0 = x.floor();
    let y0 = y.floor();
    let fx = x - x0;
    let fy = y - y0;

    let max_col = raster.cols() as f64 - 1.0;
    let max_row = raster.rows() as f64 - 1.0;
    let c0 = x0.clamp(0.0, max_col) as usize;
    let c1 = (x0 + 1.0).clamp(0.0, max_col) as usize;
    let r0 = y0.clamp(0.0, max_row) as usize;
    let r1 = (y0 + 1.0).clamp(0.0, max_row) as usize;

    let taps = [
        (r0, c0, (1.0 - fx) * (1.0 - fy)),
        (r0, c1, fx * (1.0 - fy)),
        (r1, c0, (1.0 - fx) * fy),
        (r1, c1, fx * fy),
    ];

    let mut sum = 0.0;
    for (r, c, weight) in taps {
        if weight <= 0.0 {
            continue;
        }
        sum += valid(raster, r, c)? * weight;
    }
    Some(sum)
}
