//! Band area from cell counts

use rainband_core::raster::{Raster, RasterElement};
use rainband_core::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use tracing::warn;

/// Units an [`Area`] can be reported in
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AreaUnit {
    SquareMetres,
    SquareKilometres,
    Hectares,
    Acres,
    SquareMiles,
}

impl AreaUnit {
    pub const ALL: [AreaUnit; 5] = [
        AreaUnit::SquareMetres,
        AreaUnit::SquareKilometres,
        AreaUnit::Hectares,
        AreaUnit::Acres,
        AreaUnit::SquareMiles,
    ];

    /// Size of one unit in square metres
    pub fn square_metres(&self) -> f64 {
        match self {
            AreaUnit::SquareMetres => 1.0,
            AreaUnit::SquareKilometres => 1.0e6,
            AreaUnit::Hectares => 1.0e4,
            // International acre and statute mile
            AreaUnit::Acres => 4_046.856_422_4,
            AreaUnit::SquareMiles => 2_589_988.110_336,
        }
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            AreaUnit::SquareMetres => "m2",
            AreaUnit::SquareKilometres => "km2",
            AreaUnit::Hectares => "ha",
            AreaUnit::Acres => "acres",
            AreaUnit::SquareMiles => "mi2",
        }
    }
}

impl fmt::Display for AreaUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

impl std::str::FromStr for AreaUnit {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "m2" | "sqm" | "square_metres" | "square_meters" => Ok(AreaUnit::SquareMetres),
            "km2" | "sqkm" | "square_kilometres" | "square_kilometers" => {
                Ok(AreaUnit::SquareKilometres)
            }
            "ha" | "hectare" | "hectares" => Ok(AreaUnit::Hectares),
            "acre" | "acres" | "ac" => Ok(AreaUnit::Acres),
            "mi2" | "sqmi" | "square_miles" => Ok(AreaUnit::SquareMiles),
            other => Err(format!("unknown area unit '{other}' (m2, km2, ha, acres, mi2)")),
        }
    }
}

/// A ground area, stored in square metres
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default, Serialize)]
pub struct Area {
    square_metres: f64,
}

impl Area {
    pub fn from_square_metres(square_metres: f64) -> Self {
        Self { square_metres }
    }

    pub fn square_metres(&self) -> f64 {
        self.square_metres
    }

    /// Value of this area expressed in `unit`
    pub fn to(&self, unit: AreaUnit) -> f64 {
        self.square_metres / unit.square_metres()
    }

    /// This area in each of `units`, keyed by unit symbol
    pub fn in_units(&self, units: &[AreaUnit]) -> BTreeMap<String, f64> {
        units.iter().map(|u| (u.symbol().to_string(), self.to(*u))).collect()
    }
}

impl fmt::Display for Area {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.3} km2", self.to(AreaUnit::SquareKilometres))
    }
}

/// Length of one CRS unit in metres.
///
/// Rasters without an inspectable CRS are assumed to be in metres.
///
/// # Errors
/// `NonLinearUnit` when the CRS uses angular coordinates.
pub fn metres_per_unit<T: RasterElement>(raster: &Raster<T>) -> Result<f64> {
    let Some(crs) = raster.crs() else {
        warn!("Raster has no CRS, treating map units as metres");
        return Ok(1.0);
    };
    match crs.unit() {
        Some(unit) => unit
            .metres_per_unit()
            .ok_or_else(|| Error::NonLinearUnit(crs.identifier())),
        None => {
            warn!("Cannot determine the unit of {}, treating map units as metres", crs);
            Ok(1.0)
        }
    }
}

/// Ground area of a single cell
pub fn cell_area<T: RasterElement>(raster: &Raster<T>) -> Result<Area> {
    let scale = metres_per_unit(raster)?;
    Ok(Area::from_square_metres(raster.transform().cell_area() * scale * scale))
}

/// Area covered by cells equal to `code`.
///
/// Computed as the cell count times the cell area, so the raster should be in
/// an equal-area projection for the result to be meaningful.
///
/// # Errors
/// `NonLinearUnit` when the raster CRS is geographic.
pub fn band_area(classified: &Raster<i32>, code: i32) -> Result<Area> {
    let cell = cell_area(classified)?;
    let count = classified.count_equal(code);
    Ok(Area::from_square_metres(count as f64 * cell.square_metres()))
}

/// Cell count and area of one class
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ClassArea {
    pub code: i32,
    pub cells: usize,
    pub area: Area,
}

/// Cell count and area of every code present, sorted by code
pub fn class_areas(classified: &Raster<i32>) -> Result<Vec<ClassArea>> {
    let cell = cell_area(classified)?;

    let mut counts: BTreeMap<i32, usize> = BTreeMap::new();
    for &value in classified.data().iter() {
        if !classified.is_nodata(value) {
            *counts.entry(value).or_default() += 1;
        }
    }

    Ok(counts
        .into_iter()
        .map(|(code, cells)| ClassArea {
            code,
            cells,
            area: Area::from_square_metres(cells as f64 * cell.square_metres()),
        })
        .collect())
}
