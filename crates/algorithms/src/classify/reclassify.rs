//! Raster reclassification into integer bands
//!
//! Maps continuous values onto codes through a table of half-open intervals.

use crate::maybe_rayon::*;
use rainband_core::raster::Raster;
use rainband_core::{Algorithm, Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

/// No-data value of classified rasters; no class may use it
pub const CLASS_NODATA: i32 = i32::MIN;

/// A reclassification entry mapping `[min, max)` to `code`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ReclassEntry {
    /// Minimum value (inclusive)
    pub min: f64,
    /// Maximum value (exclusive)
    pub max: f64,
    /// Output code for this class
    pub code: i32,
}

impl ReclassEntry {
    /// Create a new reclassification entry
    pub fn new(min: f64, max: f64, code: i32) -> Self {
        Self { min, max, code }
    }

    /// Whether `value` falls in `[min, max)`
    pub fn contains(&self, value: f64) -> bool {
        value >= self.min && value < self.max
    }
}

impl fmt::Display for ReclassEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}) -> {}", self.min, self.max, self.code)
    }
}

/// Ordered, non-overlapping classification table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClassTable {
    entries: Vec<ReclassEntry>,
}

impl ClassTable {
    /// Build a table, rejecting invalid interval lists
    pub fn new(entries: Vec<ReclassEntry>) -> Result<Self> {
        let table = Self { entries };
        table.validate()?;
        Ok(table)
    }

    /// Annual precipitation bands in millimetres:
    /// `[0, 200) -> 1`, `[200, 400) -> 2`, `[400, 5000) -> 3`
    pub fn precipitation_bands() -> Self {
        Self {
            entries: vec![
                ReclassEntry::new(0.0, 200.0, 1),
                ReclassEntry::new(200.0, 400.0, 2),
                ReclassEntry::new(400.0, 5000.0, 3),
            ],
        }
    }

    pub fn entries(&self) -> &[ReclassEntry] {
        &self.entries
    }

    /// Check the table is non-empty, finite, ascending and non-overlapping
    pub fn validate(&self) -> Result<()> {
        if self.entries.is_empty() {
            return Err(Error::InvalidClassification("empty class table".into()));
        }

        for entry in &self.entries {
            if !entry.min.is_finite() || !entry.max.is_finite() {
                return Err(Error::InvalidClassification(format!("non-finite bound in {entry}")));
            }
            if entry.min >= entry.max {
                return Err(Error::InvalidClassification(format!("empty interval {entry}")));
            }
            if entry.code == CLASS_NODATA {
                return Err(Error::InvalidClassification(format!(
                    "code {} is reserved for no-data in {entry}",
                    CLASS_NODATA
                )));
            }
        }

        for pair in self.entries.windows(2) {
            if pair[0].max > pair[1].min {
                return Err(Error::InvalidClassification(format!(
                    "{} overlaps or precedes {}",
                    pair[1], pair[0]
                )));
            }
        }
        Ok(())
    }

    /// Code of the first interval containing `value`
    pub fn code_for(&self, value: f64) -> Option<i32> {
        self.entries.iter().find(|e| e.contains(value)).map(|e| e.code)
    }
}

impl Default for ClassTable {
    fn default() -> Self {
        Self::precipitation_bands()
    }
}

impl fmt::Display for ClassTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .entries
            .iter()
            .map(|e| format!("{}:{}:{}", e.min, e.max, e.code))
            .collect();
        write!(f, "{}", parts.join(","))
    }
}

/// Parses `min:max:code` entries separated by commas, e.g. `0:200:1,200:400:2`
impl std::str::FromStr for ClassTable {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let entries = s
            .split(',')
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .map(|part| {
                let fields: Vec<&str> = part.split(':').map(str::trim).collect();
                let bad = || {
                    Error::InvalidClassification(format!("expected min:max:code, got '{part}'"))
                };
                if fields.len() != 3 {
                    return Err(bad());
                }
                let min = fields[0].parse::<f64>().map_err(|_| bad())?;
                let max = fields[1].parse::<f64>().map_err(|_| bad())?;
                let code = fields[2].parse::<i32>().map_err(|_| bad())?;
                Ok(ReclassEntry::new(min, max, code))
            })
            .collect::<Result<Vec<_>>>()?;
        Self::new(entries)
    }
}

/// Reclassification stage
#[derive(Debug, Clone, Default)]
pub struct Reclassify;

impl Algorithm for Reclassify {
    type Input = Raster<f64>;
    type Output = Raster<i32>;
    type Params = ClassTable;
    type Error = Error;

    fn name(&self) -> &'static str {
        "Reclassify"
    }

    fn description(&self) -> &'static str {
        "Assign integer band codes to continuous values by interval table"
    }

    fn execute(&self, input: Self::Input, params: Self::Params) -> Result<Self::Output> {
        reclassify(&input, &params)
    }
}

/// Reclassify raster values based on a classification table.
///
/// Each valid cell gets the code of the first entry with `min <= value < max`.
/// No-data cells and values outside every interval become [`CLASS_NODATA`], the
/// no-data value of the output.
///
/// # Errors
/// `InvalidClassification` when the table fails [`ClassTable::validate`];
/// checked before any cell is read.
///
/// # Example
/// ```ignore
/// let table: ClassTable = "0:200:1,200:400:2,400:5000:3".parse()?;
/// let bands = reclassify(&precipitation, &table)?;
/// ```
pub fn reclassify(raster: &Raster<f64>, table: &ClassTable) -> Result<Raster<i32>> {
    table.validate()?;

    let (rows, cols) = raster.shape();
    let nodata = CLASS_NODATA;

    let data: Vec<i32> = (0..rows)
        .into_par_iter()
        .flat_map(|row| {
            let mut row_data = vec![nodata; cols];
            for (col, cell) in row_data.iter_mut().enumerate() {
                let value = raster.data()[[row, col]];
                if raster.is_nodata(value) {
                    continue;
                }
                if let Some(code) = table.code_for(value) {
                    *cell = code;
                }
            }
            row_data
        })
        .collect();

    let mut output = raster.with_same_meta::<i32>(rows, cols);
    output.set_nodata(Some(nodata));
    *output.data_mut() = ndarray::Array2::from_shape_vec((rows, cols), data)
        .map_err(|e| Error::Other(e.to_string()))?;

    debug!("Reclassified {}x{} with {}", cols, rows, table);
    Ok(output)
}
