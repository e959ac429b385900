//! # Rainband Core
//!
//! Core types and I/O for the rainband precipitation-band pipeline.
//!
//! This crate provides:
//! - `Raster<T>`: Generic georeferenced grid
//! - `GeoTransform`: Affine transformation for georeferencing
//! - `CRS` and `CoordTransformer`: Coordinate reference systems and point transforms
//! - `FeatureCollection`: Polygon features with attributes
//! - GeoTIFF / GeoJSON I/O with configurable export policy

pub mod crs;
pub mod error;
pub mod io;
pub mod raster;
pub mod vector;

pub use crs::{CoordTransformer, CrsUnit, CRS};
pub use error::{Error, Result};
pub use raster::{GeoTransform, Raster, RasterElement};
pub use vector::{AttributeValue, Feature, FeatureCollection};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::crs::{CoordTransformer, CrsUnit, CRS};
    pub use crate::error::{Error, Result};
    pub use crate::raster::{GeoTransform, Raster, RasterElement};
    pub use crate::vector::{AttributeValue, Feature, FeatureCollection};
    pub use crate::Algorithm;
}

/// Core trait for pipeline stages.
///
/// Stages are pure functions that transform input data according to parameters.
pub trait Algorithm {
    /// Input type for the stage
    type Input;
    /// Output type for the stage
    type Output;
    /// Parameters controlling stage behavior
    type Params;
    /// Error type for stage execution
    type Error: std::error::Error;

    /// Returns the stage name
    fn name(&self) -> &'static str;

    /// Returns a description of what the stage does
    fn description(&self) -> &'static str;

    /// Execute the stage
    fn execute(
        &self,
        input: Self::Input,
        params: Self::Params,
    ) -> std::result::Result<Self::Output, Self::Error>;
}
