//! # Rainband Algorithms
//!
//! Processing stages of the precipitation-band pipeline.
//!
//! ## Modules
//!
//! - **projection**: raster warping and vector reprojection
//! - **mask**: crop and mask a raster by a polygon boundary
//! - **classify**: interval reclassification into integer bands
//! - **measure**: band area from cell counts
//! - **vector**: isolate a band and dissolve it into polygons
//! - **pipeline**: the stages chained end to end from a `PipelineConfig`

pub mod classify;
pub mod mask;
pub mod maybe_rayon;
pub mod measure;
pub mod pipeline;
pub mod projection;
pub mod vector;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::classify::{reclassify, ClassTable, ReclassEntry, Reclassify};
    pub use crate::mask::crop_to_boundary;
    pub use crate::measure::{band_area, class_areas, Area, AreaUnit, ClassArea};
    pub use crate::pipeline::{run, PipelineConfig, PipelineReport, Stage};
    pub use crate::projection::{
        align_to_raster, reproject_features, reproject_raster, Reproject, ReprojectParams,
        Resampling,
    };
    pub use crate::vector::{isolate_code, polygonize, Polygonize};
    pub use rainband_core::prelude::*;
}
