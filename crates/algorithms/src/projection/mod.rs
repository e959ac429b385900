//! Reprojection of rasters and features between coordinate reference systems
//!
//! - `reproject_raster`: warp a grid into a target CRS at a target resolution
//! - `reproject_features`: exact vertex transform of polygon features
//! - `Resampling`: nearest or bilinear sampling of the source grid

mod reproject;
mod resample;

pub use reproject::{
    align_to_raster, reproject_features, reproject_raster, Reproject, ReprojectParams,
};
pub use resample::Resampling;
