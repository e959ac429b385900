//! Masking rasters by vector boundaries

mod crop;

pub use crop::crop_to_boundary;
