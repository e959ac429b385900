//! Raster-to-vector conversion
//!
//! - Isolate: keep a single code of a classified raster
//! - Polygonize: dissolve equal-valued regions into labelled multipolygons

mod polygonize;

pub use polygonize::{isolate_code, polygonize, Polygonize};
