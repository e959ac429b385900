//! Classification of continuous rasters into integer bands

mod reclassify;

pub use reclassify::{reclassify, ClassTable, ReclassEntry, Reclassify, CLASS_NODATA};
