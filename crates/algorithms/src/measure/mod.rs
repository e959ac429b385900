//! Area of classified bands

mod area;

pub use area::{band_area, cell_area, class_areas, metres_per_unit, Area, AreaUnit, ClassArea};
