//! Reading and writing rasters (GeoTIFF) and vector features (GeoJSON)

mod export;
mod geojson;
mod geotiff;

pub use export::{export_features, export_raster, ExportPolicy, WriteOutcome};
pub use geojson::{parse_geojson, read_geojson, to_geojson_string, write_geojson};
pub use geotiff::{read_geotiff, read_geotiff_from_buffer, write_geotiff, write_geotiff_to_buffer};
