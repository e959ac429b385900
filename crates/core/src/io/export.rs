//! Export with an explicit policy for destinations that already exist

use crate::error::{Error, Result};
use crate::io::{write_geojson, write_geotiff};
use crate::raster::{Raster, RasterElement};
use crate::vector::FeatureCollection;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::{info, warn};

/// What to do when the export destination already exists
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportPolicy {
    /// Leave the existing file untouched and report [`WriteOutcome::Skipped`]
    #[default]
    Skip,
    /// Replace the existing file
    Overwrite,
    /// Fail with [`Error::AlreadyExists`]
    Error,
}

impl std::str::FromStr for ExportPolicy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "skip" => Ok(ExportPolicy::Skip),
            "overwrite" => Ok(ExportPolicy::Overwrite),
            "error" => Ok(ExportPolicy::Error),
            other => Err(format!("unknown export policy '{other}' (skip, overwrite, error)")),
        }
    }
}

/// Whether an export call wrote the destination
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum WriteOutcome {
    Written,
    Skipped,
}

/// Decide whether to write `path`, creating its parent directory when needed
fn should_write(path: &Path, policy: ExportPolicy) -> Result<bool> {
    if path.exists() {
        return match policy {
            ExportPolicy::Skip => {
                warn!("{} already exists, skipping write", path.display());
                Ok(false)
            }
            ExportPolicy::Overwrite => Ok(true),
            ExportPolicy::Error => Err(Error::AlreadyExists(path.to_path_buf())),
        };
    }

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    Ok(true)
}

/// Write a raster as GeoTIFF according to `policy`
pub fn export_raster<T, P>(
    raster: &Raster<T>,
    path: P,
    policy: ExportPolicy,
) -> Result<WriteOutcome>
where
    T: RasterElement,
    P: AsRef<Path>,
{
    let path = path.as_ref();
    if !should_write(path, policy)? {
        return Ok(WriteOutcome::Skipped);
    }
    write_geotiff(raster, path)?;
    info!("Wrote raster {}", path.display());
    Ok(WriteOutcome::Written)
}

/// Write features as GeoJSON according to `policy`
pub fn export_features<P: AsRef<Path>>(
    collection: &FeatureCollection,
    path: P,
    policy: ExportPolicy,
) -> Result<WriteOutcome> {
    let path = path.as_ref();
    if !should_write(path, policy)? {
        return Ok(WriteOutcome::Skipped);
    }
    write_geojson(collection, path)?;
    info!("Wrote {} features to {}", collection.len(), path.display());
    Ok(WriteOutcome::Written)
}
