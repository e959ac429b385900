//! End-to-end precipitation band extraction
//!
//! read -> crop to boundary -> reproject -> classify -> measure -> polygonize -> export
//!
//! Every knob lives in [`PipelineConfig`]; nothing is read from global state.

use crate::classify::{reclassify, ClassTable};
use crate::mask::crop_to_boundary;
use crate::measure::{band_area, class_areas, AreaUnit, ClassArea};
use crate::projection::{align_to_raster, reproject_raster, ReprojectParams, Resampling};
use crate::vector::{isolate_code, polygonize};
use rainband_core::io::{
    export_features, export_raster, read_geojson, read_geotiff, ExportPolicy, WriteOutcome,
};
use rainband_core::raster::RasterStatistics;
use rainband_core::{Error, Result, CRS};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

/// Pipeline inputs, outputs and knobs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Continuous precipitation GeoTIFF
    pub raster: PathBuf,
    /// GeoJSON boundary to crop to
    pub boundary: PathBuf,
    /// Reprojected, cropped continuous raster
    pub output_raster: PathBuf,
    /// GeoJSON with the dissolved polygons of the selected band
    pub output_vector: PathBuf,
    /// Optional GeoTIFF of the full classification
    pub classified_output: Option<PathBuf>,
    /// Target CRS as `EPSG:<code>`, a bare code or a PROJ string
    pub target_crs: String,
    /// Target cell size in target CRS units
    pub resolution: f64,
    pub resampling: Resampling,
    pub classes: ClassTable,
    /// Code of the band to measure and polygonize
    pub band_code: i32,
    /// Label attached to the band polygons
    pub band_label: String,
    pub area_units: Vec<AreaUnit>,
    pub policy: ExportPolicy,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            raster: PathBuf::new(),
            boundary: PathBuf::new(),
            output_raster: PathBuf::new(),
            output_vector: PathBuf::new(),
            classified_output: None,
            target_crs: "EPSG:5070".into(),
            resolution: 4000.0,
            resampling: Resampling::Bilinear,
            classes: ClassTable::precipitation_bands(),
            band_code: 2,
            band_label: "200-400mm".into(),
            area_units: vec![AreaUnit::SquareKilometres],
            policy: ExportPolicy::Skip,
        }
    }
}

impl PipelineConfig {
    /// Study defaults with the four required paths
    pub fn new(
        raster: impl Into<PathBuf>,
        boundary: impl Into<PathBuf>,
        output_raster: impl Into<PathBuf>,
        output_vector: impl Into<PathBuf>,
    ) -> Self {
        Self {
            raster: raster.into(),
            boundary: boundary.into(),
            output_raster: output_raster.into(),
            output_vector: output_vector.into(),
            ..Self::default()
        }
    }

    /// Load a JSON config; missing fields take the study defaults
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(Error::NotFound(path.to_path_buf()));
        }
        let text = fs::read_to_string(path)?;
        serde_json::from_str(&text)
            .map_err(|e| Error::format(path, format!("invalid pipeline config: {e}")))
    }

    /// Parsed target CRS
    pub fn target(&self) -> Result<CRS> {
        CRS::parse(&self.target_crs).ok_or_else(|| Error::InvalidParameter {
            name: "target_crs",
            value: self.target_crs.clone(),
            reason: "expected EPSG:<code>, a numeric code or a PROJ string".into(),
        })
    }

    /// Check knobs that do not need any input file
    pub fn validate(&self) -> Result<()> {
        let required = [
            ("raster", &self.raster),
            ("boundary", &self.boundary),
            ("output_raster", &self.output_raster),
            ("output_vector", &self.output_vector),
        ];
        for (name, path) in required {
            if path.as_os_str().is_empty() {
                return Err(Error::InvalidParameter {
                    name,
                    value: String::new(),
                    reason: "path is required".into(),
                });
            }
        }
        if !(self.resolution.is_finite() && self.resolution > 0.0) {
            return Err(Error::InvalidParameter {
                name: "resolution",
                value: self.resolution.to_string(),
                reason: "must be positive and finite".into(),
            });
        }
        self.target()?;
        self.classes.validate()
    }
}

/// Pipeline stages, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Read,
    Crop,
    Reproject,
    Classify,
    Measure,
    Polygonize,
    Export,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Read => "Reading inputs",
            Stage::Crop => "Cropping to boundary",
            Stage::Reproject => "Reprojecting",
            Stage::Classify => "Classifying",
            Stage::Measure => "Measuring band area",
            Stage::Polygonize => "Polygonizing band",
            Stage::Export => "Writing outputs",
        };
        f.write_str(name)
    }
}

/// Summary of a pipeline run
#[derive(Debug, Clone, Serialize)]
pub struct PipelineReport {
    pub target_crs: String,
    pub resolution: f64,
    /// (rows, cols) of the reprojected raster
    pub shape: (usize, usize),
    pub statistics: RasterStatistics,
    pub band_code: i32,
    pub band_label: String,
    pub band_cells: usize,
    /// Band area keyed by unit symbol
    pub band_area: BTreeMap<String, f64>,
    pub classes: Vec<ClassArea>,
    pub polygons: usize,
    pub raster_output: WriteOutcome,
    pub vector_output: WriteOutcome,
    pub classified_output: Option<WriteOutcome>,
}

/// Run the pipeline
pub fn run(config: &PipelineConfig) -> Result<PipelineReport> {
    run_with_progress(config, |_| {})
}

/// Run the pipeline, calling `progress` as each stage starts
pub fn run_with_progress(
    config: &PipelineConfig,
    mut progress: impl FnMut(Stage),
) -> Result<PipelineReport> {
    config.validate()?;
    let target = config.target()?;

    progress(Stage::Read);
    let raster = read_geotiff::<f64, _>(&config.raster)?;
    let boundary = read_geojson(&config.boundary)?;
    info!(
        "Source: {} x {}, CRS {}",
        raster.cols(),
        raster.rows(),
        raster.crs().map_or_else(|| "unknown".to_string(), |c| c.identifier())
    );

    progress(Stage::Crop);
    let boundary = align_to_raster(&boundary, &raster)?;
    let cropped = crop_to_boundary(&raster, &boundary)?;
    info!("Cropped: {} x {}, {:?}", cropped.cols(), cropped.rows(), cropped.statistics());

    progress(Stage::Reproject);
    let params = ReprojectParams::new(target.clone())
        .with_resolution(config.resolution)
        .with_resampling(config.resampling);
    let projected = reproject_raster(&cropped, &params)?;
    let statistics = projected.statistics();
    info!(
        "Reprojected: {} x {} at {} ({:?})",
        projected.cols(),
        projected.rows(),
        target,
        statistics
    );

    progress(Stage::Classify);
    let classified = reclassify(&projected, &config.classes)?;

    progress(Stage::Measure);
    let area = band_area(&classified, config.band_code)?;
    let classes = class_areas(&classified)?;
    let band_cells = classified.count_equal(config.band_code);
    info!(
        "Band {} ({}): {} cells, {}",
        config.band_code, config.band_label, band_cells, area
    );

    progress(Stage::Polygonize);
    let band = isolate_code(&classified, config.band_code);
    let features = polygonize(&band, &config.band_label)?;
    let polygons = features.polygons().0.len();

    progress(Stage::Export);
    let raster_output = export_raster(&projected, &config.output_raster, config.policy)?;
    let vector_output = export_features(&features, &config.output_vector, config.policy)?;
    let classified_output = config
        .classified_output
        .as_ref()
        .map(|path| export_raster(&classified, path, config.policy))
        .transpose()?;

    Ok(PipelineReport {
        target_crs: target.identifier(),
        resolution: config.resolution,
        shape: projected.shape(),
        statistics,
        band_code: config.band_code,
        band_label: config.band_label.clone(),
        band_cells,
        band_area: area.in_units(&config.area_units),
        classes,
        polygons,
        raster_output,
        vector_output,
        classified_output,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_study() {
        let config = PipelineConfig::new("in.tif", "state.geojson", "out.tif", "band.geojson");
        assert_eq!(config.target().unwrap().epsg(), Some(5070));
        assert_eq!(config.resolution, 4000.0);
        assert_eq!(config.resampling, Resampling::Bilinear);
        assert_eq!(config.band_code, 2);
        assert_eq!(config.band_label, "200-400mm");
        assert_eq!(config.policy, ExportPolicy::Skip);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn partial_json_uses_defaults() {
        let json = r#"{
            "raster": "data/prism.tif",
            "boundary": "data/state.geojson",
            "output_raster": "out/prism_5070.tif",
            "output_vector": "out/band.geojson",
            "resolution": 1000,
            "resampling": "nearest",
            "classes": [{"min": 0, "max": 250, "code": 1}, {"min": 250, "max": 500, "code": 2}],
            "area_units": ["square_kilometres", "acres"],
            "policy": "overwrite"
        }"#;
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, json).unwrap();

        let config = PipelineConfig::from_json_file(&path).unwrap();
        assert_eq!(config.raster, PathBuf::from("data/prism.tif"));
        assert_eq!(config.resolution, 1000.0);
        assert_eq!(config.resampling, Resampling::Nearest);
        assert_eq!(config.classes.entries().len(), 2);
        assert_eq!(config.area_units, vec![AreaUnit::SquareKilometres, AreaUnit::Acres]);
        assert_eq!(config.policy, ExportPolicy::Overwrite);
        assert_eq!(config.target_crs, "EPSG:5070");
        assert_eq!(config.band_label, "200-400mm");
    }

    #[test]
    fn invalid_knobs_are_rejected() {
        let base = PipelineConfig::new("in.tif", "state.geojson", "out.tif", "band.geojson");

        let config = PipelineConfig { resolution: -1.0, ..base.clone() };
        assert!(matches!(
            config.validate(),
            Err(Error::InvalidParameter { name: "resolution", .. })
        ));

        let config = PipelineConfig { target_crs: "albers".into(), ..base.clone() };
        assert!(matches!(
            config.validate(),
            Err(Error::InvalidParameter { name: "target_crs", .. })
        ));

        let config = PipelineConfig { output_vector: PathBuf::new(), ..base };
        assert!(config.validate().is_err());
    }

    #[test]
    fn missing_inputs_fail_before_any_output() {
        let dir = tempfile::tempdir().unwrap();
        let config = PipelineConfig::new(
            dir.path().join("missing.tif"),
            dir.path().join("missing.geojson"),
            dir.path().join("out.tif"),
            dir.path().join("band.geojson"),
        );
        let err = run(&config).unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
        assert!(!dir.path().join("out.tif").exists());
    }
}
