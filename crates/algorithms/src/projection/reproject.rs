//! Raster and vector reprojection

use crate::maybe_rayon::*;
use crate::projection::Resampling;
use geo::{Coord, MapCoords};
use rainband_core::crs::{CoordTransformer, CRS};
use rainband_core::raster::{GeoTransform, Raster};
use rainband_core::vector::{Feature, FeatureCollection};
use rainband_core::{Algorithm, Error, Result};
use tracing::debug;

/// Points sampled along each edge of the source extent
const EDGE_SAMPLES: usize = 20;

/// Parameters for raster reprojection
#[derive(Debug, Clone)]
pub struct ReprojectParams {
    /// CRS of the output grid
    pub target_crs: CRS,
    /// Output cell size (x, y) in target units; derived from the source when `None`
    pub resolution: Option<(f64, f64)>,
    /// Interpolation used to sample the source
    pub resampling: Resampling,
}

impl ReprojectParams {
    pub fn new(target_crs: CRS) -> Self {
        Self {
            target_crs,
            resolution: None,
            resampling: Resampling::default(),
        }
    }

    /// Square output cells of `size` target units
    pub fn with_resolution(mut self, size: f64) -> Self {
        self.resolution = Some((size, size));
        self
    }

    pub fn with_resampling(mut self, resampling: Resampling) -> Self {
        self.resampling = resampling;
        self
    }
}

/// Raster reprojection stage
#[derive(Debug, Clone, Default)]
pub struct Reproject;

impl Algorithm for Reproject {
    type Input = Raster<f64>;
    type Output = Raster<f64>;
    type Params = ReprojectParams;
    type Error = Error;

    fn name(&self) -> &'static str {
        "Reproject"
    }

    fn description(&self) -> &'static str {
        "Warp a raster into another CRS at a chosen resolution"
    }

    fn execute(&self, input: Self::Input, params: Self::Params) -> Result<Self::Output> {
        reproject_raster(&input, &params)
    }
}

/// Envelope of the raster extent in the target CRS, edges densified
fn target_extent(raster: &Raster<f64>, forward: &CoordTransformer) -> Result<(f64, f64, f64, f64)> {
    let (rows, cols) = (raster.rows() as f64, raster.cols() as f64);
    let mut min_x = f64::INFINITY;
    let mut min_y = f64::INFINITY;
    let mut max_x = f64::NEG_INFINITY;
    let mut max_y = f64::NEG_INFINITY;

    for i in 0..=EDGE_SAMPLES {
        let t = i as f64 / EDGE_SAMPLES as f64;
        let edge_points = [(t * cols, 0.0), (t * cols, rows), (0.0, t * rows), (cols, t * rows)];
        for (col, row) in edge_points {
            let (x, y) = raster.transform().apply(col, row);
            let (tx, ty) = forward.transform(x, y)?;
            min_x = min_x.min(tx);
            min_y = min_y.min(ty);
            max_x = max_x.max(tx);
            max_y = max_y.max(ty);
        }
    }

    Ok((min_x, min_y, max_x, max_y))
}

fn check_resolution(res_x: f64, res_y: f64) -> Result<()> {
    if res_x.is_finite() && res_y.is_finite() && res_x > 0.0 && res_y > 0.0 {
        return Ok(());
    }
    Err(Error::InvalidParameter {
        name: "resolution",
        value: format!("{res_x}x{res_y}"),
        reason: "must be positive and finite".into(),
    })
}

/// Reproject a raster into `params.target_crs`.
///
/// The output covers the source extent transformed into the target CRS. Each
/// output cell center is mapped back into the source grid and sampled with
/// `params.resampling`; cells that land outside the source, or on no-data,
/// become no-data.
///
/// # Errors
/// `InvalidParameter` when the source has no CRS or the resolution is not
/// positive, `UnsupportedCrs` / `Projection` from the coordinate transform.
pub fn reproject_raster(raster: &Raster<f64>, params: &ReprojectParams) -> Result<Raster<f64>> {
    let source_crs = raster.crs().ok_or_else(|| Error::InvalidParameter {
        name: "raster",
        value: "no CRS".into(),
        reason: "a source CRS is required to reproject".into(),
    })?;
    if raster.is_empty() {
        return Err(Error::InvalidDimensions {
            width: raster.cols(),
            height: raster.rows(),
        });
    }

    let forward = CoordTransformer::new(source_crs, &params.target_crs)?;
    let inverse = forward.inverse()?;

    let (min_x, min_y, max_x, max_y) = target_extent(raster, &forward)?;
    let (res_x, res_y) = params.resolution.unwrap_or_else(|| {
        (
            (max_x - min_x) / raster.cols() as f64,
            (max_y - min_y) / raster.rows() as f64,
        )
    });
    check_resolution(res_x, res_y)?;

    let out_cols = (((max_x - min_x) / res_x).ceil() as usize).max(1);
    let out_rows = (((max_y - min_y) / res_y).ceil() as usize).max(1);
    let out_transform = GeoTransform::new(min_x, max_y, res_x, -res_y);
    let nodata = raster.nodata_or_default();

    debug!(
        "Reprojecting {}x{} {} -> {}x{} {} ({} at {}x{})",
        raster.cols(),
        raster.rows(),
        source_crs,
        out_cols,
        out_rows,
        params.target_crs,
        params.resampling,
        res_x,
        res_y
    );

    let resampling = params.resampling;
    let data: Vec<f64> = (0..out_rows)
        .into_par_iter()
        .flat_map(|row| {
            let mut row_data = vec![nodata; out_cols];
            for (col, cell) in row_data.iter_mut().enumerate() {
                let (x, y) = out_transform.pixel_to_geo(col, row);
                let Ok((sx, sy)) = inverse.transform(x, y) else {
                    continue;
                };
                let (src_col, src_row) = raster.geo_to_pixel(sx, sy);
                if let Some(value) = resampling.sample(raster, src_col, src_row) {
                    *cell = value;
                }
            }
            row_data
        })
        .collect();

    Ok(Raster::from_vec(data, out_rows, out_cols)?
        .with_transform(out_transform)
        .with_crs(params.target_crs.clone())
        .with_nodata(nodata))
}

/// Transform every vertex of every feature into `target`.
///
/// # Errors
/// `InvalidParameter` when the collection carries no CRS, otherwise any
/// error of the coordinate transform.
pub fn reproject_features(
    collection: &FeatureCollection,
    target: &CRS,
) -> Result<FeatureCollection> {
    let source = collection.crs().ok_or_else(|| Error::InvalidParameter {
        name: "features",
        value: "no CRS".into(),
        reason: "a source CRS is required to reproject".into(),
    })?;

    let transformer = CoordTransformer::new(source, target)?;
    if transformer.is_identity() {
        let mut out = collection.clone();
        out.crs = Some(target.clone());
        return Ok(out);
    }

    let mut out = FeatureCollection::new(Some(target.clone()));
    for feature in collection.iter() {
        let geometry = feature
            .geometry
            .as_ref()
            .map(|g| {
                g.try_map_coords(|c| {
                    transformer
                        .transform(c.x, c.y)
                        .map(|(x, y)| Coord { x, y })
                })
            })
            .transpose()?;
        out.push(Feature {
            geometry,
            properties: feature.properties.clone(),
            id: feature.id.clone(),
        });
    }

    debug!("Reprojected {} features {} -> {}", out.len(), source, target);
    Ok(out)
}

/// Reproject features into the CRS of `raster`
pub fn align_to_raster(
    collection: &FeatureCollection,
    raster: &Raster<f64>,
) -> Result<FeatureCollection> {
    let target = raster.crs().ok_or_else(|| Error::InvalidParameter {
        name: "raster",
        value: "no CRS".into(),
        reason: "cannot align features to a raster without CRS".into(),
    })?;
    reproject_features(collection, target)
}
