//! Point transforms between two CRSs, backed by `proj4rs` (pure Rust).

use super::CRS;
use crate::error::{Error, Result};
use proj4rs::proj::Proj;

enum Strategy {
    /// Source and target are the same CRS
    Identity,
    Proj {
        source: Proj,
        target: Proj,
        /// Geographic axes are degrees here and radians in proj4rs
        source_is_geographic: bool,
        target_is_geographic: bool,
    },
}

/// Reusable coordinate transformer between two CRSs.
///
/// ```ignore
/// let t = CoordTransformer::new(&CRS::nad83(), &CRS::conus_albers())?;
/// let (x, y) = t.transform(-105.5, 39.0)?;
/// ```
pub struct CoordTransformer {
    source: CRS,
    target: CRS,
    strategy: Strategy,
}

impl std::fmt::Debug for CoordTransformer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoordTransformer")
            .field("source", &self.source.identifier())
            .field("target", &self.target.identifier())
            .field("identity", &self.is_identity())
            .finish()
    }
}

impl CoordTransformer {
    /// Build a transformer from `source` to `target`.
    ///
    /// Equivalent CRSs produce an identity transform without touching proj4rs.
    pub fn new(source: &CRS, target: &CRS) -> Result<Self> {
        if source.is_equivalent(target) {
            return Ok(Self {
                source: source.clone(),
                target: target.clone(),
                strategy: Strategy::Identity,
            });
        }

        let source_proj = build_proj(source)?;
        let target_proj = build_proj(target)?;

        Ok(Self {
            source: source.clone(),
            target: target.clone(),
            strategy: Strategy::Proj {
                source: source_proj,
                target: target_proj,
                source_is_geographic: source.is_geographic(),
                target_is_geographic: target.is_geographic(),
            },
        })
    }

    /// Transformer for the opposite direction
    pub fn inverse(&self) -> Result<Self> {
        Self::new(&self.target, &self.source)
    }

    pub fn source(&self) -> &CRS {
        &self.source
    }

    pub fn target(&self) -> &CRS {
        &self.target
    }

    pub fn is_identity(&self) -> bool {
        matches!(self.strategy, Strategy::Identity)
    }

    /// Transform one coordinate pair from source to target CRS
    pub fn transform(&self, x: f64, y: f64) -> Result<(f64, f64)> {
        let Strategy::Proj {
            source,
            target,
            source_is_geographic,
            target_is_geographic,
        } = &self.strategy
        else {
            return Ok((x, y));
        };

        let mut point = if *source_is_geographic {
            (x.to_radians(), y.to_radians(), 0.0)
        } else {
            (x, y, 0.0)
        };

        proj4rs::transform::transform(source, target, &mut point).map_err(|e| {
            Error::Projection(format!(
                "({x}, {y}) from {} to {}: {e:?}",
                self.source, self.target
            ))
        })?;

        let (out_x, out_y) = if *target_is_geographic {
            (point.0.to_degrees(), point.1.to_degrees())
        } else {
            (point.0, point.1)
        };

        if !out_x.is_finite() || !out_y.is_finite() {
            return Err(Error::Projection(format!(
                "({x}, {y}) has no finite image in {}",
                self.target
            )));
        }

        Ok((out_x, out_y))
    }
}

fn build_proj(crs: &CRS) -> Result<Proj> {
    let def = crs
        .proj_definition()
        .ok_or_else(|| Error::UnsupportedCrs(crs.identifier()))?;
    Proj::from_proj_string(&def)
        .map_err(|e| Error::UnsupportedCrs(format!("{}: {e:?}", crs.identifier())))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_close(a: f64, b: f64, tol: f64, msg: &str) {
        let diff = (a - b).abs();
        assert!(diff < tol, "{msg}: expected {b}, got {a}, diff {diff} exceeds {tol}");
    }

    #[test]
    fn identity_for_same_crs() {
        let t = CoordTransformer::new(&CRS::conus_albers(), &CRS::conus_albers()).unwrap();
        assert!(t.is_identity());
        assert_eq!(t.transform(12.5, -3.0).unwrap(), (12.5, -3.0));
    }

    #[test]
    fn albers_origin() {
        // lat_0 = 23, lon_0 = -96 maps to the false origin
        let t = CoordTransformer::new(&CRS::nad83(), &CRS::conus_albers()).unwrap();
        let (x, y) = t.transform(-96.0, 23.0).unwrap();
        assert_close(x, 0.0, 1.0, "easting");
        assert_close(y, 0.0, 1.0, "northing");
    }

    #[test]
    fn albers_roundtrip() {
        let forward = CoordTransformer::new(&CRS::nad83(), &CRS::conus_albers()).unwrap();
        let inverse = forward.inverse().unwrap();

        let (x, y) = forward.transform(-105.5, 39.0).unwrap();
        assert!(x < 0.0, "west of the central meridian");
        let (lon, lat) = inverse.transform(x, y).unwrap();
        assert_close(lon, -105.5, 1e-6, "lon");
        assert_close(lat, 39.0, 1e-6, "lat");
    }

    #[test]
    fn unsupported_epsg() {
        let err = CoordTransformer::new(&CRS::wgs84(), &CRS::from_epsg(2229)).unwrap_err();
        assert!(matches!(err, Error::UnsupportedCrs(_)));
    }
}
