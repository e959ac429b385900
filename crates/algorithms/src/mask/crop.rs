//! Crop a raster to a polygon boundary

use geo::{BoundingRect, Coord, Intersects, Polygon, Rect};
use rainband_core::raster::{Raster, RasterElement};
use rainband_core::vector::FeatureCollection;
use rainband_core::{Error, Result};
use tracing::debug;

/// Cell window (row0, col0, rows, cols) covering `rect`, snapped outward and
/// clipped to the raster
fn covering_window<T: RasterElement>(
    raster: &Raster<T>,
    rect: &Rect<f64>,
) -> Option<(usize, usize, usize, usize)> {
    let corners = [
        raster.geo_to_pixel(rect.min().x, rect.min().y),
        raster.geo_to_pixel(rect.min().x, rect.max().y),
        raster.geo_to_pixel(rect.max().x, rect.min().y),
        raster.geo_to_pixel(rect.max().x, rect.max().y),
    ];

    let lowest = |f: fn(&(f64, f64)) -> f64| corners.iter().map(f).fold(f64::INFINITY, f64::min);
    let highest =
        |f: fn(&(f64, f64)) -> f64| corners.iter().map(f).fold(f64::NEG_INFINITY, f64::max);

    let col_min = lowest(|c| c.0).floor().max(0.0);
    let col_max = highest(|c| c.0).ceil().min(raster.cols() as f64);
    let row_min = lowest(|c| c.1).floor().max(0.0);
    let row_max = highest(|c| c.1).ceil().min(raster.rows() as f64);

    if !(col_min < col_max && row_min < row_max) {
        return None;
    }
    Some((
        row_min as usize,
        col_min as usize,
        (row_max - row_min) as usize,
        (col_max - col_min) as usize,
    ))
}

/// Crop `raster` to the bounding box of `boundary` and mask cells outside it.
///
/// The result covers the boundary envelope snapped outward to whole cells and
/// clipped to the raster. Cells whose center is outside every boundary polygon
/// are set to no-data (the raster's own value, or the type default such as NaN).
///
/// # Errors
/// - `CrsMismatch` when the two CRSs are not equivalent or either is missing
/// - `InvalidParameter` when the boundary has no polygons or misses the raster
pub fn crop_to_boundary<T: RasterElement>(
    raster: &Raster<T>,
    boundary: &FeatureCollection,
) -> Result<Raster<T>> {
    match (raster.crs(), boundary.crs()) {
        (Some(a), Some(b)) if a.is_equivalent(b) => {}
        (a, b) => {
            let name = |crs: Option<&rainband_core::CRS>| {
                crs.map_or_else(|| "none".to_string(), |c| c.identifier())
            };
            return Err(Error::CrsMismatch(name(a), name(b)));
        }
    }

    let polygons = boundary.polygons();
    let rect = polygons.bounding_rect().ok_or_else(|| Error::InvalidParameter {
        name: "boundary",
        value: format!("{} features", boundary.len()),
        reason: "no polygon geometry".into(),
    })?;

    let (row0, col0, rows, cols) =
        covering_window(raster, &rect).ok_or_else(|| Error::InvalidParameter {
            name: "boundary",
            value: format!("{:?}", rect),
            reason: "does not overlap the raster".into(),
        })?;

    let mut cropped = raster.window(row0, col0, rows, cols)?;
    let nodata = cropped.nodata_or_default();

    // Envelope prefilter per polygon
    let candidates: Vec<(Rect<f64>, &Polygon<f64>)> = polygons
        .0
        .iter()
        .filter_map(|p| p.bounding_rect().map(|r| (r, p)))
        .collect();

    let transform = *cropped.transform();
    let mut masked = 0usize;
    for ((row, col), value) in cropped.data_mut().indexed_iter_mut() {
        let (x, y) = transform.pixel_to_geo(col, row);
        let center = Coord { x, y };
        let inside = candidates
            .iter()
            .any(|(r, p)| r.intersects(&center) && p.intersects(&center));
        if !inside {
            *value = nodata;
            masked += 1;
        }
    }
    cropped.set_nodata(Some(nodata));

    debug!(
        "Cropped {}x{} -> {}x{} at ({}, {}), {} cells masked",
        raster.cols(),
        raster.rows(),
        cols,
        rows,
        col0,
        row0,
        masked
    );
    Ok(cropped)
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::{polygon, Geometry};
    use rainband_core::vector::Feature;
    use rainband_core::{GeoTransform, CRS};

    /// 10x10 grid of 1 km cells covering (0, 0)-(10000, 10000)
    fn grid() -> Raster<f64> {
        Raster::filled(10, 10, 300.0)
            .with_transform(GeoTransform::new(0.0, 10_000.0, 1000.0, -1000.0))
            .with_crs(CRS::conus_albers())
    }

    fn boundary(poly: Polygon<f64>, crs: CRS) -> FeatureCollection {
        let mut fc = FeatureCollection::new(Some(crs));
        fc.push(Feature::new(Geometry::Polygon(poly)));
        fc
    }

    fn triangle() -> Polygon<f64> {
        polygon![
            (x: 2000.0, y: 2000.0),
            (x: 8000.0, y: 2000.0),
            (x: 2000.0, y: 8000.0),
            (x: 2000.0, y: 2000.0),
        ]
    }

    #[test]
    fn extent_matches_boundary_envelope() {
        let out = crop_to_boundary(&grid(), &boundary(triangle(), CRS::conus_albers())).unwrap();
        assert_eq!(out.shape(), (6, 6));
        assert_eq!(out.bounds(), (2000.0, 2000.0, 8000.0, 8000.0));
        assert!(out.nodata().unwrap().is_nan());
    }

    #[test]
    fn cells_outside_boundary_are_nodata() {
        let out = crop_to_boundary(&grid(), &boundary(triangle(), CRS::conus_albers())).unwrap();
        for ((row, col), &value) in out.data().indexed_iter() {
            let (x, y) = out.pixel_to_geo(col, row);
            let inside = x + y <= 10_000.0;
            assert_eq!(!out.is_nodata(value), inside, "cell ({row}, {col}) at ({x}, {y})");
        }
        // Lower-left corner cell is inside, upper-right is not
        assert_eq!(out.get(5, 0).unwrap(), 300.0);
        assert!(out.get(0, 5).unwrap().is_nan());
    }

    #[test]
    fn envelope_snaps_outward_and_clips() {
        let poly = polygon![
            (x: 2500.0, y: -3000.0),
            (x: 4200.0, y: -3000.0),
            (x: 4200.0, y: 3300.0),
            (x: 2500.0, y: 3300.0),
            (x: 2500.0, y: -3000.0),
        ];
        let out = crop_to_boundary(&grid(), &boundary(poly, CRS::conus_albers())).unwrap();
        assert_eq!(out.bounds(), (2000.0, 0.0, 5000.0, 4000.0));
    }

    #[test]
    fn keeps_declared_nodata() {
        let raster = grid().with_nodata(-9999.0);
        let out = crop_to_boundary(&raster, &boundary(triangle(), CRS::conus_albers())).unwrap();
        assert_eq!(out.nodata(), Some(-9999.0));
        assert_eq!(out.get(0, 5).unwrap(), -9999.0);
    }

    #[test]
    fn crs_mismatch() {
        let err = crop_to_boundary(&grid(), &boundary(triangle(), CRS::wgs84())).unwrap_err();
        assert!(matches!(err, Error::CrsMismatch(..)));

        let mut bare = grid();
        bare.set_crs(None);
        let err = crop_to_boundary(&bare, &boundary(triangle(), CRS::conus_albers())).unwrap_err();
        assert!(matches!(err, Error::CrsMismatch(..)));
    }

    #[test]
    fn disjoint_boundary() {
        let far = polygon![
            (x: 50_000.0, y: 50_000.0),
            (x: 60_000.0, y: 50_000.0),
            (x: 60_000.0, y: 60_000.0),
            (x: 50_000.0, y: 50_000.0),
        ];
        let err = crop_to_boundary(&grid(), &boundary(far, CRS::conus_albers())).unwrap_err();
        assert!(matches!(err, Error::InvalidParameter { name: "boundary", .. }));
    }
}
