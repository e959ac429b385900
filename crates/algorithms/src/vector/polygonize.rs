//! Raster to polygon conversion
//!
//! Traces the cell boundaries of every 4-connected region of equal code into
//! rings, then dissolves the regions of each code into one multipolygon
//! feature. Rings run along cell edges, so the polygons cover exactly the
//! cells of their region.

use geo::{Area, Contains, Coord, LineString, MultiPolygon, Polygon};
use rainband_core::raster::Raster;
use rainband_core::vector::{Feature, FeatureCollection};
use rainband_core::{Algorithm, Error, Result};
use std::collections::{BTreeSet, HashMap};
use tracing::{debug, warn};

/// Pixel-corner position (col, row)
type Vertex = (i64, i64);

#[derive(Debug, Clone, Copy)]
struct Edge {
    from: Vertex,
    to: Vertex,
}

impl Edge {
    fn direction(&self) -> Vertex {
        (self.to.0 - self.from.0, self.to.1 - self.from.1)
    }
}

/// A closed ring in pixel space with a point just to its left
struct Ring {
    vertices: Vec<Vertex>,
    /// Center of a cell adjacent to the ring's first edge, on the side away
    /// from the region; for holes this lies inside the hole
    probe: (f64, f64),
    /// Shoelace area, positive for outer rings and negative for holes
    signed_area: f64,
}

/// Boundary edges of the cells where `inside` holds.
///
/// Edges run clockwise on screen (x right, y down) around each cell side that
/// faces an outside cell, so the region is always on the right.
fn boundary_edges(rows: usize, cols: usize, inside: impl Fn(i64, i64) -> bool) -> Vec<Edge> {
    let mut edges = Vec::new();
    for r in 0..rows as i64 {
        for c in 0..cols as i64 {
            if !inside(r, c) {
                continue;
            }
            if !inside(r - 1, c) {
                edges.push(Edge { from: (c, r), to: (c + 1, r) });
            }
            if !inside(r, c + 1) {
                edges.push(Edge { from: (c + 1, r), to: (c + 1, r + 1) });
            }
            if !inside(r + 1, c) {
                edges.push(Edge { from: (c + 1, r + 1), to: (c, r + 1) });
            }
            if !inside(r, c - 1) {
                edges.push(Edge { from: (c, r + 1), to: (c, r) });
            }
        }
    }
    edges
}

/// Turn preference at a shared vertex: right, straight, left.
///
/// Preferring the right turn keeps diagonal neighbours apart, which gives
/// 4-connected regions.
fn turn_rank(incoming: Vertex, outgoing: Vertex) -> u8 {
    let right = (-incoming.1, incoming.0);
    if outgoing == right {
        0
    } else if outgoing == incoming {
        1
    } else {
        2
    }
}

fn link_rings(edges: &[Edge]) -> Vec<Ring> {
    let mut outgoing: HashMap<Vertex, Vec<usize>> = HashMap::new();
    for (i, edge) in edges.iter().enumerate() {
        outgoing.entry(edge.from).or_default().push(i);
    }

    let mut used = vec![false; edges.len()];
    let mut rings = Vec::new();

    for start in 0..edges.len() {
        if used[start] {
            continue;
        }

        let mut vertices = Vec::new();
        let mut current = start;
        loop {
            used[current] = true;
            let edge = edges[current];
            vertices.push(edge.from);

            let incoming = edge.direction();
            let next = outgoing.get(&edge.to).and_then(|candidates| {
                candidates
                    .iter()
                    .copied()
                    .filter(|&i| !used[i] || i == start)
                    .min_by_key(|&i| turn_rank(incoming, edges[i].direction()))
            });

            match next {
                Some(i) if i == start => break,
                Some(i) => current = i,
                None => {
                    warn!("Open boundary at {:?}, dropping ring", edge.to);
                    vertices.clear();
                    break;
                }
            }
        }

        if vertices.len() < 4 {
            continue;
        }

        let first = edges[start];
        let (dx, dy) = first.direction();
        let probe = (
            first.from.0 as f64 + 0.5 * dx as f64 + 0.5 * dy as f64,
            first.from.1 as f64 + 0.5 * dy as f64 - 0.5 * dx as f64,
        );
        let vertices = remove_collinear(vertices);
        let signed_area = shoelace(&vertices);
        rings.push(Ring {
            vertices,
            probe,
            signed_area,
        });
    }
    rings
}

/// Keep only the corners of an axis-aligned ring
fn remove_collinear(ring: Vec<Vertex>) -> Vec<Vertex> {
    let n = ring.len();
    let step = |a: Vertex, b: Vertex| ((b.0 - a.0).signum(), (b.1 - a.1).signum());
    (0..n)
        .filter(|&i| {
            let prev = ring[(i + n - 1) % n];
            let next = ring[(i + 1) % n];
            step(prev, ring[i]) != step(ring[i], next)
        })
        .map(|i| ring[i])
        .collect()
}

fn shoelace(ring: &[Vertex]) -> f64 {
    let n = ring.len();
    let twice: i64 = (0..n)
        .map(|i| {
            let (x0, y0) = ring[i];
            let (x1, y1) = ring[(i + 1) % n];
            x0 * y1 - x1 * y0
        })
        .sum();
    twice as f64 / 2.0
}

fn pixel_polygon(ring: &[Vertex]) -> Polygon<f64> {
    let coords: Vec<Coord<f64>> = ring
        .iter()
        .map(|&(x, y)| Coord { x: x as f64, y: y as f64 })
        .collect();
    Polygon::new(LineString::new(coords), vec![])
}

/// Group rings into polygons: each hole goes to the smallest outer ring containing it
fn assemble(rings: Vec<Ring>) -> Vec<(Vec<Vertex>, Vec<Vec<Vertex>>)> {
    let (outers, holes): (Vec<Ring>, Vec<Ring>) =
        rings.into_iter().partition(|r| r.signed_area > 0.0);

    let shapes: Vec<Polygon<f64>> = outers.iter().map(|r| pixel_polygon(&r.vertices)).collect();
    let mut polygons: Vec<(Vec<Vertex>, Vec<Vec<Vertex>>)> =
        outers.iter().map(|r| (r.vertices.clone(), Vec::new())).collect();

    for hole in holes {
        let probe = Coord {
            x: hole.probe.0,
            y: hole.probe.1,
        };
        let owner = shapes
            .iter()
            .enumerate()
            .filter(|(_, shape)| shape.contains(&probe))
            .min_by(|(a, _), (b, _)| outers[*a].signed_area.total_cmp(&outers[*b].signed_area))
            .map(|(i, _)| i);

        match owner {
            Some(i) => polygons[i].1.push(hole.vertices),
            None => warn!("Hole at {:?} has no enclosing ring, dropping it", hole.probe),
        }
    }
    polygons
}

/// Keep one code and set every other cell to no-data
pub fn isolate_code(classified: &Raster<i32>, code: i32) -> Raster<i32> {
    let nodata = classified.nodata_or_default();
    let mut out = classified.clone();
    out.data_mut().mapv_inplace(|v| if v == code { v } else { nodata });
    out.set_nodata(Some(nodata));
    out
}

/// Trace the regions of one code into a multipolygon in map coordinates
fn trace_code(classified: &Raster<i32>, code: i32) -> MultiPolygon<f64> {
    let (rows, cols) = classified.shape();
    let data = classified.data();
    let inside = |r: i64, c: i64| {
        r >= 0
            && c >= 0
            && (r as usize) < rows
            && (c as usize) < cols
            && data[[r as usize, c as usize]] == code
    };

    let edges = boundary_edges(rows, cols, inside);
    let rings = link_rings(&edges);

    // Screen-clockwise in pixel space is clockwise on the map too; reverse so
    // exteriors come out counter-clockwise and holes clockwise
    let transform = classified.transform();
    let to_map = |ring: &[Vertex]| -> LineString<f64> {
        ring.iter()
            .rev()
            .map(|&(x, y)| {
                let (mx, my) = transform.apply(x as f64, y as f64);
                Coord { x: mx, y: my }
            })
            .collect()
    };

    let polygons = assemble(rings)
        .into_iter()
        .map(|(exterior, interiors)| {
            Polygon::new(to_map(&exterior), interiors.iter().map(|h| to_map(h)).collect())
        })
        .collect();
    MultiPolygon::new(polygons)
}

/// Dissolve a classified raster into one feature per code.
///
/// Each feature holds a `MultiPolygon` with one polygon per 4-connected
/// region (holes preserved) and the attributes `code`, `label` and, when the
/// raster CRS has linear units, `area_m2`. No-data cells produce no geometry.
/// The collection inherits the raster CRS.
pub fn polygonize(classified: &Raster<i32>, label: &str) -> Result<FeatureCollection> {
    let codes: BTreeSet<i32> = classified
        .data()
        .iter()
        .copied()
        .filter(|&v| !classified.is_nodata(v))
        .collect();

    let metres_per_unit = classified
        .crs()
        .and_then(|crs| crs.unit())
        .and_then(|unit| unit.metres_per_unit());

    let mut collection = FeatureCollection::new(classified.crs().cloned());
    for code in codes {
        let geometry = trace_code(classified, code);
        debug!("Code {}: {} polygons", code, geometry.0.len());

        let mut feature = Feature::new(geometry.clone().into())
            .with_property("code", code)
            .with_property("label", label);
        if let Some(scale) = metres_per_unit {
            feature.set_property("area_m2", geometry.unsigned_area() * scale * scale);
        }
        collection.push(feature);
    }

    Ok(collection)
}

/// Polygonize stage; the parameter is the label attached to every feature
#[derive(Debug, Clone, Default)]
pub struct Polygonize;

impl Algorithm for Polygonize {
    type Input = Raster<i32>;
    type Output = FeatureCollection;
    type Params = String;
    type Error = Error;

    fn name(&self) -> &'static str {
        "Polygonize"
    }

    fn description(&self) -> &'static str {
        "Dissolve equal-valued raster regions into labelled multipolygons"
    }

    fn execute(&self, input: Self::Input, params: Self::Params) -> Result<Self::Output> {
        polygonize(&input, &params)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use geo::{BoundingRect, Geometry, Winding};
    use rainband_core::vector::AttributeValue;
    use rainband_core::{GeoTransform, CRS};

    const ND: i32 = i32::MIN;

    fn classified(values: Vec<i32>, rows: usize, cols: usize) -> Raster<i32> {
        Raster::from_vec(values, rows, cols)
            .unwrap()
            .with_transform(GeoTransform::new(0.0, rows as f64 * 4000.0, 4000.0, -4000.0))
            .with_crs(CRS::conus_albers())
            .with_nodata(ND)
    }

    fn multipolygon(feature: &Feature) -> &MultiPolygon<f64> {
        match feature.geometry.as_ref() {
            Some(Geometry::MultiPolygon(mp)) => mp,
            other => panic!("expected multipolygon, got {other:?}"),
        }
    }

    #[test]
    fn single_region_is_one_polygon() {
        // L-shaped band of code 2
        let raster = classified(
            vec![
                2, ND, ND,
                2, ND, ND,
                2, 2, 2,
            ],
            3,
            3,
        );
        let fc = polygonize(&raster, "200-400mm").unwrap();
        assert_eq!(fc.len(), 1);

        let feature = &fc.features[0];
        assert_eq!(feature.get_property("code"), Some(&AttributeValue::Int(2)));
        assert_eq!(
            feature.get_property("label"),
            Some(&AttributeValue::String("200-400mm".into()))
        );

        let mp = multipolygon(feature);
        assert_eq!(mp.0.len(), 1);
        assert!(mp.0[0].interiors().is_empty());
        // Six corners plus the closing point
        assert_eq!(mp.0[0].exterior().0.len(), 7);
        assert_relative_eq!(mp.unsigned_area(), 5.0 * 16e6);
        match feature.get_property("area_m2") {
            Some(AttributeValue::Float(a)) => assert_relative_eq!(*a, 80e6),
            other => panic!("unexpected area_m2 {other:?}"),
        }
    }

    #[test]
    fn diagonal_cells_are_separate_regions() {
        let raster = classified(vec![2, ND, ND, 2], 2, 2);
        let fc = polygonize(&raster, "band").unwrap();
        assert_eq!(multipolygon(&fc.features[0]).0.len(), 2);
    }

    #[test]
    fn holes_are_preserved() {
        let raster = classified(
            vec![
                2, 2, 2,
                2, 1, 2,
                2, 2, 2,
            ],
            3,
            3,
        );
        let fc = polygonize(&raster, "band").unwrap();
        assert_eq!(fc.len(), 2);

        // Features are ordered by code
        let inner = multipolygon(&fc.features[0]);
        let ring = multipolygon(&fc.features[1]);
        assert_eq!(inner.0.len(), 1);
        assert_eq!(ring.0.len(), 1);
        assert_eq!(ring.0[0].interiors().len(), 1);
        assert_relative_eq!(ring.unsigned_area(), 8.0 * 16e6);
        assert_relative_eq!(inner.unsigned_area(), 16e6);
    }

    #[test]
    fn island_inside_hole() {
        let raster = classified(
            vec![
                2, 2, 2, 2, 2,
                2, 1, 1, 1, 2,
                2, 1, 2, 1, 2,
                2, 1, 1, 1, 2,
                2, 2, 2, 2, 2,
            ],
            5,
            5,
        );
        let fc = polygonize(&raster, "band").unwrap();
        let ones = multipolygon(&fc.features[0]);
        let twos = multipolygon(&fc.features[1]);

        assert_eq!(ones.0.len(), 1);
        assert_eq!(ones.0[0].interiors().len(), 1);
        assert_eq!(twos.0.len(), 2);
        let holes: usize = twos.0.iter().map(|p| p.interiors().len()).sum();
        assert_eq!(holes, 1);
        assert_relative_eq!(twos.unsigned_area(), 17.0 * 16e6);
    }

    #[test]
    fn map_coordinates_and_orientation() {
        let raster = Raster::from_vec(vec![ND, ND, 7, ND], 2, 2)
            .unwrap()
            .with_transform(GeoTransform::new(100.0, 200.0, 10.0, -10.0))
            .with_nodata(ND);
        let fc = polygonize(&raster, "x").unwrap();
        let mp = multipolygon(&fc.features[0]);

        let rect = mp.bounding_rect().unwrap();
        assert_eq!((rect.min().x, rect.min().y), (100.0, 180.0));
        assert_eq!((rect.max().x, rect.max().y), (110.0, 190.0));
        assert!(mp.0[0].exterior().is_ccw());
        // No CRS, so no area attribute
        assert!(fc.features[0].get_property("area_m2").is_none());
    }

    #[test]
    fn nodata_only_gives_empty_collection() {
        let raster = classified(vec![ND; 4], 2, 2);
        let fc = polygonize(&raster, "band").unwrap();
        assert!(fc.is_empty());
        assert_eq!(fc.crs().and_then(|c| c.epsg()), Some(5070));
    }

    #[test]
    fn isolate_keeps_single_code() {
        let raster = classified(vec![2, 2, 1, 3], 2, 2);
        let band = isolate_code(&raster, 2);
        assert_eq!(band.count_equal(2), 2);
        assert!(band.is_nodata_at(1, 0).unwrap());
        assert!(band.is_nodata_at(1, 1).unwrap());

        let fc = polygonize(&band, "200-400mm").unwrap();
        assert_eq!(fc.len(), 1);
        assert_eq!(multipolygon(&fc.features[0]).0.len(), 1);
    }
}
