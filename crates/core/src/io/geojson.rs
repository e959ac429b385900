//! GeoJSON reading and writing with the `geojson` crate.
//!
//! Only polygonal geometry is read. The CRS comes from the legacy `crs`
//! member when present and defaults to WGS84 as RFC 7946 prescribes.

use crate::crs::CRS;
use crate::error::{Error, Result};
use crate::vector::{AttributeValue, Feature, FeatureCollection};
use geo_types::{Geometry, Polygon};
use geojson::feature::Id;
use geojson::{GeoJson, JsonObject, JsonValue};
use serde_json::json;
use std::fs;
use std::path::Path;
use tracing::{debug, warn};

/// Read a GeoJSON file into a FeatureCollection
pub fn read_geojson<P: AsRef<Path>>(path: P) -> Result<FeatureCollection> {
    let path = path.as_ref();
    if !path.exists() {
        return Err(Error::NotFound(path.to_path_buf()));
    }
    let text = fs::read_to_string(path)?;
    let collection = parse_geojson(&text, path)?;
    debug!(
        "Read {} ({} features, crs {:?})",
        path.display(),
        collection.len(),
        collection.crs().map(|c| c.identifier())
    );
    Ok(collection)
}

/// Parse GeoJSON text; `source` only labels errors
pub fn parse_geojson(text: &str, source: &Path) -> Result<FeatureCollection> {
    let bad = |reason: String| Error::format(source, reason);

    let document: GeoJson = text.parse().map_err(|e| bad(format!("invalid GeoJSON: {e}")))?;
    let foreign = match &document {
        GeoJson::FeatureCollection(fc) => fc.foreign_members.as_ref(),
        GeoJson::Feature(f) => f.foreign_members.as_ref(),
        GeoJson::Geometry(g) => g.foreign_members.as_ref(),
    };
    let crs = match foreign.and_then(|members| members.get("crs")) {
        Some(member) => {
            parse_crs_member(member).ok_or_else(|| bad("unrecognized crs member".into()))?
        }
        None => CRS::wgs84(),
    };

    let mut collection = FeatureCollection::new(Some(crs));
    match document {
        GeoJson::FeatureCollection(fc) => {
            for (index, feature) in fc.features.into_iter().enumerate() {
                let converted =
                    convert_feature(feature).map_err(|e| bad(format!("feature {index}: {e}")))?;
                if let Some(f) = converted {
                    collection.push(f);
                }
            }
        }
        GeoJson::Feature(feature) => {
            if let Some(f) = convert_feature(feature).map_err(bad)? {
                collection.push(f);
            }
        }
        GeoJson::Geometry(geometry) => {
            if let Some(g) = convert_geometry(geometry.value).map_err(bad)? {
                collection.push(Feature::new(g));
            }
        }
    }

    if collection.is_empty() {
        return Err(bad("no polygon geometry found".into()));
    }
    Ok(collection)
}

fn parse_crs_member(member: &JsonValue) -> Option<CRS> {
    let name = member.get("properties")?.get("name")?.as_str()?;
    if name.ends_with("CRS84") {
        return Some(CRS::wgs84());
    }
    if !name.to_ascii_uppercase().contains("EPSG") {
        return None;
    }
    let code = name.rsplit(':').next()?.parse::<u32>().ok()?;
    Some(CRS::from_epsg(code))
}

fn convert_feature(feature: geojson::Feature) -> std::result::Result<Option<Feature>, String> {
    let Some(geometry) = feature.geometry else {
        return Ok(None);
    };
    let Some(geometry) = convert_geometry(geometry.value)? else {
        return Ok(None);
    };

    let mut out = Feature::new(geometry);
    for (key, v) in feature.properties.unwrap_or_default() {
        out.set_property(key, attribute_from_json(&v));
    }
    out.id = feature.id.map(|id| match id {
        Id::String(s) => s,
        Id::Number(n) => n.to_string(),
    });
    Ok(Some(out))
}

/// Polygonal geometry as geo-types; anything else is skipped
fn convert_geometry(value: geojson::Value) -> std::result::Result<Option<Geometry<f64>>, String> {
    let geometry = Geometry::<f64>::try_from(value).map_err(|e| e.to_string())?;
    match &geometry {
        Geometry::Polygon(p) => check_rings(p)?,
        Geometry::MultiPolygon(mp) => mp.iter().try_for_each(check_rings)?,
        other => {
            warn!("Skipping non-polygonal {} geometry", geometry_kind(other));
            return Ok(None);
        }
    }
    Ok(Some(geometry))
}

fn check_rings(polygon: &Polygon<f64>) -> std::result::Result<(), String> {
    let rings = std::iter::once(polygon.exterior()).chain(polygon.interiors());
    for ring in rings {
        if ring.0.len() < 4 {
            return Err(format!("ring has {} positions, at least 4 required", ring.0.len()));
        }
    }
    Ok(())
}

fn geometry_kind(geometry: &Geometry<f64>) -> &'static str {
    match geometry {
        Geometry::Point(_) => "Point",
        Geometry::MultiPoint(_) => "MultiPoint",
        Geometry::Line(_) | Geometry::LineString(_) => "LineString",
        Geometry::MultiLineString(_) => "MultiLineString",
        Geometry::GeometryCollection(_) => "GeometryCollection",
        _ => "polygonal",
    }
}

fn attribute_from_json(value: &JsonValue) -> AttributeValue {
    match value {
        JsonValue::Null => AttributeValue::Null,
        JsonValue::Bool(b) => AttributeValue::Bool(*b),
        JsonValue::Number(n) => match n.as_i64() {
            Some(i) => AttributeValue::Int(i),
            None => AttributeValue::Float(n.as_f64().unwrap_or(f64::NAN)),
        },
        JsonValue::String(s) => AttributeValue::String(s.clone()),
        other => AttributeValue::String(other.to_string()),
    }
}

/// Serialize a FeatureCollection as a GeoJSON document
pub fn to_geojson_string(collection: &FeatureCollection) -> Result<String> {
    let encoding = |e: serde_json::Error| Error::Other(format!("GeoJSON encoding failed: {e}"));

    let features = collection
        .iter()
        .map(|f| {
            let properties: JsonObject = f
                .properties
                .iter()
                .map(|(k, v)| Ok((k.clone(), serde_json::to_value(v)?)))
                .collect::<std::result::Result<_, serde_json::Error>>()?;
            Ok(geojson::Feature {
                bbox: None,
                geometry: f
                    .geometry
                    .as_ref()
                    .map(|g| geojson::Geometry::new(geojson::Value::from(g))),
                id: f.id.clone().map(Id::String),
                properties: Some(properties),
                foreign_members: None,
            })
        })
        .collect::<std::result::Result<Vec<_>, serde_json::Error>>()
        .map_err(encoding)?;

    let mut document = geojson::FeatureCollection {
        bbox: None,
        features,
        foreign_members: None,
    };
    match collection.crs() {
        Some(crs) if crs.epsg() == Some(4326) => {}
        Some(crs) => match crs.epsg() {
            Some(code) => {
                let member = json!({
                    "type": "name",
                    "properties": { "name": format!("urn:ogc:def:crs:EPSG::{code}") },
                });
                let members = JsonObject::from_iter([("crs".to_string(), member)]);
                document.foreign_members = Some(members);
            }
            None => warn!("CRS {} has no EPSG code, GeoJSON will not record it", crs),
        },
        None => {}
    }

    serde_json::to_string_pretty(&document).map_err(encoding)
}

/// Write a FeatureCollection to a GeoJSON file
pub fn write_geojson<P: AsRef<Path>>(collection: &FeatureCollection, path: P) -> Result<()> {
    let text = to_geojson_string(collection)?;
    fs::write(path.as_ref(), text)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo_types::{polygon, MultiPolygon};

    const STATE: &str = r#"{
        "type": "FeatureCollection",
        "crs": { "type": "name", "properties": { "name": "urn:ogc:def:crs:EPSG::4269" } },
        "features": [
            {
                "type": "Feature",
                "properties": { "NAME": "Colorado", "STATEFP": "08" },
                "geometry": {
                    "type": "Polygon",
                    "coordinates": [[
                        [-109.05, 37.0], [-102.04, 37.0], [-102.04, 41.0],
                        [-109.05, 41.0], [-109.05, 37.0]
                    ]]
                }
            },
            {
                "type": "Feature",
                "properties": {},
                "geometry": { "type": "Point", "coordinates": [-105.0, 39.7] }
            }
        ]
    }"#;

    #[test]
    fn parses_state_boundary() {
        let fc = parse_geojson(STATE, Path::new("state.geojson")).unwrap();
        assert_eq!(fc.len(), 1);
        assert_eq!(fc.crs().and_then(|c| c.epsg()), Some(4269));
        assert_eq!(
            fc.features[0].get_property("NAME"),
            Some(&AttributeValue::String("Colorado".into()))
        );
        assert_eq!(fc.polygons().0[0].exterior().0.len(), 5);
    }

    #[test]
    fn bare_geometry_defaults_to_wgs84() {
        let text = r#"{"type": "Polygon", "coordinates": [[[0,0],[1,0],[1,1],[0,0]]]}"#;
        let fc = parse_geojson(text, Path::new("bare.json")).unwrap();
        assert_eq!(fc.crs(), Some(&CRS::wgs84()));
    }

    #[test]
    fn rejects_documents_without_polygons() {
        let text = r#"{"type": "Point", "coordinates": [0, 0]}"#;
        let err = parse_geojson(text, Path::new("p.json")).unwrap_err();
        assert!(matches!(err, Error::Format { .. }));

        let err = parse_geojson("{ not json", Path::new("broken.json")).unwrap_err();
        assert!(matches!(err, Error::Format { .. }));
    }

    #[test]
    fn write_then_read_keeps_crs_and_properties() {
        let square = polygon![
            (x: 0.0, y: 0.0),
            (x: 4000.0, y: 0.0),
            (x: 4000.0, y: 4000.0),
            (x: 0.0, y: 4000.0),
            (x: 0.0, y: 0.0),
        ];
        let mut fc = FeatureCollection::new(Some(CRS::conus_albers()));
        fc.push(
            Feature::new(Geometry::MultiPolygon(MultiPolygon::new(vec![square])))
                .with_property("code", 2)
                .with_property("label", "200-400mm"),
        );

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("band.geojson");
        write_geojson(&fc, &path).unwrap();

        let back = read_geojson(&path).unwrap();
        assert_eq!(back.crs().and_then(|c| c.epsg()), Some(5070));
        assert_eq!(back.features[0].get_property("code"), Some(&AttributeValue::Int(2)));
        assert_eq!(back.polygons(), fc.polygons());
    }

    #[test]
    fn missing_file() {
        let err = read_geojson("/no/such/boundary.geojson").unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }
}
