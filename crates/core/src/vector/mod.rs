//! Vector features: boundaries read from disk and polygons traced from rasters

use crate::crs::CRS;
use geo::BoundingRect;
use geo_types::{Geometry, MultiPolygon, Rect};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Attribute value types
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttributeValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
}

impl From<&str> for AttributeValue {
    fn from(value: &str) -> Self {
        AttributeValue::String(value.to_string())
    }
}

impl From<String> for AttributeValue {
    fn from(value: String) -> Self {
        AttributeValue::String(value)
    }
}

impl From<i64> for AttributeValue {
    fn from(value: i64) -> Self {
        AttributeValue::Int(value)
    }
}

impl From<i32> for AttributeValue {
    fn from(value: i32) -> Self {
        AttributeValue::Int(value.into())
    }
}

impl From<f64> for AttributeValue {
    fn from(value: f64) -> Self {
        AttributeValue::Float(value)
    }
}

/// A geographic feature with geometry and attributes
#[derive(Debug, Clone, PartialEq)]
pub struct Feature {
    pub geometry: Option<Geometry<f64>>,
    /// Attributes, kept sorted so exports are stable
    pub properties: BTreeMap<String, AttributeValue>,
    pub id: Option<String>,
}

impl Feature {
    /// Create a new feature with geometry
    pub fn new(geometry: Geometry<f64>) -> Self {
        Self {
            geometry: Some(geometry),
            properties: BTreeMap::new(),
            id: None,
        }
    }

    /// Set an attribute
    pub fn set_property(&mut self, key: impl Into<String>, value: impl Into<AttributeValue>) {
        self.properties.insert(key.into(), value.into());
    }

    /// Builder-style attribute setter
    pub fn with_property(
        mut self,
        key: impl Into<String>,
        value: impl Into<AttributeValue>,
    ) -> Self {
        self.set_property(key, value);
        self
    }

    /// Get an attribute
    pub fn get_property(&self, key: &str) -> Option<&AttributeValue> {
        self.properties.get(key)
    }
}

/// Collection of features sharing one CRS
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeatureCollection {
    pub features: Vec<Feature>,
    pub crs: Option<CRS>,
}

impl FeatureCollection {
    pub fn new(crs: Option<CRS>) -> Self {
        Self {
            features: Vec::new(),
            crs,
        }
    }

    pub fn push(&mut self, feature: Feature) {
        self.features.push(feature);
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Feature> {
        self.features.iter()
    }

    pub fn crs(&self) -> Option<&CRS> {
        self.crs.as_ref()
    }

    /// All polygonal geometry of the collection as one multipolygon
    pub fn polygons(&self) -> MultiPolygon<f64> {
        let mut polygons = Vec::new();
        for geometry in self.features.iter().filter_map(|f| f.geometry.as_ref()) {
            match geometry {
                Geometry::Polygon(p) => polygons.push(p.clone()),
                Geometry::MultiPolygon(mp) => polygons.extend(mp.0.iter().cloned()),
                _ => {}
            }
        }
        MultiPolygon::new(polygons)
    }

    /// Envelope of all polygonal geometry, `None` when there is none
    pub fn bounding_rect(&self) -> Option<Rect<f64>> {
        self.polygons().bounding_rect()
    }
}

impl IntoIterator for FeatureCollection {
    type Item = Feature;
    type IntoIter = std::vec::IntoIter<Feature>;

    fn into_iter(self) -> Self::IntoIter {
        self.features.into_iter()
    }
}
