//! Coordinate Reference System handling

mod transform;

pub use transform::CoordTransformer;

use serde::{Deserialize, Serialize};
use std::fmt;

/// Coordinate Reference System representation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CRS {
    /// WKT representation
    wkt: Option<String>,
    /// EPSG code if known
    epsg: Option<u32>,
    /// PROJ string if available
    proj: Option<String>,
}

/// Unit of the coordinate axes of a CRS
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CrsUnit {
    Degree,
    Metre,
    Kilometre,
    Foot,
    UsSurveyFoot,
}

impl CrsUnit {
    /// Whether coordinates are angles (lon/lat)
    pub fn is_angular(&self) -> bool {
        matches!(self, CrsUnit::Degree)
    }

    /// Length of one unit in metres, `None` for angular units
    pub fn metres_per_unit(&self) -> Option<f64> {
        match self {
            CrsUnit::Degree => None,
            CrsUnit::Metre => Some(1.0),
            CrsUnit::Kilometre => Some(1000.0),
            CrsUnit::Foot => Some(0.3048),
            CrsUnit::UsSurveyFoot => Some(1200.0 / 3937.0),
        }
    }
}

impl CRS {
    /// Create a CRS from an EPSG code
    pub fn from_epsg(code: u32) -> Self {
        Self {
            wkt: None,
            epsg: Some(code),
            proj: None,
        }
    }

    /// Create a CRS from a WKT string
    pub fn from_wkt(wkt: impl Into<String>) -> Self {
        Self {
            wkt: Some(wkt.into()),
            epsg: None,
            proj: None,
        }
    }

    /// Create a CRS from a PROJ string
    pub fn from_proj(proj: impl Into<String>) -> Self {
        Self {
            wkt: None,
            epsg: None,
            proj: Some(proj.into()),
        }
    }

    /// Parse a user-facing CRS description.
    ///
    /// Accepts `EPSG:5070`, a bare code (`5070`), or a PROJ string (`+proj=...`).
    pub fn parse(text: &str) -> Option<Self> {
        let text = text.trim();
        if text.starts_with('+') {
            return Some(Self::from_proj(text));
        }
        let code = text
            .strip_prefix("EPSG:")
            .or_else(|| text.strip_prefix("epsg:"))
            .unwrap_or(text);
        code.parse::<u32>().ok().map(Self::from_epsg)
    }

    /// WGS84 geographic CRS (EPSG:4326)
    pub fn wgs84() -> Self {
        Self::from_epsg(4326)
    }

    /// NAD83 geographic CRS (EPSG:4269)
    pub fn nad83() -> Self {
        Self::from_epsg(4269)
    }

    /// CONUS Albers equal-area, NAD83 (EPSG:5070)
    pub fn conus_albers() -> Self {
        Self::from_epsg(5070)
    }

    /// Get EPSG code if known
    pub fn epsg(&self) -> Option<u32> {
        self.epsg
    }

    /// Get WKT representation
    pub fn wkt(&self) -> Option<&str> {
        self.wkt.as_deref()
    }

    /// Get PROJ string
    pub fn proj(&self) -> Option<&str> {
        self.proj.as_deref()
    }

    /// PROJ definition usable for coordinate transforms.
    ///
    /// Explicit PROJ strings win; EPSG codes resolve through the built-in table.
    pub fn proj_definition(&self) -> Option<String> {
        if let Some(proj) = &self.proj {
            return Some(proj.clone());
        }
        self.epsg.and_then(epsg_proj_string)
    }

    /// Axis unit of this CRS, if it can be determined
    pub fn unit(&self) -> Option<CrsUnit> {
        if let Some(def) = self.proj_definition() {
            return Some(unit_from_proj(&def));
        }
        self.wkt.as_deref().and_then(unit_from_wkt)
    }

    /// Whether this CRS is known to use angular (lon/lat) coordinates
    pub fn is_geographic(&self) -> bool {
        self.unit().is_some_and(|u| u.is_angular())
    }

    /// Check if two CRS are equivalent
    pub fn is_equivalent(&self, other: &CRS) -> bool {
        if let (Some(a), Some(b)) = (self.epsg, other.epsg) {
            return a == b;
        }

        if let (Some(a), Some(b)) = (self.proj_definition(), other.proj_definition()) {
            return normalize_proj(&a) == normalize_proj(&b);
        }

        // Textual WKT comparison is imperfect but catches identical sources
        if let (Some(a), Some(b)) = (&self.wkt, &other.wkt) {
            return a == b;
        }

        false
    }

    /// Get a string identifier for this CRS
    pub fn identifier(&self) -> String {
        if let Some(code) = self.epsg {
            return format!("EPSG:{}", code);
        }
        if let Some(proj) = &self.proj {
            return proj.clone();
        }
        if let Some(wkt) = &self.wkt {
            let end = wkt
                .char_indices()
                .nth(50)
                .map(|(i, _)| i)
                .unwrap_or(wkt.len());
            return format!("WKT:{}", &wkt[..end]);
        }
        "Unknown".to_string()
    }
}

impl fmt::Display for CRS {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.identifier())
    }
}

impl Default for CRS {
    fn default() -> Self {
        Self::wgs84()
    }
}

/// PROJ definitions for the EPSG codes this crate knows how to transform
pub fn epsg_proj_string(code: u32) -> Option<String> {
    let def = match code {
        4326 => "+proj=longlat +datum=WGS84 +no_defs",
        4269 => "+proj=longlat +ellps=GRS80 +towgs84=0,0,0,0,0,0,0 +no_defs",
        3857 => "+proj=merc +a=6378137 +b=6378137 +lat_ts=0 +lon_0=0 +x_0=0 +y_0=0 +k=1 +units=m +no_defs",
        5070 => "+proj=aea +lat_0=23 +lon_0=-96 +lat_1=29.5 +lat_2=45.5 +x_0=0 +y_0=0 +ellps=GRS80 +towgs84=0,0,0,0,0,0,0 +units=m +no_defs",
        3310 => "+proj=aea +lat_0=0 +lon_0=-120 +lat_1=34 +lat_2=40.5 +x_0=0 +y_0=-4000000 +ellps=GRS80 +towgs84=0,0,0,0,0,0,0 +units=m +no_defs",
        6933 => "+proj=cea +lat_ts=30 +lon_0=0 +x_0=0 +y_0=0 +datum=WGS84 +units=m +no_defs",
        32601..=32660 => {
            return Some(format!(
                "+proj=utm +zone={} +datum=WGS84 +units=m +no_defs",
                code - 32600
            ))
        }
        32701..=32760 => {
            return Some(format!(
                "+proj=utm +zone={} +south +datum=WGS84 +units=m +no_defs",
                code - 32700
            ))
        }
        _ => return None,
    };
    Some(def.to_string())
}

fn unit_from_proj(def: &str) -> CrsUnit {
    let mut unit = CrsUnit::Metre;
    for token in def.split_whitespace() {
        match token {
            "+proj=longlat" | "+proj=latlong" | "+proj=lonlat" | "+proj=latlon" => {
                return CrsUnit::Degree
            }
            "+units=m" => unit = CrsUnit::Metre,
            "+units=km" => unit = CrsUnit::Kilometre,
            "+units=ft" => unit = CrsUnit::Foot,
            "+units=us-ft" => unit = CrsUnit::UsSurveyFoot,
            _ => {}
        }
    }
    unit
}

fn unit_from_wkt(wkt: &str) -> Option<CrsUnit> {
    let upper = wkt.trim_start().to_ascii_uppercase();
    if upper.starts_with("GEOGCS") || upper.starts_with("GEOGCRS") || upper.starts_with("GEODCRS") {
        return Some(CrsUnit::Degree);
    }
    if !(upper.starts_with("PROJCS") || upper.starts_with("PROJCRS")) {
        return None;
    }

    // The projected unit is the last UNIT clause; earlier ones belong to the base CRS
    let last_unit = upper.rfind("UNIT[")?;
    let clause = upper[last_unit..].to_ascii_lowercase();
    if clause.contains("us survey foot") || clause.contains("foot_us") {
        Some(CrsUnit::UsSurveyFoot)
    } else if clause.contains("foot") {
        Some(CrsUnit::Foot)
    } else if clause.contains("kilometre") || clause.contains("kilometer") {
        Some(CrsUnit::Kilometre)
    } else if clause.contains("metre") || clause.contains("meter") {
        Some(CrsUnit::Metre)
    } else {
        None
    }
}

fn normalize_proj(def: &str) -> Vec<&str> {
    let mut tokens: Vec<&str> = def
        .split_whitespace()
        .filter(|t| *t != "+no_defs" && *t != "+wktext" && *t != "+type=crs")
        .collect();
    tokens.sort_unstable();
    tokens.dedup();
    tokens
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_crs_epsg() {
        let crs = CRS::from_epsg(4326);
        assert_eq!(crs.epsg(), Some(4326));
        assert_eq!(crs.identifier(), "EPSG:4326");
    }

    #[test]
    fn test_crs_equivalence() {
        let a = CRS::from_epsg(4326);
        let b = CRS::wgs84();
        assert!(a.is_equivalent(&b));
        assert!(!a.is_equivalent(&CRS::conus_albers()));
    }

    #[test]
    fn test_epsg_and_proj_equivalence() {
        let proj = CRS::from_proj(epsg_proj_string(5070).unwrap());
        assert!(proj.is_equivalent(&CRS::conus_albers()));
    }

    #[test]
    fn test_parse() {
        assert_eq!(CRS::parse("EPSG:5070").unwrap().epsg(), Some(5070));
        assert_eq!(CRS::parse("4269").unwrap().epsg(), Some(4269));
        assert!(CRS::parse("+proj=longlat +datum=WGS84").unwrap().proj().is_some());
        assert!(CRS::parse("albers").is_none());
    }

    #[test]
    fn test_units() {
        assert_eq!(CRS::nad83().unit(), Some(CrsUnit::Degree));
        assert_eq!(CRS::conus_albers().unit(), Some(CrsUnit::Metre));
        assert_eq!(CRS::from_epsg(32614).unit(), Some(CrsUnit::Metre));
        assert_eq!(CRS::from_epsg(2229).unit(), None);
        assert_eq!(
            CRS::from_proj("+proj=lcc +lat_1=33 +lat_2=45 +units=us-ft").unit(),
            Some(CrsUnit::UsSurveyFoot)
        );
        assert!(CRS::wgs84().is_geographic());
    }

    #[test]
    fn test_wkt_units() {
        let geog = CRS::from_wkt(
            r#"GEOGCS["NAD83",DATUM["North_American_Datum_1983"],UNIT["degree",0.0174532925199433]]"#,
        );
        assert_eq!(geog.unit(), Some(CrsUnit::Degree));

        let proj = CRS::from_wkt(
            r#"PROJCS["Albers",GEOGCS["NAD83",UNIT["degree",0.0174532925199433]],PROJECTION["Albers_Conic_Equal_Area"],UNIT["metre",1]]"#,
        );
        assert_eq!(proj.unit(), Some(CrsUnit::Metre));
    }
}
