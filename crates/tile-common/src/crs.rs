//! Coordinate Reference System codes.

use serde::{Deserialize, Serialize};
use std::fmt;

/// CRS codes the pipeline understands.
///
/// Only the source CRS (geographic WGS84) and the spherical mercator target
/// are supported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CrsCode {
    /// WGS84 Geographic (lon/lat in degrees)
    Epsg4326,
    /// Web Mercator (meters)
    Epsg3857,
}

impl CrsCode {
    /// Parse a CRS string such as "EPSG:4326", "epsg:3857" or "CRS:84".
    pub fn parse(s: &str) -> Result<Self, CrsParseError> {
        let normalized = s.trim().to_uppercase();

        match normalized.as_str() {
            "EPSG:4326" | "CRS:84" | "WGS84" => Ok(CrsCode::Epsg4326),
            "EPSG:3857" | "EPSG:900913" | "EPSG:3785" => Ok(CrsCode::Epsg3857),
            _ => Err(CrsParseError::UnsupportedCrs(s.to_string())),
        }
    }

    /// Map a numeric EPSG code (as found in GeoTIFF geokeys).
    pub fn from_epsg(code: u32) -> Option<Self> {
        match code {
            4326 => Some(CrsCode::Epsg4326),
            3857 | 900913 | 3785 => Some(CrsCode::Epsg3857),
            _ => None,
        }
    }

    /// Numeric EPSG code.
    pub fn epsg(&self) -> u32 {
        match self {
            CrsCode::Epsg4326 => 4326,
            CrsCode::Epsg3857 => 3857,
        }
    }
}

impl fmt::Display for CrsCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EPSG:{}", self.epsg())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CrsParseError {
    #[error("Unsupported CRS: {0}")]
    UnsupportedCrs(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_crs() {
        assert_eq!(CrsCode::parse("EPSG:4326").unwrap(), CrsCode::Epsg4326);
        assert_eq!(CrsCode::parse("epsg:3857").unwrap(), CrsCode::Epsg3857);
        assert_eq!(CrsCode::parse("CRS:84").unwrap(), CrsCode::Epsg4326);
        assert!(CrsCode::parse("EPSG:32633").is_err());
    }

    #[test]
    fn test_epsg_roundtrip() {
        for code in [CrsCode::Epsg4326, CrsCode::Epsg3857] {
            assert_eq!(CrsCode::from_epsg(code.epsg()), Some(code));
        }
        assert_eq!(CrsCode::from_epsg(900913), Some(CrsCode::Epsg3857));
        assert_eq!(CrsCode::Epsg3857.to_string(), "EPSG:3857");
    }
}
