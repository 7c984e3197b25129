//! Coordinate Reference System codes.

use serde::{Deserialize, Serialize};
use std::fmt;

/// CRS codes the hub can georeference output in.
///
/// Canonical datasets and raster artifacts are always geographic WGS84.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum CrsCode {
    /// WGS84 Geographic (lat/lon in degrees)
    #[default]
    #[serde(rename = "EPSG:4326")]
    Epsg4326,
}

impl CrsCode {
    /// Parse a CRS string such as "EPSG:4326", "epsg:4326" or "CRS:84".
    pub fn parse(s: &str) -> Result<Self, CrsParseError> {
        match s.trim().to_uppercase().as_str() {
            "EPSG:4326" | "CRS:84" | "WGS84" => Ok(CrsCode::Epsg4326),
            _ => Err(CrsParseError::UnsupportedCrs(s.to_string())),
        }
    }

    /// Numeric EPSG code, as written into GeoTIFF GeoKeys.
    pub fn epsg(&self) -> u16 {
        match self {
            CrsCode::Epsg4326 => 4326,
        }
    }

    /// Check if this is a geographic (lat/lon) CRS.
    pub fn is_geographic(&self) -> bool {
        matches!(self, CrsCode::Epsg4326)
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
        assert_eq!(CrsCode::parse("crs:84").unwrap(), CrsCode::Epsg4326);
        assert!(CrsCode::parse("EPSG:3857").is_err());
    }

    #[test]
    fn test_display_and_serde() {
        assert_eq!(CrsCode::Epsg4326.to_string(), "EPSG:4326");
        let json = serde_json::to_string(&CrsCode::Epsg4326).unwrap();
        assert_eq!(json, "\"EPSG:4326\"");
    }
}
