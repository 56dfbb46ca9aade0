//! Tile coordinates and naming schemes for slippy-map pyramids.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A tile coordinate (z/x/y) with XYZ row order (row 0 at the north edge).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TileCoord {
    /// Zoom level
    pub z: u32,
    /// Column (x)
    pub x: u32,
    /// Row (y)
    pub y: u32,
}

impl TileCoord {
    pub fn new(z: u32, x: u32, y: u32) -> Self {
        Self { z, x, y }
    }

    /// Number of tiles along one axis at this zoom.
    pub fn matrix_size(z: u32) -> u32 {
        1u32 << z
    }

    /// Get the parent tile (zoom - 1).
    pub fn parent(&self) -> Option<TileCoord> {
        if self.z == 0 {
            return None;
        }
        Some(TileCoord {
            z: self.z - 1,
            x: self.x / 2,
            y: self.y / 2,
        })
    }

    /// Get the four children tiles (zoom + 1), in row-major quadrant order:
    /// top-left, top-right, bottom-left, bottom-right.
    pub fn children(&self) -> [TileCoord; 4] {
        let x = self.x * 2;
        let y = self.y * 2;
        let z = self.z + 1;
        [
            TileCoord { z, x, y },
            TileCoord { z, x: x + 1, y },
            TileCoord { z, x, y: y + 1 },
            TileCoord {
                z,
                x: x + 1,
                y: y + 1,
            },
        ]
    }
}

impl fmt::Display for TileCoord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.z, self.x, self.y)
    }
}

/// Row numbering used when naming tile files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TileScheme {
    /// Row 0 at the top (OSM / Google / Leaflet default)
    #[default]
    Xyz,
    /// Row 0 at the bottom (TMS, gdal2tiles default)
    Tms,
}

impl TileScheme {
    /// Row number of `coord` under this scheme.
    pub fn row(&self, coord: &TileCoord) -> u32 {
        match self {
            TileScheme::Xyz => coord.y,
            TileScheme::Tms => TileCoord::matrix_size(coord.z) - 1 - coord.y,
        }
    }

    /// Relative file path `{z}/{x}/{y}.{ext}` for a tile.
    pub fn tile_path(&self, coord: &TileCoord, extension: &str) -> String {
        format!("{}/{}/{}.{}", coord.z, coord.x, self.row(coord), extension)
    }
}

impl FromStr for TileScheme {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "xyz" | "google" | "osm" => Ok(TileScheme::Xyz),
            "tms" => Ok(TileScheme::Tms),
            other => Err(format!("unknown tile scheme '{}', expected xyz or tms", other)),
        }
    }
}

impl fmt::Display for TileScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TileScheme::Xyz => write!(f, "xyz"),
            TileScheme::Tms => write!(f, "tms"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parent_children() {
        let tile = TileCoord::new(3, 5, 6);
        for child in tile.children() {
            assert_eq!(child.parent(), Some(tile));
        }
        assert_eq!(TileCoord::new(0, 0, 0).parent(), None);
    }

    #[test]
    fn test_tms_flip() {
        let coord = TileCoord::new(2, 1, 0);
        assert_eq!(TileScheme::Xyz.row(&coord), 0);
        assert_eq!(TileScheme::Tms.row(&coord), 3);
        assert_eq!(TileScheme::Tms.tile_path(&coord, "png"), "2/1/3.png");
        assert_eq!(TileScheme::Xyz.tile_path(&coord, "png"), "2/1/0.png");
    }

    #[test]
    fn test_scheme_parse() {
        assert_eq!("TMS".parse::<TileScheme>().unwrap(), TileScheme::Tms);
        assert_eq!("xyz".parse::<TileScheme>().unwrap(), TileScheme::Xyz);
        assert!("quadkey".parse::<TileScheme>().is_err());
    }
}
