//! Common types and utilities shared across the mercator tiler crates.

pub mod bbox;
pub mod crs;
pub mod error;
pub mod raster;
pub mod tile;

pub use bbox::BoundingBox;
pub use crs::CrsCode;
pub use error::{TilerError, TilerResult};
pub use raster::{Band, ByteRaster, CellType, GeoTransform, Raster, RgbaRaster};
pub use tile::{TileCoord, TileScheme};
