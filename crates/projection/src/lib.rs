//! Coordinate transformations for the tiling pipeline.
//!
//! Implements spherical mercator and its tile grid from scratch without
//! external projection libraries.

pub mod mercator;
pub mod tile_grid;

pub use mercator::{
    lonlat_to_meters, meters_to_lonlat, project_bounds, resolution, unproject_bounds,
    MAX_LATITUDE, ORIGIN_SHIFT, SAFE_BOUNDS_4326, WORLD_BOUNDS_3857,
};
pub use tile_grid::{tile_bounds, tile_span, TileRange};
