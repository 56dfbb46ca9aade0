//! Web mercator tile grid: tile extents in meters and tile ranges covering
//! a projected extent.

use crate::mercator::{ORIGIN_SHIFT, WORLD_BOUNDS_3857};
use tile_common::{BoundingBox, TileCoord};

/// Extent of a tile in mercator meters.
pub fn tile_bounds(coord: &TileCoord) -> BoundingBox {
    let span = tile_span(coord.z);

    let min_x = -ORIGIN_SHIFT + coord.x as f64 * span;
    let max_y = ORIGIN_SHIFT - coord.y as f64 * span;

    BoundingBox::new(min_x, max_y - span, min_x + span, max_y)
}

/// Width of one tile at `zoom`, in meters.
pub fn tile_span(zoom: u32) -> f64 {
    2.0 * ORIGIN_SHIFT / TileCoord::matrix_size(zoom) as f64
}

/// Inclusive rectangle of tile indices at one zoom level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileRange {
    pub z: u32,
    pub min_x: u32,
    pub min_y: u32,
    pub max_x: u32,
    pub max_y: u32,
}

impl TileRange {
    /// Tiles at `zoom` overlapping `bounds` (mercator meters).
    ///
    /// Returns `None` when the extent misses the projected world entirely.
    pub fn covering(bounds: &BoundingBox, zoom: u32) -> Option<TileRange> {
        let clipped = bounds.intersection(&WORLD_BOUNDS_3857)?;
        let span = tile_span(zoom);
        let last = (TileCoord::matrix_size(zoom) - 1) as f64;

        let to_index = |v: f64| v.clamp(0.0, last) as u32;

        let min_x = to_index(((clipped.min_x + ORIGIN_SHIFT) / span).floor());
        let max_x = to_index(((clipped.max_x + ORIGIN_SHIFT) / span).ceil() - 1.0);
        let min_y = to_index(((ORIGIN_SHIFT - clipped.max_y) / span).floor());
        let max_y = to_index(((ORIGIN_SHIFT - clipped.min_y) / span).ceil() - 1.0);

        Some(TileRange {
            z: zoom,
            min_x,
            min_y,
            max_x: max_x.max(min_x),
            max_y: max_y.max(min_y),
        })
    }

    pub fn count(&self) -> usize {
        (self.max_x - self.min_x + 1) as usize * (self.max_y - self.min_y + 1) as usize
    }

    /// Tiles in row-major order.
    pub fn tiles(&self) -> Vec<TileCoord> {
        let mut tiles = Vec::with_capacity(self.count());
        for y in self.min_y..=self.max_y {
            for x in self.min_x..=self.max_x {
                tiles.push(TileCoord::new(self.z, x, y));
            }
        }
        tiles
    }
}
