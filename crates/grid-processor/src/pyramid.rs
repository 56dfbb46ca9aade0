//! Web mercator tile pyramids.
//!
//! The base level (`z_max`) is cut directly from the mercator raster. Each
//! coarser level is derived only from the level below it: a parent tile is the
//! 2x2 reduction of its four children. Levels are built one after another and
//! the tiles of a level in parallel, so the result does not depend on thread
//! scheduling.

use std::collections::{BTreeMap, BTreeSet};

use projection::{tile_bounds, tile_span, TileRange, ORIGIN_SHIFT};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tile_common::{
    BoundingBox, CrsCode, GeoTransform, RgbaRaster, TileCoord, TilerError, TilerResult,
};
use tracing::{debug, info, warn};

use crate::downsample::{combine_children, DownsampleMethod};
use crate::warp::interpolation::sample;
use crate::types::Resampling;

/// Deepest zoom level a pyramid may be built to.
pub const MAX_ZOOM: i32 = 30;

/// Largest supported tile edge in pixels.
pub const MAX_TILE_SIZE: u32 = 4096;

/// Pyramid construction settings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PyramidConfig {
    /// Tile edge length in pixels (power of two).
    pub tile_size: u32,
    /// Reduction used for overview levels.
    pub overview: DownsampleMethod,
    /// Sampling of the mercator raster for base tiles.
    pub base_sampling: Resampling,
}

impl Default for PyramidConfig {
    fn default() -> Self {
        Self {
            tile_size: 256,
            overview: DownsampleMethod::Average,
            base_sampling: Resampling::Nearest,
        }
    }
}

impl PyramidConfig {
    pub fn validate(&self) -> TilerResult<()> {
        let in_range = (2..=MAX_TILE_SIZE).contains(&self.tile_size);
        if !in_range || !self.tile_size.is_power_of_two() {
            return Err(TilerError::InvalidConfig(format!(
                "tile size {} must be a power of two between 2 and {}",
                self.tile_size, MAX_TILE_SIZE
            )));
        }
        Ok(())
    }
}

/// Check a requested zoom range and convert it to unsigned levels.
pub fn validate_zoom_range(z_min: i32, z_max: i32) -> TilerResult<(u32, u32)> {
    if z_min < 0 || z_max < 0 {
        return Err(TilerError::invalid_zoom(
            z_min as i64,
            z_max as i64,
            "zoom levels must not be negative",
        ));
    }
    if z_min > z_max {
        return Err(TilerError::invalid_zoom(
            z_min as i64,
            z_max as i64,
            "minimum zoom is greater than maximum zoom",
        ));
    }
    if z_max > MAX_ZOOM {
        return Err(TilerError::invalid_zoom(
            z_min as i64,
            z_max as i64,
            format!("maximum zoom is limited to {}", MAX_ZOOM),
        ));
    }
    Ok((z_min as u32, z_max as u32))
}

/// One square RGBA tile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tile {
    pub coord: TileCoord,
    pub pixels: Vec<u8>,
}

impl Tile {
    /// True when no pixel has any opacity.
    pub fn is_transparent(&self) -> bool {
        self.pixels.chunks_exact(4).all(|p| p[3] == 0)
    }
}

/// Sparse set of tiles over a zoom range, ordered by (z, x, y).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TilePyramid {
    tile_size: u32,
    z_min: u32,
    z_max: u32,
    tiles: BTreeMap<TileCoord, Tile>,
}

impl TilePyramid {
    pub fn tile_size(&self) -> u32 {
        self.tile_size
    }

    /// Inclusive zoom range the pyramid was built for.
    pub fn zoom_range(&self) -> (u32, u32) {
        (self.z_min, self.z_max)
    }

    pub fn tile_count(&self) -> usize {
        self.tiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tiles.is_empty()
    }

    pub fn get(&self, coord: &TileCoord) -> Option<&Tile> {
        self.tiles.get(coord)
    }

    /// All tiles in (z, x, y) order.
    pub fn tiles(&self) -> impl Iterator<Item = &Tile> {
        self.tiles.values()
    }

    /// Tiles of one zoom level in (x, y) order.
    pub fn tiles_at(&self, z: u32) -> impl Iterator<Item = &Tile> {
        let start = TileCoord::new(z, 0, 0);
        let end = TileCoord::new(z, u32::MAX, u32::MAX);
        self.tiles.range(start..=end).map(|(_, tile)| tile)
    }

    /// Number of tiles per zoom level, coarsest first.
    pub fn level_counts(&self) -> Vec<(u32, usize)> {
        (self.z_min..=self.z_max)
            .map(|z| (z, self.tiles_at(z).count()))
            .collect()
    }

    /// Mercator extent of the base-level tiles.
    pub fn bounds(&self) -> Option<BoundingBox> {
        self.tiles_at(self.z_max)
            .map(|t| tile_bounds(&t.coord))
            .reduce(|a, b| {
                BoundingBox::new(
                    a.min_x.min(b.min_x),
                    a.min_y.min(b.min_y),
                    a.max_x.max(b.max_x),
                    a.max_y.max(b.max_y),
                )
            })
    }

    /// Reassemble level `z` into one georeferenced raster.
    ///
    /// The raster spans the rectangle of tile slots between the outermost
    /// present tiles; empty slots are transparent.
    pub fn mosaic(&self, z: u32) -> Option<RgbaRaster> {
        let coords: Vec<TileCoord> = self.tiles_at(z).map(|t| t.coord).collect();
        let min_x = coords.iter().map(|c| c.x).min()?;
        let max_x = coords.iter().map(|c| c.x).max()?;
        let min_y = coords.iter().map(|c| c.y).min()?;
        let max_y = coords.iter().map(|c| c.y).max()?;

        let ts = self.tile_size as usize;
        let width = (max_x - min_x + 1) as usize * ts;
        let height = (max_y - min_y + 1) as usize * ts;

        let span = tile_span(z);
        let res = span / ts as f64;
        let transform = GeoTransform::north_up(
            -ORIGIN_SHIFT + min_x as f64 * span,
            ORIGIN_SHIFT - min_y as f64 * span,
            res,
            -res,
        );
        let mut raster = RgbaRaster::transparent(width, height, transform, Some(CrsCode::Epsg3857));

        for tile in self.tiles_at(z) {
            let x_off = (tile.coord.x - min_x) as usize * ts;
            let y_off = (tile.coord.y - min_y) as usize * ts;
            for row in 0..ts {
                let src = row * ts * 4;
                let dst = ((y_off + row) * width + x_off) * 4;
                raster.pixels[dst..dst + ts * 4].copy_from_slice(&tile.pixels[src..src + ts * 4]);
            }
        }

        Some(raster)
    }
}

/// Builds [`TilePyramid`]s from mercator rasters.
#[derive(Debug, Clone, Default)]
pub struct PyramidBuilder {
    config: PyramidConfig,
}

impl PyramidBuilder {
    pub fn new(config: PyramidConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PyramidConfig {
        &self.config
    }

    /// Build all levels from `z_min` to `z_max` (inclusive).
    ///
    /// `raster` must be a north-up EPSG:3857 raster.
    pub fn build(&self, raster: &RgbaRaster, z_min: i32, z_max: i32) -> TilerResult<TilePyramid> {
        let (z_min, z_max) = validate_zoom_range(z_min, z_max)?;
        self.config.validate()?;

        if raster.crs != Some(CrsCode::Epsg3857) {
            return Err(TilerError::Reprojection(format!(
                "pyramid source must be EPSG:3857, got {}",
                raster
                    .crs
                    .map(|c| c.to_string())
                    .unwrap_or_else(|| "no CRS".to_string())
            )));
        }
        if !raster.transform.is_north_up() {
            return Err(TilerError::Reprojection(
                "pyramid source transform is not north-up".to_string(),
            ));
        }

        let mut pyramid = TilePyramid {
            tile_size: self.config.tile_size,
            z_min,
            z_max,
            tiles: BTreeMap::new(),
        };

        let Some(range) = TileRange::covering(&raster.bounds(), z_max) else {
            warn!(z_max, "Raster does not overlap the mercator world, pyramid is empty");
            return Ok(pyramid);
        };

        // A source pixel no larger than a tile touches at most four tiles
        let pixels = raster.width.saturating_mul(raster.height);
        if range.count() > pixels.saturating_mul(4) {
            return Err(TilerError::invalid_zoom(
                z_min as i64,
                z_max as i64,
                format!(
                    "{}x{} raster is too coarse for zoom {} ({} base tiles); \
                     reproject it at the base resolution first",
                    raster.width,
                    raster.height,
                    z_max,
                    range.count()
                ),
            ));
        }

        let base: Vec<Tile> = range
            .tiles()
            .into_par_iter()
            .filter_map(|coord| self.render_base_tile(raster, coord))
            .collect();

        debug!(
            z = z_max,
            slots = range.count(),
            tiles = base.len(),
            "Built base level"
        );
        pyramid.insert_level(base);

        for z in (z_min..z_max).rev() {
            let parents: BTreeSet<TileCoord> = pyramid
                .tiles_at(z + 1)
                .filter_map(|t| t.coord.parent())
                .collect();

            let level: Vec<Tile> = parents
                .into_par_iter()
                .filter_map(|coord| self.render_overview_tile(&pyramid, coord))
                .collect();

            debug!(z, tiles = level.len(), "Built overview level");
            pyramid.insert_level(level);
        }

        info!(
            z_min,
            z_max,
            tiles = pyramid.tile_count(),
            tile_size = self.config.tile_size,
            overview = %self.config.overview,
            "Tile pyramid complete"
        );

        Ok(pyramid)
    }

    /// Sample the raster at every pixel centre of a base tile.
    fn render_base_tile(&self, raster: &RgbaRaster, coord: TileCoord) -> Option<Tile> {
        let ts = self.config.tile_size as usize;
        let bounds = tile_bounds(&coord);
        let res = tile_span(coord.z) / ts as f64;
        let mut pixels = vec![0u8; ts * ts * 4];
        let mut any_opaque = false;

        for row in 0..ts {
            let y = bounds.max_y - (row as f64 + 0.5) * res;
            for col in 0..ts {
                let x = bounds.min_x + (col as f64 + 0.5) * res;
                let sampled = raster
                    .transform
                    .world_to_pixel(x, y)
                    .and_then(|(c, r)| sample(raster, c, r, self.config.base_sampling));
                if let Some(px) = sampled {
                    if px[3] > 0 {
                        let idx = (row * ts + col) * 4;
                        pixels[idx..idx + 4].copy_from_slice(&px);
                        any_opaque = true;
                    }
                }
            }
        }

        any_opaque.then_some(Tile { coord, pixels })
    }

    fn render_overview_tile(&self, pyramid: &TilePyramid, coord: TileCoord) -> Option<Tile> {
        let children = coord
            .children()
            .map(|c| pyramid.get(&c).map(|t| t.pixels.as_slice()));
        let pixels = combine_children(
            children,
            self.config.tile_size as usize,
            self.config.overview,
        );
        let tile = Tile { coord, pixels };
        (!tile.is_transparent()).then_some(tile)
    }
}

impl TilePyramid {
    fn insert_level(&mut self, tiles: Vec<Tile>) {
        for tile in tiles {
            self.tiles.insert(tile.coord, tile);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use projection::resolution;

    fn mercator_raster(z: u32, col0: usize, row0: usize, width: usize, height: usize) -> RgbaRaster {
        let res = resolution(z, 256);
        let gt = GeoTransform::north_up(
            -ORIGIN_SHIFT + col0 as f64 * res,
            ORIGIN_SHIFT - row0 as f64 * res,
            res,
            -res,
        );
        let mut raster = RgbaRaster::transparent(width, height, gt, Some(CrsCode::Epsg3857));
        for row in 0..height {
            for col in 0..width {
                raster.set_pixel(col, row, [(col % 251) as u8, (row % 241) as u8, 99, 255]);
            }
        }
        raster
    }

    #[test]
    fn test_zoom_range_validation() {
        assert!(validate_zoom_range(0, 3).is_ok());
        assert!(validate_zoom_range(2, 2).is_ok());
        for (min, max) in [(3, 1), (-1, 2), (0, -1), (0, 31)] {
            let err = validate_zoom_range(min, max).unwrap_err();
            assert!(matches!(err, TilerError::InvalidZoomRange { .. }), "{} {}", min, max);
        }
    }

    #[test]
    fn test_tile_size_validation() {
        for tile_size in [0, 1, 100, 8192] {
            let config = PyramidConfig {
                tile_size,
                ..Default::default()
            };
            assert!(config.validate().is_err(), "{}", tile_size);
        }
        assert!(PyramidConfig::default().validate().is_ok());
    }

    #[test]
    fn test_requires_mercator_source() {
        let mut raster = mercator_raster(1, 0, 0, 16, 16);
        raster.crs = Some(CrsCode::Epsg4326);
        let err = PyramidBuilder::default().build(&raster, 0, 1).unwrap_err();
        assert!(matches!(err, TilerError::Reprojection(_)));
    }

    #[test]
    fn test_base_level_is_exact_copy() {
        // Raster covering part of z1 tile (1, 0) on the z1 pixel grid
        let raster = mercator_raster(1, 300, 20, 100, 50);
        let pyramid = PyramidBuilder::default().build(&raster, 1, 1).unwrap();

        assert_eq!(pyramid.tile_count(), 1);
        let tile = pyramid.get(&TileCoord::new(1, 1, 0)).unwrap();
        let px = |c: usize, r: usize| &tile.pixels[(r * 256 + c) * 4..(r * 256 + c) * 4 + 4];
        assert_eq!(px(300 - 256, 20), &raster.pixel(0, 0));
        assert_eq!(px(300 - 256 + 99, 69), &raster.pixel(99, 49));
        assert_eq!(px(0, 0), &[0, 0, 0, 0]);
    }

    #[test]
    fn test_overview_from_children() {
        let raster = mercator_raster(2, 0, 0, 1024, 1024);
        let pyramid = PyramidBuilder::default().build(&raster, 1, 2).unwrap();
        assert_eq!(pyramid.level_counts(), vec![(1, 4), (2, 16)]);

        let parent = pyramid.get(&TileCoord::new(1, 0, 0)).unwrap();
        let children = TileCoord::new(1, 0, 0)
            .children()
            .map(|c| pyramid.get(&c).map(|t| t.pixels.as_slice()));
        assert_eq!(
            parent.pixels,
            combine_children(children, 256, DownsampleMethod::Average)
        );
    }

    #[test]
    fn test_transparent_regions_omitted() {
        let mut raster = mercator_raster(2, 0, 0, 1024, 1024);
        // Clear the southern half
        for px in raster.pixels[1024 * 512 * 4..].iter_mut() {
            *px = 0;
        }
        let pyramid = PyramidBuilder::default().build(&raster, 0, 2).unwrap();
        assert_eq!(pyramid.level_counts(), vec![(0, 1), (1, 2), (2, 8)]);
        assert!(pyramid.tiles_at(2).all(|t| t.coord.y < 2));
    }

    #[test]
    fn test_mosaic_georeferencing() {
        let raster = mercator_raster(2, 256, 256, 512, 256);
        let pyramid = PyramidBuilder::default().build(&raster, 2, 2).unwrap();
        let mosaic = pyramid.mosaic(2).unwrap();

        assert_eq!(mosaic, raster);
        assert_eq!(pyramid.bounds(), Some(raster.bounds()));
        assert!(pyramid.mosaic(1).is_none());
    }

    #[test]
    fn test_coarse_raster_rejected_for_deep_zoom() {
        // 256x256 pixels over the whole world would need 4^16 base tiles
        let raster = mercator_raster(0, 0, 0, 256, 256);
        let err = PyramidBuilder::default().build(&raster, 0, 16).unwrap_err();
        assert!(matches!(err, TilerError::InvalidZoomRange { .. }));
        assert_eq!(err.exit_code(), 2);

        // One source pixel per base tile is still accepted
        let small_tiles = PyramidConfig {
            tile_size: 2,
            ..Default::default()
        };
        let pyramid = PyramidBuilder::new(small_tiles).build(&raster, 8, 8).unwrap();
        assert_eq!(pyramid.tile_count(), 256 * 256);
    }

    #[test]
    fn test_nearest_overview() {
        let raster = mercator_raster(1, 0, 0, 512, 512);
        let config = PyramidConfig {
            overview: DownsampleMethod::Nearest,
            ..Default::default()
        };
        let pyramid = PyramidBuilder::new(config).build(&raster, 0, 1).unwrap();
        let root = pyramid.get(&TileCoord::new(0, 0, 0)).unwrap();
        // Pixel (1, 1) of the root is pixel (2, 2) of the top-left child
        assert_eq!(&root.pixels[(256 + 1) * 4..(256 + 1) * 4 + 4], &raster.pixel(2, 2));
    }
}
