//! Raster processing for web mercator tiling.
//!
//! Takes a colorized, alpha-masked raster to a tile pyramid:
//!
//! ```text
//! RgbaRaster (EPSG:4326)
//!      │
//!      ▼
//! clip_to_bounds (±85.05112878°)  ──►  Warper::reproject (EPSG:3857)
//!                                            │
//!                                            ▼
//!                          PyramidBuilder::build (base level z_max)
//!                                            │
//!                                            ▼
//!                          2x2 overviews z_max-1 .. z_min
//! ```
//!
//! # Example
//!
//! ```ignore
//! use grid_processor::{NativeWarper, PyramidBuilder, PyramidConfig, WarpRequest, Warper};
//!
//! let request = WarpRequest::to_mercator().with_resolution(projection::resolution(3, 256));
//! let mercator = NativeWarper.reproject(colored, &request)?;
//! let pyramid = PyramidBuilder::new(PyramidConfig::default()).build(&mercator, 0, 3)?;
//! ```

pub mod downsample;
pub mod warp;
pub mod pyramid;
pub mod types;

pub use downsample::{combine_children, downsample_2x, DownsampleMethod};
pub use warp::{clip_to_bounds, sample, NativeWarper, WarpRequest, Warper};
pub use pyramid::{
    validate_zoom_range, PyramidBuilder, PyramidConfig, Tile, TilePyramid, MAX_TILE_SIZE, MAX_ZOOM,
};
pub use types::Resampling;
