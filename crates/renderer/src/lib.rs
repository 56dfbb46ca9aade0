//! Raster rendering for the tiling pipeline.
//!
//! - [`normalize`]: clamp and rescale raw values into 1..=255
//! - [`colormap`]: breakpoint ramps, lookup tables, colorization
//! - [`mask`]: validity (alpha) masks from source no-data
//! - [`png`]: indexed / RGBA PNG encoding

pub mod colormap;
pub mod mask;
pub mod normalize;
pub mod png;

pub use colormap::{colorize, ColorBreakpoint, ColorLut, ColorRamp, ColorSelection, Rgba};
pub use mask::ValidityMask;
pub use normalize::{normalize, normalize_band, ScaleParams, NODATA_SENTINEL};
