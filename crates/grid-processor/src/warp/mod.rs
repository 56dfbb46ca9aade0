//! Resampling, clipping and reprojection of colorized rasters.

pub mod interpolation;
pub mod reproject;

pub use interpolation::{bilinear_sample, nearest_sample, sample};
pub use reproject::{clip_to_bounds, NativeWarper, WarpRequest, Warper};
