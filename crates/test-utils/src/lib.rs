//! Shared test utilities for the raster tiler workspace.
//!
//! This crate provides common testing infrastructure including:
//! - Synthetic raster generators
//! - Colormap and bounding box fixtures
//! - Temporary directory helpers
//! - Approximate float assertions
//!
//! # Usage
//!
//! ```toml
//! [dev-dependencies]
//! test-utils = { path = "../test-utils" }
//! ```

pub mod fixtures;
pub mod generators;
pub mod paths;

pub use fixtures::*;
pub use generators::*;
pub use paths::*;

/// Macro for approximate floating-point equality assertions.
///
/// ```ignore
/// use test_utils::assert_approx_eq;
///
/// assert_approx_eq!(1.0001_f64, 1.0_f64, 0.001_f64); // passes
/// assert_approx_eq!(1.1_f32, 1.0_f32, 0.001_f32);    // fails
/// ```
#[macro_export]
macro_rules! assert_approx_eq {
    ($left:expr, $right:expr, $epsilon:expr) => {{
        let left: f64 = $left as f64;
        let right: f64 = $right as f64;
        let epsilon: f64 = $epsilon as f64;
        let diff = (left - right).abs();
        if !(diff <= epsilon) {
            panic!(
                "assertion failed: `(left ≈ right)`\n  left: `{:?}`,\n right: `{:?}`,\n  diff: `{:?}` > epsilon `{:?}`",
                left, right, diff, epsilon
            );
        }
    }};
}

/// Approximate equality of every edge of two bounding boxes.
///
/// ```ignore
/// use test_utils::assert_bbox_approx_eq;
///
/// assert_bbox_approx_eq!(raster.bounds(), BoundingBox::new(-10.0, -5.0, 10.0, 5.0), 1e-9);
/// ```
#[macro_export]
macro_rules! assert_bbox_approx_eq {
    ($left:expr, $right:expr, $epsilon:expr) => {{
        let left = $left;
        let right = $right;
        $crate::assert_approx_eq!(left.min_x, right.min_x, $epsilon);
        $crate::assert_approx_eq!(left.min_y, right.min_y, $epsilon);
        $crate::assert_approx_eq!(left.max_x, right.max_x, $epsilon);
        $crate::assert_approx_eq!(left.max_y, right.max_y, $epsilon);
    }};
}

#[cfg(test)]
mod tests {
    use tile_common::BoundingBox;

    #[test]
    fn test_assert_approx_eq_passes() {
        assert_approx_eq!(1.0001, 1.0, 0.001);
        assert_approx_eq!(0.0, 0.0, 0.0001);
        assert_approx_eq!(-5.5, -5.500001, 0.0001);
    }

    #[test]
    #[should_panic(expected = "assertion failed")]
    fn test_assert_approx_eq_fails() {
        assert_approx_eq!(1.1, 1.0, 0.001);
    }

    #[test]
    #[should_panic(expected = "assertion failed")]
    fn test_assert_approx_eq_nan_fails() {
        assert_approx_eq!(f64::NAN, 1.0, 0.001);
    }

    #[test]
    fn test_assert_bbox_approx_eq_passes() {
        assert_bbox_approx_eq!(
            BoundingBox::new(0.0001, 1.0, 2.0, 3.0),
            BoundingBox::new(0.0, 1.0, 2.0, 3.0),
            0.001
        );
    }
}
