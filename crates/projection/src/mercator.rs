//! Spherical (web) mercator projection, EPSG:3857.
//!
//! Forward and inverse formulas on a sphere of radius 6378137 m, plus the
//! latitude band in which the projection is usable.

use std::f64::consts::PI;
use tile_common::BoundingBox;

/// WGS84 semi-major axis, used as the sphere radius.
pub const EARTH_RADIUS: f64 = 6_378_137.0;

/// Half the projected world width in meters (pi * R).
pub const ORIGIN_SHIFT: f64 = 20_037_508.342_789_244;

/// Largest latitude representable in web mercator tiles.
pub const MAX_LATITUDE: f64 = 85.051_128_78;

/// Mercator-safe geographic bounds (EPSG:4326).
pub const SAFE_BOUNDS_4326: BoundingBox = BoundingBox {
    min_x: -180.0,
    min_y: -MAX_LATITUDE,
    max_x: 180.0,
    max_y: MAX_LATITUDE,
};

/// The square projected world (EPSG:3857).
pub const WORLD_BOUNDS_3857: BoundingBox = BoundingBox {
    min_x: -ORIGIN_SHIFT,
    min_y: -ORIGIN_SHIFT,
    max_x: ORIGIN_SHIFT,
    max_y: ORIGIN_SHIFT,
};

/// Project lon/lat degrees to mercator meters.
///
/// Returns `None` at or beyond the poles, where the projection diverges.
#[inline]
pub fn lonlat_to_meters(lon: f64, lat: f64) -> Option<(f64, f64)> {
    if !lon.is_finite() || !lat.is_finite() || lat.abs() >= 90.0 {
        return None;
    }
    let x = lon * ORIGIN_SHIFT / 180.0;
    let y = (PI / 4.0 + lat.to_radians() / 2.0).tan().ln() * EARTH_RADIUS;
    Some((x, y))
}

/// Inverse projection: mercator meters to lon/lat degrees.
#[inline]
pub fn meters_to_lonlat(x: f64, y: f64) -> (f64, f64) {
    let lon = x / ORIGIN_SHIFT * 180.0;
    let lat = (2.0 * (y / EARTH_RADIUS).exp().atan() - PI / 2.0).to_degrees();
    (lon, lat)
}

/// Project a geographic bounding box to mercator meters.
pub fn project_bounds(bounds: &BoundingBox) -> Option<BoundingBox> {
    let (min_x, min_y) = lonlat_to_meters(bounds.min_x, bounds.min_y)?;
    let (max_x, max_y) = lonlat_to_meters(bounds.max_x, bounds.max_y)?;
    Some(BoundingBox::new(min_x, min_y, max_x, max_y))
}

/// Unproject a mercator bounding box to lon/lat degrees.
pub fn unproject_bounds(bounds: &BoundingBox) -> BoundingBox {
    let (min_x, min_y) = meters_to_lonlat(bounds.min_x, bounds.min_y);
    let (max_x, max_y) = meters_to_lonlat(bounds.max_x, bounds.max_y);
    BoundingBox::new(min_x, min_y, max_x, max_y)
}

/// Ground resolution (meters per pixel) of zoom level `zoom`.
pub fn resolution(zoom: u32, tile_size: u32) -> f64 {
    2.0 * ORIGIN_SHIFT / (tile_size as f64 * (1u64 << zoom) as f64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_origin_shift_matches_radius() {
        assert!((ORIGIN_SHIFT - PI * EARTH_RADIUS).abs() < 1e-6);
    }

    #[test]
    fn test_forward_inverse() {
        let (x, y) = lonlat_to_meters(-122.4194, 37.7749).unwrap();
        let (lon, lat) = meters_to_lonlat(x, y);
        assert!((lon + 122.4194).abs() < 1e-9);
        assert!((lat - 37.7749).abs() < 1e-9);
    }

    #[test]
    fn test_max_latitude_maps_to_world_edge() {
        let (x, y) = lonlat_to_meters(180.0, MAX_LATITUDE).unwrap();
        assert!((x - ORIGIN_SHIFT).abs() < 1e-6);
        assert!((y - ORIGIN_SHIFT).abs() < 1.0);
    }

    #[test]
    fn test_poles_rejected() {
        assert!(lonlat_to_meters(0.0, 90.0).is_none());
        assert!(lonlat_to_meters(0.0, -90.0).is_none());
        assert!(lonlat_to_meters(f64::NAN, 0.0).is_none());
    }

    #[test]
    fn test_resolution() {
        assert!((resolution(0, 256) - 156_543.033_928_041).abs() < 1e-6);
        assert!((resolution(1, 256) * 2.0 - resolution(0, 256)).abs() < 1e-9);
        assert!((resolution(0, 512) * 2.0 - resolution(0, 256)).abs() < 1e-9);
    }
}
