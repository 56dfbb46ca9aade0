//! Point sampling of RGBA rasters.
//!
//! Positions are fractional pixel coordinates as returned by
//! `GeoTransform::world_to_pixel`: pixel (c, r) covers `[c, c+1) x [r, r+1)`
//! and its centre sits at `(c + 0.5, r + 0.5)`.

use crate::types::Resampling;
use tile_common::RgbaRaster;

/// Sample `raster` at a fractional pixel position.
///
/// Returns `None` when the position falls outside the raster.
#[inline]
pub fn sample(raster: &RgbaRaster, col: f64, row: f64, method: Resampling) -> Option<[u8; 4]> {
    match method {
        Resampling::Nearest => nearest_sample(raster, col, row),
        Resampling::Bilinear => bilinear_sample(raster, col, row),
    }
}

/// Pixel containing the position.
#[inline]
pub fn nearest_sample(raster: &RgbaRaster, col: f64, row: f64) -> Option<[u8; 4]> {
    if !(col >= 0.0 && row >= 0.0) {
        return None;
    }
    let c = col.floor() as usize;
    let r = row.floor() as usize;
    if c >= raster.width || r >= raster.height {
        return None;
    }
    Some(raster.pixel(c, r))
}

/// Alpha-weighted bilinear blend of the four surrounding pixel centres.
///
/// Transparent neighbours do not bleed their (black) color into the result.
/// The alpha channel comes from the nearest pixel so that the validity edge
/// stays as sharp as with nearest-neighbour sampling.
pub fn bilinear_sample(raster: &RgbaRaster, col: f64, row: f64) -> Option<[u8; 4]> {
    let nearest = nearest_sample(raster, col, row)?;
    if nearest[3] == 0 {
        return Some([0, 0, 0, 0]);
    }

    // Centre-based coordinates, clamped at the raster edge
    let max_x = (raster.width - 1) as f64;
    let max_y = (raster.height - 1) as f64;
    let x = (col - 0.5).clamp(0.0, max_x);
    let y = (row - 0.5).clamp(0.0, max_y);

    let x0 = x.floor() as usize;
    let y0 = y.floor() as usize;
    let x1 = (x0 + 1).min(raster.width - 1);
    let y1 = (y0 + 1).min(raster.height - 1);
    let fx = x - x0 as f64;
    let fy = y - y0 as f64;

    let corners = [
        (raster.pixel(x0, y0), (1.0 - fx) * (1.0 - fy)),
        (raster.pixel(x1, y0), fx * (1.0 - fy)),
        (raster.pixel(x0, y1), (1.0 - fx) * fy),
        (raster.pixel(x1, y1), fx * fy),
    ];

    let mut rgb = [0.0f64; 3];
    let mut weight = 0.0f64;
    for (px, w) in corners {
        let wa = w * px[3] as f64;
        for (acc, &c) in rgb.iter_mut().zip(&px[..3]) {
            *acc += wa * c as f64;
        }
        weight += wa;
    }

    if weight <= 0.0 {
        return Some(nearest);
    }

    Some([
        (rgb[0] / weight).round().clamp(0.0, 255.0) as u8,
        (rgb[1] / weight).round().clamp(0.0, 255.0) as u8,
        (rgb[2] / weight).round().clamp(0.0, 255.0) as u8,
        nearest[3],
    ])
}
