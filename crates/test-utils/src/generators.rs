//! Test data generators for creating synthetic rasters.
//!
//! These generators create predictable, verifiable patterns that can be used
//! across the test suite.

use tile_common::{Band, BoundingBox, CrsCode, GeoTransform, Raster};

/// Creates a test grid with predictable values.
///
/// Each cell value is calculated as: `col * 1000 + row`
///
/// ```
/// use test_utils::create_test_grid;
///
/// let grid = create_test_grid(10, 5);
/// assert_eq!(grid.len(), 50);
/// assert_eq!(grid[1], 1000.0); // col=1, row=0
/// assert_eq!(grid[10], 1.0);   // col=0, row=1
/// ```
pub fn create_test_grid(width: usize, height: usize) -> Vec<f32> {
    let mut data = Vec::with_capacity(width * height);
    for row in 0..height {
        for col in 0..width {
            data.push((col * 1000 + row) as f32);
        }
    }
    data
}

/// Creates a sea-level-pressure-like grid in hPa.
///
/// Values run from about 1018 hPa (top-left) to 1031 hPa (bottom-right), so
/// both ends spill past the default 1021.5-1027.5 clamp range.
pub fn create_pressure_grid(width: usize, height: usize) -> Vec<f32> {
    let mut data = Vec::with_capacity(width * height);
    for row in 0..height {
        for col in 0..width {
            let x_factor = col as f32 / width.max(1) as f32;
            let y_factor = row as f32 / height.max(1) as f32;
            data.push(1018.0 + x_factor * 6.5 + y_factor * 6.5);
        }
    }
    data
}

/// Creates a grid filled with a constant value.
pub fn create_constant_grid(width: usize, height: usize, value: f32) -> Vec<f32> {
    vec![value; width * height]
}

/// Creates a grid of `fill` with `marker` at the given (col, row) positions.
///
/// Useful for NaN and no-data handling tests.
pub fn create_grid_with_markers(
    width: usize,
    height: usize,
    fill: f32,
    marker: f32,
    positions: &[(usize, usize)],
) -> Vec<f32> {
    let mut data = vec![fill; width * height];
    for &(col, row) in positions {
        if col < width && row < height {
            data[row * width + col] = marker;
        }
    }
    data
}

/// Single-band EPSG:4326 raster whose pixels exactly tile `bounds`.
pub fn geographic_raster(
    data: Vec<f32>,
    width: usize,
    height: usize,
    bounds: BoundingBox,
    nodata: Option<f64>,
) -> Raster {
    let transform = GeoTransform::north_up(
        bounds.min_x,
        bounds.max_y,
        bounds.width() / width as f64,
        -bounds.height() / height as f64,
    );
    Raster::new(
        width,
        height,
        vec![Band::from_f32(data, nodata)],
        transform,
        Some(CrsCode::Epsg4326),
    )
    .expect("Invalid test raster")
}

/// Whole-world single-band geographic raster (-180..180, -90..90).
pub fn global_raster(data: Vec<f32>, width: usize, height: usize) -> Raster {
    geographic_raster(
        data,
        width,
        height,
        BoundingBox::new(-180.0, -90.0, 180.0, 90.0),
        None,
    )
}

/// Creates RGBA pixel data for a smooth gradient (many distinct colors).
pub fn create_test_rgba_pixels(width: usize, height: usize) -> Vec<u8> {
    let mut pixels = Vec::with_capacity(width * height * 4);
    for y in 0..height {
        for x in 0..width {
            let r = ((x as f32 / width as f32) * 255.0) as u8;
            let g = ((y as f32 / height as f32) * 255.0) as u8;
            pixels.extend_from_slice(&[r, g, 128, 255]);
        }
    }
    pixels
}

/// Creates RGBA pixel data from a small ramp palette with a transparent band
/// along the left edge, like a colorized tile at the edge of the data.
pub fn create_ramp_palette_pixels(width: usize, height: usize) -> Vec<u8> {
    let palette: [[u8; 4]; 8] = [
        [49, 54, 149, 255],
        [69, 117, 180, 255],
        [116, 173, 209, 255],
        [224, 243, 248, 255],
        [254, 224, 144, 255],
        [253, 174, 97, 255],
        [244, 109, 67, 255],
        [215, 48, 39, 255],
    ];

    let mut pixels = Vec::with_capacity(width * height * 4);
    for y in 0..height {
        for x in 0..width {
            if x < width / 8 {
                pixels.extend_from_slice(&[0, 0, 0, 0]);
            } else {
                let idx = (x * 3 + y * 5) / (width + height).max(1);
                pixels.extend_from_slice(&palette[idx.min(7)]);
            }
        }
    }
    pixels
}
