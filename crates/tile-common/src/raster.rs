//! In-memory georeferenced rasters passed between pipeline stages.
//!
//! All pixel buffers are row-major, top row first.

use crate::{BoundingBox, CrsCode, TilerError, TilerResult};
use serde::{Deserialize, Serialize};

/// Six-coefficient affine transform from pixel (col, row) to world (x, y).
///
/// Same coefficient order as the GDAL geotransform:
/// `x = origin_x + col * pixel_width + row * rotation_x`
/// `y = origin_y + col * rotation_y + row * pixel_height`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoTransform {
    pub origin_x: f64,
    pub pixel_width: f64,
    pub rotation_x: f64,
    pub origin_y: f64,
    pub rotation_y: f64,
    pub pixel_height: f64,
}

impl GeoTransform {
    /// North-up transform. `pixel_height` is negative for top-down rows.
    pub fn north_up(origin_x: f64, origin_y: f64, pixel_width: f64, pixel_height: f64) -> Self {
        Self {
            origin_x,
            pixel_width,
            rotation_x: 0.0,
            origin_y,
            rotation_y: 0.0,
            pixel_height,
        }
    }

    /// Build from the GDAL coefficient array.
    pub fn from_gdal(gt: [f64; 6]) -> Self {
        Self {
            origin_x: gt[0],
            pixel_width: gt[1],
            rotation_x: gt[2],
            origin_y: gt[3],
            rotation_y: gt[4],
            pixel_height: gt[5],
        }
    }

    /// True when there is no rotation/shear and rows run north to south.
    pub fn is_north_up(&self) -> bool {
        self.rotation_x == 0.0
            && self.rotation_y == 0.0
            && self.pixel_width > 0.0
            && self.pixel_height < 0.0
    }

    /// World coordinates of a (fractional) pixel position.
    pub fn pixel_to_world(&self, col: f64, row: f64) -> (f64, f64) {
        (
            self.origin_x + col * self.pixel_width + row * self.rotation_x,
            self.origin_y + col * self.rotation_y + row * self.pixel_height,
        )
    }

    /// World coordinates of the centre of pixel (col, row).
    pub fn pixel_center(&self, col: usize, row: usize) -> (f64, f64) {
        self.pixel_to_world(col as f64 + 0.5, row as f64 + 0.5)
    }

    /// Fractional pixel position of a world coordinate, `None` if singular.
    pub fn world_to_pixel(&self, x: f64, y: f64) -> Option<(f64, f64)> {
        let det = self.pixel_width * self.pixel_height - self.rotation_x * self.rotation_y;
        if det == 0.0 || !det.is_finite() {
            return None;
        }
        let dx = x - self.origin_x;
        let dy = y - self.origin_y;
        let col = (dx * self.pixel_height - dy * self.rotation_x) / det;
        let row = (dy * self.pixel_width - dx * self.rotation_y) / det;
        Some((col, row))
    }

    /// Transform of the window starting at (col_off, row_off).
    pub fn shifted(&self, col_off: usize, row_off: usize) -> Self {
        let (origin_x, origin_y) = self.pixel_to_world(col_off as f64, row_off as f64);
        Self {
            origin_x,
            origin_y,
            ..*self
        }
    }

    /// Envelope of a `width` x `height` grid under this transform.
    pub fn bounds(&self, width: usize, height: usize) -> BoundingBox {
        let corners = [
            self.pixel_to_world(0.0, 0.0),
            self.pixel_to_world(width as f64, 0.0),
            self.pixel_to_world(0.0, height as f64),
            self.pixel_to_world(width as f64, height as f64),
        ];
        let mut bbox = BoundingBox::new(
            f64::INFINITY,
            f64::INFINITY,
            f64::NEG_INFINITY,
            f64::NEG_INFINITY,
        );
        for (x, y) in corners {
            bbox.min_x = bbox.min_x.min(x);
            bbox.min_y = bbox.min_y.min(y);
            bbox.max_x = bbox.max_x.max(x);
            bbox.max_y = bbox.max_y.max(y);
        }
        bbox
    }
}

/// Storage type of a band in its source file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CellType {
    UInt8,
    Int8,
    UInt16,
    Int16,
    UInt32,
    Int32,
    Float32,
    Float64,
}

/// One band of cell values with its optional no-data sentinel.
///
/// Cells are held as f64, which represents every supported cell type
/// exactly.
#[derive(Debug, Clone)]
pub struct Band {
    pub data: Vec<f64>,
    pub cell_type: CellType,
    pub nodata: Option<f64>,
}

impl Band {
    pub fn new(data: Vec<f64>, cell_type: CellType, nodata: Option<f64>) -> Self {
        Self {
            data,
            cell_type,
            nodata,
        }
    }

    /// Float32 band from single-precision cells.
    pub fn from_f32(data: Vec<f32>, nodata: Option<f64>) -> Self {
        Self::new(
            data.into_iter().map(f64::from).collect(),
            CellType::Float32,
            nodata,
        )
    }

    /// True when `value` equals the declared no-data sentinel.
    ///
    /// Float32 bands compare in f32 space so that a sentinel declared as
    /// text (e.g. "0.1") matches the stored single-precision cells.
    #[inline]
    pub fn is_nodata(&self, value: f64) -> bool {
        match self.nodata {
            Some(nd) if nd.is_nan() => value.is_nan(),
            Some(nd) if self.cell_type == CellType::Float32 => value as f32 == nd as f32,
            Some(nd) => value == nd,
            None => false,
        }
    }

    /// True when `value` is a real measurement.
    #[inline]
    pub fn is_valid(&self, value: f64) -> bool {
        value.is_finite() && !self.is_nodata(value)
    }
}

/// Multi-band source raster.
///
/// Invariant: every band holds exactly `width * height` cells and all bands
/// share the raster's transform and CRS.
#[derive(Debug, Clone)]
pub struct Raster {
    width: usize,
    height: usize,
    bands: Vec<Band>,
    transform: GeoTransform,
    crs: Option<CrsCode>,
}

impl Raster {
    pub fn new(
        width: usize,
        height: usize,
        bands: Vec<Band>,
        transform: GeoTransform,
        crs: Option<CrsCode>,
    ) -> TilerResult<Self> {
        if width == 0 || height == 0 {
            return Err(TilerError::Input(format!(
                "raster has empty dimensions {}x{}",
                width, height
            )));
        }
        if bands.is_empty() {
            return Err(TilerError::Input("raster has no bands".to_string()));
        }
        if let Some((idx, band)) = bands
            .iter()
            .enumerate()
            .find(|(_, b)| b.data.len() != width * height)
        {
            return Err(TilerError::Input(format!(
                "band {} holds {} cells, expected {}x{}",
                idx + 1,
                band.data.len(),
                width,
                height
            )));
        }

        Ok(Self {
            width,
            height,
            bands,
            transform,
            crs,
        })
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn band_count(&self) -> usize {
        self.bands.len()
    }

    pub fn bands(&self) -> &[Band] {
        &self.bands
    }

    /// Band by zero-based index.
    pub fn band(&self, index: usize) -> Option<&Band> {
        self.bands.get(index)
    }

    pub fn transform(&self) -> &GeoTransform {
        &self.transform
    }

    pub fn crs(&self) -> Option<CrsCode> {
        self.crs
    }

    pub fn bounds(&self) -> BoundingBox {
        self.transform.bounds(self.width, self.height)
    }
}

/// Single-band 8-bit raster (normalized values).
#[derive(Debug, Clone, PartialEq)]
pub struct ByteRaster {
    pub width: usize,
    pub height: usize,
    pub data: Vec<u8>,
    pub transform: GeoTransform,
    pub crs: Option<CrsCode>,
}

/// Interleaved RGBA8 raster.
///
/// `pixels.len() == width * height * 4`.
#[derive(Debug, Clone, PartialEq)]
pub struct RgbaRaster {
    pub width: usize,
    pub height: usize,
    pub pixels: Vec<u8>,
    pub transform: GeoTransform,
    pub crs: Option<CrsCode>,
}

impl RgbaRaster {
    pub fn new(
        width: usize,
        height: usize,
        pixels: Vec<u8>,
        transform: GeoTransform,
        crs: Option<CrsCode>,
    ) -> TilerResult<Self> {
        if pixels.len() != width * height * 4 {
            return Err(TilerError::Input(format!(
                "RGBA buffer holds {} bytes, expected {}x{}x4",
                pixels.len(),
                width,
                height
            )));
        }
        Ok(Self {
            width,
            height,
            pixels,
            transform,
            crs,
        })
    }

    /// Fully transparent raster.
    pub fn transparent(
        width: usize,
        height: usize,
        transform: GeoTransform,
        crs: Option<CrsCode>,
    ) -> Self {
        Self {
            width,
            height,
            pixels: vec![0u8; width * height * 4],
            transform,
            crs,
        }
    }

    #[inline]
    pub fn pixel(&self, col: usize, row: usize) -> [u8; 4] {
        let idx = (row * self.width + col) * 4;
        [
            self.pixels[idx],
            self.pixels[idx + 1],
            self.pixels[idx + 2],
            self.pixels[idx + 3],
        ]
    }

    #[inline]
    pub fn set_pixel(&mut self, col: usize, row: usize, rgba: [u8; 4]) {
        let idx = (row * self.width + col) * 4;
        self.pixels[idx..idx + 4].copy_from_slice(&rgba);
    }

    pub fn bounds(&self) -> BoundingBox {
        self.transform.bounds(self.width, self.height)
    }

    /// Number of pixels with non-zero alpha.
    pub fn opaque_count(&self) -> usize {
        self.pixels.chunks_exact(4).filter(|p| p[3] > 0).count()
    }
}
