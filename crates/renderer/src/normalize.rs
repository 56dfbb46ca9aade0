//! Linear rescaling of raw cell values into a bounded 8-bit domain.
//!
//! Values are clamped to `[vmin, vmax]` and mapped onto `[lo, hi]`. The value
//! 0 is reserved as the no-data sentinel, so `lo` must be at least 1.

use rayon::prelude::*;
use tile_common::{Band, ByteRaster, Raster, TilerError, TilerResult};
use tracing::debug;

/// Reserved output value for no-data and non-finite cells.
pub const NODATA_SENTINEL: u8 = 0;

/// Input clamp range and output range of the linear mapping.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScaleParams {
    pub vmin: f64,
    pub vmax: f64,
    pub lo: u8,
    pub hi: u8,
}

impl ScaleParams {
    /// Clamp range `[vmin, vmax]` mapped onto the default output range 1..=255.
    pub fn new(vmin: f64, vmax: f64) -> Self {
        Self {
            vmin,
            vmax,
            lo: 1,
            hi: 255,
        }
    }

    pub fn with_output_range(mut self, lo: u8, hi: u8) -> Self {
        self.lo = lo;
        self.hi = hi;
        self
    }

    pub fn validate(&self) -> TilerResult<()> {
        if !self.vmin.is_finite() || !self.vmax.is_finite() {
            return Err(TilerError::InvalidRange(format!(
                "clamp bounds must be finite, got [{}, {}]",
                self.vmin, self.vmax
            )));
        }
        if self.vmax <= self.vmin {
            return Err(TilerError::InvalidRange(format!(
                "clamp max {} must be greater than clamp min {}",
                self.vmax, self.vmin
            )));
        }
        if self.lo >= self.hi {
            return Err(TilerError::InvalidRange(format!(
                "output range [{}, {}] is empty",
                self.lo, self.hi
            )));
        }
        if self.lo == NODATA_SENTINEL {
            return Err(TilerError::InvalidRange(
                "output range must exclude the no-data sentinel 0".to_string(),
            ));
        }
        Ok(())
    }

    /// Map a single valid value. Callers must have validated `self`.
    #[inline]
    fn scale(&self, value: f64) -> u8 {
        let clamped = value.clamp(self.vmin, self.vmax);
        let t = (clamped - self.vmin) / (self.vmax - self.vmin);
        let lo = self.lo as f64;
        let hi = self.hi as f64;
        (lo + t * (hi - lo)).round().clamp(lo, hi) as u8
    }
}

/// Normalize one band laid out as `height` rows of `width` cells.
pub fn normalize_band(
    band: &Band,
    width: usize,
    height: usize,
    params: &ScaleParams,
) -> TilerResult<Vec<u8>> {
    params.validate()?;
    if band.data.len() != width * height {
        return Err(TilerError::Input(format!(
            "band holds {} cells, expected {}x{}",
            band.data.len(),
            width,
            height
        )));
    }

    let mut output = vec![NODATA_SENTINEL; width * height];
    output
        .par_chunks_mut(width)
        .zip(band.data.par_chunks(width))
        .for_each(|(out_row, in_row)| {
            for (out, &value) in out_row.iter_mut().zip(in_row) {
                if band.is_valid(value) {
                    *out = params.scale(value);
                }
            }
        });

    Ok(output)
}

/// Normalize band `band_index` (zero-based) of `raster` into a byte raster that
/// keeps the source georeferencing.
pub fn normalize(
    raster: &Raster,
    band_index: usize,
    params: &ScaleParams,
) -> TilerResult<ByteRaster> {
    let band = raster.band(band_index).ok_or_else(|| {
        TilerError::Input(format!(
            "band {} requested but raster has {} band(s)",
            band_index + 1,
            raster.band_count()
        ))
    })?;

    let data = normalize_band(band, raster.width(), raster.height(), params)?;

    debug!(
        width = raster.width(),
        height = raster.height(),
        vmin = params.vmin,
        vmax = params.vmax,
        lo = params.lo,
        hi = params.hi,
        "Normalized band"
    );

    Ok(ByteRaster {
        width: raster.width(),
        height: raster.height(),
        data,
        transform: *raster.transform(),
        crs: raster.crs(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tile_common::CellType;

    fn band(values: &[f64], nodata: Option<f64>) -> Band {
        Band::new(values.to_vec(), CellType::Float64, nodata)
    }

    #[test]
    fn test_endpoints_map_to_output_bounds() {
        let params = ScaleParams::new(1021.5, 1027.5);
        let out = normalize_band(&band(&[1021.5, 1027.5, 1024.5], None), 3, 1, &params).unwrap();
        assert_eq!(out, vec![1, 255, 128]);
    }

    #[test]
    fn test_clamping() {
        let params = ScaleParams::new(0.0, 100.0);
        let out = normalize_band(&band(&[-50.0, 200.0], None), 2, 1, &params).unwrap();
        assert_eq!(out, vec![1, 255]);
    }

    #[test]
    fn test_sentinel_for_invalid_cells() {
        let params = ScaleParams::new(0.0, 100.0);
        let values = [f64::NAN, f64::INFINITY, f64::NEG_INFINITY, -9999.0, 50.0];
        let out = normalize_band(&band(&values, Some(-9999.0)), 5, 1, &params).unwrap();
        assert_eq!(out, vec![0, 0, 0, 0, 128]);
    }

    #[test]
    fn test_monotone() {
        let params = ScaleParams::new(-10.0, 10.0);
        let values: Vec<f64> = (0..200).map(|i| -20.0 + i as f64 * 0.2).collect();
        let out = normalize_band(&band(&values, None), 200, 1, &params).unwrap();
        assert!(out.windows(2).all(|w| w[0] <= w[1]));
        assert!(out.iter().all(|&v| (1..=255).contains(&v)));
    }

    #[test]
    fn test_invalid_ranges() {
        let b = band(&[1.0], None);
        for params in [
            ScaleParams::new(5.0, 5.0),
            ScaleParams::new(6.0, 5.0),
            ScaleParams::new(f64::NAN, 5.0),
            ScaleParams::new(0.0, f64::INFINITY),
            ScaleParams::new(0.0, 1.0).with_output_range(0, 255),
            ScaleParams::new(0.0, 1.0).with_output_range(200, 100),
        ] {
            let err = normalize_band(&b, 1, 1, &params).unwrap_err();
            assert!(matches!(err, TilerError::InvalidRange(_)), "{:?}", params);
        }
    }

    #[test]
    fn test_values_beyond_f32_range_clamp() {
        let params = ScaleParams::new(0.0, 100.0);
        let b = Band::new(vec![1e39, -1e39], CellType::Float64, None);
        assert_eq!(normalize_band(&b, 2, 1, &params).unwrap(), vec![255, 1]);
    }

    #[test]
    fn test_custom_output_range() {
        let params = ScaleParams::new(0.0, 10.0).with_output_range(10, 20);
        let out = normalize_band(&band(&[0.0, 5.0, 10.0], None), 3, 1, &params).unwrap();
        assert_eq!(out, vec![10, 15, 20]);
    }
}
