//! Per-pixel validity derived from the source raster.
//!
//! The mask is built from the original cell values, never from the clamped
//! or colorized rasters, so clamping can not turn a no-data cell into color.

use rayon::prelude::*;
use tile_common::{Raster, RgbaRaster, TilerError, TilerResult};

/// Boolean grid aligned 1:1 with its source raster; `true` marks real data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidityMask {
    width: usize,
    height: usize,
    valid: Vec<bool>,
}

impl ValidityMask {
    /// A cell is valid when every band holds a finite value that differs from
    /// the band's no-data value.
    pub fn from_raster(raster: &Raster) -> Self {
        let width = raster.width();
        let height = raster.height();
        let mut valid = vec![true; width * height];

        valid
            .par_chunks_mut(width)
            .enumerate()
            .for_each(|(row, out_row)| {
                let start = row * width;
                for band in raster.bands() {
                    let cells = &band.data[start..start + width];
                    for (flag, &value) in out_row.iter_mut().zip(cells) {
                        *flag = *flag && band.is_valid(value);
                    }
                }
            });

        Self {
            width,
            height,
            valid,
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    #[inline]
    pub fn is_valid(&self, col: usize, row: usize) -> bool {
        self.valid[row * self.width + col]
    }

    pub fn valid_count(&self) -> usize {
        self.valid.iter().filter(|&&v| v).count()
    }

    /// Merge this mask into the alpha channel of a colorized raster.
    ///
    /// Invalid pixels become transparent black, whatever color the ramp gave
    /// them. Valid pixels keep the ramp's RGBA, so breakpoints with their own
    /// alpha and `exact` misses stay as colorized. Any fully transparent
    /// pixel is normalized to transparent black.
    pub fn apply(&self, mut raster: RgbaRaster) -> TilerResult<RgbaRaster> {
        if raster.width != self.width || raster.height != self.height {
            return Err(TilerError::Input(format!(
                "mask is {}x{} but raster is {}x{}",
                self.width, self.height, raster.width, raster.height
            )));
        }

        raster
            .pixels
            .par_chunks_mut(4)
            .zip(self.valid.par_iter())
            .for_each(|(px, &valid)| {
                if !valid || px[3] == 0 {
                    px.copy_from_slice(&[0, 0, 0, 0]);
                }
            });

        Ok(raster)
    }
}
