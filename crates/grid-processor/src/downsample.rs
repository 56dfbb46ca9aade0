//! 2x2 reduction of RGBA tiles for building pyramid overviews.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Method used to reduce a 2x2 block of pixels to one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DownsampleMethod {
    /// Alpha-weighted mean color, mean alpha.
    #[default]
    Average,
    /// Top-left pixel of the block.
    Nearest,
}

impl FromStr for DownsampleMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "average" | "mean" => Ok(Self::Average),
            "nearest" | "near" => Ok(Self::Nearest),
            other => Err(format!(
                "unknown overview resampling '{}', expected average or nearest",
                other
            )),
        }
    }
}

impl fmt::Display for DownsampleMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Average => write!(f, "average"),
            Self::Nearest => write!(f, "nearest"),
        }
    }
}

/// Downsample a square RGBA tile of `size` x `size` pixels by a factor of 2.
pub fn downsample_2x(pixels: &[u8], size: usize, method: DownsampleMethod) -> Vec<u8> {
    let half = size / 2;
    let mut output = vec![0u8; half * half * 4];

    for out_y in 0..half {
        for out_x in 0..half {
            let px = |dx: usize, dy: usize| -> [u8; 4] {
                let idx = ((out_y * 2 + dy) * size + out_x * 2 + dx) * 4;
                [pixels[idx], pixels[idx + 1], pixels[idx + 2], pixels[idx + 3]]
            };
            let block = [px(0, 0), px(1, 0), px(0, 1), px(1, 1)];

            let result = match method {
                DownsampleMethod::Average => average_block(&block),
                DownsampleMethod::Nearest => block[0],
            };

            let idx = (out_y * half + out_x) * 4;
            output[idx..idx + 4].copy_from_slice(&result);
        }
    }

    output
}

/// Build a parent tile from its four children (TL, TR, BL, BR).
///
/// A missing child counts as fully transparent.
pub fn combine_children(
    children: [Option<&[u8]>; 4],
    tile_size: usize,
    method: DownsampleMethod,
) -> Vec<u8> {
    let half = tile_size / 2;
    let mut output = vec![0u8; tile_size * tile_size * 4];

    for (quadrant, child) in children.iter().enumerate() {
        let Some(child) = child else {
            continue;
        };
        let reduced = downsample_2x(child, tile_size, method);
        let x_off = (quadrant % 2) * half;
        let y_off = (quadrant / 2) * half;

        for row in 0..half {
            let src = row * half * 4;
            let dst = ((y_off + row) * tile_size + x_off) * 4;
            output[dst..dst + half * 4].copy_from_slice(&reduced[src..src + half * 4]);
        }
    }

    output
}

/// Alpha-weighted average of a 2x2 block.
///
/// Color is averaged over the block weighted by alpha, so transparent pixels
/// contribute nothing. Alpha is the rounded mean of the four alphas. A result
/// with zero alpha is canonical transparent black.
#[inline]
fn average_block(block: &[[u8; 4]; 4]) -> [u8; 4] {
    let alpha_sum: u32 = block.iter().map(|p| p[3] as u32).sum();
    let alpha = (alpha_sum + 2) / 4;
    if alpha == 0 {
        return [0, 0, 0, 0];
    }

    let mut out = [0u8; 4];
    for (channel, slot) in out.iter_mut().take(3).enumerate() {
        let weighted: u32 = block.iter().map(|p| p[channel] as u32 * p[3] as u32).sum();
        *slot = ((weighted + alpha_sum / 2) / alpha_sum) as u8;
    }
    out[3] = alpha as u8;
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_average_opaque() {
        let block = [[0, 0, 0, 255], [100, 0, 0, 255], [0, 100, 0, 255], [0, 0, 101, 255]];
        assert_eq!(average_block(&block), [25, 25, 25, 255]);
    }

    #[test]
    fn test_average_ignores_transparent_color() {
        let block = [[200, 100, 50, 255], [0, 0, 0, 0], [0, 0, 0, 0], [0, 0, 0, 0]];
        // Color of the only opaque pixel, a quarter of its alpha
        assert_eq!(average_block(&block), [200, 100, 50, 64]);
    }

    #[test]
    fn test_average_all_transparent() {
        let block = [[9, 9, 9, 0]; 4];
        assert_eq!(average_block(&block), [0, 0, 0, 0]);
    }

    #[test]
    fn test_average_tiny_alpha_rounds_to_transparent() {
        let block = [[255, 255, 255, 1], [0, 0, 0, 0], [0, 0, 0, 0], [0, 0, 0, 0]];
        assert_eq!(average_block(&block), [0, 0, 0, 0]);
    }

    #[test]
    fn test_downsample_nearest_takes_top_left() {
        let pixels: Vec<u8> = [[1, 1, 1, 255], [2, 2, 2, 255], [3, 3, 3, 255], [4, 4, 4, 255]]
            .concat();
        assert_eq!(downsample_2x(&pixels, 2, DownsampleMethod::Nearest), vec![1, 1, 1, 255]);
    }

    #[test]
    fn test_combine_children_places_quadrants() {
        let size = 4;
        let solid = |v: u8| [v, v, v, 255].repeat(size * size);
        let tr = solid(20);
        let bl = solid(30);
        let parent = combine_children(
            [None, Some(tr.as_slice()), Some(bl.as_slice()), None],
            size,
            DownsampleMethod::Average,
        );

        let px = |x: usize, y: usize| &parent[(y * size + x) * 4..(y * size + x) * 4 + 4];
        assert_eq!(px(0, 0), &[0, 0, 0, 0]);
        assert_eq!(px(3, 0), &[20, 20, 20, 255]);
        assert_eq!(px(0, 3), &[30, 30, 30, 255]);
        assert_eq!(px(3, 3), &[0, 0, 0, 0]);
    }

    #[test]
    fn test_method_from_str() {
        assert_eq!("average".parse::<DownsampleMethod>().unwrap(), DownsampleMethod::Average);
        assert_eq!("nearest".parse::<DownsampleMethod>().unwrap(), DownsampleMethod::Nearest);
        assert!("max".parse::<DownsampleMethod>().is_err());
    }
}
