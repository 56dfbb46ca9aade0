//! Color ramps: ordered breakpoint tables that turn normalized bytes into RGBA.
//!
//! Colormap files hold one breakpoint per line:
//!
//! ```text
//! # value  R   G   B  [A]
//! 1        0   0   255
//! 50%      0   255 0
//! 255      255 0   0   200
//! nv       0   0   0   0
//! ```
//!
//! Fields may be separated by whitespace, commas, tabs or colons. `N%` values
//! are placed relative to the normalized output range. `nv` lines are accepted
//! and ignored because the no-data sentinel always renders transparent.

use crate::normalize::NODATA_SENTINEL;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tile_common::{ByteRaster, RgbaRaster, TilerError, TilerResult};

/// Straight (non-premultiplied) RGBA8 color.
pub type Rgba = [u8; 4];

/// Fully transparent black.
pub const TRANSPARENT: Rgba = [0, 0, 0, 0];

/// One entry of a ramp.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ColorBreakpoint {
    pub value: f64,
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl ColorBreakpoint {
    pub fn new(value: f64, r: u8, g: u8, b: u8) -> Self {
        Self::with_alpha(value, r, g, b, 255)
    }

    pub fn with_alpha(value: f64, r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { value, r, g, b, a }
    }

    pub fn rgba(&self) -> Rgba {
        [self.r, self.g, self.b, self.a]
    }
}

/// How a value between breakpoints is colored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColorSelection {
    /// Color of the closest breakpoint; ties go to the lower one.
    #[default]
    Nearest,
    /// Linear RGBA blend of the two bracketing breakpoints.
    Interpolate,
    /// Only values equal to a breakpoint are colored, others are transparent.
    Exact,
}

impl FromStr for ColorSelection {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "nearest" => Ok(ColorSelection::Nearest),
            "interpolate" | "linear" => Ok(ColorSelection::Interpolate),
            "exact" => Ok(ColorSelection::Exact),
            other => Err(format!(
                "unknown color selection '{}', expected nearest, interpolate or exact",
                other
            )),
        }
    }
}

impl fmt::Display for ColorSelection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ColorSelection::Nearest => write!(f, "nearest"),
            ColorSelection::Interpolate => write!(f, "interpolate"),
            ColorSelection::Exact => write!(f, "exact"),
        }
    }
}

/// Non-empty breakpoint table in strictly increasing value order.
#[derive(Debug, Clone, PartialEq)]
pub struct ColorRamp {
    breakpoints: Vec<ColorBreakpoint>,
    selection: ColorSelection,
}

impl ColorRamp {
    /// Parse colormap text, resolving percentages against the default
    /// normalized range 1..=255.
    pub fn parse(text: &str) -> TilerResult<Self> {
        Self::parse_with_range(text, 1, 255)
    }

    /// Parse colormap text, resolving `N%` values against `[lo, hi]`.
    pub fn parse_with_range(text: &str, lo: u8, hi: u8) -> TilerResult<Self> {
        let mut entries: Vec<(usize, ColorBreakpoint)> = Vec::new();

        for (idx, raw_line) in text.lines().enumerate() {
            let line_no = idx + 1;
            let line = match raw_line.find('#') {
                Some(pos) => &raw_line[..pos],
                None => raw_line,
            };

            let fields: Vec<&str> = line
                .split(|c: char| c.is_whitespace() || c == ',' || c == ':')
                .filter(|f| !f.is_empty())
                .collect();

            if fields.is_empty() {
                continue;
            }
            if fields[0].eq_ignore_ascii_case("nv") {
                continue;
            }
            if fields.len() != 4 && fields.len() != 5 {
                return Err(TilerError::ramp_parse(
                    line_no,
                    format!(
                        "expected 'value R G B [A]', found {} field(s)",
                        fields.len()
                    ),
                ));
            }

            let value =
                parse_value(fields[0], lo, hi).map_err(|m| TilerError::ramp_parse(line_no, m))?;
            let mut channels = [255u8; 4];
            for (slot, field) in channels.iter_mut().zip(&fields[1..]) {
                *slot = parse_channel(field).map_err(|m| TilerError::ramp_parse(line_no, m))?;
            }

            let [r, g, b, a] = channels;
            entries.push((line_no, ColorBreakpoint::with_alpha(value, r, g, b, a)));
        }

        if entries.is_empty() {
            return Err(TilerError::ramp_parse(
                text.lines().count().max(1),
                "colormap defines no breakpoints",
            ));
        }

        entries.sort_by(|a, b| a.1.value.total_cmp(&b.1.value));
        if let Some(pair) = entries.windows(2).find(|w| w[0].1.value == w[1].1.value) {
            let (first_line, bp) = pair[0];
            let second_line = pair[1].0;
            return Err(TilerError::ramp_parse(
                first_line.max(second_line),
                format!(
                    "duplicate breakpoint value {} (also on line {})",
                    bp.value,
                    first_line.min(second_line)
                ),
            ));
        }

        Ok(Self {
            breakpoints: entries.into_iter().map(|(_, bp)| bp).collect(),
            selection: ColorSelection::default(),
        })
    }

    /// Build a ramp from breakpoints in any order.
    pub fn from_breakpoints(mut breakpoints: Vec<ColorBreakpoint>) -> TilerResult<Self> {
        if breakpoints.is_empty() {
            return Err(TilerError::ramp_parse(0, "colormap defines no breakpoints"));
        }
        if let Some(bp) = breakpoints.iter().find(|bp| !bp.value.is_finite()) {
            return Err(TilerError::ramp_parse(
                0,
                format!("breakpoint value {} is not finite", bp.value),
            ));
        }
        breakpoints.sort_by(|a, b| a.value.total_cmp(&b.value));
        if let Some(pair) = breakpoints.windows(2).find(|w| w[0].value == w[1].value) {
            return Err(TilerError::ramp_parse(
                0,
                format!("duplicate breakpoint value {}", pair[0].value),
            ));
        }
        Ok(Self {
            breakpoints,
            selection: ColorSelection::default(),
        })
    }

    pub fn with_selection(mut self, selection: ColorSelection) -> Self {
        self.selection = selection;
        self
    }

    pub fn selection(&self) -> ColorSelection {
        self.selection
    }

    pub fn breakpoints(&self) -> &[ColorBreakpoint] {
        &self.breakpoints
    }

    /// Color for a normalized value. The sentinel 0 is always transparent.
    pub fn resolve(&self, value: u8) -> Rgba {
        if value == NODATA_SENTINEL {
            return TRANSPARENT;
        }
        let v = value as f64;
        let bps = &self.breakpoints;

        // First breakpoint with value >= v
        let upper = bps.partition_point(|bp| bp.value < v);

        match self.selection {
            ColorSelection::Exact => match bps.get(upper) {
                Some(bp) if bp.value == v => bp.rgba(),
                _ => TRANSPARENT,
            },
            _ if upper == 0 => bps[0].rgba(),
            _ if upper == bps.len() => bps[bps.len() - 1].rgba(),
            ColorSelection::Nearest => {
                let lower = &bps[upper - 1];
                let above = &bps[upper];
                if above.value - v < v - lower.value {
                    above.rgba()
                } else {
                    lower.rgba()
                }
            }
            ColorSelection::Interpolate => {
                let lower = &bps[upper - 1];
                let above = &bps[upper];
                let t = (v - lower.value) / (above.value - lower.value);
                let (a, b) = (lower.rgba(), above.rgba());
                let mut out = [0u8; 4];
                for i in 0..4 {
                    let c = a[i] as f64 + t * (b[i] as f64 - a[i] as f64);
                    out[i] = c.round().clamp(0.0, 255.0) as u8;
                }
                out
            }
        }
    }

    /// Precompute the color of every byte value.
    pub fn lut(&self) -> ColorLut {
        let mut entries = [TRANSPARENT; 256];
        for (value, entry) in entries.iter_mut().enumerate() {
            *entry = self.resolve(value as u8);
        }
        ColorLut { entries }
    }
}

fn parse_value(field: &str, lo: u8, hi: u8) -> Result<f64, String> {
    let value = match field.strip_suffix('%') {
        Some(pct) => {
            let pct: f64 = pct
                .parse()
                .map_err(|_| format!("invalid percentage '{}'", field))?;
            lo as f64 + pct / 100.0 * (hi as f64 - lo as f64)
        }
        None => field
            .parse::<f64>()
            .map_err(|_| format!("invalid breakpoint value '{}'", field))?,
    };
    if !value.is_finite() {
        return Err(format!("breakpoint value '{}' is not finite", field));
    }
    Ok(value)
}

fn parse_channel(field: &str) -> Result<u8, String> {
    let channel: i64 = field
        .parse()
        .map_err(|_| format!("invalid color channel '{}'", field))?;
    u8::try_from(channel).map_err(|_| format!("color channel {} outside 0-255", channel))
}

/// 256-entry table mapping each normalized byte to its color.
#[derive(Debug, Clone, PartialEq)]
pub struct ColorLut {
    entries: [Rgba; 256],
}

impl ColorLut {
    #[inline]
    pub fn get(&self, value: u8) -> Rgba {
        self.entries[value as usize]
    }

    pub fn entries(&self) -> &[Rgba; 256] {
        &self.entries
    }
}

/// Colorize a normalized raster. Georeferencing is carried over unchanged.
pub fn colorize(raster: ByteRaster, lut: &ColorLut) -> RgbaRaster {
    let width = raster.width;
    let mut pixels = vec![0u8; raster.width * raster.height * 4];

    pixels
        .par_chunks_mut(width * 4)
        .zip(raster.data.par_chunks(width))
        .for_each(|(out_row, in_row)| {
            for (out, &value) in out_row.chunks_exact_mut(4).zip(in_row) {
                out.copy_from_slice(&lut.get(value));
            }
        });

    RgbaRaster {
        width: raster.width,
        height: raster.height,
        pixels,
        transform: raster.transform,
        crs: raster.crs,
    }
}
