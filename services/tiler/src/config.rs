//! Tiler configuration.
//!
//! Sources, lowest to highest precedence: built-in defaults, a YAML file,
//! `TILER_*` environment variables, command-line flags.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use std::fs;

use grid_processor::{validate_zoom_range, DownsampleMethod, PyramidConfig, Resampling};
use renderer::{ColorSelection, ScaleParams};
use tile_common::{TileScheme, TilerError, TilerResult};

use crate::pipeline::PipelineConfig;

/// Default clamp range: mean sea-level pressure in hPa.
pub const DEFAULT_CLAMP_MIN: f64 = 1021.5;
pub const DEFAULT_CLAMP_MAX: f64 = 1027.5;
pub const DEFAULT_TIMEOUT_SECS: u64 = 600;

/// Encoding of the written tiles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Png,
}

impl OutputFormat {
    /// File extension without the dot.
    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Png => "png",
        }
    }
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "png" => Ok(OutputFormat::Png),
            other => Err(format!("unsupported output format '{}', expected png", other)),
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

/// Complete runtime configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TilerConfig {
    /// Values at or below this render as the lowest color
    pub clamp_min: f64,

    /// Values at or above this render as the highest color
    pub clamp_max: f64,

    /// Coarsest zoom level written
    pub zoom_min: i32,

    /// Finest zoom level written (base level of the pyramid)
    pub zoom_max: i32,

    /// Tile edge length in pixels
    pub tile_size: u32,

    /// Overview reduction
    pub resampling: DownsampleMethod,

    /// Breakpoint lookup policy
    pub color_selection: ColorSelection,

    pub output_format: OutputFormat,

    pub tile_scheme: TileScheme,

    /// Upper bound for the reprojection stage
    pub timeout_secs: u64,

    /// Where to keep the mercator RGBA raster as GeoTIFF, if anywhere
    pub keep_intermediate: Option<PathBuf>,
}

impl Default for TilerConfig {
    fn default() -> Self {
        Self {
            clamp_min: DEFAULT_CLAMP_MIN,
            clamp_max: DEFAULT_CLAMP_MAX,
            zoom_min: 0,
            zoom_max: 3,
            tile_size: 256,
            resampling: DownsampleMethod::Average,
            color_selection: ColorSelection::Nearest,
            output_format: OutputFormat::Png,
            tile_scheme: TileScheme::Xyz,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            keep_intermediate: None,
        }
    }
}

/// Values given explicitly on the command line.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConfigOverrides {
    pub clamp_min: Option<f64>,
    pub clamp_max: Option<f64>,
    pub zoom: Option<(i32, i32)>,
    pub tile_size: Option<u32>,
    pub resampling: Option<DownsampleMethod>,
    pub color_selection: Option<ColorSelection>,
    pub output_format: Option<OutputFormat>,
    pub tile_scheme: Option<TileScheme>,
    pub timeout_secs: Option<u64>,
    pub keep_intermediate: Option<PathBuf>,
}

impl TilerConfig {
    /// Load a YAML config file. Missing keys keep their defaults.
    pub fn from_yaml_file(path: &Path) -> TilerResult<Self> {
        let text = fs::read_to_string(path).map_err(|e| {
            TilerError::Input(format!("cannot read config file {}: {}", path.display(), e))
        })?;
        Self::from_yaml_str(&text)
            .map_err(|e| TilerError::InvalidConfig(format!("{}: {}", path.display(), e)))
    }

    pub fn from_yaml_str(text: &str) -> Result<Self, String> {
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(text).map_err(|e| e.to_string())
    }

    /// Apply `TILER_*` variables from an arbitrary lookup.
    pub fn apply_env_from<F>(&mut self, lookup: F) -> TilerResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        env_override(&lookup, "TILER_CLAMP_MIN", &mut self.clamp_min)?;
        env_override(&lookup, "TILER_CLAMP_MAX", &mut self.clamp_max)?;
        env_override(&lookup, "TILER_ZOOM_MIN", &mut self.zoom_min)?;
        env_override(&lookup, "TILER_ZOOM_MAX", &mut self.zoom_max)?;
        env_override(&lookup, "TILER_TILE_SIZE", &mut self.tile_size)?;
        env_override(&lookup, "TILER_RESAMPLING", &mut self.resampling)?;
        env_override(&lookup, "TILER_COLOR_SELECTION", &mut self.color_selection)?;
        env_override(&lookup, "TILER_OUTPUT_FORMAT", &mut self.output_format)?;
        env_override(&lookup, "TILER_TILE_SCHEME", &mut self.tile_scheme)?;
        env_override(&lookup, "TILER_TIMEOUT_SECS", &mut self.timeout_secs)?;

        if let Some(path) = lookup("TILER_KEEP_INTERMEDIATE").filter(|v| !v.is_empty()) {
            self.keep_intermediate = Some(PathBuf::from(path));
        }
        Ok(())
    }

    pub fn apply_overrides(&mut self, overrides: &ConfigOverrides) {
        if let Some(v) = overrides.clamp_min {
            self.clamp_min = v;
        }
        if let Some(v) = overrides.clamp_max {
            self.clamp_max = v;
        }
        if let Some((z_min, z_max)) = overrides.zoom {
            self.zoom_min = z_min;
            self.zoom_max = z_max;
        }
        if let Some(v) = overrides.tile_size {
            self.tile_size = v;
        }
        if let Some(v) = overrides.resampling {
            self.resampling = v;
        }
        if let Some(v) = overrides.color_selection {
            self.color_selection = v;
        }
        if let Some(v) = overrides.output_format {
            self.output_format = v;
        }
        if let Some(v) = overrides.tile_scheme {
            self.tile_scheme = v;
        }
        if let Some(v) = overrides.timeout_secs {
            self.timeout_secs = v;
        }
        if let Some(v) = &overrides.keep_intermediate {
            self.keep_intermediate = Some(v.clone());
        }
    }

    /// Validate configuration.
    /// Reject bad values before any work starts. Clamp and zoom problems keep
    /// their own error kinds so the failure names the stage they belong to.
    pub fn validate(&self) -> TilerResult<()> {
        self.scale_params().validate()?;
        validate_zoom_range(self.zoom_min, self.zoom_max)?;
        self.pyramid_config().validate()?;

        if self.timeout_secs == 0 {
            return Err(TilerError::InvalidConfig(
                "timeout_secs must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }

    pub fn scale_params(&self) -> ScaleParams {
        ScaleParams::new(self.clamp_min, self.clamp_max)
    }

    pub fn pyramid_config(&self) -> PyramidConfig {
        PyramidConfig {
            tile_size: self.tile_size,
            overview: self.resampling,
            base_sampling: Resampling::Nearest,
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig {
            scale: self.scale_params(),
            band_index: 0,
            zoom_min: self.zoom_min,
            zoom_max: self.zoom_max,
            pyramid: self.pyramid_config(),
            warp_resampling: Resampling::Nearest,
            timeout: self.timeout(),
        }
    }
}

fn env_override<F, T>(lookup: &F, key: &str, slot: &mut T) -> TilerResult<()>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: fmt::Display,
{
    let Some(raw) = lookup(key) else {
        return Ok(());
    };
    *slot = raw
        .trim()
        .parse()
        .map_err(|e| TilerError::InvalidConfig(format!("{}={:?}: {}", key, raw, e)))?;
    Ok(())
}

/// Parse a zoom argument: a single level `"5"` or an inclusive range `"0-3"`.
pub fn parse_zoom_range(s: &str) -> Result<(i32, i32), String> {
    let s = s.trim();
    let parse = |part: &str| {
        part.trim()
            .parse::<i32>()
            .map_err(|_| format!("invalid zoom level '{}' in '{}'", part, s))
    };

    match s.split_once('-') {
        Some((min, max)) => Ok((parse(min)?, parse(max)?)),
        None => {
            let z = parse(s)?;
            Ok((z, z))
        }
    }
}
