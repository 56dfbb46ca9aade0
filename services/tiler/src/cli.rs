//! Command-line surface: argument parsing, config resolution and the
//! end-to-end run.

use anyhow::{Context, Result};
use clap::Parser;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

use grid_processor::DownsampleMethod;
use renderer::{ColorRamp, ColorSelection};
use tile_common::{TileScheme, TilerError};

use crate::config::{parse_zoom_range, ConfigOverrides, OutputFormat, TilerConfig};
use crate::geotiff;
use crate::output::{TileWriter, WriteSummary};
use crate::pipeline::{Pipeline, PipelineStats};

#[derive(Parser, Debug, Clone)]
#[command(name = "tiler")]
#[command(about = "Render a continuous-value GeoTIFF into a colorized web mercator tile pyramid")]
pub struct Args {
    /// Source GeoTIFF (band 1 is colorized)
    pub input: PathBuf,

    /// Colormap file, one `value R G B [A]` breakpoint per line
    pub colormap: PathBuf,

    /// Directory that receives the {z}/{x}/{y}.png tree
    pub output_dir: PathBuf,

    /// Zoom levels, either a range "0-3" or a single level "3"
    #[arg(short = 'z', long = "zoom", value_parser = parse_zoom_range)]
    pub zoom: Option<(i32, i32)>,

    /// Lower clamp bound in source units
    #[arg(long, allow_negative_numbers = true)]
    pub clamp_min: Option<f64>,

    /// Upper clamp bound in source units
    #[arg(long, allow_negative_numbers = true)]
    pub clamp_max: Option<f64>,

    /// Tile edge length in pixels
    #[arg(long)]
    pub tile_size: Option<u32>,

    /// Overview resampling: average or nearest
    #[arg(long)]
    pub resampling: Option<DownsampleMethod>,

    /// Breakpoint lookup: nearest, interpolate or exact
    #[arg(long)]
    pub color_selection: Option<ColorSelection>,

    /// Tile format
    #[arg(long)]
    pub format: Option<OutputFormat>,

    /// Row numbering of tile files: xyz or tms
    #[arg(long)]
    pub scheme: Option<TileScheme>,

    /// Also write the reprojected RGBA raster to this GeoTIFF
    #[arg(long)]
    pub keep_intermediate: Option<PathBuf>,

    /// Timeout for the reprojection stage in seconds
    #[arg(long)]
    pub timeout_secs: Option<u64>,

    /// YAML configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Log level (RUST_LOG takes precedence)
    #[arg(long, default_value = "info", env = "TILER_LOG_LEVEL")]
    pub log_level: String,

    /// Emit logs as JSON
    #[arg(long)]
    pub json_logs: bool,
}

impl Args {
    pub fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            clamp_min: self.clamp_min,
            clamp_max: self.clamp_max,
            zoom: self.zoom,
            tile_size: self.tile_size,
            resampling: self.resampling,
            color_selection: self.color_selection,
            output_format: self.format,
            tile_scheme: self.scheme,
            timeout_secs: self.timeout_secs,
            keep_intermediate: self.keep_intermediate.clone(),
        }
    }
}

/// Outcome of a successful run.
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub config: TilerConfig,
    pub stats: PipelineStats,
    pub write: WriteSummary,
}

/// Layer defaults, config file, process environment and flags.
pub fn load_config(args: &Args) -> Result<TilerConfig> {
    resolve_config(args, |key| std::env::var(key).ok())
}

/// Same as [`load_config`] with an explicit environment lookup.
pub fn resolve_config<F>(args: &Args, env: F) -> Result<TilerConfig>
where
    F: Fn(&str) -> Option<String>,
{
    let mut config = match &args.config {
        Some(path) => TilerConfig::from_yaml_file(path)?,
        None => TilerConfig::default(),
    };
    config.apply_env_from(env)?;
    config.apply_overrides(&args.overrides());
    config.validate()?;
    Ok(config)
}

/// Read and parse a colormap with percentages resolved against the
/// configured output range.
pub fn load_colormap(path: &Path, config: &TilerConfig) -> Result<ColorRamp> {
    let text = fs::read_to_string(path).map_err(|e| {
        TilerError::Input(format!("cannot read colormap {}: {}", path.display(), e))
    })?;
    let scale = config.scale_params();
    let ramp = ColorRamp::parse_with_range(&text, scale.lo, scale.hi)
        .with_context(|| format!("colormap {}", path.display()))?;
    Ok(ramp.with_selection(config.color_selection))
}

pub async fn run(args: Args) -> Result<RunSummary> {
    let config = load_config(&args)?;
    run_with_config(&args, config).await
}

pub async fn run_with_config(args: &Args, config: TilerConfig) -> Result<RunSummary> {
    info!(
        input = %args.input.display(),
        colormap = %args.colormap.display(),
        output = %args.output_dir.display(),
        config = ?config,
        "Resolved configuration"
    );

    let ramp = load_colormap(&args.colormap, &config)?;
    let source = geotiff::read_geotiff(&args.input)
        .with_context(|| format!("input {}", args.input.display()))?;

    let pipeline = Pipeline::native(config.pipeline_config());
    let output = pipeline.run(source, &ramp).await?;

    if let Some(path) = &config.keep_intermediate {
        geotiff::write_rgba_geotiff(path, &output.mercator)
            .with_context(|| format!("intermediate raster {}", path.display()))?;
        info!(path = %path.display(), "Kept intermediate mercator raster");
    }

    let writer = TileWriter::new(&args.output_dir)
        .with_scheme(config.tile_scheme)
        .with_format(config.output_format);
    let write = writer
        .write(&output.pyramid)
        .with_context(|| format!("output {}", args.output_dir.display()))?;

    Ok(RunSummary {
        config,
        stats: output.stats,
        write,
    })
}

/// Typed pipeline error behind an `anyhow` chain, if any.
pub fn tiler_error(err: &anyhow::Error) -> Option<&TilerError> {
    err.downcast_ref::<TilerError>()
}

/// Process exit code for a failed run: 2 for configuration and input
/// problems, 1 for everything else.
pub fn exit_code(err: &anyhow::Error) -> i32 {
    tiler_error(err).map(TilerError::exit_code).unwrap_or(1)
}

/// Pipeline stage to name in the terminating error line.
pub fn error_stage(err: &anyhow::Error) -> &'static str {
    tiler_error(err).map(TilerError::stage).unwrap_or("tiler")
}
