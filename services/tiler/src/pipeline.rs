//! Pipeline coordinator.
//!
//! Runs the stages strictly in order, each consuming the previous stage's
//! output:
//!
//! ```text
//! Raster ─► normalize ─► colorize ─► mask ─► clip + warp ─► pyramid
//! ```
//!
//! The first failing stage aborts the run and its error is returned as is.

use std::sync::Arc;
use std::time::{Duration, Instant};

use grid_processor::{
    validate_zoom_range, NativeWarper, PyramidBuilder, PyramidConfig, Resampling, TilePyramid,
    WarpRequest, Warper,
};
use renderer::{colorize, normalize, ColorRamp, ScaleParams, ValidityMask};
use tile_common::{Raster, RgbaRaster, TilerError, TilerResult};
use tracing::{debug, error, info};

/// Parameters of one pipeline run.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    pub scale: ScaleParams,
    /// Zero-based band that is colorized.
    pub band_index: usize,
    pub zoom_min: i32,
    pub zoom_max: i32,
    pub pyramid: PyramidConfig,
    pub warp_resampling: Resampling,
    /// Upper bound for the reprojection stage.
    pub timeout: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            scale: ScaleParams::new(1021.5, 1027.5),
            band_index: 0,
            zoom_min: 0,
            zoom_max: 3,
            pyramid: PyramidConfig::default(),
            warp_resampling: Resampling::Nearest,
            timeout: Duration::from_secs(600),
        }
    }
}

/// Counters collected during a run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PipelineStats {
    pub source_width: usize,
    pub source_height: usize,
    pub valid_pixels: usize,
    pub mercator_width: usize,
    pub mercator_height: usize,
    pub tiles_per_level: Vec<(u32, usize)>,
    pub elapsed: Duration,
}

impl PipelineStats {
    pub fn total_tiles(&self) -> usize {
        self.tiles_per_level.iter().map(|(_, n)| n).sum()
    }
}

#[derive(Debug, Clone)]
pub struct PipelineOutput {
    /// Clipped, reprojected raster the base level was cut from.
    pub mercator: RgbaRaster,
    pub pyramid: TilePyramid,
    pub stats: PipelineStats,
}

pub struct Pipeline {
    config: PipelineConfig,
    warper: Arc<dyn Warper>,
}

impl Pipeline {
    pub fn new(config: PipelineConfig, warper: Arc<dyn Warper>) -> Self {
        Self { config, warper }
    }

    /// Pipeline backed by the built-in warper.
    pub fn native(config: PipelineConfig) -> Self {
        Self::new(config, Arc::new(NativeWarper::new()))
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub async fn run(&self, source: Raster, ramp: &ColorRamp) -> TilerResult<PipelineOutput> {
        let start = Instant::now();
        let cfg = &self.config;

        // Reject bad parameters before touching any pixels
        let (_, z_max) = validate_zoom_range(cfg.zoom_min, cfg.zoom_max)
            .map_err(|e| stage_failed("validate", e))?;
        cfg.scale
            .validate()
            .map_err(|e| stage_failed("validate", e))?;
        cfg.pyramid
            .validate()
            .map_err(|e| stage_failed("validate", e))?;

        info!(
            width = source.width(),
            height = source.height(),
            bands = source.band_count(),
            crs = ?source.crs(),
            clamp_min = cfg.scale.vmin,
            clamp_max = cfg.scale.vmax,
            zoom_min = cfg.zoom_min,
            zoom_max = cfg.zoom_max,
            warper = self.warper.name(),
            "Starting tiling pipeline"
        );

        let mut stats = PipelineStats {
            source_width: source.width(),
            source_height: source.height(),
            ..Default::default()
        };

        let normalized = normalize(&source, cfg.band_index, &cfg.scale)
            .map_err(|e| stage_failed("normalize", e))?;
        let colored = colorize(normalized, &ramp.lut());

        let mask = ValidityMask::from_raster(&source);
        stats.valid_pixels = mask.valid_count();
        let masked = mask.apply(colored).map_err(|e| stage_failed("mask", e))?;
        drop(mask);
        drop(source);

        debug!(
            valid = stats.valid_pixels,
            total = stats.source_width * stats.source_height,
            selection = %ramp.selection(),
            "Colorized and masked source"
        );

        let mercator = self.reproject(masked, z_max).await?;
        stats.mercator_width = mercator.width;
        stats.mercator_height = mercator.height;

        let pyramid = PyramidBuilder::new(cfg.pyramid)
            .build(&mercator, cfg.zoom_min, cfg.zoom_max)
            .map_err(|e| stage_failed("pyramid", e))?;

        stats.tiles_per_level = pyramid.level_counts();
        stats.elapsed = start.elapsed();

        info!(
            tiles = stats.total_tiles(),
            mercator_width = stats.mercator_width,
            mercator_height = stats.mercator_height,
            elapsed_ms = stats.elapsed.as_millis() as u64,
            "Tiling pipeline complete"
        );

        Ok(PipelineOutput {
            mercator,
            pyramid,
            stats,
        })
    }

    /// Clip and warp on the blocking pool, bounded by the configured timeout.
    async fn reproject(&self, raster: RgbaRaster, z_max: u32) -> TilerResult<RgbaRaster> {
        let resolution = projection::resolution(z_max, self.config.pyramid.tile_size);
        let request = WarpRequest::to_mercator()
            .with_resolution(resolution)
            .with_resampling(self.config.warp_resampling);
        let timeout = self.config.timeout;

        debug!(
            z_max,
            resolution,
            resampling = %request.resampling,
            timeout_secs = timeout.as_secs_f64(),
            "Reprojecting to EPSG:3857"
        );

        let warper = Arc::clone(&self.warper);
        let task = tokio::task::spawn_blocking(move || warper.reproject(raster, &request));

        let result = match tokio::time::timeout(timeout, task).await {
            Ok(Ok(result)) => result,
            Ok(Err(join_err)) => Err(TilerError::Reprojection(format!(
                "warp task failed: {}",
                join_err
            ))),
            Err(_) => Err(TilerError::PipelineTimeout {
                stage: "reproject".to_string(),
                seconds: timeout.as_secs(),
            }),
        };

        result.map_err(|e| stage_failed("reproject", e))
    }
}

fn stage_failed(stage: &'static str, err: TilerError) -> TilerError {
    error!(stage, error = %err, "Pipeline stage failed");
    err
}
