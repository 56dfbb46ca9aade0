//! Colorized web mercator tile pyramid generator.
//!
//! Library half of the `tiler` binary: configuration, GeoTIFF I/O, the
//! pipeline coordinator and the tile tree writer.

pub mod cli;
pub mod config;
pub mod geotiff;
pub mod output;
pub mod pipeline;

pub use cli::{exit_code, Args, RunSummary};
pub use config::{ConfigOverrides, OutputFormat, TilerConfig};
pub use output::{TileWriter, TilesetMetadata, WriteSummary};
pub use pipeline::{Pipeline, PipelineConfig, PipelineOutput, PipelineStats};
