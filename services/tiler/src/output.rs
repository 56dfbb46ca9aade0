//! Tile tree writer.
//!
//! Tiles are encoded and written into a staging directory created next to
//! the output directory. Only when every tile and `metadata.json` are on disk
//! is the staging directory renamed into place, so readers never see a
//! partial tree. On any failure the staging directory is removed.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use tracing::{debug, info, warn};

use grid_processor::TilePyramid;
use renderer::png::{mode_of, PngMode};
use tile_common::{TileScheme, TilerError, TilerResult};

use crate::config::OutputFormat;

pub const METADATA_FILE: &str = "metadata.json";

/// Contents of `metadata.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TilesetMetadata {
    /// `[west, south, east, north]` in degrees; absent for an empty pyramid.
    pub bounds: Option<[f64; 4]>,
    pub minzoom: u32,
    pub maxzoom: u32,
    pub tile_size: u32,
    pub format: OutputFormat,
    pub scheme: TileScheme,
    pub tile_counts: Vec<LevelCount>,
    pub total_tiles: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LevelCount {
    pub zoom: u32,
    pub tiles: usize,
}

impl TilesetMetadata {
    pub fn from_pyramid(pyramid: &TilePyramid, format: OutputFormat, scheme: TileScheme) -> Self {
        let (minzoom, maxzoom) = pyramid.zoom_range();
        let bounds = pyramid
            .bounds()
            .map(|b| projection::unproject_bounds(&b))
            .map(|b| [b.min_x, b.min_y, b.max_x, b.max_y]);

        Self {
            bounds,
            minzoom,
            maxzoom,
            tile_size: pyramid.tile_size(),
            format,
            scheme,
            tile_counts: pyramid
                .level_counts()
                .into_iter()
                .map(|(zoom, tiles)| LevelCount { zoom, tiles })
                .collect(),
            total_tiles: pyramid.tile_count(),
        }
    }
}

/// What a successful write produced.
#[derive(Debug, Clone, PartialEq)]
pub struct WriteSummary {
    pub root: PathBuf,
    pub tiles_written: usize,
    pub bytes_written: u64,
    /// Tiles small enough in colors to be written as palette PNGs.
    pub indexed_tiles: usize,
    /// Tile writes that only succeeded on the second attempt.
    pub retries: usize,
}

/// Writes a [`TilePyramid`] as a `{z}/{x}/{y}` file tree.
#[derive(Debug, Clone)]
pub struct TileWriter {
    root: PathBuf,
    scheme: TileScheme,
    format: OutputFormat,
}

impl TileWriter {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            scheme: TileScheme::Xyz,
            format: OutputFormat::Png,
        }
    }

    pub fn with_scheme(mut self, scheme: TileScheme) -> Self {
        self.scheme = scheme;
        self
    }

    pub fn with_format(mut self, format: OutputFormat) -> Self {
        self.format = format;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Relative path of a tile below the output root.
    pub fn tile_path(&self, coord: &tile_common::TileCoord) -> String {
        self.scheme.tile_path(coord, self.format.extension())
    }

    pub fn write(&self, pyramid: &TilePyramid) -> TilerResult<WriteSummary> {
        let parent = match self.root.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&parent).map_err(|e| {
            TilerError::Output(format!("cannot create {}: {}", parent.display(), e))
        })?;

        let staging = tempfile::Builder::new()
            .prefix(".tiler-staging-")
            .tempdir_in(&parent)
            .map_err(|e| {
                TilerError::Output(format!(
                    "cannot create staging directory in {}: {}",
                    parent.display(),
                    e
                ))
            })?;

        debug!(staging = %staging.path().display(), tiles = pyramid.tile_count(), "Writing tiles");

        let bytes = AtomicU64::new(0);
        let retries = AtomicUsize::new(0);
        let indexed = AtomicUsize::new(0);
        let tile_size = pyramid.tile_size() as usize;

        pyramid
            .tiles()
            .collect::<Vec<_>>()
            .par_iter()
            .try_for_each(|tile| -> TilerResult<()> {
                let encoded = renderer::png::encode(&tile.pixels, tile_size, tile_size)?;
                if mode_of(&encoded) == Some(PngMode::Indexed) {
                    indexed.fetch_add(1, Ordering::Relaxed);
                }
                let path = staging.path().join(self.tile_path(&tile.coord));
                if write_with_retry(&path, &encoded)? {
                    retries.fetch_add(1, Ordering::Relaxed);
                }
                bytes.fetch_add(encoded.len() as u64, Ordering::Relaxed);
                Ok(())
            })?;

        let metadata = TilesetMetadata::from_pyramid(pyramid, self.format, self.scheme);
        let json = serde_json::to_vec_pretty(&metadata)
            .map_err(|e| TilerError::Output(format!("cannot serialize metadata: {}", e)))?;
        write_with_retry(&staging.path().join(METADATA_FILE), &json)?;

        self.publish(staging.path())?;

        let summary = WriteSummary {
            root: self.root.clone(),
            tiles_written: pyramid.tile_count(),
            bytes_written: bytes.into_inner(),
            indexed_tiles: indexed.into_inner(),
            retries: retries.into_inner(),
        };
        info!(
            root = %summary.root.display(),
            tiles = summary.tiles_written,
            bytes = summary.bytes_written,
            indexed = summary.indexed_tiles,
            retries = summary.retries,
            scheme = %self.scheme,
            "Published tile tree"
        );
        // `staging` now points at a moved directory; dropping it is a no-op
        Ok(summary)
    }

    /// Move the finished staging tree to the output root, replacing any
    /// previous tree.
    fn publish(&self, staged: &Path) -> TilerResult<()> {
        let previous = if self.root.exists() {
            let aside = sibling_path(&self.root, ".tiler-previous-");
            fs::rename(&self.root, &aside).map_err(|e| {
                TilerError::Output(format!(
                    "cannot move existing {} aside: {}",
                    self.root.display(),
                    e
                ))
            })?;
            Some(aside)
        } else {
            None
        };

        if let Err(e) = fs::rename(staged, &self.root) {
            if let Some(aside) = &previous {
                // Put the old tree back
                let _ = fs::rename(aside, &self.root);
            }
            return Err(TilerError::Output(format!(
                "cannot publish tiles to {}: {}",
                self.root.display(),
                e
            )));
        }

        if let Some(aside) = previous {
            if let Err(e) = fs::remove_dir_all(&aside) {
                warn!(path = %aside.display(), error = %e, "Could not remove previous tile tree");
            }
        }
        Ok(())
    }
}

/// Write a file, creating parent directories; retries once on failure.
///
/// Returns `true` when the first attempt failed and the retry succeeded.
fn write_with_retry(path: &Path, contents: &[u8]) -> TilerResult<bool> {
    let attempt = || -> std::io::Result<()> {
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)?;
        }
        fs::write(path, contents)
    };

    match attempt() {
        Ok(()) => Ok(false),
        Err(first) => {
            warn!(path = %path.display(), error = %first, "Tile write failed, retrying once");
            attempt().map(|_| true).map_err(|e| {
                TilerError::Output(format!("cannot write {}: {}", path.display(), e))
            })
        }
    }
}

fn sibling_path(path: &Path, prefix: &str) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!("{}{}-{}", prefix, name, std::process::id()))
}
