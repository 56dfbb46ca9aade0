//! Shared types for grid processing.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// How a point is sampled from an RGBA raster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Resampling {
    /// Value of the pixel containing the point (preserves exact colors).
    #[default]
    Nearest,
    /// Alpha-weighted blend of the four surrounding pixel centres.
    /// Alpha itself is still taken from the nearest pixel.
    Bilinear,
}

impl FromStr for Resampling {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "nearest" | "near" => Ok(Self::Nearest),
            "bilinear" => Ok(Self::Bilinear),
            other => Err(format!(
                "unknown resampling '{}', expected nearest or bilinear",
                other
            )),
        }
    }
}

impl fmt::Display for Resampling {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Nearest => write!(f, "nearest"),
            Self::Bilinear => write!(f, "bilinear"),
        }
    }
}
