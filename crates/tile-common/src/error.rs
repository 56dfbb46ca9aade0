//! Error types for the tiling pipeline.

use thiserror::Error;

/// Result type alias using TilerError.
pub type TilerResult<T> = Result<T, TilerError>;

/// Primary error type for every pipeline stage.
#[derive(Debug, Error)]
pub enum TilerError {
    // === Configuration / input errors ===
    #[error("Input error: {0}")]
    Input(String),

    #[error("Invalid value range: {0}")]
    InvalidRange(String),

    #[error("Colormap parse error at line {line}: {message}")]
    RampParse { line: usize, message: String },

    #[error("Invalid zoom range {min}-{max}: {reason}")]
    InvalidZoomRange { min: i64, max: i64, reason: String },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // === Processing errors ===
    #[error("Reprojection failed: {0}")]
    Reprojection(String),

    #[error("Stage '{stage}' timed out after {seconds}s")]
    PipelineTimeout { stage: String, seconds: u64 },

    #[error("Failed to write output: {0}")]
    Output(String),
}

impl TilerError {
    /// Shorthand for a colormap error on a given (1-based) line.
    pub fn ramp_parse(line: usize, message: impl Into<String>) -> Self {
        Self::RampParse {
            line,
            message: message.into(),
        }
    }

    /// Shorthand for a zoom range rejection.
    pub fn invalid_zoom(min: i64, max: i64, reason: impl Into<String>) -> Self {
        Self::InvalidZoomRange {
            min,
            max,
            reason: reason.into(),
        }
    }

    /// True for errors caused by what the user supplied rather than by processing.
    pub fn is_configuration_error(&self) -> bool {
        matches!(
            self,
            TilerError::Input(_)
                | TilerError::InvalidRange(_)
                | TilerError::RampParse { .. }
                | TilerError::InvalidZoomRange { .. }
                | TilerError::InvalidConfig(_)
        )
    }

    /// Process exit code for this error.
    ///
    /// - 2: configuration or input problem
    /// - 1: runtime / processing failure
    pub fn exit_code(&self) -> i32 {
        if self.is_configuration_error() {
            2
        } else {
            1
        }
    }

    /// Short name of the pipeline stage that raises this kind of error.
    pub fn stage(&self) -> &'static str {
        match self {
            TilerError::Input(_) => "input",
            TilerError::InvalidRange(_) => "normalize",
            TilerError::RampParse { .. } => "colormap",
            TilerError::InvalidZoomRange { .. } => "pyramid",
            TilerError::InvalidConfig(_) => "config",
            TilerError::Reprojection(_) => "reproject",
            TilerError::PipelineTimeout { .. } => "reproject",
            TilerError::Output(_) => "output",
        }
    }
}

impl From<std::io::Error> for TilerError {
    fn from(err: std::io::Error) -> Self {
        TilerError::Output(err.to_string())
    }
}
