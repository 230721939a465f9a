//! Error types for separation and evaluation

use thiserror::Error;

use crate::target::Target;

/// Separation/evaluation error types
#[derive(Error, Debug)]
pub enum UnmixError {
    /// Malformed shapes, negative magnitudes, empty signals or K/C misconfiguration
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Fewer clusters than targets, so a target has nothing left to take
    #[error("No unused cluster left for target {target} ({clusters} clusters for {targets} targets)")]
    AssignmentExhausted {
        target: Target,
        clusters: usize,
        targets: usize,
    },

    /// FFT planning or execution failed
    #[error("FFT error: {0}")]
    Fft(String),

    /// Audio or dataset could not be read
    #[error("Failed to load: {0}")]
    Load(String),

    /// Estimate, image or report could not be written
    #[error("Failed to write: {0}")]
    Write(String),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for separation/evaluation operations
pub type UnmixResult<T> = Result<T, UnmixError>;
