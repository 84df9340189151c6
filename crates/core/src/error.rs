//! Error types shared by the frame pipeline crates.

use std::path::PathBuf;

use thiserror::Error;

/// Top-level error for platform, configuration and bootstrap failures.
#[derive(Error, Debug)]
pub enum Error {
    /// Window creation or event loop failures
    #[error("Window error: {0}")]
    Window(String),

    /// Presentation surface could not be created
    #[error("Surface error: {0}")]
    Surface(String),

    /// Configuration file could not be parsed or holds invalid values
    #[error("Config error: {0}")]
    Config(String),

    /// Configuration file exists but could not be read
    #[error("Failed to read config '{path}': {source}")]
    ConfigRead {
        /// Path that was read.
        path: PathBuf,
        /// Underlying IO failure.
        source: std::io::Error,
    },

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic internal errors
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias using the core [`Error`].
pub type Result<T> = std::result::Result<T, Error>;
