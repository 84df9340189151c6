//! Core utilities for the forge frame pipeline.
//!
//! This crate provides foundational types used across the workspace:
//! - Error types and result aliases
//! - Logging initialization
//! - Frame timing
//! - Renderer configuration

mod config;
mod error;
mod logging;
mod timer;

pub use config::{RendererConfig, WindowConfig};
pub use error::{Error, Result};
pub use logging::{DEFAULT_LOG_FILTER, init_logging, init_logging_with};
pub use timer::Timer;
