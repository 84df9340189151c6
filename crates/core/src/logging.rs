//! Logging initialization.

use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Directives used when `RUST_LOG` is not set.
pub const DEFAULT_LOG_FILTER: &str = "info,forge_renderer=debug,forge_resources=info";

/// Initialize tracing with the default filter.
///
/// `RUST_LOG` takes precedence over [`DEFAULT_LOG_FILTER`].
///
/// # Example
/// ```
/// forge_core::init_logging();
/// tracing::info!("Frame pipeline starting");
/// ```
pub fn init_logging() {
    init_logging_with(DEFAULT_LOG_FILTER);
}

/// Initialize tracing, falling back to `directives` when `RUST_LOG` is unset or invalid.
///
/// Calling this more than once is harmless; only the first subscriber is kept.
pub fn init_logging_with(directives: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(directives));

    let result = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(true).with_thread_ids(true))
        .try_init();

    if result.is_err() {
        tracing::debug!("Global subscriber already installed, keeping it");
    }
}
