//! Renderer configuration.
//!
//! Configuration is read from a TOML file. Every field has a default, so a
//! missing file or a partial file both produce a usable [`RendererConfig`].
//!
//! ```toml
//! initial_arena_capacity = 128
//! inter_pass_fencing = false
//!
//! [window]
//! width = 1920
//! height = 1080
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::logging::DEFAULT_LOG_FILTER;

/// Window creation settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    pub width: u32,
    pub height: u32,
    pub title: String,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
            title: "Forge".to_string(),
        }
    }
}

/// Tunables for the resource table, frame pipeline and scene batching.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RendererConfig {
    /// Slots reserved by the resource arena before its first growth.
    pub initial_arena_capacity: usize,
    /// Camera uniform slots per render scene.
    pub max_cameras: u32,
    /// Per-object uniform slots per render scene.
    pub max_uniform_slots: u32,
    /// Lights collected per render scene.
    pub max_lights: u32,
    /// Edge length in texels of the directional shadow map.
    pub shadow_map_size: u32,
    /// Submit each render pass separately and wait on a transient fence between them.
    pub inter_pass_fencing: bool,
    /// Upper bound for a single fence wait in nanoseconds; unset waits forever.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fence_timeout_ns: Option<u64>,
    /// Clear color used by the opaque pass.
    pub clear_color: [f32; 4],
    /// Enable the Vulkan validation layer when available.
    pub validation: bool,
    /// Fallback tracing directives when `RUST_LOG` is unset.
    pub log_filter: String,
    pub window: WindowConfig,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            initial_arena_capacity: 64,
            max_cameras: 12,
            max_uniform_slots: 128,
            max_lights: 16,
            shadow_map_size: 2048,
            inter_pass_fencing: true,
            fence_timeout_ns: None,
            clear_color: [0.0, 0.0, 0.0, 1.0],
            validation: cfg!(debug_assertions),
            log_filter: DEFAULT_LOG_FILTER.to_string(),
            window: WindowConfig::default(),
        }
    }
}

impl RendererConfig {
    /// Parse a configuration from TOML text and validate it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the text is not valid TOML for this
    /// structure or if [`validate`](Self::validate) rejects it.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text).map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load a configuration file, falling back to defaults when it does not exist.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConfigRead`] if the file exists but cannot be read, and
    /// [`Error::Config`] if it cannot be parsed.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            debug!("No config at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let text = std::fs::read_to_string(path).map_err(|source| Error::ConfigRead {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_toml_str(&text)?;
        info!("Loaded renderer config from {}", path.display());
        Ok(config)
    }

    /// Fence wait timeout in nanoseconds, `u64::MAX` when unbounded.
    pub fn fence_timeout(&self) -> u64 {
        self.fence_timeout_ns.unwrap_or(u64::MAX)
    }

    /// Serialize to TOML.
    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| Error::Config(e.to_string()))
    }

    /// Check invariants the rest of the workspace relies on.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] naming the offending field.
    pub fn validate(&self) -> Result<()> {
        if self.initial_arena_capacity == 0 || !self.initial_arena_capacity.is_power_of_two() {
            return Err(Error::Config(format!(
                "initial_arena_capacity must be a non-zero power of two, got {}",
                self.initial_arena_capacity
            )));
        }
        if self.max_cameras == 0 {
            return Err(Error::Config("max_cameras must be at least 1".to_string()));
        }
        if self.max_uniform_slots == 0 {
            return Err(Error::Config(
                "max_uniform_slots must be at least 1".to_string(),
            ));
        }
        if self.shadow_map_size == 0 {
            return Err(Error::Config(
                "shadow_map_size must be at least 1".to_string(),
            ));
        }
        if self.window.width == 0 || self.window.height == 0 {
            return Err(Error::Config(format!(
                "window size must be non-zero, got {}x{}",
                self.window.width, self.window.height
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_documented_limits() {
        let config = RendererConfig::default();
        assert_eq!(config.initial_arena_capacity, 64);
        assert_eq!(config.max_cameras, 12);
        assert_eq!(config.max_uniform_slots, 128);
        assert_eq!(config.max_lights, 16);
        assert_eq!(config.shadow_map_size, 2048);
        assert!(config.inter_pass_fencing);
        assert_eq!(config.fence_timeout(), u64::MAX);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = RendererConfig::from_toml_str(
            r#"
            inter_pass_fencing = false

            [window]
            width = 800
            "#,
        )
        .unwrap();

        assert!(!config.inter_pass_fencing);
        assert_eq!(config.window.width, 800);
        assert_eq!(config.window.height, 720);
        assert_eq!(config.max_cameras, 12);
    }

    #[test]
    fn test_rejects_non_power_of_two_capacity() {
        let err = RendererConfig::from_toml_str("initial_arena_capacity = 48").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_rejects_empty_shadow_map() {
        let err = RendererConfig::from_toml_str("shadow_map_size = 0").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_rejects_malformed_toml() {
        let err = RendererConfig::from_toml_str("max_cameras = \"many\"").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let config = RendererConfig::load("/nonexistent/forge.toml").unwrap();
        assert_eq!(config, RendererConfig::default());
    }

    #[test]
    fn test_toml_round_trip() {
        let mut config = RendererConfig::default();
        config.clear_color = [0.1, 0.2, 0.3, 1.0];
        let text = config.to_toml_string().unwrap();
        assert_eq!(RendererConfig::from_toml_str(&text).unwrap(), config);
    }
}
