//! Renderer error type.

use std::fmt;

use forge_resources::ResourceError;
use forge_rhi::RhiError;
use thiserror::Error;

/// Fixed-size pool inside a [`RenderScene`](crate::RenderScene).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SlotKind {
    Cameras,
    Objects,
    Lights,
}

impl fmt::Display for SlotKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SlotKind::Cameras => "camera slots",
            SlotKind::Objects => "object uniform slots",
            SlotKind::Lights => "lights",
        })
    }
}

#[derive(Error, Debug)]
pub enum RenderError {
    #[error(transparent)]
    Rhi(#[from] RhiError),

    #[error(transparent)]
    Resource(#[from] ResourceError),

    #[error(transparent)]
    Core(#[from] forge_core::Error),

    /// The scene needs more slots than the render scene was sized for.
    #[error("Scene too large: needs more than {capacity} {kind}")]
    SceneTooLarge { kind: SlotKind, capacity: u32 },

    /// A backend failure that has no richer representation.
    #[error("Backend error: {0}")]
    Backend(String),

    /// The pipeline has no context for this frame slot, e.g. after shutdown.
    #[error("No frame context for frame {0}")]
    MissingFrameContext(usize),
}

pub type RenderResult<T> = std::result::Result<T, RenderError>;
