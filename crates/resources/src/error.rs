//! Error types for resource lookups.

use thiserror::Error;

use crate::handle::ResourceId;

/// Error returned by checked resource lookups.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResourceError {
    /// The id does not name a live resource.
    #[error("Invalid resource handle {0}")]
    InvalidHandle(ResourceId),

    /// The slot is live but holds a different type.
    #[error("Resource {id} is a {found}, not a {expected}")]
    TypeMismatch {
        id: ResourceId,
        expected: &'static str,
        found: &'static str,
    },
}

/// Result type alias for resource operations.
pub type ResourceResult<T> = Result<T, ResourceError>;
