//! Errors raised by the Vulkan layer.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum RhiError {
    #[error("Vulkan error: {0}")]
    Vulkan(#[from] ash::vk::Result),

    #[error("Failed to load Vulkan: {0}")]
    Loading(#[from] ash::LoadingError),

    #[error("Allocator error: {0}")]
    Allocator(#[from] gpu_allocator::AllocationError),

    /// The allocator mutex was poisoned by a panic on another thread.
    #[error("GPU allocator lock poisoned")]
    AllocatorPoisoned,

    #[error("No suitable GPU found")]
    NoSuitableGpu,

    /// A fence did not signal within the configured timeout (nanoseconds).
    #[error("Fence wait timed out after {0} ns")]
    FenceTimeout(u64),

    #[error("Swapchain error: {0}")]
    Swapchain(String),

    #[error("Surface error: {0}")]
    Surface(String),

    #[error("Shader error: {0}")]
    Shader(String),

    #[error("Pipeline error: {0}")]
    Pipeline(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

pub type RhiResult<T> = std::result::Result<T, RhiError>;
