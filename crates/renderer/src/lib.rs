//! Frame pipeline and scene batching.
//!
//! - [`FramePipeline`] drives N frames in flight, one [`FrameContext`] per
//!   swapchain image, and flushes deferred destroys once a frame's fence has
//!   signalled
//! - [`RenderScene`] turns a [`Scene`](forge_scene::Scene) into per-material
//!   draw batches with packed uniform slots
//! - [`RenderPass`] implementations record through [`CommandRecorder`]
//! - [`VulkanBackend`] is the production [`GpuBackend`]

mod backend;
mod error;
mod frame;
mod frame_pipeline;
pub mod passes;
mod render_pass;
mod render_scene;
pub mod ubo;
pub mod vulkan;

pub use backend::{
    AcquireOutcome, ClearValue, CommandRecorder, Extent2D, FrameTarget, GpuBackend, ImageLayout,
    ImageTarget, LoadOp, PresentOutcome, RecordFn, RenderingDesc, Submission,
};
pub use error::{RenderError, RenderResult, SlotKind};
pub use frame::{FrameContext, SceneLimits};
pub use frame_pipeline::{FrameOutcome, FramePipeline, FrameState, PipelineSettings};
pub use passes::{OpaquePass, OverlayFn, OverlayPass, ShadowPass};
pub use render_pass::{PassTargets, RenderPass, RenderPassParams, RenderingData, run_pass};
pub use render_scene::{Drawcall, RenderScene, SetPass};
pub use ubo::{
    CameraUniform, DrawConstants, LightingData, LightingUniform, MaterialUniform, ObjectUniform,
    SceneLight,
};
pub use vulkan::VulkanBackend;
