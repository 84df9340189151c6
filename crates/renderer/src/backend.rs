//! The seam between the frame pipeline and a graphics API.
//!
//! [`FramePipeline`](crate::FramePipeline) drives frames entirely through
//! [`GpuBackend`]; render passes record through [`CommandRecorder`]. Neither
//! trait exposes API-specific structs, so the pipeline can run against the
//! Vulkan backend or a scripted test double.

use forge_resources::{Resource, ResourceId, ResourceTable};

use crate::error::RenderResult;
use crate::render_scene::RenderScene;
use crate::ubo::{MaterialUniform, ObjectUniform};

/// Width and height in pixels.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Extent2D {
    pub width: u32,
    pub height: u32,
}

impl Extent2D {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    pub fn aspect_ratio(&self) -> f32 {
        if self.height == 0 {
            1.0
        } else {
            self.width as f32 / self.height as f32
        }
    }
}

/// Result of asking the swapchain for the next image.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AcquireOutcome {
    Acquired(u32),
    /// Out of date or suboptimal; the swapchain must be rebuilt.
    Stale,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PresentOutcome {
    Presented,
    Stale,
}

/// An image a pass can render into or transition.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ImageTarget {
    /// The swapchain image acquired for the frame being recorded.
    Backbuffer,
    /// A render target living in the resource table.
    Resource(ResourceId),
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum ImageLayout {
    #[default]
    Undefined,
    ColorAttachment,
    DepthAttachment,
    ShaderReadOnly,
    Present,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LoadOp {
    #[default]
    Clear,
    Load,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ClearValue {
    pub color: [f32; 4],
    pub depth: f32,
}

impl Default for ClearValue {
    fn default() -> Self {
        Self {
            color: [0.0, 0.0, 0.0, 1.0],
            depth: 1.0,
        }
    }
}

/// Attachments and load behaviour for one dynamic-rendering scope.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RenderingDesc {
    /// `None` renders depth only.
    pub color: Option<ImageTarget>,
    pub depth: Option<ImageTarget>,
    pub load_op: LoadOp,
    pub clear: ClearValue,
    pub extent: Extent2D,
}

/// The frame being recorded.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FrameTarget {
    /// Frame context whose uploaded scene uniforms draws read.
    pub frame_index: usize,
    /// Swapchain image [`ImageTarget::Backbuffer`] refers to.
    pub image_index: u32,
}

/// One queue submission.
pub struct Submission<'a, B: GpuBackend + ?Sized> {
    pub command_buffer: &'a B::CommandBuffer,
    /// Waited on before color output.
    pub wait_semaphore: Option<&'a B::Semaphore>,
    pub signal_semaphore: Option<&'a B::Semaphore>,
    /// Signalled when the command buffer has finished executing.
    pub fence: Option<&'a B::Fence>,
}

/// Commands a render pass may record.
///
/// Resource ids are resolved against the table handed to
/// [`GpuBackend::record`]. Methods that take an id return `false` when it does
/// not name a live resource of the expected kind; nothing is recorded then.
pub trait CommandRecorder {
    /// Size of `target`, `None` if it cannot be resolved.
    fn target_extent(&self, target: ImageTarget) -> Option<Extent2D>;

    /// Move `target` into `layout`. A no-op when it is already there.
    fn transition(&mut self, target: ImageTarget, layout: ImageLayout) -> bool;

    fn begin_rendering(&mut self, desc: &RenderingDesc) -> bool;

    fn end_rendering(&mut self);

    fn set_viewport_and_scissor(&mut self, extent: Extent2D);

    fn bind_pipeline(&mut self, pipeline: ResourceId) -> bool;

    fn bind_vertex_buffer(&mut self, buffer: ResourceId) -> bool;

    fn bind_index_buffer(&mut self, buffer: ResourceId) -> bool;

    /// Bind the frame's scene uniforms for the bound pipeline: the camera in
    /// `camera_slot`, the lighting block and `shadowmap`. With no shadow map
    /// the backend binds a fully lit placeholder.
    ///
    /// Returns `false` when `shadowmap` does not name a live render target.
    fn bind_scene_uniforms(&mut self, camera_slot: u32, shadowmap: Option<ResourceId>) -> bool;

    /// Upload the per-draw constants for the next draw.
    fn push_uniforms(&mut self, object: &ObjectUniform, material: &MaterialUniform);

    fn draw_indexed(&mut self, index_count: u32);
}

/// Closure run by [`GpuBackend::record`] with a live recorder.
pub type RecordFn<'a> = dyn FnMut(&mut dyn CommandRecorder) -> RenderResult<()> + 'a;

/// Everything the frame pipeline needs from a graphics API.
///
/// Command pools and buffers are [`Resource`]s so frame contexts can keep them
/// in the resource table and release them through deferred destruction.
pub trait GpuBackend {
    type Fence;
    type Semaphore;
    type CommandPool: Resource;
    type CommandBuffer: Resource;

    /// Number of swapchain images, which is also the number of frame contexts.
    fn image_count(&self) -> u32;

    fn extent(&self) -> Extent2D;

    fn create_fence(&mut self, signaled: bool) -> RenderResult<Self::Fence>;

    fn create_semaphore(&mut self) -> RenderResult<Self::Semaphore>;

    fn create_command_pool(&mut self) -> RenderResult<Self::CommandPool>;

    fn allocate_command_buffer(&mut self, pool: &Self::CommandPool) -> RenderResult<Self::CommandBuffer>;

    /// Block until `fence` signals or `timeout_ns` elapses.
    fn wait_for_fence(&mut self, fence: &Self::Fence, timeout_ns: u64) -> RenderResult<()>;

    fn reset_fence(&mut self, fence: &Self::Fence) -> RenderResult<()>;

    /// Acquire the next presentable image, signalling `signal` once it is ready.
    fn acquire_next_image(&mut self, signal: &Self::Semaphore) -> RenderResult<AcquireOutcome>;

    fn begin_commands(&mut self, command_buffer: &Self::CommandBuffer) -> RenderResult<()>;

    fn end_commands(&mut self, command_buffer: &Self::CommandBuffer) -> RenderResult<()>;

    /// Copy the camera and lighting uniforms of `scene` into the storage owned
    /// by frame context `frame_index`. Called once per frame after that
    /// context's fence has signalled, so the previous contents are unused.
    fn upload_scene(&mut self, frame_index: usize, scene: &RenderScene) -> RenderResult<()>;

    /// Run `record` with a recorder writing into `command_buffer`.
    fn record(
        &mut self,
        command_buffer: &Self::CommandBuffer,
        resources: &ResourceTable,
        target: FrameTarget,
        record: &mut RecordFn<'_>,
    ) -> RenderResult<()>;

    fn submit(&mut self, submission: Submission<'_, Self>) -> RenderResult<()>;

    fn present(&mut self, image_index: u32, wait: &Self::Semaphore) -> RenderResult<PresentOutcome>;

    /// Block until the device has finished all submitted work.
    fn wait_idle(&mut self) -> RenderResult<()>;

    /// Rebuild the swapchain for the current surface size.
    fn recreate_swapchain(&mut self) -> RenderResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extent_aspect_ratio() {
        assert_eq!(Extent2D::new(1600, 800).aspect_ratio(), 2.0);
        assert_eq!(Extent2D::new(10, 0).aspect_ratio(), 1.0);
        assert!(Extent2D::new(0, 720).is_empty());
    }

    #[test]
    fn test_clear_value_default() {
        let clear = ClearValue::default();
        assert_eq!(clear.color, [0.0, 0.0, 0.0, 1.0]);
        assert_eq!(clear.depth, 1.0);
    }
}
