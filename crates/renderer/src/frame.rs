//! Per-frame-slot state.

use forge_resources::{DestroyBatch, ResourceId, ResourceTable};
use tracing::debug;

use crate::backend::GpuBackend;
use crate::error::RenderResult;
use crate::render_scene::RenderScene;

/// Slot limits for the render scene each context owns.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SceneLimits {
    pub max_cameras: u32,
    pub max_uniform_slots: u32,
    pub max_lights: u32,
}

/// Everything one frame in flight owns.
///
/// The command pool and buffers live in the resource table; the context only
/// keeps their ids. `fence` is the proof that the last frame recorded with this
/// context has finished on the GPU, and `retired` holds the destroys that
/// become safe once it has.
pub struct FrameContext<B: GpuBackend> {
    index: usize,
    generation: u64,
    command_pool: ResourceId,
    command_buffer: ResourceId,
    pass_command_buffers: Vec<ResourceId>,
    pub(crate) fence: B::Fence,
    pub(crate) transient_fence: B::Fence,
    pub(crate) image_acquired: B::Semaphore,
    pub(crate) render_complete: B::Semaphore,
    pub(crate) render_scene: RenderScene,
    retired: DestroyBatch,
    image_index: Option<u32>,
}

impl<B: GpuBackend> FrameContext<B> {
    pub fn new(
        backend: &mut B,
        resources: &mut ResourceTable,
        index: usize,
        generation: u64,
        limits: SceneLimits,
    ) -> RenderResult<Self> {
        let pool = backend.create_command_pool()?;
        let command_buffer = backend.allocate_command_buffer(&pool)?;
        // Signalled so the first wait on a fresh context returns at once.
        let fence = backend.create_fence(true)?;
        let transient_fence = backend.create_fence(false)?;
        let image_acquired = backend.create_semaphore()?;
        let render_complete = backend.create_semaphore()?;

        let command_pool = resources.allocate(pool);
        let command_buffer = resources.allocate(command_buffer);

        debug!(
            "Created frame context {} (generation {})",
            index, generation
        );

        Ok(Self {
            index,
            generation,
            command_pool,
            command_buffer,
            pass_command_buffers: Vec::new(),
            fence,
            transient_fence,
            image_acquired,
            render_complete,
            render_scene: RenderScene::new(
                limits.max_cameras,
                limits.max_uniform_slots,
                limits.max_lights,
            ),
            retired: DestroyBatch::default(),
            image_index: None,
        })
    }

    /// Make sure there is one pass command buffer per registered pass.
    pub fn ensure_pass_command_buffers(
        &mut self,
        backend: &mut B,
        resources: &mut ResourceTable,
        count: usize,
    ) -> RenderResult<()> {
        while self.pass_command_buffers.len() < count {
            let pool = resources.try_get::<B::CommandPool>(self.command_pool)?;
            let command_buffer = backend.allocate_command_buffer(pool)?;
            self.pass_command_buffers
                .push(resources.allocate(command_buffer));
        }
        Ok(())
    }

    pub fn index(&self) -> usize {
        self.index
    }

    /// Unique per created context; a rebuild always produces new generations.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn command_pool(&self) -> ResourceId {
        self.command_pool
    }

    pub fn command_buffer(&self) -> ResourceId {
        self.command_buffer
    }

    pub fn pass_command_buffer(&self, pass: usize) -> Option<ResourceId> {
        self.pass_command_buffers.get(pass).copied()
    }

    pub fn render_scene(&self) -> &RenderScene {
        &self.render_scene
    }

    /// Swapchain image this context last rendered to.
    pub fn image_index(&self) -> Option<u32> {
        self.image_index
    }

    pub(crate) fn set_image_index(&mut self, image_index: u32) {
        self.image_index = Some(image_index);
    }

    /// Park `batch` until this context's fence has been waited on again.
    pub fn retire(&mut self, batch: DestroyBatch) {
        self.retired.append(batch);
    }

    pub fn take_retired(&mut self) -> DestroyBatch {
        std::mem::take(&mut self.retired)
    }

    pub fn retired_len(&self) -> usize {
        self.retired.len()
    }

    /// Queue the command pool and buffers for destruction.
    ///
    /// The pool is queued first so the reverse-order flush frees the buffers
    /// before the pool they were allocated from. Fences and semaphores are
    /// dropped with `self`; the device must be idle.
    pub fn release(mut self, resources: &mut ResourceTable) {
        resources.flush_batch(self.take_retired());

        resources.destroy(self.command_pool);
        resources.destroy(self.command_buffer);
        for &id in &self.pass_command_buffers {
            resources.destroy(id);
        }

        debug!(
            "Released frame context {} (generation {})",
            self.index, self.generation
        );
    }
}
