//! The multi-frame-in-flight render loop.
//!
//! One call to [`FramePipeline::render_frame`] walks one frame context through
//!
//! ```text
//! Idle -> Acquiring -> Recording -> Submitted -> Presenting
//!            |                                      |
//!            +--------> RebuildingSwapchain <-------+
//! ```
//!
//! Deferred destroys queued on the resource table while a frame is recorded are
//! retired into that frame's context at submission and only flushed after the
//! context's fence has been waited on again, the next time the slot comes round.

use forge_core::RendererConfig;
use forge_resources::{ResourceId, ResourceTable};
use forge_scene::Scene;
use tracing::{debug, error, info, trace, warn};

use crate::backend::{
    AcquireOutcome, CommandRecorder, FrameTarget, GpuBackend, ImageLayout, ImageTarget,
    PresentOutcome, Submission,
};
use crate::error::{RenderError, RenderResult};
use crate::frame::{FrameContext, SceneLimits};
use crate::render_pass::{RenderPass, RenderPassParams, RenderingData, run_pass};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameState {
    Idle,
    Acquiring,
    Recording,
    Submitted,
    Presenting,
    RebuildingSwapchain,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameOutcome {
    Presented { frame_index: usize, image_index: u32 },
    /// The swapchain was stale and has been rebuilt; nothing was presented.
    SwapchainRebuilt,
}

/// Subset of [`RendererConfig`] the pipeline keeps.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PipelineSettings {
    pub inter_pass_fencing: bool,
    pub fence_timeout_ns: u64,
    pub limits: SceneLimits,
}

impl From<&RendererConfig> for PipelineSettings {
    fn from(config: &RendererConfig) -> Self {
        Self {
            inter_pass_fencing: config.inter_pass_fencing,
            fence_timeout_ns: config.fence_timeout(),
            limits: SceneLimits {
                max_cameras: config.max_cameras,
                max_uniform_slots: config.max_uniform_slots,
                max_lights: config.max_lights,
            },
        }
    }
}

/// Drives one [`FrameContext`] per swapchain image through the frame states.
///
/// Contexts are declared before the backend so their sync objects are dropped
/// while the device still exists.
pub struct FramePipeline<B: GpuBackend> {
    contexts: Vec<FrameContext<B>>,
    passes: Vec<Box<dyn RenderPass>>,
    backend: B,
    settings: PipelineSettings,
    state: FrameState,
    frame_index: usize,
    cycle_states: Vec<FrameState>,
    next_generation: u64,
    rebuild_requested: bool,
}

fn log_failure<T>(what: &str, result: RenderResult<T>) -> RenderResult<T> {
    result.inspect_err(|e| error!("{} failed: {}", what, e))
}

impl<B: GpuBackend> FramePipeline<B> {
    /// Create one frame context per swapchain image.
    pub fn new(backend: B, resources: &mut ResourceTable, config: &RendererConfig) -> RenderResult<Self> {
        let mut pipeline = Self {
            contexts: Vec::new(),
            passes: Vec::new(),
            backend,
            settings: PipelineSettings::from(config),
            state: FrameState::Idle,
            frame_index: 0,
            cycle_states: Vec::new(),
            next_generation: 0,
            rebuild_requested: false,
        };
        pipeline.create_contexts(resources)?;

        info!(
            "Frame pipeline created with {} frames in flight (inter-pass fencing: {})",
            pipeline.contexts.len(),
            pipeline.settings.inter_pass_fencing
        );
        Ok(pipeline)
    }

    /// Register a pass. Passes run in registration order.
    pub fn add_pass(&mut self, pass: Box<dyn RenderPass>) {
        debug!("Registered render pass '{}'", pass.name());
        self.passes.push(pass);
    }

    /// Rebuild the swapchain at the start of the next frame, e.g. after a resize.
    pub fn request_rebuild(&mut self) {
        self.rebuild_requested = true;
    }

    pub fn state(&self) -> FrameState {
        self.state
    }

    pub fn frame_index(&self) -> usize {
        self.frame_index
    }

    pub fn frame_count(&self) -> usize {
        self.contexts.len()
    }

    /// States entered during the last `render_frame` call, in order.
    pub fn last_cycle_states(&self) -> &[FrameState] {
        &self.cycle_states
    }

    pub fn context_generations(&self) -> Vec<u64> {
        self.contexts.iter().map(FrameContext::generation).collect()
    }

    pub fn context(&self, index: usize) -> Option<&FrameContext<B>> {
        self.contexts.get(index)
    }

    pub fn passes(&self) -> impl Iterator<Item = &dyn RenderPass> {
        self.passes.iter().map(|pass| pass.as_ref())
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    fn enter(&mut self, state: FrameState) {
        trace!("Frame {}: {:?} -> {:?}", self.frame_index, self.state, state);
        self.state = state;
        self.cycle_states.push(state);
    }

    /// Run one frame.
    ///
    /// # Errors
    ///
    /// [`RenderError::SceneTooLarge`] is returned before an image is acquired
    /// or the frame fence reset, so the next call can render a smaller scene.
    /// Any other backend failure except a stale swapchain is logged and
    /// returned; the pipeline should be considered unusable afterwards.
    pub fn render_frame(&mut self, resources: &mut ResourceTable, scene: &Scene) -> RenderResult<FrameOutcome> {
        self.cycle_states.clear();

        if self.rebuild_requested {
            self.rebuild(resources)?;
            return Ok(FrameOutcome::SwapchainRebuilt);
        }

        let frame_index = self.frame_index;
        if frame_index >= self.contexts.len() {
            return Err(RenderError::MissingFrameContext(frame_index));
        }

        // Everything retired the last time this slot was submitted is safe to
        // release once its fence has signalled.
        self.enter(FrameState::Idle);
        {
            let context = &mut self.contexts[frame_index];
            log_failure(
                "Frame fence wait",
                self.backend
                    .wait_for_fence(&context.fence, self.settings.fence_timeout_ns),
            )?;
            let retired = context.take_retired();
            if !retired.is_empty() {
                let released = resources.flush_batch(retired);
                debug!("Frame {}: released {} resources", frame_index, released);
            }
        }

        // The snapshot is taken before any image is acquired or fence reset, so
        // a rejected scene leaves the slot ready for the next call.
        {
            let pass_count = if self.settings.inter_pass_fencing {
                self.passes.len()
            } else {
                0
            };
            let context = &mut self.contexts[frame_index];
            context.ensure_pass_command_buffers(&mut self.backend, resources, pass_count)?;
            if let Err(e) = context.render_scene.convert(scene, resources) {
                warn!("Frame {}: scene rejected: {}", frame_index, e);
                return Err(e);
            }
            log_failure(
                "Scene upload",
                self.backend.upload_scene(frame_index, &context.render_scene),
            )?;
        }

        self.enter(FrameState::Acquiring);
        let acquired = log_failure(
            "Image acquire",
            self.backend
                .acquire_next_image(&self.contexts[frame_index].image_acquired),
        )?;
        let image_index = match acquired {
            AcquireOutcome::Acquired(index) => index,
            AcquireOutcome::Stale => {
                info!("Swapchain stale on acquire");
                self.rebuild(resources)?;
                return Ok(FrameOutcome::SwapchainRebuilt);
            }
        };

        self.enter(FrameState::Recording);
        self.contexts[frame_index].set_image_index(image_index);
        log_failure("Frame recording", self.record_and_submit(resources, frame_index, image_index))?;

        let retired = resources.retire_pending();
        if !retired.is_empty() {
            trace!("Frame {}: retiring {} destroys", frame_index, retired.len());
        }
        self.contexts[frame_index].retire(retired);
        self.enter(FrameState::Submitted);

        self.enter(FrameState::Presenting);
        let presented = log_failure(
            "Present",
            self.backend
                .present(image_index, &self.contexts[frame_index].render_complete),
        )?;
        match presented {
            PresentOutcome::Presented => {
                self.frame_index = (frame_index + 1) % self.contexts.len();
                Ok(FrameOutcome::Presented {
                    frame_index,
                    image_index,
                })
            }
            PresentOutcome::Stale => {
                info!("Swapchain stale on present");
                self.rebuild(resources)?;
                Ok(FrameOutcome::SwapchainRebuilt)
            }
        }
    }

    fn record_and_submit(&mut self, resources: &ResourceTable, frame_index: usize, image_index: u32) -> RenderResult<()> {
        let Self {
            backend,
            contexts,
            passes,
            settings,
            ..
        } = self;
        let context = &contexts[frame_index];
        let target = FrameTarget {
            frame_index,
            image_index,
        };
        let rendering_data = RenderingData {
            render_scene: &context.render_scene,
            extent: backend.extent(),
            frame_index,
        };
        // Published by a pass for the ones after it, this frame only.
        let mut shadowmap: Option<ResourceId> = None;

        let frame_buffer_id = context.command_buffer();
        let frame_buffer = resources.try_get::<B::CommandBuffer>(frame_buffer_id)?;

        if !settings.inter_pass_fencing {
            backend.begin_commands(frame_buffer)?;
            backend.record(frame_buffer, resources, target, &mut |commands: &mut dyn CommandRecorder| {
                for pass in passes.iter_mut() {
                    let mut params = RenderPassParams {
                        command_buffer: frame_buffer_id,
                        rendering_data: &rendering_data,
                        commands: &mut *commands,
                        resources,
                        frame_target: ImageTarget::Backbuffer,
                        shadowmap,
                    };
                    run_pass(pass.as_mut(), &mut params)?;
                    shadowmap = params.shadowmap;
                }
                commands.transition(ImageTarget::Backbuffer, ImageLayout::Present);
                Ok(())
            })?;
            backend.end_commands(frame_buffer)?;
            backend.reset_fence(&context.fence)?;
            return backend.submit(Submission {
                command_buffer: frame_buffer,
                wait_semaphore: Some(&context.image_acquired),
                signal_semaphore: Some(&context.render_complete),
                fence: Some(&context.fence),
            });
        }

        // Each pass gets its own submission and a full wait before the next.
        let mut waited_on_acquire = false;
        for (pass_index, pass) in passes.iter_mut().enumerate() {
            let buffer_id = context
                .pass_command_buffer(pass_index)
                .ok_or(RenderError::MissingFrameContext(frame_index))?;
            let buffer = resources.try_get::<B::CommandBuffer>(buffer_id)?;

            backend.begin_commands(buffer)?;
            backend.record(buffer, resources, target, &mut |commands: &mut dyn CommandRecorder| {
                let mut params = RenderPassParams {
                    command_buffer: buffer_id,
                    rendering_data: &rendering_data,
                    commands,
                    resources,
                    frame_target: ImageTarget::Backbuffer,
                    shadowmap,
                };
                let result = run_pass(pass.as_mut(), &mut params);
                shadowmap = params.shadowmap;
                result
            })?;
            backend.end_commands(buffer)?;

            backend.reset_fence(&context.transient_fence)?;
            backend.submit(Submission {
                command_buffer: buffer,
                wait_semaphore: (!waited_on_acquire).then_some(&context.image_acquired),
                signal_semaphore: None,
                fence: Some(&context.transient_fence),
            })?;
            waited_on_acquire = true;
            backend.wait_for_fence(&context.transient_fence, settings.fence_timeout_ns)?;
            trace!("Pass '{}' completed", pass.name());
        }

        backend.begin_commands(frame_buffer)?;
        backend.record(frame_buffer, resources, target, &mut |commands: &mut dyn CommandRecorder| {
            commands.transition(ImageTarget::Backbuffer, ImageLayout::Present);
            Ok(())
        })?;
        backend.end_commands(frame_buffer)?;
        backend.reset_fence(&context.fence)?;
        backend.submit(Submission {
            command_buffer: frame_buffer,
            wait_semaphore: (!waited_on_acquire).then_some(&context.image_acquired),
            signal_semaphore: Some(&context.render_complete),
            fence: Some(&context.fence),
        })
    }

    /// Stop-the-world swapchain rebuild.
    fn rebuild(&mut self, resources: &mut ResourceTable) -> RenderResult<()> {
        self.enter(FrameState::RebuildingSwapchain);
        info!("Rebuilding swapchain and {} frame contexts", self.contexts.len());

        log_failure("Device idle wait", self.backend.wait_idle())?;
        self.release_contexts(resources);
        log_failure("Swapchain recreation", self.backend.recreate_swapchain())?;
        self.create_contexts(resources)?;

        self.frame_index = 0;
        self.rebuild_requested = false;
        self.enter(FrameState::Idle);
        Ok(())
    }

    fn create_contexts(&mut self, resources: &mut ResourceTable) -> RenderResult<()> {
        let count = self.backend.image_count() as usize;
        let mut contexts = Vec::with_capacity(count);
        for index in 0..count {
            let generation = self.next_generation;
            self.next_generation += 1;
            contexts.push(FrameContext::new(
                &mut self.backend,
                resources,
                index,
                generation,
                self.settings.limits,
            )?);
        }
        self.contexts = contexts;
        Ok(())
    }

    /// Flush everything and tear down the contexts. The device must be idle.
    fn release_contexts(&mut self, resources: &mut ResourceTable) {
        for context in &mut self.contexts {
            resources.flush_batch(context.take_retired());
        }
        resources.flush();

        for context in self.contexts.drain(..) {
            context.release(resources);
        }
        let released = resources.flush();
        debug!("Released {} resources while tearing down frame contexts", released);
    }

    /// Wait for the GPU, flush every deferred destroy and drop the frame contexts.
    ///
    /// `render_frame` fails with [`RenderError::MissingFrameContext`] afterwards.
    pub fn shutdown(&mut self, resources: &mut ResourceTable) -> RenderResult<()> {
        log_failure("Device idle wait", self.backend.wait_idle())?;
        self.release_contexts(resources);
        self.frame_index = 0;
        self.state = FrameState::Idle;
        info!("Frame pipeline shut down");
        Ok(())
    }
}

impl<B: GpuBackend> Drop for FramePipeline<B> {
    fn drop(&mut self) {
        if !self.contexts.is_empty() {
            if let Err(e) = self.backend.wait_idle() {
                error!("Failed to wait for device idle on drop: {}", e);
            }
            debug!("Frame pipeline dropped without shutdown");
        }
    }
}
