//! [`GpuBackend`] implementation on top of `forge_rhi`.

mod recorder;
mod scene_bindings;

pub use recorder::{Backbuffer, VulkanRecorder, from_vk_extent, to_vk_extent, to_vk_layout};
pub use scene_bindings::{MAX_SHADOW_VIEWS_PER_FRAME, SceneBindings};

use std::sync::Arc;

use ash::vk;
use forge_core::RendererConfig;
use forge_platform::{Surface, Window, required_surface_extensions};
use forge_resources::ResourceTable;
use forge_rhi::physical_device::select_physical_device;
use forge_rhi::{
    CommandBuffer, CommandPool, Device, Fence, Instance, Semaphore, Swapchain, SwapchainStatus,
};
use tracing::{debug, info};

use crate::backend::{
    AcquireOutcome, Extent2D, FrameTarget, GpuBackend, PresentOutcome, RecordFn, Submission,
};
use crate::error::{RenderError, RenderResult};
use crate::render_scene::RenderScene;

/// Owns the Vulkan instance, surface, device and swapchain of one window.
///
/// Fields drop in declaration order: swapchain, scene bindings, device,
/// surface, instance. Anything else holding the [`Device`] (frame contexts,
/// the resource table) must be released before the backend is dropped.
pub struct VulkanBackend {
    swapchain: Swapchain,
    /// Last layout recorded for each swapchain image.
    image_layouts: Vec<vk::ImageLayout>,
    scene_bindings: SceneBindings,
    device: Arc<Device>,
    surface: Surface,
    instance: Instance,
    requested_extent: vk::Extent2D,
}

impl VulkanBackend {
    /// Bring up Vulkan for `window`.
    ///
    /// # Errors
    ///
    /// Fails if no Vulkan loader or suitable GPU is available, or if the
    /// surface or swapchain cannot be created.
    pub fn new(window: &Window, config: &RendererConfig) -> RenderResult<Self> {
        let extensions = required_surface_extensions(window.raw_display_handle()?)?;
        let instance = Instance::new(c"forge", config.validation, &extensions)?;
        let surface = window.create_surface(instance.entry(), instance.handle())?;

        let physical_device =
            select_physical_device(instance.handle(), surface.handle(), surface.loader())?;
        info!("Using GPU {}", physical_device.device_name());
        let device = Device::new(&instance, &physical_device)?;

        let requested_extent = vk::Extent2D {
            width: window.width(),
            height: window.height(),
        };
        let swapchain = Swapchain::new(&instance, device.clone(), surface.handle(), requested_extent)?;
        let image_layouts = vec![vk::ImageLayout::UNDEFINED; swapchain.image_count() as usize];
        let scene_bindings = SceneBindings::new(device.clone(), config.max_cameras)?;

        Ok(Self {
            swapchain,
            image_layouts,
            scene_bindings,
            device,
            surface,
            instance,
            requested_extent,
        })
    }

    /// Size used for the next swapchain rebuild.
    pub fn set_requested_extent(&mut self, width: u32, height: u32) {
        self.requested_extent = vk::Extent2D { width, height };
    }

    pub fn device(&self) -> &Arc<Device> {
        &self.device
    }

    pub fn color_format(&self) -> vk::Format {
        self.swapchain.format()
    }

    /// Descriptor set layout mesh and shadow pipelines declare at set 0.
    pub fn scene_set_layout(&self) -> vk::DescriptorSetLayout {
        self.scene_bindings.layout()
    }

    pub fn has_validation(&self) -> bool {
        self.instance.has_validation()
    }

    pub fn surface(&self) -> &Surface {
        &self.surface
    }
}

impl GpuBackend for VulkanBackend {
    type Fence = Fence;
    type Semaphore = Semaphore;
    type CommandPool = CommandPool;
    type CommandBuffer = CommandBuffer;

    fn image_count(&self) -> u32 {
        self.swapchain.image_count()
    }

    fn extent(&self) -> Extent2D {
        from_vk_extent(self.swapchain.extent())
    }

    fn create_fence(&mut self, signaled: bool) -> RenderResult<Fence> {
        Ok(Fence::new(self.device.clone(), signaled)?)
    }

    fn create_semaphore(&mut self) -> RenderResult<Semaphore> {
        Ok(Semaphore::new(self.device.clone())?)
    }

    fn create_command_pool(&mut self) -> RenderResult<CommandPool> {
        let graphics = self.device.queue_families().graphics;
        Ok(CommandPool::new(self.device.clone(), graphics)?)
    }

    fn allocate_command_buffer(&mut self, pool: &CommandPool) -> RenderResult<CommandBuffer> {
        Ok(CommandBuffer::new(pool)?)
    }

    fn wait_for_fence(&mut self, fence: &Fence, timeout_ns: u64) -> RenderResult<()> {
        Ok(fence.wait(timeout_ns)?)
    }

    fn reset_fence(&mut self, fence: &Fence) -> RenderResult<()> {
        Ok(fence.reset()?)
    }

    fn acquire_next_image(&mut self, signal: &Semaphore) -> RenderResult<AcquireOutcome> {
        Ok(match self.swapchain.acquire(signal.handle())? {
            SwapchainStatus::Ok(index) => AcquireOutcome::Acquired(index),
            SwapchainStatus::Stale => AcquireOutcome::Stale,
        })
    }

    fn begin_commands(&mut self, command_buffer: &CommandBuffer) -> RenderResult<()> {
        Ok(command_buffer.begin()?)
    }

    fn end_commands(&mut self, command_buffer: &CommandBuffer) -> RenderResult<()> {
        Ok(command_buffer.end()?)
    }

    fn upload_scene(&mut self, frame_index: usize, scene: &RenderScene) -> RenderResult<()> {
        self.scene_bindings.upload(frame_index, scene)
    }

    fn record(
        &mut self,
        command_buffer: &CommandBuffer,
        resources: &ResourceTable,
        target: FrameTarget,
        record: &mut RecordFn<'_>,
    ) -> RenderResult<()> {
        let index = target.image_index;
        let (Some(image), Some(view)) = (
            self.swapchain.image(index),
            self.swapchain.image_view(index),
        ) else {
            return Err(RenderError::Backend(format!(
                "swapchain image {} does not exist",
                index
            )));
        };
        let backbuffer = Backbuffer {
            image,
            view,
            extent: self.swapchain.extent(),
        };
        let layout = self
            .image_layouts
            .get_mut(index as usize)
            .ok_or_else(|| RenderError::Backend(format!("no layout tracked for image {}", index)))?;

        let mut recorder = VulkanRecorder::new(
            command_buffer,
            resources,
            backbuffer,
            layout,
            &mut self.scene_bindings,
            target.frame_index,
        );
        record(&mut recorder)
    }

    fn submit(&mut self, submission: Submission<'_, Self>) -> RenderResult<()> {
        let command_buffers = [submission.command_buffer.handle()];
        let wait_semaphores: Vec<vk::Semaphore> =
            submission.wait_semaphore.map(Semaphore::handle).into_iter().collect();
        let wait_stages = vec![vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT; wait_semaphores.len()];
        let signal_semaphores: Vec<vk::Semaphore> =
            submission.signal_semaphore.map(Semaphore::handle).into_iter().collect();

        let submit_info = vk::SubmitInfo::default()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&wait_stages)
            .command_buffers(&command_buffers)
            .signal_semaphores(&signal_semaphores);

        let fence = submission.fence.map_or(vk::Fence::null(), Fence::handle);
        Ok(self.device.submit_graphics(&submit_info, fence)?)
    }

    fn present(&mut self, image_index: u32, wait: &Semaphore) -> RenderResult<PresentOutcome> {
        let status = self
            .swapchain
            .present(self.device.present_queue(), image_index, wait.handle())?;
        Ok(match status {
            SwapchainStatus::Ok(()) => PresentOutcome::Presented,
            SwapchainStatus::Stale => PresentOutcome::Stale,
        })
    }

    fn wait_idle(&mut self) -> RenderResult<()> {
        Ok(self.device.wait_idle()?)
    }

    fn recreate_swapchain(&mut self) -> RenderResult<()> {
        self.swapchain.recreate(self.requested_extent)?;
        self.image_layouts = vec![vk::ImageLayout::UNDEFINED; self.swapchain.image_count() as usize];
        self.scene_bindings
            .truncate_frames(self.swapchain.image_count() as usize);
        debug!(
            "Swapchain now {}x{} with {} images",
            self.swapchain.extent().width,
            self.swapchain.extent().height,
            self.swapchain.image_count()
        );
        Ok(())
    }
}
