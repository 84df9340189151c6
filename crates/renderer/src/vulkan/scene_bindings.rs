//! Scene uniforms bound as descriptor set 0 of every mesh pipeline.
//!
//! Each frame context owns one host-visible uniform buffer:
//!
//! ```text
//! [camera 0][camera 1]...[camera N-1][lighting]
//!  ^ stride aligned to minUniformBufferOffsetAlignment
//! ```
//!
//! Binding 0 is a dynamic uniform buffer over one camera slot, picked by the
//! dynamic offset at bind time. Binding 1 is the lighting block and binding 2
//! the shadow map. Descriptor sets are allocated per distinct shadow map view
//! from a pool that is reset when the frame uploads its next scene.

use std::sync::Arc;

use ash::vk;
use forge_rhi::descriptor::{buffer_info, image_info, update_descriptor_sets};
use forge_rhi::{
    Buffer, BufferUsage, CommandBuffer, CommandPool, DescriptorBindingBuilder, DescriptorPool,
    DescriptorSetLayout, Device, Fence, RenderTarget, Sampler, SamplerKind,
};
use tracing::{debug, trace};

use crate::error::{RenderError, RenderResult};
use crate::render_scene::RenderScene;
use crate::ubo::{CameraUniform, LightingUniform};

/// Distinct shadow maps one frame can bind.
pub const MAX_SHADOW_VIEWS_PER_FRAME: u32 = 4;

struct FrameBindings {
    buffer: Buffer,
    pool: DescriptorPool,
    /// Sets written since the last upload, keyed by the shadow map view.
    sets: Vec<(vk::ImageView, vk::DescriptorSet)>,
}

pub struct SceneBindings {
    frames: Vec<FrameBindings>,
    /// 1x1 depth map cleared to the far plane, bound when no pass published a
    /// shadow map. Every comparison against it passes.
    fallback_shadowmap: RenderTarget,
    sampler: Sampler,
    layout: DescriptorSetLayout,
    device: Arc<Device>,
    camera_stride: vk::DeviceSize,
    lighting_offset: vk::DeviceSize,
    max_cameras: u32,
}

impl SceneBindings {
    /// # Errors
    ///
    /// Fails if any Vulkan object cannot be created or the fallback shadow map
    /// cannot be cleared.
    pub fn new(device: Arc<Device>, max_cameras: u32) -> RenderResult<Self> {
        let stages = vk::ShaderStageFlags::VERTEX | vk::ShaderStageFlags::FRAGMENT;
        let layout = DescriptorSetLayout::new(
            device.clone(),
            &[
                DescriptorBindingBuilder::uniform_buffer_dynamic(0, stages),
                DescriptorBindingBuilder::uniform_buffer(1, stages),
                DescriptorBindingBuilder::combined_image_sampler(2, vk::ShaderStageFlags::FRAGMENT),
            ],
        )?;
        let sampler = Sampler::new(device.clone(), SamplerKind::ShadowComparison)?;
        let fallback_shadowmap = RenderTarget::shadow_map(device.clone(), 1)?;
        clear_to_far_plane(&device, &fallback_shadowmap)?;

        let camera_stride = device.align_uniform(CameraUniform::SIZE as vk::DeviceSize);
        let lighting_offset = camera_stride * vk::DeviceSize::from(max_cameras);

        debug!(
            "Scene bindings: {} camera slots, {} byte stride, lighting at {}",
            max_cameras, camera_stride, lighting_offset
        );

        Ok(Self {
            frames: Vec::new(),
            fallback_shadowmap,
            sampler,
            layout,
            device,
            camera_stride,
            lighting_offset,
            max_cameras,
        })
    }

    /// Layout every mesh pipeline must declare at set 0.
    pub fn layout(&self) -> vk::DescriptorSetLayout {
        self.layout.handle()
    }

    fn buffer_size(&self) -> vk::DeviceSize {
        self.lighting_offset + LightingUniform::SIZE as vk::DeviceSize
    }

    fn frame_mut(&mut self, frame_index: usize) -> RenderResult<&mut FrameBindings> {
        while self.frames.len() <= frame_index {
            let buffer = Buffer::new(self.device.clone(), BufferUsage::Uniform, self.buffer_size())?;
            let pool = DescriptorPool::new(
                self.device.clone(),
                MAX_SHADOW_VIEWS_PER_FRAME,
                &[
                    vk::DescriptorPoolSize::default()
                        .ty(vk::DescriptorType::UNIFORM_BUFFER_DYNAMIC)
                        .descriptor_count(MAX_SHADOW_VIEWS_PER_FRAME),
                    vk::DescriptorPoolSize::default()
                        .ty(vk::DescriptorType::UNIFORM_BUFFER)
                        .descriptor_count(MAX_SHADOW_VIEWS_PER_FRAME),
                    vk::DescriptorPoolSize::default()
                        .ty(vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
                        .descriptor_count(MAX_SHADOW_VIEWS_PER_FRAME),
                ],
            )?;
            self.frames.push(FrameBindings {
                buffer,
                pool,
                sets: Vec::new(),
            });
        }
        self.frames
            .get_mut(frame_index)
            .ok_or(RenderError::MissingFrameContext(frame_index))
    }

    /// Drop the storage of frame slots past `count`. The device must be idle.
    pub fn truncate_frames(&mut self, count: usize) {
        self.frames.truncate(count);
    }

    /// Write the cameras and lighting of `scene` into frame `frame_index`'s
    /// buffer and forget the sets written for its previous frame.
    ///
    /// # Errors
    ///
    /// Fails if the scene has more cameras than the buffer holds or a write
    /// fails.
    pub fn upload(&mut self, frame_index: usize, scene: &RenderScene) -> RenderResult<()> {
        if scene.camera_count() > self.max_cameras as usize {
            return Err(RenderError::Backend(format!(
                "{} cameras do not fit {} uniform slots",
                scene.camera_count(),
                self.max_cameras
            )));
        }
        let camera_stride = self.camera_stride;
        let lighting_offset = self.lighting_offset;
        let frame = self.frame_mut(frame_index)?;

        frame.pool.reset()?;
        frame.sets.clear();

        for (slot, camera) in scene.cameras().iter().enumerate() {
            frame
                .buffer
                .write(slot as vk::DeviceSize * camera_stride, bytemuck::bytes_of(camera))?;
        }
        let lighting = LightingUniform::new(scene.lighting());
        frame
            .buffer
            .write(lighting_offset, bytemuck::bytes_of(&lighting))?;

        trace!(
            "Frame {}: uploaded {} cameras and {} lights",
            frame_index,
            scene.camera_count(),
            lighting.light_count
        );
        Ok(())
    }

    /// Dynamic offset selecting `camera_slot`, `None` past the last slot.
    pub fn camera_offset(&self, camera_slot: u32) -> Option<u32> {
        if camera_slot >= self.max_cameras {
            return None;
        }
        u32::try_from(vk::DeviceSize::from(camera_slot) * self.camera_stride).ok()
    }

    /// The set of frame `frame_index` that samples `shadow_view`, or the
    /// fallback map when `None`. Written on first use.
    ///
    /// # Errors
    ///
    /// Fails when the frame already bound [`MAX_SHADOW_VIEWS_PER_FRAME`]
    /// distinct shadow maps.
    pub fn descriptor_set(
        &mut self,
        frame_index: usize,
        shadow_view: Option<vk::ImageView>,
    ) -> RenderResult<vk::DescriptorSet> {
        let view = shadow_view.unwrap_or(self.fallback_shadowmap.image_view());
        let layout = self.layout.handle();
        let sampler = self.sampler.handle();
        let lighting_offset = self.lighting_offset;
        let device = self.device.clone();

        let frame = self.frame_mut(frame_index)?;
        if let Some(&(_, set)) = frame.sets.iter().find(|(cached, _)| *cached == view) {
            return Ok(set);
        }

        let set = frame.pool.allocate_one(layout)?;
        let cameras = [buffer_info(
            frame.buffer.handle(),
            0,
            CameraUniform::SIZE as vk::DeviceSize,
        )];
        let lighting = [buffer_info(
            frame.buffer.handle(),
            lighting_offset,
            LightingUniform::SIZE as vk::DeviceSize,
        )];
        let shadowmap = [image_info(
            sampler,
            view,
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        )];
        let writes = [
            vk::WriteDescriptorSet::default()
                .dst_set(set)
                .dst_binding(0)
                .descriptor_type(vk::DescriptorType::UNIFORM_BUFFER_DYNAMIC)
                .buffer_info(&cameras),
            vk::WriteDescriptorSet::default()
                .dst_set(set)
                .dst_binding(1)
                .descriptor_type(vk::DescriptorType::UNIFORM_BUFFER)
                .buffer_info(&lighting),
            vk::WriteDescriptorSet::default()
                .dst_set(set)
                .dst_binding(2)
                .descriptor_type(vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
                .image_info(&shadowmap),
        ];
        update_descriptor_sets(&device, &writes);

        frame.sets.push((view, set));
        Ok(set)
    }
}

/// Clear `target` to depth 1.0 and leave it ready for sampling.
fn clear_to_far_plane(device: &Arc<Device>, target: &RenderTarget) -> RenderResult<()> {
    let pool = CommandPool::new(device.clone(), device.queue_families().graphics)?;
    let commands = CommandBuffer::new(&pool)?;
    let fence = Fence::new(device.clone(), false)?;

    commands.begin()?;
    commands.transition_image(
        target.image(),
        vk::ImageLayout::UNDEFINED,
        vk::ImageLayout::DEPTH_ATTACHMENT_OPTIMAL,
        vk::ImageAspectFlags::DEPTH,
    );
    let depth_attachment = vk::RenderingAttachmentInfo::default()
        .image_view(target.image_view())
        .image_layout(vk::ImageLayout::DEPTH_ATTACHMENT_OPTIMAL)
        .load_op(vk::AttachmentLoadOp::CLEAR)
        .store_op(vk::AttachmentStoreOp::STORE)
        .clear_value(vk::ClearValue {
            depth_stencil: vk::ClearDepthStencilValue {
                depth: 1.0,
                stencil: 0,
            },
        });
    let rendering_info = vk::RenderingInfo::default()
        .render_area(vk::Rect2D {
            offset: vk::Offset2D { x: 0, y: 0 },
            extent: target.extent(),
        })
        .layer_count(1)
        .depth_attachment(&depth_attachment);
    commands.begin_rendering(&rendering_info);
    commands.end_rendering();
    commands.transition_image(
        target.image(),
        vk::ImageLayout::DEPTH_ATTACHMENT_OPTIMAL,
        vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        vk::ImageAspectFlags::DEPTH,
    );
    commands.end()?;

    let command_buffers = [commands.handle()];
    let submit_info = vk::SubmitInfo::default().command_buffers(&command_buffers);
    device.submit_graphics(&submit_info, fence.handle())?;
    fence.wait(u64::MAX)?;
    target.set_layout(vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL);
    Ok(())
}
