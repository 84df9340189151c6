//! [`CommandRecorder`] over a Vulkan command buffer.

use ash::vk;
use forge_resources::{ResourceId, ResourceTable};
use forge_rhi::{
    Buffer, BufferUsage, CommandBuffer, PUSH_CONSTANT_STAGES, Pipeline, RenderTarget, TargetKind,
};
use tracing::{error, warn};

use super::scene_bindings::SceneBindings;
use crate::backend::{
    CommandRecorder, Extent2D, ImageLayout, ImageTarget, LoadOp, RenderingDesc,
};
use crate::ubo::{DrawConstants, MaterialUniform, ObjectUniform};

pub fn to_vk_layout(layout: ImageLayout) -> vk::ImageLayout {
    match layout {
        ImageLayout::Undefined => vk::ImageLayout::UNDEFINED,
        ImageLayout::ColorAttachment => vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
        ImageLayout::DepthAttachment => vk::ImageLayout::DEPTH_ATTACHMENT_OPTIMAL,
        ImageLayout::ShaderReadOnly => vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        ImageLayout::Present => vk::ImageLayout::PRESENT_SRC_KHR,
    }
}

pub fn to_vk_extent(extent: Extent2D) -> vk::Extent2D {
    vk::Extent2D {
        width: extent.width,
        height: extent.height,
    }
}

pub fn from_vk_extent(extent: vk::Extent2D) -> Extent2D {
    Extent2D::new(extent.width, extent.height)
}

fn to_vk_load_op(load_op: LoadOp) -> vk::AttachmentLoadOp {
    match load_op {
        LoadOp::Clear => vk::AttachmentLoadOp::CLEAR,
        LoadOp::Load => vk::AttachmentLoadOp::LOAD,
    }
}

/// The swapchain image a recording renders to.
#[derive(Clone, Copy, Debug)]
pub struct Backbuffer {
    pub image: vk::Image,
    pub view: vk::ImageView,
    pub extent: vk::Extent2D,
}

pub struct VulkanRecorder<'a> {
    command_buffer: &'a CommandBuffer,
    resources: &'a ResourceTable,
    backbuffer: Backbuffer,
    /// Tracked layout of the backbuffer, shared with the backend across frames.
    backbuffer_layout: &'a mut vk::ImageLayout,
    scene_bindings: &'a mut SceneBindings,
    frame_index: usize,
    pipeline_layout: Option<vk::PipelineLayout>,
}

impl<'a> VulkanRecorder<'a> {
    pub fn new(
        command_buffer: &'a CommandBuffer,
        resources: &'a ResourceTable,
        backbuffer: Backbuffer,
        backbuffer_layout: &'a mut vk::ImageLayout,
        scene_bindings: &'a mut SceneBindings,
        frame_index: usize,
    ) -> Self {
        Self {
            command_buffer,
            resources,
            backbuffer,
            backbuffer_layout,
            scene_bindings,
            frame_index,
            pipeline_layout: None,
        }
    }

    fn render_target(&self, id: ResourceId, kind: TargetKind) -> Option<&'a RenderTarget> {
        self.resources
            .get::<RenderTarget>(id)
            .filter(|target| target.kind() == kind)
    }

    fn color_view(&self, target: ImageTarget) -> Option<vk::ImageView> {
        match target {
            ImageTarget::Backbuffer => Some(self.backbuffer.view),
            ImageTarget::Resource(id) => self
                .render_target(id, TargetKind::Color)
                .map(RenderTarget::image_view),
        }
    }

    fn buffer(&self, id: ResourceId, usage: BufferUsage) -> Option<&'a Buffer> {
        self.resources
            .get::<Buffer>(id)
            .filter(|buffer| buffer.usage() == usage)
    }
}

impl CommandRecorder for VulkanRecorder<'_> {
    fn target_extent(&self, target: ImageTarget) -> Option<Extent2D> {
        match target {
            ImageTarget::Backbuffer => Some(from_vk_extent(self.backbuffer.extent)),
            ImageTarget::Resource(id) => self
                .resources
                .get::<RenderTarget>(id)
                .map(|target| from_vk_extent(target.extent())),
        }
    }

    fn transition(&mut self, target: ImageTarget, layout: ImageLayout) -> bool {
        let new_layout = to_vk_layout(layout);
        match target {
            ImageTarget::Backbuffer => {
                let old_layout = *self.backbuffer_layout;
                if old_layout != new_layout {
                    self.command_buffer.transition_image(
                        self.backbuffer.image,
                        old_layout,
                        new_layout,
                        vk::ImageAspectFlags::COLOR,
                    );
                    *self.backbuffer_layout = new_layout;
                }
                true
            }
            ImageTarget::Resource(id) => {
                let Some(render_target) = self.resources.get::<RenderTarget>(id) else {
                    return false;
                };
                let old_layout = render_target.layout();
                if old_layout != new_layout {
                    self.command_buffer.transition_image(
                        render_target.image(),
                        old_layout,
                        new_layout,
                        render_target.kind().aspect(),
                    );
                    render_target.set_layout(new_layout);
                }
                true
            }
        }
    }

    fn begin_rendering(&mut self, desc: &RenderingDesc) -> bool {
        let color_view = match desc.color {
            None => None,
            Some(target) => match self.color_view(target) {
                Some(view) => Some(view),
                None => return false,
            },
        };
        let depth_view = match desc.depth {
            None => None,
            Some(ImageTarget::Resource(id)) => match self.render_target(id, TargetKind::Depth) {
                Some(target) => Some(target.image_view()),
                None => return false,
            },
            Some(ImageTarget::Backbuffer) => return false,
        };
        if color_view.is_none() && depth_view.is_none() {
            return false;
        }

        let color_attachments: Vec<vk::RenderingAttachmentInfo> = color_view
            .map(|view| {
                vk::RenderingAttachmentInfo::default()
                    .image_view(view)
                    .image_layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)
                    .load_op(to_vk_load_op(desc.load_op))
                    .store_op(vk::AttachmentStoreOp::STORE)
                    .clear_value(vk::ClearValue {
                        color: vk::ClearColorValue {
                            float32: desc.clear.color,
                        },
                    })
            })
            .into_iter()
            .collect();

        let depth_attachment = depth_view.map(|view| {
            vk::RenderingAttachmentInfo::default()
                .image_view(view)
                .image_layout(vk::ImageLayout::DEPTH_ATTACHMENT_OPTIMAL)
                .load_op(to_vk_load_op(desc.load_op))
                .store_op(vk::AttachmentStoreOp::STORE)
                .clear_value(vk::ClearValue {
                    depth_stencil: vk::ClearDepthStencilValue {
                        depth: desc.clear.depth,
                        stencil: 0,
                    },
                })
        });

        let mut rendering_info = vk::RenderingInfo::default()
            .render_area(vk::Rect2D {
                offset: vk::Offset2D { x: 0, y: 0 },
                extent: to_vk_extent(desc.extent),
            })
            .layer_count(1)
            .color_attachments(&color_attachments);
        if let Some(depth) = depth_attachment.as_ref() {
            rendering_info = rendering_info.depth_attachment(depth);
        }

        self.command_buffer.begin_rendering(&rendering_info);
        true
    }

    fn end_rendering(&mut self) {
        self.command_buffer.end_rendering();
    }

    fn set_viewport_and_scissor(&mut self, extent: Extent2D) {
        self.command_buffer
            .set_viewport_and_scissor(to_vk_extent(extent));
    }

    fn bind_pipeline(&mut self, pipeline: ResourceId) -> bool {
        let Some(pipeline) = self.resources.get::<Pipeline>(pipeline) else {
            return false;
        };
        self.command_buffer.bind_graphics_pipeline(pipeline.handle());
        self.pipeline_layout = Some(pipeline.layout());
        true
    }

    fn bind_vertex_buffer(&mut self, buffer: ResourceId) -> bool {
        let Some(buffer) = self.buffer(buffer, BufferUsage::Vertex) else {
            return false;
        };
        self.command_buffer.bind_vertex_buffer(buffer.handle());
        true
    }

    fn bind_index_buffer(&mut self, buffer: ResourceId) -> bool {
        let Some(buffer) = self.buffer(buffer, BufferUsage::Index) else {
            return false;
        };
        self.command_buffer
            .bind_index_buffer(buffer.handle(), vk::IndexType::UINT32);
        true
    }

    fn bind_scene_uniforms(&mut self, camera_slot: u32, shadowmap: Option<ResourceId>) -> bool {
        let Some(layout) = self.pipeline_layout else {
            warn!("Scene uniforms bound before any pipeline, ignoring");
            return false;
        };
        let shadow_view = match shadowmap {
            None => None,
            Some(id) => match self.render_target(id, TargetKind::Depth) {
                Some(target) => Some(target.image_view()),
                None => return false,
            },
        };
        let Some(offset) = self.scene_bindings.camera_offset(camera_slot) else {
            warn!("Camera slot {} is out of range", camera_slot);
            return false;
        };
        let set = match self
            .scene_bindings
            .descriptor_set(self.frame_index, shadow_view)
        {
            Ok(set) => set,
            Err(e) => {
                error!("Failed to prepare scene descriptor set: {}", e);
                return false;
            }
        };
        self.command_buffer.bind_descriptor_set(layout, set, &[offset]);
        true
    }

    fn push_uniforms(&mut self, object: &ObjectUniform, material: &MaterialUniform) {
        let Some(layout) = self.pipeline_layout else {
            warn!("Uniforms pushed before any pipeline was bound, ignoring");
            return;
        };
        self.command_buffer.push_constants(
            layout,
            PUSH_CONSTANT_STAGES,
            0,
            &DrawConstants::new(object, material),
        );
    }

    fn draw_indexed(&mut self, index_count: u32) {
        self.command_buffer.draw_indexed(index_count);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout_mapping() {
        assert_eq!(
            to_vk_layout(ImageLayout::Present),
            vk::ImageLayout::PRESENT_SRC_KHR
        );
        assert_eq!(
            to_vk_layout(ImageLayout::DepthAttachment),
            vk::ImageLayout::DEPTH_ATTACHMENT_OPTIMAL
        );
        assert_eq!(to_vk_layout(ImageLayout::default()), vk::ImageLayout::UNDEFINED);
    }

    #[test]
    fn test_extent_conversion() {
        let extent = Extent2D::new(640, 480);
        assert_eq!(from_vk_extent(to_vk_extent(extent)), extent);
        assert_eq!(to_vk_load_op(LoadOp::Load), vk::AttachmentLoadOp::LOAD);
    }
}
