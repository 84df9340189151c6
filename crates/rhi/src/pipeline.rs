//! Graphics pipelines for dynamic rendering.
//!
//! Every mesh pipeline shares one layout shape: the scene descriptor set
//! (camera, lighting and shadow map) at set 0, plus a push constant block with
//! the object's world matrix and material parameters.

use std::sync::Arc;

use ash::vk;
use forge_resources::Resource;
use tracing::{debug, info};

use crate::device::Device;
use crate::error::{RhiError, RhiResult};
use crate::shader::Shader;
use crate::vertex::Vertex;

/// Size in bytes of the push constant block: world matrix, base color, then
/// metallic and roughness padded to 16 bytes.
pub const PUSH_CONSTANT_SIZE: u32 = 96;

/// Shader stages that read the push constant block.
pub const PUSH_CONSTANT_STAGES: vk::ShaderStageFlags =
    vk::ShaderStageFlags::from_raw(vk::ShaderStageFlags::VERTEX.as_raw() | vk::ShaderStageFlags::FRAGMENT.as_raw());

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum CullMode {
    None,
    Front,
    #[default]
    Back,
}

impl CullMode {
    pub fn to_vk(self) -> vk::CullModeFlags {
        match self {
            CullMode::None => vk::CullModeFlags::NONE,
            CullMode::Front => vk::CullModeFlags::FRONT,
            CullMode::Back => vk::CullModeFlags::BACK,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum CompareOp {
    #[default]
    Less,
    LessOrEqual,
    Always,
}

impl CompareOp {
    pub fn to_vk(self) -> vk::CompareOp {
        match self {
            CompareOp::Less => vk::CompareOp::LESS,
            CompareOp::LessOrEqual => vk::CompareOp::LESS_OR_EQUAL,
            CompareOp::Always => vk::CompareOp::ALWAYS,
        }
    }
}

/// Fixed-function state and attachment formats of a mesh pipeline.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GraphicsPipelineDesc {
    /// `None` renders depth only, with no color attachment.
    pub color_format: Option<vk::Format>,
    /// `None` disables depth testing and writing.
    pub depth_format: Option<vk::Format>,
    pub cull_mode: CullMode,
    pub depth_compare: CompareOp,
    pub alpha_blend: bool,
    /// Slope-scaled depth bias, for shadow casters.
    pub depth_bias: bool,
}

impl GraphicsPipelineDesc {
    pub fn new(color_format: vk::Format) -> Self {
        Self {
            color_format: Some(color_format),
            depth_format: None,
            cull_mode: CullMode::Back,
            depth_compare: CompareOp::Less,
            alpha_blend: false,
            depth_bias: false,
        }
    }

    /// Depth-only shadow caster: no color attachment, depth bias enabled.
    pub fn depth_only(depth_format: vk::Format) -> Self {
        Self {
            color_format: None,
            depth_format: Some(depth_format),
            cull_mode: CullMode::Back,
            depth_compare: CompareOp::LessOrEqual,
            alpha_blend: false,
            depth_bias: true,
        }
    }

    pub fn with_depth(mut self, format: vk::Format) -> Self {
        self.depth_format = Some(format);
        self
    }

    pub fn with_cull_mode(mut self, cull_mode: CullMode) -> Self {
        self.cull_mode = cull_mode;
        self
    }

    pub fn with_alpha_blend(mut self) -> Self {
        self.alpha_blend = true;
        self
    }

    fn blend_attachment(&self) -> vk::PipelineColorBlendAttachmentState {
        let state = vk::PipelineColorBlendAttachmentState::default()
            .color_write_mask(vk::ColorComponentFlags::RGBA);
        if !self.alpha_blend {
            return state;
        }
        state
            .blend_enable(true)
            .src_color_blend_factor(vk::BlendFactor::SRC_ALPHA)
            .dst_color_blend_factor(vk::BlendFactor::ONE_MINUS_SRC_ALPHA)
            .color_blend_op(vk::BlendOp::ADD)
            .src_alpha_blend_factor(vk::BlendFactor::ONE)
            .dst_alpha_blend_factor(vk::BlendFactor::ZERO)
            .alpha_blend_op(vk::BlendOp::ADD)
    }
}

/// The push constant range every mesh pipeline declares.
pub fn push_constant_range() -> vk::PushConstantRange {
    vk::PushConstantRange::default()
        .stage_flags(PUSH_CONSTANT_STAGES)
        .offset(0)
        .size(PUSH_CONSTANT_SIZE)
}

/// A graphics pipeline together with the layout it was built against.
pub struct Pipeline {
    device: Arc<Device>,
    pipeline: vk::Pipeline,
    layout: vk::PipelineLayout,
    desc: GraphicsPipelineDesc,
}

impl Pipeline {
    /// `set_layouts` are bound in order starting at set 0.
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::Pipeline`] for a non-vertex/fragment shader pair or a
    /// desc with neither attachment, and a Vulkan error if layout or pipeline
    /// creation fails.
    pub fn new(
        device: Arc<Device>,
        vertex_shader: &Shader,
        fragment_shader: &Shader,
        set_layouts: &[vk::DescriptorSetLayout],
        desc: GraphicsPipelineDesc,
    ) -> RhiResult<Self> {
        if vertex_shader.stage() != crate::shader::ShaderStage::Vertex
            || fragment_shader.stage() != crate::shader::ShaderStage::Fragment
        {
            return Err(RhiError::Pipeline(
                "expected a vertex shader followed by a fragment shader".to_string(),
            ));
        }

        if desc.color_format.is_none() && desc.depth_format.is_none() {
            return Err(RhiError::Pipeline(
                "pipeline needs a color or a depth attachment".to_string(),
            ));
        }

        let ranges = [push_constant_range()];
        let layout_info = vk::PipelineLayoutCreateInfo::default()
            .set_layouts(set_layouts)
            .push_constant_ranges(&ranges);
        let layout = unsafe { device.handle().create_pipeline_layout(&layout_info, None)? };

        match Self::create_pipeline(&device, layout, vertex_shader, fragment_shader, &desc) {
            Ok(pipeline) => {
                info!(
                    "Graphics pipeline created (color {:?}, depth {:?})",
                    desc.color_format, desc.depth_format
                );
                Ok(Self {
                    device,
                    pipeline,
                    layout,
                    desc,
                })
            }
            Err(e) => {
                unsafe { device.handle().destroy_pipeline_layout(layout, None) };
                Err(e)
            }
        }
    }

    fn create_pipeline(
        device: &Device,
        layout: vk::PipelineLayout,
        vertex_shader: &Shader,
        fragment_shader: &Shader,
        desc: &GraphicsPipelineDesc,
    ) -> RhiResult<vk::Pipeline> {
        let shader_stages = [
            vertex_shader.stage_create_info(),
            fragment_shader.stage_create_info(),
        ];

        let bindings = [Vertex::binding_description()];
        let attributes = Vertex::attribute_descriptions();
        let vertex_input_state = vk::PipelineVertexInputStateCreateInfo::default()
            .vertex_binding_descriptions(&bindings)
            .vertex_attribute_descriptions(&attributes);

        let input_assembly_state = vk::PipelineInputAssemblyStateCreateInfo::default()
            .topology(vk::PrimitiveTopology::TRIANGLE_LIST);

        // Viewport and scissor are dynamic.
        let viewport_state = vk::PipelineViewportStateCreateInfo::default()
            .viewport_count(1)
            .scissor_count(1);

        let rasterization_state = vk::PipelineRasterizationStateCreateInfo::default()
            .polygon_mode(vk::PolygonMode::FILL)
            .line_width(1.0)
            .cull_mode(desc.cull_mode.to_vk())
            .front_face(vk::FrontFace::COUNTER_CLOCKWISE)
            .depth_bias_enable(desc.depth_bias)
            .depth_bias_constant_factor(1.25)
            .depth_bias_slope_factor(1.75);

        let multisample_state = vk::PipelineMultisampleStateCreateInfo::default()
            .rasterization_samples(vk::SampleCountFlags::TYPE_1);

        let has_depth = desc.depth_format.is_some();
        let depth_stencil_state = vk::PipelineDepthStencilStateCreateInfo::default()
            .depth_test_enable(has_depth)
            .depth_write_enable(has_depth)
            .depth_compare_op(desc.depth_compare.to_vk())
            .max_depth_bounds(1.0);

        let blend_attachments = [desc.blend_attachment()];
        let blend_attachments = if desc.color_format.is_some() {
            &blend_attachments[..]
        } else {
            &[][..]
        };
        let color_blend_state =
            vk::PipelineColorBlendStateCreateInfo::default().attachments(blend_attachments);

        let dynamic_states = [vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR];
        let dynamic_state =
            vk::PipelineDynamicStateCreateInfo::default().dynamic_states(&dynamic_states);

        let color_formats: Vec<vk::Format> = desc.color_format.into_iter().collect();
        let mut rendering_info =
            vk::PipelineRenderingCreateInfo::default().color_attachment_formats(&color_formats);
        if let Some(depth_format) = desc.depth_format {
            rendering_info = rendering_info.depth_attachment_format(depth_format);
        }

        let pipeline_info = vk::GraphicsPipelineCreateInfo::default()
            .stages(&shader_stages)
            .vertex_input_state(&vertex_input_state)
            .input_assembly_state(&input_assembly_state)
            .viewport_state(&viewport_state)
            .rasterization_state(&rasterization_state)
            .multisample_state(&multisample_state)
            .depth_stencil_state(&depth_stencil_state)
            .color_blend_state(&color_blend_state)
            .dynamic_state(&dynamic_state)
            .layout(layout)
            .push_next(&mut rendering_info);

        let pipelines = unsafe {
            device
                .handle()
                .create_graphics_pipelines(vk::PipelineCache::null(), &[pipeline_info], None)
                .map_err(|(_, result)| result)?
        };
        pipelines
            .into_iter()
            .next()
            .ok_or_else(|| RhiError::Pipeline("driver returned no pipeline".to_string()))
    }

    #[inline]
    pub fn handle(&self) -> vk::Pipeline {
        self.pipeline
    }

    #[inline]
    pub fn layout(&self) -> vk::PipelineLayout {
        self.layout
    }

    #[inline]
    pub fn desc(&self) -> &GraphicsPipelineDesc {
        &self.desc
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        unsafe {
            self.device.handle().destroy_pipeline(self.pipeline, None);
            self.device
                .handle()
                .destroy_pipeline_layout(self.layout, None);
        }
        debug!("Graphics pipeline destroyed");
    }
}

impl Resource for Pipeline {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_constants_hold_world_and_material() {
        assert_eq!(
            PUSH_CONSTANT_SIZE as usize,
            std::mem::size_of::<glam::Mat4>() + 2 * std::mem::size_of::<glam::Vec4>()
        );
        let range = push_constant_range();
        assert!(range.stage_flags.contains(vk::ShaderStageFlags::VERTEX));
        assert!(range.stage_flags.contains(vk::ShaderStageFlags::FRAGMENT));
        assert_eq!(range.offset, 0);
    }

    #[test]
    fn test_depth_only_desc() {
        let desc = GraphicsPipelineDesc::depth_only(vk::Format::D32_SFLOAT);
        assert_eq!(desc.color_format, None);
        assert_eq!(desc.depth_format, Some(vk::Format::D32_SFLOAT));
        assert!(desc.depth_bias);
        assert_eq!(desc.depth_compare.to_vk(), vk::CompareOp::LESS_OR_EQUAL);
    }

    #[test]
    fn test_desc_defaults() {
        let desc = GraphicsPipelineDesc::new(vk::Format::B8G8R8A8_SRGB);
        assert_eq!(desc.color_format, Some(vk::Format::B8G8R8A8_SRGB));
        assert_eq!(desc.depth_format, None);
        assert!(!desc.depth_bias);
        assert_eq!(desc.cull_mode, CullMode::Back);
        assert_eq!(desc.depth_compare.to_vk(), vk::CompareOp::LESS);
        assert_eq!(desc.blend_attachment().blend_enable, vk::FALSE);
    }

    #[test]
    fn test_alpha_blend_attachment() {
        let desc = GraphicsPipelineDesc::new(vk::Format::B8G8R8A8_SRGB)
            .with_depth(vk::Format::D32_SFLOAT)
            .with_alpha_blend();
        let blend = desc.blend_attachment();
        assert_eq!(blend.blend_enable, vk::TRUE);
        assert_eq!(blend.src_color_blend_factor, vk::BlendFactor::SRC_ALPHA);
        assert_eq!(desc.depth_format, Some(vk::Format::D32_SFLOAT));
    }

    #[test]
    fn test_cull_mode_to_vk() {
        assert_eq!(CullMode::None.to_vk(), vk::CullModeFlags::NONE);
        assert_eq!(CullMode::Front.to_vk(), vk::CullModeFlags::FRONT);
    }
}
