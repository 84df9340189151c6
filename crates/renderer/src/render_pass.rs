//! The Begin/Execute/End protocol every rendering stage implements.
//!
//! A pass only knows its own attachments and the layouts it needs on entry
//! and leaves behind on exit. Passes compose by agreeing on those layouts; the
//! frame pipeline just calls them in registration order.

use forge_resources::{ResourceId, ResourceTable};
use tracing::error;

use crate::backend::{
    ClearValue, CommandRecorder, Extent2D, ImageLayout, ImageTarget, LoadOp, RenderingDesc,
};
use crate::error::RenderResult;
use crate::render_scene::RenderScene;

/// Frame-wide data shared by every pass.
pub struct RenderingData<'a> {
    pub render_scene: &'a RenderScene,
    /// Size of the swapchain images.
    pub extent: Extent2D,
    pub frame_index: usize,
}

/// Arguments to each protocol call.
pub struct RenderPassParams<'a> {
    /// Table id of the command buffer being recorded.
    pub command_buffer: ResourceId,
    pub rendering_data: &'a RenderingData<'a>,
    pub commands: &'a mut dyn CommandRecorder,
    pub resources: &'a ResourceTable,
    /// Image presented at the end of the frame.
    pub frame_target: ImageTarget,
    /// Shadow map published by an earlier pass of this frame, already in
    /// [`ImageLayout::ShaderReadOnly`]. Reset to `None` at the start of every
    /// frame.
    pub shadowmap: Option<ResourceId>,
}

pub trait RenderPass {
    fn name(&self) -> &str;

    /// Bind attachments, clear and move images into the layouts this pass needs.
    fn begin_pass(&mut self, params: &mut RenderPassParams<'_>) -> RenderResult<()>;

    /// Issue the pass's draws.
    fn execute(&mut self, params: &mut RenderPassParams<'_>) -> RenderResult<()>;

    /// End rendering and leave the targets in the layout the next consumer expects.
    fn end_pass(&mut self, params: &mut RenderPassParams<'_>) -> RenderResult<()>;
}

/// Run the three protocol calls of `pass` in order.
pub fn run_pass(pass: &mut dyn RenderPass, params: &mut RenderPassParams<'_>) -> RenderResult<()> {
    pass.begin_pass(params)?;
    pass.execute(params)?;
    pass.end_pass(params)
}

/// Attachments and layout contract shared by the concrete passes.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PassTargets {
    /// `None` renders into the frame target.
    pub color: Option<ImageTarget>,
    pub depth: Option<ImageTarget>,
    pub clear_value: ClearValue,
    /// Layout the color target, or the depth target of a depth-only pass, is
    /// moved into before rendering.
    pub begin_layout: ImageLayout,
    /// Layout that target is left in after rendering.
    pub end_layout: ImageLayout,
    /// Render into `depth` alone, with no color attachment.
    pub depth_only: bool,
}

impl Default for PassTargets {
    fn default() -> Self {
        Self {
            color: None,
            depth: None,
            clear_value: ClearValue::default(),
            begin_layout: ImageLayout::ColorAttachment,
            end_layout: ImageLayout::ColorAttachment,
            depth_only: false,
        }
    }
}

impl PassTargets {
    /// Depth-only targets whose image is sampled afterwards, as a shadow map is.
    pub fn depth_only(depth: ImageTarget) -> Self {
        Self {
            color: None,
            depth: Some(depth),
            clear_value: ClearValue::default(),
            begin_layout: ImageLayout::DepthAttachment,
            end_layout: ImageLayout::ShaderReadOnly,
            depth_only: true,
        }
    }

    pub fn color_target(&self, params: &RenderPassParams<'_>) -> ImageTarget {
        self.color.unwrap_or(params.frame_target)
    }

    /// The image `begin_layout` and `end_layout` apply to.
    fn layout_target(&self, params: &RenderPassParams<'_>) -> Option<ImageTarget> {
        if self.depth_only {
            self.depth
        } else {
            Some(self.color_target(params))
        }
    }

    /// Transition the attachments and begin rendering into them.
    ///
    /// Returns `false` after logging when a target cannot be resolved; nothing
    /// is recorded in that case.
    pub fn begin(&self, pass_name: &str, params: &mut RenderPassParams<'_>, load_op: LoadOp) -> bool {
        let Some(target) = self.layout_target(params) else {
            error!("{}: depth-only pass without a depth target", pass_name);
            return false;
        };
        let Some(extent) = params.commands.target_extent(target) else {
            error!("{}: invalid target {:?}", pass_name, target);
            return false;
        };
        if !self.depth_only
            && let Some(depth) = self.depth
            && params.commands.target_extent(depth).is_none()
        {
            error!("{}: invalid depth target {:?}", pass_name, depth);
            return false;
        }

        params.commands.transition(target, self.begin_layout);
        let color = if self.depth_only {
            None
        } else {
            if let Some(depth) = self.depth {
                params.commands.transition(depth, ImageLayout::DepthAttachment);
            }
            Some(target)
        };

        let desc = RenderingDesc {
            color,
            depth: self.depth,
            load_op,
            clear: self.clear_value,
            extent,
        };
        if !params.commands.begin_rendering(&desc) {
            error!("{}: failed to begin rendering", pass_name);
            return false;
        }
        params.commands.set_viewport_and_scissor(extent);
        true
    }

    /// End rendering and move the target into `end_layout`.
    pub fn end(&self, params: &mut RenderPassParams<'_>) {
        params.commands.end_rendering();
        if let Some(target) = self.layout_target(params) {
            params.commands.transition(target, self.end_layout);
        }
    }
}
