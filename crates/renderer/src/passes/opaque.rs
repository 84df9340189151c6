use forge_resources::ResourceId;
use tracing::{debug, warn};

use crate::backend::{ImageTarget, LoadOp};
use crate::error::RenderResult;
use crate::render_pass::{PassTargets, RenderPass, RenderPassParams};

/// Clears its target and draws every set pass of the render scene with the
/// main camera, lit by the frame's lights and shadowed by the shadow map an
/// earlier pass published.
pub struct OpaquePass {
    targets: PassTargets,
    active: bool,
    last_draw_count: usize,
}

impl OpaquePass {
    pub fn new(targets: PassTargets) -> Self {
        Self {
            targets,
            active: false,
            last_draw_count: 0,
        }
    }

    /// Render into `color` instead of the frame target.
    pub fn with_color_target(mut self, color: ResourceId) -> Self {
        self.targets.color = Some(ImageTarget::Resource(color));
        self
    }

    pub fn with_depth_target(mut self, depth: ResourceId) -> Self {
        self.targets.depth = Some(ImageTarget::Resource(depth));
        self
    }

    pub fn with_clear_color(mut self, color: [f32; 4]) -> Self {
        self.targets.clear_value.color = color;
        self
    }

    pub fn targets(&self) -> &PassTargets {
        &self.targets
    }

    pub fn targets_mut(&mut self) -> &mut PassTargets {
        &mut self.targets
    }

    /// Draws issued by the last `execute`.
    pub fn last_draw_count(&self) -> usize {
        self.last_draw_count
    }
}

impl Default for OpaquePass {
    fn default() -> Self {
        Self::new(PassTargets::default())
    }
}

impl RenderPass for OpaquePass {
    fn name(&self) -> &str {
        "Opaque"
    }

    fn begin_pass(&mut self, params: &mut RenderPassParams<'_>) -> RenderResult<()> {
        self.active = self.targets.begin(self.name(), params, LoadOp::Clear);
        Ok(())
    }

    fn execute(&mut self, params: &mut RenderPassParams<'_>) -> RenderResult<()> {
        self.last_draw_count = 0;
        if !self.active {
            return Ok(());
        }

        let render_scene = params.rendering_data.render_scene;
        let Some(camera_slot) = render_scene.main_camera_slot() else {
            debug!("Opaque pass: no main camera, nothing to draw");
            return Ok(());
        };

        for set_pass in render_scene.set_passes() {
            if !params.commands.bind_pipeline(set_pass.pipeline) {
                warn!(
                    "Opaque pass: pipeline {} of material {} is not live, skipping",
                    set_pass.pipeline, set_pass.material
                );
                continue;
            }
            if !params
                .commands
                .bind_scene_uniforms(camera_slot, params.shadowmap)
            {
                warn!(
                    "Opaque pass: shadow map {:?} is not live, skipping material {}",
                    params.shadowmap, set_pass.material
                );
                continue;
            }

            for drawcall in &set_pass.drawcalls {
                let Some(object) = render_scene.object(drawcall.uniform_slot) else {
                    continue;
                };
                if !params.commands.bind_vertex_buffer(drawcall.vertex_buffer)
                    || !params.commands.bind_index_buffer(drawcall.index_buffer)
                {
                    warn!(
                        "Opaque pass: buffers {} / {} are not live, skipping draw",
                        drawcall.vertex_buffer, drawcall.index_buffer
                    );
                    continue;
                }

                params.commands.push_uniforms(object, &set_pass.surface);
                params.commands.draw_indexed(drawcall.index_count);
                self.last_draw_count += 1;
            }
        }
        Ok(())
    }

    fn end_pass(&mut self, params: &mut RenderPassParams<'_>) -> RenderResult<()> {
        if self.active {
            self.targets.end(params);
            self.active = false;
        }
        Ok(())
    }
}
