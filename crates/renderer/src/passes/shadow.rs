use forge_resources::ResourceId;
use tracing::{debug, warn};

use crate::backend::{ImageTarget, LoadOp};
use crate::error::RenderResult;
use crate::render_pass::{PassTargets, RenderPass, RenderPassParams};

/// Renders every draw call depth-only from the directional light into a shadow
/// map, then hands the map to later passes through
/// [`RenderPassParams::shadowmap`].
///
/// The map is cleared every frame, so with no directional light it reads as
/// fully lit.
pub struct ShadowPass {
    targets: PassTargets,
    shadowmap: ResourceId,
    pipeline: ResourceId,
    active: bool,
    last_draw_count: usize,
}

impl ShadowPass {
    /// `shadowmap` is a depth render target; `pipeline` a depth-only pipeline
    /// whose vertex shader transforms by the light view-projection.
    pub fn new(shadowmap: ResourceId, pipeline: ResourceId) -> Self {
        Self {
            targets: PassTargets::depth_only(ImageTarget::Resource(shadowmap)),
            shadowmap,
            pipeline,
            active: false,
            last_draw_count: 0,
        }
    }

    pub fn shadowmap(&self) -> ResourceId {
        self.shadowmap
    }

    pub fn targets(&self) -> &PassTargets {
        &self.targets
    }

    /// Draws issued by the last `execute`.
    pub fn last_draw_count(&self) -> usize {
        self.last_draw_count
    }
}

impl RenderPass for ShadowPass {
    fn name(&self) -> &str {
        "Shadow"
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
        if render_scene.lighting().light_view_projection.is_none() {
            debug!("Shadow pass: no directional light, map stays clear");
            return Ok(());
        }
        if !params.commands.bind_pipeline(self.pipeline) {
            warn!("Shadow pass: pipeline {} is not live", self.pipeline);
            return Ok(());
        }
        let camera_slot = render_scene.main_camera_slot().unwrap_or(0);
        if !params.commands.bind_scene_uniforms(camera_slot, None) {
            return Ok(());
        }

        for set_pass in render_scene.set_passes() {
            for drawcall in &set_pass.drawcalls {
                let Some(object) = render_scene.object(drawcall.uniform_slot) else {
                    continue;
                };
                if !params.commands.bind_vertex_buffer(drawcall.vertex_buffer)
                    || !params.commands.bind_index_buffer(drawcall.index_buffer)
                {
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
            params.shadowmap = Some(self.shadowmap);
            self.active = false;
        }
        Ok(())
    }
}
