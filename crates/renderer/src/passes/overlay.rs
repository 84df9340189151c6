use crate::backend::{CommandRecorder, ImageLayout, LoadOp};
use crate::error::RenderResult;
use crate::render_pass::{PassTargets, RenderPass, RenderPassParams, RenderingData};

/// Draw callback run inside the overlay's rendering scope.
pub type OverlayFn = Box<dyn FnMut(&mut dyn CommandRecorder, &RenderingData<'_>)>;

/// Draws on top of whatever is already in the frame target and leaves it ready
/// to present. UI layers hook in through the callback.
pub struct OverlayPass {
    targets: PassTargets,
    draw: Option<OverlayFn>,
    active: bool,
}

impl OverlayPass {
    pub fn new() -> Self {
        Self {
            targets: PassTargets {
                end_layout: ImageLayout::Present,
                ..PassTargets::default()
            },
            draw: None,
            active: false,
        }
    }

    pub fn with_callback(mut self, draw: OverlayFn) -> Self {
        self.draw = Some(draw);
        self
    }

    pub fn with_end_layout(mut self, layout: ImageLayout) -> Self {
        self.targets.end_layout = layout;
        self
    }

    pub fn targets(&self) -> &PassTargets {
        &self.targets
    }
}

impl Default for OverlayPass {
    fn default() -> Self {
        Self::new()
    }
}

impl RenderPass for OverlayPass {
    fn name(&self) -> &str {
        "Overlay"
    }

    fn begin_pass(&mut self, params: &mut RenderPassParams<'_>) -> RenderResult<()> {
        self.active = self.targets.begin(self.name(), params, LoadOp::Load);
        Ok(())
    }

    fn execute(&mut self, params: &mut RenderPassParams<'_>) -> RenderResult<()> {
        if self.active
            && let Some(draw) = self.draw.as_mut()
        {
            draw(&mut *params.commands, params.rendering_data);
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
