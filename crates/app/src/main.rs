//! Forge demo: a lit, shadowed, spinning cube driven through the multi-frame
//! pipeline.
//!
//! Usage: `forge [config.toml]`. Without an argument `forge.toml` in the
//! working directory is used when present, defaults otherwise.

mod demo;

use std::path::PathBuf;

use anyhow::Result;
use tracing::{debug, error, info, warn};
use winit::application::ApplicationHandler;
use winit::event::WindowEvent;
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::keyboard::{KeyCode, PhysicalKey};
use winit::window::WindowId;

use forge_core::{RendererConfig, Timer};
use forge_platform::Window;
use forge_renderer::{FrameOutcome, FramePipeline, GpuBackend, OpaquePass, OverlayPass, VulkanBackend};
use forge_resources::{ResourceId, ResourceTable};

use crate::demo::DemoScene;

const DEFAULT_CONFIG_PATH: &str = "forge.toml";

/// Everything that owns GPU objects.
///
/// Fields drop in declaration order, so the resource table goes before the
/// pipeline, whose backend owns the device.
struct RenderState {
    demo: DemoScene,
    resources: ResourceTable,
    pipeline: FramePipeline<VulkanBackend>,
    depth_target: ResourceId,
}

impl RenderState {
    fn new(window: &Window, config: &RendererConfig) -> Result<Self> {
        let backend = VulkanBackend::new(window, config)?;
        let mut resources = ResourceTable::with_capacity(config.initial_arena_capacity);

        let depth_target = resources.allocate(demo::depth_target(&backend)?);
        let demo = DemoScene::new(&backend, &mut resources, window.aspect_ratio());

        let shadow_pass = demo::shadow_pass(&backend, &mut resources, config.shadow_map_size);

        let mut pipeline = FramePipeline::new(backend, &mut resources, config)?;
        match shadow_pass {
            Ok(pass) => pipeline.add_pass(Box::new(pass)),
            Err(e) => warn!("Shadows disabled: {}", e),
        }
        pipeline.add_pass(Box::new(
            OpaquePass::default()
                .with_depth_target(depth_target)
                .with_clear_color(config.clear_color),
        ));
        pipeline.add_pass(Box::new(OverlayPass::new()));

        Ok(Self {
            demo,
            resources,
            pipeline,
            depth_target,
        })
    }

    fn render(&mut self, delta_secs: f32) -> Result<()> {
        self.demo.update(delta_secs);

        let outcome = self
            .pipeline
            .render_frame(&mut self.resources, &self.demo.scene)?;
        if outcome == FrameOutcome::SwapchainRebuilt {
            // The rebuild left the device idle.
            let backend = self.pipeline.backend();
            demo::resize_depth_target(backend, &mut self.resources, self.depth_target)?;
            self.demo.set_aspect(backend.extent().aspect_ratio());
            debug!(
                "Depth target resized to {}x{}",
                backend.extent().width,
                backend.extent().height
            );
        }
        Ok(())
    }

    fn resize(&mut self, width: u32, height: u32) {
        self.pipeline
            .backend_mut()
            .set_requested_extent(width, height);
        self.pipeline.request_rebuild();
    }

    fn shutdown(&mut self) {
        if self.pipeline.frame_count() == 0 {
            return;
        }
        if let Err(e) = self.pipeline.shutdown(&mut self.resources) {
            error!("Frame pipeline shutdown failed: {}", e);
        }
    }
}

impl Drop for RenderState {
    fn drop(&mut self) {
        self.shutdown();
    }
}

struct App {
    config: RendererConfig,
    // Dropped before the window its surface was created from.
    state: Option<RenderState>,
    window: Option<Window>,
    timer: Timer,
}

impl App {
    fn new(config: RendererConfig) -> Self {
        Self {
            config,
            state: None,
            window: None,
            timer: Timer::new(),
        }
    }

    fn exit(&mut self, event_loop: &ActiveEventLoop) {
        info!("Shutting down");
        self.state = None;
        event_loop.exit();
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }

        let window_config = &self.config.window;
        let window = match Window::new(
            event_loop,
            window_config.width,
            window_config.height,
            &window_config.title,
        ) {
            Ok(window) => window,
            Err(e) => {
                error!("Failed to create window: {}", e);
                event_loop.exit();
                return;
            }
        };

        match RenderState::new(&window, &self.config) {
            Ok(state) => {
                info!("Initialization complete, entering main loop");
                self.state = Some(state);
                self.window = Some(window);
            }
            Err(e) => {
                error!("Failed to create renderer: {:#}", e);
                event_loop.exit();
            }
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested => self.exit(event_loop),
            WindowEvent::KeyboardInput { event, .. }
                if event.state.is_pressed()
                    && event.physical_key == PhysicalKey::Code(KeyCode::Escape) =>
            {
                self.exit(event_loop);
            }
            WindowEvent::Resized(size) => {
                let Some(window) = self.window.as_mut() else {
                    return;
                };
                window.resize(size.width, size.height);
                if !window.is_minimized()
                    && let Some(state) = self.state.as_mut()
                {
                    state.resize(size.width, size.height);
                }
            }
            WindowEvent::RedrawRequested => {
                let delta = self.timer.delta_secs();
                if self.window.as_ref().is_none_or(Window::is_minimized) {
                    return;
                }
                if let Some(state) = self.state.as_mut()
                    && let Err(e) = state.render(delta)
                {
                    error!("Render error: {:#}", e);
                    self.exit(event_loop);
                }
            }
            _ => {}
        }
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(window) = self.window.as_ref() {
            window.request_redraw();
        }
    }

    fn exiting(&mut self, _event_loop: &ActiveEventLoop) {
        self.state = None;
    }
}

fn main() -> Result<()> {
    let config_path = std::env::args()
        .nth(1)
        .map_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH), PathBuf::from);
    let config = RendererConfig::load(&config_path)?;

    forge_core::init_logging_with(&config.log_filter);
    info!(
        "Starting forge with {} ({} uniform slots, inter-pass fencing: {})",
        config_path.display(),
        config.max_uniform_slots,
        config.inter_pass_fencing
    );

    let event_loop = EventLoop::new()?;
    event_loop.set_control_flow(ControlFlow::Poll);

    let mut app = App::new(config);
    event_loop.run_app(&mut app)?;

    Ok(())
}
