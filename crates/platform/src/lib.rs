//! Windowing and presentation-surface glue.
//!
//! Wraps a winit window and creates the Vulkan surface the swapchain renders
//! into.

mod window;

pub use window::{Surface, Window, required_surface_extensions};

pub use winit::event::WindowEvent;
pub use winit::event_loop::{ActiveEventLoop, EventLoop};
