//! Concrete render passes.

mod opaque;
mod overlay;
mod shadow;

pub use opaque::OpaquePass;
pub use overlay::{OverlayFn, OverlayPass};
pub use shadow::ShadowPass;
