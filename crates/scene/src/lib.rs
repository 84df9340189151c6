//! Scene graph and components.
//!
//! This crate provides the application scene the renderer snapshots each frame:
//! - Entities with parent links
//! - Transform, camera, mesh renderer and light components

pub mod camera;
pub mod light;
pub mod scene;
pub mod transform;

pub use camera::{Camera, Projection};
pub use light::{Light, LightKind};
pub use scene::{Entity, EntityId, Environment, MeshRenderer, Scene};
pub use transform::{Transform, normal_matrix};
