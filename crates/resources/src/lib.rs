//! Handle-based GPU resource ownership.
//!
//! - [`ResourceArena`]: type-erased slot table with a FIFO free list
//! - [`ResourceTable`]: typed facade with deferred destruction
//! - [`Mesh`] and [`Material`]: asset records that reference other resources by id

pub mod arena;
pub mod error;
pub mod handle;
pub mod material;
pub mod mesh;
pub mod resource;
pub mod table;

pub use arena::{DEFAULT_ARENA_CAPACITY, ResourceArena};
pub use error::{ResourceError, ResourceResult};
pub use handle::{Handle, ResourceId};
pub use material::Material;
pub use mesh::{Mesh, MeshData, SubMesh};
pub use resource::Resource;
pub use table::{DestroyBatch, DestroyEntry, ResourceTable};
