//! Thin RAII layer over Vulkan 1.3 built on `ash`.
//!
//! Every object here owns its handle and releases it on drop. Objects that can
//! live in a [`ResourceTable`](forge_resources::ResourceTable) implement
//! [`Resource`](forge_resources::Resource) so their release can be deferred
//! until the GPU is done with them.

mod error;

pub mod buffer;
pub mod command;
pub mod descriptor;
pub mod device;
pub mod instance;
pub mod physical_device;
pub mod pipeline;
pub mod render_target;
pub mod sampler;
pub mod shader;
pub mod swapchain;
pub mod sync;
pub mod vertex;

pub use buffer::{Buffer, BufferUsage};
pub use command::{CommandBuffer, CommandPool};
pub use descriptor::{DescriptorBindingBuilder, DescriptorPool, DescriptorSetLayout};
pub use device::Device;
pub use error::{RhiError, RhiResult};
pub use instance::Instance;
pub use pipeline::{GraphicsPipelineDesc, PUSH_CONSTANT_SIZE, PUSH_CONSTANT_STAGES, Pipeline};
pub use render_target::{RenderTarget, TargetKind};
pub use sampler::{Sampler, SamplerKind};
pub use shader::{Shader, ShaderStage};
pub use swapchain::{Swapchain, SwapchainStatus};
pub use sync::{Fence, Semaphore};
pub use vertex::Vertex;

pub use ash::vk;
