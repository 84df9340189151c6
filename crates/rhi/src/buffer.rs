//! GPU buffers backed by `gpu-allocator`.
//!
//! # Overview
//!
//! - Vertex and index buffers hold mesh geometry
//! - Uniform buffers hold per-frame camera and lighting blocks
//!
//! Every buffer is host visible and persistently mapped, so updates are plain
//! memory copies through [`Buffer::write`].
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use forge_rhi::buffer::{Buffer, BufferUsage};
//! use forge_rhi::device::Device;
//!
//! # fn example(device: Arc<Device>) -> Result<(), forge_rhi::RhiError> {
//! let indices: [u32; 3] = [0, 1, 2];
//! let index_buffer = Buffer::from_slice(device.clone(), BufferUsage::Index, &indices)?;
//!
//! let uniforms = Buffer::new(device, BufferUsage::Uniform, 256)?;
//! uniforms.write(0, &[0u8; 64])?;
//! # let _ = index_buffer;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use ash::vk;
use bytemuck::Pod;
use forge_resources::Resource;
use gpu_allocator::MemoryLocation;
use gpu_allocator::vulkan::{Allocation, AllocationCreateDesc, AllocationScheme};
use tracing::{debug, error};

use crate::device::Device;
use crate::error::{RhiError, RhiResult};

/// What a buffer is bound as.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BufferUsage {
    /// Interleaved vertex data.
    Vertex,
    /// 32-bit indices.
    Index,
    /// Uniform blocks read by shaders.
    Uniform,
}

impl BufferUsage {
    /// Converts to Vulkan buffer usage flags.
    pub fn to_vk_usage(self) -> vk::BufferUsageFlags {
        match self {
            BufferUsage::Vertex => vk::BufferUsageFlags::VERTEX_BUFFER,
            BufferUsage::Index => vk::BufferUsageFlags::INDEX_BUFFER,
            BufferUsage::Uniform => vk::BufferUsageFlags::UNIFORM_BUFFER,
        }
    }

    /// Host-visible so geometry can be written without a staging copy.
    pub fn memory_location(self) -> MemoryLocation {
        MemoryLocation::CpuToGpu
    }

    /// Allocation name used for debugging.
    pub fn name(self) -> &'static str {
        match self {
            BufferUsage::Vertex => "vertex",
            BufferUsage::Index => "index",
            BufferUsage::Uniform => "uniform",
        }
    }
}

/// A Vulkan buffer and its memory allocation.
///
/// # Thread Safety
///
/// The buffer handle is immutable after creation. Concurrent [`Buffer::write`]
/// calls to overlapping ranges are the caller's responsibility, as is not
/// writing a range the GPU is still reading.
pub struct Buffer {
    /// Device that owns the buffer.
    device: Arc<Device>,
    /// Vulkan buffer handle.
    buffer: vk::Buffer,
    /// Memory allocation, taken on drop.
    allocation: Option<Allocation>,
    /// Size in bytes.
    size: vk::DeviceSize,
    /// What the buffer is bound as.
    usage: BufferUsage,
}

impl Buffer {
    /// Creates a buffer and binds freshly allocated, mapped memory to it.
    ///
    /// # Arguments
    ///
    /// * `device` - The logical device
    /// * `usage` - What the buffer is bound as
    /// * `size` - Size in bytes
    ///
    /// # Errors
    ///
    /// Returns an error for a zero size or if creation or allocation fails.
    ///
    /// # Example
    ///
    /// ```no_run
    /// # use std::sync::Arc;
    /// # use forge_rhi::device::Device;
    /// use forge_rhi::buffer::{Buffer, BufferUsage};
    ///
    /// # fn example(device: Arc<Device>) -> Result<(), forge_rhi::RhiError> {
    /// let buffer = Buffer::new(device, BufferUsage::Vertex, 1024)?;
    /// assert_eq!(buffer.size(), 1024);
    /// # Ok(())
    /// # }
    /// ```
    pub fn new(device: Arc<Device>, usage: BufferUsage, size: vk::DeviceSize) -> RhiResult<Self> {
        if size == 0 {
            return Err(RhiError::InvalidArgument(
                "buffer size must be greater than 0".to_string(),
            ));
        }

        let buffer_info = vk::BufferCreateInfo::default()
            .size(size)
            .usage(usage.to_vk_usage())
            .sharing_mode(vk::SharingMode::EXCLUSIVE);

        let buffer = unsafe { device.handle().create_buffer(&buffer_info, None)? };
        let requirements = unsafe { device.handle().get_buffer_memory_requirements(buffer) };

        let allocation = device
            .allocator()
            .lock()
            .map_err(|_| RhiError::AllocatorPoisoned)?
            .allocate(&AllocationCreateDesc {
                name: usage.name(),
                requirements,
                location: usage.memory_location(),
                linear: true,
                allocation_scheme: AllocationScheme::GpuAllocatorManaged,
            });
        let allocation = match allocation {
            Ok(allocation) => allocation,
            Err(e) => {
                unsafe { device.handle().destroy_buffer(buffer, None) };
                return Err(e.into());
            }
        };

        unsafe {
            device
                .handle()
                .bind_buffer_memory(buffer, allocation.memory(), allocation.offset())?;
        }

        debug!("Created {} buffer: {} bytes", usage.name(), size);

        Ok(Self {
            device,
            buffer,
            allocation: Some(allocation),
            size,
            usage,
        })
    }

    /// Creates a buffer sized for `data` and writes it.
    pub fn from_slice<T: Pod>(device: Arc<Device>, usage: BufferUsage, data: &[T]) -> RhiResult<Self> {
        let bytes: &[u8] = bytemuck::cast_slice(data);
        let buffer = Self::new(device, usage, bytes.len() as vk::DeviceSize)?;
        buffer.write(0, bytes)?;
        Ok(buffer)
    }

    /// Copies `data` into the mapped allocation at `offset`.
    ///
    /// # Arguments
    ///
    /// * `offset` - Byte offset into the buffer
    /// * `data` - Bytes to copy
    ///
    /// # Errors
    ///
    /// Returns an error if the range exceeds the buffer or the memory is not
    /// mapped.
    pub fn write(&self, offset: vk::DeviceSize, data: &[u8]) -> RhiResult<()> {
        if data.is_empty() {
            return Ok(());
        }

        let end = offset + data.len() as vk::DeviceSize;
        if end > self.size {
            return Err(RhiError::InvalidArgument(format!(
                "write of {} bytes at {} exceeds buffer size {}",
                data.len(),
                offset,
                self.size
            )));
        }

        let mapped = self
            .allocation
            .as_ref()
            .and_then(Allocation::mapped_ptr)
            .ok_or_else(|| RhiError::InvalidArgument("buffer memory is not mapped".to_string()))?;

        unsafe {
            let dst = mapped.as_ptr().cast::<u8>().add(offset as usize);
            std::ptr::copy_nonoverlapping(data.as_ptr(), dst, data.len());
        }

        Ok(())
    }

    /// Returns the Vulkan buffer handle.
    #[inline]
    pub fn handle(&self) -> vk::Buffer {
        self.buffer
    }

    #[inline]
    pub fn size(&self) -> vk::DeviceSize {
        self.size
    }

    #[inline]
    pub fn usage(&self) -> BufferUsage {
        self.usage
    }
}

impl Drop for Buffer {
    fn drop(&mut self) {
        if let Some(allocation) = self.allocation.take() {
            match self.device.allocator().lock() {
                Ok(mut allocator) => {
                    if let Err(e) = allocator.free(allocation) {
                        error!("Failed to free buffer allocation: {:?}", e);
                    }
                }
                Err(_) => error!("Allocator poisoned, leaking {} buffer memory", self.usage.name()),
            }
        }

        unsafe {
            self.device.handle().destroy_buffer(self.buffer, None);
        }

        debug!("Destroyed {} buffer", self.usage.name());
    }
}

impl Resource for Buffer {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buffer_usage_to_vk_usage() {
        assert_eq!(
            BufferUsage::Vertex.to_vk_usage(),
            vk::BufferUsageFlags::VERTEX_BUFFER
        );
        assert_eq!(
            BufferUsage::Index.to_vk_usage(),
            vk::BufferUsageFlags::INDEX_BUFFER
        );
        assert_eq!(
            BufferUsage::Uniform.to_vk_usage(),
            vk::BufferUsageFlags::UNIFORM_BUFFER
        );
    }

    #[test]
    fn test_buffers_are_host_visible() {
        for usage in [BufferUsage::Vertex, BufferUsage::Index, BufferUsage::Uniform] {
            assert_eq!(usage.memory_location(), MemoryLocation::CpuToGpu);
        }
    }

    #[test]
    fn test_buffer_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Buffer>();
    }
}
