//! Descriptor set layouts, pools and write helpers.
//!
//! # Overview
//!
//! - [`DescriptorSetLayout`] declares the bindings a pipeline expects
//! - [`DescriptorPool`] hands out sets and is reset wholesale once the frame
//!   that used them has retired
//! - [`update_descriptor_sets`], [`buffer_info`] and [`image_info`] fill sets
//! - [`DescriptorBindingBuilder`] builds the layout bindings the renderer uses
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use forge_rhi::descriptor::{DescriptorBindingBuilder, DescriptorPool, DescriptorSetLayout};
//! use forge_rhi::device::Device;
//! use forge_rhi::vk;
//!
//! # fn example(device: Arc<Device>) -> Result<(), forge_rhi::RhiError> {
//! let stages = vk::ShaderStageFlags::VERTEX | vk::ShaderStageFlags::FRAGMENT;
//! let layout = DescriptorSetLayout::new(
//!     device.clone(),
//!     &[
//!         DescriptorBindingBuilder::uniform_buffer_dynamic(0, stages),
//!         DescriptorBindingBuilder::combined_image_sampler(1, vk::ShaderStageFlags::FRAGMENT),
//!     ],
//! )?;
//!
//! let pool = DescriptorPool::new(
//!     device,
//!     4,
//!     &[
//!         vk::DescriptorPoolSize::default()
//!             .ty(vk::DescriptorType::UNIFORM_BUFFER_DYNAMIC)
//!             .descriptor_count(4),
//!         vk::DescriptorPoolSize::default()
//!             .ty(vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
//!             .descriptor_count(4),
//!     ],
//! )?;
//! let set = pool.allocate_one(layout.handle())?;
//! # let _ = set;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use ash::vk;
use tracing::{debug, trace};

use crate::device::Device;
use crate::error::{RhiError, RhiResult};

/// Descriptor set layout wrapper.
///
/// # Thread Safety
///
/// Immutable after creation. It can be shared between threads when wrapped
/// in `Arc`.
pub struct DescriptorSetLayout {
    /// Device that owns the layout.
    device: Arc<Device>,
    /// Vulkan descriptor set layout handle.
    layout: vk::DescriptorSetLayout,
}

impl DescriptorSetLayout {
    /// Creates a descriptor set layout.
    ///
    /// # Arguments
    ///
    /// * `device` - The logical device
    /// * `bindings` - Binding descriptions, one per binding slot
    ///
    /// # Errors
    ///
    /// Returns an error if layout creation fails.
    pub fn new(device: Arc<Device>, bindings: &[vk::DescriptorSetLayoutBinding]) -> RhiResult<Self> {
        let create_info = vk::DescriptorSetLayoutCreateInfo::default().bindings(bindings);

        let layout = unsafe {
            device
                .handle()
                .create_descriptor_set_layout(&create_info, None)?
        };

        debug!(
            "Created descriptor set layout with {} binding(s)",
            bindings.len()
        );

        Ok(Self { device, layout })
    }

    /// Returns the Vulkan descriptor set layout handle.
    #[inline]
    pub fn handle(&self) -> vk::DescriptorSetLayout {
        self.layout
    }
}

impl Drop for DescriptorSetLayout {
    fn drop(&mut self) {
        unsafe {
            self.device
                .handle()
                .destroy_descriptor_set_layout(self.layout, None);
        }
        debug!("Destroyed descriptor set layout");
    }
}

/// Descriptor pool whose sets live until the next [`DescriptorPool::reset`].
///
/// Sets are never freed one by one, so the pool is created without
/// `FREE_DESCRIPTOR_SET`.
///
/// # Thread Safety
///
/// Allocation and reset are not thread-safe. Synchronize access externally.
pub struct DescriptorPool {
    /// Device that owns the pool.
    device: Arc<Device>,
    /// Vulkan descriptor pool handle.
    pool: vk::DescriptorPool,
    /// Maximum number of sets that can be allocated between resets.
    max_sets: u32,
}

impl DescriptorPool {
    /// Creates a descriptor pool.
    ///
    /// # Arguments
    ///
    /// * `device` - The logical device
    /// * `max_sets` - Maximum number of sets allocated between resets
    /// * `pool_sizes` - Descriptor counts per type
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::InvalidArgument`] for `max_sets == 0`, or the Vulkan
    /// error if pool creation fails.
    pub fn new(
        device: Arc<Device>,
        max_sets: u32,
        pool_sizes: &[vk::DescriptorPoolSize],
    ) -> RhiResult<Self> {
        if max_sets == 0 {
            return Err(RhiError::InvalidArgument(
                "descriptor pool needs room for at least one set".to_string(),
            ));
        }

        let create_info = vk::DescriptorPoolCreateInfo::default()
            .max_sets(max_sets)
            .pool_sizes(pool_sizes);

        let pool = unsafe { device.handle().create_descriptor_pool(&create_info, None)? };

        debug!(
            "Created descriptor pool: max_sets={}, pool_sizes={}",
            max_sets,
            pool_sizes.len()
        );

        Ok(Self {
            device,
            pool,
            max_sets,
        })
    }

    /// Allocates one set per entry of `layouts`.
    ///
    /// # Errors
    ///
    /// Returns an error if the pool is exhausted or allocation fails.
    pub fn allocate(&self, layouts: &[vk::DescriptorSetLayout]) -> RhiResult<Vec<vk::DescriptorSet>> {
        let alloc_info = vk::DescriptorSetAllocateInfo::default()
            .descriptor_pool(self.pool)
            .set_layouts(layouts);

        let sets = unsafe { self.device.handle().allocate_descriptor_sets(&alloc_info)? };

        trace!("Allocated {} descriptor set(s)", sets.len());

        Ok(sets)
    }

    /// Allocates a single set with `layout`.
    ///
    /// # Errors
    ///
    /// Returns an error if the pool is exhausted or allocation fails.
    pub fn allocate_one(&self, layout: vk::DescriptorSetLayout) -> RhiResult<vk::DescriptorSet> {
        self.allocate(&[layout])?
            .into_iter()
            .next()
            .ok_or_else(|| RhiError::InvalidArgument("descriptor allocation returned no set".to_string()))
    }

    /// Returns every set allocated from the pool.
    ///
    /// No set from this pool may still be referenced by pending GPU work.
    ///
    /// # Errors
    ///
    /// Returns an error if the reset fails.
    pub fn reset(&self) -> RhiResult<()> {
        unsafe {
            self.device
                .handle()
                .reset_descriptor_pool(self.pool, vk::DescriptorPoolResetFlags::empty())?;
        }

        trace!("Reset descriptor pool");

        Ok(())
    }

    /// Returns the Vulkan descriptor pool handle.
    #[inline]
    pub fn handle(&self) -> vk::DescriptorPool {
        self.pool
    }

    /// Returns the maximum number of sets allocated between resets.
    #[inline]
    pub fn max_sets(&self) -> u32 {
        self.max_sets
    }
}

impl Drop for DescriptorPool {
    fn drop(&mut self) {
        unsafe {
            self.device
                .handle()
                .destroy_descriptor_pool(self.pool, None);
        }
        debug!("Destroyed descriptor pool");
    }
}

/// Writes resource bindings into descriptor sets.
///
/// # Arguments
///
/// * `device` - The logical device
/// * `writes` - Write operations
pub fn update_descriptor_sets(device: &Device, writes: &[vk::WriteDescriptorSet]) {
    if writes.is_empty() {
        return;
    }

    unsafe {
        device.handle().update_descriptor_sets(writes, &[]);
    }

    trace!("Updated {} descriptor binding(s)", writes.len());
}

/// Buffer range for a descriptor write.
///
/// # Arguments
///
/// * `buffer` - The buffer handle
/// * `offset` - Offset into the buffer in bytes
/// * `range` - Size of the bound range, or `vk::WHOLE_SIZE`
#[inline]
pub fn buffer_info(
    buffer: vk::Buffer,
    offset: vk::DeviceSize,
    range: vk::DeviceSize,
) -> vk::DescriptorBufferInfo {
    vk::DescriptorBufferInfo::default()
        .buffer(buffer)
        .offset(offset)
        .range(range)
}

/// Sampled image for a descriptor write.
///
/// # Arguments
///
/// * `sampler` - The sampler handle
/// * `image_view` - The image view handle
/// * `image_layout` - Layout the image is in when the shader reads it
#[inline]
pub fn image_info(
    sampler: vk::Sampler,
    image_view: vk::ImageView,
    image_layout: vk::ImageLayout,
) -> vk::DescriptorImageInfo {
    vk::DescriptorImageInfo::default()
        .sampler(sampler)
        .image_view(image_view)
        .image_layout(image_layout)
}

/// Layout binding constructors.
pub struct DescriptorBindingBuilder;

impl DescriptorBindingBuilder {
    /// Uniform buffer bound at a fixed offset.
    #[inline]
    pub fn uniform_buffer(
        binding: u32,
        stage_flags: vk::ShaderStageFlags,
    ) -> vk::DescriptorSetLayoutBinding<'static> {
        Self::single(binding, vk::DescriptorType::UNIFORM_BUFFER, stage_flags)
    }

    /// Uniform buffer whose offset is supplied when the set is bound.
    #[inline]
    pub fn uniform_buffer_dynamic(
        binding: u32,
        stage_flags: vk::ShaderStageFlags,
    ) -> vk::DescriptorSetLayoutBinding<'static> {
        Self::single(binding, vk::DescriptorType::UNIFORM_BUFFER_DYNAMIC, stage_flags)
    }

    /// Image view paired with a sampler.
    #[inline]
    pub fn combined_image_sampler(
        binding: u32,
        stage_flags: vk::ShaderStageFlags,
    ) -> vk::DescriptorSetLayoutBinding<'static> {
        Self::single(binding, vk::DescriptorType::COMBINED_IMAGE_SAMPLER, stage_flags)
    }

    fn single(
        binding: u32,
        descriptor_type: vk::DescriptorType,
        stage_flags: vk::ShaderStageFlags,
    ) -> vk::DescriptorSetLayoutBinding<'static> {
        vk::DescriptorSetLayoutBinding::default()
            .binding(binding)
            .descriptor_type(descriptor_type)
            .descriptor_count(1)
            .stage_flags(stage_flags)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uniform_buffer_binding() {
        let binding = DescriptorBindingBuilder::uniform_buffer(1, vk::ShaderStageFlags::FRAGMENT);
        assert_eq!(binding.binding, 1);
        assert_eq!(binding.descriptor_type, vk::DescriptorType::UNIFORM_BUFFER);
        assert_eq!(binding.descriptor_count, 1);
        assert_eq!(binding.stage_flags, vk::ShaderStageFlags::FRAGMENT);
    }

    #[test]
    fn test_dynamic_uniform_buffer_binding() {
        let binding = DescriptorBindingBuilder::uniform_buffer_dynamic(
            0,
            vk::ShaderStageFlags::VERTEX | vk::ShaderStageFlags::FRAGMENT,
        );
        assert_eq!(binding.binding, 0);
        assert_eq!(
            binding.descriptor_type,
            vk::DescriptorType::UNIFORM_BUFFER_DYNAMIC
        );
        assert!(binding.stage_flags.contains(vk::ShaderStageFlags::VERTEX));
        assert!(binding.stage_flags.contains(vk::ShaderStageFlags::FRAGMENT));
    }

    #[test]
    fn test_combined_image_sampler_binding() {
        let binding =
            DescriptorBindingBuilder::combined_image_sampler(2, vk::ShaderStageFlags::FRAGMENT);
        assert_eq!(binding.binding, 2);
        assert_eq!(
            binding.descriptor_type,
            vk::DescriptorType::COMBINED_IMAGE_SAMPLER
        );
        assert_eq!(binding.descriptor_count, 1);
    }

    #[test]
    fn test_buffer_info_range() {
        let info = buffer_info(vk::Buffer::null(), 256, 208);
        assert_eq!(info.offset, 256);
        assert_eq!(info.range, 208);
    }

    #[test]
    fn test_image_info_layout() {
        let info = image_info(
            vk::Sampler::null(),
            vk::ImageView::null(),
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        );
        assert_eq!(info.image_layout, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL);
    }
}
