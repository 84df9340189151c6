//! Offscreen color and depth attachments.

use std::cell::Cell;
use std::sync::Arc;

use ash::vk;
use forge_resources::Resource;
use gpu_allocator::MemoryLocation;
use gpu_allocator::vulkan::{Allocation, AllocationCreateDesc, AllocationScheme};
use tracing::{debug, error};

use crate::device::Device;
use crate::error::{RhiError, RhiResult};

pub const DEFAULT_DEPTH_FORMAT: vk::Format = vk::Format::D32_SFLOAT;

/// Which attachment slot a target is made for.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TargetKind {
    Color,
    Depth,
}

impl TargetKind {
    pub fn aspect(self) -> vk::ImageAspectFlags {
        match self {
            TargetKind::Color => vk::ImageAspectFlags::COLOR,
            TargetKind::Depth => vk::ImageAspectFlags::DEPTH,
        }
    }

    /// Attachment usage plus `SAMPLED`, so a later pass can read the target
    /// (a shadow map, for instance).
    pub fn usage(self) -> vk::ImageUsageFlags {
        let attachment = match self {
            TargetKind::Color => vk::ImageUsageFlags::COLOR_ATTACHMENT,
            TargetKind::Depth => vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT,
        };
        attachment | vk::ImageUsageFlags::SAMPLED
    }
}

/// A device-local image with one view, usable as a dynamic-rendering attachment.
///
/// The layout the image was last transitioned to is tracked here so passes can
/// chain transitions without knowing who touched the image before them.
pub struct RenderTarget {
    device: Arc<Device>,
    image: vk::Image,
    image_view: vk::ImageView,
    allocation: Option<Allocation>,
    format: vk::Format,
    extent: vk::Extent2D,
    kind: TargetKind,
    layout: Cell<vk::ImageLayout>,
}

impl RenderTarget {
    /// # Errors
    ///
    /// Returns an error for a zero extent or if creation or allocation fails.
    pub fn new(
        device: Arc<Device>,
        kind: TargetKind,
        format: vk::Format,
        extent: vk::Extent2D,
    ) -> RhiResult<Self> {
        if extent.width == 0 || extent.height == 0 {
            return Err(RhiError::InvalidArgument(
                "render target dimensions must be greater than 0".to_string(),
            ));
        }

        let image_info = vk::ImageCreateInfo::default()
            .image_type(vk::ImageType::TYPE_2D)
            .format(format)
            .extent(vk::Extent3D {
                width: extent.width,
                height: extent.height,
                depth: 1,
            })
            .mip_levels(1)
            .array_layers(1)
            .samples(vk::SampleCountFlags::TYPE_1)
            .tiling(vk::ImageTiling::OPTIMAL)
            .usage(kind.usage())
            .sharing_mode(vk::SharingMode::EXCLUSIVE)
            .initial_layout(vk::ImageLayout::UNDEFINED);

        let image = unsafe { device.handle().create_image(&image_info, None)? };
        let requirements = unsafe { device.handle().get_image_memory_requirements(image) };

        let allocation = device
            .allocator()
            .lock()
            .map_err(|_| RhiError::AllocatorPoisoned)?
            .allocate(&AllocationCreateDesc {
                name: "render_target",
                requirements,
                location: MemoryLocation::GpuOnly,
                linear: false,
                allocation_scheme: AllocationScheme::GpuAllocatorManaged,
            });
        let allocation = match allocation {
            Ok(allocation) => allocation,
            Err(e) => {
                unsafe { device.handle().destroy_image(image, None) };
                return Err(e.into());
            }
        };

        unsafe {
            device
                .handle()
                .bind_image_memory(image, allocation.memory(), allocation.offset())?;
        }

        let view_info = vk::ImageViewCreateInfo::default()
            .image(image)
            .view_type(vk::ImageViewType::TYPE_2D)
            .format(format)
            .subresource_range(
                vk::ImageSubresourceRange::default()
                    .aspect_mask(kind.aspect())
                    .level_count(1)
                    .layer_count(1),
            );
        let image_view = unsafe { device.handle().create_image_view(&view_info, None)? };

        debug!(
            "Created {:?} target: {}x{} ({:?})",
            kind, extent.width, extent.height, format
        );

        Ok(Self {
            device,
            image,
            image_view,
            allocation: Some(allocation),
            format,
            extent,
            kind,
            layout: Cell::new(vk::ImageLayout::UNDEFINED),
        })
    }

    /// Depth target in [`DEFAULT_DEPTH_FORMAT`].
    pub fn depth(device: Arc<Device>, extent: vk::Extent2D) -> RhiResult<Self> {
        Self::new(device, TargetKind::Depth, DEFAULT_DEPTH_FORMAT, extent)
    }

    /// Square depth target sampled by later passes as a shadow map.
    pub fn shadow_map(device: Arc<Device>, size: u32) -> RhiResult<Self> {
        Self::depth(
            device,
            vk::Extent2D {
                width: size,
                height: size,
            },
        )
    }

    #[inline]
    pub fn image(&self) -> vk::Image {
        self.image
    }

    #[inline]
    pub fn image_view(&self) -> vk::ImageView {
        self.image_view
    }

    #[inline]
    pub fn format(&self) -> vk::Format {
        self.format
    }

    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    #[inline]
    pub fn kind(&self) -> TargetKind {
        self.kind
    }

    /// Layout recorded by the last [`set_layout`](Self::set_layout).
    #[inline]
    pub fn layout(&self) -> vk::ImageLayout {
        self.layout.get()
    }

    #[inline]
    pub fn set_layout(&self, layout: vk::ImageLayout) {
        self.layout.set(layout);
    }
}

impl Drop for RenderTarget {
    fn drop(&mut self) {
        unsafe {
            self.device
                .handle()
                .destroy_image_view(self.image_view, None);
            self.device.handle().destroy_image(self.image, None);
        }

        if let Some(allocation) = self.allocation.take() {
            match self.device.allocator().lock() {
                Ok(mut allocator) => {
                    if let Err(e) = allocator.free(allocation) {
                        error!("Failed to free render target allocation: {:?}", e);
                    }
                }
                Err(_) => error!("Allocator poisoned, leaking render target memory"),
            }
        }

        debug!(
            "Destroyed {:?} target: {}x{}",
            self.kind, self.extent.width, self.extent.height
        );
    }
}

impl Resource for RenderTarget {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_depth_format() {
        assert_eq!(DEFAULT_DEPTH_FORMAT, vk::Format::D32_SFLOAT);
    }

    #[test]
    fn test_targets_are_sampleable() {
        assert!(TargetKind::Color.usage().contains(vk::ImageUsageFlags::SAMPLED));
        assert!(
            TargetKind::Depth
                .usage()
                .contains(vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT)
        );
        assert_eq!(TargetKind::Depth.aspect(), vk::ImageAspectFlags::DEPTH);
    }
}
