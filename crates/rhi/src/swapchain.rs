//! Swapchain creation, recreation, acquire and present.
//!
//! # Overview
//!
//! - [`Swapchain::new`] picks an sRGB BGRA format, mailbox or FIFO present
//!   mode and one image more than the surface minimum
//! - [`Swapchain::recreate`] rebuilds in place after a resize
//! - [`Swapchain::acquire`] and [`Swapchain::present`] wrap the per-frame calls
//!
//! Out-of-date and suboptimal results are not errors here: [`Swapchain::acquire`]
//! and [`Swapchain::present`] report them as [`SwapchainStatus::Stale`] so the
//! frame loop can schedule a rebuild.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use forge_rhi::device::Device;
//! use forge_rhi::instance::Instance;
//! use forge_rhi::swapchain::{Swapchain, SwapchainStatus};
//! use forge_rhi::sync::Semaphore;
//! use forge_rhi::vk;
//!
//! # fn example(instance: &Instance, device: Arc<Device>, surface: vk::SurfaceKHR) -> Result<(), forge_rhi::RhiError> {
//! let requested = vk::Extent2D { width: 1280, height: 720 };
//! let mut swapchain = Swapchain::new(instance, device.clone(), surface, requested)?;
//! let image_available = Semaphore::new(device.clone())?;
//!
//! match swapchain.acquire(image_available.handle())? {
//!     SwapchainStatus::Ok(image_index) => {
//!         // Record and submit work that waits on `image_available`, then
//!         // present `image_index`.
//!         # let _ = image_index;
//!     }
//!     SwapchainStatus::Stale => swapchain.recreate(requested)?,
//! }
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use ash::vk;
use tracing::{debug, info, warn};

use crate::device::Device;
use crate::error::{RhiError, RhiResult};
use crate::instance::Instance;

/// Whether the swapchain still matches its surface.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SwapchainStatus<T> {
    Ok(T),
    /// The surface changed; the swapchain must be recreated before further use.
    Stale,
}

/// Surface capabilities, formats and present modes of a device.
#[derive(Debug, Clone)]
pub struct SwapchainSupport {
    pub capabilities: vk::SurfaceCapabilitiesKHR,
    pub formats: Vec<vk::SurfaceFormatKHR>,
    pub present_modes: Vec<vk::PresentModeKHR>,
}

impl SwapchainSupport {
    pub fn query(
        physical_device: vk::PhysicalDevice,
        surface: vk::SurfaceKHR,
        surface_loader: &ash::khr::surface::Instance,
    ) -> RhiResult<Self> {
        let (capabilities, formats, present_modes) = unsafe {
            (
                surface_loader.get_physical_device_surface_capabilities(physical_device, surface)?,
                surface_loader.get_physical_device_surface_formats(physical_device, surface)?,
                surface_loader
                    .get_physical_device_surface_present_modes(physical_device, surface)?,
            )
        };

        Ok(Self {
            capabilities,
            formats,
            present_modes,
        })
    }

    #[inline]
    pub fn is_adequate(&self) -> bool {
        !self.formats.is_empty() && !self.present_modes.is_empty()
    }
}

/// Presentable images for one surface, plus their views.
///
/// # Thread Safety
///
/// Acquire and present must be externally synchronized with each other and
/// with [`Swapchain::recreate`], which takes `&mut self`.
pub struct Swapchain {
    /// Device that owns the swapchain.
    device: Arc<Device>,
    /// Surface the images are presented to. Owned by the caller.
    surface: vk::SurfaceKHR,
    /// Surface extension loader.
    surface_loader: ash::khr::surface::Instance,
    /// Swapchain extension loader.
    swapchain_loader: ash::khr::swapchain::Device,
    /// Vulkan swapchain handle.
    swapchain: vk::SwapchainKHR,
    /// Images owned by the swapchain.
    images: Vec<vk::Image>,
    /// One view per image.
    image_views: Vec<vk::ImageView>,
    /// Image format.
    format: vk::Format,
    /// Image extent.
    extent: vk::Extent2D,
}

impl Swapchain {
    /// Creates a swapchain for `surface`.
    ///
    /// `requested` is only used when the surface does not dictate its own extent.
    ///
    /// # Arguments
    ///
    /// * `instance` - The Vulkan instance, used to load the extension functions
    /// * `device` - The logical device
    /// * `surface` - The window surface
    /// * `requested` - Extent to use when the surface leaves it open
    ///
    /// # Errors
    ///
    /// Returns an error if the surface has no usable format, reports a zero
    /// extent, or creation fails.
    pub fn new(
        instance: &Instance,
        device: Arc<Device>,
        surface: vk::SurfaceKHR,
        requested: vk::Extent2D,
    ) -> RhiResult<Self> {
        let mut swapchain = Self {
            surface_loader: ash::khr::surface::Instance::new(instance.entry(), instance.handle()),
            swapchain_loader: ash::khr::swapchain::Device::new(instance.handle(), device.handle()),
            device,
            surface,
            swapchain: vk::SwapchainKHR::null(),
            images: Vec::new(),
            image_views: Vec::new(),
            format: vk::Format::UNDEFINED,
            extent: vk::Extent2D::default(),
        };
        swapchain.build(requested)?;
        Ok(swapchain)
    }

    /// Rebuilds the swapchain in place, reusing the old one as `old_swapchain`.
    ///
    /// The caller must make sure no submitted work still uses the old images.
    ///
    /// # Errors
    ///
    /// Returns an error if the rebuild fails. A minimized window reports a
    /// zero extent and fails here until it is restored.
    pub fn recreate(&mut self, requested: vk::Extent2D) -> RhiResult<()> {
        info!(
            "Recreating swapchain for {}x{}",
            requested.width, requested.height
        );
        self.build(requested)
    }

    fn build(&mut self, requested: vk::Extent2D) -> RhiResult<()> {
        let support = SwapchainSupport::query(
            self.device.physical_device(),
            self.surface,
            &self.surface_loader,
        )?;
        if !support.is_adequate() {
            return Err(RhiError::Swapchain(
                "surface reports no formats or present modes".to_string(),
            ));
        }

        let surface_format = choose_surface_format(&support.formats);
        let present_mode = choose_present_mode(&support.present_modes);
        let extent = choose_extent(&support.capabilities, requested);
        if extent.width == 0 || extent.height == 0 {
            return Err(RhiError::Swapchain("surface has zero extent".to_string()));
        }
        let image_count = determine_image_count(&support.capabilities);

        let families = self.device.queue_families();
        let family_indices = [families.graphics, families.present];
        let (sharing_mode, shared_families) = if families.graphics != families.present {
            (vk::SharingMode::CONCURRENT, &family_indices[..])
        } else {
            (vk::SharingMode::EXCLUSIVE, &[][..])
        };

        let old_swapchain = self.swapchain;
        let create_info = vk::SwapchainCreateInfoKHR::default()
            .surface(self.surface)
            .min_image_count(image_count)
            .image_format(surface_format.format)
            .image_color_space(surface_format.color_space)
            .image_extent(extent)
            .image_array_layers(1)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
            .image_sharing_mode(sharing_mode)
            .queue_family_indices(shared_families)
            .pre_transform(support.capabilities.current_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(present_mode)
            .clipped(true)
            .old_swapchain(old_swapchain);

        let swapchain = unsafe { self.swapchain_loader.create_swapchain(&create_info, None)? };

        self.destroy_image_views();
        if old_swapchain != vk::SwapchainKHR::null() {
            unsafe { self.swapchain_loader.destroy_swapchain(old_swapchain, None) };
        }
        self.swapchain = swapchain;

        self.images = unsafe { self.swapchain_loader.get_swapchain_images(swapchain)? };
        self.image_views = create_image_views(&self.device, &self.images, surface_format.format)?;
        self.format = surface_format.format;
        self.extent = extent;

        info!(
            "Swapchain ready: {}x{}, {:?}, {:?}, {} images",
            extent.width,
            extent.height,
            surface_format.format,
            present_mode,
            self.images.len()
        );
        Ok(())
    }

    /// Acquires the next image, signalling `semaphore` when it is ready.
    ///
    /// # Arguments
    ///
    /// * `semaphore` - Unsignalled semaphore to signal once the image is free
    ///
    /// # Errors
    ///
    /// Returns an error for any result other than success, suboptimal or
    /// out of date.
    pub fn acquire(&self, semaphore: vk::Semaphore) -> RhiResult<SwapchainStatus<u32>> {
        let result = unsafe {
            self.swapchain_loader.acquire_next_image(
                self.swapchain,
                u64::MAX,
                semaphore,
                vk::Fence::null(),
            )
        };

        match result {
            Ok((index, false)) => Ok(SwapchainStatus::Ok(index)),
            Ok((_, true)) => {
                debug!("Acquire returned SUBOPTIMAL_KHR");
                Ok(SwapchainStatus::Stale)
            }
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => {
                debug!("Acquire returned ERROR_OUT_OF_DATE_KHR");
                Ok(SwapchainStatus::Stale)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Queues `image_index` for presentation once `wait_semaphore` signals.
    ///
    /// # Arguments
    ///
    /// * `queue` - Queue that supports presentation to the surface
    /// * `image_index` - Image returned by the matching acquire
    /// * `wait_semaphore` - Semaphore signalled by the frame's final submission
    ///
    /// # Errors
    ///
    /// Returns an error for any result other than success, suboptimal or
    /// out of date.
    pub fn present(
        &self,
        queue: vk::Queue,
        image_index: u32,
        wait_semaphore: vk::Semaphore,
    ) -> RhiResult<SwapchainStatus<()>> {
        let swapchains = [self.swapchain];
        let image_indices = [image_index];
        let wait_semaphores = [wait_semaphore];

        let present_info = vk::PresentInfoKHR::default()
            .wait_semaphores(&wait_semaphores)
            .swapchains(&swapchains)
            .image_indices(&image_indices);

        match unsafe { self.swapchain_loader.queue_present(queue, &present_info) } {
            Ok(false) => Ok(SwapchainStatus::Ok(())),
            Ok(true) | Err(vk::Result::SUBOPTIMAL_KHR) => {
                debug!("Present returned SUBOPTIMAL_KHR");
                Ok(SwapchainStatus::Stale)
            }
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => {
                debug!("Present returned ERROR_OUT_OF_DATE_KHR");
                Ok(SwapchainStatus::Stale)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Returns the image format.
    #[inline]
    pub fn format(&self) -> vk::Format {
        self.format
    }

    /// Returns the image extent.
    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    /// Returns the number of images.
    #[inline]
    pub fn image_count(&self) -> u32 {
        self.images.len() as u32
    }

    /// Returns the image at `index`, if any.
    #[inline]
    pub fn image(&self, index: u32) -> Option<vk::Image> {
        self.images.get(index as usize).copied()
    }

    /// Returns the view of the image at `index`, if any.
    #[inline]
    pub fn image_view(&self, index: u32) -> Option<vk::ImageView> {
        self.image_views.get(index as usize).copied()
    }

    fn destroy_image_views(&mut self) {
        for image_view in self.image_views.drain(..) {
            unsafe {
                self.device.handle().destroy_image_view(image_view, None);
            }
        }
    }
}

impl Drop for Swapchain {
    fn drop(&mut self) {
        self.destroy_image_views();
        if self.swapchain != vk::SwapchainKHR::null() {
            unsafe {
                self.swapchain_loader
                    .destroy_swapchain(self.swapchain, None);
            }
            info!(
                "Swapchain destroyed (was {}x{}, {} images)",
                self.extent.width,
                self.extent.height,
                self.images.len()
            );
        }
    }
}

fn choose_surface_format(formats: &[vk::SurfaceFormatKHR]) -> vk::SurfaceFormatKHR {
    const PREFERRED: [vk::Format; 2] = [vk::Format::B8G8R8A8_SRGB, vk::Format::B8G8R8A8_UNORM];

    for wanted in PREFERRED {
        if let Some(&format) = formats.iter().find(|f| {
            f.format == wanted && f.color_space == vk::ColorSpaceKHR::SRGB_NONLINEAR
        }) {
            return format;
        }
    }

    let fallback = formats.first().copied().unwrap_or_default();
    warn!("Using first available surface format: {:?}", fallback.format);
    fallback
}

fn choose_present_mode(present_modes: &[vk::PresentModeKHR]) -> vk::PresentModeKHR {
    if present_modes.contains(&vk::PresentModeKHR::MAILBOX) {
        vk::PresentModeKHR::MAILBOX
    } else {
        // Always available.
        vk::PresentModeKHR::FIFO
    }
}

fn choose_extent(capabilities: &vk::SurfaceCapabilitiesKHR, requested: vk::Extent2D) -> vk::Extent2D {
    if capabilities.current_extent.width != u32::MAX {
        return capabilities.current_extent;
    }

    vk::Extent2D {
        width: requested.width.clamp(
            capabilities.min_image_extent.width,
            capabilities.max_image_extent.width,
        ),
        height: requested.height.clamp(
            capabilities.min_image_extent.height,
            capabilities.max_image_extent.height,
        ),
    }
}

fn determine_image_count(capabilities: &vk::SurfaceCapabilitiesKHR) -> u32 {
    let preferred = capabilities.min_image_count + 1;
    if capabilities.max_image_count > 0 {
        preferred.min(capabilities.max_image_count)
    } else {
        preferred
    }
}

fn create_image_views(
    device: &Device,
    images: &[vk::Image],
    format: vk::Format,
) -> RhiResult<Vec<vk::ImageView>> {
    images
        .iter()
        .map(|&image| {
            let create_info = vk::ImageViewCreateInfo::default()
                .image(image)
                .view_type(vk::ImageViewType::TYPE_2D)
                .format(format)
                .subresource_range(
                    vk::ImageSubresourceRange::default()
                        .aspect_mask(vk::ImageAspectFlags::COLOR)
                        .level_count(1)
                        .layer_count(1),
                );
            unsafe { device.handle().create_image_view(&create_info, None) }.map_err(RhiError::from)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn format(format: vk::Format) -> vk::SurfaceFormatKHR {
        vk::SurfaceFormatKHR {
            format,
            color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
        }
    }

    fn capabilities(current: u32, min: u32, max: u32) -> vk::SurfaceCapabilitiesKHR {
        vk::SurfaceCapabilitiesKHR {
            current_extent: vk::Extent2D {
                width: current,
                height: current,
            },
            min_image_extent: vk::Extent2D {
                width: min,
                height: min,
            },
            max_image_extent: vk::Extent2D {
                width: max,
                height: max,
            },
            ..Default::default()
        }
    }

    #[test]
    fn test_choose_surface_format_prefers_srgb() {
        let formats = [
            format(vk::Format::R8G8B8A8_UNORM),
            format(vk::Format::B8G8R8A8_UNORM),
            format(vk::Format::B8G8R8A8_SRGB),
        ];
        assert_eq!(choose_surface_format(&formats).format, vk::Format::B8G8R8A8_SRGB);
    }

    #[test]
    fn test_choose_surface_format_fallback() {
        let formats = [format(vk::Format::R8G8B8A8_UNORM)];
        assert_eq!(choose_surface_format(&formats).format, vk::Format::R8G8B8A8_UNORM);
    }

    #[test]
    fn test_choose_present_mode() {
        assert_eq!(
            choose_present_mode(&[vk::PresentModeKHR::FIFO, vk::PresentModeKHR::MAILBOX]),
            vk::PresentModeKHR::MAILBOX
        );
        assert_eq!(
            choose_present_mode(&[vk::PresentModeKHR::IMMEDIATE, vk::PresentModeKHR::FIFO]),
            vk::PresentModeKHR::FIFO
        );
    }

    #[test]
    fn test_choose_extent_uses_current() {
        let extent = choose_extent(&capabilities(1080, 1, 4096), vk::Extent2D { width: 800, height: 600 });
        assert_eq!(extent, vk::Extent2D { width: 1080, height: 1080 });
    }

    #[test]
    fn test_choose_extent_clamps_to_limits() {
        let caps = capabilities(u32::MAX, 100, 2000);
        let clamp = |w, h| choose_extent(&caps, vk::Extent2D { width: w, height: h });

        assert_eq!(clamp(3000, 3000), vk::Extent2D { width: 2000, height: 2000 });
        assert_eq!(clamp(50, 50), vk::Extent2D { width: 100, height: 100 });
        assert_eq!(clamp(800, 600), vk::Extent2D { width: 800, height: 600 });
    }

    #[test]
    fn test_determine_image_count() {
        let count = |min, max| {
            determine_image_count(&vk::SurfaceCapabilitiesKHR {
                min_image_count: min,
                max_image_count: max,
                ..Default::default()
            })
        };
        assert_eq!(count(2, 2), 2);
        assert_eq!(count(2, 8), 3);
        assert_eq!(count(2, 0), 3);
    }
}
