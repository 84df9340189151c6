//! Synchronization primitives for Vulkan.
//!
//! # Overview
//!
//! - [`Semaphore`] orders queue operations on the GPU (acquire, render, present)
//! - [`Fence`] lets the host wait for submitted work to finish
//!
//! A signalled frame fence is the only proof the renderer accepts that a
//! command buffer, and every resource it referenced, is no longer in use.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use forge_rhi::device::Device;
//! use forge_rhi::sync::{Fence, Semaphore};
//!
//! # fn example(device: Arc<Device>) -> Result<(), forge_rhi::RhiError> {
//! // One frame slot: an acquire semaphore, a render semaphore and a fence.
//! let image_available = Semaphore::new(device.clone())?;
//! let render_finished = Semaphore::new(device.clone())?;
//! let in_flight = Fence::new(device, true)?;
//!
//! // Wait for the previous use of this slot, then re-arm it.
//! in_flight.wait(u64::MAX)?;
//! in_flight.reset()?;
//! # let _ = (image_available, render_finished);
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use ash::vk;
use tracing::{debug, trace};

use crate::device::Device;
use crate::error::{RhiError, RhiResult};

/// Vulkan semaphore wrapper.
///
/// Created unsignalled. A semaphore is signalled by one queue operation and
/// waited on by exactly one other before it can be signalled again.
///
/// # Thread Safety
///
/// Immutable after creation, so it can be shared between threads. Queue
/// access itself still has to be externally synchronized.
pub struct Semaphore {
    /// Device that owns the semaphore.
    device: Arc<Device>,
    /// Vulkan semaphore handle.
    semaphore: vk::Semaphore,
}

impl Semaphore {
    /// Creates a binary semaphore in the unsignalled state.
    ///
    /// # Arguments
    ///
    /// * `device` - The logical device
    ///
    /// # Errors
    ///
    /// Returns an error if semaphore creation fails.
    ///
    /// # Example
    ///
    /// ```no_run
    /// # use std::sync::Arc;
    /// # use forge_rhi::device::Device;
    /// use forge_rhi::sync::Semaphore;
    ///
    /// # fn example(device: Arc<Device>) -> Result<(), forge_rhi::RhiError> {
    /// let semaphore = Semaphore::new(device)?;
    /// let handle = semaphore.handle();
    /// # let _ = handle;
    /// # Ok(())
    /// # }
    /// ```
    pub fn new(device: Arc<Device>) -> RhiResult<Self> {
        let create_info = vk::SemaphoreCreateInfo::default();
        let semaphore = unsafe { device.handle().create_semaphore(&create_info, None)? };

        trace!("Created semaphore {:?}", semaphore);

        Ok(Self { device, semaphore })
    }

    /// Returns the Vulkan semaphore handle.
    #[inline]
    pub fn handle(&self) -> vk::Semaphore {
        self.semaphore
    }
}

impl Drop for Semaphore {
    fn drop(&mut self) {
        unsafe {
            self.device.handle().destroy_semaphore(self.semaphore, None);
        }
        trace!("Destroyed semaphore {:?}", self.semaphore);
    }
}

/// Vulkan fence wrapper.
///
/// A fence is signalled by the GPU when a queue submission completes and is
/// waited on and reset by the host.
///
/// # Thread Safety
///
/// Waiting and status queries may happen from any thread. [`Fence::reset`]
/// must not race with a submission that signals the same fence.
pub struct Fence {
    /// Device that owns the fence.
    device: Arc<Device>,
    /// Vulkan fence handle.
    fence: vk::Fence,
}

impl Fence {
    /// Creates a fence, optionally already signalled.
    ///
    /// Frame fences start signalled so the first wait on a fresh frame context
    /// returns immediately.
    ///
    /// # Arguments
    ///
    /// * `device` - The logical device
    /// * `signaled` - Whether the fence starts in the signalled state
    ///
    /// # Errors
    ///
    /// Returns an error if fence creation fails.
    ///
    /// # Example
    ///
    /// ```no_run
    /// # use std::sync::Arc;
    /// # use forge_rhi::device::Device;
    /// use forge_rhi::sync::Fence;
    ///
    /// # fn example(device: Arc<Device>) -> Result<(), forge_rhi::RhiError> {
    /// let fence = Fence::new(device, true)?;
    /// assert!(fence.is_signaled());
    /// # Ok(())
    /// # }
    /// ```
    pub fn new(device: Arc<Device>, signaled: bool) -> RhiResult<Self> {
        let flags = if signaled {
            vk::FenceCreateFlags::SIGNALED
        } else {
            vk::FenceCreateFlags::empty()
        };
        let create_info = vk::FenceCreateInfo::default().flags(flags);
        let fence = unsafe { device.handle().create_fence(&create_info, None)? };

        debug!(
            "Created fence ({})",
            if signaled { "signaled" } else { "unsignaled" }
        );

        Ok(Self { device, fence })
    }

    /// Returns the Vulkan fence handle.
    #[inline]
    pub fn handle(&self) -> vk::Fence {
        self.fence
    }

    /// Blocks until the fence is signalled or `timeout` nanoseconds pass.
    ///
    /// # Arguments
    ///
    /// * `timeout` - Timeout in nanoseconds; `u64::MAX` waits forever
    ///
    /// # Errors
    ///
    /// [`RhiError::FenceTimeout`] when the timeout expires, otherwise the
    /// Vulkan error reported by the wait.
    pub fn wait(&self, timeout: u64) -> RhiResult<()> {
        let fences = [self.fence];
        match unsafe { self.device.handle().wait_for_fences(&fences, true, timeout) } {
            Ok(()) => Ok(()),
            Err(vk::Result::TIMEOUT) => Err(RhiError::FenceTimeout(timeout)),
            Err(e) => Err(e.into()),
        }
    }

    /// Returns the fence to the unsignalled state. The fence must not be
    /// pending on any queue.
    ///
    /// A reset fence has to be handed to a submission before anyone waits on
    /// it again, otherwise that wait never returns.
    ///
    /// # Errors
    ///
    /// Returns an error if the reset fails.
    pub fn reset(&self) -> RhiResult<()> {
        let fences = [self.fence];
        unsafe { self.device.handle().reset_fences(&fences)? };
        Ok(())
    }

    /// Non-blocking status query.
    pub fn is_signaled(&self) -> bool {
        let result = unsafe { self.device.handle().get_fence_status(self.fence) };
        matches!(result, Ok(true))
    }
}

impl Drop for Fence {
    fn drop(&mut self) {
        unsafe {
            self.device.handle().destroy_fence(self.fence, None);
        }
        trace!("Destroyed fence {:?}", self.fence);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_send_sync<T: Send + Sync>() {}

    #[test]
    fn test_semaphore_is_send_sync() {
        assert_send_sync::<Semaphore>();
    }

    #[test]
    fn test_fence_is_send_sync() {
        assert_send_sync::<Fence>();
    }
}
