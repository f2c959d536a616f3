//! Synchronization primitives for Vulkan.
//!
//! This module provides wrappers for the objects the frame loop synchronizes with:
//! - [`Semaphore`] - GPU-to-GPU ordering between queue operations
//! - [`Fence`] - GPU-to-CPU signal for host waiting
//! - [`FrameSync`] - the semaphore pair and fence owned by one frame slot
//!
//! Every wrapper owns exactly one handle. The handle is released by
//! [`Fence::destroy`] / [`Semaphore::destroy`] or, at the latest, on drop.
//! A released wrapper holds a null handle and further destroy calls are no-ops.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use vkframe_rhi::device::Device;
//! use vkframe_rhi::sync::{Fence, Semaphore};
//!
//! # fn example(device: Arc<Device>) -> Result<(), vkframe_rhi::RhiError> {
//! let image_available = Semaphore::new(device.clone())?;
//! let in_flight = Fence::new(device, true)?;
//!
//! in_flight.wait(u64::MAX)?;
//! in_flight.reset()?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use ash::vk;
use tracing::{debug, error};

use crate::device::Device;
use crate::error::{RhiError, RhiResult};

/// Vulkan semaphore wrapper.
///
/// Used to order presentation after rendering and rendering after image
/// acquisition. Semaphores are created unsignaled.
pub struct Semaphore {
    device: Arc<Device>,
    semaphore: vk::Semaphore,
}

impl Semaphore {
    /// Creates a new unsignaled semaphore.
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::Creation`] if the driver rejects the request.
    pub fn new(device: Arc<Device>) -> RhiResult<Self> {
        let create_info = vk::SemaphoreCreateInfo::default();

        let semaphore = unsafe { device.handle().create_semaphore(&create_info, None) }
            .map_err(|result| {
                error!("Semaphore::new: failed to create semaphore: {:?}", result);
                RhiError::Creation {
                    object: "semaphore",
                    result,
                }
            })?;

        debug!("Created semaphore");

        Ok(Self { device, semaphore })
    }

    /// Returns the Vulkan semaphore handle.
    #[inline]
    pub fn handle(&self) -> vk::Semaphore {
        self.semaphore
    }

    /// Returns true once the handle has been released.
    #[inline]
    pub fn is_destroyed(&self) -> bool {
        self.semaphore == vk::Semaphore::null()
    }

    /// Releases the semaphore. Calling this on a released semaphore does nothing.
    pub fn destroy(&mut self) {
        if self.is_destroyed() {
            return;
        }
        unsafe {
            self.device.handle().destroy_semaphore(self.semaphore, None);
        }
        self.semaphore = vk::Semaphore::null();
        debug!("Destroyed semaphore");
    }
}

impl Drop for Semaphore {
    fn drop(&mut self) {
        self.destroy();
    }
}

/// Vulkan fence wrapper.
///
/// Fences let the host block until submitted GPU work has completed. The
/// frame loop waits on a slot's fence before it touches anything the slot's
/// previous submission may still be reading.
pub struct Fence {
    device: Arc<Device>,
    fence: vk::Fence,
}

impl Fence {
    /// Creates a new fence.
    ///
    /// # Arguments
    ///
    /// * `device` - The logical device
    /// * `signaled` - If true, the fence starts signaled so the first wait on
    ///   it returns immediately.
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::Creation`] if the driver rejects the request.
    pub fn new(device: Arc<Device>, signaled: bool) -> RhiResult<Self> {
        let flags = if signaled {
            vk::FenceCreateFlags::SIGNALED
        } else {
            vk::FenceCreateFlags::empty()
        };

        let create_info = vk::FenceCreateInfo::default().flags(flags);

        let fence = unsafe { device.handle().create_fence(&create_info, None) }.map_err(
            |result| {
                error!("Fence::new: failed to create fence: {:?}", result);
                RhiError::Creation {
                    object: "fence",
                    result,
                }
            },
        )?;

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

    /// Blocks until the fence is signaled or `timeout` nanoseconds elapse.
    ///
    /// Pass `u64::MAX` for an unbounded wait.
    ///
    /// # Errors
    ///
    /// Returns an error if the wait times out or the device is lost.
    pub fn wait(&self, timeout: u64) -> RhiResult<()> {
        let fences = [self.fence];
        unsafe {
            self.device
                .handle()
                .wait_for_fences(&fences, true, timeout)?
        };
        Ok(())
    }

    /// Resets the fence to the unsignaled state.
    ///
    /// The fence must not be pending on any queue when this is called.
    pub fn reset(&self) -> RhiResult<()> {
        let fences = [self.fence];
        unsafe { self.device.handle().reset_fences(&fences)? };
        Ok(())
    }

    /// Returns true once the handle has been released.
    #[inline]
    pub fn is_destroyed(&self) -> bool {
        self.fence == vk::Fence::null()
    }

    /// Releases the fence. Calling this on a released fence does nothing.
    pub fn destroy(&mut self) {
        if self.is_destroyed() {
            return;
        }
        unsafe {
            self.device.handle().destroy_fence(self.fence, None);
        }
        self.fence = vk::Fence::null();
        debug!("Destroyed fence");
    }
}

impl Drop for Fence {
    fn drop(&mut self) {
        self.destroy();
    }
}

/// Synchronization objects owned by a single frame slot.
///
/// ```text
/// 1. wait in_flight_fence          (previous use of this slot has finished)
/// 2. acquire image                 (signals image_available)
/// 3. reset in_flight_fence, submit (waits image_available, signals render_finished + fence)
/// 4. present                       (waits render_finished)
/// ```
///
/// Slots are sized by the number of frames in flight, not by the number of
/// swapchain images, so they survive swapchain recreation untouched.
pub struct FrameSync {
    image_available_semaphore: Semaphore,
    render_finished_semaphore: Semaphore,
    in_flight_fence: Fence,
}

impl FrameSync {
    /// Creates the semaphore pair and fence for one frame slot.
    ///
    /// The fence starts signaled so the first wait on a fresh slot does not
    /// block forever.
    pub fn new(device: Arc<Device>) -> RhiResult<Self> {
        let image_available_semaphore = Semaphore::new(device.clone())?;
        let render_finished_semaphore = Semaphore::new(device.clone())?;
        let in_flight_fence = Fence::new(device, true)?;

        debug!("Created frame slot synchronization");

        Ok(Self {
            image_available_semaphore,
            render_finished_semaphore,
            in_flight_fence,
        })
    }

    #[inline]
    pub fn image_available_semaphore(&self) -> &Semaphore {
        &self.image_available_semaphore
    }

    #[inline]
    pub fn render_finished_semaphore(&self) -> &Semaphore {
        &self.render_finished_semaphore
    }

    #[inline]
    pub fn in_flight_fence(&self) -> &Fence {
        &self.in_flight_fence
    }

    /// Returns the raw Vulkan handle for the image available semaphore.
    #[inline]
    pub fn image_available_handle(&self) -> vk::Semaphore {
        self.image_available_semaphore.handle()
    }

    /// Returns the raw Vulkan handle for the render finished semaphore.
    #[inline]
    pub fn render_finished_handle(&self) -> vk::Semaphore {
        self.render_finished_semaphore.handle()
    }

    /// Returns the raw Vulkan handle for the in-flight fence.
    #[inline]
    pub fn in_flight_fence_handle(&self) -> vk::Fence {
        self.in_flight_fence.handle()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_semaphore_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Semaphore>();
    }

    #[test]
    fn test_fence_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Fence>();
    }

    #[test]
    fn test_frame_sync_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<FrameSync>();
    }

    #[test]
    fn test_null_handles_read_as_destroyed() {
        // The sentinel the destroy guard relies on.
        assert_eq!(vk::Fence::null(), vk::Fence::default());
        assert_eq!(vk::Semaphore::null(), vk::Semaphore::default());
    }
}
