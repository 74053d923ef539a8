//! Synchronization primitives.
//!
//! - [`Semaphore`]: GPU-to-GPU ordering between queue submissions
//! - [`Fence`]: GPU-to-CPU completion signal
//! - [`FrameSlot`]: the semaphore pair and fence owned by one frame in flight
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use vbparts_rhi::device::Device;
//! use vbparts_rhi::sync::{FrameSlot, MAX_FRAMES_IN_FLIGHT, next_frame};
//!
//! # fn example(device: Arc<Device>) -> Result<(), vbparts_rhi::RhiError> {
//! let slots = (0..MAX_FRAMES_IN_FLIGHT)
//!     .map(|_| FrameSlot::new(device.clone()))
//!     .collect::<Result<Vec<_>, _>>()?;
//!
//! let mut current = 0;
//! slots[current].in_flight().wait(u64::MAX)?;
//! // ... acquire, submit, present ...
//! current = next_frame(current);
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use ash::vk;
use tracing::debug;

use crate::device::Device;
use crate::error::RhiResult;

/// Number of frames the CPU may record ahead of the GPU.
pub const MAX_FRAMES_IN_FLIGHT: usize = 3;

/// Index of the slot following `current`.
#[inline]
pub const fn next_frame(current: usize) -> usize {
    (current + 1) % MAX_FRAMES_IN_FLIGHT
}

/// Vulkan semaphore wrapper.
pub struct Semaphore {
    device: Arc<Device>,
    semaphore: vk::Semaphore,
}

impl Semaphore {
    /// Creates an unsignaled binary semaphore.
    ///
    /// # Errors
    ///
    /// Returns an error if semaphore creation fails.
    pub fn new(device: Arc<Device>) -> RhiResult<Self> {
        let create_info = vk::SemaphoreCreateInfo::default();
        let semaphore = unsafe { device.handle().create_semaphore(&create_info, None)? };
        Ok(Self { device, semaphore })
    }

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
    }
}

/// Vulkan fence wrapper.
pub struct Fence {
    device: Arc<Device>,
    fence: vk::Fence,
}

impl Fence {
    /// Creates a fence.
    ///
    /// # Arguments
    ///
    /// * `device` - The logical device
    /// * `signaled` - Start signaled so the first wait returns immediately
    ///
    /// # Errors
    ///
    /// Returns an error if fence creation fails.
    pub fn new(device: Arc<Device>, signaled: bool) -> RhiResult<Self> {
        let flags = if signaled {
            vk::FenceCreateFlags::SIGNALED
        } else {
            vk::FenceCreateFlags::empty()
        };
        let create_info = vk::FenceCreateInfo::default().flags(flags);
        let fence = unsafe { device.handle().create_fence(&create_info, None)? };
        Ok(Self { device, fence })
    }

    #[inline]
    pub fn handle(&self) -> vk::Fence {
        self.fence
    }

    /// Blocks until the fence is signaled or `timeout` nanoseconds pass.
    ///
    /// # Errors
    ///
    /// Returns `vk::Result::TIMEOUT` wrapped in an error on timeout, or any
    /// other failure (including device loss).
    pub fn wait(&self, timeout: u64) -> RhiResult<()> {
        unsafe {
            self.device
                .handle()
                .wait_for_fences(&[self.fence], true, timeout)?
        };
        Ok(())
    }

    /// Returns the fence to the unsignaled state.
    ///
    /// # Errors
    ///
    /// Returns an error if the reset fails.
    pub fn reset(&self) -> RhiResult<()> {
        unsafe { self.device.handle().reset_fences(&[self.fence])? };
        Ok(())
    }
}

impl Drop for Fence {
    fn drop(&mut self) {
        unsafe {
            self.device.handle().destroy_fence(self.fence, None);
        }
    }
}

/// Synchronization objects owned by one frame-in-flight slot.
///
/// ```text
/// 1. wait in_flight            (slot's previous GPU work done)
/// 2. acquire                   -> signals image_available
/// 3. reset in_flight, submit   waits image_available, signals render_finished + in_flight
/// 4. present                   waits render_finished
/// ```
pub struct FrameSlot {
    image_available: Semaphore,
    render_finished: Semaphore,
    in_flight: Fence,
}

impl FrameSlot {
    /// Creates both semaphores and a signaled fence.
    ///
    /// # Errors
    ///
    /// Returns an error if any object creation fails.
    pub fn new(device: Arc<Device>) -> RhiResult<Self> {
        let slot = Self {
            image_available: Semaphore::new(device.clone())?,
            render_finished: Semaphore::new(device.clone())?,
            in_flight: Fence::new(device, true)?,
        };
        debug!("Created frame slot");
        Ok(slot)
    }

    #[inline]
    pub fn image_available(&self) -> &Semaphore {
        &self.image_available
    }

    #[inline]
    pub fn render_finished(&self) -> &Semaphore {
        &self.render_finished
    }

    #[inline]
    pub fn in_flight(&self) -> &Fence {
        &self.in_flight
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_three_frames_in_flight() {
        assert_eq!(MAX_FRAMES_IN_FLIGHT, 3);
    }

    #[test]
    fn test_next_frame_wraps() {
        assert_eq!(next_frame(0), 1);
        assert_eq!(next_frame(1), 2);
        assert_eq!(next_frame(2), 0);

        let mut slot = 0;
        for _ in 0..MAX_FRAMES_IN_FLIGHT {
            slot = next_frame(slot);
        }
        assert_eq!(slot, 0);
    }

    #[test]
    fn test_sync_types_are_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Semaphore>();
        assert_send_sync::<Fence>();
        assert_send_sync::<FrameSlot>();
    }
}
