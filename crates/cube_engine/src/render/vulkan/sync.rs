//! Vulkan synchronization primitives for GPU/CPU coordination
//!
//! Each in-flight frame owns one slot of synchronization objects:
//!
//! ```text
//! acquire ──signals──▶ image_available ──waited by──▶ submit
//! submit  ──signals──▶ render_finished ──waited by──▶ present
//! submit  ──signals──▶ in_flight fence ──waited by──▶ CPU, before reusing the slot
//! ```
//!
//! Fences start signaled so the very first wait on a slot returns at once.
//! The slot count is [`MAX_FRAMES_IN_FLIGHT`]; command buffers and descriptor
//! sets are allocated from the same constant so every per-frame array stays
//! the same length.

use ash::{vk, Device};

use crate::render::vulkan::context::{VulkanError, VulkanResult};

/// Number of frames the CPU may record ahead of the GPU
pub const MAX_FRAMES_IN_FLIGHT: usize = 2;

/// Rotating index over the in-flight slots
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FrameCounter {
    current: usize,
}

impl FrameCounter {
    /// Start at slot zero
    pub fn new() -> Self {
        Self::default()
    }

    /// Slot used by the frame being built
    pub fn current(self) -> usize {
        self.current
    }

    /// Move to the next slot, wrapping at [`MAX_FRAMES_IN_FLIGHT`]
    pub fn advance(&mut self) {
        self.current = (self.current + 1) % MAX_FRAMES_IN_FLIGHT;
    }
}

/// Binary semaphore for GPU-GPU ordering
pub struct Semaphore {
    device: Device,
    semaphore: vk::Semaphore,
}

impl Semaphore {
    /// Create a new, unsignaled semaphore
    pub fn new(device: Device) -> VulkanResult<Self> {
        let create_info = vk::SemaphoreCreateInfo::builder();

        let semaphore = unsafe { device.create_semaphore(&create_info, None).map_err(VulkanError::Api)? };

        Ok(Self { device, semaphore })
    }

    /// Get the semaphore handle
    pub fn handle(&self) -> vk::Semaphore {
        self.semaphore
    }
}

impl Drop for Semaphore {
    fn drop(&mut self) {
        if self.semaphore != vk::Semaphore::null() {
            unsafe { self.device.destroy_semaphore(self.semaphore, None) };
            self.semaphore = vk::Semaphore::null();
        }
    }
}

/// Fence wrapper with RAII cleanup
pub struct Fence {
    device: Device,
    fence: vk::Fence,
}

impl Fence {
    /// Create a new fence
    pub fn new(device: Device, signaled: bool) -> VulkanResult<Self> {
        let flags = if signaled {
            vk::FenceCreateFlags::SIGNALED
        } else {
            vk::FenceCreateFlags::empty()
        };

        let create_info = vk::FenceCreateInfo::builder().flags(flags);

        let fence = unsafe { device.create_fence(&create_info, None).map_err(VulkanError::Api)? };

        Ok(Self { device, fence })
    }

    /// Block until the fence is signaled or `timeout` nanoseconds pass
    pub fn wait(&self, timeout: u64) -> VulkanResult<()> {
        unsafe {
            self.device
                .wait_for_fences(&[self.fence], true, timeout)
                .map_err(VulkanError::Api)
        }
    }

    /// Return the fence to the unsignaled state
    pub fn reset(&self) -> VulkanResult<()> {
        unsafe { self.device.reset_fences(&[self.fence]).map_err(VulkanError::Api) }
    }

    /// Get the fence handle
    pub fn handle(&self) -> vk::Fence {
        self.fence
    }
}

impl Drop for Fence {
    fn drop(&mut self) {
        if self.fence != vk::Fence::null() {
            unsafe { self.device.destroy_fence(self.fence, None) };
            self.fence = vk::Fence::null();
        }
    }
}

/// Synchronization objects for one in-flight frame
pub struct FrameSync {
    /// Signaled by acquire, waited on by submit
    pub image_available: Semaphore,
    /// Signaled by submit, waited on by present
    pub render_finished: Semaphore,
    /// Signaled when the slot's submission completes
    pub in_flight: Fence,
}

impl FrameSync {
    /// Create frame synchronization objects; the fence starts signaled
    pub fn new(device: &Device) -> VulkanResult<Self> {
        Ok(Self {
            image_available: Semaphore::new(device.clone())?,
            render_finished: Semaphore::new(device.clone())?,
            in_flight: Fence::new(device.clone(), true)?,
        })
    }
}

/// Owns every in-flight slot and tracks which one is active
pub struct SyncManager {
    frames: Vec<FrameSync>,
    counter: FrameCounter,
}

impl SyncManager {
    /// Create [`MAX_FRAMES_IN_FLIGHT`] slots
    ///
    /// If any object fails to create, the ones already built are dropped.
    pub fn new(device: &Device) -> VulkanResult<Self> {
        let frames = (0..MAX_FRAMES_IN_FLIGHT)
            .map(|_| FrameSync::new(device))
            .collect::<VulkanResult<Vec<_>>>()?;

        log::debug!("Created {} frame sync slots", frames.len());
        Ok(Self {
            frames,
            counter: FrameCounter::new(),
        })
    }

    /// Index of the active slot
    pub fn current_frame(&self) -> usize {
        self.counter.current()
    }

    /// Sync objects of slot `index`
    pub fn frame(&self, index: usize) -> &FrameSync {
        &self.frames[index]
    }

    /// Copy of the rotation, for driving a tick
    pub fn counter(&self) -> FrameCounter {
        self.counter
    }

    /// Advance to the next slot
    pub fn advance(&mut self) {
        self.counter.advance();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counter_starts_at_zero() {
        assert_eq!(FrameCounter::new().current(), 0);
    }

    #[test]
    fn test_counter_index_is_frames_mod_slot_count() {
        let mut counter = FrameCounter::new();
        for k in 0..17 {
            assert_eq!(counter.current(), k % MAX_FRAMES_IN_FLIGHT);
            counter.advance();
        }
    }

    #[test]
    fn test_double_buffering() {
        assert_eq!(MAX_FRAMES_IN_FLIGHT, 2);
    }
}
