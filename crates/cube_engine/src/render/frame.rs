//! Per-tick frame sequencing
//!
//! [`run_frame`] owns the ordering of one tick (wait, acquire, reset, record,
//! submit, present, advance) and the recreate policy. The GPU work behind
//! each step sits behind [`FrameBackend`] so the sequencing can be exercised
//! without a device.
//!
//! Swapchain staleness reported by acquire or present and a host resize are
//! the same trigger: idle the device and rebuild the swapchain. Any other
//! failure abandons the rest of the tick and the loop carries on; the backend
//! gets the abandoned slot back through [`FrameBackend::abandon`].

use crate::render::vulkan::context::VulkanResult;
use crate::render::vulkan::sync::FrameCounter;

/// Result of acquiring a swapchain image
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquireOutcome {
    /// An image is ready to render into
    Acquired {
        /// Index into the swapchain images
        image_index: u32,
        /// The swapchain still works but no longer matches the surface
        suboptimal: bool,
    },
    /// The swapchain can no longer be used
    OutOfDate,
}

/// Result of presenting an image
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresentOutcome {
    /// Queued for display, swapchain still matches the surface
    Presented,
    /// Queued or dropped, but the swapchain is out of date or suboptimal
    Stale,
}

/// What a tick ended up doing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameStatus {
    /// Submitted and presented
    Presented,
    /// The swapchain was rebuilt during the tick
    Recreated,
    /// Abandoned part way; nothing to do until the next tick
    Skipped,
}

/// GPU side of the frame loop
///
/// `slot` is always below `MAX_FRAMES_IN_FLIGHT`.
pub trait FrameBackend {
    /// Whether the swapchain can be acquired from without a rebuild
    fn swapchain_ready(&self) -> bool;

    /// Block until the slot's previous submission has completed
    fn wait_for_slot(&mut self, slot: usize) -> VulkanResult<()>;

    /// Acquire the next image, signaling the slot's image-available semaphore
    fn acquire_image(&mut self, slot: usize) -> VulkanResult<AcquireOutcome>;

    /// Reset the slot's fence and command buffer
    fn reset_slot(&mut self, slot: usize) -> VulkanResult<()>;

    /// Record the scene into the slot's command buffer
    fn record(&mut self, slot: usize, image_index: u32) -> VulkanResult<()>;

    /// Submit the slot's command buffer
    fn submit(&mut self, slot: usize) -> VulkanResult<()>;

    /// Present `image_index` once the slot's rendering finishes
    fn present(&mut self, slot: usize, image_index: u32) -> VulkanResult<PresentOutcome>;

    /// Block until the device has no work left
    fn wait_idle(&mut self) -> VulkanResult<()>;

    /// Rebuild the swapchain for the current surface
    fn recreate_swapchain(&mut self) -> VulkanResult<()>;

    /// Return a slot left part way through a tick to a reusable state
    ///
    /// An image acquired but never presented stays owned by the application,
    /// so the backend must report the swapchain as not ready until it has
    /// been rebuilt.
    fn abandon(&mut self, slot: usize);
}

/// Run one tick of the frame loop
///
/// `resize_requested` is cleared only once a recreate succeeds, so a failed
/// recreate is retried on the next tick. The counter advances as soon as
/// present returns, whatever happens to the swapchain afterwards.
pub fn run_frame<B: FrameBackend + ?Sized>(
    backend: &mut B,
    counter: &mut FrameCounter,
    resize_requested: &mut bool,
) -> FrameStatus {
    let slot = counter.current();
    match try_frame(backend, counter, resize_requested) {
        Ok(status) => status,
        Err(err) => {
            if cfg!(debug_assertions) {
                log::debug!("Skipping frame in slot {}: {}", slot, err);
            }
            backend.abandon(slot);
            FrameStatus::Skipped
        }
    }
}

fn try_frame<B: FrameBackend + ?Sized>(
    backend: &mut B,
    counter: &mut FrameCounter,
    resize_requested: &mut bool,
) -> VulkanResult<FrameStatus> {
    if !backend.swapchain_ready() {
        recreate(backend, resize_requested)?;
        return Ok(FrameStatus::Recreated);
    }

    let slot = counter.current();
    backend.wait_for_slot(slot)?;

    let image_index = match backend.acquire_image(slot)? {
        AcquireOutcome::Acquired { image_index, .. } => image_index,
        AcquireOutcome::OutOfDate => {
            recreate(backend, resize_requested)?;
            return Ok(FrameStatus::Recreated);
        }
    };

    backend.reset_slot(slot)?;
    backend.record(slot, image_index)?;
    backend.submit(slot)?;

    let outcome = backend.present(slot, image_index)?;
    counter.advance();

    if outcome == PresentOutcome::Stale || *resize_requested {
        recreate(backend, resize_requested)?;
        return Ok(FrameStatus::Recreated);
    }
    Ok(FrameStatus::Presented)
}

fn recreate<B: FrameBackend + ?Sized>(backend: &mut B, resize_requested: &mut bool) -> VulkanResult<()> {
    backend.wait_idle()?;
    backend.recreate_swapchain()?;
    *resize_requested = false;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::vulkan::context::VulkanError;
    use crate::render::vulkan::sync::MAX_FRAMES_IN_FLIGHT;
    use ash::vk;

    #[derive(Debug, Clone, PartialEq, Eq)]
    enum Call {
        Wait(usize),
        Acquire(usize),
        Reset(usize),
        Record(usize, u32),
        Submit(usize),
        Present(usize, u32),
        WaitIdle,
        Recreate,
        Abandon(usize),
    }

    /// Scripted backend; unscripted steps succeed
    #[derive(Default)]
    struct MockBackend {
        calls: Vec<Call>,
        acquire_script: Vec<VulkanResult<AcquireOutcome>>,
        present_script: Vec<PresentOutcome>,
        fail_record: bool,
        fail_submit: bool,
        fail_recreate: bool,
        next_image: u32,
        holding_image: bool,
        stale: bool,
    }

    impl MockBackend {
        fn count(&self, wanted: &Call) -> usize {
            self.calls.iter().filter(|call| *call == wanted).count()
        }

        fn has_submit_or_present(&self) -> bool {
            self.calls
                .iter()
                .any(|call| matches!(call, Call::Submit(_) | Call::Present(..)))
        }
    }

    impl FrameBackend for MockBackend {
        fn swapchain_ready(&self) -> bool {
            !self.stale
        }

        fn wait_for_slot(&mut self, slot: usize) -> VulkanResult<()> {
            self.calls.push(Call::Wait(slot));
            Ok(())
        }

        fn acquire_image(&mut self, slot: usize) -> VulkanResult<AcquireOutcome> {
            self.calls.push(Call::Acquire(slot));
            let outcome = if self.acquire_script.is_empty() {
                let image_index = self.next_image;
                self.next_image = (self.next_image + 1) % 3;
                Ok(AcquireOutcome::Acquired {
                    image_index,
                    suboptimal: false,
                })
            } else {
                self.acquire_script.remove(0)
            };
            match outcome {
                Ok(AcquireOutcome::Acquired { .. }) => self.holding_image = true,
                Ok(AcquireOutcome::OutOfDate) => self.stale = true,
                Err(_) => {}
            }
            outcome
        }

        fn reset_slot(&mut self, slot: usize) -> VulkanResult<()> {
            self.calls.push(Call::Reset(slot));
            Ok(())
        }

        fn record(&mut self, slot: usize, image_index: u32) -> VulkanResult<()> {
            self.calls.push(Call::Record(slot, image_index));
            if self.fail_record {
                return Err(VulkanError::Api(vk::Result::ERROR_OUT_OF_DEVICE_MEMORY));
            }
            Ok(())
        }

        fn submit(&mut self, slot: usize) -> VulkanResult<()> {
            self.calls.push(Call::Submit(slot));
            if self.fail_submit {
                return Err(VulkanError::Api(vk::Result::ERROR_DEVICE_LOST));
            }
            self.holding_image = false;
            Ok(())
        }

        fn present(&mut self, slot: usize, image_index: u32) -> VulkanResult<PresentOutcome> {
            self.calls.push(Call::Present(slot, image_index));
            let outcome = if self.present_script.is_empty() {
                PresentOutcome::Presented
            } else {
                self.present_script.remove(0)
            };
            if outcome == PresentOutcome::Stale {
                self.stale = true;
            }
            Ok(outcome)
        }

        fn wait_idle(&mut self) -> VulkanResult<()> {
            self.calls.push(Call::WaitIdle);
            Ok(())
        }

        fn recreate_swapchain(&mut self) -> VulkanResult<()> {
            self.calls.push(Call::Recreate);
            if self.fail_recreate {
                return Err(VulkanError::Api(vk::Result::ERROR_SURFACE_LOST_KHR));
            }
            self.stale = false;
            Ok(())
        }

        fn abandon(&mut self, slot: usize) {
            self.calls.push(Call::Abandon(slot));
            if self.holding_image {
                self.holding_image = false;
                self.stale = true;
            }
        }
    }

    #[test]
    fn test_happy_path_order() {
        let mut backend = MockBackend::default();
        let mut counter = FrameCounter::new();
        let mut resized = false;

        assert_eq!(run_frame(&mut backend, &mut counter, &mut resized), FrameStatus::Presented);
        assert_eq!(
            backend.calls,
            vec![
                Call::Wait(0),
                Call::Acquire(0),
                Call::Reset(0),
                Call::Record(0, 0),
                Call::Submit(0),
                Call::Present(0, 0),
            ]
        );
        assert_eq!(counter.current(), 1);
    }

    #[test]
    fn test_out_of_date_acquire_skips_submit_and_recreates() {
        let mut backend = MockBackend {
            acquire_script: vec![Ok(AcquireOutcome::OutOfDate)],
            ..Default::default()
        };
        let mut counter = FrameCounter::new();
        let mut resized = false;

        assert_eq!(run_frame(&mut backend, &mut counter, &mut resized), FrameStatus::Recreated);
        assert!(!backend.has_submit_or_present());
        assert_eq!(backend.calls.last(), Some(&Call::Recreate));
        assert_eq!(counter.current(), 0);

        // the next tick acquires against the rebuilt swapchain
        backend.calls.clear();
        run_frame(&mut backend, &mut counter, &mut resized);
        assert_eq!(backend.calls[1], Call::Acquire(0));
        assert!(backend.has_submit_or_present());
    }

    #[test]
    fn test_stale_present_recreates_after_present() {
        let mut backend = MockBackend {
            present_script: vec![PresentOutcome::Stale],
            ..Default::default()
        };
        let mut counter = FrameCounter::new();
        let mut resized = false;

        assert_eq!(run_frame(&mut backend, &mut counter, &mut resized), FrameStatus::Recreated);
        assert_eq!(
            &backend.calls[5..],
            &[Call::Present(0, 0), Call::WaitIdle, Call::Recreate]
        );
        assert_eq!(counter.current(), 1);
    }

    #[test]
    fn test_resize_flag_cleared_only_after_recreate() {
        let mut backend = MockBackend {
            fail_recreate: true,
            ..Default::default()
        };
        let mut counter = FrameCounter::new();
        let mut resized = true;

        assert_eq!(run_frame(&mut backend, &mut counter, &mut resized), FrameStatus::Skipped);
        assert!(resized);

        backend.fail_recreate = false;
        assert_eq!(run_frame(&mut backend, &mut counter, &mut resized), FrameStatus::Recreated);
        assert!(!resized);
    }

    #[test]
    fn test_acquire_error_skips_frame() {
        let mut backend = MockBackend {
            acquire_script: vec![Err(VulkanError::Api(vk::Result::ERROR_DEVICE_LOST))],
            ..Default::default()
        };
        let mut counter = FrameCounter::new();
        let mut resized = false;

        assert_eq!(run_frame(&mut backend, &mut counter, &mut resized), FrameStatus::Skipped);
        assert_eq!(backend.calls, vec![Call::Wait(0), Call::Acquire(0), Call::Abandon(0)]);
        assert!(backend.swapchain_ready());
    }

    #[test]
    fn test_submit_error_skips_present() {
        let mut backend = MockBackend {
            fail_submit: true,
            ..Default::default()
        };
        let mut counter = FrameCounter::new();
        let mut resized = false;

        assert_eq!(run_frame(&mut backend, &mut counter, &mut resized), FrameStatus::Skipped);
        assert!(!backend.calls.iter().any(|call| matches!(call, Call::Present(..))));
        assert_eq!(counter.current(), 0);
    }

    #[test]
    fn test_each_wait_is_followed_by_one_reset_and_record() {
        let mut backend = MockBackend {
            acquire_script: vec![
                Ok(AcquireOutcome::Acquired {
                    image_index: 0,
                    suboptimal: false,
                }),
                Ok(AcquireOutcome::OutOfDate),
            ],
            ..Default::default()
        };
        let mut counter = FrameCounter::new();
        let mut resized = false;
        for _ in 0..9 {
            run_frame(&mut backend, &mut counter, &mut resized);
        }

        for slot in 0..MAX_FRAMES_IN_FLIGHT {
            let mut resets_since_wait: Option<usize> = None;
            for call in &backend.calls {
                match call {
                    Call::Wait(s) if *s == slot => {
                        if let Some(resets) = resets_since_wait {
                            assert!(resets <= 1);
                        }
                        resets_since_wait = Some(0);
                    }
                    Call::Reset(s) if *s == slot => {
                        let resets = resets_since_wait.get_or_insert(0);
                        *resets += 1;
                        assert_eq!(*resets, 1, "slot {} reset twice without a wait", slot);
                    }
                    Call::Submit(s) if *s == slot => {
                        assert_eq!(resets_since_wait, Some(1), "slot {} submitted without a reset", slot);
                    }
                    _ => {}
                }
            }
        }
        assert_eq!(backend.count(&Call::Recreate), 1);
    }

    #[test]
    fn test_slot_after_k_presented_frames_is_k_mod_two() {
        let mut backend = MockBackend::default();
        let mut counter = FrameCounter::new();
        let mut resized = false;
        for k in 0..11 {
            assert_eq!(counter.current(), k % 2);
            assert_eq!(run_frame(&mut backend, &mut counter, &mut resized), FrameStatus::Presented);
        }
    }

    #[test]
    fn test_presented_frame_advances_even_if_recreate_fails() {
        let mut backend = MockBackend {
            present_script: vec![PresentOutcome::Stale],
            fail_recreate: true,
            ..Default::default()
        };
        let mut counter = FrameCounter::new();
        let mut resized = true;

        assert_eq!(run_frame(&mut backend, &mut counter, &mut resized), FrameStatus::Skipped);
        assert_eq!(backend.count(&Call::Present(0, 0)), 1);
        assert_eq!(counter.current(), 1);
        assert!(resized);

        // the swapchain is still stale, so the next tick retries the rebuild first
        backend.calls.clear();
        backend.fail_recreate = false;
        assert_eq!(run_frame(&mut backend, &mut counter, &mut resized), FrameStatus::Recreated);
        assert_eq!(backend.calls, vec![Call::WaitIdle, Call::Recreate]);
        assert!(!resized);
        assert_eq!(counter.current(), 1);
    }

    #[test]
    fn test_failed_record_rebuilds_swapchain_before_next_acquire() {
        let mut backend = MockBackend {
            fail_record: true,
            ..Default::default()
        };
        let mut counter = FrameCounter::new();
        let mut resized = false;

        assert_eq!(run_frame(&mut backend, &mut counter, &mut resized), FrameStatus::Skipped);
        assert_eq!(backend.calls.last(), Some(&Call::Abandon(0)));
        assert!(!backend.has_submit_or_present());
        assert_eq!(counter.current(), 0);

        backend.calls.clear();
        backend.fail_record = false;
        assert_eq!(run_frame(&mut backend, &mut counter, &mut resized), FrameStatus::Recreated);
        assert_eq!(backend.calls, vec![Call::WaitIdle, Call::Recreate]);

        backend.calls.clear();
        assert_eq!(run_frame(&mut backend, &mut counter, &mut resized), FrameStatus::Presented);
        assert_eq!(backend.calls[1], Call::Acquire(0));
    }
}
