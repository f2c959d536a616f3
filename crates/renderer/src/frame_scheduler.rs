//! Frame pacing and swapchain recovery.
//!
//! The [`FrameScheduler`] owns the frame slots and drives one frame at a time
//! through the following steps:
//!
//! ```text
//! wait slot fence -> acquire -> wait image's previous slot -> update uniforms
//!     -> reset fence + submit -> present -> advance slot
//! ```
//!
//! Everything that actually talks to the GPU sits behind [`FrameBackend`] and
//! [`FrameSlot`], so the ordering rules can be exercised without a device.
//!
//! A stale surface is never an error here. An out-of-date acquire drops the
//! frame and rebuilds the swapchain before returning; an out-of-date or
//! suboptimal present, or a pending resize notification, rebuilds it after the
//! frame has been queued. A zero-sized (minimized) window defers the rebuild
//! until the next frame that finds a usable size.

use ash::vk;
use tracing::{debug, error, info};

use vkframe_rhi::sync::FrameSync;
use vkframe_rhi::{RhiError, RhiResult};

/// The in-flight fence of one frame slot, as seen by the scheduler.
pub trait FrameSlot {
    /// Blocks until the slot's last submission has completed.
    fn wait(&self) -> RhiResult<()>;

    /// Returns the fence to the unsignaled state ahead of a submission.
    fn reset(&self) -> RhiResult<()>;
}

impl FrameSlot for FrameSync {
    fn wait(&self) -> RhiResult<()> {
        self.in_flight_fence().wait(u64::MAX)
    }

    fn reset(&self) -> RhiResult<()> {
        self.in_flight_fence().reset()
    }
}

/// Result of a swapchain rebuild request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RecreateOutcome {
    /// The swapchain and everything sized by it were rebuilt.
    Rebuilt,
    /// The framebuffer has no area; nothing was touched.
    Deferred,
}

/// GPU-facing half of a frame.
pub trait FrameBackend {
    type Slot: FrameSlot;

    /// Acquires the next presentable image, signaling the slot's
    /// image-available semaphore. Returns `(image_index, suboptimal)`.
    fn acquire_next_image(&mut self, slot: &Self::Slot) -> Result<(u32, bool), vk::Result>;

    /// Writes per-frame shader constants for `image_index`.
    fn update_uniforms(&mut self, image_index: u32) -> RhiResult<()>;

    /// Submits the recorded commands for `image_index`, signaling the slot's
    /// render-finished semaphore and fence.
    fn submit(&mut self, slot: &Self::Slot, image_index: u32) -> RhiResult<()>;

    /// Queues `image_index` for presentation. Returns whether the swapchain
    /// is suboptimal.
    fn present(&mut self, slot: &Self::Slot, image_index: u32) -> Result<bool, vk::Result>;

    /// Idles the device, tears down everything sized by the swapchain and
    /// rebuilds it for the current framebuffer size.
    fn recreate_swapchain(&mut self) -> RhiResult<RecreateOutcome>;

    /// Number of images in the current swapchain.
    fn image_count(&self) -> usize;
}

/// What happened to a call to [`FrameScheduler::draw_frame`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameStatus {
    /// The frame was submitted and queued for presentation.
    Presented { image_index: u32 },
    /// Nothing was submitted: the swapchain was stale or the window is
    /// minimized.
    Dropped,
}

/// Round-robin owner of the frame slots.
pub struct FrameScheduler<S> {
    slots: Vec<S>,
    current_frame: usize,
    /// Slot that last submitted work for each swapchain image.
    images_in_flight: Vec<Option<usize>>,
    resized: bool,
    recreate_pending: bool,
}

impl<S: FrameSlot> FrameScheduler<S> {
    /// # Panics
    ///
    /// Panics if `slots` is empty.
    pub fn new(slots: Vec<S>, image_count: usize) -> Self {
        assert!(!slots.is_empty(), "a frame scheduler needs at least one slot");

        info!(
            "Frame scheduler created with {} slot(s) for {} swapchain image(s)",
            slots.len(),
            image_count
        );

        Self {
            slots,
            current_frame: 0,
            images_in_flight: vec![None; image_count],
            resized: false,
            recreate_pending: false,
        }
    }

    #[inline]
    pub fn current_frame(&self) -> usize {
        self.current_frame
    }

    #[inline]
    pub fn frames_in_flight(&self) -> usize {
        self.slots.len()
    }

    #[inline]
    pub fn slots(&self) -> &[S] {
        &self.slots
    }

    /// Slot that last used each swapchain image, if any.
    #[inline]
    pub fn images_in_flight(&self) -> &[Option<usize>] {
        &self.images_in_flight
    }

    #[inline]
    pub fn is_recreate_pending(&self) -> bool {
        self.recreate_pending
    }

    /// Requests a swapchain rebuild after the next present.
    pub fn notify_resized(&mut self) {
        self.resized = true;
    }

    /// Runs one frame.
    ///
    /// # Errors
    ///
    /// Fence, submission and rebuild failures are returned as-is. Acquire or
    /// present results other than success, suboptimal or out-of-date become
    /// [`RhiError::PresentationError`].
    pub fn draw_frame<B>(&mut self, backend: &mut B) -> RhiResult<FrameStatus>
    where
        B: FrameBackend<Slot = S>,
    {
        if self.recreate_pending && !self.recreate(backend)? {
            return Ok(FrameStatus::Dropped);
        }

        let current = self.current_frame;
        self.slots[current].wait()?;

        let image_index = match backend.acquire_next_image(&self.slots[current]) {
            Ok((index, suboptimal)) => {
                if suboptimal {
                    debug!("Swapchain suboptimal during acquire, rebuilding after present");
                }
                index
            }
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => {
                debug!("Swapchain out of date during acquire, dropping frame");
                self.recreate(backend)?;
                return Ok(FrameStatus::Dropped);
            }
            Err(result) => {
                error!("FrameScheduler::draw_frame: acquire failed: {:?}", result);
                return Err(RhiError::PresentationError(result));
            }
        };

        self.claim_image(image_index)?;

        backend.update_uniforms(image_index)?;

        let slot = &self.slots[current];
        slot.reset()?;
        backend.submit(slot, image_index)?;

        let stale = match backend.present(slot, image_index) {
            Ok(suboptimal) => suboptimal,
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => true,
            Err(result) => {
                error!("FrameScheduler::draw_frame: present failed: {:?}", result);
                return Err(RhiError::PresentationError(result));
            }
        };

        let resized = std::mem::take(&mut self.resized);
        if stale || resized {
            debug!(
                "Rebuilding swapchain after present (stale: {}, resized: {})",
                stale, resized
            );
            self.recreate(backend)?;
        }

        self.current_frame = (current + 1) % self.slots.len();

        Ok(FrameStatus::Presented { image_index })
    }

    /// Makes the current slot the owner of `image_index`.
    ///
    /// If another slot submitted work for the same image, its fence is
    /// waited first. Waiting on an already signaled fence returns at once,
    /// so the wait is unconditional rather than guarded by a status query.
    fn claim_image(&mut self, image_index: u32) -> RhiResult<()> {
        let current = self.current_frame;
        let image_count = self.images_in_flight.len();
        let entry = self
            .images_in_flight
            .get_mut(image_index as usize)
            .ok_or_else(|| {
                RhiError::SwapchainError(format!(
                    "acquired image {} but the swapchain has {} image(s)",
                    image_index, image_count
                ))
            })?;

        if let Some(previous) = *entry
            && previous != current
        {
            debug!(
                "Image {} still owned by slot {}, waiting before slot {} reuses it",
                image_index, previous, current
            );
            self.slots[previous].wait()?;
        }

        *entry = Some(current);
        Ok(())
    }

    /// Returns whether the swapchain was rebuilt.
    fn recreate<B>(&mut self, backend: &mut B) -> RhiResult<bool>
    where
        B: FrameBackend<Slot = S>,
    {
        match backend.recreate_swapchain()? {
            RecreateOutcome::Rebuilt => {
                self.images_in_flight.clear();
                self.images_in_flight.resize(backend.image_count(), None);
                self.recreate_pending = false;
                self.resized = false;
                Ok(true)
            }
            RecreateOutcome::Deferred => {
                if !self.recreate_pending {
                    debug!("Framebuffer has no area, deferring swapchain rebuild");
                }
                self.recreate_pending = true;
                Ok(false)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::{Cell, RefCell};
    use std::collections::VecDeque;
    use std::rc::Rc;

    use super::*;

    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    enum Event {
        Wait(usize),
        Reset(usize),
        Acquire(usize),
        Update(u32),
        Submit(usize, u32),
        Present(usize, u32),
        Recreate,
    }

    type Log = Rc<RefCell<Vec<Event>>>;

    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    enum FenceState {
        Signaled,
        Unsignaled,
        /// Submitted and not yet observed complete.
        Pending,
    }

    /// Fence double: a wait completes any pending submission.
    struct MockSlot {
        id: usize,
        state: Cell<FenceState>,
        log: Log,
    }

    impl FrameSlot for MockSlot {
        fn wait(&self) -> RhiResult<()> {
            self.log.borrow_mut().push(Event::Wait(self.id));
            if self.state.get() == FenceState::Pending {
                self.state.set(FenceState::Signaled);
            }
            Ok(())
        }

        fn reset(&self) -> RhiResult<()> {
            assert_eq!(
                self.state.get(),
                FenceState::Signaled,
                "slot {} fence reset before it signaled",
                self.id
            );
            self.log.borrow_mut().push(Event::Reset(self.id));
            self.state.set(FenceState::Unsignaled);
            Ok(())
        }
    }

    struct MockBackend {
        log: Log,
        image_count: usize,
        next_image: u32,
        acquire_results: VecDeque<Result<(u32, bool), vk::Result>>,
        present_results: VecDeque<Result<bool, vk::Result>>,
        recreate_results: VecDeque<RecreateOutcome>,
    }

    impl MockBackend {
        fn new(log: Log, image_count: usize) -> Self {
            Self {
                log,
                image_count,
                next_image: 0,
                acquire_results: VecDeque::new(),
                present_results: VecDeque::new(),
                recreate_results: VecDeque::new(),
            }
        }
    }

    impl FrameBackend for MockBackend {
        type Slot = MockSlot;

        fn acquire_next_image(&mut self, slot: &MockSlot) -> Result<(u32, bool), vk::Result> {
            self.log.borrow_mut().push(Event::Acquire(slot.id));
            self.acquire_results.pop_front().unwrap_or_else(|| {
                let index = self.next_image;
                self.next_image = (self.next_image + 1) % self.image_count as u32;
                Ok((index, false))
            })
        }

        fn update_uniforms(&mut self, image_index: u32) -> RhiResult<()> {
            self.log.borrow_mut().push(Event::Update(image_index));
            Ok(())
        }

        fn submit(&mut self, slot: &MockSlot, image_index: u32) -> RhiResult<()> {
            assert_eq!(
                slot.state.get(),
                FenceState::Unsignaled,
                "slot {} submitted without a fresh fence",
                slot.id
            );
            slot.state.set(FenceState::Pending);
            self.log
                .borrow_mut()
                .push(Event::Submit(slot.id, image_index));
            Ok(())
        }

        fn present(&mut self, slot: &MockSlot, image_index: u32) -> Result<bool, vk::Result> {
            self.log
                .borrow_mut()
                .push(Event::Present(slot.id, image_index));
            self.present_results.pop_front().unwrap_or(Ok(false))
        }

        fn recreate_swapchain(&mut self) -> RhiResult<RecreateOutcome> {
            let outcome = self
                .recreate_results
                .pop_front()
                .unwrap_or(RecreateOutcome::Rebuilt);
            if outcome == RecreateOutcome::Rebuilt {
                self.log.borrow_mut().push(Event::Recreate);
                self.next_image = 0;
            }
            Ok(outcome)
        }

        fn image_count(&self) -> usize {
            self.image_count
        }
    }

    fn setup(image_count: usize) -> (FrameScheduler<MockSlot>, MockBackend, Log) {
        let log: Log = Rc::default();
        let slots = (0..crate::MAX_FRAMES_IN_FLIGHT)
            .map(|id| MockSlot {
                id,
                state: Cell::new(FenceState::Signaled),
                log: log.clone(),
            })
            .collect();
        let scheduler = FrameScheduler::new(slots, image_count);
        let backend = MockBackend::new(log.clone(), image_count);
        (scheduler, backend, log)
    }

    fn position(log: &[Event], event: Event) -> usize {
        log.iter()
            .position(|&e| e == event)
            .unwrap_or_else(|| panic!("{:?} not in {:?}", event, log))
    }

    #[test]
    fn test_current_frame_cycles_through_slots() {
        let (mut scheduler, mut backend, _log) = setup(3);

        for k in 0..10 {
            assert_eq!(scheduler.current_frame(), k % 2);
            let status = scheduler.draw_frame(&mut backend).unwrap();
            assert!(matches!(status, FrameStatus::Presented { .. }));
        }
        assert_eq!(scheduler.current_frame(), 10 % 2);
    }

    #[test]
    fn test_fence_waited_then_reset_before_each_submit() {
        let (mut scheduler, mut backend, log) = setup(3);

        for _ in 0..6 {
            scheduler.draw_frame(&mut backend).unwrap();
        }

        let log = log.borrow();
        for (i, event) in log.iter().enumerate() {
            if let Event::Submit(slot, _) = *event {
                let reset = log[..i]
                    .iter()
                    .rposition(|&e| e == Event::Reset(slot))
                    .expect("submit without reset");
                let wait = log[..reset]
                    .iter()
                    .rposition(|&e| e == Event::Wait(slot))
                    .expect("reset without wait");
                let previous_submit = log[..i]
                    .iter()
                    .rposition(|e| matches!(e, Event::Submit(s, _) if *s == slot));
                if let Some(previous_submit) = previous_submit {
                    assert!(wait > previous_submit, "slot {} reused without a wait", slot);
                }
            }
        }
    }

    #[test]
    fn test_frame_steps_run_in_order() {
        let (mut scheduler, mut backend, log) = setup(3);

        scheduler.draw_frame(&mut backend).unwrap();

        assert_eq!(
            *log.borrow(),
            vec![
                Event::Wait(0),
                Event::Acquire(0),
                Event::Update(0),
                Event::Reset(0),
                Event::Submit(0, 0),
                Event::Present(0, 0),
            ]
        );
    }

    #[test]
    fn test_out_of_date_acquire_drops_frame_and_rebuilds() {
        let (mut scheduler, mut backend, log) = setup(3);
        backend
            .acquire_results
            .push_back(Err(vk::Result::ERROR_OUT_OF_DATE_KHR));

        let status = scheduler.draw_frame(&mut backend).unwrap();
        assert_eq!(status, FrameStatus::Dropped);
        assert_eq!(scheduler.current_frame(), 0);
        assert_eq!(
            *log.borrow(),
            vec![Event::Wait(0), Event::Acquire(0), Event::Recreate]
        );

        let status = scheduler.draw_frame(&mut backend).unwrap();
        assert_eq!(status, FrameStatus::Presented { image_index: 0 });

        let log = log.borrow();
        let recreate = position(&log, Event::Recreate);
        let next_acquire = log
            .iter()
            .rposition(|&e| e == Event::Acquire(0))
            .unwrap();
        assert!(recreate < next_acquire);
        assert_eq!(
            log.iter()
                .filter(|e| matches!(e, Event::Submit(..)))
                .count(),
            1
        );
    }

    #[test]
    fn test_suboptimal_acquire_still_renders() {
        let (mut scheduler, mut backend, log) = setup(3);
        backend.acquire_results.push_back(Ok((1, true)));
        backend.present_results.push_back(Ok(true));

        let status = scheduler.draw_frame(&mut backend).unwrap();
        assert_eq!(status, FrameStatus::Presented { image_index: 1 });

        let log = log.borrow();
        assert!(position(&log, Event::Present(0, 1)) < position(&log, Event::Recreate));
        assert_eq!(scheduler.current_frame(), 1);
    }

    #[test]
    fn test_out_of_date_present_rebuilds_and_advances() {
        let (mut scheduler, mut backend, log) = setup(3);
        backend
            .present_results
            .push_back(Err(vk::Result::ERROR_OUT_OF_DATE_KHR));

        let status = scheduler.draw_frame(&mut backend).unwrap();
        assert_eq!(status, FrameStatus::Presented { image_index: 0 });
        assert_eq!(log.borrow().last(), Some(&Event::Recreate));
        assert_eq!(scheduler.current_frame(), 1);
        assert!(scheduler.images_in_flight().iter().all(Option::is_none));
    }

    #[test]
    fn test_resize_notification_rebuilds_after_present() {
        let (mut scheduler, mut backend, log) = setup(3);

        scheduler.notify_resized();
        scheduler.draw_frame(&mut backend).unwrap();
        assert_eq!(log.borrow().last(), Some(&Event::Recreate));

        log.borrow_mut().clear();
        scheduler.draw_frame(&mut backend).unwrap();
        assert!(!log.borrow().contains(&Event::Recreate));
    }

    #[test]
    fn test_image_reused_by_other_slot_waits_for_its_fence() {
        let (mut scheduler, mut backend, log) = setup(3);
        backend.acquire_results.push_back(Ok((0, false)));
        backend.acquire_results.push_back(Ok((0, false)));

        scheduler.draw_frame(&mut backend).unwrap();
        assert_eq!(scheduler.slots()[0].state.get(), FenceState::Pending);
        assert_eq!(scheduler.images_in_flight()[0], Some(0));

        log.borrow_mut().clear();
        scheduler.draw_frame(&mut backend).unwrap();

        assert_eq!(
            *log.borrow(),
            vec![
                Event::Wait(1),
                Event::Acquire(1),
                Event::Wait(0),
                Event::Update(0),
                Event::Reset(1),
                Event::Submit(1, 0),
                Event::Present(1, 0),
            ]
        );
        assert_eq!(scheduler.slots()[0].state.get(), FenceState::Signaled);
        assert_eq!(scheduler.images_in_flight()[0], Some(1));
    }

    #[test]
    fn test_image_reused_by_same_slot_needs_no_extra_wait() {
        let (mut scheduler, mut backend, log) = setup(2);
        backend.acquire_results.push_back(Ok((0, false)));
        backend.acquire_results.push_back(Ok((1, false)));
        backend.acquire_results.push_back(Ok((0, false)));

        scheduler.draw_frame(&mut backend).unwrap();
        scheduler.draw_frame(&mut backend).unwrap();
        log.borrow_mut().clear();
        scheduler.draw_frame(&mut backend).unwrap();

        let waits: Vec<Event> = log
            .borrow()
            .iter()
            .copied()
            .filter(|e| matches!(e, Event::Wait(_)))
            .collect();
        assert_eq!(waits, vec![Event::Wait(0)]);
    }

    #[test]
    fn test_minimized_window_defers_rebuild() {
        let (mut scheduler, mut backend, log) = setup(3);
        backend
            .acquire_results
            .push_back(Err(vk::Result::ERROR_OUT_OF_DATE_KHR));
        backend.recreate_results.push_back(RecreateOutcome::Deferred);
        backend.recreate_results.push_back(RecreateOutcome::Deferred);

        assert_eq!(
            scheduler.draw_frame(&mut backend).unwrap(),
            FrameStatus::Dropped
        );
        assert!(scheduler.is_recreate_pending());

        // Still minimized: nothing is acquired.
        log.borrow_mut().clear();
        assert_eq!(
            scheduler.draw_frame(&mut backend).unwrap(),
            FrameStatus::Dropped
        );
        assert!(log.borrow().is_empty());

        // Restored: rebuild first, then render.
        let status = scheduler.draw_frame(&mut backend).unwrap();
        assert_eq!(status, FrameStatus::Presented { image_index: 0 });
        assert!(!scheduler.is_recreate_pending());
        let log = log.borrow();
        assert_eq!(log[0], Event::Recreate);
        assert!(log.contains(&Event::Submit(0, 0)));
    }

    #[test]
    fn test_rebuild_resizes_image_table() {
        let (mut scheduler, mut backend, _log) = setup(2);
        scheduler.draw_frame(&mut backend).unwrap();
        assert_eq!(scheduler.images_in_flight(), &[Some(0), None]);

        backend.image_count = 4;
        scheduler.notify_resized();
        scheduler.draw_frame(&mut backend).unwrap();
        assert_eq!(scheduler.images_in_flight(), &[None, None, None, None]);
    }

    #[test]
    fn test_fatal_acquire_error() {
        let (mut scheduler, mut backend, log) = setup(3);
        backend
            .acquire_results
            .push_back(Err(vk::Result::ERROR_DEVICE_LOST));

        let result = scheduler.draw_frame(&mut backend);
        assert!(matches!(
            result,
            Err(RhiError::PresentationError(vk::Result::ERROR_DEVICE_LOST))
        ));
        assert!(!log.borrow().contains(&Event::Recreate));
    }

    #[test]
    fn test_fatal_present_error() {
        let (mut scheduler, mut backend, _log) = setup(3);
        backend
            .present_results
            .push_back(Err(vk::Result::ERROR_SURFACE_LOST_KHR));

        let result = scheduler.draw_frame(&mut backend);
        assert!(matches!(
            result,
            Err(RhiError::PresentationError(
                vk::Result::ERROR_SURFACE_LOST_KHR
            ))
        ));
    }

    #[test]
    fn test_out_of_range_image_index_is_an_error() {
        let (mut scheduler, mut backend, _log) = setup(2);
        backend.acquire_results.push_back(Ok((5, false)));

        assert!(matches!(
            scheduler.draw_frame(&mut backend),
            Err(RhiError::SwapchainError(_))
        ));
    }
}
