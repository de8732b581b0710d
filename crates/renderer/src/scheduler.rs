//! Frame scheduling: `Idle -> Acquiring -> Recording -> Submitted ->
//! Presenting -> Idle`.
//!
//! [`FrameScheduler`] owns the frame index and decides what happens when the
//! presentation surface goes stale. The GPU work behind each step lives in a
//! [`FrameBackend`], so the state machine can be driven without a device.
//!
//! The only unbounded wait is the slot fence at the start of a frame. The
//! only abort point is a failed acquire, before anything is submitted.

use tracing::{debug, trace};

use translucent_rhi::RhiResult;
use translucent_rhi::swapchain::{AcquireOutcome, PresentOutcome};

use crate::frame::slot_index;

/// GPU operations of one frame, addressed by frame slot.
pub trait FrameBackend {
    /// Blocks until the slot's previous submission has finished.
    fn wait_for_slot(&mut self, slot: usize) -> RhiResult<()>;

    /// Requests the next presentable image, signaling the slot's acquire
    /// semaphore.
    fn acquire(&mut self, slot: usize) -> RhiResult<AcquireOutcome>;

    /// Resets the slot's fence and command buffer. Only called once the
    /// frame is certain to be submitted.
    fn reset_slot(&mut self, slot: usize) -> RhiResult<()>;

    /// Records the frame into the slot's command buffer.
    fn record(&mut self, slot: usize, image_index: u32) -> RhiResult<()>;

    fn submit(&mut self, slot: usize) -> RhiResult<()>;

    fn present(&mut self, slot: usize, image_index: u32) -> RhiResult<PresentOutcome>;

    /// Rebuilds the swapchain and everything sized to it. Returns `false`
    /// when the surface has no area and rebuilding has to wait.
    fn recreate(&mut self) -> RhiResult<bool>;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameState {
    Idle,
    Acquiring,
    Recording,
    Submitted,
    Presenting,
}

/// What happened to one call of [`FrameScheduler::run_frame`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameOutcome {
    Presented,
    /// The chain was out of date at acquire: nothing was submitted and the
    /// chain was rebuilt.
    Skipped,
    /// The surface has zero area; no frame is rendered until it grows.
    Deferred,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FrameStats {
    pub presented: u64,
    /// Frames abandoned because acquire reported out-of-date.
    pub skipped: u64,
    pub recreations: u64,
}

pub struct FrameScheduler {
    depth: usize,
    frame_index: u64,
    state: FrameState,
    resize_requested: bool,
    recreate_pending: bool,
    stats: FrameStats,
}

impl FrameScheduler {
    /// A scheduler cycling through `depth` frame slots.
    pub fn new(depth: usize) -> Self {
        Self {
            depth: depth.max(1),
            frame_index: 0,
            state: FrameState::Idle,
            resize_requested: false,
            recreate_pending: false,
            stats: FrameStats::default(),
        }
    }

    #[inline]
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Number of frames presented so far.
    #[inline]
    pub fn frame_index(&self) -> u64 {
        self.frame_index
    }

    /// Slot of the next frame.
    #[inline]
    pub fn slot(&self) -> usize {
        slot_index(self.frame_index, self.depth)
    }

    #[inline]
    pub fn state(&self) -> FrameState {
        self.state
    }

    #[inline]
    pub fn stats(&self) -> FrameStats {
        self.stats
    }

    /// Whether a rebuild is waiting for the surface to regain area.
    #[inline]
    pub fn is_recreate_pending(&self) -> bool {
        self.recreate_pending
    }

    /// Notes an external size change. The chain is rebuilt after the next
    /// present.
    pub fn request_resize(&mut self) {
        self.resize_requested = true;
    }

    /// Runs one frame through `backend`.
    pub fn run_frame<B: FrameBackend>(&mut self, backend: &mut B) -> RhiResult<FrameOutcome> {
        if self.recreate_pending && !self.recreate(backend)? {
            return Ok(FrameOutcome::Deferred);
        }

        let slot = self.slot();

        self.enter(FrameState::Acquiring);
        backend.wait_for_slot(slot)?;
        let (image_index, suboptimal) = match backend.acquire(slot)? {
            AcquireOutcome::Acquired {
                image_index,
                suboptimal,
            } => (image_index, suboptimal),
            AcquireOutcome::OutOfDate => {
                debug!("Swapchain out of date at acquire, skipping frame");
                self.stats.skipped += 1;
                self.enter(FrameState::Idle);
                return Ok(if self.recreate(backend)? {
                    FrameOutcome::Skipped
                } else {
                    FrameOutcome::Deferred
                });
            }
        };

        self.enter(FrameState::Recording);
        backend.reset_slot(slot)?;
        backend.record(slot, image_index)?;
        backend.submit(slot)?;
        self.enter(FrameState::Submitted);

        self.enter(FrameState::Presenting);
        let presented = backend.present(slot, image_index)?;
        self.stats.presented += 1;
        self.frame_index += 1;
        self.enter(FrameState::Idle);

        let resized = std::mem::take(&mut self.resize_requested);
        if suboptimal || presented.is_stale() || resized {
            debug!(
                "Rebuilding swapchain after present (suboptimal={}, present={:?}, resized={})",
                suboptimal, presented, resized
            );
            self.recreate(backend)?;
        }

        Ok(FrameOutcome::Presented)
    }

    fn recreate<B: FrameBackend>(&mut self, backend: &mut B) -> RhiResult<bool> {
        self.resize_requested = false;
        let rebuilt = backend.recreate()?;
        self.recreate_pending = !rebuilt;
        if rebuilt {
            self.stats.recreations += 1;
        } else {
            debug!("Surface has no area, deferring swapchain rebuild");
        }
        Ok(rebuilt)
    }

    fn enter(&mut self, state: FrameState) {
        trace!("Frame {}: {:?} -> {:?}", self.frame_index, self.state, state);
        self.state = state;
    }
}
