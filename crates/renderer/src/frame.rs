//! Frame lifecycle states and classification of swapchain results.
//!
//! Everything here is free of GPU objects; [`Renderer`](crate::Renderer)
//! drives it once per tick:
//!
//! ```text
//! Idle -> ComputeSubmitted -> Acquiring -> GraphicsSubmitted -> Presenting -> Idle
//!   \____________________________^   \                              \
//!                                     +-> Resizing <-----------------+
//! ```
//!
//! Compute work goes out before the acquire so it overlaps the wait for the
//! next image. A stale acquire or present moves to `Resizing`, which always
//! ends back in `Idle`.

use tracing::debug;

use vbparts_rhi::sync::{MAX_FRAMES_IN_FLIGHT, next_frame};
use vbparts_rhi::vk;

use crate::error::{RendererError, RendererResult};

/// Where the orchestrator is within a tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FrameState {
    #[default]
    Idle,
    ComputeSubmitted,
    Acquiring,
    GraphicsSubmitted,
    Presenting,
    Resizing,
}

impl FrameState {
    /// Whether the lifecycle allows moving from `self` to `next`.
    pub fn can_enter(self, next: Self) -> bool {
        use FrameState::*;
        matches!(
            (self, next),
            (Idle, ComputeSubmitted)
                | (Idle, Acquiring)
                | (Idle, Resizing)
                | (ComputeSubmitted, Acquiring)
                | (Acquiring, GraphicsSubmitted)
                | (Acquiring, Resizing)
                | (GraphicsSubmitted, Presenting)
                | (Presenting, Idle)
                | (Presenting, Resizing)
                | (Resizing, Idle)
        )
    }
}

/// How a tick ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// A frame was submitted and presented
    Presented,
    /// The swapchain was stale or resized; dependents were rebuilt
    Rebuilt,
    /// Nothing to draw to, e.g. a minimized window
    Skipped,
}

/// Result of acquiring the next image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Acquired {
    Image(u32),
    /// The swapchain no longer matches the surface
    Stale,
}

/// Maps an acquire result onto the lifecycle.
///
/// A suboptimal acquire still renders; the present that follows reports it
/// again and triggers the rebuild.
///
/// # Errors
///
/// Returns [`RendererError::Fatal`] for any result other than success,
/// suboptimal or out-of-date.
pub fn classify_acquire(result: Result<(u32, bool), vk::Result>) -> RendererResult<Acquired> {
    match result {
        Ok((image_index, suboptimal)) => {
            if suboptimal {
                debug!("Acquire returned suboptimal");
            }
            Ok(Acquired::Image(image_index))
        }
        Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(Acquired::Stale),
        Err(e) => Err(RendererError::Fatal(format!(
            "Failed to acquire swapchain image: {e:?}"
        ))),
    }
}

/// Maps a present result onto the lifecycle. Returns `true` if the
/// swapchain must be rebuilt.
///
/// # Errors
///
/// Returns [`RendererError::Fatal`] for any result other than success,
/// suboptimal or out-of-date.
pub fn classify_present(
    result: Result<bool, vk::Result>,
    resize_requested: bool,
) -> RendererResult<bool> {
    match result {
        Ok(suboptimal) => Ok(suboptimal || resize_requested),
        Err(vk::Result::ERROR_OUT_OF_DATE_KHR | vk::Result::SUBOPTIMAL_KHR) => Ok(true),
        Err(e) => Err(RendererError::Fatal(format!(
            "Failed to present swapchain image: {e:?}"
        ))),
    }
}

/// Rotating frame slot index and the current lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FrameCursor {
    slot: usize,
    state: FrameState,
}

impl FrameCursor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Index of the current frame slot, below [`MAX_FRAMES_IN_FLIGHT`].
    #[inline]
    pub fn slot(&self) -> usize {
        self.slot
    }

    #[inline]
    pub fn state(&self) -> FrameState {
        self.state
    }

    /// Moves to `next`, logging transitions the lifecycle does not expect.
    pub fn enter(&mut self, next: FrameState) {
        if !self.state.can_enter(next) {
            debug!("Unexpected frame transition {:?} -> {:?}", self.state, next);
        }
        self.state = next;
    }

    /// Finishes a presented frame and moves to the next slot.
    pub fn advance(&mut self) {
        self.enter(FrameState::Idle);
        self.slot = next_frame(self.slot);
    }

    /// Finishes a rebuild. The slot is kept; the rebuild waited for the
    /// device, so its fence is signaled again.
    pub fn finish_rebuild(&mut self) {
        self.enter(FrameState::Idle);
    }
}

const _: () = assert!(MAX_FRAMES_IN_FLIGHT > 0);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slot_wraps_after_frames_in_flight() {
        let mut cursor = FrameCursor::new();
        let mut seen = Vec::new();
        for _ in 0..MAX_FRAMES_IN_FLIGHT * 2 {
            seen.push(cursor.slot());
            cursor.enter(FrameState::Acquiring);
            cursor.enter(FrameState::GraphicsSubmitted);
            cursor.enter(FrameState::Presenting);
            cursor.advance();
        }
        assert_eq!(seen, vec![0, 1, 2, 0, 1, 2]);
        assert_eq!(cursor.state(), FrameState::Idle);
    }

    #[test]
    fn test_rebuild_keeps_slot() {
        let mut cursor = FrameCursor::new();
        cursor.enter(FrameState::Acquiring);
        cursor.enter(FrameState::Resizing);
        cursor.finish_rebuild();
        assert_eq!(cursor.slot(), 0);
        assert_eq!(cursor.state(), FrameState::Idle);
    }

    #[test]
    fn test_lifecycle_transitions() {
        use FrameState::*;
        assert!(Idle.can_enter(ComputeSubmitted));
        assert!(ComputeSubmitted.can_enter(Acquiring));
        assert!(Acquiring.can_enter(Resizing));
        assert!(Presenting.can_enter(Resizing));
        assert!(Resizing.can_enter(Idle));
        assert!(!Idle.can_enter(Presenting));
        assert!(!GraphicsSubmitted.can_enter(Idle));
        assert!(!Resizing.can_enter(Presenting));
    }

    #[test]
    fn test_classify_acquire() {
        assert_eq!(classify_acquire(Ok((2, false))).ok(), Some(Acquired::Image(2)));
        assert_eq!(classify_acquire(Ok((1, true))).ok(), Some(Acquired::Image(1)));
        assert_eq!(
            classify_acquire(Err(vk::Result::ERROR_OUT_OF_DATE_KHR)).ok(),
            Some(Acquired::Stale)
        );
        assert!(matches!(
            classify_acquire(Err(vk::Result::ERROR_DEVICE_LOST)),
            Err(RendererError::Fatal(_))
        ));
    }

    #[test]
    fn test_classify_present() {
        assert!(!classify_present(Ok(false), false).unwrap());
        assert!(classify_present(Ok(true), false).unwrap());
        assert!(classify_present(Ok(false), true).unwrap());
        assert!(classify_present(Err(vk::Result::ERROR_OUT_OF_DATE_KHR), false).unwrap());
        assert!(classify_present(Err(vk::Result::ERROR_SURFACE_LOST_KHR), false).is_err());
    }
}
