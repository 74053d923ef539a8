//! Window-title overlay.
//!
//! Stands in for an on-screen UI: every time the renderer re-records its
//! command buffers with the UI shown, the current controls are written to
//! a shared string that the app pushes to the window title.

use std::cell::RefCell;
use std::rc::Rc;

use vbparts_renderer::{Overlay, WidgetState};
use vbparts_rhi::command::CommandBuffer;

/// Formats the controls as a one-line summary.
pub fn summary(state: &WidgetState) -> String {
    let mut title = format!(
        "vbparts | {} | {} x{} | complexity {}",
        state.technique.name(),
        state.mode.name(),
        state.count,
        state.complexity
    );
    if state.cutout {
        title.push_str(" cutout");
    }
    if let Some(view) = state
        .technique
        .debug_views()
        .get(usize::from(state.debug_view))
    {
        title.push_str(" | ");
        title.push_str(view);
    }
    if state.particles_only {
        title.push_str(" | particles only");
    }
    title
}

/// Shared slot the overlay writes and the app drains.
#[derive(Clone, Default)]
pub struct TitleSlot(Rc<RefCell<Option<String>>>);

impl TitleSlot {
    /// The title written since the last call, if it changed.
    pub fn take(&self) -> Option<String> {
        self.0.borrow_mut().take()
    }
}

pub struct TitleOverlay {
    slot: TitleSlot,
    last: String,
}

impl TitleOverlay {
    pub fn new(slot: TitleSlot) -> Self {
        Self {
            slot,
            last: String::new(),
        }
    }
}

impl Overlay for TitleOverlay {
    fn record(&mut self, _cmd: &CommandBuffer, _image_index: usize, state: &WidgetState) {
        let title = summary(state);
        if title != self.last {
            self.last.clone_from(&title);
            *self.slot.0.borrow_mut() = Some(title);
        }
    }
}
