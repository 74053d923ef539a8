//! Runtime controls shared by the overlay and keyboard shortcuts.
//!
//! The overlay itself lives outside this crate. It draws into the open
//! render pass through [`Overlay::record`] and reads a [`WidgetState`]
//! snapshot; edits come back through
//! [`Renderer::edit_widgets`](crate::Renderer::edit_widgets), which reports
//! how much work the edit needs as a [`Rebuild`].

use vbparts_rhi::command::CommandBuffer;

use crate::particles::settings::{MAX_COMPLEXITY, MAX_PARTICLE_COUNT, MIN_PARTICLE_COUNT};
use crate::particles::GenerationMode;
use crate::technique::TechniqueKind;

/// Slider range for the particle half size.
pub const HALF_SIZE_RANGE: (f32, f32) = (0.005, 0.5);
/// Slider range for the particle spread.
pub const SPREAD_RANGE: (f32, f32) = (0.005, 1.0);
/// Slider range for gravity and the initial upwards force.
pub const FORCE_RANGE: (f32, f32) = (0.0, 2.0);

/// Work an edit requires before the next frame.
///
/// Ordered by cost so that several edits combine with [`Ord::max`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum Rebuild {
    /// Only uniform data changed
    #[default]
    None,
    /// Command buffers must be re-recorded
    Repaint,
    /// Pipelines or particle buffers changed; rebuild everything that
    /// depends on the swapchain
    Swapchain,
}

/// Everything the overlay can show or change.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WidgetState {
    pub show_ui: bool,
    pub technique: TechniqueKind,
    pub debug_view: u8,
    pub particles_only: bool,
    pub mode: GenerationMode,
    pub count: u32,
    pub complexity: u8,
    pub cutout: bool,
    pub half_size: f32,
    pub spread: f32,
    pub gravity: f32,
    pub initial_upwards_force: f32,
}

impl WidgetState {
    /// Clamps every value into the range its widget allows.
    pub fn clamped(mut self) -> Self {
        self.count = self.count.clamp(MIN_PARTICLE_COUNT, MAX_PARTICLE_COUNT);
        self.complexity = self.complexity.min(MAX_COMPLEXITY);
        self.half_size = self.half_size.clamp(HALF_SIZE_RANGE.0, HALF_SIZE_RANGE.1);
        self.spread = self.spread.clamp(SPREAD_RANGE.0, SPREAD_RANGE.1);
        self.gravity = self.gravity.clamp(FORCE_RANGE.0, FORCE_RANGE.1);
        self.initial_upwards_force = self
            .initial_upwards_force
            .clamp(FORCE_RANGE.0, FORCE_RANGE.1);

        let views = self.technique.debug_views().len();
        if usize::from(self.debug_view) >= views.max(1) {
            self.debug_view = 0;
        }
        self
    }

    /// Work needed to go from `before` to `self`.
    pub fn rebuild_from(&self, before: &Self) -> Rebuild {
        if self.technique != before.technique
            || self.mode != before.mode
            || self.count != before.count
            || self.complexity != before.complexity
            || self.cutout != before.cutout
        {
            Rebuild::Swapchain
        } else if self.show_ui != before.show_ui || self.particles_only != before.particles_only {
            Rebuild::Repaint
        } else {
            Rebuild::None
        }
    }

    /// Selects the next debug view of the current technique, wrapping.
    pub fn cycle_debug_view(&mut self) {
        let views = self.technique.debug_views().len();
        self.debug_view = if views == 0 {
            0
        } else {
            ((usize::from(self.debug_view) + 1) % views) as u8
        };
    }
}

/// An immediate-mode overlay drawn on top of the technique's output.
pub trait Overlay {
    /// Records the overlay into the still-open render pass of `cmd`.
    ///
    /// Called for every swapchain image whenever command buffers are
    /// re-recorded, only while the UI is shown.
    fn record(&mut self, cmd: &CommandBuffer, image_index: usize, state: &WidgetState);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state() -> WidgetState {
        WidgetState {
            show_ui: true,
            technique: TechniqueKind::Visibility,
            debug_view: 0,
            particles_only: true,
            mode: GenerationMode::VertexExpansion,
            count: 1024,
            complexity: 1,
            cutout: false,
            half_size: 0.03,
            spread: 0.4,
            gravity: 0.0,
            initial_upwards_force: 0.0,
        }
    }

    #[test]
    fn test_rebuild_ordering() {
        assert!(Rebuild::None < Rebuild::Repaint);
        assert!(Rebuild::Repaint < Rebuild::Swapchain);
        assert_eq!(Rebuild::Repaint.max(Rebuild::Swapchain), Rebuild::Swapchain);
    }

    #[test]
    fn test_pipeline_changes_rebuild_swapchain() {
        let before = state();
        let edits: [fn(&mut WidgetState); 5] = [
            |s| s.technique = TechniqueKind::Forward,
            |s| s.mode = GenerationMode::Compute,
            |s| s.count = 2048,
            |s| s.complexity = 2,
            |s| s.cutout = true,
        ];
        for edit in edits {
            let mut after = before;
            edit(&mut after);
            assert_eq!(after.rebuild_from(&before), Rebuild::Swapchain);
        }
    }

    #[test]
    fn test_recording_changes_repaint() {
        let before = state();
        let mut after = before;
        after.particles_only = false;
        assert_eq!(after.rebuild_from(&before), Rebuild::Repaint);

        let mut after = before;
        after.show_ui = false;
        assert_eq!(after.rebuild_from(&before), Rebuild::Repaint);
    }

    #[test]
    fn test_uniform_changes_need_nothing() {
        let before = state();
        let mut after = before;
        after.gravity = 1.0;
        after.half_size = 0.1;
        after.debug_view = 2;
        assert_eq!(after.rebuild_from(&before), Rebuild::None);
    }

    #[test]
    fn test_clamped() {
        let mut s = state();
        s.count = 1;
        s.half_size = 9.0;
        s.gravity = -1.0;
        s.debug_view = 9;
        let s = s.clamped();
        assert_eq!(s.count, MIN_PARTICLE_COUNT);
        assert_eq!(s.half_size, HALF_SIZE_RANGE.1);
        assert_eq!(s.gravity, 0.0);
        assert_eq!(s.debug_view, 0);
    }

    #[test]
    fn test_cycle_debug_view() {
        let mut s = state();
        for expected in [1, 2, 3, 0] {
            s.cycle_debug_view();
            assert_eq!(s.debug_view, expected);
        }

        s.technique = TechniqueKind::Forward;
        s.cycle_debug_view();
        assert_eq!(s.debug_view, 0);
    }
}
