//! Keyboard shortcuts for the runtime controls.
//!
//! Every shortcut is a plain edit of [`WidgetState`]; the renderer clamps
//! the result and decides whether it needs a rebuild or a repaint.

use vbparts_platform::KeyCode;
use vbparts_renderer::overlay::FORCE_RANGE;
use vbparts_renderer::particles::settings::MAX_COMPLEXITY;
use vbparts_renderer::{GenerationMode, WidgetState};

/// Keys polled every frame, in the order their edits apply.
pub const CONTROL_KEYS: [KeyCode; 20] = [
    KeyCode::Digit1,
    KeyCode::Digit2,
    KeyCode::Digit3,
    KeyCode::Digit4,
    KeyCode::Equal,
    KeyCode::NumpadAdd,
    KeyCode::Minus,
    KeyCode::NumpadSubtract,
    KeyCode::KeyC,
    KeyCode::KeyX,
    KeyCode::KeyV,
    KeyCode::KeyP,
    KeyCode::KeyT,
    KeyCode::KeyR,
    KeyCode::BracketLeft,
    KeyCode::BracketRight,
    KeyCode::Comma,
    KeyCode::Period,
    KeyCode::KeyG,
    KeyCode::KeyU,
];

const SPREAD_STEP: f32 = 0.05;
const SIZE_FACTOR: f32 = 1.25;

fn set_mode(state: &mut WidgetState, index: usize) {
    if let Some(mode) = GenerationMode::from_index(index) {
        state.mode = mode;
    }
}

fn toggle_force(value: &mut f32) {
    *value = if *value > FORCE_RANGE.0 {
        FORCE_RANGE.0
    } else {
        1.0
    };
}

/// The edit bound to `key`, if any.
pub fn widget_edit(key: KeyCode) -> Option<fn(&mut WidgetState)> {
    let edit: fn(&mut WidgetState) = match key {
        KeyCode::Digit1 => |s| set_mode(s, 0),
        KeyCode::Digit2 => |s| set_mode(s, 1),
        KeyCode::Digit3 => |s| set_mode(s, 2),
        KeyCode::Digit4 => |s| set_mode(s, 3),
        KeyCode::Equal | KeyCode::NumpadAdd => |s| s.count = s.count.saturating_mul(2),
        KeyCode::Minus | KeyCode::NumpadSubtract => |s| s.count /= 2,
        KeyCode::KeyC => |s| s.cutout = !s.cutout,
        KeyCode::KeyX => |s| s.complexity = (s.complexity + 1) % (MAX_COMPLEXITY + 1),
        KeyCode::KeyV => WidgetState::cycle_debug_view,
        KeyCode::KeyP => |s| s.particles_only = !s.particles_only,
        KeyCode::KeyT => |s| s.show_ui = !s.show_ui,
        KeyCode::KeyR => |s| s.technique = s.technique.next(),
        KeyCode::BracketLeft => |s| s.half_size /= SIZE_FACTOR,
        KeyCode::BracketRight => |s| s.half_size *= SIZE_FACTOR,
        KeyCode::Comma => |s| s.spread -= SPREAD_STEP,
        KeyCode::Period => |s| s.spread += SPREAD_STEP,
        KeyCode::KeyG => |s| toggle_force(&mut s.gravity),
        KeyCode::KeyU => |s| toggle_force(&mut s.initial_upwards_force),
        _ => return None,
    };
    Some(edit)
}

#[cfg(test)]
mod tests {
    use super::*;
    use vbparts_renderer::TechniqueKind;
    use vbparts_renderer::overlay::HALF_SIZE_RANGE;

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

    fn apply(key: KeyCode, state: &mut WidgetState) {
        let edit = widget_edit(key).unwrap();
        edit(state);
    }

    #[test]
    fn test_every_control_key_is_bound() {
        for key in CONTROL_KEYS {
            assert!(widget_edit(key).is_some(), "{key:?} has no edit");
        }
        assert!(widget_edit(KeyCode::KeyW).is_none());
        assert!(widget_edit(KeyCode::Space).is_none());
    }

    #[test]
    fn test_mode_keys() {
        let mut s = state();
        apply(KeyCode::Digit2, &mut s);
        assert_eq!(s.mode, GenerationMode::Compute);
        apply(KeyCode::Digit4, &mut s);
        assert_eq!(s.mode, GenerationMode::VertexGeometry);
    }

    #[test]
    fn test_count_keys() {
        let mut s = state();
        apply(KeyCode::Equal, &mut s);
        assert_eq!(s.count, 2048);
        apply(KeyCode::Minus, &mut s);
        apply(KeyCode::Minus, &mut s);
        assert_eq!(s.count, 512);
    }

    #[test]
    fn test_complexity_cycles() {
        let mut s = state();
        for expected in [2, 3, 0, 1] {
            apply(KeyCode::KeyX, &mut s);
            assert_eq!(s.complexity, expected);
        }
    }

    #[test]
    fn test_force_toggles() {
        let mut s = state();
        apply(KeyCode::KeyG, &mut s);
        assert_eq!(s.gravity, 1.0);
        apply(KeyCode::KeyG, &mut s);
        assert_eq!(s.gravity, 0.0);
        apply(KeyCode::KeyU, &mut s);
        assert_eq!(s.initial_upwards_force, 1.0);
    }

    #[test]
    fn test_size_steps_stay_clampable() {
        let mut s = state();
        apply(KeyCode::BracketRight, &mut s);
        assert!(s.half_size > 0.03);
        for _ in 0..20 {
            apply(KeyCode::BracketRight, &mut s);
        }
        assert_eq!(s.clamped().half_size, HALF_SIZE_RANGE.1);
    }

    #[test]
    fn test_technique_key_cycles() {
        let mut s = state();
        apply(KeyCode::KeyR, &mut s);
        assert_eq!(s.technique, TechniqueKind::GBuffer3);
    }
}
