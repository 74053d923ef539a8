//! Frame timer feeding the per-frame uniform update.

use std::time::{Duration, Instant};

/// Time values handed to a technique each frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameTime {
    /// Seconds since the previous frame
    pub dt: f32,
    /// Seconds since the timer started, or `0.0` while frozen
    pub time: f32,
}

/// High-resolution timer measuring elapsed and per-frame time.
#[derive(Debug)]
pub struct Timer {
    start: Instant,
    last_tick: Instant,
    frozen: bool,
}

impl Timer {
    /// Create a new timer, starting from now.
    pub fn new() -> Self {
        let now = Instant::now();
        Self {
            start: now,
            last_tick: now,
            frozen: false,
        }
    }

    /// Total elapsed time since the timer was created.
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    /// Advances the timer and returns delta and simulation time.
    ///
    /// Delta time keeps flowing while frozen so camera movement stays responsive.
    pub fn frame(&mut self) -> FrameTime {
        let now = Instant::now();
        let dt = (now - self.last_tick).as_secs_f32();
        self.last_tick = now;

        let time = if self.frozen {
            0.0
        } else {
            (now - self.start).as_secs_f32()
        };

        FrameTime { dt, time }
    }

    /// Pins simulation time to zero while `frozen` is true.
    pub fn set_frozen(&mut self, frozen: bool) {
        self.frozen = frozen;
    }

    #[inline]
    pub fn is_frozen(&self) -> bool {
        self.frozen
    }
}

impl Default for Timer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_time_is_monotonic() {
        let mut timer = Timer::new();
        let first = timer.frame();
        std::thread::sleep(Duration::from_millis(2));
        let second = timer.frame();
        assert!(second.time >= first.time);
        assert!(second.dt > 0.0);
    }

    #[test]
    fn test_frozen_time_is_zero() {
        let mut timer = Timer::new();
        timer.set_frozen(true);
        std::thread::sleep(Duration::from_millis(2));
        let frame = timer.frame();
        assert_eq!(frame.time, 0.0);
        assert!(frame.dt > 0.0);
        assert!(timer.is_frozen());
    }
}
