//! Time-based scroll animation.

use std::time::{Duration, Instant};

/// Cubic ease-out: fast start, gentle landing.
pub fn ease_out_cubic(t: f64) -> f64 {
    let t = t.clamp(0.0, 1.0);
    1.0 - (1.0 - t).powi(3)
}

/// One animated move between two scroll offsets.
///
/// The clock starts on the first [`sample`](Self::sample), so an animation
/// created between frames does not skip ahead.
#[derive(Debug, Clone, PartialEq)]
pub struct ScrollAnimation {
    from: f64,
    to: f64,
    duration: Duration,
    started: Option<Instant>,
}

impl ScrollAnimation {
    pub const fn new(from: f64, to: f64, duration: Duration) -> Self {
        Self {
            from,
            to,
            duration,
            started: None,
        }
    }

    pub const fn target(&self) -> f64 {
        self.to
    }

    /// Position at `now`, and whether the animation has finished.
    pub fn sample(&mut self, now: Instant) -> (f64, bool) {
        let started = *self.started.get_or_insert(now);
        if self.duration.is_zero() {
            return (self.to, true);
        }
        let elapsed = now.saturating_duration_since(started);
        let t = elapsed.as_secs_f64() / self.duration.as_secs_f64();
        if t >= 1.0 {
            return (self.to, true);
        }
        (self.from + (self.to - self.from) * ease_out_cubic(t), false)
    }
}
