//! Timing types shared by the physics stepper and the render-side transform
//! sync.
//!
//! Both workers are assumed to share one monotonic clock (§9 open question:
//! this is a single process, not two runtimes behind a `SharedArrayBuffer`,
//! so the "different clocks" fallback the spec allows for doesn't apply
//! here — `current_time_ms` is used directly to drive interpolation alpha).

use std::time::Instant;

/// A monotonic millisecond clock shared by both workers, rooted at process
/// start (or whenever the host constructs it).
#[derive(Debug, Clone)]
pub struct Clock {
    epoch: Instant,
}

impl Clock {
    pub fn new() -> Self {
        Self {
            epoch: Instant::now(),
        }
    }

    pub fn now_ms(&self) -> f64 {
        self.epoch.elapsed().as_secs_f64() * 1000.0
    }
}

impl Default for Clock {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clock_is_monotonic() {
        let clock = Clock::new();
        let a = clock.now_ms();
        let b = clock.now_ms();
        assert!(b >= a);
    }
}
