//! Frame timing.

use std::time::{Duration, Instant};

/// Measures time between frames.
#[derive(Debug)]
pub struct Timer {
    start: Instant,
    last_tick: Instant,
}

impl Timer {
    /// Create a new timer, starting from now.
    pub fn new() -> Self {
        let now = Instant::now();
        Self {
            start: now,
            last_tick: now,
        }
    }

    /// Get the total elapsed time since the timer was created.
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    /// Get the time elapsed since the last call to `tick()`.
    pub fn tick(&mut self) -> Duration {
        let now = Instant::now();
        let delta = now - self.last_tick;
        self.last_tick = now;
        delta
    }
}

impl Default for Timer {
    fn default() -> Self {
        Self::new()
    }
}

/// Frames-per-second estimate, refreshed once per sampling interval.
///
/// Frames are counted until at least `interval` has accumulated, at which
/// point the average rate over that window becomes the new reading.
#[derive(Debug, Clone)]
pub struct FpsCounter {
    interval: Duration,
    accumulated: Duration,
    frames: u32,
    fps: f32,
}

impl FpsCounter {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            accumulated: Duration::ZERO,
            frames: 0,
            fps: 0.0,
        }
    }

    /// Records one frame that took `delta`. Returns the fresh reading when a
    /// sampling window closes.
    pub fn record(&mut self, delta: Duration) -> Option<f32> {
        self.accumulated += delta;
        self.frames += 1;

        if self.accumulated < self.interval {
            return None;
        }

        self.fps = self.frames as f32 / self.accumulated.as_secs_f32();
        self.accumulated = Duration::ZERO;
        self.frames = 0;
        Some(self.fps)
    }

    /// Last completed reading, zero before the first window closes.
    pub fn fps(&self) -> f32 {
        self.fps
    }
}

impl Default for FpsCounter {
    fn default() -> Self {
        Self::new(Duration::from_secs(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tick_is_monotonic() {
        let mut timer = Timer::new();
        let first = timer.tick();
        let second = timer.tick();
        assert!(first >= Duration::ZERO);
        assert!(second >= Duration::ZERO);
        assert!(timer.elapsed() >= first + second);
    }

    #[test]
    fn test_fps_counter_waits_for_full_interval() {
        let mut counter = FpsCounter::new(Duration::from_secs(1));
        for _ in 0..9 {
            assert!(counter.record(Duration::from_millis(100)).is_none());
        }
        assert_eq!(counter.fps(), 0.0);

        let fps = counter.record(Duration::from_millis(100)).unwrap();
        assert!((fps - 10.0).abs() < 1e-3);
        assert!((counter.fps() - 10.0).abs() < 1e-3);
    }

    #[test]
    fn test_fps_counter_restarts_window() {
        let mut counter = FpsCounter::new(Duration::from_millis(500));
        assert!(counter.record(Duration::from_millis(500)).is_some());
        assert!(counter.record(Duration::from_millis(100)).is_none());
        let fps = counter.record(Duration::from_millis(400)).unwrap();
        assert!((fps - 4.0).abs() < 1e-3);
    }
}
