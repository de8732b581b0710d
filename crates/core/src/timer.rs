//! Frame timing.

use std::time::{Duration, Instant};

/// Measures frame deltas and reports an averaged frame rate at a fixed interval.
#[derive(Debug)]
pub struct Timer {
    start: Instant,
    last_tick: Instant,
    report_start: Instant,
    frames_since_report: u32,
}

impl Timer {
    /// Create a new timer, starting from now.
    pub fn new() -> Self {
        let now = Instant::now();
        Self {
            start: now,
            last_tick: now,
            report_start: now,
            frames_since_report: 0,
        }
    }

    /// Total time since the timer was created.
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    /// Returns the time since the previous tick and counts one frame.
    pub fn tick(&mut self) -> Duration {
        let now = Instant::now();
        let delta = now - self.last_tick;
        self.last_tick = now;
        self.frames_since_report += 1;
        delta
    }

    /// Returns the average frames per second once `interval` has passed
    /// since the last report, then starts a new reporting window.
    pub fn fps_report(&mut self, interval: Duration) -> Option<f32> {
        let window = self.report_start.elapsed();
        if window < interval || window.is_zero() {
            return None;
        }

        let fps = self.frames_since_report as f32 / window.as_secs_f32();
        self.report_start = Instant::now();
        self.frames_since_report = 0;
        Some(fps)
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
    fn test_no_report_before_interval() {
        let mut timer = Timer::new();
        timer.tick();
        assert!(timer.fps_report(Duration::from_secs(3600)).is_none());
    }

    #[test]
    fn test_report_counts_ticks() {
        let mut timer = Timer::new();
        for _ in 0..5 {
            timer.tick();
        }
        std::thread::sleep(Duration::from_millis(5));
        let fps = timer.fps_report(Duration::ZERO).unwrap();
        assert!(fps > 0.0);
        // Window restarts after a report.
        assert_eq!(timer.frames_since_report, 0);
    }
}
