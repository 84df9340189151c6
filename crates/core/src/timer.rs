//! Frame timing for the render loop.

use std::time::{Duration, Instant};

/// Measures per-frame delta time and a rolling frames-per-second figure.
#[derive(Debug)]
pub struct Timer {
    start: Instant,
    last_tick: Instant,
    frame_count: u64,
    window_start: Instant,
    window_frames: u32,
    fps: f32,
}

impl Timer {
    /// How long frames are accumulated before the FPS figure is refreshed.
    pub const FPS_WINDOW: Duration = Duration::from_secs(1);

    /// Create a timer starting now.
    pub fn new() -> Self {
        let now = Instant::now();
        Self {
            start: now,
            last_tick: now,
            frame_count: 0,
            window_start: now,
            window_frames: 0,
            fps: 0.0,
        }
    }

    /// Time since the timer was created or last reset.
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    /// Mark the end of a frame and return the time since the previous mark.
    pub fn tick(&mut self) -> Duration {
        let now = Instant::now();
        let delta = now - self.last_tick;
        self.last_tick = now;
        self.frame_count += 1;
        self.window_frames += 1;

        let window = now - self.window_start;
        if window >= Self::FPS_WINDOW {
            self.fps = self.window_frames as f32 / window.as_secs_f32();
            self.window_start = now;
            self.window_frames = 0;
        }

        delta
    }

    /// [`tick`](Self::tick) in seconds.
    pub fn delta_secs(&mut self) -> f32 {
        self.tick().as_secs_f32()
    }

    /// Frames ticked since creation or reset.
    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    /// Frames per second over the last completed window, 0 until one window has passed.
    pub fn fps(&self) -> f32 {
        self.fps
    }

    /// Restart all measurements from now.
    pub fn reset(&mut self) {
        *self = Self::new();
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
    fn test_tick_counts_frames() {
        let mut timer = Timer::new();
        timer.tick();
        timer.tick();
        timer.tick();
        assert_eq!(timer.frame_count(), 3);
    }

    #[test]
    fn test_fps_zero_before_first_window() {
        let mut timer = Timer::new();
        timer.tick();
        assert_eq!(timer.fps(), 0.0);
    }

    #[test]
    fn test_reset_clears_counters() {
        let mut timer = Timer::new();
        timer.tick();
        timer.reset();
        assert_eq!(timer.frame_count(), 0);
    }
}
