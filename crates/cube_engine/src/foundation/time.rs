//! Time management utilities
//!
//! The clock itself is supplied by the caller (GLFW's `get_time`), so both
//! types here are driven by plain `f64` seconds.

/// Frame delta tracker
#[derive(Debug, Clone, Default)]
pub struct Timer {
    last_time: Option<f64>,
    delta_time: f32,
}

impl Timer {
    /// Create a new timer
    pub fn new() -> Self {
        Self::default()
    }

    /// Advance to `now` and return the elapsed seconds since the last call
    ///
    /// The first call yields zero. A clock that goes backwards also yields zero.
    pub fn tick(&mut self, now: f64) -> f32 {
        self.delta_time = match self.last_time {
            Some(last) if now > last => (now - last) as f32,
            _ => 0.0,
        };
        self.last_time = Some(now);
        self.delta_time
    }

    /// Get the time since the last frame in seconds
    pub fn delta_time(&self) -> f32 {
        self.delta_time
    }
}

/// Counts frames and reports once per elapsed second
#[derive(Debug, Clone)]
pub struct FpsCounter {
    window_start: Option<f64>,
    frames: u32,
}

impl Default for FpsCounter {
    fn default() -> Self {
        Self::new()
    }
}

impl FpsCounter {
    /// Create a new counter
    pub fn new() -> Self {
        Self {
            window_start: None,
            frames: 0,
        }
    }

    /// Record one frame at time `now`
    ///
    /// Returns the frame count of the window that just closed when at least
    /// one second has passed since the window opened.
    pub fn frame(&mut self, now: f64) -> Option<u32> {
        let start = *self.window_start.get_or_insert(now);
        self.frames += 1;

        if now - start >= 1.0 {
            let fps = self.frames;
            self.frames = 0;
            self.window_start = Some(now);
            Some(fps)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_timer_first_tick_is_zero() {
        let mut timer = Timer::new();
        assert_relative_eq!(timer.tick(10.0), 0.0);
        assert_relative_eq!(timer.tick(10.25), 0.25);
        assert_relative_eq!(timer.delta_time(), 0.25);
    }

    #[test]
    fn test_timer_ignores_backwards_clock() {
        let mut timer = Timer::new();
        timer.tick(5.0);
        assert_relative_eq!(timer.tick(4.0), 0.0);
    }

    #[test]
    fn test_fps_counter_reports_once_per_second() {
        let mut fps = FpsCounter::new();
        let mut reports = Vec::new();
        for i in 0..=120 {
            if let Some(count) = fps.frame(f64::from(i) / 60.0) {
                reports.push(count);
            }
        }
        assert_eq!(reports, vec![61, 60]);
    }
}
