use std::time::{Duration, Instant};

/// Ring buffer of recent frame durations.
#[derive(Debug)]
pub struct FrameTimer {
    history: Vec<Duration>,
    index: usize,
    filled: bool,
}

impl FrameTimer {
    /// A timer remembering the last `capacity` frames (at least one).
    pub fn new(capacity: usize) -> Self {
        Self {
            history: vec![Duration::ZERO; capacity.max(1)],
            index: 0,
            filled: false,
        }
    }

    pub fn record(&mut self, dt: Duration) {
        self.history[self.index] = dt;
        self.index = (self.index + 1) % self.history.len();
        if self.index == 0 {
            self.filled = true;
        }
    }

    fn recorded(&self) -> &[Duration] {
        let count = if self.filled { self.history.len() } else { self.index };
        &self.history[..count]
    }

    pub fn len(&self) -> usize {
        self.recorded().len()
    }

    pub fn is_empty(&self) -> bool {
        self.recorded().is_empty()
    }

    pub fn average(&self) -> Duration {
        let recorded = self.recorded();
        if recorded.is_empty() {
            return Duration::ZERO;
        }
        recorded.iter().sum::<Duration>() / recorded.len() as u32
    }

    pub fn max(&self) -> Duration {
        self.recorded().iter().copied().max().unwrap_or(Duration::ZERO)
    }

    pub fn min(&self) -> Duration {
        self.recorded().iter().copied().min().unwrap_or(Duration::ZERO)
    }
}

/// Per-frame delta time source for the main loop.
#[derive(Debug)]
pub struct FrameClock {
    last: Option<Instant>,
    timer: FrameTimer,
    frames: u64,
}

impl Default for FrameClock {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameClock {
    /// Frames kept for the timing statistics.
    pub const HISTORY: usize = 120;

    pub fn new() -> Self {
        Self {
            last: None,
            timer: FrameTimer::new(Self::HISTORY),
            frames: 0,
        }
    }

    /// Seconds since the previous tick.
    pub fn tick(&mut self) -> f32 {
        self.tick_at(Instant::now())
    }

    /// Seconds between `now` and the previous tick. The first tick returns 0.
    pub fn tick_at(&mut self, now: Instant) -> f32 {
        let dt = match self.last {
            Some(last) => now.saturating_duration_since(last),
            None => Duration::ZERO,
        };
        self.last = Some(now);
        self.frames += 1;
        if self.frames > 1 {
            self.timer.record(dt);
        }
        if self.frames % Self::HISTORY as u64 == 0 {
            tracing::debug!(
                frames = self.frames,
                avg_ms = self.timer.average().as_secs_f64() * 1000.0,
                max_ms = self.timer.max().as_secs_f64() * 1000.0,
                "frame timing"
            );
        }
        dt.as_secs_f32()
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }

    pub fn timer(&self) -> &FrameTimer {
        &self.timer
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timer_stats() {
        let mut timer = FrameTimer::new(3);
        assert_eq!(timer.average(), Duration::ZERO);
        assert!(timer.is_empty());

        timer.record(Duration::from_millis(10));
        timer.record(Duration::from_millis(20));
        assert_eq!(timer.average(), Duration::from_millis(15));
        assert_eq!(timer.min(), Duration::from_millis(10));
        assert_eq!(timer.max(), Duration::from_millis(20));
    }

    #[test]
    fn timer_wraps_and_forgets_oldest() {
        let mut timer = FrameTimer::new(2);
        timer.record(Duration::from_millis(100));
        timer.record(Duration::from_millis(10));
        timer.record(Duration::from_millis(20));
        assert_eq!(timer.len(), 2);
        assert_eq!(timer.max(), Duration::from_millis(20));
    }

    #[test]
    fn first_tick_is_zero() {
        let mut clock = FrameClock::new();
        assert_eq!(clock.tick_at(Instant::now()), 0.0);
        assert!(clock.timer().is_empty());
    }

    #[test]
    fn tick_measures_elapsed_time() {
        let mut clock = FrameClock::new();
        let start = Instant::now();
        clock.tick_at(start);
        let dt = clock.tick_at(start + Duration::from_millis(16));
        assert!((dt - 0.016).abs() < 1e-6);
        assert_eq!(clock.frames(), 2);
        assert_eq!(clock.timer().average(), Duration::from_millis(16));
    }

    #[test]
    fn clock_never_goes_backwards() {
        let mut clock = FrameClock::new();
        let start = Instant::now() + Duration::from_secs(1);
        clock.tick_at(start);
        assert_eq!(clock.tick_at(start - Duration::from_millis(5)), 0.0);
    }
}
