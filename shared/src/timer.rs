use std::time::{Duration, Instant};

/// A Timer with a given duration after which it will enter into a "Ringing"
/// state. The Timer can be reset at an given time, or manually set to start
/// "Ringing" again. A zero duration never rings.
pub struct Timer {
    duration: Duration,
    last: Instant,
}

impl Timer {
    /// Creates a new Timer with a given duration
    pub fn new(duration: Duration) -> Self {
        Self {
            duration,
            last: Instant::now(),
        }
    }

    /// Reset the Timer to stop ringing and wait till 'duration' has elapsed
    /// again
    pub fn reset(&mut self) {
        self.last = Instant::now();
    }

    /// Gets whether or not the Timer is "Ringing" (i.e. the given duration has
    /// elapsed since the last "reset")
    pub fn ringing(&self) -> bool {
        !self.duration.is_zero() && self.last.elapsed() >= self.duration
    }

    /// Manually causes the Timer to enter into a "Ringing" state
    pub fn ring_manual(&mut self) {
        if let Some(last) = Instant::now().checked_sub(self.duration) {
            self.last = last;
        }
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }

    pub fn is_enabled(&self) -> bool {
        !self.duration.is_zero()
    }
}
