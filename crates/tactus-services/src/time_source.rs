//! Monotonic time readings for the scheduler

use std::cell::Cell;
use std::rc::Rc;
use std::time::Instant;

/// A monotonic clock reading in seconds
pub trait TimeSource {
    fn now(&self) -> f64;
}

/// Wall clock measured from construction
#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self { origin: Instant::now() }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl TimeSource for SystemClock {
    fn now(&self) -> f64 {
        self.origin.elapsed().as_secs_f64()
    }
}

/// Hand-driven clock for offline rendering and tests.
///
/// Clones share the same reading.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    time: Rc<Cell<f64>>,
}

impl ManualClock {
    pub fn new(time: f64) -> Self {
        Self { time: Rc::new(Cell::new(time)) }
    }

    pub fn set(&self, time: f64) {
        self.time.set(time);
    }

    pub fn advance(&self, delta: f64) {
        self.time.set(self.time.get() + delta);
    }
}

impl TimeSource for ManualClock {
    fn now(&self) -> f64 {
        self.time.get()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manual_clock_is_shared() {
        let clock = ManualClock::new(1.0);
        let view = clock.clone();
        clock.advance(0.5);
        assert_eq!(view.now(), 1.5);
        view.set(10.0);
        assert_eq!(clock.now(), 10.0);
    }

    #[test]
    fn test_system_clock_monotonic() {
        let clock = SystemClock::new();
        let a = clock.now();
        let b = clock.now();
        assert!(b >= a);
    }
}
