//! Lookahead cue timer

use std::collections::VecDeque;
use std::fmt::Debug;

use tactus_core::{Result, TimerConfig};
use tracing::trace;

use crate::time_source::TimeSource;

/// Half-open time interval `[t1, t2)` scanned by one tick
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CueWindow {
    pub t1: f64,
    pub t2: f64,
}

impl CueWindow {
    pub fn contains(&self, time: f64) -> bool {
        self.t1 <= time && time < self.t2
    }

    pub fn duration(&self) -> f64 {
        self.t2 - self.t1
    }
}

/// Periodic cue driver keyed to a time source.
///
/// Cues are one-shot: a tick consumes every queued key and a cue that wants
/// the next window requests itself again. Keys requested while a tick is
/// being dispatched wait for the following tick.
pub struct LookaheadTimer<K, S> {
    source: S,
    config: TimerConfig,
    last_cue_time: Option<f64>,
    queued: Vec<K>,
    due: VecDeque<K>,
    ticks: u64,
}

impl<K: Copy + PartialEq + Debug, S: TimeSource> LookaheadTimer<K, S> {
    pub fn new(source: S, config: TimerConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            source,
            config,
            last_cue_time: None,
            queued: Vec::new(),
            due: VecDeque::new(),
            ticks: 0,
        })
    }

    pub fn now(&self) -> f64 {
        self.source.now()
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn config(&self) -> &TimerConfig {
        &self.config
    }

    /// End of the most recent window, `None` before the first tick
    pub fn last_cue_time(&self) -> Option<f64> {
        self.last_cue_time
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    pub fn request_cue(&mut self, key: K) {
        if !self.queued.contains(&key) {
            self.queued.push(key);
        }
    }

    pub fn cancel_cue(&mut self, key: K) {
        self.queued.retain(|k| *k != key);
        self.due.retain(|k| *k != key);
    }

    /// Queued for the next tick
    pub fn is_cued(&self, key: K) -> bool {
        self.queued.contains(&key)
    }

    /// Open the next window and move the queued cues into it
    pub fn begin_tick(&mut self) -> CueWindow {
        let now = self.source.now();
        let t1 = self.last_cue_time.unwrap_or(now);
        let t2 = (now + self.config.lookahead).max(t1);
        self.last_cue_time = Some(t2);

        let queued = std::mem::take(&mut self.queued);
        self.due.extend(queued);
        self.ticks += 1;

        trace!(tick = self.ticks, t1, t2, cues = self.due.len(), "Cue window");
        CueWindow { t1, t2 }
    }

    /// Next cue of the current tick, in registration order
    pub fn next_due(&mut self) -> Option<K> {
        self.due.pop_front()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time_source::ManualClock;

    fn timer(clock: &ManualClock) -> LookaheadTimer<u32, ManualClock> {
        LookaheadTimer::new(clock.clone(), TimerConfig::default()).unwrap()
    }

    #[test]
    fn test_windows_tile() {
        let clock = ManualClock::new(0.0);
        let mut timer = timer(&clock);
        assert_eq!(timer.last_cue_time(), None);

        let mut windows = Vec::new();
        for _ in 0..20 {
            windows.push(timer.begin_tick());
            clock.advance(0.2);
        }

        assert_eq!(windows[0], CueWindow { t1: 0.0, t2: 0.1 });
        for pair in windows.windows(2) {
            assert_eq!(pair[0].t2, pair[1].t1);
            assert!(pair[1].duration() >= 0.0);
        }
        assert_eq!(timer.last_cue_time(), Some(windows[19].t2));
    }

    #[test]
    fn test_window_never_moves_backwards() {
        let clock = ManualClock::new(5.0);
        let mut timer = timer(&clock);
        let first = timer.begin_tick();
        clock.set(1.0);
        let second = timer.begin_tick();
        assert_eq!(second.t1, first.t2);
        assert_eq!(second.t2, first.t2);
    }

    #[test]
    fn test_cues_are_one_shot_and_ordered() {
        let clock = ManualClock::new(0.0);
        let mut timer = timer(&clock);
        timer.request_cue(2);
        timer.request_cue(1);
        timer.request_cue(2);

        timer.begin_tick();
        assert_eq!(timer.next_due(), Some(2));
        // Requested mid-tick, runs next tick
        timer.request_cue(3);
        assert_eq!(timer.next_due(), Some(1));
        assert_eq!(timer.next_due(), None);

        timer.begin_tick();
        assert_eq!(timer.next_due(), Some(3));
        assert_eq!(timer.next_due(), None);

        timer.begin_tick();
        assert_eq!(timer.next_due(), None);
    }

    #[test]
    fn test_cancel_is_idempotent() {
        let clock = ManualClock::new(0.0);
        let mut timer = timer(&clock);
        timer.cancel_cue(7);
        timer.request_cue(7);
        timer.request_cue(8);
        assert!(timer.is_cued(7));

        timer.begin_tick();
        timer.cancel_cue(8);
        timer.cancel_cue(8);
        assert_eq!(timer.next_due(), Some(7));
        assert_eq!(timer.next_due(), None);
        assert!(!timer.is_cued(7));
    }

    #[test]
    fn test_invalid_config() {
        let clock = ManualClock::new(0.0);
        let config = TimerConfig { frame_duration: -1.0, ..Default::default() };
        assert!(LookaheadTimer::<u32, _>::new(clock, config).is_err());
    }
}
