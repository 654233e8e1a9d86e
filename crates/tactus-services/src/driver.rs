//! Tick drivers: real-time and offline

use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError};
use tactus_core::TimerConfig;
use tracing::debug;

use crate::clock::TempoClock;
use crate::time_source::{ManualClock, TimeSource};
use crate::timer::CueWindow;

/// Calls `TempoClock::tick` at a fixed interval
#[derive(Debug, Clone, Copy)]
pub struct TickDriver {
    interval: f64,
}

impl TickDriver {
    /// Wakes often enough that no window is handed out late
    pub fn new(config: &TimerConfig) -> Self {
        let interval = if config.lookahead > 0.0 {
            config.frame_duration.min(config.lookahead)
        } else {
            config.frame_duration
        };
        Self { interval }
    }

    /// Seconds between ticks
    pub fn interval(&self) -> f64 {
        self.interval
    }

    /// Tick `clock` in real time until a message arrives on `stop` or its
    /// sender is dropped. Returns the number of ticks run.
    pub fn run<S: TimeSource>(
        &self,
        clock: &mut TempoClock<S>,
        stop: &Receiver<()>,
        mut on_tick: impl FnMut(&mut TempoClock<S>, CueWindow),
    ) -> u64 {
        let interval = Duration::from_secs_f64(self.interval);
        let mut ticks = 0;
        debug!(interval = self.interval, "Tick driver started");

        loop {
            let window = clock.tick();
            ticks += 1;
            on_tick(clock, window);

            match stop.recv_timeout(interval) {
                Err(RecvTimeoutError::Timeout) => continue,
                Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
            }
        }

        debug!(ticks, "Tick driver stopped");
        ticks
    }

    /// Step a manually clocked `clock` from its current time to `until`,
    /// one interval per tick
    pub fn render(&self, clock: &mut TempoClock<ManualClock>, until: f64) -> Vec<CueWindow> {
        let source = clock.timer().source().clone();
        let mut windows = Vec::new();
        while source.now() < until {
            windows.push(clock.tick());
            source.advance(self.interval);
        }
        windows.push(clock.tick());
        windows
    }
}
