//! Piecewise-constant rate timeline and beat/time integration

use serde::{Deserialize, Serialize};

use crate::error::{Result, TactusError};
use crate::event::{Event, EventKind};

/// A rate change at a beat
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RatePoint {
    pub beat: f64,
    pub rate: f64,
}

/// Rate changes ordered by beat.
///
/// `initial_rate` applies from beat 0 until the first change. Changes at the
/// same beat keep insertion order, so the last one pushed wins.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateTimeline {
    initial_rate: f64,
    points: Vec<RatePoint>,
}

impl Default for RateTimeline {
    fn default() -> Self {
        Self::new(1.0)
    }
}

fn check_rate(rate: f64) -> Result<()> {
    if rate.is_finite() && rate > 0.0 {
        Ok(())
    } else {
        Err(TactusError::InvalidRate(rate))
    }
}

impl RateTimeline {
    /// Timeline with a single implicit rate. Falls back to 1 for invalid rates.
    pub fn new(initial_rate: f64) -> Self {
        let initial_rate = if check_rate(initial_rate).is_ok() { initial_rate } else { 1.0 };
        Self {
            initial_rate,
            points: Vec::new(),
        }
    }

    /// Collect the `rate` events of a sequence. Invalid entries are skipped.
    pub fn from_events<'a>(initial_rate: f64, events: impl IntoIterator<Item = &'a Event>) -> Self {
        let mut timeline = Self::new(initial_rate);
        for event in events {
            let EventKind::Rate { rate } = event.kind else {
                continue;
            };
            if let Err(e) = timeline.push(event.offset, rate) {
                tracing::warn!(offset = event.offset, "Dropping rate event: {}", e);
            }
        }
        timeline
    }

    pub fn initial_rate(&self) -> f64 {
        self.initial_rate
    }

    pub fn points(&self) -> &[RatePoint] {
        &self.points
    }

    /// Insert a change, after any existing change at the same beat
    pub fn push(&mut self, beat: f64, rate: f64) -> Result<()> {
        check_rate(rate)?;
        if !beat.is_finite() {
            return Err(TactusError::InvalidBeat(beat));
        }
        let idx = self.points.partition_point(|p| p.beat <= beat);
        self.points.insert(idx, RatePoint { beat, rate });
        Ok(())
    }

    /// Rate in effect at `beat`
    pub fn rate_at_beat(&self, beat: f64) -> f64 {
        self.points
            .iter()
            .take_while(|p| p.beat <= beat)
            .last()
            .map_or(self.initial_rate, |p| p.rate)
    }

    /// Beat reached after `elapsed` units of parent time
    pub fn beat_at(&self, elapsed: f64) -> f64 {
        let mut b = 0.0;
        let mut r = self.initial_rate;
        let mut t = 0.0;

        for point in &self.points {
            let next = t + (point.beat - b) / r;
            if next > elapsed {
                break;
            }
            t = next;
            b = point.beat;
            r = point.rate;
        }

        b + (elapsed - t) * r
    }

    /// Parent time elapsed when `beat` is reached
    pub fn time_at(&self, beat: f64) -> f64 {
        let mut b = 0.0;
        let mut r = self.initial_rate;
        let mut t = 0.0;

        for point in self.points.iter().take_while(|p| p.beat < beat) {
            t += (point.beat - b) / r;
            b = point.beat;
            r = point.rate;
        }

        t + (beat - b) / r
    }
}
