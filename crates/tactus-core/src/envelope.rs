//! Attack/release envelopes cued against an automation parameter

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::automation::{AutomationParam, Curve, ParamSegment};
use crate::config::EnvelopeConfig;
use crate::error::{Result, TactusError};

/// Envelope curves.
///
/// Segment times in `attack` are relative to `start`, times in `release` are
/// relative to `stop`. Release values are scaled by the parameter's value at
/// the stop time, and the last release segment should reach 0 or the
/// envelope never finishes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    pub attack: Vec<ParamSegment>,
    pub release: Vec<ParamSegment>,
    /// Read on start
    pub gain: f64,
    /// Playback rate of both curves, read on start and stop
    pub rate: f64,
    #[serde(default)]
    target_duration_factor: f64,
    #[serde(skip)]
    start_time: Option<f64>,
    #[serde(skip)]
    stop_time: Option<f64>,
    #[serde(skip)]
    unterminated: bool,
}

impl Default for Envelope {
    fn default() -> Self {
        Self::new(&EnvelopeConfig::default())
    }
}

impl Envelope {
    pub fn new(config: &EnvelopeConfig) -> Self {
        Self {
            attack: vec![ParamSegment::new(0.008, Curve::Linear, 1.0)],
            release: vec![ParamSegment::new(0.008, Curve::Linear, 0.0)],
            gain: 1.0,
            rate: 1.0,
            target_duration_factor: config.target_duration_factor,
            start_time: None,
            stop_time: None,
            unterminated: false,
        }
    }

    pub fn with_attack(mut self, attack: Vec<ParamSegment>) -> Self {
        self.attack = attack;
        self
    }

    pub fn with_release(mut self, release: Vec<ParamSegment>) -> Self {
        self.release = release;
        self
    }

    pub fn start_time(&self) -> Option<f64> {
        self.start_time
    }

    /// End of the release tail; infinite for unterminated releases
    pub fn stop_time(&self) -> Option<f64> {
        self.stop_time
    }

    /// Set when the last stop found a release that never reaches 0
    pub fn is_unterminated(&self) -> bool {
        self.unterminated
    }

    pub fn is_playing(&self, time: f64) -> bool {
        let Some(start) = self.start_time else {
            return false;
        };
        time >= start && self.stop_time.is_none_or(|stop| time < stop)
    }

    /// Cue the attack curve at `time`
    pub fn start(&mut self, param: &mut dyn AutomationParam, time: f64) -> Result<()> {
        if self.attack.is_empty() {
            return Ok(());
        }
        cue_automation(param, &self.attack, time, self.gain, self.rate)?;
        self.start_time = Some(time);
        self.stop_time = None;
        self.unterminated = false;
        Ok(())
    }

    /// Cue the release curve at `time`, returning the time the envelope ends
    pub fn stop(&mut self, param: &mut dyn AutomationParam, time: f64) -> Result<f64> {
        if self.release.is_empty() {
            param.schedule_segment(time, Curve::Hold, 0.0, None);
            param.schedule_segment(time, Curve::Step, 0.0, None);
            self.stop_time = Some(time);
            return Ok(time);
        }

        let gain = param.value_at(time);
        cue_automation(param, &self.release, time, gain, self.rate)?;

        let stop_time = match self.release_tail() {
            Ok(tail) => time + tail,
            Err(e) => {
                warn!("Envelope: {}", e);
                self.unterminated = true;
                f64::INFINITY
            }
        };
        self.stop_time = Some(stop_time);
        Ok(stop_time)
    }

    fn release_tail(&self) -> Result<f64> {
        let Some(last) = self.release.last() else {
            return Ok(0.0);
        };
        if last.value != 0.0 {
            return Err(TactusError::UnterminatedRelease { final_value: last.value });
        }
        let tail = match (last.curve, last.duration) {
            (Curve::Target, Some(d)) => last.time + d * self.target_duration_factor,
            _ => last.time,
        };
        Ok(tail / self.rate)
    }
}

fn cue_automation(
    param: &mut dyn AutomationParam,
    segments: &[ParamSegment],
    time: f64,
    gain: f64,
    rate: f64,
) -> Result<()> {
    for segment in segments {
        segment.validate()?;
    }

    param.schedule_segment(time, Curve::Hold, 0.0, None);
    for segment in segments {
        param.schedule_segment(
            time + segment.time / rate,
            segment.curve,
            segment.value * gain,
            segment.duration.map(|d| d / rate),
        );
    }
    Ok(())
}
