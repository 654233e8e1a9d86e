//! Scheduling configuration

use serde::{Deserialize, Serialize};

use crate::error::{Result, TactusError};

/// Lookahead timer tunables, in time-source units (seconds)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimerConfig {
    /// How far past the current time a cue window may reach
    pub lookahead: f64,
    /// Nominal tick period
    pub frame_duration: f64,
}

impl Default for TimerConfig {
    fn default() -> Self {
        Self {
            lookahead: 0.1,
            frame_duration: 0.2,
        }
    }
}

impl TimerConfig {
    pub fn validate(&self) -> Result<()> {
        if !self.lookahead.is_finite() || self.lookahead < 0.0 {
            return Err(TactusError::InvalidConfig(format!(
                "lookahead must be finite and >= 0, got {}",
                self.lookahead
            )));
        }
        if !self.frame_duration.is_finite() || self.frame_duration <= 0.0 {
            return Err(TactusError::InvalidConfig(format!(
                "frame_duration must be finite and > 0, got {}",
                self.frame_duration
            )));
        }
        Ok(())
    }
}

/// Defaults seeded into a clock's sequence on start
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClockConfig {
    pub default_rate: f64,
    pub meter_numerator: u32,
    pub meter_denominator: u32,
}

impl Default for ClockConfig {
    fn default() -> Self {
        Self {
            default_rate: 1.0,
            meter_numerator: 4,
            meter_denominator: 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnvelopeConfig {
    /// Time constants a target curve needs before it counts as arrived
    pub target_duration_factor: f64,
}

impl Default for EnvelopeConfig {
    fn default() -> Self {
        Self {
            target_duration_factor: 9.0,
        }
    }
}

/// Settings for the demo runner
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DemoConfig {
    pub run_seconds: f64,
    /// Seconds after start at which the tempo changes
    pub tempo_change_at: f64,
    pub tempo_change_bpm: f64,
}

impl Default for DemoConfig {
    fn default() -> Self {
        Self {
            run_seconds: 8.0,
            tempo_change_at: 4.0,
            tempo_change_bpm: 90.0,
        }
    }
}

impl DemoConfig {
    pub fn validate(&self) -> Result<()> {
        if !self.run_seconds.is_finite() || self.run_seconds < 0.0 {
            return Err(TactusError::InvalidConfig(format!(
                "run_seconds must be finite and >= 0, got {}",
                self.run_seconds
            )));
        }
        if !self.tempo_change_bpm.is_finite() || self.tempo_change_bpm <= 0.0 {
            return Err(TactusError::InvalidConfig(format!(
                "tempo_change_bpm must be finite and > 0, got {}",
                self.tempo_change_bpm
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TactusConfig {
    #[serde(default)]
    pub timer: TimerConfig,
    #[serde(default)]
    pub clock: ClockConfig,
    #[serde(default)]
    pub envelope: EnvelopeConfig,
    #[serde(default)]
    pub demo: DemoConfig,
}
