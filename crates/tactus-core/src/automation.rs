//! Parameter automation: curve kinds, segment validation and the backend trait

use serde::{Deserialize, Serialize};

use crate::error::{Result, TactusError};

/// Shape of an automation segment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Curve {
    /// Jump to the value at the segment time
    #[default]
    Step,
    /// Ramp linearly from the previous point, arriving at the segment time
    Linear,
    /// Ramp exponentially from the previous point, arriving at the segment time
    Exponential,
    /// Approach the value from the segment time with a time constant
    Target,
    /// Freeze the current value and drop everything scheduled after it
    Hold,
}

impl Curve {
    /// Ramps must be known to the backend before they begin
    pub fn is_transition(self) -> bool {
        matches!(self, Curve::Linear | Curve::Exponential)
    }
}

/// A single automation point
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ParamSegment {
    pub time: f64,
    pub curve: Curve,
    pub value: f64,
    /// Time constant, required by `Curve::Target`
    #[serde(default)]
    pub duration: Option<f64>,
}

impl ParamSegment {
    pub fn new(time: f64, curve: Curve, value: f64) -> Self {
        Self { time, curve, value, duration: None }
    }

    pub fn target(time: f64, value: f64, duration: f64) -> Self {
        Self { time, curve: Curve::Target, value, duration: Some(duration) }
    }

    /// Check the fields this segment's curve needs
    pub fn validate(&self) -> Result<()> {
        validate_segment(self.time, self.curve, self.value, self.duration)
    }
}

/// Shape check shared by sequence param events and envelope curves
pub fn validate_segment(time: f64, curve: Curve, value: f64, duration: Option<f64>) -> Result<()> {
    if !time.is_finite() {
        return Err(TactusError::MalformedParamEvent(format!("non-finite time {time}")));
    }
    if curve == Curve::Hold {
        return Ok(());
    }
    if !value.is_finite() {
        return Err(TactusError::MalformedParamEvent(format!("non-finite value {value}")));
    }
    match curve {
        Curve::Target => match duration {
            Some(d) if d.is_finite() && d > 0.0 => Ok(()),
            _ => Err(TactusError::MalformedParamEvent(
                "target curve requires a positive duration".into(),
            )),
        },
        Curve::Exponential if value <= 0.0 => Err(TactusError::MalformedParamEvent(format!(
            "exponential curve requires a positive value, got {value}"
        ))),
        _ => Ok(()),
    }
}

/// A continuous parameter owned by an audio backend.
///
/// The scheduler never interpolates ramps itself, it only places segment
/// boundaries and reads back the value at a boundary.
pub trait AutomationParam {
    fn schedule_segment(&mut self, time: f64, curve: Curve, value: f64, duration: Option<f64>);
    fn value_at(&self, time: f64) -> f64;
}

/// In-memory automation lane.
///
/// Evaluates segments the way a web-audio style parameter does, so rate
/// records and envelopes work without a rendering backend attached.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MemoryParam {
    initial: f64,
    segments: Vec<ParamSegment>,
}

#[derive(Clone, Copy)]
struct Approach {
    start: f64,
    from: f64,
    to: f64,
    tau: f64,
}

impl Approach {
    fn at(&self, time: f64) -> f64 {
        self.to + (self.from - self.to) * (-(time - self.start) / self.tau).exp()
    }
}

impl MemoryParam {
    pub fn new(initial: f64) -> Self {
        Self { initial, segments: Vec::new() }
    }

    /// Scheduled segments in time order
    pub fn segments(&self) -> &[ParamSegment] {
        &self.segments
    }

    fn insert(&mut self, segment: ParamSegment) {
        let idx = self.segments.partition_point(|s| s.time <= segment.time);
        self.segments.insert(idx, segment);
    }
}

impl AutomationParam for MemoryParam {
    fn schedule_segment(&mut self, time: f64, curve: Curve, value: f64, duration: Option<f64>) {
        if curve == Curve::Hold {
            let held = self.value_at(time);
            self.segments.retain(|s| s.time < time);
            self.insert(ParamSegment::new(time, Curve::Step, held));
            return;
        }
        self.insert(ParamSegment { time, curve, value, duration });
    }

    fn value_at(&self, time: f64) -> f64 {
        let mut value = self.initial;
        let mut anchor: Option<(f64, f64)> = None;
        let mut approach: Option<Approach> = None;

        let current = |value: f64, approach: Option<Approach>, at: f64| {
            approach.map_or(value, |a| a.at(at))
        };

        for seg in &self.segments {
            if seg.time > time {
                let Some((t0, v0)) = anchor else {
                    return current(value, approach, time);
                };
                let span = seg.time - t0;
                if span <= 0.0 {
                    return current(value, approach, time);
                }
                let frac = (time - t0) / span;
                return match seg.curve {
                    Curve::Linear => v0 + (seg.value - v0) * frac,
                    Curve::Exponential if v0 > 0.0 && seg.value > 0.0 => {
                        v0 * (seg.value / v0).powf(frac)
                    }
                    _ => current(value, approach, time),
                };
            }

            let start = current(value, approach, seg.time);
            match seg.curve {
                Curve::Target => {
                    let tau = seg.duration.unwrap_or(f64::MIN_POSITIVE);
                    approach = Some(Approach { start: seg.time, from: start, to: seg.value, tau });
                    value = start;
                }
                _ => {
                    approach = None;
                    value = seg.value;
                }
            }
            anchor = Some((seg.time, value));
        }

        current(value, approach, time)
    }
}
