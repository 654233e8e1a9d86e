//! Sequence events

use serde::{Deserialize, Serialize};

use crate::automation::{validate_segment, Curve};
use crate::error::Result;

/// A parameter change carried by a `param` event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParamChange {
    pub name: String,
    pub value: f64,
    #[serde(default)]
    pub curve: Curve,
    /// Time constant for `Curve::Target`
    #[serde(default)]
    pub duration: Option<f64>,
}

/// A sequence embedded in another sequence
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NestedSequence {
    pub events: Vec<Event>,
    /// Rate of the nested sequence at its beat 0, relative to the parent's beats
    pub rate: f64,
    /// Beat of the nested sequence that lines up with the event offset
    #[serde(default)]
    pub start_beat: f64,
    /// Length in nested beats after `start_beat`; unbounded when absent
    #[serde(default)]
    pub duration: Option<f64>,
    /// Routing tag passed through to consumers
    #[serde(default)]
    pub address: Option<String>,
}

impl NestedSequence {
    pub fn new(events: Vec<Event>) -> Self {
        Self {
            events,
            rate: 1.0,
            start_beat: 0.0,
            duration: None,
            address: None,
        }
    }

    pub fn with_rate(mut self, rate: f64) -> Self {
        self.rate = rate;
        self
    }

    pub fn with_start_beat(mut self, start_beat: f64) -> Self {
        self.start_beat = start_beat;
        self
    }

    pub fn with_duration(mut self, duration: f64) -> Self {
        self.duration = Some(duration);
        self
    }

    pub fn with_address(mut self, address: impl Into<String>) -> Self {
        self.address = Some(address.into());
        self
    }
}

/// What an event does
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum EventKind {
    Rate { rate: f64 },
    Meter { numerator: u32, denominator: u32 },
    Note { number: u8, velocity: f32, duration: f64 },
    NoteOn { number: u8, velocity: f32 },
    NoteOff { number: u8 },
    Param(ParamChange),
    Pitch { semitones: f64 },
    Chord { root: String, mode: String, duration: f64 },
    Sequence(NestedSequence),
}

/// An event at a beat offset within its sequence
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Position in the owning sequence's beats
    pub offset: f64,
    #[serde(flatten)]
    pub kind: EventKind,
}

impl Event {
    pub fn new(offset: f64, kind: EventKind) -> Self {
        Self { offset, kind }
    }

    pub fn rate(offset: f64, rate: f64) -> Self {
        Self::new(offset, EventKind::Rate { rate })
    }

    pub fn meter(offset: f64, numerator: u32, denominator: u32) -> Self {
        Self::new(offset, EventKind::Meter { numerator, denominator })
    }

    pub fn note(offset: f64, number: u8, velocity: f32, duration: f64) -> Self {
        Self::new(offset, EventKind::Note { number, velocity, duration })
    }

    pub fn param(offset: f64, name: impl Into<String>, value: f64, curve: Curve) -> Self {
        Self::new(
            offset,
            EventKind::Param(ParamChange {
                name: name.into(),
                value,
                curve,
                duration: None,
            }),
        )
    }

    pub fn sequence(offset: f64, sequence: NestedSequence) -> Self {
        Self::new(offset, EventKind::Sequence(sequence))
    }

    pub fn is_rate(&self) -> bool {
        matches!(self.kind, EventKind::Rate { .. })
    }

    pub fn is_meter(&self) -> bool {
        matches!(self.kind, EventKind::Meter { .. })
    }

    /// Shape check applied before an event is scheduled
    pub fn validate(&self) -> Result<()> {
        if let EventKind::Param(change) = &self.kind {
            validate_segment(self.offset, change.curve, change.value, change.duration)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_helpers() {
        assert!(Event::rate(0.0, 2.0).is_rate());
        assert!(Event::meter(0.0, 4, 1).is_meter());
        assert!(!Event::note(1.0, 60, 0.8, 1.0).is_rate());
    }

    #[test]
    fn test_param_event_validation() {
        let ok = Event::param(1.0, "gain", 0.5, Curve::Linear);
        assert!(ok.validate().is_ok());

        let missing_duration = Event::param(1.0, "gain", 0.0, Curve::Target);
        assert!(missing_duration.validate().is_err());

        let mut with_duration = missing_duration.clone();
        if let EventKind::Param(change) = &mut with_duration.kind {
            change.duration = Some(0.1);
        }
        assert!(with_duration.validate().is_ok());
    }

    #[test]
    fn test_nested_sequence_builder() {
        let seq = NestedSequence::new(vec![Event::note(0.0, 60, 1.0, 0.5)])
            .with_rate(2.0)
            .with_start_beat(1.0)
            .with_duration(4.0)
            .with_address("drums");

        assert_eq!(seq.rate, 2.0);
        assert_eq!(seq.start_beat, 1.0);
        assert_eq!(seq.duration, Some(4.0));
        assert_eq!(seq.address.as_deref(), Some("drums"));
    }
}
