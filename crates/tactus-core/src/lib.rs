//! tactus-core: Domain types for tempo-aware event scheduling

pub mod automation;
pub mod config;
mod envelope;
mod error;
mod event;
mod rate;

pub use automation::{validate_segment, AutomationParam, Curve, MemoryParam, ParamSegment};
pub use config::{ClockConfig, DemoConfig, EnvelopeConfig, TactusConfig, TimerConfig};
pub use envelope::Envelope;
pub use error::{Result, TactusError};
pub use event::{Event, EventKind, NestedSequence, ParamChange};
pub use rate::{RatePoint, RateTimeline};
