//! Error types for tactus

use thiserror::Error;

use crate::automation::Curve;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum TactusError {
    #[error("{context} only supports step automation, got {curve:?}")]
    InvalidAutomationShape { context: &'static str, curve: Curve },
    #[error("Malformed param event: {0}")]
    MalformedParamEvent(String),
    #[error("Release does not end at 0 (final value {final_value}), envelope will never stop")]
    UnterminatedRelease { final_value: f64 },
    #[error("Invalid rate {0}: rate must be finite and greater than 0")]
    InvalidRate(f64),
    #[error("Invalid beat {0}: beat must be finite")]
    InvalidBeat(f64),
    #[error("Invalid config: {0}")]
    InvalidConfig(String),
}

pub type Result<T> = std::result::Result<T, TactusError>;
