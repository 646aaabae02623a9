use std::fmt;

use serde::Serialize;
use thiserror::Error;

use crate::types::Phase;

/// Which echo edge a distance reading gave up on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Edge {
    Rising,
    Falling,
}

impl fmt::Display for Edge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Rising => "rising",
            Self::Falling => "falling",
        })
    }
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum VisionFailure {
    #[error("no contour found")]
    NoContour,
    #[error("largest contour too small ({area:.0} px^2 < {min:.0} px^2)")]
    ContourTooSmall { area: f64, min: f64 },
    #[error("frame unusable: {0}")]
    BadFrame(String),
}

#[derive(Debug, Error, Clone)]
pub enum PackerError {
    #[error("sensor timeout waiting for {0} echo edge")]
    SensorTimeout(Edge),
    #[error("vision failure: {0}")]
    Vision(#[from] VisionFailure),
    #[error("actuator fault during {phase}: {detail}")]
    ActuatorFault { phase: Phase, detail: String },
    #[error("precondition violated: {0}")]
    Precondition(String),
    #[error("hardware error: {0}")]
    Hardware(String),
    #[error("emergency stop engaged")]
    EstopEngaged,
    #[error("configuration error: {0}")]
    Config(String),
    #[error("io error: {0}")]
    Io(String),
    #[error("machine busy: another operation is in progress")]
    Busy,
}

#[derive(Debug, Error, Clone)]
pub enum BuildError {
    #[error("failed to claim {what} on BCM{bcm}: {detail}")]
    Claim {
        what: &'static str,
        bcm: u8,
        detail: String,
    },
    #[error("invalid config: {0}")]
    InvalidConfig(String),
}

pub type Result<T> = eyre::Result<T>;
pub use eyre::Report;
