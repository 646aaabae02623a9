//! Value types passed between the pipeline, the optimizer and the sequencer.

use std::fmt;
use std::path::PathBuf;

use serde::Serialize;

use crate::error::{PackerError, Result};
use crate::positioner::PositionOutcome;

/// Measured product size in centimeters. Every axis is finite and positive.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ObjectDimensions {
    pub length: f64,
    pub width: f64,
    pub height: f64,
}

impl ObjectDimensions {
    pub fn new(length: f64, width: f64, height: f64) -> Result<Self> {
        for (axis, v) in [("length", length), ("width", width), ("height", height)] {
            if !(v.is_finite() && v > 0.0) {
                return Err(eyre::Report::new(PackerError::Precondition(format!(
                    "object {axis} must be a positive finite length, got {v}"
                ))));
            }
        }
        Ok(Self {
            length,
            width,
            height,
        })
    }

    pub fn axes(&self) -> [f64; 3] {
        [self.length, self.width, self.height]
    }
}

/// One member of the optimizer population.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Candidate {
    pub length: f64,
    pub width: f64,
    pub height: f64,
}

impl Candidate {
    pub fn from_axes([length, width, height]: [f64; 3]) -> Self {
        Self {
            length,
            width,
            height,
        }
    }

    pub fn axes(&self) -> [f64; 3] {
        [self.length, self.width, self.height]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct OptimizedDimensions {
    pub length: f64,
    pub width: f64,
    pub height: f64,
}

impl From<Candidate> for OptimizedDimensions {
    fn from(c: Candidate) -> Self {
        Self {
            length: c.length,
            width: c.width,
            height: c.height,
        }
    }
}

/// Wrap sheet to feed, in centimeters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct WrapSize {
    pub length: f64,
    pub width: f64,
}

/// Result of one capture, cached by the machine until the next capture.
#[derive(Debug, Clone, Serialize)]
pub struct MeasurementReport {
    pub object: ObjectDimensions,
    pub optimized: OptimizedDimensions,
    pub wrap: WrapSize,
    pub best_fitness: f64,
    pub front_image: PathBuf,
    pub side_image: PathBuf,
    pub positioner: PositionOutcome,
}

/// Ordered phases of a delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    ReleaseServo,
    ForkCycle,
    FeedWrap,
    RailsExpand,
    SealCycle,
    RailsRetract,
}

impl Phase {
    pub const DELIVERY: [Self; 6] = [
        Self::ReleaseServo,
        Self::ForkCycle,
        Self::FeedWrap,
        Self::RailsExpand,
        Self::SealCycle,
        Self::RailsRetract,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::ReleaseServo => "release_servo",
            Self::ForkCycle => "fork_cycle",
            Self::FeedWrap => "feed_wrap",
            Self::RailsExpand => "rails_expand",
            Self::SealCycle => "seal_cycle",
            Self::RailsRetract => "rails_retract",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SequenceReport {
    pub phases_completed: Vec<Phase>,
    pub elapsed_ms: u64,
}
