#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]
//! Core packaging logic (hardware-agnostic).
//!
//! All hardware goes through the `packer_traits` seams: digital and PWM
//! outputs, a digital input for the ultrasonic echo, still-image frame
//! sources and an injected `Clock`.
//!
//! ## Architecture
//!
//! - **Measurement**: `DistanceSensor`, `SideCameraPositioner`,
//!   `DimensionExtractor` and `MeasurementPipeline` turn two camera frames
//!   into an `ObjectDimensions`.
//! - **Sizing**: `DimensionOptimizer` searches for the tightest candidate box
//!   above the object plus margin; `wrap_size` turns it into a sheet size.
//! - **Motion**: `ActuatorSequencer` runs the delivery phases on steppers,
//!   servos and relay-driven linear actuators.
//! - **Safety**: every output is registered with the `EmergencyStop`; a
//!   `SafeStateGuard` de-energizes all of them when a capture or sequence
//!   ends, however it ends.
//! - **Facade**: `Machine` serializes operations and caches the last report.
//!
//! Public operations return `eyre::Result`; the typed cause is a
//! [`PackerError`] reachable with `downcast_ref`.

pub mod actuators;
pub mod context;
pub mod conversions;
pub mod error;
pub mod estop;
pub mod hw_error;
pub mod machine;
pub mod mocks;
pub mod optimizer;
pub mod pipeline;
pub mod positioner;
pub mod sensor;
pub mod sequencer;
pub mod servo;
pub mod types;
pub mod util;
pub mod vision;
pub mod wrap;

pub use actuators::{
    ActuatorGroup, Direction, OutputLine, PwmLine, RailPair, RelayPair, RelayState, Stepper,
    run_two_groups_in_parallel, steps_for,
};
pub use context::HardwareContext;
pub use error::{BuildError, Edge, PackerError, Result, VisionFailure};
pub use estop::{EmergencyStop, SafeStateGuard};
pub use machine::{CameraCheck, Machine, SelfCheckReport};
pub use optimizer::{DimensionOptimizer, Optimization, OptimizerParams, fitness};
pub use pipeline::{CameraStation, MeasurementPipeline};
pub use positioner::{PositionOutcome, PositionerCfg, SideCameraPositioner};
pub use sensor::{DistanceSensor, SensorCfg};
pub use sequencer::{ActuatorSequencer, ForkStep, SealStep, SequencerCfg, SequencerDrives};
pub use servo::{ServoActuator, ServoCfg, angle_to_duty};
pub use types::{
    Candidate, MeasurementReport, ObjectDimensions, OptimizedDimensions, Phase, SequenceReport,
    WrapSize,
};
pub use vision::{BoundingBox, CameraCalibration, DimensionExtractor, Extraction, VisionParams};
pub use wrap::{WrapFormula, wrap_size};
