//! Parks the side camera at a standoff distance before capture.
//!
//! A plain proportional loop: the error between the measured and target
//! distance, times a fixed gain, is subtracted from the servo angle. Failed
//! readings skip the iteration; running out of iterations is not an error.

use std::sync::Arc;
use std::time::Duration;

use packer_traits::Clock;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::sensor::DistanceSensor;
use crate::servo::ServoActuator;

#[derive(Debug, Clone)]
pub struct PositionerCfg {
    pub target_cm: f64,
    pub tolerance_cm: f64,
    pub max_iterations: u32,
    pub gain: f64,
    pub neutral_angle: f64,
    pub step_delay: Duration,
}

impl Default for PositionerCfg {
    fn default() -> Self {
        Self {
            target_cm: 15.0,
            tolerance_cm: 0.5,
            max_iterations: 20,
            gain: 1.2,
            neutral_angle: 90.0,
            step_delay: Duration::from_millis(100),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PositionOutcome {
    pub converged: bool,
    pub angle: f64,
    pub iterations: u32,
    pub last_distance_cm: Option<f64>,
    pub failed_readings: u32,
}

pub struct SideCameraPositioner {
    sensor: DistanceSensor,
    servo: ServoActuator,
    clock: Arc<dyn Clock + Send + Sync>,
    cfg: PositionerCfg,
}

impl SideCameraPositioner {
    pub fn new(
        sensor: DistanceSensor,
        servo: ServoActuator,
        clock: Arc<dyn Clock + Send + Sync>,
        cfg: PositionerCfg,
    ) -> Self {
        Self {
            sensor,
            servo,
            clock,
            cfg,
        }
    }

    pub fn sensor_mut(&mut self) -> &mut DistanceSensor {
        &mut self.sensor
    }

    /// Run the loop with the configured target, tolerance and iteration cap.
    pub fn adjust(&mut self) -> PositionOutcome {
        self.adjust_to_target(
            self.cfg.target_cm,
            self.cfg.tolerance_cm,
            self.cfg.max_iterations,
        )
    }

    pub fn adjust_to_target(
        &mut self,
        target_cm: f64,
        tolerance_cm: f64,
        max_iterations: u32,
    ) -> PositionOutcome {
        let mut angle = self.servo.clamp(self.cfg.neutral_angle);
        if !self.servo.set_angle(angle) {
            warn!(angle, "side camera servo did not reach neutral");
        }
        let timeout = self.sensor.default_timeout();
        let mut outcome = PositionOutcome {
            converged: false,
            angle,
            iterations: 0,
            last_distance_cm: None,
            failed_readings: 0,
        };

        for i in 0..max_iterations {
            outcome.iterations = i + 1;
            let distance = match self.sensor.measure(timeout) {
                Ok(d) => d,
                Err(e) => {
                    warn!(iteration = i, error = %e, "distance reading failed, skipping");
                    outcome.failed_readings += 1;
                    continue;
                }
            };
            outcome.last_distance_cm = Some(distance);
            let error = distance - target_cm;
            debug!(iteration = i, distance_cm = distance, error_cm = error, angle, "positioner");
            if error.abs() <= tolerance_cm {
                outcome.converged = true;
                break;
            }
            angle = self.servo.clamp(angle - error * self.cfg.gain);
            if !self.servo.set_angle(angle) {
                warn!(angle, "side camera servo command failed");
            }
            outcome.angle = angle;
            self.clock.sleep(self.cfg.step_delay);
        }

        if outcome.converged {
            info!(angle = outcome.angle, iterations = outcome.iterations, "side camera in position");
        } else {
            warn!(
                angle = outcome.angle,
                last_distance_cm = outcome.last_distance_cm,
                "side camera did not converge; capturing from last position"
            );
        }
        outcome
    }
}
