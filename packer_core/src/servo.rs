//! Hobby servos on a PWM line: camera pan and the release arm.

use std::sync::Arc;
use std::time::Duration;

use packer_traits::Clock;
use tracing::{debug, warn};

use crate::actuators::PwmLine;

#[derive(Debug, Clone)]
pub struct ServoCfg {
    pub min_angle: f64,
    pub max_angle: f64,
    pub settle: Duration,
}

impl Default for ServoCfg {
    fn default() -> Self {
        Self {
            min_angle: 0.0,
            max_angle: 160.0,
            settle: Duration::from_millis(500),
        }
    }
}

/// Duty cycle in percent for a hobby servo at 50 Hz.
#[inline]
pub fn angle_to_duty(angle: f64) -> f64 {
    angle / 18.0 + 2.5
}

/// Hobby servo on a PWM line. The pulse is held only while settling, then
/// released so the horn does not jitter or heat up.
pub struct ServoActuator {
    pwm: PwmLine,
    clock: Arc<dyn Clock + Send + Sync>,
    cfg: ServoCfg,
}

impl ServoActuator {
    pub fn new(pwm: PwmLine, clock: Arc<dyn Clock + Send + Sync>, cfg: ServoCfg) -> Self {
        Self { pwm, clock, cfg }
    }

    pub fn clamp(&self, angle: f64) -> f64 {
        if angle.is_nan() {
            return self.cfg.min_angle;
        }
        angle.clamp(self.cfg.min_angle, self.cfg.max_angle)
    }

    /// Move to `angle` (clamped to the rig's safe range) and block until settled.
    ///
    /// Driver errors are logged and reported as `false`; callers run physical
    /// sequences that must still reach their cleanup.
    pub fn set_angle(&self, angle: f64) -> bool {
        let target = self.clamp(angle);
        let duty = angle_to_duty(target);
        debug!(servo = self.pwm.label(), angle = target, duty, "servo move");
        if let Err(e) = self.pwm.set_duty(duty) {
            warn!(servo = self.pwm.label(), angle = target, error = %e, "servo command failed");
            let _ = self.pwm.zero();
            return false;
        }
        self.clock.sleep(self.cfg.settle);
        if let Err(e) = self.pwm.zero() {
            warn!(servo = self.pwm.label(), error = %e, "servo release failed");
            return false;
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duty_map_endpoints() {
        assert!((angle_to_duty(0.0) - 2.5).abs() < 1e-12);
        assert!((angle_to_duty(90.0) - 7.5).abs() < 1e-12);
        assert!((angle_to_duty(180.0) - 12.5).abs() < 1e-12);
    }
}
