//! HC-SR04 style ultrasonic distance sensor.

use std::sync::Arc;
use std::time::Duration;

use eyre::WrapErr;
use packer_traits::{Clock, DigitalInput};
use tracing::{debug, trace};

use crate::actuators::OutputLine;
use crate::error::{Edge, PackerError, Result};
use crate::hw_error::hw_report;
use crate::util::wait_for_level;

#[derive(Debug, Clone)]
pub struct SensorCfg {
    pub timeout: Duration,
    pub speed_of_sound_cm_s: f64,
    pub settle: Duration,
    pub pulse: Duration,
    /// Sleep between echo reads.
    pub poll: Duration,
}

impl Default for SensorCfg {
    fn default() -> Self {
        Self {
            timeout: Duration::from_millis(200),
            speed_of_sound_cm_s: 34_300.0,
            settle: Duration::from_micros(200),
            pulse: Duration::from_micros(10),
            poll: Duration::from_micros(10),
        }
    }
}

pub struct DistanceSensor {
    trigger: OutputLine,
    echo: Box<dyn DigitalInput + Send>,
    clock: Arc<dyn Clock + Send + Sync>,
    cfg: SensorCfg,
}

impl DistanceSensor {
    pub fn new(
        trigger: OutputLine,
        echo: Box<dyn DigitalInput + Send>,
        clock: Arc<dyn Clock + Send + Sync>,
        cfg: SensorCfg,
    ) -> Self {
        Self {
            trigger,
            echo,
            clock,
            cfg,
        }
    }

    pub fn default_timeout(&self) -> Duration {
        self.cfg.timeout
    }

    /// One reading in centimeters.
    ///
    /// Each edge wait is bounded by `timeout` from when that wait begins, so
    /// a silent sensor returns `SensorTimeout` after at most two timeouts.
    /// No retry here; the caller decides.
    pub fn measure(&mut self, timeout: Duration) -> Result<f64> {
        self.trigger.release().wrap_err("trigger settle")?;
        self.clock.sleep(self.cfg.settle);
        self.trigger.set_active(true).wrap_err("trigger pulse")?;
        self.clock.sleep(self.cfg.pulse);
        self.trigger.release().wrap_err("trigger pulse")?;

        let clock = &*self.clock;
        let rise = wait_for_level(&mut *self.echo, true, timeout, self.cfg.poll, clock)
            .map_err(hw_report)
            .wrap_err("echo read")?
            .ok_or_else(|| eyre::Report::new(PackerError::SensorTimeout(Edge::Rising)))?;
        let fall = wait_for_level(&mut *self.echo, false, timeout, self.cfg.poll, clock)
            .map_err(hw_report)
            .wrap_err("echo read")?
            .ok_or_else(|| eyre::Report::new(PackerError::SensorTimeout(Edge::Falling)))?;

        let high = fall.saturating_duration_since(rise);
        let distance = high.as_secs_f64() * self.cfg.speed_of_sound_cm_s / 2.0;
        trace!(high_us = high.as_micros() as u64, "echo window");
        debug!(distance_cm = distance, "distance sample");
        Ok(distance)
    }
}
