//! Claims every line of the rig from a [`PinProvider`] and wraps it in a
//! registered, latch-aware handle.

use std::sync::Arc;
use std::time::Duration;

use packer_config::{Config, RelayPins, StepperPins};
use packer_traits::{Clock, DigitalInput, PinProvider};
use tracing::info;

use crate::actuators::{ActuatorGroup, OutputLine, PwmLine, RailPair, RelayPair, Stepper};
use crate::error::{BuildError, Result};
use crate::estop::EmergencyStop;

/// Every peripheral of the machine, claimed once at startup.
pub struct HardwareContext {
    pub estop: EmergencyStop,
    pub trigger: OutputLine,
    pub echo: Box<dyn DigitalInput + Send>,
    pub camera_servo: PwmLine,
    pub release_servo: PwmLine,
    pub rails: RailPair,
    pub feeder: Stepper,
    pub fork: Stepper,
    pub main: ActuatorGroup,
    pub left: ActuatorGroup,
    pub clock: Arc<dyn Clock + Send + Sync>,
}

struct Claimer<'a> {
    pins: &'a mut dyn PinProvider,
    estop: &'a EmergencyStop,
}

impl Claimer<'_> {
    fn output(&mut self, what: &'static str, bcm: u8, safe_high: bool) -> Result<OutputLine> {
        let pin = self
            .pins
            .output(bcm, safe_high)
            .map_err(|e| claim_error(what, bcm, &*e))?;
        Ok(self.estop.output(pin, safe_high, what))
    }

    fn pwm(&mut self, what: &'static str, bcm: u8, hz: f64) -> Result<PwmLine> {
        let pwm = self
            .pins
            .pwm(bcm, hz)
            .map_err(|e| claim_error(what, bcm, &*e))?;
        Ok(self.estop.pwm(pwm, what))
    }

    fn stepper(
        &mut self,
        names: [&'static str; 2],
        pins: StepperPins,
        enable: Option<OutputLine>,
        steps_per_cm: f64,
        cfg: &Config,
    ) -> Result<Stepper> {
        Ok(Stepper {
            step: self.output(names[0], pins.step, false)?,
            dir: self.output(names[1], pins.dir, false)?,
            enable,
            steps_per_cm,
            pulse: Duration::from_micros(cfg.motion.pulse_width_us),
            invert_direction: cfg.motion.invert_direction,
        })
    }

    fn relay_pair(
        &mut self,
        names: [&'static str; 2],
        pins: RelayPins,
        safe_high: bool,
        reversed: bool,
    ) -> Result<RelayPair> {
        Ok(RelayPair {
            relay1: self.output(names[0], pins.relay1, safe_high)?,
            relay2: self.output(names[1], pins.relay2, safe_high)?,
            reversed,
        })
    }
}

fn claim_error(what: &'static str, bcm: u8, e: &(dyn std::error::Error + Send + Sync)) -> eyre::Report {
    eyre::Report::new(BuildError::Claim {
        what,
        bcm,
        detail: e.to_string(),
    })
}

impl HardwareContext {
    /// Claim and wrap the pins named in `cfg.pins`. Every output starts at
    /// its safe level.
    pub fn build(
        pins: &mut dyn PinProvider,
        cfg: &Config,
        clock: Arc<dyn Clock + Send + Sync>,
    ) -> Result<Self> {
        cfg.validate()
            .map_err(|e| eyre::Report::new(BuildError::InvalidConfig(format!("{e:#}"))))?;
        let estop = EmergencyStop::new();
        let p = &cfg.pins;
        let relay_safe_high = cfg.motion.relay_active_low;
        let mut c = Claimer {
            pins,
            estop: &estop,
        };

        let trigger = c.output("trigger", p.trigger, false)?;
        let echo = c
            .pins
            .input(p.echo)
            .map_err(|e| claim_error("echo", p.echo, &*e))?;
        let camera_servo = c.pwm("camera_servo", p.camera_servo, cfg.servo.pwm_hz)?;
        let release_servo = c.pwm("release_servo", p.release_servo, cfg.servo.pwm_hz)?;

        let enable = match p.stepper_enable {
            Some(bcm) => Some(c.output("stepper_enable", bcm, true)?),
            None => None,
        };
        let m = &cfg.motion;
        let rails = RailPair {
            left: c.stepper(
                ["rail_left.step", "rail_left.dir"],
                p.rail_left,
                enable.clone(),
                m.steps_per_cm_rails,
                cfg,
            )?,
            right: c.stepper(
                ["rail_right.step", "rail_right.dir"],
                p.rail_right,
                enable.clone(),
                m.steps_per_cm_rails,
                cfg,
            )?,
        };
        let feeder = c.stepper(
            ["feeder.step", "feeder.dir"],
            p.feeder,
            enable.clone(),
            m.steps_per_cm_feeder,
            cfg,
        )?;
        let fork = c.stepper(
            ["fork.step", "fork.dir"],
            p.fork,
            enable,
            m.steps_per_cm_fork,
            cfg,
        )?;

        let mut actuators = Vec::with_capacity(p.main_actuators.len());
        for pair in &p.main_actuators {
            actuators.push(c.relay_pair(
                ["main.relay1", "main.relay2"],
                *pair,
                relay_safe_high,
                false,
            )?);
        }
        let main = ActuatorGroup {
            name: "main",
            actuators,
        };
        let left = ActuatorGroup {
            name: "left",
            actuators: vec![c.relay_pair(
                ["left.relay1", "left.relay2"],
                p.left_actuator,
                relay_safe_high,
                true,
            )?],
        };

        let (outputs, pwms) = estop.registered();
        info!(outputs, pwms, "hardware context ready");
        Ok(Self {
            estop,
            trigger,
            echo,
            camera_servo,
            release_servo,
            rails,
            feeder,
            fork,
            main,
            left,
            clock,
        })
    }
}
