//! Shared output handles and the motion primitives built on them.
//!
//! Every physical output is wrapped in an [`OutputLine`] or [`PwmLine`]: a
//! cloneable handle that knows its safe (de-energized) level and observes the
//! emergency-stop latch. While the latch is set, any attempt to drive a line
//! away from its safe level fails, which is how an out-of-band stop aborts a
//! running sequence at its next action.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use eyre::WrapErr;
use packer_traits::{Clock, DigitalOutput, PwmOutput};
use serde::Serialize;
use tracing::{debug, trace};

use crate::error::{PackerError, Result};
use crate::hw_error::hw_report;

/// A digital output shared between its owner and the emergency stop.
#[derive(Clone)]
pub struct OutputLine {
    pin: Arc<Mutex<Box<dyn DigitalOutput + Send>>>,
    safe_high: bool,
    label: Arc<str>,
    latch: Arc<AtomicBool>,
}

impl std::fmt::Debug for OutputLine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OutputLine")
            .field("label", &self.label)
            .field("safe_high", &self.safe_high)
            .finish()
    }
}

impl OutputLine {
    /// A line with its own latch, not reachable by any emergency stop.
    pub fn new(pin: Box<dyn DigitalOutput + Send>, safe_high: bool, label: &str) -> Self {
        Self::with_latch(pin, safe_high, label, Arc::new(AtomicBool::new(false)))
    }

    pub(crate) fn with_latch(
        pin: Box<dyn DigitalOutput + Send>,
        safe_high: bool,
        label: &str,
        latch: Arc<AtomicBool>,
    ) -> Self {
        Self {
            pin: Arc::new(Mutex::new(pin)),
            safe_high,
            label: Arc::from(label),
            latch,
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Drive the line to its active (`true`) or safe (`false`) level.
    pub fn set_active(&self, active: bool) -> Result<()> {
        let level = active != self.safe_high;
        let mut pin = self.pin.lock().unwrap_or_else(PoisonError::into_inner);
        if active && self.latch.load(Ordering::SeqCst) {
            return Err(eyre::Report::new(PackerError::EstopEngaged))
                .wrap_err_with(|| format!("{} refused", self.label));
        }
        pin.write(level)
            .map_err(hw_report)
            .wrap_err_with(|| format!("{} write", self.label))
    }

    /// Return to the safe level; ignores the latch.
    pub fn release(&self) -> Result<()> {
        self.set_active(false)
    }
}

/// A PWM channel shared between its owner and the emergency stop.
#[derive(Clone)]
pub struct PwmLine {
    pwm: Arc<Mutex<Box<dyn PwmOutput + Send>>>,
    label: Arc<str>,
    latch: Arc<AtomicBool>,
}

impl PwmLine {
    pub fn new(pwm: Box<dyn PwmOutput + Send>, label: &str) -> Self {
        Self::with_latch(pwm, label, Arc::new(AtomicBool::new(false)))
    }

    pub(crate) fn with_latch(
        pwm: Box<dyn PwmOutput + Send>,
        label: &str,
        latch: Arc<AtomicBool>,
    ) -> Self {
        Self {
            pwm: Arc::new(Mutex::new(pwm)),
            label: Arc::from(label),
            latch,
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn set_duty(&self, percent: f64) -> Result<()> {
        let mut pwm = self.pwm.lock().unwrap_or_else(PoisonError::into_inner);
        if percent > 0.0 && self.latch.load(Ordering::SeqCst) {
            return Err(eyre::Report::new(PackerError::EstopEngaged))
                .wrap_err_with(|| format!("{} refused", self.label));
        }
        pwm.set_duty_cycle(percent)
            .map_err(hw_report)
            .wrap_err_with(|| format!("{} duty", self.label))
    }

    pub fn zero(&self) -> Result<()> {
        self.set_duty(0.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Forward,
    Backward,
}

/// Steps needed to cover `distance_cm`, rounded up. A tiny tolerance keeps
/// products like 0.4 * 400 from rounding up on float noise.
pub fn steps_for(distance_cm: f64, steps_per_cm: f64) -> u64 {
    let exact = distance_cm * steps_per_cm;
    if !(exact.is_finite() && exact > 0.0) {
        return 0;
    }
    (exact - 1e-6).ceil().max(0.0) as u64
}

/// Step/direction driver with an optional shared active-low enable.
#[derive(Debug, Clone)]
pub struct Stepper {
    pub step: OutputLine,
    pub dir: OutputLine,
    pub enable: Option<OutputLine>,
    pub steps_per_cm: f64,
    pub pulse: Duration,
    pub invert_direction: bool,
}

impl Stepper {
    pub fn move_cm(&self, distance_cm: f64, dir: Direction, clock: &dyn Clock) -> Result<u64> {
        pulse_in_lockstep(std::slice::from_ref(self), distance_cm, dir, clock)
    }

    fn set_direction(&self, dir: Direction) -> Result<()> {
        let backward = matches!(dir, Direction::Backward);
        self.dir.set_active(backward != self.invert_direction)
    }
}

/// Both wrap rails, always moved together.
#[derive(Debug, Clone)]
pub struct RailPair {
    pub left: Stepper,
    pub right: Stepper,
}

impl RailPair {
    pub fn move_cm(&self, distance_cm: f64, dir: Direction, clock: &dyn Clock) -> Result<u64> {
        pulse_in_lockstep(&[self.left.clone(), self.right.clone()], distance_cm, dir, clock)
    }
}

/// Pulse every stepper in `group` the same number of steps, one shared loop.
/// Steps are computed from the first stepper's resolution.
fn pulse_in_lockstep(
    group: &[Stepper],
    distance_cm: f64,
    dir: Direction,
    clock: &dyn Clock,
) -> Result<u64> {
    let Some(lead) = group.first() else {
        return Ok(0);
    };
    let steps = steps_for(distance_cm, lead.steps_per_cm);
    debug!(steps, distance_cm, ?dir, "stepper move");
    for s in group {
        s.set_direction(dir)?;
        if let Some(en) = &s.enable {
            en.set_active(true)?;
        }
    }
    let result = (|| -> Result<()> {
        for _ in 0..steps {
            for s in group {
                s.step.set_active(true)?;
            }
            clock.sleep(lead.pulse);
            for s in group {
                s.step.set_active(false)?;
            }
            clock.sleep(lead.pulse);
        }
        Ok(())
    })();
    for s in group {
        if let Some(en) = &s.enable
            && let Err(e) = en.release()
        {
            tracing::warn!(error = %e, "stepper disable failed");
        }
    }
    result.map(|()| steps)
}

/// What a relay-driven linear actuator is doing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RelayState {
    Off,
    Push,
    Pull,
}

/// Two relays driving one linear actuator. `reversed` swaps which relay pushes.
#[derive(Debug, Clone)]
pub struct RelayPair {
    pub relay1: OutputLine,
    pub relay2: OutputLine,
    pub reversed: bool,
}

impl RelayPair {
    /// Break before make: the opposing relay is always released first, so
    /// both relays are never energized together.
    pub fn set(&self, state: RelayState) -> Result<()> {
        let (push, pull) = if self.reversed {
            (&self.relay2, &self.relay1)
        } else {
            (&self.relay1, &self.relay2)
        };
        match state {
            RelayState::Off => {
                push.release()?;
                pull.release()
            }
            RelayState::Push => {
                pull.release()?;
                push.set_active(true)
            }
            RelayState::Pull => {
                push.release()?;
                pull.set_active(true)
            }
        }
    }
}

/// Actuators that always stroke together.
#[derive(Debug, Clone)]
pub struct ActuatorGroup {
    pub name: &'static str,
    pub actuators: Vec<RelayPair>,
}

impl ActuatorGroup {
    pub fn set(&self, state: RelayState) -> Result<()> {
        trace!(group = self.name, ?state, "actuator group");
        for a in &self.actuators {
            a.set(state)
                .wrap_err_with(|| format!("{} group {state:?}", self.name))?;
        }
        Ok(())
    }

    /// Best-effort: release every relay, reporting the first failure.
    pub fn off(&self) -> Result<()> {
        let mut first = None;
        for a in &self.actuators {
            if let Err(e) = a.set(RelayState::Off) {
                first.get_or_insert(e);
            }
        }
        first.map_or(Ok(()), Err)
    }
}

/// Stroke two groups with independent durations on one thread.
///
/// Both groups are energized together; after `min(dur_a, dur_b)` the group
/// with the shorter stroke is released while the other keeps going, and after
/// `max(dur_a, dur_b)` everything is released. On any failure both groups are
/// released before the error is returned.
pub fn run_two_groups_in_parallel(
    a: &ActuatorGroup,
    b: &ActuatorGroup,
    state: RelayState,
    dur_a: Duration,
    dur_b: Duration,
    clock: &dyn Clock,
) -> Result<()> {
    let result = (|| -> Result<()> {
        a.set(state)?;
        b.set(state)?;
        let (first_len, shorter) = if dur_b < dur_a { (dur_b, b) } else { (dur_a, a) };
        clock.sleep(first_len);
        if dur_a != dur_b {
            shorter.off()?;
            clock.sleep(dur_a.abs_diff(dur_b));
        }
        a.off()?;
        b.off()
    })();
    if result.is_err() {
        let _ = a.off();
        let _ = b.off();
    }
    result
}
