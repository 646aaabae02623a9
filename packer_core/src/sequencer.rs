//! Delivery sequence: release, fork, feed, rails out, seal, rails in.
//!
//! Phases run strictly in order and each one starts only after the previous
//! one finished. The first failing action aborts the sequence with an
//! `ActuatorFault` naming its phase; a [`SafeStateGuard`] returns every
//! output to its safe level on the way out, on success and failure alike.

use std::sync::Arc;
use std::time::Duration;

use packer_traits::Clock;
use tracing::{error, info, warn};

use crate::actuators::{
    ActuatorGroup, Direction, RailPair, RelayState, Stepper, run_two_groups_in_parallel,
};
use crate::error::{PackerError, Result};
use crate::estop::{EmergencyStop, SafeStateGuard};
use crate::servo::ServoActuator;
use crate::types::{Phase, SequenceReport, WrapSize};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ForkStep {
    pub distance_cm: f64,
    pub dwell: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SealStep {
    pub state: RelayState,
    pub main: Duration,
    pub left: Duration,
    pub dwell: Duration,
}

#[derive(Debug, Clone)]
pub struct SequencerCfg {
    pub stock_width_cm: f64,
    pub max_wrap_length_cm: f64,
    pub release_angle: f64,
    pub recovery_angles: Vec<f64>,
    pub recovery_step: Duration,
    pub after_release: Duration,
    pub before_feed: Duration,
    pub fork_strokes: Vec<ForkStep>,
    pub seal_strokes: Vec<SealStep>,
    pub initial_feed_cm: f64,
}

impl Default for SequencerCfg {
    fn default() -> Self {
        let ms = Duration::from_millis;
        let seal = |state, main, left, dwell| SealStep {
            state,
            main: ms(main),
            left: ms(left),
            dwell: ms(dwell),
        };
        Self {
            stock_width_cm: 25.4,
            max_wrap_length_cm: 100.0,
            release_angle: 55.0,
            recovery_angles: vec![50.0, 55.0, 25.0, 10.0, 0.0],
            recovery_step: ms(300),
            after_release: ms(3000),
            before_feed: ms(5000),
            fork_strokes: vec![
                ForkStep {
                    distance_cm: 0.4,
                    dwell: ms(1000),
                },
                ForkStep {
                    distance_cm: 0.8,
                    dwell: ms(1000),
                },
                ForkStep {
                    distance_cm: 1.9,
                    dwell: ms(300),
                },
            ],
            seal_strokes: vec![
                seal(RelayState::Push, 1000, 800, 4000),
                seal(RelayState::Pull, 500, 200, 500),
                seal(RelayState::Push, 500, 200, 4000),
                seal(RelayState::Pull, 500, 200, 500),
                seal(RelayState::Push, 500, 200, 4000),
                seal(RelayState::Pull, 2000, 800, 2000),
            ],
            initial_feed_cm: 4.0,
        }
    }
}

/// Motion hardware driven by the sequencer.
pub struct SequencerDrives {
    pub release_servo: ServoActuator,
    pub fork: Stepper,
    pub feeder: Stepper,
    pub rails: RailPair,
    pub main: ActuatorGroup,
    pub left: ActuatorGroup,
}

pub struct ActuatorSequencer {
    release_servo: ServoActuator,
    fork: Stepper,
    feeder: Stepper,
    rails: RailPair,
    main: ActuatorGroup,
    left: ActuatorGroup,
    estop: EmergencyStop,
    clock: Arc<dyn Clock + Send + Sync>,
    cfg: SequencerCfg,
}

impl ActuatorSequencer {
    pub fn new(
        drives: SequencerDrives,
        estop: EmergencyStop,
        clock: Arc<dyn Clock + Send + Sync>,
        cfg: SequencerCfg,
    ) -> Self {
        let SequencerDrives {
            release_servo,
            fork,
            feeder,
            rails,
            main,
            left,
        } = drives;
        Self {
            release_servo,
            fork,
            feeder,
            rails,
            main,
            left,
            estop,
            clock,
            cfg,
        }
    }

    pub fn cfg(&self) -> &SequencerCfg {
        &self.cfg
    }

    pub fn estop(&self) -> &EmergencyStop {
        &self.estop
    }

    /// Reject sheets the machine cannot feed. Nothing moves on failure.
    pub fn check_wrap(&self, wrap: &WrapSize) -> Result<()> {
        let bad = |msg: String| Err(eyre::Report::new(PackerError::Precondition(msg)));
        if !(wrap.length.is_finite() && wrap.length > 0.0) {
            return bad(format!("wrap length must be positive, got {}", wrap.length));
        }
        if wrap.length > self.cfg.max_wrap_length_cm {
            return bad(format!(
                "wrap length {:.2} cm exceeds the {:.2} cm feed limit",
                wrap.length, self.cfg.max_wrap_length_cm
            ));
        }
        if !(wrap.width.is_finite() && wrap.width > 0.0) {
            return bad(format!("wrap width must be positive, got {}", wrap.width));
        }
        if wrap.width > self.cfg.stock_width_cm {
            return bad(format!(
                "wrap width {:.2} cm exceeds stock width {:.2} cm",
                wrap.width, self.cfg.stock_width_cm
            ));
        }
        Ok(())
    }

    /// Run the full delivery for `wrap`.
    pub fn run(&self, wrap: &WrapSize) -> Result<SequenceReport> {
        self.check_wrap(wrap)?;
        let rail_travel = (self.cfg.stock_width_cm - wrap.width) / 2.0;
        info!(
            wrap_length = wrap.length,
            wrap_width = wrap.width,
            rail_travel_cm = rail_travel,
            "delivery starting"
        );
        self.run_phases(&Phase::DELIVERY, "delivery", |phase| match phase {
            Phase::ReleaseServo => self.release(),
            Phase::ForkCycle => self.fork_cycle(),
            Phase::FeedWrap => self.feed(wrap.length),
            Phase::RailsExpand => self.rails(rail_travel, Direction::Forward),
            Phase::SealCycle => self.seal_cycle(),
            Phase::RailsRetract => self.rails(rail_travel, Direction::Backward),
        })
    }

    /// Feed a short leader and seal it, used once after loading a new roll.
    pub fn initial_seal(&self) -> Result<SequenceReport> {
        let feed_cm = self.cfg.initial_feed_cm;
        self.run_phases(&[Phase::FeedWrap, Phase::SealCycle], "initial_seal", |phase| {
            match phase {
                Phase::FeedWrap => self.feed(feed_cm),
                _ => self.seal_cycle(),
            }
        })
    }

    fn run_phases(
        &self,
        phases: &[Phase],
        scope: &'static str,
        mut step: impl FnMut(Phase) -> Result<()>,
    ) -> Result<SequenceReport> {
        let _guard = SafeStateGuard::new(&self.estop, scope);
        let start = self.clock.now();
        let mut phases_completed = Vec::with_capacity(phases.len());
        for &phase in phases {
            info!(%phase, "phase start");
            if let Err(e) = step(phase) {
                let detail = format!("{e:#}");
                error!(%phase, %detail, "phase failed, aborting");
                return Err(eyre::Report::new(PackerError::ActuatorFault { phase, detail }));
            }
            phases_completed.push(phase);
        }
        let elapsed_ms = self.clock.ms_since(start);
        info!(scope, elapsed_ms, "sequence complete");
        Ok(SequenceReport {
            phases_completed,
            elapsed_ms,
        })
    }

    fn release(&self) -> Result<()> {
        let angle = self.cfg.release_angle;
        if !self.release_servo.set_angle(angle) {
            warn!(angle, "release servo failed, running recovery sweep");
            for &a in &self.cfg.recovery_angles {
                if !self.release_servo.set_angle(a) {
                    warn!(angle = a, "recovery step failed");
                }
                self.clock.sleep(self.cfg.recovery_step);
            }
            eyre::bail!("release servo did not reach {angle} degrees");
        }
        self.clock.sleep(self.cfg.after_release);
        Ok(())
    }

    fn fork_cycle(&self) -> Result<()> {
        let clock = &*self.clock;
        for stroke in &self.cfg.fork_strokes {
            self.fork.move_cm(stroke.distance_cm, Direction::Forward, clock)?;
            clock.sleep(stroke.dwell);
            self.fork.move_cm(stroke.distance_cm, Direction::Backward, clock)?;
        }
        clock.sleep(self.cfg.before_feed);
        Ok(())
    }

    fn feed(&self, length_cm: f64) -> Result<()> {
        let steps = self.feeder.move_cm(length_cm, Direction::Forward, &*self.clock)?;
        info!(length_cm, steps, "wrap fed");
        Ok(())
    }

    fn rails(&self, distance_cm: f64, dir: Direction) -> Result<()> {
        let steps = self.rails.move_cm(distance_cm, dir, &*self.clock)?;
        info!(distance_cm, steps, ?dir, "rails moved");
        Ok(())
    }

    fn seal_cycle(&self) -> Result<()> {
        let clock = &*self.clock;
        for (i, s) in self.cfg.seal_strokes.iter().enumerate() {
            tracing::debug!(stroke = i, state = ?s.state, "seal stroke");
            run_two_groups_in_parallel(&self.main, &self.left, s.state, s.main, s.left, clock)?;
            clock.sleep(s.dwell);
        }
        Ok(())
    }
}
