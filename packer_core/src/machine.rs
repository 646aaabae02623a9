//! The machine facade: one capture or delivery at a time, an out-of-band stop
//! and a single cached measurement.

use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard, PoisonError, TryLockError};
use std::time::Duration;

use packer_config::Config;
use packer_traits::FrameSource;
use serde::Serialize;
use tracing::{info, warn};

use crate::context::HardwareContext;
use crate::error::{PackerError, Result};
use crate::estop::{EmergencyStop, SafeStateGuard};
use crate::optimizer::DimensionOptimizer;
use crate::pipeline::{CameraStation, MeasurementPipeline};
use crate::positioner::SideCameraPositioner;
use crate::sensor::DistanceSensor;
use crate::sequencer::{ActuatorSequencer, SequencerDrives};
use crate::servo::ServoActuator;
use crate::types::{MeasurementReport, SequenceReport, WrapSize};
use crate::vision::DimensionExtractor;

struct Stations {
    pipeline: MeasurementPipeline,
    sequencer: ActuatorSequencer,
}

/// Outcome of a quick peripheral check.
#[derive(Debug, Clone, Serialize)]
pub struct SelfCheckReport {
    pub distance_cm: Option<f64>,
    pub distance_error: Option<String>,
    pub front: CameraCheck,
    pub side: CameraCheck,
    pub outputs: usize,
    pub pwms: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct CameraCheck {
    pub width: u32,
    pub height: u32,
    pub error: Option<String>,
}

impl SelfCheckReport {
    pub fn ok(&self) -> bool {
        self.distance_error.is_none() && self.front.error.is_none() && self.side.error.is_none()
    }
}

pub struct Machine {
    stations: Mutex<Stations>,
    last: Mutex<Option<MeasurementReport>>,
    estop: EmergencyStop,
}

impl Machine {
    /// Assemble the machine from claimed hardware and the two cameras.
    pub fn new(
        ctx: HardwareContext,
        front: Box<dyn FrameSource + Send>,
        side: Box<dyn FrameSource + Send>,
        cfg: &Config,
    ) -> Result<Self> {
        let clock = ctx.clock;
        let sensor = DistanceSensor::new(ctx.trigger, ctx.echo, clock.clone(), (&cfg.sensor).into());
        let camera_servo = ServoActuator::new(ctx.camera_servo, clock.clone(), (&cfg.servo).into());
        let release_servo =
            ServoActuator::new(ctx.release_servo, clock.clone(), (&cfg.servo).into());
        let positioner = SideCameraPositioner::new(
            sensor,
            camera_servo,
            clock.clone(),
            (&cfg.positioner).into(),
        );
        let station = |name, source, cam: &packer_config::CameraCfg| CameraStation {
            name,
            source,
            calibration: cam.into(),
            attempts: cam.attempts,
            backoff: Duration::from_millis(cam.retry_backoff_ms),
        };

        let pipeline = MeasurementPipeline {
            front: station("front", front, &cfg.cameras.front),
            side: station("side", side, &cfg.cameras.side),
            positioner,
            extractor: DimensionExtractor::new((&cfg.vision).into()),
            optimizer: DimensionOptimizer::new((&cfg.optimizer).into())?,
            formula: cfg.wrap.formula.into(),
            images_dir: PathBuf::from(&cfg.vision.images_dir),
            estop: ctx.estop.clone(),
            clock: clock.clone(),
        };
        let drives = SequencerDrives {
            release_servo,
            fork: ctx.fork,
            feeder: ctx.feeder,
            rails: ctx.rails,
            main: ctx.main,
            left: ctx.left,
        };
        let sequencer = ActuatorSequencer::new(drives, ctx.estop.clone(), clock, cfg.into());
        Ok(Self {
            stations: Mutex::new(Stations {
                pipeline,
                sequencer,
            }),
            last: Mutex::new(None),
            estop: ctx.estop,
        })
    }

    fn claim(&self) -> Result<MutexGuard<'_, Stations>> {
        match self.stations.try_lock() {
            Ok(g) => Ok(g),
            Err(TryLockError::Poisoned(p)) => Ok(p.into_inner()),
            Err(TryLockError::WouldBlock) => Err(eyre::Report::new(PackerError::Busy)),
        }
    }

    fn cache(&self) -> MutexGuard<'_, Option<MeasurementReport>> {
        self.last.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Measure the object and cache the report for the next delivery.
    pub fn capture_dimensions(&self) -> Result<MeasurementReport> {
        let mut st = self.claim()?;
        self.estop.rearm();
        let report = st.pipeline.run()?;
        *self.cache() = Some(report.clone());
        Ok(report)
    }

    /// Deliver using the last captured measurement.
    pub fn deliver(&self) -> Result<SequenceReport> {
        let wrap = self.cache().as_ref().map(|r| r.wrap).ok_or_else(|| {
            eyre::Report::new(PackerError::Precondition("no measurement captured".into()))
        })?;
        self.deliver_with(wrap)
    }

    pub fn deliver_with(&self, wrap: WrapSize) -> Result<SequenceReport> {
        let st = self.claim()?;
        self.estop.rearm();
        st.sequencer.run(&wrap)
    }

    pub fn initial_seal(&self) -> Result<SequenceReport> {
        let st = self.claim()?;
        self.estop.rearm();
        st.sequencer.initial_seal()
    }

    /// Safe to call from any thread at any time, including mid-sequence.
    pub fn emergency_stop(&self) {
        warn!("emergency stop requested");
        self.estop.stop_all();
    }

    pub fn estop(&self) -> &EmergencyStop {
        &self.estop
    }

    pub fn last_report(&self) -> Option<MeasurementReport> {
        self.cache().clone()
    }

    /// One distance reading and one frame per camera. Failures are reported,
    /// not returned.
    pub fn self_check(&self) -> Result<SelfCheckReport> {
        let mut st = self.claim()?;
        self.estop.rearm();
        let _guard = SafeStateGuard::new(&self.estop, "self_check");
        let pipeline = &mut st.pipeline;

        let sensor = pipeline.positioner.sensor_mut();
        let timeout = sensor.default_timeout();
        let (distance_cm, distance_error) = match sensor.measure(timeout) {
            Ok(d) => (Some(d), None),
            Err(e) => (None, Some(format!("{e:#}"))),
        };
        let front = check_camera(&mut pipeline.front);
        let side = check_camera(&mut pipeline.side);
        let (outputs, pwms) = self.estop.registered();
        let report = SelfCheckReport {
            distance_cm,
            distance_error,
            front,
            side,
            outputs,
            pwms,
        };
        info!(ok = report.ok(), "self check finished");
        Ok(report)
    }
}

fn check_camera(station: &mut CameraStation) -> CameraCheck {
    match station.source.grab() {
        Ok(f) => CameraCheck {
            width: f.width,
            height: f.height,
            error: None,
        },
        Err(e) => CameraCheck {
            width: 0,
            height: 0,
            error: Some(e.to_string()),
        },
    }
}
