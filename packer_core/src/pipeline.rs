//! Front capture, side camera positioning, side capture, optimization.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::Local;
use eyre::WrapErr;
use packer_traits::{Clock, FrameSource};
use tracing::{info, warn};

use crate::error::Result;
use crate::estop::{EmergencyStop, SafeStateGuard};
use crate::hw_error::hw_report;
use crate::optimizer::DimensionOptimizer;
use crate::positioner::SideCameraPositioner;
use crate::types::{MeasurementReport, ObjectDimensions};
use crate::vision::{CameraCalibration, DimensionExtractor, Extraction, snapshot};
use crate::wrap::{WrapFormula, wrap_size};

/// One camera with its calibration and retry policy.
pub struct CameraStation {
    pub name: &'static str,
    pub source: Box<dyn FrameSource + Send>,
    pub calibration: CameraCalibration,
    /// Total tries, at least one.
    pub attempts: u32,
    pub backoff: Duration,
}

impl CameraStation {
    /// Grab and extract, retrying both on failure. Returns the last error
    /// once every attempt is spent.
    pub fn capture(
        &mut self,
        extractor: &DimensionExtractor,
        clock: &dyn Clock,
    ) -> Result<Extraction> {
        let attempts = self.attempts.max(1);
        let mut attempt = 1;
        loop {
            let result = self
                .source
                .grab()
                .map_err(hw_report)
                .wrap_err_with(|| format!("{} camera grab", self.name))
                .and_then(|frame| extractor.extract(&frame, &self.calibration));
            match result {
                Ok(found) => return Ok(found),
                Err(e) if attempt < attempts => {
                    let error = format!("{e:#}");
                    warn!(camera = self.name, attempt, %error, "capture failed, retrying");
                    clock.sleep(self.backoff);
                    attempt += 1;
                }
                Err(e) => {
                    return Err(e).wrap_err_with(|| {
                        format!("{} camera failed after {attempts} attempt(s)", self.name)
                    });
                }
            }
        }
    }
}

pub struct MeasurementPipeline {
    pub front: CameraStation,
    pub side: CameraStation,
    pub positioner: SideCameraPositioner,
    pub extractor: DimensionExtractor,
    pub optimizer: DimensionOptimizer,
    pub formula: WrapFormula,
    pub images_dir: PathBuf,
    pub estop: EmergencyStop,
    pub clock: Arc<dyn Clock + Send + Sync>,
}

impl MeasurementPipeline {
    /// Measure the object on the table and size its wrap.
    ///
    /// Each camera writes its annotated snapshot as soon as its extraction
    /// succeeds, so a later failure still leaves the earlier image on disk.
    ///
    /// Outputs are returned to their safe levels when this returns, whatever
    /// the outcome.
    pub fn run(&mut self) -> Result<MeasurementReport> {
        let _guard = SafeStateGuard::new(&self.estop, "capture");
        let clock = &*self.clock;

        let front = self.front.capture(&self.extractor, clock)?;
        info!(
            dim_a_cm = front.dim_a_cm,
            dim_b_cm = front.dim_b_cm,
            area_px = front.area_px,
            "front measured"
        );
        let front_image =
            snapshot::save_snapshot(&front.annotated, &self.images_dir, "front", Local::now())?;

        let positioner = self.positioner.adjust();

        let side = self.side.capture(&self.extractor, clock)?;
        info!(dim_a_cm = side.dim_a_cm, area_px = side.area_px, "side measured");
        let side_image =
            snapshot::save_snapshot(&side.annotated, &self.images_dir, "side", Local::now())?;

        let object = ObjectDimensions::new(side.dim_a_cm, front.dim_a_cm, front.dim_b_cm)?;
        let optimization = self.optimizer.optimize(&object)?;
        let wrap = wrap_size(&optimization.best, self.formula);

        info!(
            length = object.length,
            width = object.width,
            height = object.height,
            wrap_length = wrap.length,
            wrap_width = wrap.width,
            "capture complete"
        );
        Ok(MeasurementReport {
            object,
            optimized: optimization.best,
            wrap,
            best_fitness: optimization.best_fitness,
            front_image,
            side_image,
            positioner,
        })
    }
}
