//! `From` implementations bridging `packer_config` sections to `packer_core` types.

use std::time::Duration;

use crate::actuators::RelayState;
use crate::optimizer::OptimizerParams;
use crate::positioner::PositionerCfg;
use crate::sensor::SensorCfg;
use crate::sequencer::{ForkStep, SealStep, SequencerCfg};
use crate::servo::ServoCfg;
use crate::vision::{CameraCalibration, VisionParams};
use crate::wrap::WrapFormula;

// ── SensorCfg ────────────────────────────────────────────────────────────────

impl From<&packer_config::SensorCfg> for SensorCfg {
    fn from(c: &packer_config::SensorCfg) -> Self {
        Self {
            timeout: Duration::from_millis(c.timeout_ms),
            speed_of_sound_cm_s: c.speed_of_sound_cm_s,
            settle: Duration::from_micros(c.settle_us),
            pulse: Duration::from_micros(c.pulse_us),
            ..Self::default()
        }
    }
}

// ── ServoCfg ─────────────────────────────────────────────────────────────────

impl From<&packer_config::ServoCfg> for ServoCfg {
    fn from(c: &packer_config::ServoCfg) -> Self {
        Self {
            min_angle: c.min_angle,
            max_angle: c.max_angle,
            settle: Duration::from_millis(c.settle_ms),
        }
    }
}

// ── PositionerCfg ────────────────────────────────────────────────────────────

impl From<&packer_config::PositionerCfg> for PositionerCfg {
    fn from(c: &packer_config::PositionerCfg) -> Self {
        Self {
            target_cm: c.target_cm,
            tolerance_cm: c.tolerance_cm,
            max_iterations: c.max_iterations,
            gain: c.gain,
            neutral_angle: c.neutral_angle,
            step_delay: Duration::from_millis(c.step_delay_ms),
        }
    }
}

// ── Vision ───────────────────────────────────────────────────────────────────

impl From<&packer_config::VisionCfg> for VisionParams {
    fn from(c: &packer_config::VisionCfg) -> Self {
        Self {
            contrast_gain: c.contrast_gain,
            contrast_offset: c.contrast_offset,
            blur_kernel: c.blur_kernel,
            roi_start: c.roi_start,
            roi_end: c.roi_end,
            threshold: c.threshold,
            morph_kernel: c.morph_kernel,
            morph_iterations: c.morph_iterations,
            min_area_px: c.min_area_px,
        }
    }
}

impl From<&packer_config::CameraCfg> for CameraCalibration {
    fn from(c: &packer_config::CameraCfg) -> Self {
        Self {
            ratio_cm_per_px: c.ratio_cm_per_px,
            offset_a_cm: c.offset_a_cm,
            offset_b_cm: c.offset_b_cm,
        }
    }
}

// ── Optimizer / wrap ─────────────────────────────────────────────────────────

impl From<&packer_config::OptimizerCfg> for OptimizerParams {
    fn from(c: &packer_config::OptimizerCfg) -> Self {
        Self {
            population_size: c.population_size,
            generations: c.generations,
            margin_cm: c.margin_cm,
            mutation_rate: c.mutation_rate,
            mutation_sigma: c.mutation_sigma,
            breeding_pool: c.breeding_pool,
            seed: c.seed,
        }
    }
}

impl From<packer_config::WrapFormula> for WrapFormula {
    fn from(f: packer_config::WrapFormula) -> Self {
        match f {
            packer_config::WrapFormula::HalfPerimeter => Self::HalfPerimeter,
            packer_config::WrapFormula::FullPerimeter => Self::FullPerimeter,
        }
    }
}

// ── Sequencer ────────────────────────────────────────────────────────────────

impl From<packer_config::StrokeDirection> for RelayState {
    fn from(d: packer_config::StrokeDirection) -> Self {
        match d {
            packer_config::StrokeDirection::Push => Self::Push,
            packer_config::StrokeDirection::Pull => Self::Pull,
        }
    }
}

impl From<&packer_config::Config> for SequencerCfg {
    fn from(c: &packer_config::Config) -> Self {
        let ms = Duration::from_millis;
        let m = &c.motion;
        Self {
            stock_width_cm: m.stock_width_cm,
            max_wrap_length_cm: m.max_wrap_length_cm,
            release_angle: m.release_angle,
            recovery_angles: m.recovery_angles.clone(),
            recovery_step: ms(m.recovery_step_ms),
            after_release: ms(m.after_release_ms),
            before_feed: ms(m.before_feed_ms),
            fork_strokes: c
                .fork
                .strokes
                .iter()
                .map(|s| ForkStep {
                    distance_cm: s.distance_cm,
                    dwell: ms(s.dwell_ms),
                })
                .collect(),
            seal_strokes: c
                .seal
                .strokes
                .iter()
                .map(|s| SealStep {
                    state: s.direction.into(),
                    main: ms(s.main_ms),
                    left: ms(s.left_ms),
                    dwell: ms(s.dwell_ms),
                })
                .collect(),
            initial_feed_cm: c.initial_seal.feed_cm,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_matches_core_defaults() {
        let cfg = packer_config::Config::default();
        let seq = SequencerCfg::from(&cfg);
        let core = SequencerCfg::default();
        assert_eq!(seq.fork_strokes, core.fork_strokes);
        assert_eq!(seq.seal_strokes, core.seal_strokes);
        assert_eq!(seq.recovery_angles, core.recovery_angles);
        assert_eq!(SensorCfg::from(&cfg.sensor).timeout, SensorCfg::default().timeout);
        let cal = CameraCalibration::from(&cfg.cameras.side);
        assert_eq!(cal.ratio_cm_per_px, 0.03895);
    }
}
