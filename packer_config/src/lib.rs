#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
//! Config schema and camera calibration parsing for the packaging rig.
//!
//! - `Config` and its sections are deserialized from TOML and validated. Every
//!   section defaults to the values of the reference rig, so an empty file is
//!   a working configuration.
//! - The calibration CSV loader enforces headers and performs a robust refit
//!   to reduce outlier influence before ratio/offset estimation.
use std::collections::HashMap;

use serde::Deserialize;
use serde::de::Deserializer;

/// Camera calibration CSV schema.
///
/// Expected headers:
/// pixels,cm
///
/// Example:
/// pixels,cm
/// 100,6.1
/// 200,12.1
#[derive(Debug, Deserialize, Clone, Copy)]
pub struct CalibrationRow {
    pub pixels: f64,
    pub cm: f64,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
pub struct StepperPins {
    pub step: u8,
    pub dir: u8,
}

/// One linear actuator driven by two relays.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelayPins {
    pub relay1: u8,
    pub relay2: u8,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Pins {
    pub trigger: u8,
    pub echo: u8,
    pub camera_servo: u8,
    pub release_servo: u8,
    pub rail_left: StepperPins,
    pub rail_right: StepperPins,
    pub feeder: StepperPins,
    pub fork: StepperPins,
    /// Shared, active-low driver enable for every stepper. Absent on the
    /// reference rig, where drivers are hard-wired enabled.
    pub stepper_enable: Option<u8>,
    /// Actuators that stroke together as the "main" group.
    /// Accepts either:
    /// - array of tuples: [[14, 15], [27, 22]]
    /// - array of tables: [{ relay1 = 14, relay2 = 15 }, ...]
    #[serde(deserialize_with = "de_relay_list")]
    pub main_actuators: Vec<RelayPins>,
    #[serde(deserialize_with = "de_relay_one")]
    pub left_actuator: RelayPins,
}

impl Default for Pins {
    fn default() -> Self {
        Self {
            trigger: 13,
            echo: 6,
            camera_servo: 19,
            release_servo: 26,
            rail_left: StepperPins { step: 7, dir: 12 },
            rail_right: StepperPins { step: 20, dir: 21 },
            feeder: StepperPins { step: 24, dir: 23 },
            fork: StepperPins { step: 8, dir: 25 },
            stepper_enable: None,
            main_actuators: vec![
                RelayPins {
                    relay1: 14,
                    relay2: 15,
                },
                RelayPins {
                    relay1: 27,
                    relay2: 22,
                },
                RelayPins {
                    relay1: 10,
                    relay2: 9,
                },
            ],
            left_actuator: RelayPins {
                relay1: 18,
                relay2: 17,
            },
        }
    }
}

impl Pins {
    /// Every BCM line the rig claims, labelled by config key.
    pub fn assignments(&self) -> Vec<(String, u8)> {
        let mut out = vec![
            ("pins.trigger".to_string(), self.trigger),
            ("pins.echo".to_string(), self.echo),
            ("pins.camera_servo".to_string(), self.camera_servo),
            ("pins.release_servo".to_string(), self.release_servo),
        ];
        for (name, sp) in [
            ("rail_left", self.rail_left),
            ("rail_right", self.rail_right),
            ("feeder", self.feeder),
            ("fork", self.fork),
        ] {
            out.push((format!("pins.{name}.step"), sp.step));
            out.push((format!("pins.{name}.dir"), sp.dir));
        }
        if let Some(en) = self.stepper_enable {
            out.push(("pins.stepper_enable".to_string(), en));
        }
        for (i, rp) in self.main_actuators.iter().enumerate() {
            out.push((format!("pins.main_actuators[{i}].relay1"), rp.relay1));
            out.push((format!("pins.main_actuators[{i}].relay2"), rp.relay2));
        }
        out.push(("pins.left_actuator.relay1".to_string(), self.left_actuator.relay1));
        out.push(("pins.left_actuator.relay2".to_string(), self.left_actuator.relay2));
        out
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RelayToml {
    Tuple((u8, u8)),
    Table { relay1: u8, relay2: u8 },
}

impl From<RelayToml> for RelayPins {
    fn from(r: RelayToml) -> Self {
        match r {
            RelayToml::Tuple((relay1, relay2)) | RelayToml::Table { relay1, relay2 } => {
                Self { relay1, relay2 }
            }
        }
    }
}

fn de_relay_list<'de, D>(deserializer: D) -> Result<Vec<RelayPins>, D::Error>
where
    D: Deserializer<'de>,
{
    let items: Vec<RelayToml> = Vec::deserialize(deserializer)?;
    Ok(items.into_iter().map(RelayPins::from).collect())
}

fn de_relay_one<'de, D>(deserializer: D) -> Result<RelayPins, D::Error>
where
    D: Deserializer<'de>,
{
    RelayToml::deserialize(deserializer).map(RelayPins::from)
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct SensorCfg {
    /// Bound on each echo edge wait, measured from the start of that wait.
    pub timeout_ms: u64,
    pub speed_of_sound_cm_s: f64,
    /// Trigger held low before the pulse so the module sees a clean edge.
    pub settle_us: u64,
    pub pulse_us: u64,
}

impl Default for SensorCfg {
    fn default() -> Self {
        Self {
            timeout_ms: 200,
            speed_of_sound_cm_s: 34_300.0,
            settle_us: 200,
            pulse_us: 10,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ServoCfg {
    pub min_angle: f64,
    pub max_angle: f64,
    pub settle_ms: u64,
    pub pwm_hz: f64,
}

impl Default for ServoCfg {
    fn default() -> Self {
        Self {
            min_angle: 0.0,
            max_angle: 160.0,
            settle_ms: 500,
            pwm_hz: 50.0,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct PositionerCfg {
    pub target_cm: f64,
    pub tolerance_cm: f64,
    pub max_iterations: u32,
    /// Degrees of servo travel per cm of distance error.
    pub gain: f64,
    pub neutral_angle: f64,
    pub step_delay_ms: u64,
}

impl Default for PositionerCfg {
    fn default() -> Self {
        Self {
            target_cm: 15.0,
            tolerance_cm: 0.5,
            max_iterations: 20,
            gain: 1.2,
            neutral_angle: 90.0,
            step_delay_ms: 100,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct VisionCfg {
    pub contrast_gain: f64,
    pub contrast_offset: f64,
    /// Odd Gaussian kernel size; 1 disables smoothing.
    pub blur_kernel: usize,
    /// Region of interest as fractions of the frame, applied to both axes.
    pub roi_start: f64,
    pub roi_end: f64,
    pub threshold: u8,
    /// Odd square structuring element size for opening/closing.
    pub morph_kernel: usize,
    pub morph_iterations: usize,
    pub min_area_px: f64,
    /// Directory for annotated snapshots; created on first write.
    pub images_dir: String,
}

impl Default for VisionCfg {
    fn default() -> Self {
        Self {
            contrast_gain: 1.5,
            contrast_offset: 50.0,
            blur_kernel: 5,
            roi_start: 0.2,
            roi_end: 0.8,
            threshold: 200,
            morph_kernel: 7,
            morph_iterations: 2,
            min_area_px: 5000.0,
            images_dir: "static/images".into(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct CameraCfg {
    pub ratio_cm_per_px: f64,
    /// Linear correction added to the box-width measurement.
    pub offset_a_cm: f64,
    /// Linear correction added to the box-height measurement.
    pub offset_b_cm: f64,
    pub attempts: u32,
    pub retry_backoff_ms: u64,
    /// Still-capture command run before each grab (hardware builds only).
    pub capture_command: Option<Vec<String>>,
    pub image_path: String,
    /// Object size rendered by the simulated camera, in pixels.
    pub sim_object_px: Option<(u32, u32)>,
}

impl CameraCfg {
    pub fn front() -> Self {
        Self {
            ratio_cm_per_px: 0.06035,
            offset_a_cm: -0.2,
            offset_b_cm: 0.1,
            attempts: 1,
            retry_backoff_ms: 1000,
            capture_command: None,
            image_path: "/tmp/packer_front.jpg".into(),
            sim_object_px: Some((133, 83)),
        }
    }

    pub fn side() -> Self {
        Self {
            ratio_cm_per_px: 0.03895,
            offset_a_cm: -0.3,
            offset_b_cm: 0.0,
            attempts: 3,
            retry_backoff_ms: 1000,
            capture_command: None,
            image_path: "/tmp/packer_side.jpg".into(),
            sim_object_px: Some((264, 130)),
        }
    }
}

impl Default for CameraCfg {
    fn default() -> Self {
        Self::front()
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Cameras {
    pub front: CameraCfg,
    pub side: CameraCfg,
    pub frame_width: u32,
    pub frame_height: u32,
}

impl Default for Cameras {
    fn default() -> Self {
        Self {
            front: CameraCfg::front(),
            side: CameraCfg::side(),
            frame_width: 640,
            frame_height: 480,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct OptimizerCfg {
    pub population_size: usize,
    pub generations: usize,
    pub margin_cm: f64,
    pub mutation_rate: f64,
    pub mutation_sigma: f64,
    pub breeding_pool: usize,
    /// Fixed seed for reproducible runs; entropy when absent.
    pub seed: Option<u64>,
}

impl Default for OptimizerCfg {
    fn default() -> Self {
        Self {
            population_size: 10,
            generations: 50,
            margin_cm: 0.5,
            mutation_rate: 0.1,
            mutation_sigma: 0.1,
            breeding_pool: 5,
            seed: None,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum WrapFormula {
    /// length = h + w, width = l + w
    #[default]
    HalfPerimeter,
    /// length = 2h + 2w, width = 2l + 2w
    FullPerimeter,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct WrapCfg {
    pub formula: WrapFormula,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct MotionCfg {
    /// Half-period of a step pulse.
    pub pulse_width_us: u64,
    pub stock_width_cm: f64,
    /// Longest sheet the feeder will run out in one delivery.
    pub max_wrap_length_cm: f64,
    pub steps_per_cm_rails: f64,
    pub steps_per_cm_feeder: f64,
    pub steps_per_cm_fork: f64,
    /// Flip the direction line sense (forward = high).
    pub invert_direction: bool,
    /// Relay boards on the rig energize on a low level.
    pub relay_active_low: bool,
    pub release_angle: f64,
    pub recovery_angles: Vec<f64>,
    pub recovery_step_ms: u64,
    pub after_release_ms: u64,
    pub before_feed_ms: u64,
}

impl Default for MotionCfg {
    fn default() -> Self {
        Self {
            pulse_width_us: 500,
            stock_width_cm: 25.4,
            max_wrap_length_cm: 100.0,
            steps_per_cm_rails: 500.0,
            steps_per_cm_feeder: 320.0,
            steps_per_cm_fork: 400.0,
            invert_direction: false,
            relay_active_low: true,
            release_angle: 55.0,
            recovery_angles: vec![50.0, 55.0, 25.0, 10.0, 0.0],
            recovery_step_ms: 300,
            after_release_ms: 3000,
            before_feed_ms: 5000,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq)]
pub struct ForkStroke {
    pub distance_cm: f64,
    /// Dwell between the forward and return move.
    pub dwell_ms: u64,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ForkStrokeToml {
    Tuple((f64, u64)),
    Table { distance_cm: f64, dwell_ms: u64 },
}

fn de_fork_strokes<'de, D>(deserializer: D) -> Result<Vec<ForkStroke>, D::Error>
where
    D: Deserializer<'de>,
{
    let items: Vec<ForkStrokeToml> = Vec::deserialize(deserializer)?;
    Ok(items
        .into_iter()
        .map(|s| match s {
            ForkStrokeToml::Tuple((distance_cm, dwell_ms))
            | ForkStrokeToml::Table {
                distance_cm,
                dwell_ms,
            } => ForkStroke {
                distance_cm,
                dwell_ms,
            },
        })
        .collect())
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ForkCfg {
    /// Accepts [[0.4, 1000], ...] or [{ distance_cm = 0.4, dwell_ms = 1000 }, ...]
    #[serde(deserialize_with = "de_fork_strokes")]
    pub strokes: Vec<ForkStroke>,
}

impl Default for ForkCfg {
    fn default() -> Self {
        Self {
            strokes: vec![
                ForkStroke {
                    distance_cm: 0.4,
                    dwell_ms: 1000,
                },
                ForkStroke {
                    distance_cm: 0.8,
                    dwell_ms: 1000,
                },
                ForkStroke {
                    distance_cm: 1.9,
                    dwell_ms: 300,
                },
            ],
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StrokeDirection {
    Push,
    Pull,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
pub struct SealStroke {
    pub direction: StrokeDirection,
    pub main_ms: u64,
    pub left_ms: u64,
    /// Dwell after both groups are released.
    pub dwell_ms: u64,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct SealCfg {
    pub strokes: Vec<SealStroke>,
}

impl Default for SealCfg {
    fn default() -> Self {
        use StrokeDirection::{Pull, Push};
        let s = |direction, main_ms, left_ms, dwell_ms| SealStroke {
            direction,
            main_ms,
            left_ms,
            dwell_ms,
        };
        Self {
            strokes: vec![
                s(Push, 1000, 800, 4000),
                s(Pull, 500, 200, 500),
                s(Push, 500, 200, 4000),
                s(Pull, 500, 200, 500),
                s(Push, 500, 200, 4000),
                s(Pull, 2000, 800, 2000),
            ],
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct InitialSealCfg {
    pub feed_cm: f64,
}

impl Default for InitialSealCfg {
    fn default() -> Self {
        Self { feed_cm: 4.0 }
    }
}

/// Parameters of the simulated rig used when built without `hardware`.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct SimCfg {
    /// Echo distance with the side camera servo at 90 degrees.
    pub neutral_distance_cm: f64,
    pub cm_per_degree: f64,
}

impl Default for SimCfg {
    fn default() -> Self {
        Self {
            neutral_distance_cm: 20.0,
            cm_per_degree: 0.5,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct Logging {
    pub file: Option<String>,  // path to .log (JSON lines)
    pub level: Option<String>, // "info","debug"
    /// Log rotation policy: "never" | "daily" | "hourly" (default: never)
    pub rotation: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub pins: Pins,
    pub sensor: SensorCfg,
    pub servo: ServoCfg,
    pub positioner: PositionerCfg,
    pub vision: VisionCfg,
    pub cameras: Cameras,
    pub optimizer: OptimizerCfg,
    pub wrap: WrapCfg,
    pub motion: MotionCfg,
    pub fork: ForkCfg,
    pub seal: SealCfg,
    pub initial_seal: InitialSealCfg,
    pub sim: SimCfg,
    pub logging: Logging,
}

pub fn load_toml(s: &str) -> Result<Config, toml::de::Error> {
    toml::from_str::<Config>(s)
}

/// Fitted camera calibration: `cm = ratio_cm_per_px * pixels + offset_cm`.
#[derive(Debug, Clone, Copy)]
pub struct CameraFit {
    pub ratio_cm_per_px: f64,
    pub offset_cm: f64,
    /// Rows kept after outlier rejection.
    pub inliers: usize,
}

impl CameraFit {
    /// Build a fit from calibration rows using ordinary least squares, then a
    /// single robust refit that drops rows further than 2 RMS from the line.
    pub fn from_rows(rows: &[CalibrationRow]) -> eyre::Result<Self> {
        if rows.len() < 2 {
            eyre::bail!("calibration requires at least two rows, got {}", rows.len());
        }
        for (i, r) in rows.iter().enumerate() {
            if !(r.pixels.is_finite() && r.cm.is_finite()) || r.pixels <= 0.0 || r.cm <= 0.0 {
                eyre::bail!("calibration row {} must have positive pixels and cm", i + 1);
            }
        }

        // Strictly increasing pixel sizes, no duplicates
        for i in 1..rows.len() {
            if rows[i].pixels == rows[i - 1].pixels {
                eyre::bail!(
                    "calibration rows have duplicate pixel values at index {} and {}",
                    i - 1,
                    i
                );
            }
            if rows[i].pixels < rows[i - 1].pixels {
                eyre::bail!("calibration pixel values must be strictly increasing");
            }
        }

        let pts: Vec<(f64, f64)> = rows.iter().map(|r| (r.pixels, r.cm)).collect();
        let (a0, b0) = fit_line(&pts)?;
        let sumsq: f64 = pts
            .iter()
            .map(|(x, y)| {
                let r = y - (a0 * x + b0);
                r * r
            })
            .sum();
        let rms = (sumsq / pts.len() as f64).sqrt();

        let (a, b, inliers) = robust_refit(&pts, a0, b0, rms, 2.0).unwrap_or((a0, b0, pts.len()));
        if a <= 0.0 {
            eyre::bail!("calibration produced non-positive ratio {a}");
        }
        Ok(Self {
            ratio_cm_per_px: a,
            offset_cm: b,
            inliers,
        })
    }
}

fn fit_line(pts: &[(f64, f64)]) -> eyre::Result<(f64, f64)> {
    let n = pts.len() as f64;
    let mean_x = pts.iter().map(|p| p.0).sum::<f64>() / n;
    let mean_y = pts.iter().map(|p| p.1).sum::<f64>() / n;
    let mut sxx = 0.0f64;
    let mut sxy = 0.0f64;
    for (x, y) in pts {
        let dx = x - mean_x;
        sxx += dx * dx;
        sxy += dx * (y - mean_y);
    }
    if !sxx.is_finite() || sxx == 0.0 {
        eyre::bail!("calibration cannot determine ratio (degenerate pixel variance)");
    }
    let a = sxy / sxx;
    if !a.is_finite() {
        eyre::bail!("calibration produced non-finite ratio");
    }
    Ok((a, mean_y - a * mean_x))
}

/// Single-step robust refit: reject rows with |residual| > k * rms around the
/// initial line and refit the inliers with an online covariance update.
/// Returns None when the refit is not applicable (zero rms, fewer than two
/// inliers, nothing rejected, or degenerate variance).
fn robust_refit(pts: &[(f64, f64)], a0: f64, b0: f64, rms: f64, k: f64) -> Option<(f64, f64, usize)> {
    if !(rms.is_finite() && rms > 0.0) {
        return None;
    }
    let thr = k * rms;
    let mut n_in: usize = 0;
    let mut mean_x = 0.0f64;
    let mut mean_y = 0.0f64;
    let mut cxx = 0.0f64;
    let mut cxy = 0.0f64;

    for &(x, y) in pts {
        if (y - (a0 * x + b0)).abs() > thr {
            continue;
        }
        n_in += 1;
        let n = n_in as f64;
        let dx = x - mean_x;
        mean_x += dx / n;
        mean_y += (y - mean_y) / n;
        cxx += dx * (x - mean_x);
        cxy += dx * (y - mean_y);
    }

    if n_in < 2 || n_in == pts.len() || cxx == 0.0 || !cxx.is_finite() {
        return None;
    }
    let a = cxy / cxx;
    a.is_finite().then(|| (a, mean_y - a * mean_x, n_in))
}

pub fn load_ratio_csv(path: &std::path::Path) -> eyre::Result<CameraFit> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(|e| eyre::eyre!("open calibration CSV {:?}: {}", path, e))?;

    // Enforce exact headers
    let headers = rdr
        .headers()
        .map_err(|e| eyre::eyre!("read CSV headers {:?}: {}", path, e))?
        .clone();
    let actual: Vec<String> = headers.iter().map(|s| s.to_string()).collect();
    if actual != ["pixels", "cm"] {
        eyre::bail!(
            "calibration CSV must have headers 'pixels,cm', got: {}",
            actual.join(",")
        );
    }

    let mut rows = Vec::new();
    for (idx, rec) in rdr.deserialize::<CalibrationRow>().enumerate() {
        match rec {
            Ok(row) => rows.push(row),
            Err(e) => eyre::bail!("invalid CSV row {}: {}", idx + 2, e),
        }
    }
    CameraFit::from_rows(&rows)
}

fn check_fraction(key: &str, v: f64) -> eyre::Result<()> {
    if !(0.0..=1.0).contains(&v) {
        eyre::bail!("{key} must be in [0.0, 1.0]");
    }
    Ok(())
}

fn check_positive(key: &str, v: f64) -> eyre::Result<()> {
    if !(v.is_finite() && v > 0.0) {
        eyre::bail!("{key} must be > 0");
    }
    Ok(())
}

impl CameraCfg {
    fn validate(&self, name: &str) -> eyre::Result<()> {
        check_positive(&format!("cameras.{name}.ratio_cm_per_px"), self.ratio_cm_per_px)?;
        if !(self.offset_a_cm.is_finite() && self.offset_b_cm.is_finite()) {
            eyre::bail!("cameras.{name} offsets must be finite");
        }
        if self.attempts == 0 {
            eyre::bail!("cameras.{name}.attempts must be >= 1");
        }
        if self.retry_backoff_ms > 60_000 {
            eyre::bail!("cameras.{name}.retry_backoff_ms is unreasonably large (>60s)");
        }
        if self.capture_command.as_ref().is_some_and(Vec::is_empty) {
            eyre::bail!("cameras.{name}.capture_command must not be empty when set");
        }
        Ok(())
    }
}

impl Config {
    pub fn validate(&self) -> eyre::Result<()> {
        // Pins
        let mut seen: HashMap<u8, &str> = HashMap::new();
        let assignments = self.pins.assignments();
        for (key, bcm) in &assignments {
            if *bcm > 27 {
                eyre::bail!("{key} must be a BCM line in 0..=27, got {bcm}");
            }
            if let Some(prev) = seen.insert(*bcm, key) {
                eyre::bail!("{key} reuses BCM{bcm} already assigned to {prev}");
            }
        }
        if self.pins.main_actuators.is_empty() {
            eyre::bail!("pins.main_actuators must list at least one actuator");
        }

        // Sensor
        if self.sensor.timeout_ms == 0 {
            eyre::bail!("sensor.timeout_ms must be >= 1");
        }
        check_positive("sensor.speed_of_sound_cm_s", self.sensor.speed_of_sound_cm_s)?;
        if self.sensor.pulse_us == 0 {
            eyre::bail!("sensor.pulse_us must be >= 1");
        }

        // Servo
        if !(0.0..=180.0).contains(&self.servo.min_angle)
            || !(0.0..=180.0).contains(&self.servo.max_angle)
            || self.servo.min_angle >= self.servo.max_angle
        {
            eyre::bail!("servo.min_angle/max_angle must satisfy 0 <= min < max <= 180");
        }
        check_positive("servo.pwm_hz", self.servo.pwm_hz)?;

        // Positioner
        check_positive("positioner.target_cm", self.positioner.target_cm)?;
        check_positive("positioner.tolerance_cm", self.positioner.tolerance_cm)?;
        check_positive("positioner.gain", self.positioner.gain)?;
        if self.positioner.max_iterations == 0 {
            eyre::bail!("positioner.max_iterations must be >= 1");
        }
        if !(self.servo.min_angle..=self.servo.max_angle).contains(&self.positioner.neutral_angle) {
            eyre::bail!("positioner.neutral_angle must lie within the servo range");
        }

        // Vision
        check_positive("vision.contrast_gain", self.vision.contrast_gain)?;
        if self.vision.blur_kernel == 0 || self.vision.blur_kernel % 2 == 0 {
            eyre::bail!("vision.blur_kernel must be odd");
        }
        if self.vision.morph_kernel == 0 || self.vision.morph_kernel % 2 == 0 {
            eyre::bail!("vision.morph_kernel must be odd");
        }
        check_fraction("vision.roi_start", self.vision.roi_start)?;
        check_fraction("vision.roi_end", self.vision.roi_end)?;
        if self.vision.roi_start >= self.vision.roi_end {
            eyre::bail!("vision.roi_start must be < vision.roi_end");
        }
        if self.vision.min_area_px < 0.0 {
            eyre::bail!("vision.min_area_px must be >= 0");
        }
        if self.vision.images_dir.trim().is_empty() {
            eyre::bail!("vision.images_dir must not be empty");
        }

        // Cameras
        self.cameras.front.validate("front")?;
        self.cameras.side.validate("side")?;
        if self.cameras.frame_width == 0 || self.cameras.frame_height == 0 {
            eyre::bail!("cameras.frame_width/frame_height must be > 0");
        }

        // Optimizer
        if self.optimizer.population_size < 2 {
            eyre::bail!("optimizer.population_size must be >= 2");
        }
        if self.optimizer.generations == 0 {
            eyre::bail!("optimizer.generations must be >= 1");
        }
        if self.optimizer.breeding_pool < 2 {
            eyre::bail!("optimizer.breeding_pool must be >= 2");
        }
        if !(self.optimizer.margin_cm.is_finite() && self.optimizer.margin_cm >= 0.0) {
            eyre::bail!("optimizer.margin_cm must be >= 0");
        }
        check_fraction("optimizer.mutation_rate", self.optimizer.mutation_rate)?;
        if !(self.optimizer.mutation_sigma.is_finite() && self.optimizer.mutation_sigma >= 0.0) {
            eyre::bail!("optimizer.mutation_sigma must be >= 0");
        }

        // Motion
        if self.motion.pulse_width_us == 0 {
            eyre::bail!("motion.pulse_width_us must be >= 1");
        }
        check_positive("motion.stock_width_cm", self.motion.stock_width_cm)?;
        check_positive("motion.max_wrap_length_cm", self.motion.max_wrap_length_cm)?;
        check_positive("motion.steps_per_cm_rails", self.motion.steps_per_cm_rails)?;
        check_positive("motion.steps_per_cm_feeder", self.motion.steps_per_cm_feeder)?;
        check_positive("motion.steps_per_cm_fork", self.motion.steps_per_cm_fork)?;
        for (key, a) in std::iter::once(("motion.release_angle", &self.motion.release_angle))
            .chain(self.motion.recovery_angles.iter().map(|a| ("motion.recovery_angles", a)))
        {
            if !(self.servo.min_angle..=self.servo.max_angle).contains(a) {
                eyre::bail!("{key} must lie within the servo range");
            }
        }

        // Fork / seal
        for (i, s) in self.fork.strokes.iter().enumerate() {
            check_positive(&format!("fork.strokes[{i}].distance_cm"), s.distance_cm)?;
        }
        if self.seal.strokes.is_empty() {
            eyre::bail!("seal.strokes must not be empty");
        }
        if self.initial_seal.feed_cm < 0.0 || !self.initial_seal.feed_cm.is_finite() {
            eyre::bail!("initial_seal.feed_cm must be >= 0");
        }

        // Sim
        check_positive("sim.neutral_distance_cm", self.sim.neutral_distance_cm)?;

        // Logging
        match self.logging.rotation.as_deref() {
            None | Some("never" | "daily" | "hourly") => {}
            Some(r) => eyre::bail!("logging.rotation must be one of never|daily|hourly, got {r:?}"),
        }

        Ok(())
    }
}
