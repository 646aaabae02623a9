//! Simulated rig: GPIO bus, ultrasonic echo model and synthetic cameras.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use packer_traits::{
    Clock, DigitalInput, DigitalOutput, Frame, FrameSource, PinProvider, PwmOutput,
};
use tracing::trace;

use crate::error::HwError;

/// How the simulated HC-SR04 answers a trigger.
///
/// The side camera sits on a servo arm; the simulated standoff distance is
/// linear in the last commanded servo angle so the positioner loop closes.
#[derive(Debug, Clone, Copy)]
pub struct EchoModel {
    pub trigger_pin: u8,
    pub echo_pin: u8,
    pub servo_pin: u8,
    /// Distance reported when the servo is at 90 degrees.
    pub neutral_distance_cm: f64,
    /// Change in distance per degree of servo travel.
    pub cm_per_degree: f64,
    pub speed_of_sound_cm_s: f64,
    /// Delay between trigger falling edge and echo rising edge.
    pub echo_delay: Duration,
}

impl EchoModel {
    pub fn distance_at(&self, angle_deg: f64) -> f64 {
        (self.neutral_distance_cm + (angle_deg - 90.0) * self.cm_per_degree).max(2.0)
    }
}

#[derive(Debug)]
struct BusState {
    levels: HashMap<u8, bool>,
    duty: HashMap<u8, f64>,
    claimed: HashSet<u8>,
    servo_angle: f64,
    echo_window: Option<(Instant, Instant)>,
}

impl Default for BusState {
    fn default() -> Self {
        Self {
            levels: HashMap::new(),
            duty: HashMap::new(),
            claimed: HashSet::new(),
            servo_angle: 90.0,
            echo_window: None,
        }
    }
}

/// Shared state of every simulated line. Cheap to clone.
#[derive(Debug, Clone, Default)]
pub struct SimBus {
    inner: Arc<Mutex<BusState>>,
    model: Option<EchoModel>,
}

impl SimBus {
    pub fn new(model: Option<EchoModel>) -> Self {
        Self {
            inner: Arc::default(),
            model,
        }
    }

    fn state(&self) -> MutexGuard<'_, BusState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Current level of an output line; `None` if never driven.
    pub fn level(&self, bcm: u8) -> Option<bool> {
        self.state().levels.get(&bcm).copied()
    }

    /// Last duty cycle written to a PWM line.
    pub fn duty(&self, bcm: u8) -> Option<f64> {
        self.state().duty.get(&bcm).copied()
    }

    /// Angle implied by the last non-zero duty on the modelled servo.
    pub fn servo_angle(&self) -> f64 {
        self.state().servo_angle
    }

    pub fn claimed(&self) -> usize {
        self.state().claimed.len()
    }
}

/// Pin provider backed by a [`SimBus`].
pub struct SimPinProvider {
    bus: SimBus,
    clock: Arc<dyn Clock + Send + Sync>,
}

impl SimPinProvider {
    pub fn new(clock: Arc<dyn Clock + Send + Sync>, model: Option<EchoModel>) -> Self {
        Self {
            bus: SimBus::new(model),
            clock,
        }
    }

    pub fn bus(&self) -> SimBus {
        self.bus.clone()
    }

    fn claim(&self, bcm: u8) -> Result<(), HwError> {
        if self.bus.state().claimed.insert(bcm) {
            Ok(())
        } else {
            Err(HwError::PinClaimed(bcm))
        }
    }
}

impl PinProvider for SimPinProvider {
    fn output(
        &mut self,
        bcm: u8,
        initial_high: bool,
    ) -> Result<Box<dyn DigitalOutput + Send>, Box<dyn std::error::Error + Send + Sync>> {
        self.claim(bcm)?;
        self.bus.state().levels.insert(bcm, initial_high);
        Ok(Box::new(SimOutput {
            bcm,
            bus: self.bus.clone(),
            clock: Arc::clone(&self.clock),
        }))
    }

    fn input(
        &mut self,
        bcm: u8,
    ) -> Result<Box<dyn DigitalInput + Send>, Box<dyn std::error::Error + Send + Sync>> {
        self.claim(bcm)?;
        Ok(Box::new(SimInput {
            bcm,
            bus: self.bus.clone(),
            clock: Arc::clone(&self.clock),
        }))
    }

    fn pwm(
        &mut self,
        bcm: u8,
        _frequency_hz: f64,
    ) -> Result<Box<dyn PwmOutput + Send>, Box<dyn std::error::Error + Send + Sync>> {
        self.claim(bcm)?;
        self.bus.state().duty.insert(bcm, 0.0);
        Ok(Box::new(SimPwm {
            bcm,
            bus: self.bus.clone(),
        }))
    }
}

struct SimOutput {
    bcm: u8,
    bus: SimBus,
    clock: Arc<dyn Clock + Send + Sync>,
}

impl SimOutput {
    fn drive(&mut self, high: bool) {
        let now = self.clock.now();
        let mut st = self.bus.state();
        let was_high = st.levels.insert(self.bcm, high).unwrap_or(false);
        if let Some(model) = self.bus.model
            && model.trigger_pin == self.bcm
            && was_high
            && !high
        {
            let distance = model.distance_at(st.servo_angle);
            let round_trip = Duration::from_secs_f64(2.0 * distance / model.speed_of_sound_cm_s);
            let start = now + model.echo_delay;
            st.echo_window = Some((start, start + round_trip));
            trace!(distance_cm = distance, "sim echo armed");
        }
    }
}

impl DigitalOutput for SimOutput {
    fn set_high(&mut self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        self.drive(true);
        Ok(())
    }

    fn set_low(&mut self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        self.drive(false);
        Ok(())
    }
}

struct SimInput {
    bcm: u8,
    bus: SimBus,
    clock: Arc<dyn Clock + Send + Sync>,
}

impl DigitalInput for SimInput {
    fn is_high(&mut self) -> Result<bool, Box<dyn std::error::Error + Send + Sync>> {
        let now = self.clock.now();
        let st = self.bus.state();
        if let Some(model) = self.bus.model
            && model.echo_pin == self.bcm
        {
            return Ok(st
                .echo_window
                .is_some_and(|(start, end)| now >= start && now < end));
        }
        Ok(st.levels.get(&self.bcm).copied().unwrap_or(false))
    }
}

struct SimPwm {
    bcm: u8,
    bus: SimBus,
}

impl PwmOutput for SimPwm {
    fn set_duty_cycle(
        &mut self,
        percent: f64,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        if !(0.0..=100.0).contains(&percent) {
            return Err(Box::new(HwError::Pwm(format!(
                "duty {percent}% out of range on BCM{}",
                self.bcm
            ))));
        }
        let mut st = self.bus.state();
        st.duty.insert(self.bcm, percent);
        if percent > 0.0 && self.bus.model.is_some_and(|m| m.servo_pin == self.bcm) {
            st.servo_angle = (percent - 2.5) * 18.0;
        }
        Ok(())
    }
}

/// Camera that renders a bright box centred on a dark background.
#[derive(Debug, Clone, Copy)]
pub struct SyntheticCamera {
    pub width: u32,
    pub height: u32,
    /// Box size in pixels; `None` renders an empty (all dark) scene.
    pub object_px: Option<(u32, u32)>,
    pub background: u8,
    pub foreground: u8,
}

impl SyntheticCamera {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            object_px: None,
            background: 20,
            foreground: 250,
        }
    }

    pub fn with_object(mut self, w_px: u32, h_px: u32) -> Self {
        self.object_px = Some((w_px, h_px));
        self
    }

    pub fn render(&self) -> Frame {
        let (w, h) = (self.width as usize, self.height as usize);
        let mut rgb = vec![self.background; w * h * 3];
        if let Some((bw, bh)) = self.object_px {
            let bw = (bw as usize).min(w);
            let bh = (bh as usize).min(h);
            let x0 = (w - bw) / 2;
            let y0 = (h - bh) / 2;
            for y in y0..y0 + bh {
                let row = &mut rgb[(y * w + x0) * 3..(y * w + x0 + bw) * 3];
                row.fill(self.foreground);
            }
        }
        Frame {
            width: self.width,
            height: self.height,
            rgb,
        }
    }
}

impl FrameSource for SyntheticCamera {
    fn grab(&mut self) -> Result<Frame, Box<dyn std::error::Error + Send + Sync>> {
        Ok(self.render())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use packer_traits::ManualClock;

    fn model() -> EchoModel {
        EchoModel {
            trigger_pin: 13,
            echo_pin: 6,
            servo_pin: 19,
            neutral_distance_cm: 20.0,
            cm_per_degree: 0.5,
            speed_of_sound_cm_s: 34_300.0,
            echo_delay: Duration::from_micros(50),
        }
    }

    #[test]
    fn double_claim_is_rejected() {
        let mut pins = SimPinProvider::new(Arc::new(ManualClock::new()), None);
        assert!(pins.output(5, false).is_ok());
        let err = pins.output(5, false).err().map(|e| e.to_string());
        assert_eq!(err.as_deref(), Some("pin BCM5 already claimed"));
    }

    #[test]
    fn echo_window_tracks_servo_angle() {
        let clock = ManualClock::new();
        let mut pins = SimPinProvider::new(Arc::new(clock.clone()), Some(model()));
        let bus = pins.bus();
        let mut trig = pins.output(13, false).unwrap();
        let mut echo = pins.input(6).unwrap();
        let mut servo = pins.pwm(19, 50.0).unwrap();

        // 100 degrees -> duty 100/18 + 2.5
        servo.set_duty_cycle(100.0 / 18.0 + 2.5).unwrap();
        assert!((bus.servo_angle() - 100.0).abs() < 1e-9);

        trig.set_high().unwrap();
        trig.set_low().unwrap();
        assert!(!echo.is_high().unwrap());
        clock.advance(Duration::from_micros(60));
        assert!(echo.is_high().unwrap());
        // 25 cm round trip is ~1.46 ms
        clock.advance(Duration::from_millis(2));
        assert!(!echo.is_high().unwrap());
    }

    #[test]
    fn synthetic_camera_draws_centred_box() {
        let frame = SyntheticCamera::new(40, 20).with_object(10, 4).render();
        let px = |x: usize, y: usize| frame.rgb[(y * 40 + x) * 3];
        assert_eq!(px(20, 10), 250);
        assert_eq!(px(14, 10), 20);
        assert_eq!(px(15, 8), 250);
        assert_eq!(px(15, 7), 20);
    }
}
