pub mod clock;

pub use clock::{Clock, ManualClock, MonotonicClock};

/// A single GPIO line driven by the controller (relay coil, step/dir/enable, trigger).
pub trait DigitalOutput {
    fn set_high(&mut self) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
    fn set_low(&mut self) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;

    fn write(&mut self, high: bool) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        if high { self.set_high() } else { self.set_low() }
    }
}

/// A single GPIO line sampled by the controller (ultrasonic echo).
pub trait DigitalInput {
    fn is_high(&mut self) -> Result<bool, Box<dyn std::error::Error + Send + Sync>>;
}

/// A PWM channel driving a hobby servo. Duty is in percent (0.0..=100.0);
/// 0.0 releases the servo.
pub trait PwmOutput {
    fn set_duty_cycle(&mut self, percent: f64)
    -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
}

/// Hands out claimed GPIO lines by BCM number.
pub trait PinProvider {
    fn output(
        &mut self,
        bcm: u8,
        initial_high: bool,
    ) -> Result<Box<dyn DigitalOutput + Send>, Box<dyn std::error::Error + Send + Sync>>;

    fn input(
        &mut self,
        bcm: u8,
    ) -> Result<Box<dyn DigitalInput + Send>, Box<dyn std::error::Error + Send + Sync>>;

    fn pwm(
        &mut self,
        bcm: u8,
        frequency_hz: f64,
    ) -> Result<Box<dyn PwmOutput + Send>, Box<dyn std::error::Error + Send + Sync>>;
}

/// One still image, packed RGB8, row-major.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub width: u32,
    pub height: u32,
    pub rgb: Vec<u8>,
}

impl Frame {
    /// Returns `None` when the buffer length does not match `width * height * 3`.
    pub fn from_rgb(width: u32, height: u32, rgb: Vec<u8>) -> Option<Self> {
        let expected = (width as usize)
            .checked_mul(height as usize)?
            .checked_mul(3)?;
        (rgb.len() == expected).then_some(Self { width, height, rgb })
    }
}

/// A camera that can deliver one still frame on demand.
pub trait FrameSource {
    fn grab(&mut self) -> Result<Frame, Box<dyn std::error::Error + Send + Sync>>;
}

impl<T: FrameSource + ?Sized> FrameSource for Box<T> {
    fn grab(&mut self) -> Result<Frame, Box<dyn std::error::Error + Send + Sync>> {
        (**self).grab()
    }
}
