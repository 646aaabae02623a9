use packer_traits::{DigitalInput, DigitalOutput, PinProvider, PwmOutput};
use rppal::gpio::{Gpio, InputPin, OutputPin};

use crate::error::HwError;

fn gpio_err(e: rppal::gpio::Error) -> HwError {
    HwError::Gpio(e.to_string())
}

/// Raspberry Pi lines through `rppal`. Servo PWM is software-timed.
pub struct RppalPins {
    gpio: Gpio,
}

impl RppalPins {
    pub fn new() -> Result<Self, HwError> {
        Ok(Self {
            gpio: Gpio::new().map_err(gpio_err)?,
        })
    }
}

impl PinProvider for RppalPins {
    fn output(
        &mut self,
        bcm: u8,
        initial_high: bool,
    ) -> Result<Box<dyn DigitalOutput + Send>, Box<dyn std::error::Error + Send + Sync>> {
        let pin = self.gpio.get(bcm).map_err(gpio_err)?;
        let mut out = if initial_high {
            pin.into_output_high()
        } else {
            pin.into_output_low()
        };
        // Leave relays where the safe-state guard put them on exit.
        out.set_reset_on_drop(false);
        Ok(Box::new(RppalOutput(out)))
    }

    fn input(
        &mut self,
        bcm: u8,
    ) -> Result<Box<dyn DigitalInput + Send>, Box<dyn std::error::Error + Send + Sync>> {
        let pin = self.gpio.get(bcm).map_err(gpio_err)?;
        Ok(Box::new(RppalInput(pin.into_input())))
    }

    fn pwm(
        &mut self,
        bcm: u8,
        frequency_hz: f64,
    ) -> Result<Box<dyn PwmOutput + Send>, Box<dyn std::error::Error + Send + Sync>> {
        let pin = self.gpio.get(bcm).map_err(gpio_err)?;
        Ok(Box::new(RppalPwm {
            pin: pin.into_output_low(),
            frequency_hz,
        }))
    }
}

struct RppalOutput(OutputPin);

impl DigitalOutput for RppalOutput {
    fn set_high(&mut self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        self.0.set_high();
        Ok(())
    }

    fn set_low(&mut self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        self.0.set_low();
        Ok(())
    }
}

struct RppalInput(InputPin);

impl DigitalInput for RppalInput {
    fn is_high(&mut self) -> Result<bool, Box<dyn std::error::Error + Send + Sync>> {
        Ok(self.0.is_high())
    }
}

struct RppalPwm {
    pin: OutputPin,
    frequency_hz: f64,
}

impl PwmOutput for RppalPwm {
    fn set_duty_cycle(
        &mut self,
        percent: f64,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        if !(0.0..=100.0).contains(&percent) {
            return Err(Box::new(HwError::Pwm(format!("duty {percent}% out of range"))));
        }
        if percent == 0.0 {
            self.pin.clear_pwm().map_err(gpio_err)?;
            self.pin.set_low();
            return Ok(());
        }
        self.pin
            .set_pwm_frequency(self.frequency_hz, percent / 100.0)
            .map_err(gpio_err)?;
        Ok(())
    }
}
