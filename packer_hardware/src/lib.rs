//! Concrete backends for the packaging rig.
//!
//! - `sim`: in-process pins, an ultrasonic echo model and synthetic camera
//!   frames. Always available; the CLI uses it unless built with `hardware`.
//! - `gpio`: Raspberry Pi GPIO through `rppal` (feature `hardware`, Linux only).
//! - `camera`: still-image camera that shells out to a capture command and
//!   decodes the resulting file.

pub mod camera;
pub mod error;
#[cfg(all(feature = "hardware", target_os = "linux"))]
pub mod gpio;
pub mod sim;

pub use camera::StillImageCamera;
pub use error::HwError;
pub use sim::{EchoModel, SimBus, SimPinProvider, SyntheticCamera};
#[cfg(all(feature = "hardware", target_os = "linux"))]
pub use gpio::RppalPins;
