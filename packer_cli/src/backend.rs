//! Rig assembly: simulated pins and cameras by default, Raspberry Pi GPIO and
//! still-image cameras with the `hardware` feature.

use std::sync::Arc;

use eyre::Result;
use packer_config::Config;
use packer_core::{HardwareContext, Machine};
use packer_traits::{Clock, FrameSource};

#[cfg(not(all(feature = "hardware", target_os = "linux")))]
pub fn build(cfg: &Config, virtual_time: bool) -> Result<Machine> {
    use std::time::Duration;

    use packer_config::CameraCfg;
    use packer_hardware::{EchoModel, SimPinProvider, SyntheticCamera};
    use packer_traits::{ManualClock, MonotonicClock};

    let clock: Arc<dyn Clock + Send + Sync> = if virtual_time {
        Arc::new(ManualClock::new())
    } else {
        Arc::new(MonotonicClock::new())
    };
    let model = EchoModel {
        trigger_pin: cfg.pins.trigger,
        echo_pin: cfg.pins.echo,
        servo_pin: cfg.pins.camera_servo,
        neutral_distance_cm: cfg.sim.neutral_distance_cm,
        cm_per_degree: cfg.sim.cm_per_degree,
        speed_of_sound_cm_s: cfg.sensor.speed_of_sound_cm_s,
        echo_delay: Duration::from_micros(100),
    };
    let mut pins = SimPinProvider::new(clock.clone(), Some(model));
    let ctx = HardwareContext::build(&mut pins, cfg, clock)?;

    let camera = |c: &CameraCfg| -> Box<dyn FrameSource + Send> {
        let cam = SyntheticCamera::new(cfg.cameras.frame_width, cfg.cameras.frame_height);
        Box::new(match c.sim_object_px {
            Some((w, h)) => cam.with_object(w, h),
            None => cam,
        })
    };
    tracing::info!(virtual_time, "using simulated rig");
    Machine::new(ctx, camera(&cfg.cameras.front), camera(&cfg.cameras.side), cfg)
}

#[cfg(all(feature = "hardware", target_os = "linux"))]
pub fn build(cfg: &Config, virtual_time: bool) -> Result<Machine> {
    use eyre::WrapErr;
    use packer_config::CameraCfg;
    use packer_hardware::{RppalPins, StillImageCamera};
    use packer_traits::MonotonicClock;

    if virtual_time {
        eyre::bail!("--virtual-time is only available with the simulated rig");
    }
    let clock: Arc<dyn Clock + Send + Sync> = Arc::new(MonotonicClock::new());
    let mut pins = RppalPins::new().wrap_err("open GPIO")?;
    let ctx = HardwareContext::build(&mut pins, cfg, clock)?;

    let camera = |c: &CameraCfg| -> Box<dyn FrameSource + Send> {
        Box::new(StillImageCamera::new(
            c.capture_command.clone(),
            c.image_path.clone(),
        ))
    };
    tracing::info!("using GPIO rig");
    Machine::new(ctx, camera(&cfg.cameras.front), camera(&cfg.cameras.side), cfg)
}
