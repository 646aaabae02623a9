use std::error::Error;
use std::sync::Arc;
use std::time::{Duration, Instant};

use packer_core::mocks::{RecordingPins, SilentInput};
use packer_core::{
    DistanceSensor, Edge, EmergencyStop, OutputLine, PackerError, PositionerCfg, SensorCfg,
    ServoActuator, ServoCfg, SideCameraPositioner,
};
use packer_hardware::{EchoModel, SimPinProvider};
use packer_traits::{Clock, DigitalInput, DigitalOutput, ManualClock, MonotonicClock, PinProvider};
use rstest::rstest;

struct NullOut;
impl DigitalOutput for NullOut {
    fn set_high(&mut self) -> Result<(), Box<dyn Error + Send + Sync>> {
        Ok(())
    }
    fn set_low(&mut self) -> Result<(), Box<dyn Error + Send + Sync>> {
        Ok(())
    }
}

struct StuckHigh;
impl DigitalInput for StuckHigh {
    fn is_high(&mut self) -> Result<bool, Box<dyn Error + Send + Sync>> {
        Ok(true)
    }
}

struct BrokenInput;
impl DigitalInput for BrokenInput {
    fn is_high(&mut self) -> Result<bool, Box<dyn Error + Send + Sync>> {
        Err(Box::new(std::io::Error::other("line read failed")))
    }
}

fn timeout_edge(e: &eyre::Report) -> Option<Edge> {
    match e.downcast_ref::<PackerError>() {
        Some(PackerError::SensorTimeout(edge)) => Some(*edge),
        _ => None,
    }
}

#[test]
fn silent_echo_times_out_in_real_time() {
    let clock: Arc<dyn Clock + Send + Sync> = Arc::new(MonotonicClock::new());
    let trigger = OutputLine::new(Box::new(NullOut), false, "trigger");
    let mut sensor = DistanceSensor::new(
        trigger,
        Box::new(SilentInput),
        clock,
        SensorCfg {
            poll: Duration::from_micros(200),
            ..SensorCfg::default()
        },
    );

    let t0 = Instant::now();
    let err = sensor.measure(Duration::from_millis(50)).unwrap_err();
    let took = t0.elapsed();

    assert_eq!(timeout_edge(&err), Some(Edge::Rising));
    assert!(took >= Duration::from_millis(50), "took {took:?}");
    assert!(took < Duration::from_millis(250), "took {took:?}");
}

#[test]
fn stuck_echo_reports_falling_edge() {
    let clock = ManualClock::new();
    let trigger = OutputLine::new(Box::new(NullOut), false, "trigger");
    let mut sensor = DistanceSensor::new(
        trigger,
        Box::new(StuckHigh),
        Arc::new(clock.clone()),
        SensorCfg::default(),
    );
    let err = sensor.measure(Duration::from_millis(20)).unwrap_err();
    assert_eq!(timeout_edge(&err), Some(Edge::Falling));
    // Only the falling wait spins; the rising edge is seen immediately.
    assert!(clock.elapsed() < Duration::from_millis(21));
}

#[test]
fn echo_read_errors_are_hardware_errors() {
    let trigger = OutputLine::new(Box::new(NullOut), false, "trigger");
    let mut sensor = DistanceSensor::new(
        trigger,
        Box::new(BrokenInput),
        Arc::new(ManualClock::new()),
        SensorCfg::default(),
    );
    let err = sensor.measure(Duration::from_millis(20)).unwrap_err();
    assert!(matches!(
        err.downcast_ref::<PackerError>(),
        Some(PackerError::Io(_) | PackerError::Hardware(_))
    ));
}

#[test]
fn scripted_echo_converts_to_centimeters() {
    let clock = ManualClock::new();
    let mut pins = RecordingPins::new(clock.clone()).with_echo(6, Duration::from_micros(875));
    let log = pins.log();
    let trigger = OutputLine::new(pins.output(13, false).unwrap(), false, "trigger");
    let echo = pins.input(6).unwrap();
    let mut sensor = DistanceSensor::new(trigger, echo, Arc::new(clock), SensorCfg::default());

    let d = sensor.measure(Duration::from_millis(200)).unwrap();
    // 875 us round trip is 15.0 cm; polling adds at most one 10 us step.
    assert!((d - 15.0).abs() < 0.3, "d = {d}");

    // Trigger: low, high for 10 us, low.
    let levels: Vec<_> = log.events_for(13).iter().map(|e| e.value).collect();
    assert_eq!(levels.len(), 3);
    let ev = log.events_for(13);
    assert_eq!(ev[2].at - ev[1].at, Duration::from_micros(10));
    assert_eq!(ev[1].at - ev[0].at, Duration::from_micros(200));
}

fn sim_positioner(clock: &ManualClock) -> (SideCameraPositioner, packer_hardware::SimBus) {
    let model = EchoModel {
        trigger_pin: 13,
        echo_pin: 6,
        servo_pin: 19,
        neutral_distance_cm: 20.0,
        cm_per_degree: 0.5,
        speed_of_sound_cm_s: 34_300.0,
        echo_delay: Duration::from_micros(50),
    };
    let shared: Arc<dyn Clock + Send + Sync> = Arc::new(clock.clone());
    let mut pins = SimPinProvider::new(shared.clone(), Some(model));
    let bus = pins.bus();
    let estop = EmergencyStop::new();
    let trigger = estop.output(pins.output(13, false).unwrap(), false, "trigger");
    let sensor = DistanceSensor::new(
        trigger,
        pins.input(6).unwrap(),
        shared.clone(),
        SensorCfg::default(),
    );
    let servo = ServoActuator::new(
        estop.pwm(pins.pwm(19, 50.0).unwrap(), "camera_servo"),
        shared.clone(),
        ServoCfg::default(),
    );
    (
        SideCameraPositioner::new(sensor, servo, shared, PositionerCfg::default()),
        bus,
    )
}

#[test]
fn positioner_converges_on_simulated_rig() {
    let clock = ManualClock::new();
    let (mut positioner, bus) = sim_positioner(&clock);
    let out = positioner.adjust();

    assert!(out.converged, "{out:?}");
    assert!(out.iterations <= 6, "{out:?}");
    assert_eq!(out.failed_readings, 0);
    // 20 cm at 90 degrees, 0.5 cm per degree: 15 cm sits at 80 degrees.
    assert!((out.angle - 80.0).abs() < 1.5, "{out:?}");
    assert!((bus.servo_angle() - out.angle).abs() < 1e-9);
    // Servo pulse is released after every move.
    assert_eq!(bus.duty(19), Some(0.0));
}

#[rstest]
#[case(3)]
#[case(20)]
fn positioner_skips_failed_readings(#[case] iterations: u32) {
    let clock = ManualClock::new();
    let shared: Arc<dyn Clock + Send + Sync> = Arc::new(clock.clone());
    let mut pins = RecordingPins::new(clock.clone());
    let log = pins.log();
    let trigger = OutputLine::new(pins.output(13, false).unwrap(), false, "trigger");
    let sensor = DistanceSensor::new(
        trigger,
        Box::new(SilentInput),
        shared.clone(),
        SensorCfg {
            timeout: Duration::from_millis(5),
            ..SensorCfg::default()
        },
    );
    let servo = ServoActuator::new(
        packer_core::PwmLine::new(pins.pwm(19, 50.0).unwrap(), "camera_servo"),
        shared.clone(),
        ServoCfg::default(),
    );
    let mut positioner = SideCameraPositioner::new(sensor, servo, shared, PositionerCfg::default());

    let out = positioner.adjust_to_target(15.0, 0.5, iterations);
    assert!(!out.converged);
    assert_eq!(out.iterations, iterations);
    assert_eq!(out.failed_readings, iterations);
    assert_eq!(out.last_distance_cm, None);
    assert_eq!(out.angle, 90.0);
    // One neutral move: duty on, then released.
    assert_eq!(log.events_for(19).len(), 2);
}
