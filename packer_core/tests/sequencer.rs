use std::sync::Arc;
use std::time::Duration;

use packer_config::Config;
use packer_core::mocks::{PinLog, PinValue, RecordingPins};
use packer_core::{
    ActuatorSequencer, HardwareContext, PackerError, Phase, SequencerCfg, SequencerDrives, ServoActuator,
    WrapSize, steps_for,
};
use packer_traits::{Clock, ManualClock};
use rstest::rstest;

const RELAYS: [u8; 8] = [14, 15, 27, 22, 10, 9, 18, 17];
const STEPS: [u8; 4] = [7, 20, 24, 8];
const DIRS: [u8; 4] = [12, 21, 23, 25];

fn sequencer() -> (ActuatorSequencer, PinLog, ManualClock) {
    let clock = ManualClock::new();
    let mut pins = RecordingPins::new(clock.clone());
    let log = pins.log();
    let cfg = Config::default();
    let shared: Arc<dyn Clock + Send + Sync> = Arc::new(clock.clone());
    let ctx = HardwareContext::build(&mut pins, &cfg, shared.clone()).unwrap();
    let drives = SequencerDrives {
        release_servo: ServoActuator::new(ctx.release_servo, shared.clone(), (&cfg.servo).into()),
        fork: ctx.fork,
        feeder: ctx.feeder,
        rails: ctx.rails,
        main: ctx.main,
        left: ctx.left,
    };
    let seq = ActuatorSequencer::new(drives, ctx.estop, shared, SequencerCfg::from(&cfg));
    (seq, log, clock)
}

fn assert_all_safe(log: &PinLog) {
    for bcm in RELAYS {
        assert_eq!(log.level(bcm), Some(true), "relay BCM{bcm} energized");
    }
    for bcm in STEPS.iter().chain(DIRS.iter()) {
        assert_eq!(log.level(*bcm), Some(false), "stepper BCM{bcm} left high");
    }
    assert_eq!(log.duty(26), Some(0.0));
}

fn fault_phase(e: &eyre::Report) -> Option<Phase> {
    match e.downcast_ref::<PackerError>() {
        Some(PackerError::ActuatorFault { phase, .. }) => Some(*phase),
        _ => None,
    }
}

#[test]
fn full_delivery_runs_every_phase_in_order() {
    let (seq, log, clock) = sequencer();
    let wrap = WrapSize {
        length: 13.0,
        width: 18.0,
    };
    let report = seq.run(&wrap).unwrap();

    assert_eq!(report.phases_completed, Phase::DELIVERY.to_vec());
    assert_eq!(report.elapsed_ms, clock.elapsed().as_millis() as u64);

    // Release servo driven to 55 degrees then released.
    let duties: Vec<_> = log.events_for(26).iter().map(|e| e.value).collect();
    assert_eq!(duties[0], PinValue::Duty(55.0 / 18.0 + 2.5));
    assert_eq!(log.duty(26), Some(0.0));

    assert_eq!(log.rising_edges(24), steps_for(13.0, 320.0) as usize);
    let fork_steps: u64 = [0.4, 0.8, 1.9].iter().map(|d| 2 * steps_for(*d, 400.0)).sum();
    assert_eq!(log.rising_edges(8), fork_steps as usize);
    // (25.4 - 18) / 2 = 3.7 cm out and back.
    let rail = steps_for(3.7, 500.0) as usize;
    assert_eq!(log.rising_edges(7), 2 * rail);
    assert_eq!(log.rising_edges(20), 2 * rail);

    // Six seal strokes: three pushes on main relay1, three pulls on relay2.
    let energized = |bcm| {
        log.events_for(bcm)
            .iter()
            .filter(|e| e.value == PinValue::Level(false))
            .count()
    };
    assert_eq!(energized(14), 3);
    assert_eq!(energized(15), 3);
    // Left actuator is reversed: pushes on relay2.
    assert_eq!(energized(17), 3);

    assert_all_safe(&log);
}

#[test]
fn feed_failure_aborts_before_rails_and_leaves_outputs_safe() {
    let (seq, log, _clock) = sequencer();
    log.fail_on_high(24);

    let err = seq
        .run(&WrapSize {
            length: 13.0,
            width: 18.0,
        })
        .unwrap_err();

    assert_eq!(fault_phase(&err), Some(Phase::FeedWrap));
    assert!(format!("{err}").contains("feed_wrap"));
    assert_eq!(log.rising_edges(7), 0);
    assert_eq!(log.rising_edges(20), 0);
    for bcm in [14, 15, 17, 18] {
        assert!(
            log.events_for(bcm)
                .iter()
                .all(|e| e.value == PinValue::Level(true)),
            "relay BCM{bcm} moved after the fault"
        );
    }
    assert_all_safe(&log);
}

#[rstest]
#[case(13.0, 25.5)]
#[case(13.0, 0.0)]
#[case(-1.0, 10.0)]
#[case(f64::NAN, 10.0)]
#[case(f64::INFINITY, 10.0)]
#[case(100.5, 10.0)]
#[case(1e300, 10.0)]
#[case(13.0, f64::INFINITY)]
fn bad_wrap_is_rejected_before_motion(#[case] length: f64, #[case] width: f64) {
    let (seq, log, clock) = sequencer();
    let err = seq.run(&WrapSize { length, width }).unwrap_err();
    assert!(matches!(
        err.downcast_ref::<PackerError>(),
        Some(PackerError::Precondition(_))
    ));
    assert!(log.events().is_empty());
    assert_eq!(clock.elapsed(), Duration::ZERO);
}

#[test]
fn over_long_wrap_names_the_feed_limit() {
    let (seq, log, _clock) = sequencer();
    assert_eq!(seq.cfg().max_wrap_length_cm, 100.0);
    let err = seq
        .run(&WrapSize {
            length: 250.0,
            width: 10.0,
        })
        .unwrap_err();
    match err.downcast_ref::<PackerError>() {
        Some(PackerError::Precondition(msg)) => assert!(msg.contains("feed limit"), "{msg}"),
        other => panic!("expected Precondition, got {other:?}"),
    }
    assert!(log.events().is_empty());
}

#[test]
fn stock_width_wrap_needs_no_rail_travel() {
    let (seq, log, _clock) = sequencer();
    seq.run(&WrapSize {
        length: 10.0,
        width: 25.4,
    })
    .unwrap();
    assert_eq!(log.rising_edges(7), 0);
}

#[test]
fn latched_stop_fails_release_after_recovery_sweep() {
    let (seq, log, clock) = sequencer();
    seq.estop().stop_all();

    let err = seq
        .run(&WrapSize {
            length: 13.0,
            width: 18.0,
        })
        .unwrap_err();

    assert_eq!(fault_phase(&err), Some(Phase::ReleaseServo));
    // Five recovery steps, 300 ms apart, nothing else.
    assert_eq!(clock.elapsed(), Duration::from_millis(1500));
    assert_eq!(log.rising_edges(8), 0);
    assert!(
        log.events_for(26)
            .iter()
            .all(|e| e.value == PinValue::Duty(0.0))
    );
    assert_all_safe(&log);
}

#[test]
fn initial_seal_feeds_leader_then_seals() {
    let (seq, log, _clock) = sequencer();
    let report = seq.initial_seal().unwrap();
    assert_eq!(report.phases_completed, vec![Phase::FeedWrap, Phase::SealCycle]);
    assert_eq!(log.rising_edges(24), steps_for(4.0, 320.0) as usize);
    assert_eq!(log.rising_edges(8), 0);
    // The release servo is only zeroed by cleanup.
    assert!(
        log.events_for(26)
            .iter()
            .all(|e| e.value == PinValue::Duty(0.0))
    );
    assert_all_safe(&log);
}
