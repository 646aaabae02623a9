use std::error::Error;
use std::path::Path;
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use packer_config::Config;
use packer_core::mocks::{PinLog, RecordingPins, ScriptedCamera, frame_with_box};
use packer_core::{HardwareContext, Machine, PackerError, Phase, WrapSize};
use packer_traits::{Clock, Frame, FrameSource, ManualClock};

fn front_frame() -> Frame {
    frame_with_box(640, 480, 133, 83, 20, 250)
}

fn side_frame() -> Frame {
    frame_with_box(640, 480, 264, 130, 20, 250)
}

fn build(
    front: Box<dyn FrameSource + Send>,
    side: Box<dyn FrameSource + Send>,
    images: &Path,
) -> (Machine, PinLog, ManualClock) {
    let clock = ManualClock::new();
    let mut pins = RecordingPins::new(clock.clone()).with_echo(6, Duration::from_micros(875));
    let log = pins.log();
    let mut cfg = Config::default();
    cfg.vision.images_dir = images.to_string_lossy().into_owned();
    cfg.optimizer.seed = Some(11);
    let shared: Arc<dyn Clock + Send + Sync> = Arc::new(clock.clone());
    let ctx = HardwareContext::build(&mut pins, &cfg, shared).unwrap();
    let machine = Machine::new(ctx, front, side, &cfg).unwrap();
    (machine, log, clock)
}

fn packer_error(e: &eyre::Report) -> Option<&PackerError> {
    e.downcast_ref::<PackerError>()
}

#[test]
fn capture_then_deliver() {
    let dir = tempfile::tempdir().unwrap();
    let (machine, log, _clock) = build(
        Box::new(ScriptedCamera::new(Some(front_frame()))),
        Box::new(ScriptedCamera::new(Some(side_frame()))),
        dir.path(),
    );

    let report = machine.capture_dimensions().unwrap();
    // side a, front a, front b with their offsets.
    assert!((report.object.length - 9.9).abs() < 0.15, "{:?}", report.object);
    assert!((report.object.width - 7.7).abs() < 0.15, "{:?}", report.object);
    assert!((report.object.height - 5.0).abs() < 0.15, "{:?}", report.object);
    assert!(report.positioner.converged);
    assert!(report.front_image.exists());
    assert!(report.side_image.exists());
    let name = report.front_image.file_name().unwrap().to_string_lossy();
    assert!(name.starts_with("front_") && name.ends_with(".png"), "{name}");
    assert!(report.wrap.width < 25.4);

    let cached = machine.last_report().unwrap();
    assert_eq!(cached.wrap, report.wrap);

    let seq = machine.deliver().unwrap();
    assert_eq!(seq.phases_completed, Phase::DELIVERY.to_vec());
    assert!(log.rising_edges(24) > 0);
}

#[test]
fn deliver_without_capture_fails_loudly() {
    let dir = tempfile::tempdir().unwrap();
    let (machine, log, _clock) = build(
        Box::new(ScriptedCamera::new(Some(front_frame()))),
        Box::new(ScriptedCamera::new(Some(side_frame()))),
        dir.path(),
    );
    let err = machine.deliver().unwrap_err();
    match packer_error(&err) {
        Some(PackerError::Precondition(msg)) => assert!(msg.contains("no measurement captured")),
        other => panic!("expected Precondition, got {other:?}"),
    }
    assert!(log.events().is_empty());
}

#[test]
fn side_camera_retries_with_backoff() {
    let dir = tempfile::tempdir().unwrap();
    let side = ScriptedCamera::new(Some(side_frame()))
        .then_error("usb reset")
        .then_frame(frame_with_box(640, 480, 0, 0, 10, 10));
    let grabs = side.grab_counter();
    let (machine, _log, clock) = build(
        Box::new(ScriptedCamera::new(Some(front_frame()))),
        Box::new(side),
        dir.path(),
    );

    let before = clock.elapsed();
    machine.capture_dimensions().unwrap();
    assert_eq!(*grabs.lock().unwrap(), 3);
    // Two backoffs of 1 s on top of the positioner and sensor time.
    assert!(clock.elapsed() - before >= Duration::from_secs(2));
}

#[test]
fn exhausted_side_retries_fail_capture_and_keep_cache_empty() {
    let dir = tempfile::tempdir().unwrap();
    let dark = frame_with_box(640, 480, 0, 0, 10, 10);
    let side = ScriptedCamera::new(Some(dark));
    let grabs = side.grab_counter();
    let (machine, log, _clock) = build(
        Box::new(ScriptedCamera::new(Some(front_frame()))),
        Box::new(side),
        dir.path(),
    );

    let err = machine.capture_dimensions().unwrap_err();
    assert!(matches!(packer_error(&err), Some(PackerError::Vision(_))));
    assert!(format!("{err:#}").contains("side camera failed after 3 attempt(s)"));
    assert_eq!(*grabs.lock().unwrap(), 3);
    assert!(machine.last_report().is_none());
    // The front extraction succeeded, so its snapshot is on disk; the side has none.
    let names: Vec<String> = std::fs::read_dir(dir.path())
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    assert_eq!(names.len(), 1, "{names:?}");
    assert!(names[0].starts_with("front_") && names[0].ends_with(".png"), "{names:?}");
    // Camera servo released by cleanup.
    assert_eq!(log.duty(19), Some(0.0));
}

#[test]
fn front_camera_does_not_retry_by_default() {
    let dir = tempfile::tempdir().unwrap();
    let front = ScriptedCamera::new(Some(front_frame())).then_error("timeout");
    let grabs = front.grab_counter();
    let (machine, _log, _clock) = build(
        Box::new(front),
        Box::new(ScriptedCamera::new(Some(side_frame()))),
        dir.path(),
    );
    let err = machine.capture_dimensions().unwrap_err();
    assert!(format!("{err:#}").contains("front camera"));
    assert_eq!(*grabs.lock().unwrap(), 1);

    // The machine accepts the next request.
    machine.capture_dimensions().unwrap();
}

#[test]
fn emergency_stop_latches_until_next_operation() {
    let dir = tempfile::tempdir().unwrap();
    let (machine, log, _clock) = build(
        Box::new(ScriptedCamera::new(Some(front_frame()))),
        Box::new(ScriptedCamera::new(Some(side_frame()))),
        dir.path(),
    );
    machine.emergency_stop();
    assert!(machine.estop().is_latched());
    for bcm in [14, 15, 18, 17] {
        assert_eq!(log.level(bcm), Some(true));
    }
    // A fresh operation re-arms.
    machine
        .deliver_with(WrapSize {
            length: 12.0,
            width: 20.0,
        })
        .unwrap();
    assert!(!machine.estop().is_latched());
}

/// Blocks inside `grab` until released, so a capture can be held open.
struct GateCamera {
    entered: mpsc::Sender<()>,
    release: Mutex<mpsc::Receiver<()>>,
    frame: Frame,
}

impl FrameSource for GateCamera {
    fn grab(&mut self) -> Result<Frame, Box<dyn Error + Send + Sync>> {
        let _ = self.entered.send(());
        let _ = self.release.lock().unwrap().recv();
        Ok(self.frame.clone())
    }
}

#[test]
fn concurrent_request_is_busy() {
    let dir = tempfile::tempdir().unwrap();
    let (entered_tx, entered_rx) = mpsc::channel();
    let (release_tx, release_rx) = mpsc::channel();
    let gate = GateCamera {
        entered: entered_tx,
        release: Mutex::new(release_rx),
        frame: front_frame(),
    };
    let (machine, _log, _clock) = build(
        Box::new(gate),
        Box::new(ScriptedCamera::new(Some(side_frame()))),
        dir.path(),
    );
    let machine = Arc::new(machine);

    let worker = {
        let m = Arc::clone(&machine);
        thread::spawn(move || m.capture_dimensions().map(|r| r.wrap))
    };
    entered_rx.recv().unwrap();

    let err = machine
        .deliver_with(WrapSize {
            length: 12.0,
            width: 20.0,
        })
        .unwrap_err();
    assert!(matches!(packer_error(&err), Some(PackerError::Busy)));
    let err = machine.initial_seal().unwrap_err();
    assert!(matches!(packer_error(&err), Some(PackerError::Busy)));

    release_tx.send(()).unwrap();
    let wrap = worker.join().unwrap().unwrap();
    assert!(wrap.width > 0.0);

    // Free again once the capture is done.
    machine.deliver().unwrap();
}

#[test]
fn self_check_reports_each_peripheral() {
    let dir = tempfile::tempdir().unwrap();
    let (machine, _log, _clock) = build(
        Box::new(ScriptedCamera::new(Some(front_frame()))),
        Box::new(ScriptedCamera::new(None)),
        dir.path(),
    );
    let report = machine.self_check().unwrap();
    assert!(!report.ok());
    let d = report.distance_cm.unwrap();
    assert!((d - 15.0).abs() < 0.3);
    assert_eq!((report.front.width, report.front.height), (640, 480));
    assert!(report.front.error.is_none());
    assert!(report.side.error.is_some());
    assert_eq!(report.pwms, 2);
}
