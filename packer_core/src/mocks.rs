//! Test and helper mocks for packer_core.
//!
//! `RecordingPins` hands out lines that log every write with the virtual time
//! it happened at, so tests can assert on ordering and durations without a
//! board attached.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use packer_traits::{
    Clock, DigitalInput, DigitalOutput, Frame, FrameSource, ManualClock, PinProvider, PwmOutput,
};

type BoxErr = Box<dyn std::error::Error + Send + Sync>;

/// One recorded write.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PinEvent {
    /// Virtual time since the clock's origin.
    pub at: Duration,
    pub bcm: u8,
    pub value: PinValue,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PinValue {
    Level(bool),
    Duty(f64),
}

#[derive(Default)]
struct LogState {
    events: Vec<PinEvent>,
    levels: HashMap<u8, bool>,
    duties: HashMap<u8, f64>,
    fail_high: HashSet<u8>,
}

/// Shared view of everything written through a [`RecordingPins`].
#[derive(Clone)]
pub struct PinLog {
    state: Arc<Mutex<LogState>>,
    clock: ManualClock,
}

impl PinLog {
    fn state(&self) -> std::sync::MutexGuard<'_, LogState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn events(&self) -> Vec<PinEvent> {
        self.state().events.clone()
    }

    /// Writes to `bcm`, in order.
    pub fn events_for(&self, bcm: u8) -> Vec<PinEvent> {
        self.state()
            .events
            .iter()
            .filter(|e| e.bcm == bcm)
            .copied()
            .collect()
    }

    pub fn level(&self, bcm: u8) -> Option<bool> {
        self.state().levels.get(&bcm).copied()
    }

    pub fn duty(&self, bcm: u8) -> Option<f64> {
        self.state().duties.get(&bcm).copied()
    }

    /// Number of rising edges written to `bcm`.
    pub fn rising_edges(&self, bcm: u8) -> usize {
        let mut prev = false;
        let mut n = 0;
        for e in self.events_for(bcm) {
            if let PinValue::Level(l) = e.value {
                if l && !prev {
                    n += 1;
                }
                prev = l;
            }
        }
        n
    }

    /// Make every later attempt to drive `bcm` high fail.
    pub fn fail_on_high(&self, bcm: u8) {
        self.state().fail_high.insert(bcm);
    }

    pub fn clock(&self) -> &ManualClock {
        &self.clock
    }

    fn record(&self, bcm: u8, value: PinValue) -> Result<(), BoxErr> {
        let at = self.clock.elapsed();
        let mut st = self.state();
        if value == PinValue::Level(true) && st.fail_high.contains(&bcm) {
            return Err(Box::new(std::io::Error::other(format!(
                "injected fault on BCM{bcm}"
            ))));
        }
        match value {
            PinValue::Level(l) => {
                st.levels.insert(bcm, l);
            }
            PinValue::Duty(d) => {
                st.duties.insert(bcm, d);
            }
        }
        st.events.push(PinEvent { at, bcm, value });
        Ok(())
    }
}

struct RecOut {
    bcm: u8,
    log: PinLog,
}

impl DigitalOutput for RecOut {
    fn set_high(&mut self) -> Result<(), BoxErr> {
        self.log.record(self.bcm, PinValue::Level(true))
    }

    fn set_low(&mut self) -> Result<(), BoxErr> {
        self.log.record(self.bcm, PinValue::Level(false))
    }
}

struct RecPwm {
    bcm: u8,
    log: PinLog,
}

impl PwmOutput for RecPwm {
    fn set_duty_cycle(&mut self, percent: f64) -> Result<(), BoxErr> {
        self.log.record(self.bcm, PinValue::Duty(percent))
    }
}

/// An input that never goes high.
pub struct SilentInput;

impl DigitalInput for SilentInput {
    fn is_high(&mut self) -> Result<bool, BoxErr> {
        Ok(false)
    }
}

/// Pin provider that records writes against a shared [`ManualClock`].
/// Inputs are silent unless an echo is scripted with [`RecordingPins::with_echo`].
pub struct RecordingPins {
    log: PinLog,
    echo: Option<(u8, Duration)>,
}

impl RecordingPins {
    pub fn new(clock: ManualClock) -> Self {
        Self {
            log: PinLog {
                state: Arc::new(Mutex::new(LogState::default())),
                clock,
            },
            echo: None,
        }
    }

    /// Serve `bcm` as an echo line that goes high right after the first read
    /// following a trigger and stays high for `high`.
    pub fn with_echo(mut self, bcm: u8, high: Duration) -> Self {
        self.echo = Some((bcm, high));
        self
    }

    pub fn log(&self) -> PinLog {
        self.log.clone()
    }
}

/// Reads low once, then high for `high` of virtual time, then low again.
struct ScriptedEcho {
    clock: ManualClock,
    high: Duration,
    rose_at: Option<Duration>,
    reads: u32,
}

impl DigitalInput for ScriptedEcho {
    fn is_high(&mut self) -> Result<bool, BoxErr> {
        self.reads += 1;
        let now = self.clock.elapsed();
        match self.rose_at {
            None if self.reads > 1 => {
                self.rose_at = Some(now);
                Ok(true)
            }
            None => Ok(false),
            Some(t) if now.saturating_sub(t) < self.high => Ok(true),
            Some(_) => {
                // Re-arm for the next measurement.
                self.rose_at = None;
                self.reads = 0;
                Ok(false)
            }
        }
    }
}

impl PinProvider for RecordingPins {
    fn output(
        &mut self,
        bcm: u8,
        initial_high: bool,
    ) -> Result<Box<dyn DigitalOutput + Send>, BoxErr> {
        self.log.state().levels.insert(bcm, initial_high);
        Ok(Box::new(RecOut {
            bcm,
            log: self.log.clone(),
        }))
    }

    fn input(&mut self, bcm: u8) -> Result<Box<dyn DigitalInput + Send>, BoxErr> {
        match self.echo {
            Some((echo, high)) if echo == bcm => Ok(Box::new(ScriptedEcho {
                clock: self.log.clock.clone(),
                high,
                rose_at: None,
                reads: 0,
            })),
            _ => Ok(Box::new(SilentInput)),
        }
    }

    fn pwm(&mut self, bcm: u8, _frequency_hz: f64) -> Result<Box<dyn PwmOutput + Send>, BoxErr> {
        Ok(Box::new(RecPwm {
            bcm,
            log: self.log.clone(),
        }))
    }
}

/// Camera that replays queued results, then repeats the fallback frame.
pub struct ScriptedCamera {
    queue: VecDeque<Result<Frame, String>>,
    fallback: Option<Frame>,
    grabs: Arc<Mutex<u32>>,
}

impl ScriptedCamera {
    pub fn new(fallback: Option<Frame>) -> Self {
        Self {
            queue: VecDeque::new(),
            fallback,
            grabs: Arc::new(Mutex::new(0)),
        }
    }

    pub fn then_frame(mut self, frame: Frame) -> Self {
        self.queue.push_back(Ok(frame));
        self
    }

    pub fn then_error(mut self, msg: &str) -> Self {
        self.queue.push_back(Err(msg.to_string()));
        self
    }

    /// Counter of grabs, readable after the camera is moved into a station.
    pub fn grab_counter(&self) -> Arc<Mutex<u32>> {
        Arc::clone(&self.grabs)
    }
}

impl FrameSource for ScriptedCamera {
    fn grab(&mut self) -> Result<Frame, BoxErr> {
        *self.grabs.lock().unwrap_or_else(PoisonError::into_inner) += 1;
        match self.queue.pop_front() {
            Some(Ok(f)) => Ok(f),
            Some(Err(msg)) => Err(Box::new(std::io::Error::other(msg))),
            None => self
                .fallback
                .clone()
                .ok_or_else(|| Box::new(std::io::Error::other("no frame scripted")) as BoxErr),
        }
    }
}

/// Gray frame of `bg` with a `w` x `h` block of `fg` in the middle.
pub fn frame_with_box(width: u32, height: u32, w: u32, h: u32, bg: u8, fg: u8) -> Frame {
    let (x0, y0) = ((width - w.min(width)) / 2, (height - h.min(height)) / 2);
    let mut rgb = Vec::with_capacity((width * height * 3) as usize);
    for y in 0..height {
        for x in 0..width {
            let inside = x >= x0 && x < x0 + w && y >= y0 && y < y0 + h;
            let v = if inside { fg } else { bg };
            rgb.extend_from_slice(&[v, v, v]);
        }
    }
    Frame { width, height, rgb }
}

/// The log's virtual clock as the shared handle the core types take.
pub fn log_clock(log: &PinLog) -> Arc<dyn Clock + Send + Sync> {
    Arc::new(log.clock.clone())
}
