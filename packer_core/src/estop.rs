//! Out-of-band emergency stop.
//!
//! The stop owns a registry of every output handed out through it. `stop_all`
//! latches first, then forces each line to its safe level and zeroes every
//! PWM channel. The latch makes any later attempt to energize an output fail,
//! so whatever sequence was running aborts at its next action and runs its
//! own cleanup.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use packer_traits::{DigitalOutput, PwmOutput};
use tracing::{info, warn};

use crate::actuators::{OutputLine, PwmLine};

#[derive(Default)]
struct Registry {
    outputs: Vec<OutputLine>,
    pwms: Vec<PwmLine>,
}

/// Cloneable, thread-safe emergency stop and output registry.
#[derive(Clone, Default)]
pub struct EmergencyStop {
    latch: Arc<AtomicBool>,
    registry: Arc<Mutex<Registry>>,
}

impl std::fmt::Debug for EmergencyStop {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmergencyStop")
            .field("latched", &self.is_latched())
            .finish_non_exhaustive()
    }
}

impl EmergencyStop {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap and register a digital output. `safe_high` is its de-energized level.
    pub fn output(
        &self,
        pin: Box<dyn DigitalOutput + Send>,
        safe_high: bool,
        label: &str,
    ) -> OutputLine {
        let line = OutputLine::with_latch(pin, safe_high, label, Arc::clone(&self.latch));
        self.registry().outputs.push(line.clone());
        line
    }

    /// Wrap and register a PWM channel.
    pub fn pwm(&self, pwm: Box<dyn PwmOutput + Send>, label: &str) -> PwmLine {
        let line = PwmLine::with_latch(pwm, label, Arc::clone(&self.latch));
        self.registry().pwms.push(line.clone());
        line
    }

    fn registry(&self) -> std::sync::MutexGuard<'_, Registry> {
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Latch, then de-energize everything. Never fails; write errors are logged.
    pub fn stop_all(&self) {
        self.latch.store(true, Ordering::SeqCst);
        let failures = self.release_all();
        if failures == 0 {
            info!("emergency stop: all outputs safe");
        } else {
            warn!(failures, "emergency stop: some outputs did not acknowledge");
        }
    }

    /// Drive every registered output safe and zero every PWM channel without
    /// touching the latch. Returns how many writes failed.
    pub fn release_all(&self) -> usize {
        // Snapshot the handles so a slow line cannot hold the registry lock.
        let (outputs, pwms) = {
            let reg = self.registry();
            (reg.outputs.clone(), reg.pwms.clone())
        };
        let mut failures = 0;
        for line in &outputs {
            if let Err(e) = line.release() {
                warn!(line = line.label(), error = %e, "release failed");
                failures += 1;
            }
        }
        for pwm in &pwms {
            if let Err(e) = pwm.zero() {
                warn!(line = pwm.label(), error = %e, "pwm zero failed");
                failures += 1;
            }
        }
        failures
    }

    pub fn is_latched(&self) -> bool {
        self.latch.load(Ordering::SeqCst)
    }

    /// Clear the latch; called when a fresh sequence or capture starts.
    pub fn rearm(&self) {
        if self.latch.swap(false, Ordering::SeqCst) {
            info!("emergency stop re-armed");
        }
    }

    pub fn registered(&self) -> (usize, usize) {
        let reg = self.registry();
        (reg.outputs.len(), reg.pwms.len())
    }
}

/// Forces every output registered with the stop to its safe level on drop,
/// on success and on every error path alike.
#[must_use = "the guard releases outputs when dropped"]
pub struct SafeStateGuard {
    estop: EmergencyStop,
    scope: &'static str,
}

impl SafeStateGuard {
    pub fn new(estop: &EmergencyStop, scope: &'static str) -> Self {
        Self {
            estop: estop.clone(),
            scope,
        }
    }
}

impl Drop for SafeStateGuard {
    fn drop(&mut self) {
        let failures = self.estop.release_all();
        if failures > 0 {
            warn!(scope = self.scope, failures, "cleanup left outputs unacknowledged");
        } else {
            tracing::debug!(scope = self.scope, "outputs returned to safe state");
        }
    }
}
