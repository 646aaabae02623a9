//! Common time and rounding helpers for packer_core.

use std::time::{Duration, Instant};

use packer_traits::{Clock, DigitalInput};

/// Round to one decimal place, halves away from zero.
#[inline]
pub fn round1(x: f64) -> f64 {
    (x * 10.0).round() / 10.0
}

/// Poll `input` until it reads `level` or `timeout` elapses, measured from the
/// call. Returns the instant the level was observed, or `None` on timeout.
///
/// `poll` is slept between reads; it must be non-zero when `clock` is virtual,
/// otherwise time never advances.
pub fn wait_for_level(
    input: &mut (dyn DigitalInput + Send),
    level: bool,
    timeout: Duration,
    poll: Duration,
    clock: &dyn Clock,
) -> Result<Option<Instant>, Box<dyn std::error::Error + Send + Sync>> {
    let start = clock.now();
    loop {
        if input.is_high()? == level {
            return Ok(Some(clock.now()));
        }
        if clock.now().saturating_duration_since(start) >= timeout {
            return Ok(None);
        }
        clock.sleep(poll);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use packer_traits::ManualClock;

    struct Low;
    impl DigitalInput for Low {
        fn is_high(&mut self) -> Result<bool, Box<dyn std::error::Error + Send + Sync>> {
            Ok(false)
        }
    }

    #[test]
    fn round1_matches_one_decimal() {
        assert_eq!(round1(11.88), 11.9);
        assert_eq!(round1(-0.25), -0.3);
        assert_eq!(round1(8.0), 8.0);
    }

    #[test]
    fn wait_times_out_on_virtual_clock() {
        let clock = ManualClock::new();
        let got = wait_for_level(
            &mut Low,
            true,
            Duration::from_millis(5),
            Duration::from_micros(10),
            &clock,
        )
        .unwrap();
        assert!(got.is_none());
        assert!(clock.elapsed() >= Duration::from_millis(5));
        assert!(clock.elapsed() < Duration::from_millis(6));
    }
}
