//! Reference clock and tick quantization.
//!
//! The first timestamp the engine sees, from any input source, becomes the
//! reference epoch. All scheduling happens in milliseconds relative to that
//! epoch, quantized to ticks. Elapsed time is measured against a monotonic
//! [`Instant`] captured alongside the epoch, so wall-clock adjustments after
//! start-up cannot move the playback cursor.

use std::sync::OnceLock;
use std::time::Instant;

use crate::{Error, Result};

/// Integer tick index. Timestamps earlier than the epoch quantize to
/// negative ticks; the scheduler treats those as already passed.
pub type Tick = i64;

/// Epoch anchor: the wall-clock ms that became tick zero, and the monotonic
/// instant captured at the same moment.
#[derive(Debug, Clone, Copy)]
struct Anchor {
    wall_ms: u64,
    instant: Instant,
}

/// Monotonic reference clock with tick quantization.
#[derive(Debug)]
pub struct Clock {
    tick_ms: u32,
    anchor: OnceLock<Anchor>,
}

impl Clock {
    /// Create a cold clock. No ticks are defined until
    /// [`establish_reference`](Self::establish_reference) is called.
    pub fn new(tick_ms: u32) -> Self {
        Self {
            tick_ms,
            anchor: OnceLock::new(),
        }
    }

    /// Set the epoch from a wall-clock timestamp in milliseconds.
    ///
    /// Idempotent: the first caller wins and later calls are no-ops.
    /// Returns whether this call established the epoch.
    pub fn establish_reference(&self, wall_ms: u64) -> bool {
        self.anchor
            .set(Anchor {
                wall_ms,
                instant: Instant::now(),
            })
            .is_ok()
    }

    /// Whether the epoch has been established.
    pub fn established(&self) -> bool {
        self.anchor.get().is_some()
    }

    /// Convert a wall-clock timestamp to milliseconds relative to the epoch.
    ///
    /// Negative for timestamps that predate the epoch (out-of-order input).
    pub fn relative_ms(&self, wall_ms: u64) -> Result<i64> {
        let anchor = self.anchor.get().ok_or(Error::ClockNotEstablished)?;
        Ok(wall_ms as i64 - anchor.wall_ms as i64)
    }

    /// Milliseconds elapsed since the epoch, from the monotonic counter.
    pub fn elapsed_ms(&self) -> Result<i64> {
        let anchor = self.anchor.get().ok_or(Error::ClockNotEstablished)?;
        Ok(anchor.instant.elapsed().as_millis() as i64)
    }

    /// Quantize relative milliseconds to the nearest tick.
    pub fn quantize(&self, ms: i64) -> Tick {
        (ms as f64 / self.tick_ms as f64).round() as Tick
    }

    /// The current tick, per the monotonic counter.
    pub fn current_tick(&self) -> Result<Tick> {
        Ok(self.quantize(self.elapsed_ms()?))
    }

    /// The current tick, or `None` while the clock is cold.
    pub fn try_current_tick(&self) -> Option<Tick> {
        self.current_tick().ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_caller_wins() {
        let clock = Clock::new(16);
        assert!(!clock.established());
        assert!(clock.establish_reference(1_000));
        assert!(!clock.establish_reference(9_999));
        assert_eq!(clock.relative_ms(1_500).unwrap(), 500);
    }

    #[test]
    fn test_cold_clock_is_retryable() {
        let clock = Clock::new(16);
        assert!(matches!(
            clock.relative_ms(0),
            Err(Error::ClockNotEstablished)
        ));
        assert!(matches!(clock.elapsed_ms(), Err(Error::ClockNotEstablished)));
        assert!(clock.try_current_tick().is_none());
    }

    #[test]
    fn test_quantize_rounds_to_nearest() {
        let clock = Clock::new(16);
        assert_eq!(clock.quantize(0), 0);
        assert_eq!(clock.quantize(7), 0);
        assert_eq!(clock.quantize(8), 1);
        assert_eq!(clock.quantize(24), 2);
        assert_eq!(clock.quantize(-20), -1);
    }

    #[test]
    fn test_quantize_is_idempotent() {
        let clock = Clock::new(16);
        for ms in [0_i64, 3, 8, 15, 16, 100, 993, 12_345] {
            let tick = clock.quantize(ms);
            assert_eq!(clock.quantize(tick * 16), tick);
        }
    }

    #[test]
    fn test_hits_within_half_resolution_share_a_tick() {
        let clock = Clock::new(16);
        assert_eq!(clock.quantize(96), clock.quantize(103));
        assert_ne!(clock.quantize(96), clock.quantize(106));
    }

    #[test]
    fn test_negative_relative_for_early_timestamps() {
        let clock = Clock::new(16);
        clock.establish_reference(5_000);
        assert_eq!(clock.relative_ms(4_900).unwrap(), -100);
    }
}
