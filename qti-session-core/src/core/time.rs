// qti-session-core/src/core/time.rs
// ============================================================================
// Module: Time Observation
// Description: Caller-supplied wall-clock samples driving duration accrual.
// Purpose: Keep the engine itself free of any internal clock read; every
//          instant used anywhere in a session traces back to a call here.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! The engine never reads wall-clock time directly; hosts must supply
//! observations via [`TestSessionDriver::set_time`](crate::driver::TestSessionDriver::set_time).
//! An [`Observation`] is a monotonic UTC instant expressed as milliseconds
//! since the Unix epoch, which keeps replay and round-trip tests fully
//! deterministic given a fixed sequence of calls.

use serde::Deserialize;
use serde::Serialize;

/// A single wall-clock sample supplied by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Observation(i64);

impl Observation {
    /// Builds an observation from milliseconds since the Unix epoch.
    #[must_use]
    pub const fn from_unix_millis(millis: i64) -> Self {
        Self(millis)
    }

    /// Returns the observation as milliseconds since the Unix epoch.
    #[must_use]
    pub const fn as_unix_millis(self) -> i64 {
        self.0
    }

    /// Returns the absolute elapsed time between two observations, in
    /// seconds, irrespective of which one is later.
    #[must_use]
    pub fn elapsed_seconds_since(self, earlier: Self) -> f64 {
        let delta_millis = (self.0 - earlier.0).abs();
        delta_millis as f64 / 1000.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn elapsed_is_absolute_and_additive() {
        let t0 = Observation::from_unix_millis(0);
        let t1 = Observation::from_unix_millis(1_500);
        let t2 = Observation::from_unix_millis(4_000);
        let total = t2.elapsed_seconds_since(t0);
        let chunked = t1.elapsed_seconds_since(t0) + t2.elapsed_seconds_since(t1);
        assert!((total - chunked).abs() < f64::EPSILON);
    }

    #[test]
    fn elapsed_ignores_direction() {
        let earlier = Observation::from_unix_millis(1_000);
        let later = Observation::from_unix_millis(3_000);
        assert_eq!(later.elapsed_seconds_since(earlier), earlier.elapsed_seconds_since(later));
    }
}
