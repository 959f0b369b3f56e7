//! Backend health state machine.
//!
//! # States
//! - Healthy: backend receives traffic
//! - CoolingDown: backend excluded from load balancing until its deadline
//!
//! # State Transitions
//! ```text
//! Healthy → CoolingDown: consecutive_failures >= failure_threshold
//! CoolingDown → Healthy: deadline passes, or any success
//! ```
//!
//! # Design Decisions
//! - A failure recorded while cooling down bumps the counter only; the
//!   deadline is never pushed out, so a blackout lasts at most one cooldown
//! - Crossing the deadline does not reset the counter. The next request is a
//!   full-weight probe: one more failure re-trips the breaker immediately
//! - Only a success clears the counter and the deadline

use tokio::time::Instant;
use crate::config::HealthPolicy;

/// Observable availability of a backend at a point in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthState {
    Healthy,
    CoolingDown,
}

impl HealthState {
    pub fn as_str(&self) -> &'static str {
        match self {
            HealthState::Healthy => "healthy",
            HealthState::CoolingDown => "cooling_down",
        }
    }
}

impl std::fmt::Display for HealthState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a recorded outcome did to the breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Counter changed (or not) without crossing a state boundary.
    Unchanged,
    /// The backend entered cooldown until the given instant.
    Tripped { until: Instant },
    /// A success cleared a breaker that had been tripped.
    Recovered,
}

/// Mutable per-backend breaker fields.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HealthRecord {
    /// Failures since the last success.
    pub consecutive_failures: u32,
    /// Set when the breaker last tripped.
    pub unavailable_until: Option<Instant>,
}

impl HealthRecord {
    /// True iff the backend may be selected at `now`.
    pub fn is_available(&self, now: Instant) -> bool {
        match self.unavailable_until {
            None => true,
            Some(until) => now >= until,
        }
    }

    pub fn state(&self, now: Instant) -> HealthState {
        if self.is_available(now) {
            HealthState::Healthy
        } else {
            HealthState::CoolingDown
        }
    }

    /// Apply a success: counter and deadline are both cleared.
    pub fn on_success(&mut self) -> Transition {
        let was_tripped = self.unavailable_until.is_some();
        self.consecutive_failures = 0;
        self.unavailable_until = None;
        if was_tripped {
            Transition::Recovered
        } else {
            Transition::Unchanged
        }
    }

    /// Apply a failure observed at `now`.
    ///
    /// Increment, threshold comparison and deadline update happen on the same
    /// `&mut self`, so callers holding the record's lock see them as one step.
    pub fn on_failure(&mut self, now: Instant, policy: &HealthPolicy) -> Transition {
        let cooling_down = !self.is_available(now);
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);

        if cooling_down || self.consecutive_failures < policy.failure_threshold {
            return Transition::Unchanged;
        }

        let until = now + policy.cooldown;
        self.unavailable_until = Some(until);
        Transition::Tripped { until }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn policy() -> HealthPolicy {
        HealthPolicy {
            failure_threshold: 2,
            cooldown: Duration::from_secs(5),
        }
    }

    #[test]
    fn trips_at_threshold() {
        let now = Instant::now();
        let mut record = HealthRecord::default();

        assert_eq!(record.on_failure(now, &policy()), Transition::Unchanged);
        assert!(record.is_available(now));

        let until = now + Duration::from_secs(5);
        assert_eq!(record.on_failure(now, &policy()), Transition::Tripped { until });
        assert_eq!(record.state(now), HealthState::CoolingDown);
        assert_eq!(record.state(until), HealthState::Healthy);
    }

    #[test]
    fn failure_during_cooldown_keeps_deadline() {
        let now = Instant::now();
        let mut record = HealthRecord::default();
        record.on_failure(now, &policy());
        record.on_failure(now, &policy());
        let deadline = record.unavailable_until;

        let later = now + Duration::from_secs(3);
        assert_eq!(record.on_failure(later, &policy()), Transition::Unchanged);
        assert_eq!(record.consecutive_failures, 3);
        assert_eq!(record.unavailable_until, deadline);
    }

    #[test]
    fn failure_after_expiry_retrips_immediately() {
        let now = Instant::now();
        let mut record = HealthRecord::default();
        record.on_failure(now, &policy());
        record.on_failure(now, &policy());

        let expired = now + Duration::from_secs(6);
        assert!(record.is_available(expired));
        assert_eq!(record.consecutive_failures, 2);

        let until = expired + Duration::from_secs(5);
        assert_eq!(record.on_failure(expired, &policy()), Transition::Tripped { until });
        assert_eq!(record.consecutive_failures, 3);
    }

    #[test]
    fn success_clears_everything() {
        let now = Instant::now();
        let mut record = HealthRecord::default();
        record.on_failure(now, &policy());
        record.on_failure(now, &policy());

        assert_eq!(record.on_success(), Transition::Recovered);
        assert_eq!(record, HealthRecord::default());
        assert_eq!(record.on_success(), Transition::Unchanged);
        assert_eq!(record, HealthRecord::default());
    }
}
