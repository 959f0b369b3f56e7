//! Passive health checking (failure detection).
//!
//! # Responsibilities
//! - Observe request outcomes reported by the dispatcher
//! - Track consecutive failures per backend
//! - Trip the breaker on threshold breach and answer availability queries
//!
//! # Design Decisions
//! - Connect errors, write errors, read errors and timeouts are failures
//! - Any completed response is a success, whatever its status code
//! - The read-modify-write of a failure runs under the backend's own lock

use tokio::time::Instant;
use crate::config::HealthPolicy;
use crate::health::state::{HealthState, Transition};
use crate::load_balancer::backend::Backend;
use crate::observability::metrics;

/// Circuit-breaker policy applied over the backend registry.
#[derive(Debug, Clone)]
pub struct HealthTracker {
    policy: HealthPolicy,
}

impl HealthTracker {
    pub fn new(policy: HealthPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &HealthPolicy {
        &self.policy
    }

    /// Report a request that reached the backend and got a response in time.
    pub fn record_success(&self, backend: &Backend) {
        let transition = backend.health().on_success();
        if transition == Transition::Recovered {
            tracing::info!(backend = %backend, "Backend recovered, failure count reset");
            metrics::record_backend_available(backend.address(), true);
        }
    }

    /// Report a failed forwarding attempt observed now.
    pub fn record_failure(&self, backend: &Backend) -> Transition {
        self.record_failure_at(backend, Instant::now())
    }

    /// Report a failed forwarding attempt observed at `now`.
    pub fn record_failure_at(&self, backend: &Backend, now: Instant) -> Transition {
        let (transition, failures) = {
            let mut record = backend.health();
            let transition = record.on_failure(now, &self.policy);
            (transition, record.consecutive_failures)
        };

        metrics::record_backend_failure(backend.address());
        match transition {
            Transition::Tripped { .. } => {
                tracing::warn!(
                    backend = %backend,
                    consecutive_failures = failures,
                    cooldown_ms = self.policy.cooldown.as_millis() as u64,
                    "Backend entering cooldown"
                );
                metrics::record_backend_available(backend.address(), false);
            }
            _ => {
                tracing::debug!(backend = %backend, consecutive_failures = failures, "Backend failure recorded");
            }
        }
        transition
    }

    /// True iff `backend` may be selected at `now`. Pure query.
    pub fn is_available(&self, backend: &Backend, now: Instant) -> bool {
        backend.health().is_available(now)
    }

    pub fn state(&self, backend: &Backend, now: Instant) -> HealthState {
        backend.state(now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn tracker(threshold: u32, cooldown_secs: u64) -> HealthTracker {
        HealthTracker::new(HealthPolicy {
            failure_threshold: threshold,
            cooldown: Duration::from_secs(cooldown_secs),
        })
    }

    #[test]
    fn excluded_for_exactly_the_cooldown() {
        let tracker = tracker(3, 5);
        let backend = Backend::new(0, "127.0.0.1", 8001);
        let t0 = Instant::now();

        tracker.record_failure_at(&backend, t0);
        tracker.record_failure_at(&backend, t0);
        assert!(tracker.is_available(&backend, t0));

        tracker.record_failure_at(&backend, t0);
        assert!(!tracker.is_available(&backend, t0));
        assert!(!tracker.is_available(&backend, t0 + Duration::from_millis(4_999)));
        assert!(tracker.is_available(&backend, t0 + Duration::from_secs(5)));
    }

    #[test]
    fn success_resets_failures() {
        let tracker = tracker(3, 5);
        let backend = Backend::new(0, "127.0.0.1", 8001);
        let t0 = Instant::now();

        tracker.record_failure_at(&backend, t0);
        tracker.record_failure_at(&backend, t0);
        tracker.record_success(&backend);
        assert_eq!(backend.consecutive_failures(), 0);

        // Two more failures don't trip
        tracker.record_failure_at(&backend, t0);
        tracker.record_failure_at(&backend, t0);
        assert!(tracker.is_available(&backend, t0));
    }

    #[test]
    fn success_clears_active_cooldown() {
        let tracker = tracker(1, 60);
        let backend = Backend::new(0, "127.0.0.1", 8001);
        let t0 = Instant::now();

        assert!(matches!(tracker.record_failure_at(&backend, t0), Transition::Tripped { .. }));
        assert_eq!(tracker.state(&backend, t0), HealthState::CoolingDown);

        tracker.record_success(&backend);
        assert_eq!(tracker.state(&backend, t0), HealthState::Healthy);
        assert_eq!(backend.unavailable_until(), None);
    }

    #[test]
    fn concurrent_failures_never_skip_the_trip() {
        let tracker = std::sync::Arc::new(tracker(2, 60));
        let backend = std::sync::Arc::new(Backend::new(0, "127.0.0.1", 8001));
        let t0 = Instant::now();

        let handles: Vec<_> = (0..2)
            .map(|_| {
                let tracker = tracker.clone();
                let backend = backend.clone();
                std::thread::spawn(move || tracker.record_failure_at(&backend, t0))
            })
            .collect();
        let tripped = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|t| matches!(t, Transition::Tripped { .. }))
            .count();

        assert_eq!(tripped, 1);
        assert_eq!(backend.consecutive_failures(), 2);
        assert!(!tracker.is_available(&backend, t0));
    }
}
