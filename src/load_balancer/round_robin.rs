//! Round-robin load balancing strategy.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::time::Instant;
use crate::health::HealthTracker;
use crate::load_balancer::{backend::Backend, pool::BackendRegistry, LoadBalancer};

/// Round-robin selector restricted to available backends.
///
/// The cursor holds the index after the last backend returned. It is only
/// ever stored as `(index + 1) % len`, so concurrent callers may duplicate
/// or skip a position but never push it out of range.
#[derive(Debug, Default)]
pub struct RoundRobin {
    cursor: AtomicUsize,
}

impl RoundRobin {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current cursor position.
    pub fn cursor(&self) -> usize {
        self.cursor.load(Ordering::Relaxed)
    }
}

impl LoadBalancer for RoundRobin {
    fn next_server(
        &self,
        registry: &BackendRegistry,
        health: &HealthTracker,
        now: Instant,
    ) -> Option<Arc<Backend>> {
        let backends = registry.backends();
        let len = backends.len();
        if len == 0 {
            return None;
        }

        let start = self.cursor.load(Ordering::Relaxed) % len;
        for offset in 0..len {
            let index = (start + offset) % len;
            let backend = &backends[index];
            if health.is_available(backend, now) {
                self.cursor.store((index + 1) % len, Ordering::Relaxed);
                return Some(backend.clone());
            }
        }

        // Full scan found nothing; the cursor stays where it was.
        None
    }
}
