//! Backend registry.
//!
//! # Responsibilities
//! - Build the ordered backend list once from configuration
//! - Hand out shared references for selection and health reporting
//! - Produce status snapshots for logging
//!
//! The registry itself holds no lock; each [`Backend`] guards its own
//! breaker record.

use std::sync::Arc;
use tokio::time::Instant;
use crate::config::BackendConfig;
use crate::health::state::HealthState;
use crate::load_balancer::backend::Backend;

/// Error building the registry.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("backend pool is empty")]
    Empty,
}

/// Point-in-time view of one backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendStatus {
    pub id: usize,
    pub address: String,
    pub state: HealthState,
    pub consecutive_failures: u32,
}

/// Ordered, fixed-size set of backends.
#[derive(Debug)]
pub struct BackendRegistry {
    backends: Vec<Arc<Backend>>,
}

impl BackendRegistry {
    /// Create the registry from configuration, preserving order.
    pub fn from_config(configs: &[BackendConfig]) -> Result<Self, RegistryError> {
        if configs.is_empty() {
            return Err(RegistryError::Empty);
        }

        let backends = configs
            .iter()
            .enumerate()
            .map(|(id, config)| Arc::new(Backend::new(id, config.host.clone(), config.port)))
            .collect::<Vec<_>>();

        for backend in &backends {
            tracing::debug!(id = backend.id(), backend = %backend, "Backend registered");
        }

        Ok(Self { backends })
    }

    pub fn backends(&self) -> &[Arc<Backend>] {
        &self.backends
    }

    pub fn get(&self, id: usize) -> Option<&Arc<Backend>> {
        self.backends.get(id)
    }

    pub fn len(&self) -> usize {
        self.backends.len()
    }

    /// Always false for a constructed registry; kept for API symmetry.
    pub fn is_empty(&self) -> bool {
        self.backends.is_empty()
    }

    /// Status of every backend at `now`.
    pub fn statuses(&self, now: Instant) -> Vec<BackendStatus> {
        self.backends
            .iter()
            .map(|b| {
                let record = b.snapshot();
                BackendStatus {
                    id: b.id(),
                    address: b.address().to_string(),
                    state: record.state(now),
                    consecutive_failures: record.consecutive_failures,
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_config_fails_fast() {
        assert!(matches!(BackendRegistry::from_config(&[]), Err(RegistryError::Empty)));
    }

    #[test]
    fn preserves_order_and_ids() {
        let registry = BackendRegistry::from_config(&[
            BackendConfig::new("a", 1),
            BackendConfig::new("b", 2),
            BackendConfig::new("c", 3),
        ])
        .unwrap();

        assert_eq!(registry.len(), 3);
        let addrs: Vec<_> = registry.backends().iter().map(|b| b.address().to_string()).collect();
        assert_eq!(addrs, vec!["a:1", "b:2", "c:3"]);
        assert_eq!(registry.get(2).map(|b| b.id()), Some(2));
        assert!(registry.get(3).is_none());
    }

    #[test]
    fn statuses_reflect_records() {
        let registry = BackendRegistry::from_config(&[BackendConfig::new("a", 1)]).unwrap();
        let now = Instant::now();
        {
            let mut record = registry.backends()[0].health();
            record.consecutive_failures = 2;
            record.unavailable_until = Some(now + std::time::Duration::from_secs(1));
        }

        let statuses = registry.statuses(now);
        assert_eq!(statuses[0].state, HealthState::CoolingDown);
        assert_eq!(statuses[0].consecutive_failures, 2);
    }
}
