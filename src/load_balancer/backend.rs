//! Backend abstraction.
//!
//! # Responsibilities
//! - Represent a single backend server (immutable host/port identity)
//! - Own the backend's mutable breaker record behind its own lock
//!
//! The lock is per backend so that outcomes reported for one backend never
//! serialize against another.

use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::time::Instant;
use crate::health::state::{HealthRecord, HealthState};

/// A single backend server.
#[derive(Debug)]
pub struct Backend {
    /// Position in the registry.
    id: usize,
    host: String,
    port: u16,
    /// Pre-formatted "host:port" for logs and metric labels.
    address: String,
    health: Mutex<HealthRecord>,
}

impl Backend {
    /// Create a new backend.
    pub fn new(id: usize, host: impl Into<String>, port: u16) -> Self {
        let host = host.into();
        let address = format!("{}:{}", host, port);
        Self {
            id,
            host,
            port,
            address,
            health: Mutex::new(HealthRecord::default()),
        }
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// "host:port".
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Lock the breaker record for an in-place update.
    ///
    /// A panic while the lock was held cannot leave the record half-written
    /// (every update is a plain field assignment), so poisoning is ignored.
    pub fn health(&self) -> MutexGuard<'_, HealthRecord> {
        self.health.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Copy of the current breaker record.
    pub fn snapshot(&self) -> HealthRecord {
        *self.health()
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.health().consecutive_failures
    }

    pub fn unavailable_until(&self) -> Option<Instant> {
        self.health().unavailable_until
    }

    pub fn state(&self, now: Instant) -> HealthState {
        self.health().state(now)
    }
}

impl std::fmt::Display for Backend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.address)
    }
}
