//! Proxy server setup.
//!
//! # Responsibilities
//! - Build the registry, health tracker and dispatcher from configuration
//! - Accept client connections and spawn one task per connection
//! - Stop accepting on shutdown and drain in-flight connections
//!
//! # Design Decisions
//! - Every connection task holds a listener permit and a tracker guard, both
//!   released when the task ends however it ends
//! - A dispatch never fails the accept loop; only listener errors do

use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::Instrument;

use crate::config::{validate_config, ConfigError, ProxyConfig};
use crate::error::StartupError;
use crate::health::HealthTracker;
use crate::http::dispatcher::Dispatcher;
use crate::lifecycle::ShutdownSignal;
use crate::load_balancer::BackendRegistry;
use crate::net::{ConnectionTracker, Listener, ListenerError};
use crate::observability::metrics;

/// Reverse proxy server.
#[derive(Debug)]
pub struct ProxyServer {
    dispatcher: Arc<Dispatcher>,
    connections: ConnectionTracker,
    drain_timeout: Duration,
}

impl ProxyServer {
    /// Validate `config` and build every subsystem. Fails fast on bad config.
    pub fn new(config: &ProxyConfig) -> Result<Self, StartupError> {
        validate_config(config).map_err(|errors| StartupError::Config(ConfigError::Validation(errors)))?;

        let dispatcher = Dispatcher::from_config(config)?;
        for backend in dispatcher.registry().backends() {
            metrics::record_backend_available(backend.address(), true);
        }

        tracing::info!(
            backends = dispatcher.registry().len(),
            failure_threshold = config.health.failure_threshold,
            cooldown_ms = config.health.cooldown_ms,
            client_read_ms = config.timeouts.client_read_ms,
            backend_connect_ms = config.timeouts.backend_connect_ms,
            backend_response_ms = config.timeouts.backend_response_ms,
            "Proxy configured"
        );

        Ok(Self {
            dispatcher: Arc::new(dispatcher),
            connections: ConnectionTracker::new(),
            drain_timeout: config.shutdown.drain_timeout(),
        })
    }

    pub fn registry(&self) -> &Arc<BackendRegistry> {
        self.dispatcher.registry()
    }

    pub fn health(&self) -> &Arc<HealthTracker> {
        self.dispatcher.health()
    }

    pub fn connections(&self) -> &ConnectionTracker {
        &self.connections
    }

    /// Accept connections until `shutdown` fires, then drain.
    pub async fn run(
        self,
        listener: Listener,
        mut shutdown: ShutdownSignal,
    ) -> Result<(), ListenerError> {
        let addr = listener.local_addr().map_err(ListenerError::Bind)?;
        tracing::info!(address = %addr, "Proxy accepting connections");

        loop {
            let accepted = tokio::select! {
                accepted = listener.accept() => accepted,
                _ = shutdown.recv() => {
                    tracing::info!("Shutdown signal received, no longer accepting");
                    break;
                }
            };

            let (stream, peer, permit) = match accepted {
                Ok(conn) => conn,
                Err(ListenerError::Accept(e)) => {
                    // Transient (e.g. EMFILE); keep serving.
                    tracing::warn!(error = %e, "Accept failed");
                    tokio::time::sleep(Duration::from_millis(10)).await;
                    continue;
                }
                Err(e) => return Err(e),
            };

            let guard = self.connections.track();
            let dispatcher = Arc::clone(&self.dispatcher);
            let span = tracing::info_span!("connection", id = %guard.id(), peer = %peer);

            tokio::spawn(
                async move {
                    let start = Instant::now();
                    let outcome = dispatcher.handle(stream).await;
                    metrics::record_request(outcome.label(), start);
                    tracing::debug!(
                        outcome = outcome.label(),
                        status = ?outcome.status(),
                        elapsed_ms = start.elapsed().as_millis() as u64,
                        "Connection finished"
                    );
                    drop(permit);
                    drop(guard);
                }
                .instrument(span),
            );
        }

        let in_flight = self.connections.active_count();
        if in_flight > 0 {
            tracing::info!(connections = in_flight, "Draining in-flight connections");
            if tokio::time::timeout(self.drain_timeout, self.connections.wait_idle()).await.is_err() {
                tracing::warn!(
                    remaining = self.connections.active_count(),
                    "Drain timeout elapsed, abandoning connections"
                );
            }
        }

        tracing::info!("Proxy stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BackendConfig;
    use crate::lifecycle::Shutdown;

    #[test]
    fn empty_pool_fails_at_startup() {
        let err = ProxyServer::new(&ProxyConfig::default()).unwrap_err();
        assert!(matches!(err, StartupError::Config(ConfigError::Validation(_))));
    }

    #[tokio::test]
    async fn stops_on_shutdown() {
        let mut config = ProxyConfig::default();
        config.backends.push(BackendConfig::new("127.0.0.1", 9));
        config.listener.bind_address = "127.0.0.1:0".into();

        let server = ProxyServer::new(&config).unwrap();
        let listener = Listener::bind(&config.listener).await.unwrap();
        let shutdown = Shutdown::new();

        let handle = tokio::spawn(server.run(listener, shutdown.subscribe()));
        shutdown.trigger();

        let result = tokio::time::timeout(Duration::from_secs(2), handle).await.unwrap().unwrap();
        assert!(result.is_ok());
    }
}
