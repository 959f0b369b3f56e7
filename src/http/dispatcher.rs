//! Request dispatch.
//!
//! # Responsibilities
//! - Drive one client connection through read → select → forward → respond
//! - Report every backend outcome to the health tracker exactly once
//! - Turn every backend-facing error into a synthetic response
//!
//! # State Machine
//! ```text
//! AWAIT_CLIENT_REQUEST ──timeout/closed──▶ close (no response)
//!     ▼
//! SELECT_BACKEND ──none──▶ RESPOND_503
//!     ▼
//! CONNECT ─▶ FORWARD ─▶ AWAIT_RESPONSE ─▶ RESPOND_SUCCESS
//!    └──────────┴────────────┴──error/timeout──▶ RESPOND_504 + failure
//! ```
//!
//! # Design Decisions
//! - At most one forwarding attempt per request; retries belong to callers
//! - Any response read within budget is a success, whatever its status
//! - The client stream is owned here and shut down once on every path

use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::time::{timeout, Instant};
use crate::config::{ProxyConfig, TimeoutPolicy};
use crate::health::HealthTracker;
use crate::http::framing::MessageEnd;
use crate::http::request::{HttpRequestReader, RawRequest, ReadError, RequestReader};
use crate::http::response::{status_code, SyntheticResponse};
use crate::load_balancer::{Backend, BackendRegistry, LoadBalancer, RegistryError, RoundRobin};
use crate::resilience::timeouts::{self, BackendError};

/// Why a request did not get a backend response.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error(transparent)]
    Client(#[from] ReadError),

    #[error("no backend available")]
    NoBackendAvailable,

    #[error("backend {backend} failed: {source}")]
    Backend {
        backend: String,
        #[source]
        source: BackendError,
    },
}

/// Terminal state of one dispatched connection.
#[derive(Debug)]
pub enum DispatchOutcome {
    /// The backend response was relayed verbatim.
    Relayed {
        backend: String,
        status: Option<u16>,
        bytes: usize,
    },
    /// The proxy answered with a synthetic status.
    Synthetic {
        response: SyntheticResponse,
        error: DispatchError,
    },
    /// The connection was closed without any response.
    Dropped { error: DispatchError },
}

impl DispatchOutcome {
    /// Status the client received, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            DispatchOutcome::Relayed { status, .. } => *status,
            DispatchOutcome::Synthetic { response, .. } => Some(response.status()),
            DispatchOutcome::Dropped { .. } => None,
        }
    }

    /// Metric label.
    pub fn label(&self) -> &'static str {
        match self {
            DispatchOutcome::Relayed { .. } => "relayed",
            DispatchOutcome::Synthetic { response: SyntheticResponse::ServiceUnavailable, .. } => {
                "no_backend"
            }
            DispatchOutcome::Synthetic { response: SyntheticResponse::GatewayTimeout, .. } => {
                "backend_failure"
            }
            DispatchOutcome::Dropped { .. } => "client_abort",
        }
    }
}

/// Orchestrates selection, forwarding and health reporting.
#[derive(Debug)]
pub struct Dispatcher<R = HttpRequestReader> {
    registry: Arc<BackendRegistry>,
    balancer: Box<dyn LoadBalancer>,
    health: Arc<HealthTracker>,
    timeouts: TimeoutPolicy,
    reader: R,
    max_response_bytes: usize,
}

impl Dispatcher<HttpRequestReader> {
    /// Build a round-robin dispatcher from configuration.
    pub fn from_config(config: &ProxyConfig) -> Result<Self, RegistryError> {
        let registry = Arc::new(BackendRegistry::from_config(&config.backends)?);
        let health = Arc::new(HealthTracker::new(config.health.policy()));
        Ok(Self::new(
            registry,
            Box::new(RoundRobin::new()),
            health,
            config.timeouts.policy(),
            HttpRequestReader::new(config.limits.max_request_bytes),
            config.limits.max_response_bytes,
        ))
    }
}

impl<R: RequestReader> Dispatcher<R> {
    pub fn new(
        registry: Arc<BackendRegistry>,
        balancer: Box<dyn LoadBalancer>,
        health: Arc<HealthTracker>,
        timeouts: TimeoutPolicy,
        reader: R,
        max_response_bytes: usize,
    ) -> Self {
        Self {
            registry,
            balancer,
            health,
            timeouts,
            reader,
            max_response_bytes,
        }
    }

    pub fn registry(&self) -> &Arc<BackendRegistry> {
        &self.registry
    }

    pub fn health(&self) -> &Arc<HealthTracker> {
        &self.health
    }

    /// Ask the balancer for a backend available right now.
    pub fn select(&self) -> Option<Arc<Backend>> {
        self.balancer.next_server(&self.registry, &self.health, Instant::now())
    }

    /// Handle one client connection end to end, then close it.
    pub async fn handle<S>(&self, mut client: S) -> DispatchOutcome
    where
        S: AsyncRead + AsyncWrite + Unpin + Send,
    {
        let outcome = self.dispatch(&mut client).await;

        if let Err(e) = client.shutdown().await {
            tracing::debug!(error = %e, "Client shutdown failed");
        }
        drop(client);

        match &outcome {
            DispatchOutcome::Relayed { backend, status, bytes } => {
                tracing::info!(backend = %backend, status = ?status, bytes = bytes, "Response relayed");
            }
            DispatchOutcome::Synthetic { response, error } => {
                tracing::warn!(status = response.status(), error = %error, "Synthetic response sent");
            }
            DispatchOutcome::Dropped { error } => {
                tracing::debug!(error = %error, "Connection closed without response");
            }
        }
        outcome
    }

    async fn dispatch<S>(&self, client: &mut S) -> DispatchOutcome
    where
        S: AsyncRead + AsyncWrite + Unpin + Send,
    {
        let request = match self.reader.read_request(client, self.timeouts.client_read).await {
            Ok(request) => request,
            Err(e) => return DispatchOutcome::Dropped { error: e.into() },
        };

        if let Some(head) = request.head() {
            tracing::debug!(method = %head.method, path = %head.path, bytes = request.len(), "Request received");
        } else {
            tracing::debug!(bytes = request.len(), "Opaque request received");
        }

        let backend = match self.select() {
            Some(backend) => backend,
            None => {
                tracing::warn!(
                    backends = self.registry.len(),
                    statuses = ?self.registry.statuses(Instant::now()),
                    "No backend available"
                );
                return self.respond(client, SyntheticResponse::ServiceUnavailable, DispatchError::NoBackendAvailable).await;
            }
        };

        match self.forward(&backend, &request).await {
            Ok((response, end)) => {
                self.health.record_success(&backend);
                if end == MessageEnd::LimitReached {
                    tracing::warn!(backend = %backend, max_bytes = self.max_response_bytes, "Response reached size cap");
                }
                if let Err(e) = self.write_client(client, &response).await {
                    tracing::debug!(backend = %backend, error = %e, "Client went away before the response was written");
                }
                DispatchOutcome::Relayed {
                    backend: backend.address().to_string(),
                    status: status_code(&response),
                    bytes: response.len(),
                }
            }
            Err(source) => {
                self.health.record_failure(&backend);
                tracing::warn!(
                    backend = %backend,
                    stage = source.stage().as_str(),
                    timeout = source.is_timeout(),
                    error = %source,
                    "Backend failure"
                );
                let error = DispatchError::Backend {
                    backend: backend.address().to_string(),
                    source,
                };
                self.respond(client, SyntheticResponse::GatewayTimeout, error).await
            }
        }
    }

    /// Connect, write and read against one backend. No retries.
    async fn forward(
        &self,
        backend: &Backend,
        request: &RawRequest,
    ) -> Result<(bytes::Bytes, MessageEnd), BackendError> {
        let mut upstream = timeouts::connect(backend.host(), backend.port(), self.timeouts.backend_connect).await?;
        timeouts::forward(&mut upstream, request.as_bytes(), self.timeouts.backend_response).await?;

        let head_request = request.head().map(|h| h.is_head()).unwrap_or(false);
        let message = timeouts::read_response(
            &mut upstream,
            self.timeouts.backend_response,
            self.max_response_bytes,
            head_request,
        )
        .await?;
        Ok((message.bytes, message.end))
    }

    async fn respond<S>(&self, client: &mut S, response: SyntheticResponse, error: DispatchError) -> DispatchOutcome
    where
        S: AsyncWrite + Unpin + Send,
    {
        if let Err(e) = self.write_client(client, response.as_bytes()).await {
            tracing::debug!(status = response.status(), error = %e, "Failed to write synthetic response");
        }
        DispatchOutcome::Synthetic { response, error }
    }

    /// Client writes share the client-read budget so a stalled reader can't pin the task.
    async fn write_client<S>(&self, client: &mut S, bytes: &[u8]) -> std::io::Result<()>
    where
        S: AsyncWrite + Unpin + Send,
    {
        let write = async {
            client.write_all(bytes).await?;
            client.flush().await
        };
        match timeout(self.timeouts.client_read, write).await {
            Ok(result) => result,
            Err(_) => Err(std::io::Error::new(std::io::ErrorKind::TimedOut, "client write timed out")),
        }
    }
}
