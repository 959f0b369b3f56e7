//! Startup errors.
//!
//! Everything here is fatal: the proxy refuses to start rather than run
//! with a configuration it cannot honor.

use crate::config::ConfigError;
use crate::load_balancer::RegistryError;
use crate::net::ListenerError;

#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("backend registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("listener error: {0}")]
    Listener(#[from] ListenerError),

    #[error("metrics exporter error: {0}")]
    Metrics(#[from] metrics_exporter_prometheus::BuildError),

    #[error("logging init error: {0}")]
    Logging(#[from] tracing_subscriber::util::TryInitError),
}
