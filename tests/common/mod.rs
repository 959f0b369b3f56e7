//! Shared utilities for integration testing: mock backends and a test proxy.

#![allow(dead_code)]

use std::future::Future;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use flowgate::config::{BackendConfig, ProxyConfig};
use flowgate::health::HealthTracker;
use flowgate::lifecycle::Shutdown;
use flowgate::load_balancer::BackendRegistry;
use flowgate::net::Listener;
use flowgate::ProxyServer;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

/// A mock backend bound to an ephemeral port.
pub struct MockBackend {
    pub addr: SocketAddr,
    accepted: Arc<AtomicUsize>,
}

impl MockBackend {
    /// Connections accepted so far.
    pub fn accepted(&self) -> usize {
        self.accepted.load(Ordering::SeqCst)
    }

    pub fn config(&self) -> BackendConfig {
        BackendConfig::new("127.0.0.1", self.addr.port())
    }
}

/// What a programmable backend does with one request.
pub enum Reply {
    Status(u16, String),
    /// Read the request, then close without writing anything.
    Close,
}

async fn read_head(socket: &mut TcpStream) {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 1024];
    while !buf.windows(4).any(|w| w == b"\r\n\r\n") {
        match socket.read(&mut chunk).await {
            Ok(0) | Err(_) => return,
            Ok(n) => buf.extend_from_slice(&chunk[..n]),
        }
    }
}

fn status_text(status: u16) -> &'static str {
    match status {
        200 => "200 OK",
        404 => "404 Not Found",
        500 => "500 Internal Server Error",
        502 => "502 Bad Gateway",
        503 => "503 Service Unavailable",
        _ => "200 OK",
    }
}

/// Start a programmable mock backend.
pub async fn start_programmable_backend<F, Fut>(f: F) -> MockBackend
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Reply> + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let accepted = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&accepted);
    let f = Arc::new(f);

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            counter.fetch_add(1, Ordering::SeqCst);
            let f = Arc::clone(&f);
            tokio::spawn(async move {
                read_head(&mut socket).await;
                match f().await {
                    Reply::Status(status, body) => {
                        let response = format!(
                            "HTTP/1.1 {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                            status_text(status),
                            body.len(),
                            body
                        );
                        let _ = socket.write_all(response.as_bytes()).await;
                        let _ = socket.shutdown().await;
                    }
                    Reply::Close => {
                        let _ = socket.shutdown().await;
                    }
                }
            });
        }
    });

    MockBackend { addr, accepted }
}

/// Start a mock backend that always answers 200 with `body`.
pub async fn start_mock_backend(body: &'static str) -> MockBackend {
    start_programmable_backend(move || async move { Reply::Status(200, body.to_string()) }).await
}

/// Start a backend that accepts and reads but never responds.
pub async fn start_silent_backend() -> MockBackend {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let accepted = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&accepted);

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            counter.fetch_add(1, Ordering::SeqCst);
            tokio::spawn(async move {
                read_head(&mut socket).await;
                tokio::time::sleep(Duration::from_secs(60)).await;
                drop(socket);
            });
        }
    });

    MockBackend { addr, accepted }
}

/// Config with short timeouts suitable for tests.
pub fn test_config(backends: Vec<BackendConfig>) -> ProxyConfig {
    let mut config = ProxyConfig::default();
    config.backends = backends;
    config.listener.bind_address = "127.0.0.1:0".into();
    config.timeouts.client_read_ms = 1000;
    config.timeouts.backend_connect_ms = 500;
    config.timeouts.backend_response_ms = 300;
    config.shutdown.drain_timeout_ms = 1000;
    config
}

/// A running proxy plus handles into its shared state.
pub struct TestProxy {
    pub addr: SocketAddr,
    pub registry: Arc<BackendRegistry>,
    pub health: Arc<HealthTracker>,
    pub shutdown: Shutdown,
}

pub async fn start_proxy(config: &ProxyConfig) -> TestProxy {
    let server = ProxyServer::new(config).unwrap();
    let registry = Arc::clone(server.registry());
    let health = Arc::clone(server.health());

    let listener = Listener::bind(&config.listener).await.unwrap();
    let addr = listener.local_addr().unwrap();

    let shutdown = Shutdown::new();
    let receiver = shutdown.subscribe();
    tokio::spawn(server.run(listener, receiver));

    TestProxy { addr, registry, health, shutdown }
}

/// Send one raw GET through `addr` and read until the proxy closes.
/// Returns the status code (if any response arrived) and the body.
pub async fn send_request(addr: SocketAddr, path: &str) -> (Option<u16>, String) {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    let request = format!("GET {path} HTTP/1.1\r\nHost: test\r\nConnection: close\r\n\r\n");
    stream.write_all(request.as_bytes()).await.unwrap();

    let mut raw = Vec::new();
    tokio::time::timeout(Duration::from_secs(5), stream.read_to_end(&mut raw))
        .await
        .expect("proxy did not close the connection")
        .unwrap();

    let text = String::from_utf8_lossy(&raw).into_owned();
    let status = text
        .split_whitespace()
        .nth(1)
        .and_then(|code| code.parse().ok());
    let body = text
        .split_once("\r\n\r\n")
        .map(|(_, body)| body.to_string())
        .unwrap_or_default();
    (status, body)
}
