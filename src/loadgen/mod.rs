//! Load generator for exercising a running proxy.
//!
//! # Responsibilities
//! - Send N GET requests with at most C in flight
//! - Retry transport errors and 5xx responses with exponential backoff
//! - Collect one result row per logical request, in request order
//! - Write results as JSON or CSV
//!
//! Retries live here, on the client side. The proxy itself never retries.

use std::io::Write;
use std::sync::Arc;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use serde::Serialize;
use tokio::sync::Semaphore;

use crate::resilience::backoff::calculate_backoff;

pub const TRACE_HEADER: &str = "X-Trace-Id";

#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("concurrency must be at least 1")]
    ZeroConcurrency,

    #[error("worker task failed: {0}")]
    Join(#[from] tokio::task::JoinError),

    #[error("failed to write results: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to encode results: {0}")]
    Json(#[from] serde_json::Error),
}

/// Parameters for one load run.
#[derive(Debug, Clone)]
pub struct LoadConfig {
    pub url: String,
    pub requests: usize,
    pub concurrency: usize,
    pub max_retries: u32,
    pub retry_backoff_ms: u64,
    pub max_backoff_ms: u64,
    /// Generate an `X-Trace-Id` per attempt instead of relying on the server.
    pub client_trace: bool,
}

impl Default for LoadConfig {
    fn default() -> Self {
        Self {
            url: "http://127.0.0.1:8080/".to_string(),
            requests: 100,
            concurrency: 10,
            max_retries: 0,
            retry_backoff_ms: 100,
            max_backoff_ms: 10_000,
            client_trace: false,
        }
    }
}

/// Outcome of one logical request, after retries.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RequestResult {
    pub request_index: usize,
    pub trace_id: Option<String>,
    pub status_code: Option<u16>,
    /// Start of the last attempt.
    pub start_unix_ms: u64,
    /// Latency of the last attempt.
    pub latency_ms: f64,
    pub retries: u32,
    /// Empty on success.
    pub error: String,
}

impl RequestResult {
    pub fn is_success(&self) -> bool {
        self.error.is_empty()
    }
}

/// Output encoding for results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    #[default]
    Json,
    Csv,
}

/// Run the whole load and return results sorted by `request_index`.
pub async fn run_load(client: &reqwest::Client, config: &LoadConfig) -> Result<Vec<RequestResult>, LoadError> {
    if config.concurrency == 0 {
        return Err(LoadError::ZeroConcurrency);
    }

    let semaphore = Arc::new(Semaphore::new(config.concurrency));
    let mut handles = Vec::with_capacity(config.requests);

    for request_index in 0..config.requests {
        let semaphore = Arc::clone(&semaphore);
        let client = client.clone();
        let config = config.clone();
        handles.push(tokio::spawn(async move {
            // The semaphore is never closed.
            let _permit = semaphore.acquire_owned().await.ok();
            perform_request(&client, &config, request_index).await
        }));
    }

    let mut results = Vec::with_capacity(handles.len());
    for handle in handles {
        results.push(handle.await?);
    }
    results.sort_by_key(|r| r.request_index);

    let failed = results.iter().filter(|r| !r.is_success()).count();
    tracing::info!(requests = results.len(), failed, "Load run finished");
    Ok(results)
}

/// One logical request: attempts until a non-5xx response or retries run out.
pub async fn perform_request(client: &reqwest::Client, config: &LoadConfig, request_index: usize) -> RequestResult {
    let mut retries = 0;

    loop {
        let start_unix_ms = unix_millis();
        let start = Instant::now();
        let client_trace_id = config.client_trace.then(|| uuid::Uuid::new_v4().simple().to_string());

        let mut request = client.get(&config.url);
        if let Some(id) = &client_trace_id {
            request = request.header(TRACE_HEADER, id);
        }

        let (status_code, trace_id, error) = match request.send().await {
            Ok(response) => {
                let status = response.status().as_u16();
                let server_trace = response
                    .headers()
                    .get(TRACE_HEADER)
                    .and_then(|v| v.to_str().ok())
                    .map(str::to_string);
                let body = response.bytes().await;
                let trace_id = client_trace_id.or(server_trace);
                match body {
                    Err(e) => (Some(status), trace_id, e.to_string()),
                    Ok(_) if status >= 500 => (Some(status), trace_id, format!("http_{status}")),
                    Ok(_) => (Some(status), trace_id, String::new()),
                }
            }
            Err(e) => (None, client_trace_id, e.to_string()),
        };
        let latency_ms = start.elapsed().as_secs_f64() * 1000.0;

        if error.is_empty() || retries >= config.max_retries {
            return RequestResult {
                request_index,
                trace_id,
                status_code,
                start_unix_ms,
                latency_ms,
                retries,
                error,
            };
        }

        retries += 1;
        let delay = calculate_backoff(retries, config.retry_backoff_ms, config.max_backoff_ms);
        tracing::debug!(request_index, retries, delay_ms = delay.as_millis() as u64, %error, "Retrying");
        tokio::time::sleep(delay).await;
    }
}

pub fn write_results<W: Write>(results: &[RequestResult], format: OutputFormat, out: W) -> Result<(), LoadError> {
    match format {
        OutputFormat::Json => write_json(results, out),
        OutputFormat::Csv => write_csv(results, out),
    }
}

pub fn write_json<W: Write>(results: &[RequestResult], mut out: W) -> Result<(), LoadError> {
    serde_json::to_writer_pretty(&mut out, results)?;
    out.write_all(b"\n")?;
    Ok(())
}

/// Header row plus one row per result. An empty slice writes nothing.
pub fn write_csv<W: Write>(results: &[RequestResult], mut out: W) -> Result<(), LoadError> {
    if results.is_empty() {
        return Ok(());
    }

    writeln!(out, "request_index,trace_id,status_code,start_unix_ms,latency_ms,retries,error")?;
    for r in results {
        writeln!(
            out,
            "{},{},{},{},{:.3},{},{}",
            r.request_index,
            csv_field(r.trace_id.as_deref().unwrap_or("")),
            r.status_code.map(|s| s.to_string()).unwrap_or_default(),
            r.start_unix_ms,
            r.latency_ms,
            r.retries,
            csv_field(&r.error),
        )?;
    }
    Ok(())
}

fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Answers the first `failures` connections with 503, the rest with 200.
    async fn flaky_server(failures: usize) -> (String, Arc<AtomicUsize>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}/", listener.local_addr().unwrap());
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);

        tokio::spawn(async move {
            loop {
                let Ok((mut stream, _)) = listener.accept().await else { return };
                let n = counter.fetch_add(1, Ordering::SeqCst);
                tokio::spawn(async move {
                    let mut buf = [0u8; 4096];
                    let _ = stream.read(&mut buf).await;
                    let response: &[u8] = if n < failures {
                        b"HTTP/1.1 503 Service Unavailable\r\nContent-Length: 0\r\nConnection: close\r\n\r\n"
                    } else {
                        b"HTTP/1.1 200 OK\r\nX-Trace-Id: srv\r\nContent-Length: 2\r\nConnection: close\r\n\r\nok"
                    };
                    let _ = stream.write_all(response).await;
                    let _ = stream.shutdown().await;
                });
            }
        });

        (url, hits)
    }

    fn result(index: usize, error: &str) -> RequestResult {
        RequestResult {
            request_index: index,
            trace_id: Some("abc".into()),
            status_code: Some(200),
            start_unix_ms: 1,
            latency_ms: 1.5,
            retries: 0,
            error: error.into(),
        }
    }

    #[tokio::test]
    async fn retries_5xx_until_success() {
        let (url, hits) = flaky_server(2).await;
        let config = LoadConfig {
            url,
            max_retries: 3,
            retry_backoff_ms: 1,
            ..LoadConfig::default()
        };

        let r = perform_request(&reqwest::Client::new(), &config, 7).await;
        assert!(r.is_success(), "unexpected error: {}", r.error);
        assert_eq!(r.status_code, Some(200));
        assert_eq!(r.retries, 2);
        assert_eq!(r.request_index, 7);
        assert_eq!(r.trace_id.as_deref(), Some("srv"));
        assert_eq!(hits.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn gives_up_after_max_retries() {
        let (url, hits) = flaky_server(usize::MAX).await;
        let config = LoadConfig {
            url,
            max_retries: 1,
            retry_backoff_ms: 1,
            client_trace: true,
            ..LoadConfig::default()
        };

        let r = perform_request(&reqwest::Client::new(), &config, 0).await;
        assert_eq!(r.status_code, Some(503));
        assert_eq!(r.retries, 1);
        assert_eq!(r.error, "http_503");
        assert_eq!(r.trace_id.as_ref().map(String::len), Some(32));
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn run_load_returns_ordered_results() {
        let (url, hits) = flaky_server(0).await;
        let config = LoadConfig {
            url,
            requests: 12,
            concurrency: 3,
            ..LoadConfig::default()
        };

        let results = run_load(&reqwest::Client::new(), &config).await.unwrap();
        assert_eq!(results.len(), 12);
        assert!(results.iter().enumerate().all(|(i, r)| r.request_index == i && r.is_success()));
        assert_eq!(hits.load(Ordering::SeqCst), 12);
    }

    #[tokio::test]
    async fn zero_concurrency_rejected() {
        let config = LoadConfig { concurrency: 0, ..LoadConfig::default() };
        assert!(matches!(
            run_load(&reqwest::Client::new(), &config).await,
            Err(LoadError::ZeroConcurrency)
        ));
    }

    #[test]
    fn csv_quotes_awkward_fields() {
        let mut out = Vec::new();
        write_csv(&[result(0, ""), result(1, "error sending request, \"refused\"")], &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        let lines: Vec<_> = text.lines().collect();

        assert_eq!(lines[0], "request_index,trace_id,status_code,start_unix_ms,latency_ms,retries,error");
        assert_eq!(lines[1], "0,abc,200,1,1.500,0,");
        assert_eq!(lines[2], "1,abc,200,1,1.500,0,\"error sending request, \"\"refused\"\"\"");
    }

    #[test]
    fn csv_empty_writes_nothing() {
        let mut out = Vec::new();
        write_csv(&[], &mut out).unwrap();
        assert!(out.is_empty());
    }

    #[test]
    fn json_has_all_fields() {
        let mut out = Vec::new();
        write_json(&[result(3, "")], &mut out).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&out).unwrap();
        let row = &value[0];
        for field in ["request_index", "trace_id", "status_code", "start_unix_ms", "latency_ms", "retries", "error"] {
            assert!(row.get(field).is_some(), "missing {field}");
        }
        assert_eq!(row["request_index"], 3);
    }
}
