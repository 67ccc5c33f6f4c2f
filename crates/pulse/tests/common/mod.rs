//! Common helpers for integration tests.
//! Some helpers are only used by specific test binaries; allow dead_code to avoid per-binary warnings.
#![allow(dead_code)]

use anyhow::{Context, Result};
use async_trait::async_trait;
use pulse::{EventSource, SourceError};
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tracing_subscriber::EnvFilter;

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("pulse=debug".parse().unwrap()))
        .with_test_writer()
        .try_init();
}

/// One field in the stream SDK shape: `{name, type, value: {name, type, value}}`.
fn sdk_field(name: &str, ty: &str, value: Value) -> Value {
    json!({ "name": name, "type": ty, "value": { "name": name, "type": ty, "value": value } })
}

/// Raw record as the stream SDK returns it.
pub fn sdk_record(user: &str, activity_type: &str, value: &str, realm: u64, timestamp: u64) -> Value {
    json!([
        sdk_field("user", "address", json!(user)),
        sdk_field("activityType", "string", json!(activity_type)),
        sdk_field("activityContext", "string", json!("dashboard")),
        sdk_field("activityValue", "uint256", json!(value)),
        sdk_field("realm", "uint256", json!(realm.to_string())),
        sdk_field("targetRealm", "uint256", json!("0")),
        sdk_field("timestamp", "uint256", json!(timestamp.to_string())),
        sdk_field("sourceId", "bytes32", json!(format!("0x{:064x}", timestamp))),
    ])
}

/// Event source that counts calls and replays a script of responses.
/// The last entry repeats once the script is exhausted.
pub struct SpySource {
    calls: AtomicUsize,
    delay: Duration,
    script: Mutex<VecDeque<Result<Vec<Value>, String>>>,
}

impl SpySource {
    pub fn new(script: Vec<Result<Vec<Value>, String>>) -> Self {
        Self {
            calls: AtomicUsize::new(0),
            delay: Duration::ZERO,
            script: Mutex::new(script.into()),
        }
    }

    /// Every fetch takes `delay` before answering.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn shared(self) -> Arc<Self> {
        Arc::new(self)
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn next_response(&self) -> Result<Vec<Value>, String> {
        let mut script = self.script.lock().unwrap();
        if script.len() > 1 {
            script.pop_front().unwrap()
        } else {
            script.front().cloned().unwrap_or(Ok(Vec::new()))
        }
    }
}

#[async_trait]
impl EventSource for SpySource {
    async fn fetch(&self, _schema_id: &[u8; 32], _publisher: &[u8; 20]) -> Result<Vec<Value>, SourceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let response = self.next_response();
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        response.map_err(SourceError::Rpc)
    }
}

/// Minimal HTTP JSON-RPC endpoint answering every request with the same envelope.
pub struct MockRpc {
    pub url: String,
    requests: Arc<Mutex<Vec<Value>>>,
}

impl MockRpc {
    /// Serve `{"jsonrpc":"2.0","id":1, ..reply}` where `reply` holds `result` or `error`.
    pub async fn serve(reply: Value) -> Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .context("bind mock rpc")?;
        let addr = listener.local_addr().context("mock rpc address")?;
        let requests = Arc::new(Mutex::new(Vec::new()));
        let seen = Arc::clone(&requests);
        let mut envelope = json!({ "jsonrpc": "2.0", "id": 1 });
        if let (Some(env), Some(reply)) = (envelope.as_object_mut(), reply.as_object()) {
            env.extend(reply.clone());
        }
        let body = envelope.to_string();
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let body = body.clone();
                let seen = Arc::clone(&seen);
                tokio::spawn(async move {
                    let _ = handle(stream, &body, &seen).await;
                });
            }
        });
        Ok(Self {
            url: format!("http://{}", addr),
            requests,
        })
    }

    /// JSON bodies received so far.
    pub fn requests(&self) -> Vec<Value> {
        self.requests.lock().unwrap().clone()
    }
}

async fn handle(mut stream: TcpStream, body: &str, seen: &Mutex<Vec<Value>>) -> Result<()> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    let header_end = loop {
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            anyhow::bail!("connection closed before headers");
        }
        buf.extend_from_slice(&chunk[..n]);
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos + 4;
        }
    };
    let headers = String::from_utf8_lossy(&buf[..header_end]).to_ascii_lowercase();
    let content_length: usize = headers
        .lines()
        .find_map(|line| line.strip_prefix("content-length:"))
        .map(|v| v.trim().parse())
        .transpose()
        .context("content-length")?
        .unwrap_or(0);
    while buf.len() < header_end + content_length {
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);
    }
    let request: Value = serde_json::from_slice(&buf[header_end..]).context("request body")?;
    seen.lock().unwrap().push(request);
    let response = format!(
        "HTTP/1.1 200 OK\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
        body.len(),
        body
    );
    stream.write_all(response.as_bytes()).await?;
    stream.shutdown().await?;
    Ok(())
}
