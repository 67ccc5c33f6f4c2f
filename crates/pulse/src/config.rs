//! Poller and source configuration.

use crate::schema::{Schema, SchemaError};
use std::time::Duration;
use thiserror::Error;

/// Default refresh interval.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(10);

/// Default snapshot bound.
pub const DEFAULT_MAX_ITEMS: usize = 200;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing {0}")]
    Missing(&'static str),
    #[error("{name}: {reason}")]
    Invalid { name: &'static str, reason: String },
    #[error("schema: {0}")]
    Schema(#[from] SchemaError),
}

/// Poller configuration.
#[derive(Debug, Clone)]
pub struct PollerConfig {
    /// Schema id the publisher wrote under (32 bytes).
    pub schema_id: [u8; 32],
    /// Publisher address (20 bytes).
    pub publisher: [u8; 20],
    /// Time between fetch cycles.
    pub poll_interval: Duration,
    /// Newest records kept per snapshot.
    pub max_items: usize,
}

impl PollerConfig {
    pub fn new(schema_id: [u8; 32], publisher: [u8; 20]) -> Self {
        Self {
            schema_id,
            publisher,
            poll_interval: DEFAULT_POLL_INTERVAL,
            max_items: DEFAULT_MAX_ITEMS,
        }
    }
}

/// JSON-RPC source configuration.
#[derive(Debug, Clone)]
pub struct SourceConfig {
    /// HTTP RPC URL (eth_call).
    pub http_url: String,
    /// Streams contract address (20 bytes).
    pub streams_address: [u8; 20],
    /// Schema used to decode record payloads.
    pub schema: Schema,
}

impl SourceConfig {
    pub fn new(http_url: impl Into<String>, streams_address: [u8; 20]) -> Self {
        Self {
            http_url: http_url.into(),
            streams_address,
            schema: Schema::activity(),
        }
    }
}

/// Load both configs from `PULSE_*` environment variables.
pub fn from_env() -> Result<(SourceConfig, PollerConfig), ConfigError> {
    from_lookup(|key| std::env::var(key).ok())
}

/// Load both configs through `lookup` (env-like key → value).
///
/// Required: `PULSE_RPC_URL`, `PULSE_STREAMS_ADDRESS`, `PULSE_SCHEMA_ID`, `PULSE_PUBLISHER`.
/// Optional: `PULSE_POLL_INTERVAL_SECS`, `PULSE_MAX_ITEMS`, `PULSE_SCHEMA`.
pub fn from_lookup<F>(lookup: F) -> Result<(SourceConfig, PollerConfig), ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let get = |name: &'static str| {
        lookup(name)
            .filter(|v| !v.trim().is_empty())
            .ok_or(ConfigError::Missing(name))
    };
    let http_url = get("PULSE_RPC_URL")?;
    let streams_address = parse_hex_20(&get("PULSE_STREAMS_ADDRESS")?)
        .map_err(|reason| ConfigError::Invalid { name: "PULSE_STREAMS_ADDRESS", reason })?;
    let schema_id = parse_hex_32(&get("PULSE_SCHEMA_ID")?)
        .map_err(|reason| ConfigError::Invalid { name: "PULSE_SCHEMA_ID", reason })?;
    let publisher = parse_hex_20(&get("PULSE_PUBLISHER")?)
        .map_err(|reason| ConfigError::Invalid { name: "PULSE_PUBLISHER", reason })?;

    let mut source = SourceConfig::new(http_url, streams_address);
    if let Ok(schema) = get("PULSE_SCHEMA") {
        source.schema = Schema::parse(&schema)?;
    }

    let mut poller = PollerConfig::new(schema_id, publisher);
    if let Ok(secs) = get("PULSE_POLL_INTERVAL_SECS") {
        let secs: u64 = secs.trim().parse().map_err(|e| ConfigError::Invalid {
            name: "PULSE_POLL_INTERVAL_SECS",
            reason: format!("{}", e),
        })?;
        if secs == 0 {
            return Err(ConfigError::Invalid {
                name: "PULSE_POLL_INTERVAL_SECS",
                reason: "must be positive".into(),
            });
        }
        poller.poll_interval = Duration::from_secs(secs);
    }
    if let Ok(max) = get("PULSE_MAX_ITEMS") {
        poller.max_items = max.trim().parse().map_err(|e| ConfigError::Invalid {
            name: "PULSE_MAX_ITEMS",
            reason: format!("{}", e),
        })?;
    }
    Ok((source, poller))
}

/// Parse a `0x`-prefixed (or bare) 20-byte hex address.
pub fn parse_hex_20(s: &str) -> Result<[u8; 20], String> {
    parse_hex_fixed(s)
}

/// Parse a `0x`-prefixed (or bare) 32-byte hex value.
pub fn parse_hex_32(s: &str) -> Result<[u8; 32], String> {
    parse_hex_fixed(s)
}

fn parse_hex_fixed<const N: usize>(s: &str) -> Result<[u8; N], String> {
    let s = s.trim();
    let bytes = hex::decode(s.strip_prefix("0x").unwrap_or(s)).map_err(|e| e.to_string())?;
    bytes
        .try_into()
        .map_err(|b: Vec<u8>| format!("expected {} bytes, got {}", N, b.len()))
}
