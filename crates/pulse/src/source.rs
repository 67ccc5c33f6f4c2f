//! Event sources: where raw activity records come from.
//!
//! [EventSource] is the seam the poller depends on. [StreamsRpcSource] reads the streams
//! contract over JSON-RPC (`eth_call`) and decodes every payload with the configured schema
//! into the record shape the [decoder](crate::decode) expects.

use crate::config::SourceConfig;
use crate::schema::{decode_bytes_array, encode_tokens, selector, Token};
use async_trait::async_trait;
use serde_json::{json, Value};
use thiserror::Error;

/// View on the streams contract returning every payload a publisher wrote for a schema.
pub const GET_ALL_PUBLISHER_DATA_SIGNATURE: &str = "getAllPublisherDataForSchema(bytes32,address)";

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("RPC error: {0}")]
    Rpc(String),
    #[error("decode error: {0}")]
    Decode(String),
}

/// Fetches raw records for a `(schema, publisher)` pair.
#[async_trait]
pub trait EventSource: Send + Sync {
    async fn fetch(&self, schema_id: &[u8; 32], publisher: &[u8; 20]) -> Result<Vec<Value>, SourceError>;
}

async fn http_json_rpc(
    client: &reqwest::Client,
    url: &str,
    method: &str,
    params: Value,
    id: u64,
) -> Result<Value, SourceError> {
    let body = json!({
        "jsonrpc": "2.0",
        "id": id,
        "method": method,
        "params": params
    });
    let resp = client.post(url).json(&body).send().await?;
    let resp = resp.error_for_status()?;
    let json: Value = resp.json().await?;
    if let Some(err) = json.get("error") {
        return Err(SourceError::Rpc(err.to_string()));
    }
    let result = json
        .get("result")
        .cloned()
        .ok_or_else(|| SourceError::Decode("Missing result".into()))?;
    Ok(result)
}

async fn eth_call(
    client: &reqwest::Client,
    http_url: &str,
    to: &[u8; 20],
    calldata: &[u8],
) -> Result<Vec<u8>, SourceError> {
    let params = json!([{
        "to": format!("0x{}", hex::encode(to)),
        "data": format!("0x{}", hex::encode(calldata)),
    }, "latest"]);
    let result = http_json_rpc(client, http_url, "eth_call", params, 1).await?;
    let s = result
        .as_str()
        .ok_or_else(|| SourceError::Decode("eth_call result not string".into()))?;
    let bytes = hex::decode(s.strip_prefix("0x").unwrap_or(s))
        .map_err(|e| SourceError::Decode(e.to_string()))?;
    Ok(bytes)
}

/// Calldata for `getAllPublisherDataForSchema(schema_id, publisher)`.
pub fn get_all_publisher_data_calldata(schema_id: &[u8; 32], publisher: &[u8; 20]) -> Vec<u8> {
    let mut publisher_word = [0u8; 32];
    publisher_word[12..].copy_from_slice(publisher);
    let mut calldata = selector(GET_ALL_PUBLISHER_DATA_SIGNATURE).to_vec();
    calldata.extend(encode_tokens(&[
        Token::Word(*schema_id),
        Token::Word(publisher_word),
    ]));
    calldata
}

/// Streams contract source over HTTP JSON-RPC.
pub struct StreamsRpcSource {
    config: SourceConfig,
    http_client: reqwest::Client,
}

impl StreamsRpcSource {
    pub fn new(config: SourceConfig) -> Result<Self, SourceError> {
        let http_client = reqwest::Client::builder().no_proxy().build()?;
        Ok(Self { config, http_client })
    }

    /// Decode an `eth_call` return (`bytes[]`) into SDK-shaped records. Payloads that do not
    /// match the schema are skipped; a malformed array is an error for the whole call.
    pub fn decode_response(&self, data: &[u8]) -> Result<Vec<Value>, SourceError> {
        if data.is_empty() {
            // eth_call on an address without code returns "0x".
            return Ok(Vec::new());
        }
        let payloads =
            decode_bytes_array(data).map_err(|e| SourceError::Decode(e.to_string()))?;
        let records: Vec<Value> = payloads
            .iter()
            .filter_map(|payload| {
                self.config
                    .schema
                    .decode_record(payload)
                    .map_err(|e| tracing::debug!(%e, "record payload skipped"))
                    .ok()
            })
            .collect();
        if !payloads.is_empty() && records.is_empty() {
            tracing::warn!(raw_count = payloads.len(), "payloads received but none decoded");
        }
        Ok(records)
    }
}

#[async_trait]
impl EventSource for StreamsRpcSource {
    async fn fetch(&self, schema_id: &[u8; 32], publisher: &[u8; 20]) -> Result<Vec<Value>, SourceError> {
        let calldata = get_all_publisher_data_calldata(schema_id, publisher);
        let data = eth_call(
            &self.http_client,
            &self.config.http_url,
            &self.config.streams_address,
            &calldata,
        )
        .await?;
        let records = self.decode_response(&data)?;
        tracing::debug!(count = records.len(), "fetched publisher records");
        Ok(records)
    }
}
