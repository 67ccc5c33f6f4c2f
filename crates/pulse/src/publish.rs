//! Publishing activities to the streams contract through an injected [Signer].
//!
//! The wallet layer (browser provider, remote signer, local key) is not part of this crate;
//! it plugs in through [Signer]. Publishing sends one `esstores` call per activity and
//! returns the transaction hash. Confirmation tracking is left to the caller.

use crate::activity::Activity;
use crate::config::{parse_hex_20, parse_hex_32};
use crate::schema::{encode_tokens, selector, Schema, SchemaError, SchemaValue, Token};
use alloy::primitives::U256;
use async_trait::async_trait;
use thiserror::Error;

/// Streams write entry point: a batch of `(id, schemaId, data)` tuples.
pub const ESSTORES_SIGNATURE: &str = "esstores((bytes32,bytes32,bytes)[])";

#[derive(Debug, Error)]
pub enum PublishError {
    #[error("no account available from signer")]
    NoAccount,
    #[error("signer error: {0}")]
    Signer(String),
    #[error("invalid {field}: {reason}")]
    InvalidField { field: String, reason: String },
    #[error("schema: {0}")]
    Schema(#[from] SchemaError),
}

/// Wallet capability supplied by the wallet layer.
#[async_trait]
pub trait Signer: Send + Sync {
    /// Accounts the user authorized, first one is used.
    async fn request_accounts(&self) -> Result<Vec<String>, PublishError>;
    /// Send a transaction; returns its hash.
    async fn send_transaction(&self, to: [u8; 20], calldata: Vec<u8>) -> Result<String, PublishError>;
    async fn switch_network(&self, chain_id: u64) -> Result<(), PublishError>;
}

#[derive(Debug, Clone)]
pub struct PublisherConfig {
    pub chain_id: u64,
    pub streams_address: [u8; 20],
    pub schema_id: [u8; 32],
    pub schema: Schema,
}

pub struct ActivityPublisher<S> {
    config: PublisherConfig,
    signer: S,
}

impl<S: Signer> ActivityPublisher<S> {
    pub fn new(config: PublisherConfig, signer: S) -> Self {
        Self { config, signer }
    }

    /// Encode and send one activity. Returns the transaction hash.
    pub async fn publish(&self, activity: &Activity) -> Result<String, PublishError> {
        let accounts = self.signer.request_accounts().await?;
        let account = accounts.first().ok_or(PublishError::NoAccount)?;
        self.signer.switch_network(self.config.chain_id).await?;

        let calldata = self.calldata(activity)?;
        let tx = self
            .signer
            .send_transaction(self.config.streams_address, calldata)
            .await?;
        tracing::info!(
            %account,
            tx = %tx,
            activity_type = %activity.activity_type,
            realm = activity.realm,
            "activity published"
        );
        Ok(tx)
    }

    /// `esstores([(source_id, schema_id, encoded activity)])` calldata.
    pub fn calldata(&self, activity: &Activity) -> Result<Vec<u8>, PublishError> {
        let data = encode_activity(&self.config.schema, activity)?;
        let id = fixed_bytes_32("sourceId", &activity.source_id)?;
        let mut calldata = selector(ESSTORES_SIGNATURE).to_vec();
        calldata.extend(encode_tokens(&[Token::Array(vec![Token::Tuple(vec![
            Token::Word(id),
            Token::Word(self.config.schema_id),
            Token::Bytes(data),
        ])])]));
        Ok(calldata)
    }
}

/// ABI-encode an activity with `schema`, mapping fields by name.
pub fn encode_activity(schema: &Schema, activity: &Activity) -> Result<Vec<u8>, PublishError> {
    let values = schema
        .fields()
        .iter()
        .map(|field| {
            let invalid = |reason: &str| PublishError::InvalidField {
                field: field.name.clone(),
                reason: reason.to_string(),
            };
            Ok(match field.name.as_str() {
                "user" => SchemaValue::Address(
                    parse_hex_20(&activity.user).map_err(|e| invalid(&e))?,
                ),
                "activityType" => SchemaValue::String(activity.activity_type.clone()),
                "activityContext" => SchemaValue::String(activity.activity_context.clone()),
                "activityValue" => SchemaValue::Uint(activity.activity_value),
                "realm" => SchemaValue::Uint(U256::from(activity.realm)),
                "targetRealm" => SchemaValue::Uint(U256::from(activity.target_realm.unwrap_or(0))),
                "timestamp" => SchemaValue::Uint(U256::from(activity.timestamp)),
                "sourceId" => SchemaValue::FixedBytes(
                    fixed_bytes_32("sourceId", &activity.source_id)?.to_vec(),
                ),
                _ => return Err(invalid("not an activity field")),
            })
        })
        .collect::<Result<Vec<_>, PublishError>>()?;
    Ok(schema.encode(&values)?)
}

/// Hex value right-padded to 32 bytes (like `stringToHex(.., { size: 32 })`).
fn fixed_bytes_32(field: &str, s: &str) -> Result<[u8; 32], PublishError> {
    let invalid = |reason: String| PublishError::InvalidField {
        field: field.to_string(),
        reason,
    };
    if let Ok(full) = parse_hex_32(s) {
        return Ok(full);
    }
    let bytes = hex::decode(s.strip_prefix("0x").unwrap_or(s)).map_err(|e| invalid(e.to_string()))?;
    if bytes.len() > 32 {
        return Err(invalid(format!("{} bytes exceeds 32", bytes.len())));
    }
    let mut out = [0u8; 32];
    out[..bytes.len()].copy_from_slice(&bytes);
    Ok(out)
}
