//! Stream schemas and their ABI codec.
//!
//! A schema is a comma-separated list of `type name` pairs (the same string that was
//! registered on-chain). Record payloads are the ABI encoding of those fields as one tuple.
//! Decoding turns a payload into the JSON record shape the stream SDK returns, so the
//! [decoder](crate::decode) sees the same input whichever source produced it.

use alloy::primitives::U256;
use serde_json::{json, Value};
use sha3::{Digest, Keccak256};
use std::collections::HashSet;
use thiserror::Error;

/// The activity schema published by the emitter (includes `targetRealm`).
pub const ACTIVITY_SCHEMA: &str = "address user,string activityType,string activityContext,uint256 activityValue,uint256 realm,uint256 targetRealm,uint256 timestamp,bytes32 sourceId";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SchemaError {
    #[error("empty schema entry at position {0}")]
    EmptyEntry(usize),
    #[error("malformed schema entry {0:?}")]
    MalformedEntry(String),
    #[error("unsupported type {0:?}")]
    UnsupportedType(String),
    #[error("duplicate field {0:?}")]
    DuplicateField(String),
    #[error("data too short: {0}")]
    Truncated(String),
    #[error("expected {expected} values, got {got}")]
    Arity { expected: usize, got: usize },
    #[error("value for {field} does not fit {kind}")]
    ValueMismatch { field: String, kind: String },
    #[error("invalid data: {0}")]
    Invalid(String),
}

/// Solidity types supported in stream schemas.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Address,
    Bool,
    String,
    Bytes,
    /// `bytesN`, 1..=32.
    FixedBytes(usize),
    /// `uintN`, N a multiple of 8 in 8..=256.
    Uint(usize),
}

impl FieldKind {
    pub fn parse(ty: &str) -> Option<Self> {
        match ty {
            "address" => Some(FieldKind::Address),
            "bool" => Some(FieldKind::Bool),
            "string" => Some(FieldKind::String),
            "bytes" => Some(FieldKind::Bytes),
            "uint" => Some(FieldKind::Uint(256)),
            _ => {
                if let Some(n) = ty.strip_prefix("bytes") {
                    let n: usize = n.parse().ok()?;
                    (1..=32).contains(&n).then_some(FieldKind::FixedBytes(n))
                } else if let Some(n) = ty.strip_prefix("uint") {
                    let n: usize = n.parse().ok()?;
                    (n % 8 == 0 && (8..=256).contains(&n)).then_some(FieldKind::Uint(n))
                } else {
                    None
                }
            }
        }
    }

    pub fn is_dynamic(&self) -> bool {
        matches!(self, FieldKind::String | FieldKind::Bytes)
    }

    pub fn type_name(&self) -> String {
        match self {
            FieldKind::Address => "address".into(),
            FieldKind::Bool => "bool".into(),
            FieldKind::String => "string".into(),
            FieldKind::Bytes => "bytes".into(),
            FieldKind::FixedBytes(n) => format!("bytes{}", n),
            FieldKind::Uint(n) => format!("uint{}", n),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaField {
    pub name: String,
    pub kind: FieldKind,
}

/// A decoded (or to-be-encoded) field value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchemaValue {
    Address([u8; 20]),
    Bool(bool),
    String(String),
    Bytes(Vec<u8>),
    FixedBytes(Vec<u8>),
    Uint(U256),
}

impl SchemaValue {
    /// JSON rendering used by the SDK: uints as decimal strings, byte values as `0x` hex.
    pub fn to_json(&self) -> Value {
        match self {
            SchemaValue::Address(a) => Value::String(format!("0x{}", hex::encode(a))),
            SchemaValue::Bool(b) => Value::Bool(*b),
            SchemaValue::String(s) => Value::String(s.clone()),
            SchemaValue::Bytes(b) | SchemaValue::FixedBytes(b) => {
                Value::String(format!("0x{}", hex::encode(b)))
            }
            SchemaValue::Uint(n) => Value::String(n.to_string()),
        }
    }
}

/// Parsed schema: ordered fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schema {
    fields: Vec<SchemaField>,
}

impl Schema {
    /// Parse `"address user,string activityType,..."`.
    pub fn parse(definition: &str) -> Result<Self, SchemaError> {
        let mut fields = Vec::new();
        let mut seen = HashSet::new();
        for (i, entry) in definition.split(',').enumerate() {
            let entry = entry.trim();
            if entry.is_empty() {
                return Err(SchemaError::EmptyEntry(i));
            }
            let mut parts = entry.split_whitespace();
            let (ty, name) = match (parts.next(), parts.next(), parts.next()) {
                (Some(ty), Some(name), None) => (ty, name),
                _ => return Err(SchemaError::MalformedEntry(entry.to_string())),
            };
            let kind =
                FieldKind::parse(ty).ok_or_else(|| SchemaError::UnsupportedType(ty.to_string()))?;
            if !seen.insert(name.to_string()) {
                return Err(SchemaError::DuplicateField(name.to_string()));
            }
            fields.push(SchemaField {
                name: name.to_string(),
                kind,
            });
        }
        Ok(Self { fields })
    }

    /// The fields of [ACTIVITY_SCHEMA].
    pub fn activity() -> Self {
        let fields = [
            (FieldKind::Address, "user"),
            (FieldKind::String, "activityType"),
            (FieldKind::String, "activityContext"),
            (FieldKind::Uint(256), "activityValue"),
            (FieldKind::Uint(256), "realm"),
            (FieldKind::Uint(256), "targetRealm"),
            (FieldKind::Uint(256), "timestamp"),
            (FieldKind::FixedBytes(32), "sourceId"),
        ];
        Self {
            fields: fields
                .into_iter()
                .map(|(kind, name)| SchemaField {
                    name: name.to_string(),
                    kind,
                })
                .collect(),
        }
    }

    pub fn fields(&self) -> &[SchemaField] {
        &self.fields
    }

    /// Decode an ABI-encoded record payload.
    pub fn decode(&self, data: &[u8]) -> Result<Vec<(SchemaField, SchemaValue)>, SchemaError> {
        let head_len = self.fields.len() * 32;
        if data.len() < head_len {
            return Err(SchemaError::Truncated(format!(
                "{} bytes for {} head words",
                data.len(),
                self.fields.len()
            )));
        }
        let mut out = Vec::with_capacity(self.fields.len());
        for (i, field) in self.fields.iter().enumerate() {
            let word = &data[i * 32..i * 32 + 32];
            let value = match field.kind {
                FieldKind::Address => {
                    let mut a = [0u8; 20];
                    a.copy_from_slice(&word[12..32]);
                    SchemaValue::Address(a)
                }
                FieldKind::Bool => match read_uint(word) {
                    n if n == U256::ZERO => SchemaValue::Bool(false),
                    n if n == U256::from(1u64) => SchemaValue::Bool(true),
                    n => return Err(SchemaError::Invalid(format!("bool word {}", n))),
                },
                FieldKind::Uint(_) => SchemaValue::Uint(read_uint(word)),
                FieldKind::FixedBytes(n) => SchemaValue::FixedBytes(word[..n].to_vec()),
                FieldKind::String => {
                    let bytes = read_dynamic(data, read_usize(word)?)?;
                    let s = String::from_utf8(bytes.to_vec())
                        .map_err(|e| SchemaError::Invalid(format!("{}: {}", field.name, e)))?;
                    SchemaValue::String(s)
                }
                FieldKind::Bytes => SchemaValue::Bytes(read_dynamic(data, read_usize(word)?)?.to_vec()),
            };
            out.push((field.clone(), value));
        }
        Ok(out)
    }

    /// Decode a payload straight into the SDK record shape:
    /// `[{name, type, value: {name, type, value}}, ...]`.
    pub fn decode_record(&self, data: &[u8]) -> Result<Value, SchemaError> {
        let decoded = self.decode(data)?;
        Ok(Value::Array(
            decoded
                .iter()
                .map(|(field, value)| {
                    let ty = field.kind.type_name();
                    json!({
                        "name": field.name,
                        "type": ty,
                        "value": { "name": field.name, "type": ty, "value": value.to_json() },
                    })
                })
                .collect(),
        ))
    }

    /// ABI-encode one value per field, in schema order.
    pub fn encode(&self, values: &[SchemaValue]) -> Result<Vec<u8>, SchemaError> {
        if values.len() != self.fields.len() {
            return Err(SchemaError::Arity {
                expected: self.fields.len(),
                got: values.len(),
            });
        }
        let tokens = self
            .fields
            .iter()
            .zip(values)
            .map(|(field, value)| to_token(field, value))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(encode_tokens(&tokens))
    }
}

fn to_token(field: &SchemaField, value: &SchemaValue) -> Result<Token, SchemaError> {
    let mismatch = || SchemaError::ValueMismatch {
        field: field.name.clone(),
        kind: field.kind.type_name(),
    };
    match (field.kind, value) {
        (FieldKind::Address, SchemaValue::Address(a)) => {
            let mut w = [0u8; 32];
            w[12..].copy_from_slice(a);
            Ok(Token::Word(w))
        }
        (FieldKind::Bool, SchemaValue::Bool(b)) => Ok(Token::Word(uint_word(U256::from(*b as u64)))),
        (FieldKind::Uint(bits), SchemaValue::Uint(n)) if n.bit_len() <= bits => {
            Ok(Token::Word(uint_word(*n)))
        }
        (FieldKind::FixedBytes(len), SchemaValue::FixedBytes(b)) if b.len() <= len => {
            let mut w = [0u8; 32];
            w[..b.len()].copy_from_slice(b);
            Ok(Token::Word(w))
        }
        (FieldKind::String, SchemaValue::String(s)) => Ok(Token::Bytes(s.as_bytes().to_vec())),
        (FieldKind::Bytes, SchemaValue::Bytes(b)) => Ok(Token::Bytes(b.clone())),
        _ => Err(mismatch()),
    }
}

/// Minimal ABI token tree; enough for schema payloads and the stream contract calls.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    Word([u8; 32]),
    Bytes(Vec<u8>),
    Array(Vec<Token>),
    Tuple(Vec<Token>),
}

impl Token {
    fn is_dynamic(&self) -> bool {
        match self {
            Token::Word(_) => false,
            Token::Bytes(_) | Token::Array(_) => true,
            Token::Tuple(items) => items.iter().any(Token::is_dynamic),
        }
    }

    fn head_size(&self) -> usize {
        match self {
            Token::Tuple(items) if !self.is_dynamic() => items.iter().map(Token::head_size).sum(),
            _ => 32,
        }
    }
}

/// ABI-encode a sequence of tokens (function arguments or tuple members).
pub fn encode_tokens(tokens: &[Token]) -> Vec<u8> {
    let head_size: usize = tokens.iter().map(Token::head_size).sum();
    let mut head = Vec::with_capacity(head_size);
    let mut tail = Vec::new();
    for token in tokens {
        if token.is_dynamic() {
            head.extend_from_slice(&usize_word(head_size + tail.len()));
            tail.extend(encode_token(token));
        } else {
            head.extend(encode_token(token));
        }
    }
    head.extend(tail);
    head
}

fn encode_token(token: &Token) -> Vec<u8> {
    match token {
        Token::Word(w) => w.to_vec(),
        Token::Bytes(b) => {
            let mut out = usize_word(b.len()).to_vec();
            out.extend_from_slice(b);
            out.resize(32 + b.len().div_ceil(32) * 32, 0);
            out
        }
        Token::Array(items) => {
            let mut out = usize_word(items.len()).to_vec();
            out.extend(encode_tokens(items));
            out
        }
        Token::Tuple(items) => encode_tokens(items),
    }
}

/// Decode an ABI-encoded `bytes[]` return value.
pub fn decode_bytes_array(data: &[u8]) -> Result<Vec<Vec<u8>>, SchemaError> {
    let offset = read_usize(word_at(data, 0)?)?;
    let count = read_usize(word_at(data, offset)?)?;
    let base = offset + 32;
    // Each element needs at least its offset word; reject absurd counts before allocating.
    if count > data.len().saturating_sub(base) / 32 {
        return Err(SchemaError::Truncated(format!("bytes[] of {} elements", count)));
    }
    (0..count)
        .map(|i| {
            let rel = read_usize(word_at(data, base + i * 32)?)?;
            let at = base
                .checked_add(rel)
                .ok_or_else(|| SchemaError::Invalid("element offset overflow".into()))?;
            Ok(read_dynamic(data, at)?.to_vec())
        })
        .collect()
}

/// First 4 bytes of keccak256 of a function signature.
pub fn selector(signature: &str) -> [u8; 4] {
    let hash = Keccak256::digest(signature.as_bytes());
    [hash[0], hash[1], hash[2], hash[3]]
}

pub fn uint_word(n: U256) -> [u8; 32] {
    n.to_be_bytes::<32>()
}

fn usize_word(n: usize) -> [u8; 32] {
    uint_word(U256::from(n as u64))
}

fn read_uint(word: &[u8]) -> U256 {
    U256::from_be_slice(word)
}

fn read_usize(word: &[u8]) -> Result<usize, SchemaError> {
    let n = read_uint(word);
    u64::try_from(n)
        .ok()
        .and_then(|n| usize::try_from(n).ok())
        .ok_or_else(|| SchemaError::Invalid(format!("offset/length {} out of range", n)))
}

fn word_at(data: &[u8], at: usize) -> Result<&[u8], SchemaError> {
    at.checked_add(32)
        .and_then(|end| data.get(at..end))
        .ok_or_else(|| SchemaError::Truncated(format!("no word at {}", at)))
}

fn read_dynamic(data: &[u8], offset: usize) -> Result<&[u8], SchemaError> {
    let len = read_usize(word_at(data, offset)?)?;
    let start = offset + 32;
    start
        .checked_add(len)
        .and_then(|end| data.get(start..end))
        .ok_or_else(|| SchemaError::Truncated(format!("{} bytes at offset {}", len, offset)))
}
