//! Raw record → [Activity].
//!
//! Raw records come from the event source as JSON. The stream SDK shape is an array of
//! `{name, type, value: {name, type, value}}` objects; flat `{name, value}` entries and plain
//! objects keyed by field name are accepted too. Decoding never fails: a missing or malformed
//! field falls back to its default so one bad record cannot hide the rest of the batch.

use crate::activity::{Activity, ZERO_ADDRESS, ZERO_SOURCE_ID};
use alloy::primitives::U256;
use serde_json::{Map, Value};
use std::collections::HashMap;

/// Decode every record of a fetch result, in order.
pub fn decode_batch(records: &[Value]) -> Vec<Activity> {
    records.iter().map(decode_activity).collect()
}

/// Decode one raw record. Unknown shapes decode to [Activity::default].
pub fn decode_activity(record: &Value) -> Activity {
    let fields = collect_fields(record);
    Activity {
        user: text_field(&fields, "user").unwrap_or_else(|| ZERO_ADDRESS.to_string()),
        activity_type: text_field(&fields, "activityType").unwrap_or_default(),
        activity_context: text_field(&fields, "activityContext").unwrap_or_default(),
        activity_value: uint_field(&fields, "activityValue"),
        realm: u64_field(&fields, "realm"),
        target_realm: Some(u64_field(&fields, "targetRealm")).filter(|t| *t != 0),
        timestamp: u64_field(&fields, "timestamp"),
        source_id: text_field(&fields, "sourceId").unwrap_or_else(|| ZERO_SOURCE_ID.to_string()),
    }
}

/// Flatten a record into `name -> scalar value`. Nulls are dropped (treated as missing).
fn collect_fields(record: &Value) -> HashMap<&str, &Value> {
    let mut fields = HashMap::new();
    match record {
        Value::Array(entries) => {
            for entry in entries {
                let Some(name) = entry.get("name").and_then(Value::as_str) else {
                    continue;
                };
                if let Some(v) = entry.get("value").and_then(unwrap_nested) {
                    fields.insert(name, v);
                }
            }
        }
        Value::Object(map) => insert_flat(&mut fields, map),
        _ => {}
    }
    fields
}

fn insert_flat<'a>(fields: &mut HashMap<&'a str, &'a Value>, map: &'a Map<String, Value>) {
    for (name, v) in map {
        if let Some(v) = unwrap_nested(v) {
            fields.insert(name.as_str(), v);
        }
    }
}

/// SDK values are wrapped as `{name, type, value}`; unwrap one level if so.
fn unwrap_nested(v: &Value) -> Option<&Value> {
    let inner = match v {
        Value::Object(obj) => obj.get("value").unwrap_or(v),
        other => other,
    };
    (!inner.is_null()).then_some(inner)
}

fn text_field(fields: &HashMap<&str, &Value>, name: &str) -> Option<String> {
    match fields.get(name)? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        other => {
            tracing::debug!(field = name, value = %other, "non-scalar text field, using default");
            None
        }
    }
}

fn uint_field(fields: &HashMap<&str, &Value>, name: &str) -> U256 {
    let Some(v) = fields.get(name) else {
        return U256::ZERO;
    };
    match parse_uint(v) {
        Ok(n) => n,
        Err(reason) => {
            tracing::debug!(field = name, %reason, "field decode error, using 0");
            U256::ZERO
        }
    }
}

fn u64_field(fields: &HashMap<&str, &Value>, name: &str) -> u64 {
    let n = uint_field(fields, name);
    u64::try_from(n).unwrap_or_else(|_| {
        tracing::debug!(field = name, value = %n, "field exceeds u64, using 0");
        0
    })
}

/// Parse a uint from a decimal string, a `0x` hex string, or a non-negative integral JSON number.
pub fn parse_uint(v: &Value) -> Result<U256, String> {
    match v {
        Value::Number(n) => match n.as_u64() {
            Some(u) => Ok(U256::from(u)),
            // Integers past u64 and `1.0`-style literals arrive as f64.
            None => n
                .as_f64()
                .filter(|f| f.is_finite() && *f >= 0.0 && f.fract() == 0.0)
                .ok_or_else(|| format!("not a non-negative integer: {}", n))
                .and_then(integral_f64),
        },
        Value::String(s) => {
            let s = s.trim();
            if s.is_empty() {
                return Ok(U256::ZERO);
            }
            let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
                Some(hex) => U256::from_str_radix(hex, 16),
                None => U256::from_str_radix(s, 10),
            };
            parsed.map_err(|e| format!("{:?}: {}", s, e))
        }
        other => Err(format!("unexpected value {}", other)),
    }
}

/// Exact value of a finite, non-negative, integral f64.
fn integral_f64(f: f64) -> Result<U256, String> {
    if f < 2f64.powi(128) {
        return Ok(U256::from(f as u128));
    }
    // `{:.0}` prints every digit of the float's exact value.
    let digits = format!("{:.0}", f);
    U256::from_str_radix(&digits, 10).map_err(|e| format!("{}: {}", digits, e))
}
