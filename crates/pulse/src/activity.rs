//! Canonical activity record.
//!
//! One `Activity` per record published under the activity schema. Records are immutable once
//! observed; the poller replaces whole snapshots instead of editing items.

use alloy::primitives::U256;
use serde::{Serialize, Serializer};

/// Placeholder for a missing `user` field.
pub const ZERO_ADDRESS: &str = "0x0000000000000000000000000000000000000000";

/// Placeholder for a missing `sourceId` field (bytes32 of zeros).
pub const ZERO_SOURCE_ID: &str =
    "0x0000000000000000000000000000000000000000000000000000000000000000";

/// Activity type that carries a `target_realm`.
pub const ATTACK_REALM: &str = "ATTACK_REALM";

/// One decoded activity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Activity {
    pub user: String,
    pub activity_type: String,
    pub activity_context: String,
    /// Schema `uint256`; serialized as a decimal string.
    #[serde(serialize_with = "serialize_decimal")]
    pub activity_value: U256,
    pub realm: u64,
    /// `None` when the record has no target (absent or `0`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_realm: Option<u64>,
    /// Seconds since epoch, as supplied by the publisher.
    pub timestamp: u64,
    pub source_id: String,
}

impl Default for Activity {
    fn default() -> Self {
        Self {
            user: ZERO_ADDRESS.to_string(),
            activity_type: String::new(),
            activity_context: String::new(),
            activity_value: U256::ZERO,
            realm: 0,
            target_realm: None,
            timestamp: 0,
            source_id: ZERO_SOURCE_ID.to_string(),
        }
    }
}

impl Activity {
    /// True for directed attacks (`ATTACK_REALM` with a target).
    pub fn is_attack(&self) -> bool {
        self.activity_type == ATTACK_REALM && self.target_realm.is_some()
    }

    /// Identity used to tell whether a record was already present in a previous snapshot.
    /// `source_id` alone is not unique (publishers may reuse it).
    pub(crate) fn observation_key(&self) -> (&str, &str, u64, &str) {
        (
            self.source_id.as_str(),
            self.user.as_str(),
            self.timestamp,
            self.activity_type.as_str(),
        )
    }
}

fn serialize_decimal<S: Serializer>(value: &U256, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.collect_str(value)
}
