//! Derived dashboard views over a snapshot.
//!
//! Every function here is pure: output depends only on `(items, now)`. Callers recompute
//! whenever the snapshot changes; nothing is cached.

use crate::activity::Activity;
use alloy::primitives::{Uint, U256};
use serde::{Serialize, Serializer};
use std::collections::{BTreeMap, HashMap, HashSet};

/// Trailing window for throughput (activities per minute).
pub const THROUGHPUT_WINDOW_SECS: u64 = 60;

/// Window for the "recent activity" stat.
pub const RECENT_WINDOW_SECS: u64 = 300;

/// Default leaderboard length.
pub const DEFAULT_LEADERBOARD_SIZE: usize = 8;

/// Newest items considered for the activity-type mix.
pub const TYPE_MIX_WINDOW: usize = 20;

/// Sum of `U256` values. 512 bits cannot overflow for any realistic number of terms.
pub type Total = Uint<512, 8>;

fn widen(value: U256) -> Total {
    Total::from_be_slice(&value.to_be_bytes::<32>())
}

/// Count of activities per realm. Realms with no activity are absent.
pub fn realm_counts(items: &[Activity]) -> BTreeMap<u64, usize> {
    let mut counts = BTreeMap::new();
    for it in items {
        *counts.entry(it.realm).or_insert(0) += 1;
    }
    counts
}

/// Activities with `now - timestamp <= window_secs`. Timestamps ahead of `now` (publisher
/// clock skew) count as zero seconds old.
pub fn count_within(items: &[Activity], now: u64, window_secs: u64) -> usize {
    items
        .iter()
        .filter(|it| now.saturating_sub(it.timestamp) <= window_secs)
        .count()
}

/// Activities in the trailing 60 seconds of `now`.
pub fn throughput(items: &[Activity], now: u64) -> usize {
    count_within(items, now, THROUGHPUT_WINDOW_SECS)
}

/// Total activity value of one user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserTotal {
    pub user: String,
    #[serde(serialize_with = "serialize_total")]
    pub total: Total,
}

fn serialize_total<S: Serializer>(value: &Total, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.collect_str(value)
}

/// Per-user sums of `activity_value`, highest first; ties keep first-appearance order.
/// With `since`, only activities at or after that timestamp count.
pub fn user_totals(items: &[Activity], since: Option<u64>) -> Vec<UserTotal> {
    let mut index: HashMap<&str, usize> = HashMap::new();
    let mut totals: Vec<UserTotal> = Vec::new();
    for it in items
        .iter()
        .filter(|it| since.map_or(true, |s| it.timestamp >= s))
    {
        let slot = *index.entry(it.user.as_str()).or_insert_with(|| {
            totals.push(UserTotal {
                user: it.user.clone(),
                total: Total::ZERO,
            });
            totals.len() - 1
        });
        totals[slot].total += widen(it.activity_value);
    }
    // sort_by is stable
    totals.sort_by(|a, b| b.total.cmp(&a.total));
    totals
}

/// Top `limit` users by total value.
pub fn leaderboard(items: &[Activity], since: Option<u64>, limit: usize) -> Vec<UserTotal> {
    let mut totals = user_totals(items, since);
    totals.truncate(limit);
    totals
}

pub fn unique_users(items: &[Activity]) -> usize {
    items
        .iter()
        .map(|it| it.user.as_str())
        .collect::<HashSet<_>>()
        .len()
}

pub fn total_value(items: &[Activity]) -> Total {
    items
        .iter()
        .fold(Total::ZERO, |acc, it| acc + widen(it.activity_value))
}

/// Realm with the most activities, as `(realm, count)`. Ties go to the lowest realm.
pub fn dominant_realm(items: &[Activity]) -> Option<(u64, usize)> {
    realm_counts(items)
        .into_iter()
        .fold(None, |best: Option<(u64, usize)>, (realm, count)| match best {
            Some((_, best_count)) if best_count >= count => best,
            _ => Some((realm, count)),
        })
}

/// Activity types among the first `window` items (newest, for a sorted snapshot), in
/// first-seen order.
pub fn activity_type_mix(items: &[Activity], window: usize) -> Vec<(String, usize)> {
    let mut mix: Vec<(String, usize)> = Vec::new();
    for it in items.iter().take(window) {
        match mix.iter_mut().find(|(ty, _)| *ty == it.activity_type) {
            Some((_, count)) => *count += 1,
            None => mix.push((it.activity_type.clone(), 1)),
        }
    }
    mix
}

/// Summary numbers shown at the top of the dashboard.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DashboardStats {
    pub total: usize,
    pub throughput: usize,
    pub active_realms: usize,
    pub unique_users: usize,
    pub recent: usize,
    pub dominant_realm: Option<(u64, usize)>,
    #[serde(serialize_with = "serialize_total")]
    pub total_value: Total,
}

impl DashboardStats {
    pub fn compute(items: &[Activity], now: u64) -> Self {
        Self {
            total: items.len(),
            throughput: throughput(items, now),
            active_realms: realm_counts(items).len(),
            unique_users: unique_users(items),
            recent: count_within(items, now, RECENT_WINDOW_SECS),
            dominant_realm: dominant_realm(items),
            total_value: total_value(items),
        }
    }
}
