//! Simulated realm-wars traffic for running the pipeline without a chain.
//!
//! [SimulatedSource] plays a fixed bot schedule against its [Clock]: an `ENTER_REALM` every
//! 3 s, a `QUEST_COMPLETE` every 4 s and an `ATTACK_REALM` every 5 s, each from a random
//! player and realm. Every fetch returns the accumulated history in the keyed-object record
//! shape, so the poller decodes it like any other source.

use crate::activity::{Activity, ATTACK_REALM};
use crate::clock::Clock;
use crate::source::{EventSource, SourceError};
use alloy::primitives::U256;
use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

pub const SIMULATED_REALMS: [u64; 8] = [1, 2, 3, 4, 5, 6, 7, 8];

pub const SIMULATED_PLAYERS: [&str; 4] = [
    "0x891f0000000000000000000000000000000009ab",
    "0x3c2a0000000000000000000000000000000007de",
    "0x9f120000000000000000000000000000000004bc",
    "0x6e450000000000000000000000000000000001fa",
];

/// Value of an action that does not carry one.
pub const DEFAULT_ACTIVITY_VALUE: u64 = 100;

/// Oldest simulated activities are dropped past this many.
const HISTORY_LIMIT: usize = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GameActionKind {
    EnterRealm,
    QuestComplete,
    AttackRealm,
    ClaimBonus,
}

impl GameActionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            GameActionKind::EnterRealm => "ENTER_REALM",
            GameActionKind::QuestComplete => "QUEST_COMPLETE",
            GameActionKind::AttackRealm => ATTACK_REALM,
            GameActionKind::ClaimBonus => "CLAIM_BONUS",
        }
    }
}

/// Bot schedule: action kind and its period in seconds.
const SCHEDULE: [(GameActionKind, u64); 3] = [
    (GameActionKind::EnterRealm, 3),
    (GameActionKind::QuestComplete, 4),
    (GameActionKind::AttackRealm, 5),
];

/// A player action before it is published as an activity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GameAction {
    pub kind: GameActionKind,
    pub realm: u64,
    pub target_realm: Option<u64>,
    pub activity_value: Option<U256>,
    pub timestamp: u64,
    pub player: String,
}

impl GameAction {
    /// The activity the emitter publishes for this action.
    pub fn to_activity(&self) -> Activity {
        let activity_type = self.kind.as_str();
        Activity {
            user: self.player.clone(),
            activity_type: activity_type.to_string(),
            activity_context: format!("realm_war_{}", activity_type.to_lowercase()),
            activity_value: self
                .activity_value
                .unwrap_or(U256::from(DEFAULT_ACTIVITY_VALUE)),
            realm: self.realm,
            target_realm: self.target_realm.filter(|t| *t != 0),
            timestamp: self.timestamp,
            source_id: realm_wars_source_id(),
        }
    }
}

/// `"realm_wars"` as bytes32, right-padded with zeros.
pub fn realm_wars_source_id() -> String {
    format!("0x{:0<64}", hex::encode(b"realm_wars"))
}

struct SimState {
    rng: StdRng,
    started: u64,
    emitted: [u64; 3],
    history: VecDeque<Activity>,
}

pub struct SimulatedSource {
    clock: Arc<dyn Clock>,
    state: Mutex<SimState>,
}

impl SimulatedSource {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self::with_rng(clock, StdRng::from_entropy())
    }

    /// Reproducible traffic for a given seed.
    pub fn seeded(clock: Arc<dyn Clock>, seed: u64) -> Self {
        Self::with_rng(clock, StdRng::seed_from_u64(seed))
    }

    fn with_rng(clock: Arc<dyn Clock>, rng: StdRng) -> Self {
        let started = clock.now_secs();
        Self {
            clock,
            state: Mutex::new(SimState {
                rng,
                started,
                emitted: [0; 3],
                history: VecDeque::new(),
            }),
        }
    }

    /// Generate every action that fell due since the last call, oldest first.
    pub fn advance(&self) -> Vec<GameAction> {
        let now = self.clock.now_secs();
        let mut guard = self.state.lock().unwrap_or_else(|p| p.into_inner());
        let state = &mut *guard;
        let elapsed = now.saturating_sub(state.started);

        let mut due = Vec::new();
        for (slot, (kind, period)) in SCHEDULE.iter().enumerate() {
            while state.emitted[slot] < elapsed / period {
                state.emitted[slot] += 1;
                let timestamp = state.started + state.emitted[slot] * period;
                due.push(random_action(&mut state.rng, *kind, timestamp));
            }
        }
        due.sort_by_key(|a| a.timestamp);

        state.history.extend(due.iter().map(GameAction::to_activity));
        while state.history.len() > HISTORY_LIMIT {
            state.history.pop_front();
        }
        if !due.is_empty() {
            tracing::debug!(count = due.len(), "simulated actions");
        }
        due
    }
}

fn random_action(rng: &mut StdRng, kind: GameActionKind, timestamp: u64) -> GameAction {
    let n = SIMULATED_REALMS.len();
    let from = rng.gen_range(0..n);
    let target_realm = (kind == GameActionKind::AttackRealm)
        .then(|| SIMULATED_REALMS[(from + rng.gen_range(1..n)) % n]);
    let activity_value = (kind == GameActionKind::QuestComplete)
        .then(|| U256::from(rng.gen_range(50..150u64)));
    GameAction {
        kind,
        realm: SIMULATED_REALMS[from],
        target_realm,
        activity_value,
        timestamp,
        player: SIMULATED_PLAYERS[rng.gen_range(0..SIMULATED_PLAYERS.len())].to_string(),
    }
}

#[async_trait]
impl EventSource for SimulatedSource {
    async fn fetch(&self, _schema_id: &[u8; 32], _publisher: &[u8; 20]) -> Result<Vec<Value>, SourceError> {
        self.advance();
        let state = self.state.lock().unwrap_or_else(|p| p.into_inner());
        state
            .history
            .iter()
            .map(serde_json::to_value)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| SourceError::Decode(e.to_string()))
    }
}
