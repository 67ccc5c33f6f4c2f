//! Live activity pipeline for schema-encoded on-chain data streams.
//!
//! - **Source** ([EventSource], [StreamsRpcSource]): fetches every record a publisher wrote
//!   under a schema (JSON-RPC `eth_call` + schema ABI decoding).
//! - **Decoder** ([decode_activity]): normalizes raw records into [Activity]; never fails,
//!   malformed fields fall back to defaults.
//! - **Poller** ([ActivityPoller]): refreshes a bounded newest-first snapshot on a fixed
//!   interval, keeps the last good snapshot on failure, emits [LiveEvent]s for new activity.
//! - **Aggregator** ([aggregate]): pure views over a snapshot (per-realm counts, trailing
//!   throughput, per-user totals and rankings, dashboard stats).
//! - **Simulator** ([SimulatedSource]): bot traffic on a fixed schedule for demos and tests.

pub mod activity;
pub mod aggregate;
pub mod clock;
pub mod config;
pub mod decode;
pub mod poller;
pub mod publish;
pub mod schema;
pub mod simulate;
pub mod source;

pub use activity::{Activity, ATTACK_REALM, ZERO_ADDRESS, ZERO_SOURCE_ID};
pub use aggregate::{
    leaderboard, realm_counts, throughput, user_totals, DashboardStats, Total, UserTotal,
};
pub use clock::{Clock, FixedClock, SystemClock};
pub use config::{ConfigError, PollerConfig, SourceConfig};
pub use decode::{decode_activity, decode_batch};
pub use poller::{ActivityPoller, LiveEvent, PollerHandle, Snapshot};
pub use publish::{ActivityPublisher, PublishError, PublisherConfig, Signer};
pub use schema::{Schema, SchemaError, ACTIVITY_SCHEMA};
pub use simulate::{GameAction, GameActionKind, SimulatedSource};
pub use source::{EventSource, SourceError, StreamsRpcSource};
