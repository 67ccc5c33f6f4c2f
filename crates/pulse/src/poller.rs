//! ActivityPoller: keeps a bounded, newest-first snapshot of a publisher's activity stream.
//!
//! Each cycle fetches every record for the configured `(schema, publisher)`, decodes them,
//! sorts by timestamp descending, truncates to `max_items` and replaces the snapshot in one
//! assignment. A failed fetch keeps the previous snapshot and sets the last-error signal.
//! Records missing from a later response disappear from the snapshot.

use crate::activity::Activity;
use crate::aggregate::{self, DashboardStats};
use crate::clock::{Clock, SystemClock};
use crate::config::PollerConfig;
use crate::decode::decode_batch;
use crate::source::{EventSource, SourceError};
use serde_json::Value;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};

/// Immutable view of the current activities, newest first.
pub type Snapshot = Arc<Vec<Activity>>;

/// Signals for consumers that react to new activity (animations, notifications).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LiveEvent {
    /// A newly observed directed attack.
    RealmAttack { from: u64, to: u64, user: String },
    /// Any other newly observed activity.
    Pulse { realm: u64, activity_type: String },
    /// The snapshot was replaced.
    Refreshed { count: usize },
}

pub struct ActivityPoller {
    config: PollerConfig,
    source: Arc<dyn EventSource>,
    clock: Arc<dyn Clock>,
    snapshot_tx: watch::Sender<Snapshot>,
    error_tx: watch::Sender<Option<String>>,
    event_tx: broadcast::Sender<LiveEvent>,
}

impl ActivityPoller {
    pub fn new(config: PollerConfig, source: Arc<dyn EventSource>) -> Self {
        Self::with_clock(config, source, Arc::new(SystemClock))
    }

    pub fn with_clock(
        config: PollerConfig,
        source: Arc<dyn EventSource>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let (snapshot_tx, _) = watch::channel(Arc::new(Vec::new()));
        let (error_tx, _) = watch::channel(None);
        let (event_tx, _) = broadcast::channel(256);
        Self {
            config,
            source,
            clock,
            snapshot_tx,
            error_tx,
            event_tx,
        }
    }

    /// Subscribe to live events for activities first seen after the initial load.
    pub fn subscribe(&self) -> broadcast::Receiver<LiveEvent> {
        self.event_tx.subscribe()
    }

    pub fn snapshot(&self) -> Snapshot {
        self.snapshot_tx.borrow().clone()
    }

    pub fn watch_snapshot(&self) -> watch::Receiver<Snapshot> {
        self.snapshot_tx.subscribe()
    }

    /// Message of the last failed cycle; `None` once a cycle succeeds.
    pub fn last_error(&self) -> Option<String> {
        self.error_tx.borrow().clone()
    }

    pub fn watch_last_error(&self) -> watch::Receiver<Option<String>> {
        self.error_tx.subscribe()
    }

    pub fn realm_counts(&self) -> BTreeMap<u64, usize> {
        aggregate::realm_counts(&self.snapshot())
    }

    /// Activities in the last 60 seconds of the poller's clock.
    pub fn throughput(&self) -> usize {
        aggregate::throughput(&self.snapshot(), self.clock.now_secs())
    }

    pub fn stats(&self) -> DashboardStats {
        DashboardStats::compute(&self.snapshot(), self.clock.now_secs())
    }

    /// Run one fetch-decode-replace cycle. Returns the snapshot length afterwards.
    pub async fn poll_once(&self) -> Result<usize, SourceError> {
        match self.fetch().await {
            Ok(raw) => Ok(self.apply(raw)),
            Err(e) => {
                self.record_error(&e);
                Err(e)
            }
        }
    }

    /// Start polling: one cycle now, then one per `poll_interval`.
    pub fn spawn(self: Arc<Self>) -> PollerHandle {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(run(self, shutdown_rx));
        PollerHandle {
            shutdown_tx,
            task: Some(task),
        }
    }

    async fn fetch(&self) -> Result<Vec<Value>, SourceError> {
        self.source
            .fetch(&self.config.schema_id, &self.config.publisher)
            .await
    }

    fn apply(&self, raw: Vec<Value>) -> usize {
        if raw.is_empty() {
            // Nothing returned: keep showing the last known activities.
            self.clear_error();
            return self.snapshot_tx.borrow().len();
        }
        let mut batch = decode_batch(&raw);
        batch.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        batch.truncate(self.config.max_items);

        let next: Snapshot = Arc::new(batch);
        let previous = self.snapshot_tx.send_replace(Arc::clone(&next));
        self.clear_error();
        self.announce(&previous, &next);
        tracing::debug!(count = next.len(), raw_count = raw.len(), "snapshot replaced");
        next.len()
    }

    fn announce(&self, previous: &[Activity], next: &[Activity]) {
        if !previous.is_empty() {
            let seen: HashSet<_> = previous.iter().map(Activity::observation_key).collect();
            // Oldest first, so consumers replay in chronological order.
            for it in next.iter().rev() {
                if seen.contains(&it.observation_key()) {
                    continue;
                }
                let event = match it.target_realm {
                    Some(to) if it.is_attack() => LiveEvent::RealmAttack {
                        from: it.realm,
                        to,
                        user: it.user.clone(),
                    },
                    _ => LiveEvent::Pulse {
                        realm: it.realm,
                        activity_type: it.activity_type.clone(),
                    },
                };
                let _ = self.event_tx.send(event);
            }
        }
        let _ = self.event_tx.send(LiveEvent::Refreshed { count: next.len() });
    }

    fn record_error(&self, e: &SourceError) {
        tracing::warn!(reason = %e, "activity poll failed, keeping last snapshot");
        self.error_tx
            .send_replace(Some(format!("failed to load activities: {}", e)));
    }

    fn clear_error(&self) {
        self.error_tx.send_if_modified(|current| current.take().is_some());
    }
}

async fn run(poller: Arc<ActivityPoller>, mut shutdown: watch::Receiver<bool>) {
    let period = poller.config.poll_interval.max(Duration::from_millis(1));
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    tracing::info!(interval_ms = period.as_millis() as u64, "activity poller started");
    loop {
        tokio::select! {
            biased;
            _ = shutdown.changed() => break,
            _ = ticker.tick() => {}
        }
        if *shutdown.borrow() {
            break;
        }
        let fetched = tokio::select! {
            biased;
            _ = shutdown.changed() => break,
            r = poller.fetch() => r,
        };
        if *shutdown.borrow() {
            tracing::debug!("poller stopped mid-cycle, result discarded");
            break;
        }
        match fetched {
            Ok(raw) => {
                poller.apply(raw);
            }
            Err(e) => poller.record_error(&e),
        }
    }
    tracing::info!("activity poller stopped");
}

/// Owns the polling task. Dropping the handle stops it.
pub struct PollerHandle {
    shutdown_tx: watch::Sender<bool>,
    task: Option<JoinHandle<()>>,
}

impl PollerHandle {
    /// Request stop. No fetch starts after the task observes this, and an in-flight fetch is
    /// dropped without touching the snapshot.
    pub fn stop(&self) {
        self.shutdown_tx.send_replace(true);
    }

    /// Stop and wait for the task to exit.
    pub async fn shutdown(mut self) {
        self.stop();
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }

    pub fn is_finished(&self) -> bool {
        self.task.as_ref().map_or(true, JoinHandle::is_finished)
    }
}

impl Drop for PollerHandle {
    fn drop(&mut self) {
        self.stop();
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}
