//! Example: poll a publisher's activity stream and print dashboard stats and live events.
//!
//! Usage: cargo run -p pulse --example live_dashboard -- --http-url URL --streams 0x... \
//!            --schema-id 0x... --publisher 0x... [--interval SECS]
//!
//! Any flag left out falls back to the matching `PULSE_*` environment variable.
//! With `--simulate`, bot traffic replaces the chain and no other flag is needed.

use pulse::aggregate::DEFAULT_LEADERBOARD_SIZE;
use pulse::config::DEFAULT_POLL_INTERVAL;
use pulse::{
    config, leaderboard, ActivityPoller, EventSource, LiveEvent, PollerConfig, SimulatedSource,
    StreamsRpcSource, SystemClock,
};
use std::collections::HashMap;
use std::sync::Arc;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("pulse=info")),
        )
        .init();

    let args: Vec<String> = std::env::args().collect();
    let mut overrides: HashMap<&'static str, String> = HashMap::new();
    let mut simulate = false;
    let mut i = 1;
    while i < args.len() {
        let key = match args[i].as_str() {
            "--http-url" => "PULSE_RPC_URL",
            "--streams" => "PULSE_STREAMS_ADDRESS",
            "--schema-id" => "PULSE_SCHEMA_ID",
            "--publisher" => "PULSE_PUBLISHER",
            "--interval" => "PULSE_POLL_INTERVAL_SECS",
            "--simulate" => {
                simulate = true;
                i += 1;
                continue;
            }
            "--help" | "-h" => {
                eprintln!(
                    "Usage: live_dashboard --http-url URL --streams 0xADDR --schema-id 0xID \
                     --publisher 0xADDR [--interval SECS]\n       live_dashboard --simulate [--interval SECS]"
                );
                std::process::exit(0);
            }
            _ => {
                i += 1;
                continue;
            }
        };
        i += 1;
        overrides.insert(key, args.get(i).cloned().unwrap_or_default());
        i += 1;
    }

    let (source, poller_config): (Arc<dyn EventSource>, PollerConfig) = if simulate {
        let mut poller_config = PollerConfig::new([0u8; 32], [0u8; 20]);
        poller_config.poll_interval = match overrides.get("PULSE_POLL_INTERVAL_SECS") {
            Some(secs) => std::time::Duration::from_secs(secs.parse()?),
            None => DEFAULT_POLL_INTERVAL,
        };
        let source: Arc<dyn EventSource> = Arc::new(SimulatedSource::new(Arc::new(SystemClock)));
        (source, poller_config)
    } else {
        let (source_config, poller_config) = match config::from_lookup(|name| {
            overrides
                .get(name)
                .cloned()
                .or_else(|| std::env::var(name).ok())
        }) {
            Ok(c) => c,
            Err(e) => {
                eprintln!("configuration: {}", e);
                std::process::exit(1);
            }
        };
        let source: Arc<dyn EventSource> = Arc::new(StreamsRpcSource::new(source_config)?);
        (source, poller_config)
    };

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(async move {
        let poller = Arc::new(ActivityPoller::new(poller_config, source));
        let mut events = poller.subscribe();
        let mut errors = poller.watch_last_error();
        let handle = Arc::clone(&poller).spawn();

        loop {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => break,
                ev = events.recv() => match ev {
                    Ok(LiveEvent::Refreshed { count }) => {
                        let stats = poller.stats();
                        println!("{} activities: {}", count, serde_json::to_string(&stats)?);
                        for (rank, entry) in leaderboard(&poller.snapshot(), None, DEFAULT_LEADERBOARD_SIZE)
                            .iter()
                            .enumerate()
                        {
                            println!("  #{} {} {}", rank + 1, entry.user, entry.total);
                        }
                    }
                    Ok(LiveEvent::RealmAttack { from, to, user }) => {
                        println!("attack realm {} -> {} by {}", from, to, user);
                    }
                    Ok(LiveEvent::Pulse { realm, activity_type }) => {
                        println!("realm {}: {}", realm, activity_type);
                    }
                    Err(e) => tracing::warn!(error = %e, "event stream lagged"),
                },
                changed = errors.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    if let Some(err) = errors.borrow_and_update().clone() {
                        println!("poll failed, showing last snapshot: {}", err);
                    }
                }
            }
        }

        handle.shutdown().await;
        Ok::<_, Box<dyn std::error::Error>>(())
    })
}
