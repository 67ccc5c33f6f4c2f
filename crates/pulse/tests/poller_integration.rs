//! Integration test: ActivityPoller lifecycle against a scripted event source.

mod common;

use common::{init_tracing, sdk_record, SpySource};
use pulse::{user_totals, ActivityPoller, LiveEvent, PollerConfig};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, timeout};

const INTERVAL: Duration = Duration::from_secs(10);

fn config() -> PollerConfig {
    PollerConfig::new([7u8; 32], [9u8; 20])
}

#[tokio::test(start_paused = true)]
async fn polls_on_interval_and_stops_cleanly() {
    init_tracing();
    let source = SpySource::new(vec![Ok(vec![sdk_record("0xA", "login", "1", 1, 100)])]).shared();
    let poller = Arc::new(ActivityPoller::new(config(), source.clone()));
    let handle = Arc::clone(&poller).spawn();

    sleep(Duration::from_millis(100)).await;
    assert_eq!(source.calls(), 1, "first cycle runs immediately");
    assert_eq!(poller.snapshot().len(), 1);

    sleep(INTERVAL).await;
    assert_eq!(source.calls(), 2);

    handle.stop();
    sleep(INTERVAL * 3).await;
    assert_eq!(source.calls(), 2, "no fetch after stop");
    assert!(handle.is_finished());
    handle.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn in_flight_result_is_discarded_after_stop() {
    init_tracing();
    let source = SpySource::new(vec![Ok(vec![sdk_record("0xA", "login", "1", 1, 100)])])
        .with_delay(Duration::from_secs(5))
        .shared();
    let poller = Arc::new(ActivityPoller::new(config(), source.clone()));
    let handle = Arc::clone(&poller).spawn();

    sleep(Duration::from_secs(1)).await;
    assert_eq!(source.calls(), 1);
    handle.stop();

    sleep(INTERVAL * 2).await;
    assert_eq!(source.calls(), 1);
    assert!(poller.snapshot().is_empty(), "stopped cycle must not publish");
    assert_eq!(poller.last_error(), None);
    handle.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn failed_cycle_keeps_last_good_snapshot() {
    init_tracing();
    let source = SpySource::new(vec![
        Ok(vec![
            sdk_record("0xA", "login", "10", 1, 100),
            sdk_record("0xB", "login", "5", 2, 200),
        ]),
        Err("rpc unavailable".into()),
        Ok(vec![sdk_record("0xC", "login", "1", 3, 300)]),
    ])
    .shared();
    let poller = Arc::new(ActivityPoller::new(config(), source.clone()));
    let mut errors = poller.watch_last_error();
    let handle = Arc::clone(&poller).spawn();

    sleep(Duration::from_millis(100)).await;
    let good = poller.snapshot();
    assert_eq!(good.len(), 2);
    assert_eq!(good[0].user, "0xB");
    assert_eq!(poller.last_error(), None);

    sleep(INTERVAL).await;
    assert_eq!(source.calls(), 2);
    assert!(Arc::ptr_eq(&poller.snapshot(), &good));
    assert!(errors.has_changed().unwrap());
    let err = errors.borrow_and_update().clone().expect("error signal set");
    assert!(err.contains("rpc unavailable"), "{}", err);

    sleep(INTERVAL).await;
    assert_eq!(source.calls(), 3);
    assert_eq!(poller.last_error(), None);
    let users: Vec<String> = poller.snapshot().iter().map(|a| a.user.clone()).collect();
    // Replaced wholesale: earlier records are gone.
    assert_eq!(users, vec!["0xC".to_string()]);

    handle.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn dropping_handle_stops_polling() {
    let source = SpySource::new(vec![Ok(vec![sdk_record("0xA", "login", "1", 1, 100)])]).shared();
    let poller = Arc::new(ActivityPoller::new(config(), source.clone()));
    let handle = Arc::clone(&poller).spawn();

    sleep(Duration::from_millis(100)).await;
    drop(handle);
    sleep(INTERVAL * 3).await;
    assert_eq!(source.calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn consumers_see_snapshots_and_live_events() {
    init_tracing();
    let source = SpySource::new(vec![
        Ok(vec![sdk_record("0xA", "login", "1", 1, 100)]),
        Ok(vec![
            sdk_record("0xA", "login", "1", 1, 100),
            sdk_record("0xB", "QUEST_COMPLETE", "75", 4, 110),
        ]),
    ])
    .shared();
    let poller = Arc::new(ActivityPoller::new(config(), source.clone()));
    let mut snapshots = poller.watch_snapshot();
    let mut events = poller.subscribe();
    let handle = Arc::clone(&poller).spawn();

    timeout(Duration::from_secs(1), snapshots.changed())
        .await
        .expect("first snapshot")
        .unwrap();
    assert_eq!(snapshots.borrow_and_update().len(), 1);
    assert_eq!(events.recv().await.unwrap(), LiveEvent::Refreshed { count: 1 });

    let ev = timeout(INTERVAL * 2, events.recv()).await.expect("second cycle").unwrap();
    assert_eq!(
        ev,
        LiveEvent::Pulse {
            realm: 4,
            activity_type: "QUEST_COMPLETE".into()
        }
    );
    assert_eq!(events.recv().await.unwrap(), LiveEvent::Refreshed { count: 2 });

    handle.shutdown().await;
}

#[tokio::test]
async fn rankings_keep_full_precision() {
    let source = SpySource::new(vec![Ok(vec![
        sdk_record("0xA", "QUEST_COMPLETE", "123456789012345678901234567890", 1, 100),
        sdk_record("0xB", "QUEST_COMPLETE", "5", 2, 101),
        sdk_record("0xA", "login", "1", 1, 102),
    ])])
    .shared();
    let poller = ActivityPoller::new(config(), source);
    tokio_test::assert_ok!(poller.poll_once().await);

    let totals = user_totals(&poller.snapshot(), None);
    assert_eq!(totals.len(), 2);
    assert_eq!(totals[0].user, "0xA");
    assert_eq!(totals[0].total.to_string(), "123456789012345678901234567891");
    assert_eq!(totals[1].user, "0xB");
}

#[tokio::test(start_paused = true)]
async fn failed_cycle_is_signalled_on_error_watch_only() {
    init_tracing();
    let source = SpySource::new(vec![
        Ok(vec![sdk_record("0xA", "login", "1", 1, 100)]),
        Err("gateway timeout".into()),
    ])
    .shared();
    let poller = Arc::new(ActivityPoller::new(config(), source.clone()));
    let mut events = poller.subscribe();
    let mut errors = poller.watch_last_error();
    let handle = Arc::clone(&poller).spawn();

    assert_eq!(events.recv().await.unwrap(), LiveEvent::Refreshed { count: 1 });
    assert!(!errors.has_changed().unwrap());

    timeout(INTERVAL * 2, errors.changed())
        .await
        .expect("failed cycle signalled")
        .unwrap();
    let err = errors.borrow_and_update().clone().expect("error set");
    assert!(err.contains("gateway timeout"), "{}", err);
    // A failed cycle announces nothing, so consumers must watch the error signal.
    assert!(events.try_recv().is_err());
    assert_eq!(poller.snapshot().len(), 1);

    handle.shutdown().await;
}
