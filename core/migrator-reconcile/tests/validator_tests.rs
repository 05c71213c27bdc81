mod common;

use common::{
    FlakyPool, Item, RecordingProducer, SlowPool, fast_config, init_tracing, insert, stores,
};
use migrator_db::{ConnPool, Value};
use migrator_reconcile::{
    MIN_SLEEP_INTERVAL, OverrideFixer, Validator, ValidatorConfig, cancel_pair,
};
use migrator_types::{Direction, InconsistencyType, InconsistentEvent};
use pretty_assertions::assert_eq;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::{Duration, Instant};

fn validator(
    base: Arc<dyn ConnPool>,
    target: Arc<dyn ConnPool>,
    producer: Arc<RecordingProducer>,
    config: ValidatorConfig,
) -> Validator<Item> {
    Validator::with_config(base, target, Direction::ToTarget, producer, config)
}

async fn run_once(
    base: Arc<dyn ConnPool>,
    target: Arc<dyn ConnPool>,
    config: ValidatorConfig,
) -> Vec<InconsistentEvent> {
    let producer = Arc::new(RecordingProducer::default());
    let v = validator(base, target, producer.clone(), config);
    let (_handle, token) = cancel_pair();
    v.validate(&token).await.unwrap();
    producer.events()
}

fn evt(id: i64, kind: InconsistencyType) -> InconsistentEvent {
    InconsistentEvent::new(id, Direction::ToTarget, kind)
}

// ── Detection ───────────────────────────────────────────────────

#[tokio::test]
async fn empty_stores_report_nothing() {
    let (src, dst) = stores();
    assert!(run_once(src, dst, fast_config()).await.is_empty());
}

#[tokio::test]
async fn equal_rows_report_nothing() {
    let (src, dst) = stores();
    for id in 1..=5 {
        insert(&src, id, "same", 100);
        insert(&dst, id, "same", 100);
    }
    assert!(run_once(src, dst, fast_config()).await.is_empty());
}

#[tokio::test]
async fn row_missing_from_target() {
    init_tracing();
    let (src, dst) = stores();
    insert(&src, 1, "only-in-base", 100);
    let events = run_once(src, dst, fast_config()).await;
    assert_eq!(events, vec![evt(1, InconsistencyType::TargetMissing)]);
}

#[tokio::test]
async fn row_missing_from_base() {
    let (src, dst) = stores();
    insert(&dst, 2, "only-in-target", 100);
    let events = run_once(src, dst, fast_config()).await;
    assert_eq!(events, vec![evt(2, InconsistencyType::BaseMissing)]);
}

#[tokio::test]
async fn differing_rows_report_not_equal_only() {
    let (src, dst) = stores();
    insert(&src, 3, "new name", 100);
    insert(&dst, 3, "old name", 100);
    let events = run_once(src, dst, fast_config()).await;
    assert_eq!(events, vec![evt(3, InconsistencyType::NotEqual)]);
}

#[tokio::test]
async fn watermark_excludes_older_rows() {
    let (src, dst) = stores();
    insert(&src, 1, "old", 50);
    insert(&dst, 2, "old", 50);
    insert(&src, 3, "fresh", 150);
    let events = run_once(src, dst, fast_config().with_utime(100)).await;
    assert_eq!(events, vec![evt(3, InconsistencyType::TargetMissing)]);
}

#[tokio::test]
async fn events_carry_validator_direction() {
    let (src, dst) = stores();
    insert(&dst, 4, "x", 1);
    let producer = Arc::new(RecordingProducer::default());
    let v: Validator<Item> = Validator::with_config(
        src,
        dst,
        Direction::ToBase,
        producer.clone(),
        fast_config(),
    );
    let (_handle, token) = cancel_pair();
    v.validate(&token).await.unwrap();
    assert_eq!(
        producer.events(),
        vec![InconsistentEvent::new(
            4,
            Direction::ToBase,
            InconsistencyType::BaseMissing
        )]
    );
}

#[tokio::test]
async fn target_scan_pages_through_every_batch() {
    let (src, dst) = stores();
    for id in 1..=25 {
        insert(&dst, id, "orphan", 10);
    }
    for id in 26..=30 {
        insert(&src, id, "shared", 10);
        insert(&dst, id, "shared", 10);
    }
    let events = run_once(src, dst, fast_config().with_batch_size(7)).await;
    let ids: Vec<i64> = events.iter().map(|e| e.id).collect();
    assert_eq!(ids, (1..=25).collect::<Vec<_>>());
    assert!(events.iter().all(|e| e.kind == InconsistencyType::BaseMissing));
}

// ── Repair convergence ──────────────────────────────────────────

#[tokio::test]
async fn fixed_events_do_not_reappear() {
    let (src, dst) = stores();
    insert(&src, 1, "missing", 100);
    insert(&src, 2, "changed", 100);
    insert(&dst, 2, "stale", 90);
    insert(&dst, 3, "orphan", 100);
    insert(&src, 4, "same", 100);
    insert(&dst, 4, "same", 100);

    let events = run_once(src.clone(), dst.clone(), fast_config()).await;
    assert_eq!(
        events,
        vec![
            evt(1, InconsistencyType::TargetMissing),
            evt(2, InconsistencyType::NotEqual),
            evt(3, InconsistencyType::BaseMissing),
        ]
    );

    let fixer = OverrideFixer::<Item>::new(src.clone(), dst.clone()).unwrap();
    for e in &events {
        fixer.fix(e).await.unwrap();
    }
    assert_eq!(common::all_items(&src), common::all_items(&dst));

    assert!(run_once(src.clone(), dst.clone(), fast_config()).await.is_empty());
    // Id 3 was deleted from target, so it is gone from later scans too.
    assert!(
        dst.query_row("SELECT * FROM items WHERE id = ?1", &[Value::Integer(3)])
            .unwrap_err()
            .is_not_found()
    );
}

// ── Failure handling ────────────────────────────────────────────

#[tokio::test]
async fn transient_failures_are_retried_without_skipping() {
    init_tracing();
    let (src, dst) = stores();
    insert(&src, 1, "a", 100);
    insert(&src, 2, "b", 100);
    let flaky = FlakyPool::new(src, 3);
    let events = run_once(flaky.clone(), dst, fast_config()).await;
    assert_eq!(
        events,
        vec![
            evt(1, InconsistencyType::TargetMissing),
            evt(2, InconsistencyType::TargetMissing),
        ]
    );
    assert!(flaky.calls.load(Ordering::SeqCst) > 3);
}

// ── Continuous mode ─────────────────────────────────────────────

#[tokio::test]
async fn continuous_run_picks_up_later_changes_until_cancelled() {
    let (src, dst) = stores();
    let producer = Arc::new(RecordingProducer::default());
    let v = validator(
        src.clone(),
        dst,
        producer.clone(),
        fast_config().with_sleep_interval(MIN_SLEEP_INTERVAL),
    );
    let (handle, token) = cancel_pair();
    let run = tokio::spawn(async move { v.validate(&token).await });

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(producer.events().is_empty());

    insert(&src, 9, "late", 500);
    let events = producer.wait_for(1).await;
    assert_eq!(events[0], evt(9, InconsistencyType::TargetMissing));

    handle.cancel();
    let finished = tokio::time::timeout(Duration::from_secs(2), run).await;
    assert!(finished.expect("run stops after cancel").unwrap().is_ok());
}

#[tokio::test]
async fn dropping_the_handle_stops_a_continuous_run() {
    let (src, dst) = stores();
    let v = validator(
        src,
        dst,
        Arc::new(RecordingProducer::default()),
        fast_config().with_sleep_interval(Duration::from_secs(30)),
    );
    let (handle, token) = cancel_pair();
    let run = tokio::spawn(async move { v.validate(&token).await });
    tokio::time::sleep(Duration::from_millis(20)).await;
    drop(handle);
    assert!(
        tokio::time::timeout(Duration::from_secs(2), run)
            .await
            .is_ok()
    );
}

// ── Configuration ───────────────────────────────────────────────

#[test]
fn defaults() {
    let c = ValidatorConfig::default();
    assert_eq!(c.batch_size, 100);
    assert_eq!(c.utime, 0);
    assert_eq!(c.query_timeout, Duration::from_secs(1));
    assert!(!c.is_continuous());
}

#[test]
fn short_intervals_are_clamped() {
    let c = ValidatorConfig::default().with_sleep_interval(Duration::from_millis(10));
    assert_eq!(c.sleep_interval, MIN_SLEEP_INTERVAL);
    let c = c.with_sleep_interval(Duration::ZERO);
    assert!(!c.is_continuous());
    let c = c.with_sleep_interval(Duration::from_secs(3));
    assert_eq!(c.sleep_interval, Duration::from_secs(3));
}

#[test]
fn validator_normalizes_raw_config() {
    let (src, dst) = stores();
    let raw = ValidatorConfig {
        batch_size: 0,
        sleep_interval: Duration::from_millis(1),
        ..ValidatorConfig::default()
    };
    let v = validator(src, dst, Arc::new(RecordingProducer::default()), raw);
    assert_eq!(v.config().batch_size, 1);
    assert_eq!(v.config().sleep_interval, MIN_SLEEP_INTERVAL);
    assert_eq!(v.direction(), Direction::ToTarget);
}

// ── Per-call time limit ──────────────────────────────────────────

#[tokio::test]
async fn stuck_query_times_out_and_retries_the_same_row() {
    init_tracing();
    let (src, dst) = stores();
    insert(&src, 1, "a", 100);
    let slow = SlowPool::new(src, Duration::from_secs(1));
    let producer = Arc::new(RecordingProducer::default());
    let config = fast_config().with_query_timeout(Duration::from_millis(50));
    let v = validator(slow.clone(), dst, producer.clone(), config);
    let (_handle, token) = cancel_pair();
    let run = tokio::spawn(async move { v.validate(&token).await });

    tokio::time::sleep(Duration::from_millis(300)).await;
    assert!(slow.calls.load(Ordering::SeqCst) >= 2);
    assert!(producer.events().is_empty());

    // Once the store answers again, the row that kept timing out is reported.
    slow.release();
    let finished = tokio::time::timeout(Duration::from_secs(2), run).await;
    assert!(finished.expect("run completes").unwrap().is_ok());
    assert_eq!(
        producer.events(),
        vec![evt(1, InconsistencyType::TargetMissing)]
    );
}

#[tokio::test]
async fn cancel_is_not_held_up_by_a_stuck_query() {
    let (src, dst) = stores();
    insert(&src, 1, "a", 100);
    let slow = SlowPool::new(src, Duration::from_secs(1));
    let config = fast_config().with_query_timeout(Duration::from_secs(5));
    let v = validator(slow.clone(), dst, Arc::new(RecordingProducer::default()), config);
    let (handle, token) = cancel_pair();
    let run = tokio::spawn(async move { v.validate(&token).await });

    tokio::time::sleep(Duration::from_millis(50)).await;
    let cancelled_at = Instant::now();
    handle.cancel();
    let finished = tokio::time::timeout(Duration::from_millis(500), run).await;
    assert!(finished.expect("cancel ends the run").unwrap().is_ok());
    assert!(cancelled_at.elapsed() < Duration::from_millis(500));
}
