//! End-to-end expiration runs against a real SQLite store.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use trove_domain::traits::RemovalObserver;
use trove_domain::{Action, RecordId, RemovalEvent, SizeClass, Status, VisitKind, MSECS_PER_DAY};
use trove_expiration::{Expiration, ExpirationConfig, ExpirationService, NullMetrics};
use trove_store::{NewRecord, SqliteStore};

fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

fn days_ago(days: i64) -> i64 {
    now_ms() - days * MSECS_PER_DAY
}

fn store() -> SqliteStore {
    SqliteStore::new(":memory:").unwrap()
}

/// A configuration whose capacity limit is zero, so any record puts the
/// store over its limit.
fn zero_capacity() -> ExpirationConfig {
    ExpirationConfig {
        max_records: 0,
        ..Default::default()
    }
}

fn controller(store: SqliteStore, config: ExpirationConfig) -> Expiration<SqliteStore> {
    let mut expiration = Expiration::new(store, config);
    expiration.setup().unwrap();
    expiration
}

/// Adds `count` records, each with one link visit at `visit_at`.
fn populate_visited(store: &mut SqliteStore, count: usize, visit_at: i64) -> Vec<RecordId> {
    (0..count)
        .map(|i| {
            let id = store
                .add_record(&NewRecord::new(format!("https://example.com/{i}")))
                .unwrap();
            store.add_visit(id, visit_at, VisitKind::Link).unwrap();
            id
        })
        .collect()
}

#[test]
fn test_unbounded_pass_empties_old_history() {
    let mut store = store();
    populate_visited(&mut store, 3, days_ago(30));
    // An orphan record with no visits at all.
    store.add_record(&NewRecord::new("https://orphan.example/")).unwrap();

    let mut expiration = controller(store, zero_capacity());
    let outcome = expiration.debug_expire(-1).unwrap();
    assert_eq!(outcome.events.len(), 4);
    assert!(outcome.events.iter().all(|e| e.whole_record));

    assert_eq!(expiration.store().visit_count().unwrap(), 0);
    assert_eq!(expiration.record_count(), 0);

    // A second pass finds nothing left to do.
    let outcome = expiration.debug_expire(-1).unwrap();
    assert!(outcome.events.is_empty());
}

#[test]
fn test_debug_limit_caps_each_operation() {
    let mut store = store();
    populate_visited(&mut store, 10, days_ago(30));

    let mut expiration = controller(store, zero_capacity());
    let outcome = expiration.debug_expire(5).unwrap();

    assert_eq!(outcome.events.len(), 5);
    assert_eq!(expiration.store().visit_count().unwrap(), 5);
    assert_eq!(expiration.record_count(), 5);
    // The finder filled its limit, so the store is known dirty.
    assert_eq!(expiration.status(), Status::Dirty);
}

#[test]
fn test_debug_limit_zero_still_cleans_orphan_artifacts() {
    let mut store = store();
    populate_visited(&mut store, 1, days_ago(30));
    // Artifacts pointing at a record that no longer exists.
    store.add_icon(RecordId::new(999), days_ago(10)).unwrap();

    let mut expiration = controller(store, zero_capacity());
    expiration.debug_expire(0).unwrap();

    // Size-gated operations removed nothing.
    assert_eq!(expiration.store().visit_count().unwrap(), 1);
    assert_eq!(expiration.record_count(), 1);
    // Unconditional orphan cleanup still ran.
    assert_eq!(expiration.store().icon_count().unwrap(), 0);
}

#[test]
fn test_foreign_references_protect_the_record() {
    let mut store = store();
    let id = store
        .add_record(&NewRecord {
            foreign_count: 1,
            ..NewRecord::new("https://pinned.example/")
        })
        .unwrap();
    store.add_visit(id, days_ago(30), VisitKind::Link).unwrap();

    let mut expiration = controller(store, zero_capacity());
    let outcome = expiration.debug_expire(-1).unwrap();

    // The visit expired, the record survives its orphaning.
    assert_eq!(expiration.store().visit_count().unwrap(), 0);
    assert!(expiration.store().get_record(id).unwrap().is_some());
    assert_eq!(outcome.events.len(), 1);
    assert!(!outcome.events[0].whole_record);
    assert!(outcome.events[0].partial_removal);
}

#[test]
fn test_recent_visits_keep_the_record_alive() {
    let mut store = store();
    let id = store.add_record(&NewRecord::new("https://example.com/")).unwrap();
    store.add_visit(id, days_ago(30), VisitKind::Link).unwrap();
    let fresh = days_ago(0);
    store.add_visit(id, fresh, VisitKind::Link).unwrap();

    let mut expiration = controller(store, zero_capacity());
    expiration.debug_expire(-1).unwrap();

    // Only the visit past the protection window expired.
    let visits = expiration.store().get_visits(id).unwrap();
    assert_eq!(visits.len(), 1);
    assert_eq!(visits[0].visit_at, fresh);
    assert!(expiration.store().get_record(id).unwrap().is_some());
}

#[test]
fn test_old_downloads_expire_as_exotic() {
    let mut store = store();
    let id = store.add_record(&NewRecord::new("https://example.com/file")).unwrap();
    store.add_visit(id, days_ago(100), VisitKind::Download).unwrap();
    store.add_visit(id, days_ago(30), VisitKind::Download).unwrap();
    // Keeps the record alive and under its capacity limit.
    store.add_visit(id, days_ago(0), VisitKind::Link).unwrap();

    // Default capacity, so no pressure-based expiration interferes.
    let mut expiration = controller(store, ExpirationConfig::default());
    expiration.expire(Action::IDLE_DAILY, SizeClass::Large).unwrap();

    let visits = expiration.store().get_visits(id).unwrap();
    assert_eq!(visits.len(), 2);
    assert!(visits.iter().all(|v| v.visit_at >= days_ago(31)));
}

#[test]
fn test_status_follows_step_yield() {
    let mut store = store();
    populate_visited(&mut store, 10, days_ago(30));

    let mut expiration = controller(store, zero_capacity());

    // Unknown status: small step expires 6 visits, exactly filling its
    // limit, so the store turns dirty.
    let outcome = expiration
        .expire(Action::TIMED_OVERLIMIT, SizeClass::Small)
        .unwrap();
    assert!(outcome.status_changed);
    assert_eq!(expiration.status(), Status::Dirty);
    assert_eq!(expiration.store().visit_count().unwrap(), 4);

    // Dirty status triples the limit; the remaining 4 visits underfill it
    // and the store turns clean.
    let outcome = expiration
        .expire(Action::TIMED_OVERLIMIT, SizeClass::Small)
        .unwrap();
    assert!(outcome.status_changed);
    assert_eq!(expiration.status(), Status::Clean);
    assert_eq!(expiration.store().visit_count().unwrap(), 0);
    assert_eq!(expiration.record_count(), 0);
}

#[test]
fn test_interaction_cleanup_respects_toggle_and_window() {
    let mut store = store();
    let id = store.add_record(&NewRecord::new("https://example.com/")).unwrap();
    store.add_visit(id, days_ago(0), VisitKind::Link).unwrap();
    store.add_interaction(id, days_ago(100)).unwrap();
    store.add_interaction(id, days_ago(10)).unwrap();

    // Toggle off: nothing happens.
    let mut expiration = controller(store, ExpirationConfig::default());
    expiration.expire(Action::IDLE_DAILY, SizeClass::Large).unwrap();
    assert_eq!(expiration.store().interaction_count().unwrap(), 2);

    // Toggle on: only the interaction past the 60 day window goes.
    let config = ExpirationConfig {
        interactions_enabled: true,
        ..Default::default()
    };
    let mut expiration = controller(expiration.into_store(), config);
    expiration.expire(Action::IDLE_DAILY, SizeClass::Large).unwrap();
    assert_eq!(expiration.store().interaction_count().unwrap(), 1);
}

#[test]
fn test_artifacts_follow_their_record() {
    let mut store = store();
    let id = store.add_record(&NewRecord::new("https://example.com/")).unwrap();
    store.add_visit(id, days_ago(30), VisitKind::Link).unwrap();
    store.add_input_history(id, "examp").unwrap();
    store.add_icon(id, days_ago(0) + 30 * MSECS_PER_DAY).unwrap();

    let mut expiration = controller(store, zero_capacity());
    expiration.debug_expire(-1).unwrap();

    assert_eq!(expiration.record_count(), 0);
    assert_eq!(expiration.store().input_history_count().unwrap(), 0);
    assert_eq!(expiration.store().icon_count().unwrap(), 0);
}

#[test]
fn test_orphan_annotations_cleaned_on_timed_steps() {
    let mut store = store();
    store.add_annotation(RecordId::new(999), "stale").unwrap();

    let mut expiration = controller(store, ExpirationConfig::default());
    expiration.expire(Action::TIMED, SizeClass::Small).unwrap();
    assert_eq!(expiration.store().annotation_count().unwrap(), 0);
}

#[test]
fn test_old_icons_expire_only_at_idle() {
    let mut store = store();
    let id = store.add_record(&NewRecord::new("https://example.com/")).unwrap();
    store.add_visit(id, days_ago(0), VisitKind::Link).unwrap();
    store.add_icon(id, days_ago(200)).unwrap();

    let mut expiration = controller(store, ExpirationConfig::default());
    expiration.expire(Action::TIMED, SizeClass::Small).unwrap();
    assert_eq!(expiration.store().icon_count().unwrap(), 1);

    expiration.expire(Action::IDLE_DAILY, SizeClass::Large).unwrap();
    assert_eq!(expiration.store().icon_count().unwrap(), 0);
}

#[derive(Default)]
struct CountingObserver {
    removals: AtomicU32,
    finished: AtomicU32,
}

impl RemovalObserver for CountingObserver {
    fn on_removals(&self, events: &[RemovalEvent]) {
        self.removals.fetch_add(events.len() as u32, Ordering::SeqCst);
    }

    fn on_run_finished(&self) {
        self.finished.fetch_add(1, Ordering::SeqCst);
    }
}

#[tokio::test]
async fn test_shutdown_while_dirty_runs_a_final_step() {
    let mut store = store();
    populate_visited(&mut store, 10, days_ago(30));

    let observer = Arc::new(CountingObserver::default());
    let service = ExpirationService::start(
        store,
        zero_capacity(),
        vec![Arc::clone(&observer) as Arc<dyn RemovalObserver>],
        Arc::new(NullMetrics),
    );

    // Fill the limit exactly, leaving the store dirty.
    let events = service.debug_expire(5).await.unwrap();
    assert_eq!(events, 5);
    assert_eq!(observer.finished.load(Ordering::SeqCst), 1);

    // Shutdown runs one last step for the dirty store.
    service.shutdown().await;
    assert_eq!(observer.finished.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_shutdown_while_clean_skips_the_final_step() {
    let mut store = store();
    populate_visited(&mut store, 3, days_ago(30));

    let observer = Arc::new(CountingObserver::default());
    let service = ExpirationService::start(
        store,
        zero_capacity(),
        vec![Arc::clone(&observer) as Arc<dyn RemovalObserver>],
        Arc::new(NullMetrics),
    );

    // The limit underfills, so the store ends up clean.
    let events = service.debug_expire(50).await.unwrap();
    assert_eq!(events, 3);
    service.shutdown().await;
    assert_eq!(observer.finished.load(Ordering::SeqCst), 1);
}
