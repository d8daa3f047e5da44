mod common;

use chrono::{DateTime, Duration, TimeZone, Utc};
use common::FakeCloud;
use edgesync_core::{
    CloudError, Command, DurableStore, MeasurementKind, Reading, SyncEngine, SyncFailure,
    SyncState,
};

fn at(hour: u32, minute: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 1, hour, minute, 0).unwrap()
}

fn seed_readings(store: &DurableStore, count: u32) {
    for i in 0..count {
        let reading = Reading::new(
            "sensor-001",
            at(6, 0) + Duration::seconds(i64::from(i)),
            MeasurementKind::SoilMoisture,
            60.0 + f64::from(i),
            "%",
        );
        store.append_reading(&reading).unwrap();
    }
}

#[test]
fn cycle_pushes_buffered_readings_and_stores_pulled_commands() {
    let store = DurableStore::open_in_memory().unwrap();
    seed_readings(&store, 3);
    let cloud = FakeCloud::with_schedule(vec![Command::new("sched-1", "zone-1", at(7, 0), 15, 2.5)]);
    let mut engine = SyncEngine::new(&cloud, 100);
    assert_eq!(engine.state(), SyncState::Unauthenticated);

    let report = engine.sync_cycle(&store);

    assert!(report.is_clean(), "failures: {:?}", report.failures);
    assert_eq!(report.state, SyncState::Authenticated);
    assert_eq!(report.pushed, 3);
    assert_eq!(report.pulled, Some(1));
    assert_eq!(report.upsert.inserted, 1);
    assert!(store.unsynced_readings(10).unwrap().is_empty());
    assert_eq!(cloud.pushed.borrow()[0][0].value, 60.0);

    let command = store.get_command("sched-1").unwrap().unwrap();
    assert_eq!(command.zone_id, "zone-1");
    assert!(!command.executed);
}

#[test]
fn credential_is_reused_while_authenticated() {
    let store = DurableStore::open_in_memory().unwrap();
    let cloud = FakeCloud::default();
    let mut engine = SyncEngine::new(&cloud, 100);

    engine.sync_cycle(&store);
    engine.sync_cycle(&store);

    assert_eq!(cloud.auth_calls.get(), 1);
    assert_eq!(cloud.pull_calls.get(), 2);
    assert_eq!(cloud.push_calls.get(), 0, "nothing buffered, nothing pushed");
}

#[test]
fn push_is_bounded_by_batch_size() {
    let store = DurableStore::open_in_memory().unwrap();
    seed_readings(&store, 250);
    let cloud = FakeCloud::default();
    let mut engine = SyncEngine::new(&cloud, 100);

    let report = engine.sync_cycle(&store);

    assert_eq!(report.pushed, 100);
    assert_eq!(store.stats().unwrap().readings.unsynced, 150);

    engine.sync_cycle(&store);
    engine.sync_cycle(&store);
    assert_eq!(store.stats().unwrap().readings.unsynced, 0);
    assert_eq!(cloud.pushed_count(), 250);
}

#[test]
fn unreachable_upstream_keeps_everything_buffered() {
    let store = DurableStore::open_in_memory().unwrap();
    seed_readings(&store, 5);
    let cloud = FakeCloud::default();
    cloud.offline.set(true);
    let mut engine = SyncEngine::new(&cloud, 100);

    for _ in 0..3 {
        let report = engine.sync_cycle(&store);
        assert_eq!(report.state, SyncState::Offline);
        assert!(matches!(
            report.failures.as_slice(),
            [SyncFailure::Authenticate(CloudError::Network(_))]
        ));
    }
    assert_eq!(cloud.push_calls.get(), 0);
    assert_eq!(store.stats().unwrap().readings.unsynced, 5);

    cloud.offline.set(false);
    let report = engine.sync_cycle(&store);
    assert_eq!(report.state, SyncState::Authenticated);
    assert_eq!(report.pushed, 5);
    assert_eq!(cloud.auth_calls.get(), 4);
}

#[test]
fn push_network_failure_goes_offline_and_skips_pull() {
    let store = DurableStore::open_in_memory().unwrap();
    let cloud = FakeCloud::default();
    let mut engine = SyncEngine::new(&cloud, 100);
    engine.sync_cycle(&store);

    seed_readings(&store, 2);
    cloud
        .push_results
        .borrow_mut()
        .push_back(Err(CloudError::Network("timeout".to_string())));
    let pulls_before = cloud.pull_calls.get();

    let report = engine.sync_cycle(&store);

    assert_eq!(report.state, SyncState::Offline);
    assert_eq!(report.pushed, 0);
    assert_eq!(report.pulled, None);
    assert_eq!(cloud.pull_calls.get(), pulls_before);
    assert_eq!(store.stats().unwrap().readings.unsynced, 2);

    let report = engine.sync_cycle(&store);
    assert_eq!(report.state, SyncState::Authenticated);
    assert_eq!(report.pushed, 2);
    assert_eq!(cloud.auth_calls.get(), 2);
}

#[test]
fn rejected_credential_returns_to_unauthenticated() {
    let store = DurableStore::open_in_memory().unwrap();
    seed_readings(&store, 1);
    let cloud = FakeCloud::default();
    cloud
        .push_results
        .borrow_mut()
        .push_back(Err(CloudError::Auth("token expired".to_string())));
    let mut engine = SyncEngine::new(&cloud, 100);

    let report = engine.sync_cycle(&store);
    assert_eq!(report.state, SyncState::Unauthenticated);
    assert_eq!(store.stats().unwrap().readings.unsynced, 1);

    let report = engine.sync_cycle(&store);
    assert_eq!(report.state, SyncState::Authenticated);
    assert_eq!(report.pushed, 1);
    assert_eq!(cloud.auth_calls.get(), 2);
}

#[test]
fn pull_upstream_error_keeps_commands_and_state() {
    let store = DurableStore::open_in_memory().unwrap();
    store
        .upsert_commands(&[Command::new("sched-1", "zone-1", at(7, 0), 15, 2.5)])
        .unwrap();
    seed_readings(&store, 2);
    let cloud = FakeCloud::default();
    cloud.pull_results.borrow_mut().push_back(Err(CloudError::Upstream {
        status: 500,
        message: "db down".to_string(),
    }));
    let mut engine = SyncEngine::new(&cloud, 100);

    let report = engine.sync_cycle(&store);

    assert_eq!(report.state, SyncState::Authenticated);
    assert_eq!(report.pushed, 2);
    assert_eq!(report.pulled, None);
    assert!(matches!(report.failures.as_slice(), [SyncFailure::Pull(_)]));
    assert!(store.get_command("sched-1").unwrap().is_some());
}

#[test]
fn pull_network_error_goes_offline() {
    let store = DurableStore::open_in_memory().unwrap();
    let cloud = FakeCloud::default();
    cloud
        .pull_results
        .borrow_mut()
        .push_back(Err(CloudError::Network("connection reset".to_string())));
    let mut engine = SyncEngine::new(&cloud, 100);

    let report = engine.sync_cycle(&store);

    assert_eq!(report.state, SyncState::Offline);
}

#[test]
fn empty_pull_leaves_existing_commands_in_place() {
    let store = DurableStore::open_in_memory().unwrap();
    store
        .upsert_commands(&[Command::new("sched-1", "zone-1", at(7, 0), 15, 2.5)])
        .unwrap();
    let cloud = FakeCloud::default();
    let mut engine = SyncEngine::new(&cloud, 100);

    let report = engine.sync_cycle(&store);

    assert_eq!(report.pulled, Some(0));
    assert_eq!(store.stats().unwrap().commands.total, 1);
}

#[test]
fn failed_mark_after_push_reuploads_next_cycle() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("edge_data.db");
    let store = DurableStore::open(&path).unwrap();
    seed_readings(&store, 2);

    let side = rusqlite::Connection::open(&path).unwrap();
    side.execute_batch(
        "CREATE TRIGGER block_sync BEFORE UPDATE OF synced ON sensor_readings
         BEGIN SELECT RAISE(ABORT, 'disk full'); END;",
    )
    .unwrap();

    let cloud = FakeCloud::default();
    let mut engine = SyncEngine::new(&cloud, 100);

    let report = engine.sync_cycle(&store);
    assert_eq!(report.pushed, 0);
    assert!(report
        .failures
        .iter()
        .any(|failure| matches!(failure, SyncFailure::Store(_))));
    assert_eq!(store.stats().unwrap().readings.unsynced, 2);
    assert_eq!(cloud.push_calls.get(), 1);

    side.execute_batch("DROP TRIGGER block_sync;").unwrap();
    let report = engine.sync_cycle(&store);
    assert_eq!(report.pushed, 2);
    assert_eq!(store.stats().unwrap().readings.unsynced, 0);
    // Upstream saw the batch twice.
    assert_eq!(cloud.push_calls.get(), 2);
    assert_eq!(cloud.pushed_count(), 4);
}
