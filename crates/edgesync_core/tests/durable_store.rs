use chrono::{DateTime, Duration, TimeZone, Utc};
use edgesync_core::cloud::wire::SchedulePayload;
use edgesync_core::db::DbError;
use edgesync_core::{
    Command, CommandStatus, DurableStore, MeasurementKind, Quality, Reading, StoreError,
};

fn at(hour: u32, minute: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 1, hour, minute, 0).unwrap()
}

fn reading(sensor_id: &str, timestamp: DateTime<Utc>, value: f64) -> Reading {
    Reading::new(sensor_id, timestamp, MeasurementKind::SoilMoisture, value, "%")
}

#[test]
fn appended_reading_round_trips_unsynced() {
    let store = DurableStore::open_in_memory().unwrap();
    let original = Reading::new("sensor-002", at(6, 0), MeasurementKind::Temperature, 25.3, "°C")
        .with_quality(Quality::Degraded);

    let id = store.append_reading(&original).unwrap();
    let stored = store.get_reading(id).unwrap().unwrap();

    assert_eq!(stored.id, id);
    assert_eq!(stored.reading, original);
    assert!(!stored.synced);
}

#[test]
fn unsynced_batch_is_bounded_and_in_insertion_order() {
    let store = DurableStore::open_in_memory().unwrap();
    // Insertion order differs from timestamp order on purpose.
    let first = store.append_reading(&reading("s1", at(7, 0), 1.0)).unwrap();
    let second = store.append_reading(&reading("s1", at(6, 0), 2.0)).unwrap();
    let third = store.append_reading(&reading("s1", at(8, 0), 3.0)).unwrap();

    let batch = store.unsynced_readings(2).unwrap();
    assert_eq!(batch.len(), 2);
    assert_eq!(batch.ids(), vec![first, second]);

    let all = store.unsynced_readings(100).unwrap();
    assert_eq!(all.ids(), vec![first, second, third]);
}

#[test]
fn mark_synced_flips_exactly_the_given_ids() {
    let store = DurableStore::open_in_memory().unwrap();
    let ids: Vec<_> = (0..5)
        .map(|i| store.append_reading(&reading("s1", at(6, i), f64::from(i))).unwrap())
        .collect();

    let changed = store.mark_synced(&[ids[1], ids[3], 9_999]).unwrap();
    assert_eq!(changed, 2);

    let remaining = store.unsynced_readings(100).unwrap();
    assert_eq!(remaining.ids(), vec![ids[0], ids[2], ids[4]]);
    assert!(store.get_reading(ids[1]).unwrap().unwrap().synced);

    // Already-synced ids are not counted again.
    assert_eq!(store.mark_synced(&[ids[1]]).unwrap(), 0);
    assert_eq!(store.mark_synced(&[]).unwrap(), 0);
}

#[test]
fn mark_synced_handles_batches_larger_than_one_statement() {
    let store = DurableStore::open_in_memory().unwrap();
    let ids: Vec<_> = (0..1_200_u32)
        .map(|i| store.append_reading(&reading("bulk", at(6, 0), f64::from(i))).unwrap())
        .collect();

    assert_eq!(store.mark_synced(&ids).unwrap(), 1_200);
    assert!(store.unsynced_readings(10).unwrap().is_empty());
}

#[test]
fn purge_removes_only_synced_readings_past_cutoff() {
    let store = DurableStore::open_in_memory().unwrap();
    let now = at(12, 0);
    let old_synced = store
        .append_reading(&reading("s1", now - Duration::days(8), 1.0))
        .unwrap();
    let old_unsynced = store
        .append_reading(&reading("s1", now - Duration::days(9), 2.0))
        .unwrap();
    let recent_synced = store
        .append_reading(&reading("s1", now - Duration::days(1), 3.0))
        .unwrap();
    store.mark_synced(&[old_synced, recent_synced]).unwrap();

    let purged = store
        .purge_synced_older_than(now - Duration::days(7))
        .unwrap();

    assert_eq!(purged, 1);
    assert!(store.get_reading(old_synced).unwrap().is_none());
    assert!(store.get_reading(old_unsynced).unwrap().is_some());
    assert!(store.get_reading(recent_synced).unwrap().is_some());
}

#[test]
fn upsert_replaces_by_id_without_duplicates() {
    let store = DurableStore::open_in_memory().unwrap();
    let original = Command::new("s1", "z1", at(6, 0), 15, 2.5);

    let first = store.upsert_commands(&[original.clone()]).unwrap();
    assert_eq!(first.inserted, 1);

    let second = store.upsert_commands(&[original.clone()]).unwrap();
    assert_eq!(second.inserted, 0);
    assert_eq!(store.stats().unwrap().commands.total, 1);

    let moved = Command::new("s1", "z2", at(7, 30), 20, 3.0);
    let third = store.upsert_commands(&[moved.clone()]).unwrap();
    assert_eq!(third.replaced, 1);
    assert_eq!(store.get_command("s1").unwrap().unwrap(), moved);
    assert_eq!(store.stats().unwrap().commands.total, 1);
}

#[test]
fn upsert_keeps_executed_flag_for_unchanged_schedule() {
    let store = DurableStore::open_in_memory().unwrap();
    let command = Command::new("s1", "z1", at(6, 0), 15, 2.5);
    store.upsert_commands(&[command.clone()]).unwrap();
    assert!(store.mark_executed("s1").unwrap());

    let summary = store.upsert_commands(&[command]).unwrap();

    assert_eq!(summary.preserved, 1);
    let stored = store.get_command("s1").unwrap().unwrap();
    assert!(stored.executed);
    assert_eq!(stored.status, CommandStatus::Completed);
    assert!(store.due_pending_commands(at(9, 0)).unwrap().is_empty());
}

#[test]
fn upsert_rearms_executed_command_when_rescheduled() {
    let store = DurableStore::open_in_memory().unwrap();
    store
        .upsert_commands(&[Command::new("s1", "z1", at(6, 0), 15, 2.5)])
        .unwrap();
    store.mark_executed("s1").unwrap();

    let rescheduled = Command::new("s1", "z1", at(18, 0), 15, 2.5);
    let summary = store.upsert_commands(&[rescheduled]).unwrap();

    assert_eq!(summary.replaced, 1);
    let stored = store.get_command("s1").unwrap().unwrap();
    assert!(!stored.executed);
    assert_eq!(stored.status, CommandStatus::Pending);
    assert!(store.due_pending_commands(at(9, 0)).unwrap().is_empty());
    assert_eq!(store.due_pending_commands(at(18, 0)).unwrap().len(), 1);
}

#[test]
fn due_commands_are_pending_started_and_ordered() {
    let store = DurableStore::open_in_memory().unwrap();
    store
        .upsert_commands(&[
            Command::new("b", "z1", at(6, 0), 10, 1.0),
            Command::new("late", "z1", at(9, 0), 10, 1.0),
            Command::new("a", "z2", at(6, 0), 10, 1.0),
            Command::new("early", "z3", at(5, 0), 10, 1.0),
            Command::new("off", "z1", at(5, 0), 10, 1.0).with_status(CommandStatus::Cancelled),
        ])
        .unwrap();

    let due: Vec<_> = store
        .due_pending_commands(at(6, 0))
        .unwrap()
        .into_iter()
        .map(|command| command.id)
        .collect();

    assert_eq!(due, vec!["early", "a", "b"]);
}

#[test]
fn mark_executed_is_conditional() {
    let store = DurableStore::open_in_memory().unwrap();
    store
        .upsert_commands(&[Command::new("s1", "z1", at(6, 0), 10, 1.0)])
        .unwrap();

    assert!(store.mark_executed("s1").unwrap());
    assert!(!store.mark_executed("s1").unwrap());
    assert!(!store.mark_executed("missing").unwrap());
}

#[test]
fn stats_reflect_both_collections() {
    let store = DurableStore::open_in_memory().unwrap();
    let id = store.append_reading(&reading("s1", at(6, 0), 1.0)).unwrap();
    store.append_reading(&reading("s1", at(6, 1), 2.0)).unwrap();
    store.mark_synced(&[id]).unwrap();
    store
        .upsert_commands(&[
            Command::new("s1", "z1", at(6, 0), 10, 1.0),
            Command::new("s2", "z1", at(7, 0), 10, 1.0),
        ])
        .unwrap();
    store.mark_executed("s1").unwrap();

    let stats = store.stats().unwrap();
    assert_eq!(stats.readings.total, 2);
    assert_eq!(stats.readings.unsynced, 1);
    assert_eq!(stats.commands.total, 2);
    assert_eq!(stats.commands.pending, 1);
    assert_eq!(stats.commands.executed, 1);
}

#[test]
fn buffered_state_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("edge_data.db");

    {
        let store = DurableStore::open(&path).unwrap();
        store.append_reading(&reading("s1", at(6, 0), 1.0)).unwrap();
        store
            .upsert_commands(&[Command::new("s1", "z1", at(6, 0), 10, 1.0)])
            .unwrap();
        store.mark_executed("s1").unwrap();
    }

    let store = DurableStore::open(&path).unwrap();
    assert_eq!(store.unsynced_readings(10).unwrap().len(), 1);
    assert!(store.get_command("s1").unwrap().unwrap().executed);
}

#[test]
fn sub_millisecond_reading_timestamp_round_trips() {
    let store = DurableStore::open_in_memory().unwrap();
    let original = reading("s1", at(6, 0) + Duration::nanoseconds(123_456_789), 1.0);

    let id = store.append_reading(&original).unwrap();

    assert_eq!(store.get_reading(id).unwrap().unwrap().reading, original);
}

#[test]
fn identical_repull_with_sub_millisecond_start_keeps_command_executed() {
    let store = DurableStore::open_in_memory().unwrap();
    let pulled = || {
        serde_json::from_str::<SchedulePayload>(
            r#"{"id":"s1","zoneId":"z1","startTime":"2024-05-01T06:00:00.123456Z","duration":15,"flowRate":2.5}"#,
        )
        .unwrap()
        .into_command()
        .unwrap()
    };

    store.upsert_commands(&[pulled()]).unwrap();
    assert!(store.mark_executed("s1").unwrap());

    let summary = store.upsert_commands(&[pulled()]).unwrap();

    assert_eq!(summary.preserved, 1);
    assert_eq!(summary.replaced, 0);
    assert!(store.get_command("s1").unwrap().unwrap().executed);
    assert!(store.due_pending_commands(at(9, 0)).unwrap().is_empty());
}

#[test]
fn open_under_missing_directory_is_init_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("not-mounted").join("edge_data.db");

    let result = DurableStore::open(&path);

    assert!(matches!(result, Err(StoreError::Init(DbError::Sqlite(_)))));
}

#[test]
fn open_of_newer_schema_is_init_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("edge_data.db");
    let conn = rusqlite::Connection::open(&path).unwrap();
    conn.execute_batch("PRAGMA user_version = 999;").unwrap();
    drop(conn);

    let result = DurableStore::open(&path);

    assert!(matches!(
        result,
        Err(StoreError::Init(DbError::SchemaTooNew { found: 999, .. }))
    ));
}
