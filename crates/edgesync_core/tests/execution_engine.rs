mod common;

use chrono::{DateTime, Duration, TimeZone, Utc};
use common::RecordingActuator;
use edgesync_core::{Command, CommandStatus, DurableStore, ExecutionEngine, ExecutionFailure};

fn at(hour: u32, minute: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 1, hour, minute, 0).unwrap()
}

#[test]
fn due_command_runs_exactly_once() {
    let store = DurableStore::open_in_memory().unwrap();
    store
        .upsert_commands(&[Command::new("sched-1", "zone-1", at(6, 0), 15, 2.5)])
        .unwrap();
    let mut engine = ExecutionEngine::new(RecordingActuator::default());

    let first = engine.execute_due(&store, at(6, 1));
    let second = engine.execute_due(&store, at(6, 2));

    assert_eq!(first.executed, vec!["sched-1"]);
    assert!(second.executed.is_empty());
    assert_eq!(engine.actuator().applied_ids(), vec!["sched-1"]);

    let stored = store.get_command("sched-1").unwrap().unwrap();
    assert!(stored.executed);
    assert_eq!(stored.status, CommandStatus::Completed);
}

#[test]
fn future_commands_wait_for_their_start_time() {
    let store = DurableStore::open_in_memory().unwrap();
    store
        .upsert_commands(&[Command::new("later", "zone-1", at(8, 0), 15, 2.5)])
        .unwrap();
    let mut engine = ExecutionEngine::new(RecordingActuator::default());

    assert!(engine.execute_due(&store, at(7, 59)).executed.is_empty());
    assert_eq!(engine.execute_due(&store, at(8, 0)).executed, vec!["later"]);
}

#[test]
fn backlog_runs_in_start_time_order() {
    let store = DurableStore::open_in_memory().unwrap();
    store
        .upsert_commands(&[
            Command::new("t2", "zone-1", at(6, 30), 10, 1.0),
            Command::new("t1", "zone-1", at(6, 0), 10, 1.0),
            Command::new("t0", "zone-2", at(5, 0), 10, 1.0),
        ])
        .unwrap();
    let mut engine = ExecutionEngine::new(RecordingActuator::default());

    let report = engine.execute_due(&store, at(9, 0));

    assert_eq!(report.executed, vec!["t0", "t1", "t2"]);
    let starts: Vec<_> = engine
        .actuator()
        .applied
        .iter()
        .map(|(_, start)| *start)
        .collect();
    assert!(starts.windows(2).all(|pair| pair[0] <= pair[1]));
}

#[test]
fn non_pending_commands_are_never_applied() {
    let store = DurableStore::open_in_memory().unwrap();
    store
        .upsert_commands(&[
            Command::new("off", "zone-1", at(6, 0), 10, 1.0).with_status(CommandStatus::Cancelled),
            Command::new("on", "zone-1", at(6, 0), 10, 1.0),
        ])
        .unwrap();
    let mut engine = ExecutionEngine::new(RecordingActuator::default());

    let report = engine.execute_due(&store, at(6, 0) + Duration::hours(1));

    assert_eq!(report.executed, vec!["on"]);
    assert!(!store.get_command("off").unwrap().unwrap().executed);
}

#[test]
fn actuator_failure_leaves_command_pending_and_defers_its_zone() {
    let store = DurableStore::open_in_memory().unwrap();
    store
        .upsert_commands(&[
            Command::new("a1", "zone-a", at(6, 0), 10, 1.0),
            Command::new("b1", "zone-b", at(6, 10), 10, 1.0),
            Command::new("a2", "zone-a", at(6, 20), 10, 1.0),
        ])
        .unwrap();
    let mut engine = ExecutionEngine::new(RecordingActuator::failing("zone-a"));

    let report = engine.execute_due(&store, at(7, 0));

    assert_eq!(report.executed, vec!["b1"]);
    assert_eq!(report.deferred, vec!["a2"]);
    assert!(matches!(
        report.failures.as_slice(),
        [ExecutionFailure::Actuator { command_id, .. }] if command_id == "a1"
    ));
    assert!(!report.is_clean());
    assert!(!store.get_command("a1").unwrap().unwrap().executed);
    assert!(!store.get_command("a2").unwrap().unwrap().executed);

    let mut repaired = ExecutionEngine::new(RecordingActuator::default());
    let retry = repaired.execute_due(&store, at(7, 1));
    assert_eq!(retry.executed, vec!["a1", "a2"]);
}
