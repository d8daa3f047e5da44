//! Command (irrigation schedule) repository contracts and SQLite implementation.
//!
//! # Responsibility
//! - Upsert downloaded commands by upstream id.
//! - Select due pending commands in execution order.
//! - Record execution.
//!
//! # Invariants
//! - One row per command id; re-delivery replaces, never duplicates.
//! - An executed row whose schedule fields are unchanged keeps its
//!   `executed` flag and local status across upserts.
//! - Due selection is ordered `start_time ASC, id ASC`.

use super::{int_to_bool, RepoError, RepoResult};
use crate::model::command::{Command, CommandId, CommandStatus};
use crate::model::time::{format_timestamp, parse_timestamp};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row, Transaction, TransactionBehavior};

const COMMAND_SELECT_SQL: &str = "SELECT
    id,
    zone_id,
    start_time,
    duration,
    flow_rate,
    status,
    executed
FROM schedules";

/// Per-batch classification of upserted rows.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpsertSummary {
    /// Ids not seen before.
    pub inserted: usize,
    /// Known ids whose row was fully replaced.
    pub replaced: usize,
    /// Executed ids re-delivered unchanged; local state kept.
    pub preserved: usize,
}

/// Row counts used by status reporting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CommandCounts {
    pub total: u64,
    pub pending: u64,
    pub executed: u64,
}

/// Repository interface for command persistence.
pub trait CommandRepository {
    fn upsert_all(&self, commands: &[Command]) -> RepoResult<UpsertSummary>;
    fn list_due(&self, now: DateTime<Utc>) -> RepoResult<Vec<Command>>;
    fn mark_executed(&self, id: &str) -> RepoResult<bool>;
    fn get(&self, id: &str) -> RepoResult<Option<Command>>;
    fn counts(&self) -> RepoResult<CommandCounts>;
}

/// SQLite-backed command repository.
pub struct SqliteCommandRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteCommandRepository<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }
}

impl CommandRepository for SqliteCommandRepository<'_> {
    fn upsert_all(&self, commands: &[Command]) -> RepoResult<UpsertSummary> {
        let mut summary = UpsertSummary::default();
        if commands.is_empty() {
            return Ok(summary);
        }

        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        for command in commands {
            let existing = load_command(&tx, &command.id)?;
            match existing {
                None => {
                    write_command(&tx, command)?;
                    summary.inserted += 1;
                }
                Some(current) if current.executed && same_schedule(&current, command) => {
                    summary.preserved += 1;
                }
                Some(_) => {
                    write_command(&tx, command)?;
                    summary.replaced += 1;
                }
            }
        }
        tx.commit()?;

        Ok(summary)
    }

    fn list_due(&self, now: DateTime<Utc>) -> RepoResult<Vec<Command>> {
        let mut stmt = self.conn.prepare(&format!(
            "{COMMAND_SELECT_SQL}
             WHERE status = 'pending'
               AND executed = 0
               AND start_time <= ?1
             ORDER BY start_time ASC, id ASC;"
        ))?;

        let mut rows = stmt.query([format_timestamp(now)])?;
        let mut commands = Vec::new();
        while let Some(row) = rows.next()? {
            commands.push(parse_command_row(row)?);
        }

        Ok(commands)
    }

    fn mark_executed(&self, id: &str) -> RepoResult<bool> {
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        let changed = tx.execute(
            "UPDATE schedules
             SET executed = 1,
                 status = ?2
             WHERE id = ?1
               AND executed = 0;",
            params![id, CommandStatus::Completed.as_str()],
        )?;
        tx.commit()?;

        Ok(changed == 1)
    }

    fn get(&self, id: &str) -> RepoResult<Option<Command>> {
        load_command(self.conn, id)
    }

    fn counts(&self) -> RepoResult<CommandCounts> {
        let (total, pending, executed): (i64, i64, i64) = self.conn.query_row(
            "SELECT
                COUNT(*),
                COALESCE(SUM(CASE WHEN status = 'pending' AND executed = 0 THEN 1 ELSE 0 END), 0),
                COALESCE(SUM(CASE WHEN executed = 1 THEN 1 ELSE 0 END), 0)
             FROM schedules;",
            [],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
        )?;

        Ok(CommandCounts {
            total: total.max(0) as u64,
            pending: pending.max(0) as u64,
            executed: executed.max(0) as u64,
        })
    }
}

fn same_schedule(current: &Command, incoming: &Command) -> bool {
    current.zone_id == incoming.zone_id
        && current.start_time == incoming.start_time
        && current.duration_minutes == incoming.duration_minutes
        && current.flow_rate == incoming.flow_rate
}

/// Writes every field of `command` and re-arms the row (`executed = 0`).
fn write_command(conn: &Connection, command: &Command) -> RepoResult<()> {
    conn.execute(
        "INSERT INTO schedules (
            id,
            zone_id,
            start_time,
            duration,
            flow_rate,
            status,
            executed
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, 0)
        ON CONFLICT(id) DO UPDATE SET
            zone_id = excluded.zone_id,
            start_time = excluded.start_time,
            duration = excluded.duration,
            flow_rate = excluded.flow_rate,
            status = excluded.status,
            executed = excluded.executed;",
        params![
            command.id.as_str(),
            command.zone_id.as_str(),
            format_timestamp(command.start_time),
            i64::from(command.duration_minutes),
            command.flow_rate,
            command.status.as_str(),
        ],
    )?;
    Ok(())
}

fn load_command(conn: &Connection, id: &str) -> RepoResult<Option<Command>> {
    let mut stmt = conn.prepare(&format!("{COMMAND_SELECT_SQL} WHERE id = ?1;"))?;
    let command = stmt
        .query_row([id], |row| Ok(parse_command_row(row)))
        .optional()?;
    command.transpose()
}

fn parse_command_row(row: &Row<'_>) -> RepoResult<Command> {
    let id: CommandId = row.get("id")?;

    let start_text: String = row.get("start_time")?;
    let start_time = parse_timestamp(&start_text).ok_or_else(|| {
        RepoError::InvalidData(format!(
            "invalid start time `{start_text}` in schedules.start_time for `{id}`"
        ))
    })?;

    let duration: i64 = row.get("duration")?;
    let duration_minutes = u32::try_from(duration).map_err(|_| {
        RepoError::InvalidData(format!(
            "invalid duration `{duration}` in schedules.duration for `{id}`"
        ))
    })?;

    let status: String = row.get("status")?;

    Ok(Command {
        zone_id: row.get("zone_id")?,
        start_time,
        duration_minutes,
        flow_rate: row.get("flow_rate")?,
        status: CommandStatus::parse(&status),
        executed: int_to_bool(row.get("executed")?, "schedules.executed")?,
        id,
    })
}
