//! Durable local store for readings and commands.
//!
//! # Responsibility
//! - Own the single SQLite connection of the agent.
//! - Serialize every access so no record is mutated by two components at once.
//! - Translate repository failures into the storage error taxonomy.
//!
//! # Invariants
//! - All components reach persisted state through this type only.
//! - Every mutation runs in one transaction; a crash leaves the pre- or
//!   post-state, never a partial batch.

use crate::db::{open_db, open_db_in_memory, DbError};
use crate::model::command::Command;
use crate::model::reading::{Reading, ReadingId, StoredReading};
use crate::repo::command_repo::{
    CommandCounts, CommandRepository, SqliteCommandRepository, UpsertSummary,
};
use crate::repo::reading_repo::{ReadingCounts, ReadingRepository, SqliteReadingRepository};
use crate::repo::RepoError;
use chrono::{DateTime, Utc};
use log::{debug, error, info};
use rusqlite::Connection;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};

pub type StoreResult<T> = Result<T, StoreError>;

/// Local persistence failures. Fatal to the operation, never to the process.
#[derive(Debug)]
pub enum StoreError {
    /// Storage could not be opened or migrated.
    Init(DbError),
    /// A mutation failed and was rolled back as a whole.
    Write {
        operation: &'static str,
        source: RepoError,
    },
    /// A query failed or returned rows that do not map to the model.
    Read {
        operation: &'static str,
        source: RepoError,
    },
}

impl Display for StoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Init(err) => write!(f, "storage init failed: {err}"),
            Self::Write { operation, source } => {
                write!(f, "storage write `{operation}` failed: {source}")
            }
            Self::Read { operation, source } => {
                write!(f, "storage read `{operation}` failed: {source}")
            }
        }
    }
}

impl Error for StoreError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Init(err) => Some(err),
            Self::Write { source, .. } | Self::Read { source, .. } => Some(source),
        }
    }
}

/// Finite batch of unsynced readings, consumed once by the caller.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReadingBatch {
    readings: Vec<StoredReading>,
}

impl ReadingBatch {
    pub fn len(&self) -> usize {
        self.readings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.readings.is_empty()
    }

    /// Store ids covered by this batch, in upload order.
    pub fn ids(&self) -> Vec<ReadingId> {
        self.readings.iter().map(|stored| stored.id).collect()
    }

    pub fn readings(&self) -> &[StoredReading] {
        &self.readings
    }
}

impl IntoIterator for ReadingBatch {
    type Item = StoredReading;
    type IntoIter = std::vec::IntoIter<StoredReading>;

    fn into_iter(self) -> Self::IntoIter {
        self.readings.into_iter()
    }
}

/// Snapshot of row counts across both collections.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreStats {
    pub readings: ReadingCounts,
    pub commands: CommandCounts,
}

/// Serialized, transactional access to the agent's local records.
pub struct DurableStore {
    conn: Mutex<Connection>,
}

impl DurableStore {
    /// Opens (creating if absent) the store at `path` and migrates it.
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let conn = open_db(path).map_err(StoreError::Init)?;
        Ok(Self::from_connection(conn))
    }

    /// Opens a throwaway in-memory store.
    pub fn open_in_memory() -> StoreResult<Self> {
        let conn = open_db_in_memory().map_err(StoreError::Init)?;
        Ok(Self::from_connection(conn))
    }

    fn from_connection(conn: Connection) -> Self {
        Self {
            conn: Mutex::new(conn),
        }
    }

    /// Persists one reading with `synced = false`.
    pub fn append_reading(&self, reading: &Reading) -> StoreResult<ReadingId> {
        let conn = self.lock();
        SqliteReadingRepository::new(&conn)
            .append(reading)
            .map_err(|source| write_error("append_reading", source))
    }

    /// Returns up to `limit` unsynced readings, oldest insertion first.
    pub fn unsynced_readings(&self, limit: u32) -> StoreResult<ReadingBatch> {
        let conn = self.lock();
        let readings = SqliteReadingRepository::new(&conn)
            .list_unsynced(limit)
            .map_err(|source| read_error("unsynced_readings", source))?;
        Ok(ReadingBatch { readings })
    }

    /// Sets `synced = true` for exactly `ids`; unknown ids are ignored.
    ///
    /// Returns the number of rows that flipped.
    pub fn mark_synced(&self, ids: &[ReadingId]) -> StoreResult<usize> {
        let conn = self.lock();
        let changed = SqliteReadingRepository::new(&conn)
            .mark_synced(ids)
            .map_err(|source| write_error("mark_synced", source))?;
        debug!(
            "event=mark_synced module=store status=ok requested={} changed={}",
            ids.len(),
            changed
        );
        Ok(changed)
    }

    /// Replace-by-id upsert of downloaded commands.
    pub fn upsert_commands(&self, commands: &[Command]) -> StoreResult<UpsertSummary> {
        let conn = self.lock();
        let summary = SqliteCommandRepository::new(&conn)
            .upsert_all(commands)
            .map_err(|source| write_error("upsert_commands", source))?;
        debug!(
            "event=upsert_commands module=store status=ok inserted={} replaced={} preserved={}",
            summary.inserted, summary.replaced, summary.preserved
        );
        Ok(summary)
    }

    /// Pending, unexecuted commands with `start_time <= now`, in start order.
    pub fn due_pending_commands(&self, now: DateTime<Utc>) -> StoreResult<Vec<Command>> {
        let conn = self.lock();
        SqliteCommandRepository::new(&conn)
            .list_due(now)
            .map_err(|source| read_error("due_pending_commands", source))
    }

    /// Sets `executed = true` and `status = completed`.
    ///
    /// Returns `false` when the id is unknown or was already executed.
    pub fn mark_executed(&self, id: &str) -> StoreResult<bool> {
        let conn = self.lock();
        SqliteCommandRepository::new(&conn)
            .mark_executed(id)
            .map_err(|source| write_error("mark_executed", source))
    }

    /// Deletes synced readings stamped before `cutoff`; returns the count.
    pub fn purge_synced_older_than(&self, cutoff: DateTime<Utc>) -> StoreResult<usize> {
        let conn = self.lock();
        let deleted = SqliteReadingRepository::new(&conn)
            .purge_synced_before(cutoff)
            .map_err(|source| write_error("purge_synced_older_than", source))?;
        if deleted > 0 {
            info!(
                "event=retention_purge module=store status=ok deleted={}",
                deleted
            );
        }
        Ok(deleted)
    }

    pub fn get_reading(&self, id: ReadingId) -> StoreResult<Option<StoredReading>> {
        let conn = self.lock();
        SqliteReadingRepository::new(&conn)
            .get(id)
            .map_err(|source| read_error("get_reading", source))
    }

    pub fn get_command(&self, id: &str) -> StoreResult<Option<Command>> {
        let conn = self.lock();
        SqliteCommandRepository::new(&conn)
            .get(id)
            .map_err(|source| read_error("get_command", source))
    }

    pub fn stats(&self) -> StoreResult<StoreStats> {
        let conn = self.lock();
        let readings = SqliteReadingRepository::new(&conn)
            .counts()
            .map_err(|source| read_error("stats", source))?;
        let commands = SqliteCommandRepository::new(&conn)
            .counts()
            .map_err(|source| read_error("stats", source))?;
        Ok(StoreStats { readings, commands })
    }

    fn lock(&self) -> MutexGuard<'_, Connection> {
        // Poisoning is ignored: open transactions roll back on drop.
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn write_error(operation: &'static str, source: RepoError) -> StoreError {
    error!(
        "event=store_write module=store status=error operation={} error={}",
        operation, source
    );
    StoreError::Write { operation, source }
}

fn read_error(operation: &'static str, source: RepoError) -> StoreError {
    error!(
        "event=store_read module=store status=error operation={} error={}",
        operation, source
    );
    StoreError::Read { operation, source }
}
