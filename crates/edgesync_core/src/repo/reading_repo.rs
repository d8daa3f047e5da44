//! Sensor reading repository contracts and SQLite implementation.
//!
//! # Responsibility
//! - Append readings and page through the unsynced backlog.
//! - Flip sync flags for acknowledged batches.
//! - Purge synced history past the retention window.
//!
//! # Invariants
//! - Unsynced pages are ordered by insertion (`id ASC`).
//! - `mark_synced` touches exactly the given ids, atomically.
//! - Unsynced rows are never purged, whatever their age.

use super::{int_to_bool, RepoError, RepoResult};
use crate::model::reading::{MeasurementKind, Quality, Reading, ReadingId, StoredReading};
use crate::model::time::{format_timestamp, parse_timestamp};
use chrono::{DateTime, Utc};
use rusqlite::{params, params_from_iter, Connection, Row, Transaction, TransactionBehavior};

const READING_SELECT_SQL: &str = "SELECT
    id,
    sensor_id,
    timestamp,
    type,
    value,
    unit,
    quality,
    synced
FROM sensor_readings";

/// Row counts used by status reporting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReadingCounts {
    pub total: u64,
    pub unsynced: u64,
}

/// Repository interface for reading persistence.
pub trait ReadingRepository {
    fn append(&self, reading: &Reading) -> RepoResult<ReadingId>;
    fn list_unsynced(&self, limit: u32) -> RepoResult<Vec<StoredReading>>;
    fn mark_synced(&self, ids: &[ReadingId]) -> RepoResult<usize>;
    fn purge_synced_before(&self, cutoff: DateTime<Utc>) -> RepoResult<usize>;
    fn get(&self, id: ReadingId) -> RepoResult<Option<StoredReading>>;
    fn counts(&self) -> RepoResult<ReadingCounts>;
}

/// SQLite-backed reading repository.
pub struct SqliteReadingRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteReadingRepository<'conn> {
    pub fn new(conn: &'conn Connection) -> Self {
        Self { conn }
    }
}

impl ReadingRepository for SqliteReadingRepository<'_> {
    fn append(&self, reading: &Reading) -> RepoResult<ReadingId> {
        self.conn.execute(
            "INSERT INTO sensor_readings (
                sensor_id,
                timestamp,
                type,
                value,
                unit,
                quality,
                synced
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, 0);",
            params![
                reading.sensor_id.as_str(),
                format_timestamp(reading.timestamp),
                reading.kind.as_str(),
                reading.value,
                reading.unit.as_str(),
                reading.quality.as_str(),
            ],
        )?;

        Ok(self.conn.last_insert_rowid())
    }

    fn list_unsynced(&self, limit: u32) -> RepoResult<Vec<StoredReading>> {
        let mut stmt = self.conn.prepare(&format!(
            "{READING_SELECT_SQL}
             WHERE synced = 0
             ORDER BY id ASC
             LIMIT ?1;"
        ))?;

        let mut rows = stmt.query([i64::from(limit)])?;
        let mut readings = Vec::new();
        while let Some(row) = rows.next()? {
            readings.push(parse_reading_row(row)?);
        }

        Ok(readings)
    }

    fn mark_synced(&self, ids: &[ReadingId]) -> RepoResult<usize> {
        if ids.is_empty() {
            return Ok(0);
        }

        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        let mut changed = 0;
        // Chunked to stay under SQLite's bound-parameter limit.
        for chunk in ids.chunks(500) {
            let placeholders = vec!["?"; chunk.len()].join(", ");
            changed += tx.execute(
                &format!(
                    "UPDATE sensor_readings
                     SET synced = 1
                     WHERE synced = 0
                       AND id IN ({placeholders});"
                ),
                params_from_iter(chunk.iter()),
            )?;
        }
        tx.commit()?;

        Ok(changed)
    }

    fn purge_synced_before(&self, cutoff: DateTime<Utc>) -> RepoResult<usize> {
        let tx = Transaction::new_unchecked(self.conn, TransactionBehavior::Immediate)?;
        let deleted = tx.execute(
            "DELETE FROM sensor_readings
             WHERE synced = 1
               AND timestamp < ?1;",
            [format_timestamp(cutoff)],
        )?;
        tx.commit()?;

        Ok(deleted)
    }

    fn get(&self, id: ReadingId) -> RepoResult<Option<StoredReading>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{READING_SELECT_SQL} WHERE id = ?1;"))?;
        let mut rows = stmt.query([id])?;
        if let Some(row) = rows.next()? {
            return Ok(Some(parse_reading_row(row)?));
        }

        Ok(None)
    }

    fn counts(&self) -> RepoResult<ReadingCounts> {
        let (total, unsynced): (i64, i64) = self.conn.query_row(
            "SELECT
                COUNT(*),
                COALESCE(SUM(CASE WHEN synced = 0 THEN 1 ELSE 0 END), 0)
             FROM sensor_readings;",
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;

        Ok(ReadingCounts {
            total: total.max(0) as u64,
            unsynced: unsynced.max(0) as u64,
        })
    }
}

fn parse_reading_row(row: &Row<'_>) -> RepoResult<StoredReading> {
    let timestamp_text: String = row.get("timestamp")?;
    let timestamp = parse_timestamp(&timestamp_text).ok_or_else(|| {
        RepoError::InvalidData(format!(
            "invalid timestamp `{timestamp_text}` in sensor_readings.timestamp"
        ))
    })?;

    let kind: String = row.get("type")?;
    let quality: String = row.get("quality")?;

    Ok(StoredReading {
        id: row.get("id")?,
        reading: Reading {
            sensor_id: row.get("sensor_id")?,
            timestamp,
            kind: MeasurementKind::parse(&kind),
            value: row.get("value")?,
            unit: row.get("unit")?,
            quality: Quality::parse(&quality),
        },
        synced: int_to_bool(row.get("synced")?, "sensor_readings.synced")?,
    })
}
