//! Repository layer for readings and commands.
//!
//! # Responsibility
//! - Keep SQLite query details behind per-table repositories.
//! - Run every multi-row mutation inside one immediate transaction.
//!
//! # Invariants
//! - Read paths reject invalid persisted state instead of masking it.
//! - Repositories never change the sync or executed flag on their own
//!   initiative; callers decide when a flag flips.

use crate::db::DbError;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub mod command_repo;
pub mod reading_repo;

pub type RepoResult<T> = Result<T, RepoError>;

/// Repository error shared by reading and command persistence.
#[derive(Debug)]
pub enum RepoError {
    Db(DbError),
    /// Persisted row cannot be mapped back into the domain model.
    InvalidData(String),
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "{err}"),
            Self::InvalidData(message) => write!(f, "invalid persisted data: {message}"),
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            Self::InvalidData(_) => None,
        }
    }
}

impl From<DbError> for RepoError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for RepoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

pub(crate) fn int_to_bool(value: i64, column: &str) -> RepoResult<bool> {
    match value {
        0 => Ok(false),
        1 => Ok(true),
        other => Err(RepoError::InvalidData(format!(
            "invalid flag value `{other}` in {column}"
        ))),
    }
}
