//! Domain model for buffered telemetry and remotely issued commands.
//!
//! # Responsibility
//! - Define the records persisted by the durable store.
//! - Keep string codecs for enum-like columns in one place.
//!
//! # Invariants
//! - Unknown enum-like values are preserved verbatim, never coerced.
//! - Timestamps are UTC in memory and fixed-width RFC 3339 at rest.

pub mod command;
pub mod reading;
pub mod time;
