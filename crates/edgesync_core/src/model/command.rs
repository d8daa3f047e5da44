//! Irrigation command (schedule entry) model.
//!
//! # Invariants
//! - `id` is assigned upstream and is the upsert key.
//! - `executed` flips to `true` at most once, and only through the
//!   execution engine.

use chrono::{DateTime, Duration, Utc};

/// Upstream-assigned command identifier.
pub type CommandId = String;

/// Lifecycle status of a command.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub enum CommandStatus {
    #[default]
    Pending,
    Active,
    Completed,
    Cancelled,
    Failed,
    Other(String),
}

impl CommandStatus {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Pending => "pending",
            Self::Active => "active",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
            Self::Failed => "failed",
            Self::Other(value) => value.as_str(),
        }
    }

    pub fn parse(value: &str) -> Self {
        match value {
            "pending" => Self::Pending,
            "active" => Self::Active,
            "completed" => Self::Completed,
            "cancelled" => Self::Cancelled,
            "failed" => Self::Failed,
            other => Self::Other(other.to_string()),
        }
    }
}

/// A remotely issued, time-scheduled irrigation run.
#[derive(Debug, Clone, PartialEq)]
pub struct Command {
    pub id: CommandId,
    pub zone_id: String,
    pub start_time: DateTime<Utc>,
    pub duration_minutes: u32,
    /// Liters per minute.
    pub flow_rate: f64,
    pub status: CommandStatus,
    pub executed: bool,
}

impl Command {
    /// Creates a pending, not yet executed command.
    pub fn new(
        id: impl Into<CommandId>,
        zone_id: impl Into<String>,
        start_time: DateTime<Utc>,
        duration_minutes: u32,
        flow_rate: f64,
    ) -> Self {
        Self {
            id: id.into(),
            zone_id: zone_id.into(),
            start_time,
            duration_minutes,
            flow_rate,
            status: CommandStatus::Pending,
            executed: false,
        }
    }

    pub fn with_status(mut self, status: CommandStatus) -> Self {
        self.status = status;
        self
    }

    pub fn duration(&self) -> Duration {
        Duration::minutes(i64::from(self.duration_minutes))
    }
}

#[cfg(test)]
mod tests {
    use super::{Command, CommandStatus};
    use chrono::{Duration, TimeZone, Utc};

    #[test]
    fn new_command_is_pending_and_unexecuted() {
        let start = Utc.with_ymd_and_hms(2024, 5, 1, 6, 0, 0).unwrap();
        let command = Command::new("s1", "z1", start, 15, 2.0);

        assert_eq!(command.status, CommandStatus::Pending);
        assert!(!command.executed);
        assert_eq!(command.duration(), Duration::minutes(15));
    }

    #[test]
    fn unknown_status_is_preserved_verbatim() {
        let status = CommandStatus::parse("paused");
        assert_eq!(status.as_str(), "paused");
        assert_eq!(CommandStatus::parse("cancelled"), CommandStatus::Cancelled);
    }
}
