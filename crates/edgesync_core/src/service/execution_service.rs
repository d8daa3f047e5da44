//! Execution engine: applies due commands exactly once on success.
//!
//! # Invariants
//! - Commands are applied in `start_time ASC, id ASC` order.
//! - A command is marked executed only after the actuator succeeded.
//! - After an actuator failure, later commands for the same zone wait for the
//!   next pass so a zone never runs out of order.

use crate::model::command::CommandId;
use crate::ports::{Actuator, ActuatorError};
use crate::store::{DurableStore, StoreError};
use chrono::{DateTime, Utc};
use log::{info, warn};
use std::collections::BTreeSet;
use std::error::Error;
use std::fmt::{Display, Formatter};

/// One failure observed during an execution pass.
#[derive(Debug)]
pub enum ExecutionFailure {
    Actuator {
        command_id: CommandId,
        error: ActuatorError,
    },
    Store(StoreError),
}

impl Display for ExecutionFailure {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Actuator { command_id, error } => {
                write!(f, "command `{command_id}`: {error}")
            }
            Self::Store(err) => write!(f, "{err}"),
        }
    }
}

impl Error for ExecutionFailure {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Actuator { error, .. } => Some(error),
            Self::Store(err) => Some(err),
        }
    }
}

/// Outcome of one `execute_due` pass.
#[derive(Debug, Default)]
pub struct ExecutionReport {
    /// Commands applied and marked executed, in application order.
    pub executed: Vec<CommandId>,
    /// Commands left pending because an earlier run in their zone failed.
    pub deferred: Vec<CommandId>,
    pub failures: Vec<ExecutionFailure>,
}

impl ExecutionReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Applies due pending commands through an `Actuator`.
pub struct ExecutionEngine<A: Actuator> {
    actuator: A,
}

impl<A: Actuator> ExecutionEngine<A> {
    pub fn new(actuator: A) -> Self {
        Self { actuator }
    }

    pub fn actuator(&self) -> &A {
        &self.actuator
    }

    /// Applies every command due at `now`.
    pub fn execute_due(&mut self, store: &DurableStore, now: DateTime<Utc>) -> ExecutionReport {
        let mut report = ExecutionReport::default();
        let due = match store.due_pending_commands(now) {
            Ok(due) => due,
            Err(err) => {
                report.failures.push(ExecutionFailure::Store(err));
                return report;
            }
        };

        let mut blocked_zones = BTreeSet::new();
        for command in due {
            if blocked_zones.contains(&command.zone_id) {
                report.deferred.push(command.id);
                continue;
            }

            info!(
                "event=execute_command module=execution status=start command_id={} zone_id={} start_time={}",
                command.id, command.zone_id, command.start_time
            );
            if let Err(error) = self.actuator.apply(&command) {
                warn!(
                    "event=execute_command module=execution status=error command_id={} zone_id={} error={}",
                    command.id, command.zone_id, error
                );
                blocked_zones.insert(command.zone_id.clone());
                report.failures.push(ExecutionFailure::Actuator {
                    command_id: command.id,
                    error,
                });
                continue;
            }

            match store.mark_executed(&command.id) {
                Ok(true) => {
                    info!(
                        "event=execute_command module=execution status=ok command_id={}",
                        command.id
                    );
                    report.executed.push(command.id);
                }
                Ok(false) => warn!(
                    "event=execute_command module=execution status=skipped command_id={} reason=already_executed",
                    command.id
                ),
                Err(err) => {
                    // Storage is failing; stop before driving more valves.
                    report.failures.push(ExecutionFailure::Store(err));
                    break;
                }
            }
        }

        report
    }
}
