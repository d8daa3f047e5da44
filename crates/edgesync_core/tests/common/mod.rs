//! In-process fakes for the cloud and hardware seams.

#![allow(dead_code)]

use chrono::{DateTime, Utc};
use edgesync_core::{
    Actuator, ActuatorError, CloudApi, CloudError, CloudResult, Command, Credential, Reading,
};
use std::cell::{Cell, RefCell};
use std::collections::{BTreeSet, VecDeque};

/// Scriptable upstream. Queued results win; otherwise it answers from its
/// current online flag and schedule.
#[derive(Default)]
pub struct FakeCloud {
    pub offline: Cell<bool>,
    pub schedule: RefCell<Vec<Command>>,
    pub auth_results: RefCell<VecDeque<CloudResult<Credential>>>,
    pub push_results: RefCell<VecDeque<CloudResult<()>>>,
    pub pull_results: RefCell<VecDeque<CloudResult<Vec<Command>>>>,
    pub pushed: RefCell<Vec<Vec<Reading>>>,
    pub auth_calls: Cell<usize>,
    pub push_calls: Cell<usize>,
    pub pull_calls: Cell<usize>,
}

impl FakeCloud {
    pub fn with_schedule(commands: Vec<Command>) -> Self {
        let cloud = Self::default();
        cloud.schedule.replace(commands);
        cloud
    }

    pub fn pushed_count(&self) -> usize {
        self.pushed.borrow().iter().map(Vec::len).sum()
    }

    fn unreachable() -> CloudError {
        CloudError::Network("connection refused".to_string())
    }
}

impl CloudApi for FakeCloud {
    fn authenticate(&self) -> CloudResult<Credential> {
        self.auth_calls.set(self.auth_calls.get() + 1);
        if let Some(result) = self.auth_results.borrow_mut().pop_front() {
            return result;
        }
        if self.offline.get() {
            return Err(Self::unreachable());
        }
        Ok(Credential::bearer("token-1"))
    }

    fn push_readings(&self, _credential: &Credential, batch: &[Reading]) -> CloudResult<()> {
        self.push_calls.set(self.push_calls.get() + 1);
        let result = match self.push_results.borrow_mut().pop_front() {
            Some(result) => result,
            None if self.offline.get() => Err(Self::unreachable()),
            None => Ok(()),
        };
        if result.is_ok() {
            self.pushed.borrow_mut().push(batch.to_vec());
        }
        result
    }

    fn pull_commands(&self, _credential: &Credential) -> CloudResult<Vec<Command>> {
        self.pull_calls.set(self.pull_calls.get() + 1);
        if let Some(result) = self.pull_results.borrow_mut().pop_front() {
            return result;
        }
        if self.offline.get() {
            return Err(Self::unreachable());
        }
        Ok(self.schedule.borrow().clone())
    }
}

/// Actuator that records every run and fails for configured zones.
#[derive(Debug, Default)]
pub struct RecordingActuator {
    pub applied: Vec<(String, DateTime<Utc>)>,
    pub failing_zones: BTreeSet<String>,
}

impl RecordingActuator {
    pub fn failing(zone_id: &str) -> Self {
        Self {
            failing_zones: BTreeSet::from([zone_id.to_string()]),
            ..Self::default()
        }
    }

    pub fn applied_ids(&self) -> Vec<&str> {
        self.applied.iter().map(|(id, _)| id.as_str()).collect()
    }
}

impl Actuator for RecordingActuator {
    fn apply(&mut self, command: &Command) -> Result<(), ActuatorError> {
        if self.failing_zones.contains(&command.zone_id) {
            return Err(ActuatorError {
                zone_id: command.zone_id.clone(),
                message: "valve driver offline".to_string(),
            });
        }
        self.applied.push((command.id.clone(), command.start_time));
        Ok(())
    }
}
