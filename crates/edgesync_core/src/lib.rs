//! Core logic for the EdgeSync gateway agent.
//! This crate owns durable buffering, cloud sync and local command execution.

pub mod agent;
pub mod cloud;
pub mod config;
pub mod db;
pub mod logging;
pub mod model;
pub mod ports;
pub mod repo;
pub mod service;
pub mod store;

pub use agent::{Agent, AgentError, AgentSettings, TickReport};
pub use cloud::{
    CloudApi, CloudClientConfig, CloudError, CloudResult, Credential, HttpCloudClient,
};
pub use config::{AgentConfig, ConfigError};
pub use logging::{init_logging, logging_status};
pub use model::command::{Command, CommandId, CommandStatus};
pub use model::reading::{MeasurementKind, Quality, Reading, ReadingId, StoredReading};
pub use ports::{Actuator, ActuatorError, LoggingActuator, SensorError, SensorSource, SimulatedSensors};
pub use repo::command_repo::UpsertSummary;
pub use service::execution_service::{ExecutionEngine, ExecutionFailure, ExecutionReport};
pub use service::sync_service::{SyncEngine, SyncFailure, SyncReport, SyncState};
pub use store::{DurableStore, ReadingBatch, StoreError, StoreResult, StoreStats};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
