//! Capability ports for the physical I/O shims.
//!
//! The core never touches a hardware bus. Sensor sampling and valve drive are
//! injected through these traits; the shipped implementations are a
//! simulated sensor bank and an actuator that only logs.

use crate::model::command::Command;
use crate::model::reading::{MeasurementKind, Reading};
use crate::model::time::format_timestamp;
use chrono::{DateTime, Utc};
use log::info;
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Sensor sampling failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SensorError {
    pub sensor_id: String,
    pub message: String,
}

impl Display for SensorError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "sensor `{}` read failed: {}", self.sensor_id, self.message)
    }
}

impl Error for SensorError {}

/// Actuator drive failure. The command stays pending and is retried.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActuatorError {
    pub zone_id: String,
    pub message: String,
}

impl Display for ActuatorError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "actuator for zone `{}` failed: {}", self.zone_id, self.message)
    }
}

impl Error for ActuatorError {}

/// Read-side port: produces readings stamped at `now`.
pub trait SensorSource {
    fn read(&mut self, now: DateTime<Utc>) -> Result<Vec<Reading>, SensorError>;
}

/// Write-side port: applies one irrigation run synchronously.
pub trait Actuator {
    fn apply(&mut self, command: &Command) -> Result<(), ActuatorError>;
}

/// Fixed-value sensor bank for bench runs without hardware.
#[derive(Debug, Clone, Default)]
pub struct SimulatedSensors;

impl SensorSource for SimulatedSensors {
    fn read(&mut self, now: DateTime<Utc>) -> Result<Vec<Reading>, SensorError> {
        Ok(vec![
            Reading::new(
                "sensor-001",
                now,
                MeasurementKind::SoilMoisture,
                65.5,
                "%",
            ),
            Reading::new("sensor-002", now, MeasurementKind::Temperature, 25.3, "°C"),
        ])
    }
}

/// Actuator that records the run in the log instead of driving a valve.
#[derive(Debug, Clone, Default)]
pub struct LoggingActuator;

impl Actuator for LoggingActuator {
    fn apply(&mut self, command: &Command) -> Result<(), ActuatorError> {
        info!(
            "event=valve_run module=actuator status=ok command_id={} zone_id={} duration_min={} flow_rate={} planned_end={}",
            command.id,
            command.zone_id,
            command.duration().num_minutes(),
            command.flow_rate,
            format_timestamp(command.start_time + command.duration())
        );
        Ok(())
    }
}
