//! JSON payloads exchanged with the upstream API.

use crate::model::command::{Command, CommandStatus};
use crate::model::reading::Reading;
use crate::model::time::{format_timestamp, parse_timestamp};
use serde::{Deserialize, Serialize};

/// `POST /api/devices/authenticate` body.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthRequest<'a> {
    pub device_id: &'a str,
    pub security_key: &'a str,
}

/// Response envelope used by every upstream route: `{success, data, error}`.
#[derive(Debug, Deserialize)]
pub struct Envelope<T> {
    #[serde(default)]
    pub success: Option<bool>,
    #[serde(default)]
    pub data: Option<T>,
    #[serde(default)]
    pub error: Option<String>,
    /// Some gateways return the token at the top level.
    #[serde(default)]
    pub token: Option<String>,
}

/// `data` of a successful authenticate response.
#[derive(Debug, Default, Deserialize)]
pub struct AuthData {
    #[serde(default)]
    pub token: Option<String>,
}

/// One element of the `POST /api/sensors/readings` array.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadingPayload<'a> {
    pub sensor_id: &'a str,
    pub timestamp: String,
    #[serde(rename = "type")]
    pub kind: &'a str,
    pub value: f64,
    pub unit: &'a str,
    pub quality: &'a str,
}

impl<'a> From<&'a Reading> for ReadingPayload<'a> {
    fn from(reading: &'a Reading) -> Self {
        Self {
            sensor_id: reading.sensor_id.as_str(),
            timestamp: format_timestamp(reading.timestamp),
            kind: reading.kind.as_str(),
            value: reading.value,
            unit: reading.unit.as_str(),
            quality: reading.quality.as_str(),
        }
    }
}

/// One element of `GET /api/irrigation/schedules` `data`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchedulePayload {
    pub id: String,
    pub zone_id: String,
    pub start_time: String,
    pub duration: i64,
    pub flow_rate: f64,
    #[serde(default)]
    pub status: Option<String>,
}

impl SchedulePayload {
    /// Maps the payload into a pending-by-default, unexecuted command.
    pub fn into_command(self) -> Result<Command, String> {
        let start_time = parse_timestamp(&self.start_time).ok_or_else(|| {
            format!(
                "schedule `{}` has invalid startTime `{}`",
                self.id, self.start_time
            )
        })?;
        let duration_minutes = u32::try_from(self.duration).map_err(|_| {
            format!(
                "schedule `{}` has invalid duration `{}`",
                self.id, self.duration
            )
        })?;
        if !self.flow_rate.is_finite() {
            return Err(format!("schedule `{}` has non-finite flowRate", self.id));
        }

        let status = self
            .status
            .as_deref()
            .map(CommandStatus::parse)
            .unwrap_or_default();

        Ok(Command::new(
            self.id,
            self.zone_id,
            start_time,
            duration_minutes,
            self.flow_rate,
        )
        .with_status(status))
    }
}
