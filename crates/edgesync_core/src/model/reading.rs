//! Sensor reading model.
//!
//! # Invariants
//! - A reading is immutable once created; only the store-owned sync flag
//!   changes, and only from `false` to `true`.

use chrono::{DateTime, Utc};

/// Store-assigned identifier; increases with insertion order.
pub type ReadingId = i64;

/// Measurement kind reported by a sensor.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MeasurementKind {
    SoilMoisture,
    Temperature,
    Ph,
    Light,
    Co2,
    WaterLevel,
    /// Any other kind, kept exactly as reported.
    Other(String),
}

impl MeasurementKind {
    pub fn as_str(&self) -> &str {
        match self {
            Self::SoilMoisture => "soil_moisture",
            Self::Temperature => "temperature",
            Self::Ph => "ph",
            Self::Light => "light",
            Self::Co2 => "co2",
            Self::WaterLevel => "water_level",
            Self::Other(value) => value.as_str(),
        }
    }

    pub fn parse(value: &str) -> Self {
        match value {
            "soil_moisture" => Self::SoilMoisture,
            "temperature" => Self::Temperature,
            "ph" => Self::Ph,
            "light" => Self::Light,
            "co2" => Self::Co2,
            "water_level" => Self::WaterLevel,
            other => Self::Other(other.to_string()),
        }
    }
}

/// Data quality tag attached by the sensor shim.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub enum Quality {
    #[default]
    Good,
    Degraded,
    Invalid,
    Other(String),
}

impl Quality {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Good => "good",
            Self::Degraded => "degraded",
            Self::Invalid => "invalid",
            Self::Other(value) => value.as_str(),
        }
    }

    pub fn parse(value: &str) -> Self {
        match value {
            "good" => Self::Good,
            "degraded" => Self::Degraded,
            "invalid" => Self::Invalid,
            other => Self::Other(other.to_string()),
        }
    }
}

/// One timestamped sensor measurement.
#[derive(Debug, Clone, PartialEq)]
pub struct Reading {
    pub sensor_id: String,
    /// Device clock at sampling time.
    pub timestamp: DateTime<Utc>,
    pub kind: MeasurementKind,
    pub value: f64,
    pub unit: String,
    pub quality: Quality,
}

impl Reading {
    /// Creates a reading with `good` quality.
    pub fn new(
        sensor_id: impl Into<String>,
        timestamp: DateTime<Utc>,
        kind: MeasurementKind,
        value: f64,
        unit: impl Into<String>,
    ) -> Self {
        Self {
            sensor_id: sensor_id.into(),
            timestamp,
            kind,
            value,
            unit: unit.into(),
            quality: Quality::Good,
        }
    }

    pub fn with_quality(mut self, quality: Quality) -> Self {
        self.quality = quality;
        self
    }
}

/// A reading as persisted, with its store id and sync flag.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredReading {
    pub id: ReadingId,
    pub reading: Reading,
    pub synced: bool,
}
