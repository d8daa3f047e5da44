//! Agent configuration.
//!
//! Loaded from a TOML file where every key is optional. The security key may
//! be supplied through `EDGESYNC_SECURITY_KEY` instead of the file.

use crate::cloud::CloudClientConfig;
use serde::Deserialize;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable overriding `cloud.security_key`.
pub const SECURITY_KEY_ENV: &str = "EDGESYNC_SECURITY_KEY";

/// Root configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    pub cloud: CloudConfig,
    pub storage: StorageConfig,
    pub sync: SyncConfig,
    pub sensors: SensorConfig,
    pub cleanup: CleanupConfig,
    pub agent: LoopConfig,
    pub logging: LoggingConfig,
}

/// Upstream endpoint and device identity.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CloudConfig {
    pub base_url: String,
    pub device_id: String,
    pub security_key: String,
    /// Restricts the schedule pull to one zone.
    pub zone_filter: Option<String>,
    pub auth_timeout_secs: u64,
    pub pull_timeout_secs: u64,
    pub push_timeout_secs: u64,
}

impl Default for CloudConfig {
    fn default() -> Self {
        Self {
            base_url: "http://api-gateway:3000".to_string(),
            device_id: "edge-001".to_string(),
            security_key: String::new(),
            zone_filter: None,
            auth_timeout_secs: 5,
            pull_timeout_secs: 5,
            push_timeout_secs: 10,
        }
    }
}

/// Local database location.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub database: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database: PathBuf::from("edge_data.db"),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    pub interval_secs: u64,
    pub batch_size: u32,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            interval_secs: 60,
            batch_size: 100,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SensorConfig {
    pub interval_secs: u64,
}

impl Default for SensorConfig {
    fn default() -> Self {
        Self { interval_secs: 300 }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CleanupConfig {
    pub interval_secs: u64,
    pub retention_days: u32,
}

impl Default for CleanupConfig {
    fn default() -> Self {
        Self {
            interval_secs: 3600,
            retention_days: 7,
        }
    }
}

/// Control loop pacing.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoopConfig {
    pub tick_secs: u64,
    /// Ceiling of the failure backoff.
    pub backoff_max_secs: u64,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            tick_secs: 10,
            backoff_max_secs: 300,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    /// Absolute directory for rolling log files; stderr only when unset.
    pub directory: Option<PathBuf>,
    pub stderr: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            directory: None,
            stderr: true,
        }
    }
}

/// Configuration load/validation errors.
#[derive(Debug)]
pub enum ConfigError {
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    Invalid(String),
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Read { path, source } => {
                write!(f, "failed to read config file {}: {source}", path.display())
            }
            Self::Parse { path, source } => {
                write!(f, "failed to parse config file {}: {source}", path.display())
            }
            Self::Invalid(message) => write!(f, "invalid configuration: {message}"),
        }
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Read { source, .. } => Some(source),
            Self::Parse { source, .. } => Some(source),
            Self::Invalid(_) => None,
        }
    }
}

impl AgentConfig {
    /// Loads a TOML file, applies the environment override and validates.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config: Self = toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.apply_env_override(std::env::var(SECURITY_KEY_ENV).ok());
        config.validate()?;
        Ok(config)
    }

    /// Defaults plus the environment override, validated.
    pub fn from_defaults() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        config.apply_env_override(std::env::var(SECURITY_KEY_ENV).ok());
        config.validate()?;
        Ok(config)
    }

    fn apply_env_override(&mut self, security_key: Option<String>) {
        if let Some(key) = security_key.filter(|key| !key.trim().is_empty()) {
            self.cloud.security_key = key;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.cloud.base_url.trim().is_empty() {
            return Err(ConfigError::Invalid("cloud.base_url cannot be empty".into()));
        }
        if self.cloud.device_id.trim().is_empty() {
            return Err(ConfigError::Invalid("cloud.device_id cannot be empty".into()));
        }
        if self.sync.batch_size == 0 {
            return Err(ConfigError::Invalid("sync.batch_size must be positive".into()));
        }
        for (name, value) in [
            ("cloud.auth_timeout_secs", self.cloud.auth_timeout_secs),
            ("cloud.pull_timeout_secs", self.cloud.pull_timeout_secs),
            ("cloud.push_timeout_secs", self.cloud.push_timeout_secs),
            ("sync.interval_secs", self.sync.interval_secs),
            ("sensors.interval_secs", self.sensors.interval_secs),
            ("cleanup.interval_secs", self.cleanup.interval_secs),
            ("agent.tick_secs", self.agent.tick_secs),
        ] {
            if value == 0 {
                return Err(ConfigError::Invalid(format!("{name} must be positive")));
            }
        }
        if self.agent.backoff_max_secs < self.agent.tick_secs {
            return Err(ConfigError::Invalid(
                "agent.backoff_max_secs must be at least agent.tick_secs".into(),
            ));
        }
        Ok(())
    }

    pub fn cloud_client_config(&self) -> CloudClientConfig {
        CloudClientConfig {
            base_url: self.cloud.base_url.clone(),
            device_id: self.cloud.device_id.clone(),
            security_key: self.cloud.security_key.clone(),
            zone_filter: self.cloud.zone_filter.clone(),
            auth_timeout: Duration::from_secs(self.cloud.auth_timeout_secs),
            push_timeout: Duration::from_secs(self.cloud.push_timeout_secs),
            pull_timeout: Duration::from_secs(self.cloud.pull_timeout_secs),
        }
    }
}
