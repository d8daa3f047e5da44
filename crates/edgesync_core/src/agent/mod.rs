//! Control loop and controller context.
//!
//! # Responsibility
//! - Own every long-lived component (store, engines, shims) for the process
//!   lifetime; nothing lives in globals.
//! - Invoke sensor reads, sync, execution and cleanup on their intervals.
//! - Keep running through any failure until an external shutdown request.
//!
//! # Invariants
//! - Tasks run one at a time on the calling thread.
//! - A failing tick is followed by a bounded exponential backoff pause.
//! - Shutdown is observed between ticks; an in-flight tick always completes.

pub mod timer;

use crate::cloud::CloudApi;
use crate::config::AgentConfig;
use crate::ports::{Actuator, SensorError, SensorSource};
use crate::service::execution_service::{ExecutionEngine, ExecutionReport};
use crate::service::sync_service::{SyncEngine, SyncReport, SyncState};
use crate::store::{DurableStore, StoreError};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use log::{error, info, warn};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use timer::{Backoff, IntervalTimer};

const SHUTDOWN_POLL: Duration = Duration::from_millis(250);

/// Loop pacing and retention, usually derived from `AgentConfig`.
#[derive(Debug, Clone)]
pub struct AgentSettings {
    pub sensor_interval: Duration,
    pub sync_interval: Duration,
    pub cleanup_interval: Duration,
    pub retention: Duration,
    pub tick_interval: Duration,
    pub backoff_max: Duration,
    pub batch_size: u32,
}

impl From<&AgentConfig> for AgentSettings {
    fn from(config: &AgentConfig) -> Self {
        Self {
            sensor_interval: Duration::from_secs(config.sensors.interval_secs),
            sync_interval: Duration::from_secs(config.sync.interval_secs),
            cleanup_interval: Duration::from_secs(config.cleanup.interval_secs),
            retention: Duration::from_secs(u64::from(config.cleanup.retention_days) * 24 * 3600),
            tick_interval: Duration::from_secs(config.agent.tick_secs),
            backoff_max: Duration::from_secs(config.agent.backoff_max_secs),
            batch_size: config.sync.batch_size,
        }
    }
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self::from(&AgentConfig::default())
    }
}

/// Loop-level failure of a boundary task.
#[derive(Debug)]
pub enum AgentError {
    Sensor(SensorError),
    Store(StoreError),
    /// A task panicked; the payload is already sanitized.
    Panic(String),
}

impl Display for AgentError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sensor(err) => write!(f, "{err}"),
            Self::Store(err) => write!(f, "{err}"),
            Self::Panic(message) => write!(f, "tick panicked: {message}"),
        }
    }
}

impl Error for AgentError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Sensor(err) => Some(err),
            Self::Store(err) => Some(err),
            Self::Panic(_) => None,
        }
    }
}

impl From<SensorError> for AgentError {
    fn from(value: SensorError) -> Self {
        Self::Sensor(value)
    }
}

impl From<StoreError> for AgentError {
    fn from(value: StoreError) -> Self {
        Self::Store(value)
    }
}

/// What one tick did.
#[derive(Debug, Default)]
pub struct TickReport {
    /// Readings appended, when the sensor task ran and succeeded.
    pub recorded: Option<usize>,
    pub sync: Option<SyncReport>,
    pub execution: ExecutionReport,
    /// Readings purged, when the cleanup task ran and succeeded.
    pub purged: Option<usize>,
    pub errors: Vec<AgentError>,
}

impl TickReport {
    /// Whether the loop should keep its normal pace.
    ///
    /// Sync failures do not count: the sync engine retries on its own interval.
    pub fn is_healthy(&self) -> bool {
        self.errors.is_empty() && self.execution.is_clean()
    }
}

/// Controller context: constructed at startup, dropped on shutdown.
pub struct Agent<C: CloudApi, S: SensorSource, A: Actuator> {
    store: DurableStore,
    sync: SyncEngine<C>,
    executor: ExecutionEngine<A>,
    sensors: S,
    sensor_timer: IntervalTimer,
    sync_timer: IntervalTimer,
    cleanup_timer: IntervalTimer,
    retention: ChronoDuration,
    tick_interval: Duration,
    backoff: Backoff,
}

impl<C: CloudApi, S: SensorSource, A: Actuator> Agent<C, S, A> {
    pub fn new(
        store: DurableStore,
        client: C,
        sensors: S,
        actuator: A,
        settings: &AgentSettings,
    ) -> Self {
        Self {
            store,
            sync: SyncEngine::new(client, settings.batch_size),
            executor: ExecutionEngine::new(actuator),
            sensors,
            sensor_timer: IntervalTimer::new(settings.sensor_interval),
            sync_timer: IntervalTimer::new(settings.sync_interval),
            cleanup_timer: IntervalTimer::new(settings.cleanup_interval),
            retention: ChronoDuration::from_std(settings.retention)
                .unwrap_or(ChronoDuration::MAX),
            tick_interval: settings.tick_interval,
            backoff: Backoff::new(settings.tick_interval, settings.backoff_max),
        }
    }

    pub fn store(&self) -> &DurableStore {
        &self.store
    }

    pub fn sync_state(&self) -> SyncState {
        self.sync.state()
    }

    pub fn actuator(&self) -> &A {
        self.executor.actuator()
    }

    /// Samples the sensor shim and appends every reading.
    pub fn record_readings(&mut self, now: DateTime<Utc>) -> Result<usize, AgentError> {
        let readings = self.sensors.read(now)?;
        for reading in &readings {
            self.store.append_reading(reading)?;
        }
        info!(
            "event=record_readings module=agent status=ok count={}",
            readings.len()
        );
        Ok(readings.len())
    }

    /// Runs one sync cycle regardless of the sync interval.
    pub fn sync_now(&mut self) -> SyncReport {
        self.sync.sync_cycle(&self.store)
    }

    /// Runs one execution pass at `now`.
    pub fn execute_now(&mut self, now: DateTime<Utc>) -> ExecutionReport {
        self.executor.execute_due(&self.store, now)
    }

    /// Purges synced readings older than the retention window.
    pub fn cleanup(&self, now: DateTime<Utc>) -> Result<usize, AgentError> {
        let cutoff = now
            .checked_sub_signed(self.retention)
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        Ok(self.store.purge_synced_older_than(cutoff)?)
    }

    /// Runs every task that is due at `now`.
    pub fn tick(&mut self, now: DateTime<Utc>) -> TickReport {
        let mut report = TickReport::default();

        if self.sensor_timer.poll(now) {
            match self.record_readings(now) {
                Ok(count) => report.recorded = Some(count),
                Err(err) => report.errors.push(err),
            }
        }

        if self.sync_timer.poll(now) {
            report.sync = Some(self.sync_now());
        }

        report.execution = self.execute_now(now);

        if self.cleanup_timer.poll(now) {
            match self.cleanup(now) {
                Ok(count) => report.purged = Some(count),
                Err(err) => report.errors.push(err),
            }
        }

        report
    }

    /// Ticks until `shutdown` is set.
    pub fn run(&mut self, shutdown: &AtomicBool) {
        info!(
            "event=agent_start module=agent status=ok tick_ms={}",
            self.tick_interval.as_millis()
        );

        while !shutdown.load(Ordering::SeqCst) {
            let now = Utc::now();
            let report = match catch_unwind(AssertUnwindSafe(|| self.tick(now))) {
                Ok(report) => report,
                Err(payload) => TickReport {
                    errors: vec![AgentError::Panic(panic_message(payload.as_ref()))],
                    ..TickReport::default()
                },
            };

            let pause = if report.is_healthy() {
                self.backoff.reset();
                self.tick_interval
            } else {
                for err in &report.errors {
                    error!("event=tick module=agent status=error error={}", err);
                }
                for failure in &report.execution.failures {
                    error!("event=tick module=agent status=error error={}", failure);
                }
                let delay = self.backoff.next_delay();
                warn!(
                    "event=tick_backoff module=agent status=retry consecutive_failures={} delay_ms={}",
                    self.backoff.consecutive_failures(),
                    delay.as_millis()
                );
                delay
            };

            sleep_unless_shutdown(pause, shutdown);
        }

        info!(
            "event=agent_stop module=agent status=ok sync_state={}",
            self.sync.state().as_str()
        );
    }
}

fn sleep_unless_shutdown(total: Duration, shutdown: &AtomicBool) {
    let deadline = Instant::now() + total;
    while !shutdown.load(Ordering::SeqCst) {
        let now = Instant::now();
        if now >= deadline {
            return;
        }
        std::thread::sleep((deadline - now).min(SHUTDOWN_POLL));
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    let message = if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    };
    crate::logging::sanitize_message(&message, 160)
}
