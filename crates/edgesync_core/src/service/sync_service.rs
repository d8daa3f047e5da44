//! Sync engine: uploads buffered readings and downloads commands.
//!
//! # Responsibility
//! - Drive the `Unauthenticated -> Authenticated -> Offline` state machine.
//! - Push one bounded batch of unsynced readings per cycle.
//! - Pull the command set and upsert it by id.
//!
//! # Invariants
//! - Readings are marked synced only after upstream acknowledged the push,
//!   and exactly the pushed id set is marked (at-least-once delivery).
//! - A failed cycle leaves readings unsynced and commands unmodified.
//! - `sync_cycle` never returns an error; failures are in the `SyncReport`.

use crate::cloud::{CloudApi, CloudError, Credential};
use crate::model::reading::Reading;
use crate::repo::command_repo::UpsertSummary;
use crate::store::{DurableStore, StoreError};
use log::{debug, info, warn};
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Default upper bound of readings per push.
pub const DEFAULT_BATCH_SIZE: u32 = 100;

/// Connection state of the sync engine. There is no terminal state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SyncState {
    #[default]
    Unauthenticated,
    Authenticated,
    Offline,
}

impl SyncState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Unauthenticated => "unauthenticated",
            Self::Authenticated => "authenticated",
            Self::Offline => "offline",
        }
    }
}

/// One failure observed during a sync cycle.
#[derive(Debug)]
pub enum SyncFailure {
    Authenticate(CloudError),
    Push(CloudError),
    Pull(CloudError),
    Store(StoreError),
}

impl Display for SyncFailure {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Authenticate(err) => write!(f, "authenticate: {err}"),
            Self::Push(err) => write!(f, "push readings: {err}"),
            Self::Pull(err) => write!(f, "pull commands: {err}"),
            Self::Store(err) => write!(f, "{err}"),
        }
    }
}

impl Error for SyncFailure {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Authenticate(err) | Self::Push(err) | Self::Pull(err) => Some(err),
            Self::Store(err) => Some(err),
        }
    }
}

/// Outcome of one `sync_cycle`.
#[derive(Debug, Default)]
pub struct SyncReport {
    /// Engine state after the cycle.
    pub state: SyncState,
    /// Readings acknowledged upstream and marked synced.
    pub pushed: usize,
    /// Commands received from upstream, `None` when the pull did not happen
    /// or failed.
    pub pulled: Option<usize>,
    pub upsert: UpsertSummary,
    pub failures: Vec<SyncFailure>,
}

impl SyncReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Reconciles `DurableStore` with an upstream `CloudApi`.
pub struct SyncEngine<C: CloudApi> {
    client: C,
    state: SyncState,
    credential: Option<Credential>,
    batch_size: u32,
}

impl<C: CloudApi> SyncEngine<C> {
    /// Creates an engine in the `Unauthenticated` state.
    pub fn new(client: C, batch_size: u32) -> Self {
        Self {
            client,
            state: SyncState::Unauthenticated,
            credential: None,
            batch_size: batch_size.max(1),
        }
    }

    pub fn state(&self) -> SyncState {
        self.state
    }

    /// Runs one reconciliation cycle against `store`.
    ///
    /// # Contract
    /// - Not authenticated: authenticate first; on failure go `Offline` and
    ///   stop, leaving everything buffered.
    /// - Push failure: go `Offline` (or `Unauthenticated` on a rejected
    ///   credential) and stop before pulling.
    /// - Pull failure: unreachable upstream goes `Offline`; an upstream error
    ///   response is reported without a state change.
    pub fn sync_cycle(&mut self, store: &DurableStore) -> SyncReport {
        let mut report = SyncReport::default();

        let credential = match self.ensure_authenticated() {
            Ok(credential) => credential,
            Err(err) => {
                report.failures.push(SyncFailure::Authenticate(err));
                report.state = self.state;
                return report;
            }
        };

        if self.push_batch(store, &credential, &mut report) {
            self.pull_commands(store, &credential, &mut report);
        }

        report.state = self.state;
        debug!(
            "event=sync_cycle module=sync status={} state={} pushed={} pulled={} failures={}",
            if report.is_clean() { "ok" } else { "degraded" },
            report.state.as_str(),
            report.pushed,
            report.pulled.unwrap_or(0),
            report.failures.len()
        );
        report
    }

    fn ensure_authenticated(&mut self) -> Result<Credential, CloudError> {
        if self.state == SyncState::Authenticated {
            if let Some(credential) = &self.credential {
                return Ok(credential.clone());
            }
        }

        match self.client.authenticate() {
            Ok(credential) => {
                self.transition(SyncState::Authenticated);
                self.credential = Some(credential.clone());
                Ok(credential)
            }
            Err(err) => {
                warn!(
                    "event=authenticate module=sync status=error error_code={} error={}",
                    err.code(),
                    err
                );
                self.credential = None;
                self.transition(SyncState::Offline);
                Err(err)
            }
        }
    }

    /// Returns `false` when the cycle must stop before pulling.
    fn push_batch(
        &mut self,
        store: &DurableStore,
        credential: &Credential,
        report: &mut SyncReport,
    ) -> bool {
        let batch = match store.unsynced_readings(self.batch_size) {
            Ok(batch) => batch,
            Err(err) => {
                report.failures.push(SyncFailure::Store(err));
                return true;
            }
        };
        if batch.is_empty() {
            return true;
        }

        let ids = batch.ids();
        let readings: Vec<Reading> = batch.into_iter().map(|stored| stored.reading).collect();

        if let Err(err) = self.client.push_readings(credential, &readings) {
            warn!(
                "event=push_readings module=sync status=error error_code={} batch={} error={}",
                err.code(),
                ids.len(),
                err
            );
            self.on_call_failure(&err, true);
            report.failures.push(SyncFailure::Push(err));
            return false;
        }

        match store.mark_synced(&ids) {
            Ok(_) => {
                report.pushed = ids.len();
                info!(
                    "event=push_readings module=sync status=ok synced={}",
                    ids.len()
                );
            }
            // Upstream has the batch but the flags did not commit; the batch
            // is uploaded again next cycle.
            Err(err) => report.failures.push(SyncFailure::Store(err)),
        }
        true
    }

    fn pull_commands(&mut self, store: &DurableStore, credential: &Credential, report: &mut SyncReport) {
        let commands = match self.client.pull_commands(credential) {
            Ok(commands) => commands,
            Err(err) => {
                warn!(
                    "event=pull_commands module=sync status=error error_code={} error={}",
                    err.code(),
                    err
                );
                self.on_call_failure(&err, false);
                report.failures.push(SyncFailure::Pull(err));
                return;
            }
        };

        report.pulled = Some(commands.len());
        match store.upsert_commands(&commands) {
            Ok(summary) => {
                report.upsert = summary;
                info!(
                    "event=pull_commands module=sync status=ok received={} inserted={} replaced={}",
                    commands.len(),
                    summary.inserted,
                    summary.replaced
                );
            }
            Err(err) => report.failures.push(SyncFailure::Store(err)),
        }
    }

    fn on_call_failure(&mut self, err: &CloudError, is_push: bool) {
        match err {
            CloudError::Auth(_) => {
                self.credential = None;
                self.transition(SyncState::Unauthenticated);
            }
            CloudError::Network(_) => {
                self.credential = None;
                self.transition(SyncState::Offline);
            }
            CloudError::Upstream { .. } | CloudError::InvalidResponse(_) if is_push => {
                self.credential = None;
                self.transition(SyncState::Offline);
            }
            CloudError::Upstream { .. } | CloudError::InvalidResponse(_) => {}
        }
    }

    fn transition(&mut self, next: SyncState) {
        if self.state != next {
            info!(
                "event=sync_state module=sync status=ok from={} to={}",
                self.state.as_str(),
                next.as_str()
            );
            self.state = next;
        }
    }
}
