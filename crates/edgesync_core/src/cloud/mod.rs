//! Upstream protocol adapter.
//!
//! # Responsibility
//! - Define the `CloudApi` seam consumed by the sync engine.
//! - Classify every upstream failure into the cloud error taxonomy.
//!
//! # Invariants
//! - Adapters hold configuration only; session state lives in `Credential`
//!   values owned by the caller.
//! - Every call is bounded by a timeout and returns an error instead of
//!   blocking or panicking.

use crate::model::command::Command;
use crate::model::reading::Reading;
use std::error::Error;
use std::fmt::{Debug, Display, Formatter};

mod http;
pub mod wire;

pub use http::{CloudClientConfig, HttpCloudClient};

pub type CloudResult<T> = Result<T, CloudError>;

/// Session credential returned by `authenticate`.
///
/// Upstreams that answer with a token get it echoed back as a bearer header;
/// cookie-based sessions carry no token and rely on the client cookie jar.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Credential {
    token: Option<String>,
}

impl Credential {
    pub fn bearer(token: impl Into<String>) -> Self {
        Self {
            token: Some(token.into()),
        }
    }

    pub fn session() -> Self {
        Self { token: None }
    }

    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }
}

impl Debug for Credential {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let kind = if self.token.is_some() {
            "bearer"
        } else {
            "session"
        };
        f.debug_struct("Credential")
            .field("kind", &kind)
            .finish_non_exhaustive()
    }
}

/// Upstream call failures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloudError {
    /// Credential rejected or expired.
    Auth(String),
    /// Connection refused, DNS failure, or timeout.
    Network(String),
    /// Upstream answered with a non-success status.
    Upstream { status: u16, message: String },
    /// Upstream answered 2xx with a body that cannot be used.
    InvalidResponse(String),
}

impl CloudError {
    /// Stable code used in log lines.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Auth(_) => "auth_error",
            Self::Network(_) => "network_error",
            Self::Upstream { .. } => "upstream_error",
            Self::InvalidResponse(_) => "invalid_response",
        }
    }

    /// Whether the failure means upstream is unreachable.
    pub fn is_network(&self) -> bool {
        matches!(self, Self::Network(_))
    }
}

impl Display for CloudError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Auth(message) => write!(f, "authentication rejected: {message}"),
            Self::Network(message) => write!(f, "upstream unreachable: {message}"),
            Self::Upstream { status, message } => {
                write!(f, "upstream returned status {status}: {message}")
            }
            Self::InvalidResponse(message) => write!(f, "invalid upstream response: {message}"),
        }
    }
}

impl Error for CloudError {}

/// Protocol operations against the upstream control plane.
pub trait CloudApi {
    /// Exchanges the configured device identity and key for a credential.
    fn authenticate(&self) -> CloudResult<Credential>;

    /// Uploads one batch. `Ok` means upstream durably accepted every reading.
    fn push_readings(&self, credential: &Credential, batch: &[Reading]) -> CloudResult<()>;

    /// Downloads the current command set. An empty vec is a valid answer.
    fn pull_commands(&self, credential: &Credential) -> CloudResult<Vec<Command>>;
}

impl<T: CloudApi + ?Sized> CloudApi for &T {
    fn authenticate(&self) -> CloudResult<Credential> {
        (**self).authenticate()
    }

    fn push_readings(&self, credential: &Credential, batch: &[Reading]) -> CloudResult<()> {
        (**self).push_readings(credential, batch)
    }

    fn pull_commands(&self, credential: &Credential) -> CloudResult<Vec<Command>> {
        (**self).pull_commands(credential)
    }
}
