//! Lifecycle error types.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use tollgate_pki::PkiError;
use tollgate_trust::TrustError;

use crate::revocation::RevocationStage;

/// Errors surfaced by the issuance and revocation pipelines.
#[derive(Debug, Error)]
pub enum LifecycleError {
    /// PKI boundary failure.
    #[error(transparent)]
    Pki(#[from] PkiError),

    /// Trust-state failure (publish, reload, status report).
    #[error(transparent)]
    Trust(#[from] TrustError),

    /// Another pipeline held the PKI lock for longer than the allowed wait.
    #[error("PKI at {} is busy (waited {waited:?})", dir.display())]
    Busy {
        /// Locked PKI directory.
        dir: PathBuf,
        /// How long this caller waited.
        waited: Duration,
    },

    /// A revocation stopped at `stage`.
    #[error("revocation of {name} failed at {stage}{}: {cause}", degraded_note(.stage, .degraded))]
    RevocationFailed {
        /// Identity being revoked.
        name: String,
        /// Stage that failed.
        stage: RevocationStage,
        /// True when the index already records the revocation.
        degraded: bool,
        /// Underlying failure.
        cause: Box<LifecycleError>,
    },

    /// The audit log could not be opened.
    #[error("cannot open audit log {}: {source}", path.display())]
    Audit {
        /// Audit log path.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// Filesystem error outside the PKI and trust boundaries.
    #[error("io error on {}: {source}", path.display())]
    Io {
        /// Path being accessed.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// Invalid or unreadable configuration.
    #[error("configuration error: {0}")]
    Config(String),

    /// The blocking worker running a pipeline panicked or was cancelled.
    #[error("pipeline worker failed: {0}")]
    Worker(String),
}

fn degraded_note(stage: &RevocationStage, degraded: &bool) -> &'static str {
    if !*degraded {
        ""
    } else if stage.leaves_trust_current() {
        " (degraded: trust state is current but leftover artifacts remain on disk)"
    } else {
        " (degraded: revoked in the PKI index but the live daemon may still trust it)"
    }
}

impl LifecycleError {
    /// Stage a revocation failed at, if this is a revocation failure.
    pub fn stage(&self) -> Option<RevocationStage> {
        match self {
            LifecycleError::RevocationFailed { stage, .. } => Some(*stage),
            _ => None,
        }
    }

    /// Whether the failure left an identity revoked but not fully propagated.
    pub fn is_degraded(&self) -> bool {
        matches!(self, LifecycleError::RevocationFailed { degraded: true, .. })
    }

    /// The innermost error, unwrapping revocation failures.
    pub fn root_cause(&self) -> &LifecycleError {
        match self {
            LifecycleError::RevocationFailed { cause, .. } => cause.root_cause(),
            other => other,
        }
    }
}
