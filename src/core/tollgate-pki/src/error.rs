//! PKI boundary error types.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur at the PKI boundary.
#[derive(Debug, Error)]
pub enum PkiError {
    /// Identity name failed validation; nothing was touched.
    #[error("invalid identity name: {0:?}")]
    InvalidName(String),

    /// An expected artifact is absent.
    #[error("artifact missing: {}", .0.display())]
    ArtifactMissing(PathBuf),

    /// An external tool could not be run or exited non-zero.
    #[error("{tool} failed: {detail}")]
    ToolFailure {
        /// Tool invocation, e.g. `easyrsa init-pki`.
        tool: String,
        /// Captured stderr (or stdout, or exit status).
        detail: String,
    },

    /// The installer did not produce a complete identity.
    #[error("issuance of {name} failed: {detail}")]
    IssuanceFailed {
        /// Identity being issued.
        name: String,
        /// Failure detail, including any partial artifacts left behind.
        detail: String,
    },

    /// `easyrsa revoke` failed.
    #[error("revocation of {name} failed: {detail}")]
    RevokeFailed {
        /// Identity being revoked.
        name: String,
        /// Captured tool output.
        detail: String,
    },

    /// `easyrsa gen-crl` failed or produced no file.
    #[error("CRL generation failed: {0}")]
    CrlGenerationFailed(String),

    /// Filesystem error while reading PKI state.
    #[error("io error on {}: {source}", path.display())]
    Io {
        /// Path being accessed.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },
}

impl PkiError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        PkiError::Io {
            path: path.into(),
            source,
        }
    }
}
