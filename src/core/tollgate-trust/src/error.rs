//! Trust-state error types.

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while updating or reading the daemon's trust state.
#[derive(Debug, Error)]
pub enum TrustError {
    /// The CRL could not be copied into place.
    #[error("CRL publish failed: {0}")]
    PublishFailed(String),

    /// The service supervisor could not reload the daemon.
    #[error("reload of {unit} failed: {detail}")]
    ReloadFailed {
        /// Supervised unit, e.g. `openvpn@server`.
        unit: String,
        /// Captured supervisor output.
        detail: String,
    },

    /// The status report exists but could not be read.
    #[error("cannot read status report {}: {source}", path.display())]
    StatusReport {
        /// Report path.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },
}
