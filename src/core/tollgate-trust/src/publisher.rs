//! Atomic CRL publishing.
//!
//! The CRL is written to a temporary file in the destination directory,
//! made world-readable, then renamed over the published path. A reader of
//! the destination sees either the old list or the new one, never a mix.

use std::fs::{self, Permissions};
use std::io::{ErrorKind, Write};
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use tracing::{debug, info};

use crate::digest::short_digest;
use crate::error::TrustError;

/// Mode of the published CRL.
const PUBLISHED_MODE: u32 = 0o644;

/// Outcome of a publish.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Published {
    /// Digest of the destination before the publish, if it existed.
    pub previous_digest: Option<String>,
    /// Digest of the destination after the publish.
    pub digest: String,
}

/// Copies generated CRLs to the path the daemon reads.
#[derive(Debug, Clone)]
pub struct CrlPublisher {
    destination: PathBuf,
}

impl CrlPublisher {
    /// Publisher targeting `destination`.
    pub fn new(destination: impl Into<PathBuf>) -> Self {
        Self {
            destination: destination.into(),
        }
    }

    /// The published path.
    pub fn destination(&self) -> &Path {
        &self.destination
    }

    /// Digest of what is currently published.
    pub fn current_digest(&self) -> Option<String> {
        short_digest(&self.destination).ok()
    }

    /// Publishes `source` and returns the new and previous digests.
    pub fn publish(&self, source: &Path) -> Result<Published, TrustError> {
        let data = fs::read(source).map_err(|e| match e.kind() {
            ErrorKind::NotFound => {
                TrustError::PublishFailed(format!("source {} is missing", source.display()))
            },
            _ => TrustError::PublishFailed(format!("cannot read {}: {e}", source.display())),
        })?;

        let dir = self
            .destination
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        fs::create_dir_all(dir).map_err(|e| {
            TrustError::PublishFailed(format!("cannot create {}: {e}", dir.display()))
        })?;

        let previous_digest = self.current_digest();

        let mut tmp = NamedTempFile::new_in(dir).map_err(|e| {
            TrustError::PublishFailed(format!("cannot stage in {}: {e}", dir.display()))
        })?;
        tmp.write_all(&data)
            .and_then(|_| tmp.as_file().sync_all())
            .map_err(|e| TrustError::PublishFailed(format!("cannot write staged CRL: {e}")))?;
        fs::set_permissions(tmp.path(), Permissions::from_mode(PUBLISHED_MODE))
            .map_err(|e| TrustError::PublishFailed(format!("cannot set permissions: {e}")))?;
        tmp.persist(&self.destination).map_err(|e| {
            TrustError::PublishFailed(format!(
                "cannot rename into {}: {}",
                self.destination.display(),
                e.error
            ))
        })?;
        debug!(destination = %self.destination.display(), "CRL renamed into place");

        let digest = short_digest(&self.destination).map_err(|e| {
            TrustError::PublishFailed(format!(
                "cannot verify {}: {e}",
                self.destination.display()
            ))
        })?;

        info!(
            destination = %self.destination.display(),
            digest = %digest,
            previous = previous_digest.as_deref().unwrap_or("none"),
            "CRL published"
        );
        Ok(Published {
            previous_digest,
            digest,
        })
    }
}
