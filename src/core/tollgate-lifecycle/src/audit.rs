//! Single-run audit log.
//!
//! The file is truncated when a revocation starts and receives one line per
//! stage transition:
//!
//! ```text
//! 1760428800 stage=SerialRead name=client_2 serial=0A
//! 1760428801 stage=CRLPublished previous=none digest=3f1c0e94a1b2c3d4
//! 1760428802 FAILED stage=ServiceReloaded degraded=true cause="reload of openvpn@server failed: ..."
//! ```

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use tracing::warn;

use crate::error::LifecycleError;

/// Append-only writer for one pipeline invocation.
pub struct AuditLog {
    path: PathBuf,
    file: File,
}

impl AuditLog {
    /// Truncates (or creates) `path` and opens it for this run.
    pub fn start(path: impl AsRef<Path>) -> Result<Self, LifecycleError> {
        let path = path.as_ref().to_path_buf();
        let audit_err = |source| LifecycleError::Audit {
            path: path.clone(),
            source,
        };
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(audit_err)?;
        }
        let file = File::create(&path).map_err(audit_err)?;
        Ok(Self { path, file })
    }

    /// Path of the log.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Appends one line. A failed write is logged and does not stop the run.
    pub fn record(&mut self, event: &str, fields: &[(&str, &str)]) {
        let mut line = format!("{} {event}", now());
        for (key, value) in fields {
            line.push(' ');
            line.push_str(key);
            line.push('=');
            line.push_str(&quote(value));
        }
        line.push('\n');

        if let Err(e) = self
            .file
            .write_all(line.as_bytes())
            .and_then(|_| self.file.flush())
        {
            warn!(path = %self.path.display(), error = %e, "Audit log write failed");
        }
    }
}

fn now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

fn quote(value: &str) -> String {
    if value.is_empty() || value.chars().any(|c| c.is_whitespace() || c == '"') {
        format!("{value:?}")
    } else {
        value.to_string()
    }
}
