//! Reloading the VPN daemon through its service supervisor.

use std::path::PathBuf;

use tracing::info;

use tollgate_pki::ToolCommand;

use crate::error::TrustError;

/// Tells the running daemon to re-read its trust state.
///
/// Blocks until the supervisor answers. A failure means clients may still
/// be trusted by the live daemon.
pub trait ServiceReloader: Send + Sync {
    /// Name of the supervised unit, for logs.
    fn unit(&self) -> &str;

    /// Restarts the daemon.
    fn reload(&self) -> Result<(), TrustError>;
}

/// `systemctl restart <unit>`.
#[derive(Debug, Clone)]
pub struct SystemdReloader {
    systemctl: PathBuf,
    unit: String,
    search_path: String,
}

impl SystemdReloader {
    /// Reloader driving `systemctl` for `unit`.
    pub fn new(
        systemctl: impl Into<PathBuf>,
        unit: impl Into<String>,
        search_path: impl Into<String>,
    ) -> Self {
        Self {
            systemctl: systemctl.into(),
            unit: unit.into(),
            search_path: search_path.into(),
        }
    }
}

impl ServiceReloader for SystemdReloader {
    fn unit(&self) -> &str {
        &self.unit
    }

    fn reload(&self) -> Result<(), TrustError> {
        ToolCommand::new(&self.systemctl)
            .arg("restart")
            .arg(&self.unit)
            .env("PATH", &self.search_path)
            .run()
            .map_err(|e| TrustError::ReloadFailed {
                unit: self.unit.clone(),
                detail: e.detail,
            })?;
        info!(unit = %self.unit, "Service restarted");
        Ok(())
    }
}
