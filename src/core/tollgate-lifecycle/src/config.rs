//! Deployment configuration.
//!
//! Loaded from a TOML file; every key is optional and defaults to the
//! standard `openvpn-install.sh` layout.
//!
//! ```toml
//! bundle_dir = "/root"
//! easyrsa_dir = "/etc/openvpn/easy-rsa"
//! status_report = "/etc/openvpn/openvpn-status.log"
//! published_crl = "/etc/openvpn/crl.pem"
//! audit_log = "/tmp/ovpn_delete.log"
//! lock_timeout_ms = 30000
//!
//! [tools]
//! installer_home = "/root"
//! user_homes = "/home"
//! openssl = "openssl"
//! systemctl = "systemctl"
//! search_path = "/usr/local/sbin:/usr/local/bin:/usr/sbin:/usr/bin:/sbin:/bin"
//!
//! [service]
//! unit = "openvpn@server"
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use tollgate_pki::{GatewayTools, PkiLayout};

use crate::error::LifecycleError;

mod defaults {
    use std::path::PathBuf;

    pub fn bundle_dir() -> PathBuf {
        PathBuf::from("/root")
    }
    pub fn easyrsa_dir() -> PathBuf {
        PathBuf::from("/etc/openvpn/easy-rsa")
    }
    pub fn status_report() -> PathBuf {
        PathBuf::from("/etc/openvpn/openvpn-status.log")
    }
    pub fn published_crl() -> PathBuf {
        PathBuf::from("/etc/openvpn/crl.pem")
    }
    pub fn audit_log() -> PathBuf {
        PathBuf::from("/tmp/ovpn_delete.log")
    }
    pub fn lock_timeout_ms() -> u64 {
        30_000
    }
    pub fn installer_home() -> PathBuf {
        PathBuf::from("/root")
    }
    pub fn user_homes() -> PathBuf {
        PathBuf::from("/home")
    }
    pub fn openssl() -> PathBuf {
        PathBuf::from("openssl")
    }
    pub fn systemctl() -> PathBuf {
        PathBuf::from("systemctl")
    }
    pub fn search_path() -> String {
        "/usr/local/sbin:/usr/local/bin:/usr/sbin:/usr/bin:/sbin:/bin".to_string()
    }
    pub fn unit() -> String {
        "openvpn@server".to_string()
    }
}

/// Tollgate configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Directory holding `<name>.ovpn` bundles.
    #[serde(default = "defaults::bundle_dir")]
    pub bundle_dir: PathBuf,
    /// easy-rsa installation; the PKI lives in `<easyrsa_dir>/pki`.
    #[serde(default = "defaults::easyrsa_dir")]
    pub easyrsa_dir: PathBuf,
    /// Daemon status report.
    #[serde(default = "defaults::status_report")]
    pub status_report: PathBuf,
    /// CRL path the daemon is configured to read.
    #[serde(default = "defaults::published_crl")]
    pub published_crl: PathBuf,
    /// Single-run revocation audit log.
    #[serde(default = "defaults::audit_log")]
    pub audit_log: PathBuf,
    /// Maximum wait for the PKI lock, in milliseconds.
    #[serde(default = "defaults::lock_timeout_ms")]
    pub lock_timeout_ms: u64,
    /// External tool locations.
    #[serde(default)]
    pub tools: ToolsConfig,
    /// Supervised daemon.
    #[serde(default)]
    pub service: ServiceConfig,
}

/// External tool locations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ToolsConfig {
    /// `easyrsa` script; defaults to `<easyrsa_dir>/easyrsa`.
    #[serde(default)]
    pub easyrsa: Option<PathBuf>,
    /// Client installer; defaults to `<bundle_dir>/openvpn-install.sh`.
    #[serde(default)]
    pub installer: Option<PathBuf>,
    /// Directory the installer writes bundles to; they are moved into
    /// `bundle_dir` after issuance.
    #[serde(default = "defaults::installer_home")]
    pub installer_home: PathBuf,
    /// Per-user homes the installer prefers (`<user_homes>/<name>`).
    #[serde(default = "defaults::user_homes")]
    pub user_homes: PathBuf,
    /// `openssl` binary.
    #[serde(default = "defaults::openssl")]
    pub openssl: PathBuf,
    /// `systemctl` binary.
    #[serde(default = "defaults::systemctl")]
    pub systemctl: PathBuf,
    /// The only `PATH` given to external tools.
    #[serde(default = "defaults::search_path")]
    pub search_path: String,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            easyrsa: None,
            installer: None,
            installer_home: defaults::installer_home(),
            user_homes: defaults::user_homes(),
            openssl: defaults::openssl(),
            systemctl: defaults::systemctl(),
            search_path: defaults::search_path(),
        }
    }
}

/// Supervised daemon.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServiceConfig {
    /// Unit restarted after a CRL publish.
    #[serde(default = "defaults::unit")]
    pub unit: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            unit: defaults::unit(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bundle_dir: defaults::bundle_dir(),
            easyrsa_dir: defaults::easyrsa_dir(),
            status_report: defaults::status_report(),
            published_crl: defaults::published_crl(),
            audit_log: defaults::audit_log(),
            lock_timeout_ms: defaults::lock_timeout_ms(),
            tools: ToolsConfig::default(),
            service: ServiceConfig::default(),
        }
    }
}

impl Config {
    /// Reads and parses a TOML configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, LifecycleError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| LifecycleError::Config(format!("cannot read {}: {e}", path.display())))?;
        let config = Self::from_toml(&text)
            .map_err(|e| LifecycleError::Config(format!("{}: {e}", path.display())))?;
        debug!(path = %path.display(), "Configuration loaded");
        Ok(config)
    }

    /// Parses TOML text.
    pub fn from_toml(text: &str) -> Result<Self, LifecycleError> {
        let config: Config =
            toml::from_str(text).map_err(|e| LifecycleError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Rejects values no pipeline can work with.
    pub fn validate(&self) -> Result<(), LifecycleError> {
        if self.lock_timeout_ms == 0 {
            return Err(LifecycleError::Config("lock_timeout_ms must be > 0".into()));
        }
        if self.service.unit.trim().is_empty() {
            return Err(LifecycleError::Config("service.unit cannot be empty".into()));
        }
        if self.tools.search_path.trim().is_empty() {
            return Err(LifecycleError::Config(
                "tools.search_path cannot be empty".into(),
            ));
        }
        Ok(())
    }

    /// PKI and bundle layout.
    pub fn layout(&self) -> PkiLayout {
        PkiLayout::new(&self.easyrsa_dir, &self.bundle_dir)
    }

    /// Resolved tool paths for the gateway.
    pub fn gateway_tools(&self) -> GatewayTools {
        GatewayTools {
            easyrsa: self
                .tools
                .easyrsa
                .clone()
                .unwrap_or_else(|| self.easyrsa_dir.join("easyrsa")),
            openssl: self.tools.openssl.clone(),
            installer: self
                .tools
                .installer
                .clone()
                .unwrap_or_else(|| self.bundle_dir.join("openvpn-install.sh")),
            installer_home: self.tools.installer_home.clone(),
            user_homes: self.tools.user_homes.clone(),
            search_path: self.tools.search_path.clone(),
        }
    }

    /// Maximum wait for the PKI lock.
    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }
}
