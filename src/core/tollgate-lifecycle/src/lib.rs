//! # Tollgate Lifecycle
//!
//! Issuance and revocation of OpenVPN client identities.
//!
//! ## Features
//!
//! - Directory-scoped lock serializing every pipeline run on one PKI
//! - Gap-filling issuance through the client installer
//! - Staged revocation with an audit log and degraded-state reporting
//! - Atomic CRL publishing followed by a daemon restart
//! - Client inventory joined with the live connection snapshot
//!
//! ## Example
//!
//! ```rust,ignore
//! use tollgate_lifecycle::{Config, Lifecycle};
//!
//! let lifecycle = Lifecycle::new(Config::load("/etc/tollgate/tollgate.toml")?);
//! let issued = lifecycle.issue().await?;
//! let report = lifecycle.revoke(issued.identity.name()).await?;
//! println!("revoked serial {}", report.serial);
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod audit;
pub mod config;
pub mod error;
pub mod inventory;
pub mod issuance;
pub mod lock;
pub mod revocation;

use std::path::PathBuf;
use std::sync::Arc;

use tracing::debug;

use tollgate_pki::{ClientIdentity, IdentityAllocator, IssuedBundle, PkiError, PkiGateway};
use tollgate_trust::{
    ConnectionSnapshot, ConnectionTracker, CrlPublisher, ServiceReloader, SystemdReloader,
};

pub use audit::AuditLog;
pub use config::{Config, ServiceConfig, ToolsConfig};
pub use error::LifecycleError;
pub use inventory::{list_clients, ClientSummary};
pub use issuance::IssuancePipeline;
pub use lock::{PkiLock, PkiLockGuard};
pub use revocation::{RevocationPipeline, RevocationReport, RevocationStage};

struct Inner {
    config: Config,
    gateway: PkiGateway,
    allocator: IdentityAllocator,
    publisher: CrlPublisher,
    reloader: Box<dyn ServiceReloader>,
    tracker: ConnectionTracker,
    lock: PkiLock,
}

/// Entry point wiring every component from one [`Config`].
///
/// Cheap to clone; clones share the same lock.
#[derive(Clone)]
pub struct Lifecycle {
    inner: Arc<Inner>,
}

impl Lifecycle {
    /// Builds the components described by `config`, restarting the daemon
    /// with `systemctl`.
    pub fn new(config: Config) -> Self {
        let reloader = SystemdReloader::new(
            &config.tools.systemctl,
            &config.service.unit,
            &config.tools.search_path,
        );
        Self::with_reloader(config, Box::new(reloader))
    }

    /// Like [`Lifecycle::new`] with a custom daemon reloader.
    pub fn with_reloader(config: Config, reloader: Box<dyn ServiceReloader>) -> Self {
        let layout = config.layout();
        let lock = PkiLock::for_dir(layout.pki_dir(), config.lock_timeout());
        debug!(pki = %layout.pki_dir().display(), unit = reloader.unit(), "Lifecycle configured");
        Self {
            inner: Arc::new(Inner {
                gateway: PkiGateway::new(layout.clone(), config.gateway_tools()),
                allocator: IdentityAllocator::new(layout),
                publisher: CrlPublisher::new(&config.published_crl),
                tracker: ConnectionTracker::new(&config.status_report),
                reloader,
                lock,
                config,
            }),
        }
    }

    /// Active configuration.
    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    /// Lock shared by every pipeline on this PKI.
    pub fn lock(&self) -> &PkiLock {
        &self.inner.lock
    }

    /// Creates the PKI if it does not exist. Returns `true` if created.
    pub fn initialize(&self) -> Result<bool, LifecycleError> {
        let _guard = self.inner.lock.acquire()?;
        Ok(self.inner.gateway.ensure_initialized()?)
    }

    /// Identity the next issuance would receive, without reserving it.
    pub fn next_identity(&self) -> Result<ClientIdentity, LifecycleError> {
        Ok(self.inner.allocator.next_identity()?)
    }

    /// Runs the issuance pipeline on the calling thread.
    pub fn issue_blocking(&self) -> Result<IssuedBundle, LifecycleError> {
        let inner = &self.inner;
        IssuancePipeline::new(&inner.gateway, &inner.allocator, &inner.lock).run()
    }

    /// Validates `name` and runs the revocation pipeline on the calling thread.
    pub fn revoke_blocking(&self, name: &str) -> Result<RevocationReport, LifecycleError> {
        let identity = ClientIdentity::parse(name)?;
        let inner = &self.inner;
        RevocationPipeline::new(
            &inner.gateway,
            &inner.publisher,
            inner.reloader.as_ref(),
            &inner.lock,
            &inner.config.audit_log,
        )
        .run(&identity)
    }

    /// Issues the next identity on the blocking thread pool.
    pub async fn issue(&self) -> Result<IssuedBundle, LifecycleError> {
        let this = self.clone();
        tokio::task::spawn_blocking(move || this.issue_blocking())
            .await
            .map_err(|e| LifecycleError::Worker(e.to_string()))?
    }

    /// Revokes `name` on the blocking thread pool.
    pub async fn revoke(&self, name: &str) -> Result<RevocationReport, LifecycleError> {
        let this = self.clone();
        let name = name.to_string();
        tokio::task::spawn_blocking(move || this.revoke_blocking(&name))
            .await
            .map_err(|e| LifecycleError::Worker(e.to_string()))?
    }

    /// Identities the daemon currently reports as connected.
    pub fn connected(&self) -> Result<ConnectionSnapshot, LifecycleError> {
        Ok(self.inner.tracker.currently_connected()?)
    }

    /// Bundles on disk with status and connection state, newest first.
    pub fn clients(&self) -> Result<Vec<ClientSummary>, LifecycleError> {
        let connected = self.connected()?;
        list_clients(self.inner.gateway.layout(), &connected)
    }

    /// Path of `name`'s bundle.
    pub fn bundle(&self, name: &str) -> Result<PathBuf, LifecycleError> {
        let identity = ClientIdentity::parse(name)?;
        let path = self.inner.gateway.layout().bundle(&identity);
        if !path.is_file() {
            return Err(PkiError::ArtifactMissing(path).into());
        }
        Ok(path)
    }
}
