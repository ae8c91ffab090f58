//! Revocation pipeline.
//!
//! One identity at a time, under the PKI lock:
//!
//! `Start → SerialRead → Revoked → CRLRegenerated → CRLPublished →
//! ServiceReloaded → VerifiedInCRL → ArtifactsPurged → Done`
//!
//! Any stage may fail; the failure carries the stage and the cause. Once
//! `Revoked` succeeds every later step still runs to completion or to an
//! explicit failure, reported as degraded.

use std::fmt;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use tollgate_pki::{ClientIdentity, PkiGateway};
use tollgate_trust::{short_digest, CrlPublisher, Published, ServiceReloader};

use crate::audit::AuditLog;
use crate::error::LifecycleError;
use crate::lock::PkiLock;

/// Stages of a revocation, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum RevocationStage {
    /// Run started, audit log truncated.
    Start,
    /// Certificate serial read.
    SerialRead,
    /// Index marks the identity revoked.
    Revoked,
    /// `crl.pem` rebuilt from the index.
    CrlRegenerated,
    /// CRL copied to the daemon's path.
    CrlPublished,
    /// Daemon restarted.
    ServiceReloaded,
    /// Serial looked up in the CRL text.
    VerifiedInCrl,
    /// Bundle, certificate and key removed.
    ArtifactsPurged,
    /// Finished.
    Done,
}

impl RevocationStage {
    /// Every stage in pipeline order.
    pub const ALL: [RevocationStage; 9] = [
        RevocationStage::Start,
        RevocationStage::SerialRead,
        RevocationStage::Revoked,
        RevocationStage::CrlRegenerated,
        RevocationStage::CrlPublished,
        RevocationStage::ServiceReloaded,
        RevocationStage::VerifiedInCrl,
        RevocationStage::ArtifactsPurged,
        RevocationStage::Done,
    ];

    /// Name used in the audit log.
    pub fn as_str(self) -> &'static str {
        match self {
            RevocationStage::Start => "Start",
            RevocationStage::SerialRead => "SerialRead",
            RevocationStage::Revoked => "Revoked",
            RevocationStage::CrlRegenerated => "CRLRegenerated",
            RevocationStage::CrlPublished => "CRLPublished",
            RevocationStage::ServiceReloaded => "ServiceReloaded",
            RevocationStage::VerifiedInCrl => "VerifiedInCRL",
            RevocationStage::ArtifactsPurged => "ArtifactsPurged",
            RevocationStage::Done => "Done",
        }
    }

    /// A failure here leaves the index ahead of the live daemon.
    pub fn is_degraded_failure(self) -> bool {
        self > RevocationStage::Revoked
    }

    /// A failure here comes after the daemon restarted with the new CRL.
    pub fn leaves_trust_current(self) -> bool {
        self > RevocationStage::ServiceReloaded
    }
}

impl fmt::Display for RevocationStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of a completed revocation.
#[derive(Debug, Clone)]
pub struct RevocationReport {
    /// Revoked identity.
    pub identity: ClientIdentity,
    /// Serial read before revoking.
    pub serial: String,
    /// Digest of the regenerated `pki/crl.pem`.
    pub crl_digest: String,
    /// Digests of the published CRL before and after.
    pub published: Published,
    /// Whether the serial was found in the CRL text.
    pub serial_verified: bool,
    /// Artifacts deleted by this run.
    pub removed: Vec<PathBuf>,
    /// Stages reached, `Start` through `Done`.
    pub stages: Vec<RevocationStage>,
    /// Audit log of this run.
    pub audit_log: PathBuf,
}

/// Collaborators of a revocation run.
pub struct RevocationPipeline<'a> {
    gateway: &'a PkiGateway,
    publisher: &'a CrlPublisher,
    reloader: &'a dyn ServiceReloader,
    lock: &'a PkiLock,
    audit_log: &'a Path,
}

/// Per-run bookkeeping: audit lines and reached stages.
struct Run<'a> {
    identity: &'a ClientIdentity,
    audit: AuditLog,
    stages: Vec<RevocationStage>,
}

impl Run<'_> {
    fn reached(&mut self, stage: RevocationStage, fields: &[(&str, &str)]) {
        self.stages.push(stage);
        self.audit.record(&format!("stage={stage}"), fields);
        info!(name = %self.identity, stage = %stage, "Revocation stage reached");
    }

    fn attempt<T, E>(&mut self, stage: RevocationStage, result: Result<T, E>) -> Result<T, LifecycleError>
    where
        E: Into<LifecycleError>,
    {
        result.map_err(|e| self.fail(stage, e.into()))
    }

    fn fail(&mut self, stage: RevocationStage, cause: LifecycleError) -> LifecycleError {
        let degraded = stage.is_degraded_failure();
        let detail = cause.to_string();
        self.audit.record(
            "FAILED",
            &[
                ("stage", stage.as_str()),
                ("degraded", if degraded { "true" } else { "false" }),
                ("cause", detail.as_str()),
            ],
        );
        if stage.leaves_trust_current() {
            warn!(
                name = %self.identity,
                stage = %stage,
                error = %detail,
                "Revocation propagated but artifacts remain on disk"
            );
        } else if degraded {
            warn!(
                name = %self.identity,
                stage = %stage,
                error = %detail,
                "Revocation failed after the index was updated; live trust state is stale"
            );
        } else {
            warn!(name = %self.identity, stage = %stage, error = %detail, "Revocation failed");
        }
        LifecycleError::RevocationFailed {
            name: self.identity.to_string(),
            stage,
            degraded,
            cause: Box::new(cause),
        }
    }
}

impl<'a> RevocationPipeline<'a> {
    /// Wires a pipeline; `audit_log` is truncated at the start of each run.
    pub fn new(
        gateway: &'a PkiGateway,
        publisher: &'a CrlPublisher,
        reloader: &'a dyn ServiceReloader,
        lock: &'a PkiLock,
        audit_log: &'a Path,
    ) -> Self {
        Self {
            gateway,
            publisher,
            reloader,
            lock,
            audit_log,
        }
    }

    /// Revokes `identity`, holding the PKI lock throughout.
    pub fn run(&self, identity: &ClientIdentity) -> Result<RevocationReport, LifecycleError> {
        let _guard = self.lock.acquire()?;
        let layout = self.gateway.layout();

        let mut run = Run {
            identity,
            audit: AuditLog::start(self.audit_log)?,
            stages: Vec::new(),
        };
        run.reached(RevocationStage::Start, &[("name", identity.name())]);

        // Idempotency boundary: no certificate means nothing to revoke.
        let certificate = layout.certificate(identity);
        let serial = run.attempt(
            RevocationStage::SerialRead,
            self.gateway.read_serial(&certificate),
        )?;
        run.reached(RevocationStage::SerialRead, &[("serial", serial.as_str())]);

        run.attempt(RevocationStage::Revoked, self.gateway.revoke(identity))?;
        run.reached(RevocationStage::Revoked, &[]);

        let crl = run.attempt(
            RevocationStage::CrlRegenerated,
            self.gateway.regenerate_crl(),
        )?;
        let crl_digest = run.attempt(
            RevocationStage::CrlRegenerated,
            short_digest(&crl).map_err(|source| LifecycleError::Io {
                path: crl.clone(),
                source,
            }),
        )?;
        run.reached(RevocationStage::CrlRegenerated, &[("digest", crl_digest.as_str())]);

        let published = run.attempt(RevocationStage::CrlPublished, self.publisher.publish(&crl))?;
        let destination = self.publisher.destination().display().to_string();
        run.reached(
            RevocationStage::CrlPublished,
            &[
                ("destination", destination.as_str()),
                ("previous", published.previous_digest.as_deref().unwrap_or("none")),
                ("digest", published.digest.as_str()),
            ],
        );

        run.attempt(RevocationStage::ServiceReloaded, self.reloader.reload())?;
        run.reached(
            RevocationStage::ServiceReloaded,
            &[("unit", self.reloader.unit())],
        );

        let serial_verified = serial_in_crl(&crl, &serial);
        if !serial_verified {
            warn!(name = %identity, serial = %serial, "Serial not found in regenerated CRL text");
        }
        run.reached(
            RevocationStage::VerifiedInCrl,
            &[("serial", if serial_verified { "FOUND" } else { "NOT_FOUND" })],
        );

        let removed = match purge(&layout.artifacts(identity)) {
            Ok(removed) => removed,
            Err((path, source)) => {
                return Err(run.fail(
                    RevocationStage::ArtifactsPurged,
                    LifecycleError::Io { path, source },
                ))
            },
        };
        let removed_list = removed
            .iter()
            .map(|p| p.display().to_string())
            .collect::<Vec<_>>()
            .join(",");
        run.reached(
            RevocationStage::ArtifactsPurged,
            &[("removed", removed_list.as_str())],
        );

        run.reached(RevocationStage::Done, &[]);
        info!(name = %identity, serial = %serial, digest = %published.digest, "Identity revoked");

        Ok(RevocationReport {
            identity: identity.clone(),
            serial,
            crl_digest,
            published,
            serial_verified,
            removed,
            stages: run.stages,
            audit_log: run.audit.path().to_path_buf(),
        })
    }
}

/// Case-insensitive substring check of `serial` in the CRL text.
///
/// Best effort: an unreadable CRL counts as not found.
pub fn serial_in_crl(crl: &Path, serial: &str) -> bool {
    match std::fs::read(crl) {
        Ok(bytes) => String::from_utf8_lossy(&bytes)
            .to_lowercase()
            .contains(&serial.to_lowercase()),
        Err(e) => {
            warn!(crl = %crl.display(), error = %e, "Cannot read CRL for verification");
            false
        },
    }
}

/// Removes each path independently; already-absent files are fine.
///
/// Returns the removed paths, or the first real failure after trying all.
fn purge(paths: &[PathBuf]) -> Result<Vec<PathBuf>, (PathBuf, std::io::Error)> {
    let mut removed = Vec::new();
    let mut first_error = None;
    for path in paths {
        match std::fs::remove_file(path) {
            Ok(()) => removed.push(path.clone()),
            Err(e) if e.kind() == ErrorKind::NotFound => {},
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Cannot remove artifact");
                if first_error.is_none() {
                    first_error = Some((path.clone(), e));
                }
            },
        }
    }
    match first_error {
        Some(err) => Err(err),
        None => Ok(removed),
    }
}
