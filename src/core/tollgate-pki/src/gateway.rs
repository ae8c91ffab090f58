//! Command boundary to easy-rsa, openssl and the client installer.
//!
//! Every call is synchronous and blocks until the tool exits. Nothing is
//! retried here: a non-zero exit surfaces as the matching [`PkiError`].

use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::error::PkiError;
use crate::identity::ClientIdentity;
use crate::layout::PkiLayout;
use crate::tool::ToolCommand;

/// Installer menu entry that adds a client.
const INSTALLER_ADD_CLIENT: &str = "1";

/// Installer answer for a passwordless client key.
const INSTALLER_PASSWORDLESS: &str = "1";

/// Locations of the external tools.
#[derive(Debug, Clone)]
pub struct GatewayTools {
    /// The `easyrsa` script.
    pub easyrsa: PathBuf,
    /// The `openssl` binary.
    pub openssl: PathBuf,
    /// The client installer (`openvpn-install.sh`).
    pub installer: PathBuf,
    /// Where the installer writes bundles when no user home matches: the
    /// invoking user's home, `/root` under a root service.
    pub installer_home: PathBuf,
    /// Parent of per-user homes; the installer prefers `<user_homes>/<name>`
    /// when that directory exists.
    pub user_homes: PathBuf,
    /// The only `PATH` handed to any tool.
    pub search_path: String,
}

/// Artifacts of a freshly issued identity.
#[derive(Debug, Clone)]
pub struct IssuedBundle {
    /// The new identity.
    pub identity: ClientIdentity,
    /// `<bundle_dir>/<name>.ovpn`.
    pub bundle: PathBuf,
    /// `pki/issued/<name>.crt`.
    pub certificate: PathBuf,
    /// `pki/private/<name>.key`.
    pub private_key: PathBuf,
}

/// Thin gateway over the CA tool and certificate inspection.
#[derive(Debug, Clone)]
pub struct PkiGateway {
    layout: PkiLayout,
    tools: GatewayTools,
}

impl PkiGateway {
    /// Creates a gateway for `layout` using `tools`.
    pub fn new(layout: PkiLayout, tools: GatewayTools) -> Self {
        Self { layout, tools }
    }

    /// The layout this gateway operates on.
    pub fn layout(&self) -> &PkiLayout {
        &self.layout
    }

    fn easyrsa(&self) -> ToolCommand {
        ToolCommand::new(&self.tools.easyrsa)
            .current_dir(self.layout.easyrsa_dir())
            .env("EASYRSA_BATCH", "1")
            .env("EASYRSA_PKI", self.layout.pki_dir())
            .env("PATH", &self.tools.search_path)
    }

    /// Runs `init-pki` only when the PKI directory does not exist.
    ///
    /// Returns `true` if the store was created by this call.
    pub fn ensure_initialized(&self) -> Result<bool, PkiError> {
        if self.layout.pki_dir().exists() {
            debug!(pki = %self.layout.pki_dir().display(), "PKI already initialized");
            return Ok(false);
        }

        self.easyrsa()
            .arg("init-pki")
            .run()
            .map_err(|e| PkiError::ToolFailure {
                tool: e.invocation,
                detail: e.detail,
            })?;

        info!(pki = %self.layout.pki_dir().display(), "PKI initialized");
        Ok(true)
    }

    /// Drives the installer's non-interactive interface to mint `identity`.
    ///
    /// Succeeds only if bundle, certificate and key all exist afterwards.
    pub fn issue(&self, identity: &ClientIdentity) -> Result<IssuedBundle, PkiError> {
        let issued = IssuedBundle {
            identity: identity.clone(),
            bundle: self.layout.bundle(identity),
            certificate: self.layout.certificate(identity),
            private_key: self.layout.private_key(identity),
        };

        let result = ToolCommand::new(&self.tools.installer)
            .current_dir(self.layout.bundle_dir())
            .env("MENU_OPTION", INSTALLER_ADD_CLIENT)
            .env("CLIENT", identity.name())
            .env("PASS", INSTALLER_PASSWORDLESS)
            .env("EASYRSA_BATCH", "1")
            .env("EASYRSA_PKI", self.layout.pki_dir())
            .env("HOME", &self.tools.installer_home)
            .env("PATH", &self.tools.search_path)
            .run();

        self.collect_bundle(&issued)?;

        let artifacts = [&issued.bundle, &issued.certificate, &issued.private_key];
        let (present, missing): (Vec<&PathBuf>, Vec<&PathBuf>) =
            artifacts.into_iter().partition(|p| p.exists());

        if let Err(e) = result {
            if !present.is_empty() {
                warn!(name = %identity, partial = ?present, "Issuance left partial artifacts");
            }
            return Err(PkiError::IssuanceFailed {
                name: identity.to_string(),
                detail: format!("{}{}", e.detail, describe("partial artifacts", &present)),
            });
        }

        if !missing.is_empty() {
            warn!(name = %identity, missing = ?missing, "Installer reported success without a complete identity");
            return Err(PkiError::IssuanceFailed {
                name: identity.to_string(),
                detail: format!(
                    "installer exited successfully{}{}",
                    describe("missing", &missing),
                    describe("partial artifacts", &present)
                ),
            });
        }

        info!(name = %identity, bundle = %issued.bundle.display(), "Identity issued");
        Ok(issued)
    }

    /// Path the installer writes `identity`'s bundle to.
    pub fn installer_output(&self, identity: &ClientIdentity) -> PathBuf {
        let user_home = self.tools.user_homes.join(identity.name());
        let dir = if user_home.is_dir() {
            user_home
        } else {
            self.tools.installer_home.clone()
        };
        dir.join(identity.bundle_file_name())
    }

    /// Moves the installer's bundle into the bundle directory, if it wrote one
    /// somewhere else.
    fn collect_bundle(&self, issued: &IssuedBundle) -> Result<(), PkiError> {
        let written = self.installer_output(&issued.identity);
        if written == issued.bundle || !written.is_file() {
            return Ok(());
        }
        std::fs::create_dir_all(self.layout.bundle_dir())
            .map_err(|e| PkiError::io(self.layout.bundle_dir(), e))?;
        if std::fs::rename(&written, &issued.bundle).is_err() {
            // Different filesystem: copy, then drop the installer's copy.
            std::fs::copy(&written, &issued.bundle).map_err(|e| PkiError::io(&issued.bundle, e))?;
            std::fs::remove_file(&written).map_err(|e| PkiError::io(&written, e))?;
        }
        debug!(from = %written.display(), to = %issued.bundle.display(), "Bundle collected");
        Ok(())
    }

    /// Reads the hex serial of a PEM certificate.
    pub fn read_serial(&self, certificate: &Path) -> Result<String, PkiError> {
        if !certificate.exists() {
            return Err(PkiError::ArtifactMissing(certificate.to_path_buf()));
        }

        let cmd = ToolCommand::new(&self.tools.openssl)
            .arg("x509")
            .arg("-in")
            .arg(certificate)
            .arg("-noout")
            .arg("-serial")
            .env("PATH", &self.tools.search_path);
        let out = cmd.run().map_err(|e| PkiError::ToolFailure {
            tool: e.invocation,
            detail: e.detail,
        })?;

        parse_serial(&out.stdout).ok_or_else(|| PkiError::ToolFailure {
            tool: cmd.invocation(),
            detail: format!("unexpected output: {:?}", out.stdout.trim()),
        })
    }

    /// Marks `identity` revoked in the index.
    pub fn revoke(&self, identity: &ClientIdentity) -> Result<(), PkiError> {
        self.easyrsa()
            .arg("revoke")
            .arg(identity.name())
            .run()
            .map_err(|e| PkiError::RevokeFailed {
                name: identity.to_string(),
                detail: e.detail,
            })?;
        info!(name = %identity, "Identity revoked in index");
        Ok(())
    }

    /// Rebuilds `pki/crl.pem` and returns its path.
    pub fn regenerate_crl(&self) -> Result<PathBuf, PkiError> {
        self.easyrsa()
            .arg("gen-crl")
            .run()
            .map_err(|e| PkiError::CrlGenerationFailed(e.detail))?;

        let crl = self.layout.crl();
        if !crl.exists() {
            return Err(PkiError::CrlGenerationFailed(format!(
                "gen-crl exited successfully but {} is absent",
                crl.display()
            )));
        }
        debug!(crl = %crl.display(), "CRL regenerated");
        Ok(crl)
    }
}

/// Extracts `<HEX>` from `serial=<HEX>` output.
pub fn parse_serial(output: &str) -> Option<String> {
    output
        .lines()
        .filter_map(|line| line.trim().split_once('='))
        .find(|(key, _)| key.trim().eq_ignore_ascii_case("serial"))
        .map(|(_, value)| value.trim().to_string())
        .filter(|serial| !serial.is_empty())
}

fn describe(label: &str, paths: &[&PathBuf]) -> String {
    if paths.is_empty() {
        return String::new();
    }
    let list: Vec<String> = paths.iter().map(|p| p.display().to_string()).collect();
    format!("; {label}: {}", list.join(", "))
}
