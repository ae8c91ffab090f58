//! Integration tests for Tollgate.
//!
//! These tests drive the full identity lifecycle against the fake easy-rsa,
//! openssl, installer and systemctl tools, both through the library facade
//! and through the `tollgate` binary.

// Allow unwrap() in tests - panics are acceptable for test assertions
#![allow(clippy::disallowed_methods)]

use std::path::{Path, PathBuf};
use std::process::{Command, Output, Stdio};

use anyhow::{bail, Context, Result};

use tollgate_lifecycle::{Config, Lifecycle, ServiceConfig, ToolsConfig};
use tollgate_pki::testing::{tool, FakePki, SEARCH_PATH};

// ============================================================================
// Test Deployment
// ============================================================================

/// A scratch OpenVPN deployment: PKI, bundle directory, status report,
/// published CRL and audit log all live under one temporary root.
pub struct TestDeployment {
    pki: FakePki,
    config: Config,
}

impl TestDeployment {
    /// Creates a deployment with no PKI yet.
    pub fn new() -> Self {
        let pki = FakePki::new();
        let root = pki.root();
        let config = Config {
            bundle_dir: pki.bundle_dir(),
            easyrsa_dir: pki.easyrsa_dir(),
            status_report: root.join("openvpn-status.log"),
            published_crl: root.join("etc/openvpn/crl.pem"),
            audit_log: root.join("ovpn_delete.log"),
            lock_timeout_ms: 10_000,
            tools: ToolsConfig {
                easyrsa: Some(tool("easyrsa")),
                installer: Some(tool("openvpn-install.sh")),
                installer_home: pki.installer_home(),
                user_homes: pki.user_homes(),
                openssl: tool("openssl"),
                systemctl: tool("systemctl"),
                search_path: SEARCH_PATH.to_string(),
            },
            service: ServiceConfig::default(),
        };
        Self { pki, config }
    }

    /// Scratch root.
    pub fn root(&self) -> &Path {
        self.pki.root()
    }

    /// The fake CA.
    pub fn pki(&self) -> &FakePki {
        &self.pki
    }

    /// Configuration pointing at this deployment.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Mutable configuration, for tests that swap a tool.
    pub fn config_mut(&mut self) -> &mut Config {
        &mut self.config
    }

    /// Facade over this deployment.
    pub fn lifecycle(&self) -> Lifecycle {
        Lifecycle::new(self.config.clone())
    }

    /// Writes a status report listing `names` as connected.
    pub fn set_connected(&self, names: &[&str]) {
        let mut report = String::from("OpenVPN CLIENT LIST\nUpdated,2026-10-14 09:00:00\n");
        report.push_str("CLIENT_LIST,Common Name,Real Address,Bytes Received,Bytes Sent,Connected Since\n");
        for name in names {
            report.push_str(&format!("{name},203.0.113.7:50000,1024,2048,2026-10-14 08:55:00\n"));
        }
        report.push_str("ROUTING_TABLE,Virtual Address,Common Name,Real Address,Last Ref\nGLOBAL_STATS\nEND\n");
        std::fs::write(&self.config.status_report, report).unwrap();
    }

    /// Serializes the configuration to `<root>/tollgate.toml`.
    pub fn write_config(&self) -> Result<PathBuf> {
        let path = self.root().join("tollgate.toml");
        let text = toml::to_string(&self.config).context("Failed to serialize config")?;
        std::fs::write(&path, text).context("Failed to write config")?;
        Ok(path)
    }

    /// Runs the `tollgate` binary against this deployment.
    pub fn run_cli(&self, binary: &Path, args: &[&str]) -> Result<Output> {
        let config = self.write_config()?;
        Self::cli_command(binary, &config, args)
            .output()
            .with_context(|| format!("Failed to run {}", binary.display()))
    }

    /// Starts several `tollgate` processes at once and waits for all of them.
    pub fn run_cli_concurrently(&self, binary: &Path, runs: &[&[&str]]) -> Result<Vec<Output>> {
        let config = self.write_config()?;
        let children = runs
            .iter()
            .map(|args| {
                Self::cli_command(binary, &config, args)
                    .stdout(Stdio::piped())
                    .stderr(Stdio::piped())
                    .spawn()
                    .with_context(|| format!("Failed to spawn {}", binary.display()))
            })
            .collect::<Result<Vec<_>>>()?;
        children
            .into_iter()
            .map(|child| child.wait_with_output().context("Failed to wait for tollgate"))
            .collect()
    }

    fn cli_command(binary: &Path, config: &Path, args: &[&str]) -> Command {
        let mut cmd = Command::new(binary);
        cmd.arg("--config")
            .arg(config)
            .args(args)
            .env_remove("TOLLGATE_CONFIG")
            .env("RUST_LOG", "warn");
        cmd
    }
}

impl Default for TestDeployment {
    fn default() -> Self {
        Self::new()
    }
}

/// Find the CLI binary in the target directory.
pub fn find_cli_binary() -> Result<PathBuf> {
    let manifest_dir = std::env::var("CARGO_MANIFEST_DIR").unwrap_or_else(|_| ".".to_string());

    // Try debug build first, then release
    let candidates = [
        Path::new(&manifest_dir).join("../../target/debug/tollgate"),
        Path::new(&manifest_dir).join("../../target/release/tollgate"),
    ];

    for candidate in &candidates {
        if candidate.exists() {
            return Ok(candidate.canonicalize()?);
        }
    }

    bail!(
        "Could not find tollgate binary. Run 'cargo build -p tollgate-cli' first. Searched in: {:?}",
        candidates
    )
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;
    use std::fs;

    use tollgate_lifecycle::{LifecycleError, RevocationStage};
    use tollgate_pki::{IdentityStatus, PkiError, PkiIndex};

    #[tokio::test]
    async fn test_issue_list_revoke_reissue() {
        let deployment = TestDeployment::new();
        let lifecycle = deployment.lifecycle();

        // 1. First issuance creates the PKI
        let first = lifecycle.issue().await.unwrap();
        let second = lifecycle.issue().await.unwrap();
        assert_eq!(first.identity.name(), "client_1");
        assert_eq!(second.identity.name(), "client_2");

        // 2. Both are listed, one connected
        deployment.set_connected(&["client_1"]);
        let clients = lifecycle.clients().unwrap();
        assert_eq!(clients.len(), 2);
        assert!(clients.iter().all(|c| c.status == Some(IdentityStatus::Issued)));
        let connected = lifecycle.connected().unwrap();
        assert!(connected.contains("client_1"));
        assert!(!connected.contains("client_2"));

        // 3. Revoke the first one
        let report = lifecycle.revoke("client_1").await.unwrap();
        assert_eq!(report.serial, "01");
        assert!(report.serial_verified);
        assert_eq!(report.stages.last(), Some(&RevocationStage::Done));
        let published = fs::read_to_string(&deployment.config().published_crl).unwrap();
        assert!(published.contains("Serial Number: 01"));

        // 4. Only the second bundle remains on disk
        let clients = lifecycle.clients().unwrap();
        let names: Vec<&str> = clients.iter().map(|c| c.identity.name()).collect();
        assert_eq!(names, vec!["client_2"]);

        // 5. The revoked name is never handed out again
        let third = lifecycle.issue().await.unwrap();
        assert_eq!(third.identity.name(), "client_3");

        let index = PkiIndex::load(&deployment.config().layout().index()).unwrap();
        assert!(index.is_revoked("client_1"));
        assert_eq!(index.records().len(), 3);
    }

    #[tokio::test]
    async fn test_purged_gap_is_refilled() {
        let deployment = TestDeployment::new();
        let lifecycle = deployment.lifecycle();
        lifecycle.issue().await.unwrap();
        lifecycle.issue().await.unwrap();

        // A bundle copied in by hand claims client_3; the allocator skips it.
        fs::write(deployment.pki().bundle_dir().join("client_3.ovpn"), "manual").unwrap();
        assert_eq!(lifecycle.next_identity().unwrap().name(), "client_4");
    }

    #[tokio::test]
    async fn test_concurrent_issue_and_revoke() {
        let deployment = TestDeployment::new();
        let lifecycle = deployment.lifecycle();
        lifecycle.issue().await.unwrap();

        let issuers: Vec<_> = (0..3)
            .map(|_| {
                let lifecycle = lifecycle.clone();
                tokio::spawn(async move { lifecycle.issue().await })
            })
            .collect();
        let revoker = {
            let lifecycle = lifecycle.clone();
            tokio::spawn(async move { lifecycle.revoke("client_1").await })
        };

        let mut names = BTreeSet::new();
        for task in issuers {
            names.insert(task.await.unwrap().unwrap().identity.into_name());
        }
        revoker.await.unwrap().unwrap();

        assert_eq!(names.len(), 3);
        assert!(!names.contains("client_1"));
        let index = PkiIndex::load(&deployment.config().layout().index()).unwrap();
        assert_eq!(index.records().len(), 4);
    }

    #[tokio::test]
    async fn test_second_facade_waits_for_the_lock() {
        let mut deployment = TestDeployment::new();
        deployment.config_mut().lock_timeout_ms = 50;
        let lifecycle = deployment.lifecycle();
        lifecycle.initialize().unwrap();

        let other = deployment.lifecycle();
        let _held = lifecycle.lock().acquire().unwrap();
        let err = tokio::task::spawn_blocking(move || other.issue_blocking())
            .await
            .unwrap()
            .unwrap_err();

        assert!(matches!(err, LifecycleError::Busy { .. }));
    }

    #[tokio::test]
    async fn test_failed_reload_is_reported_as_degraded() {
        let mut deployment = TestDeployment::new();
        deployment.config_mut().tools.systemctl = tool("systemctl-fail");
        let lifecycle = deployment.lifecycle();
        let issued = lifecycle.issue().await.unwrap();

        let err = lifecycle.revoke("client_1").await.unwrap_err();

        assert_eq!(err.stage(), Some(RevocationStage::ServiceReloaded));
        assert!(err.is_degraded());
        // Index and CRL moved ahead; the artifacts stay for a retry by hand.
        assert!(deployment.config().published_crl.exists());
        assert!(issued.bundle.exists());
        let audit = fs::read_to_string(&deployment.config().audit_log).unwrap();
        assert!(audit.contains("FAILED stage=ServiceReloaded degraded=true"));
    }

    #[tokio::test]
    async fn test_revoking_unknown_identity() {
        let deployment = TestDeployment::new();
        let lifecycle = deployment.lifecycle();
        lifecycle.initialize().unwrap();

        let err = lifecycle.revoke("client_7").await.unwrap_err();

        assert_eq!(err.stage(), Some(RevocationStage::SerialRead));
        assert!(!err.is_degraded());
        assert!(matches!(
            err.root_cause(),
            LifecycleError::Pki(PkiError::ArtifactMissing(_))
        ));
        assert!(!deployment.config().published_crl.exists());
    }

    #[test]
    fn test_written_config_round_trips() {
        let deployment = TestDeployment::new();
        let path = deployment.write_config().unwrap();
        assert_eq!(&Config::load(&path).unwrap(), deployment.config());
    }

    #[test]
    fn test_cli_workflow() {
        let Ok(binary) = find_cli_binary() else {
            eprintln!("tollgate binary not built; skipping CLI workflow");
            return;
        };
        let deployment = TestDeployment::new();

        let out = deployment.run_cli(&binary, &["issue"]).unwrap();
        assert!(out.status.success(), "{}", String::from_utf8_lossy(&out.stderr));
        assert!(String::from_utf8_lossy(&out.stdout).contains("Issued client_1"));

        let out = deployment.run_cli(&binary, &["next"]).unwrap();
        assert_eq!(String::from_utf8_lossy(&out.stdout).trim(), "client_2");

        let out = deployment.run_cli(&binary, &["list", "--format", "json"]).unwrap();
        let rows: serde_json::Value = serde_json::from_slice(&out.stdout).unwrap();
        assert_eq!(rows[0]["name"], "client_1");
        assert_eq!(rows[0]["status"], "issued");

        let out = deployment.run_cli(&binary, &["revoke", "client_1"]).unwrap();
        assert!(out.status.success(), "{}", String::from_utf8_lossy(&out.stderr));

        let out = deployment.run_cli(&binary, &["bundle", "client_1"]).unwrap();
        assert!(!out.status.success());

        let out = deployment.run_cli(&binary, &["revoke", "../x"]).unwrap();
        assert!(!out.status.success());
    }

    #[test]
    fn test_parallel_cli_issuance_gets_distinct_names() {
        let Ok(binary) = find_cli_binary() else {
            eprintln!("tollgate binary not built; skipping parallel CLI issuance");
            return;
        };
        let deployment = TestDeployment::new();
        assert!(deployment.run_cli(&binary, &["init"]).unwrap().status.success());
        // Each installer run holds the PKI for a second, so the runs overlap.
        deployment.pki().slow_installer();

        let issue: &[&str] = &["issue"];
        let outputs = deployment.run_cli_concurrently(&binary, &[issue, issue]).unwrap();

        for out in &outputs {
            assert!(out.status.success(), "{}", String::from_utf8_lossy(&out.stderr));
        }
        let index = PkiIndex::load(&deployment.config().layout().index()).unwrap();
        let names: Vec<&str> = index.records().iter().map(|r| r.common_name.as_str()).collect();
        assert_eq!(names.len(), 2);
        let unique: BTreeSet<&str> = names.iter().copied().collect();
        let expected: BTreeSet<&str> = ["client_1", "client_2"].into_iter().collect();
        assert_eq!(unique, expected);
        for name in expected {
            assert!(deployment.pki().bundle_dir().join(format!("{name}.ovpn")).is_file());
        }
    }
}
