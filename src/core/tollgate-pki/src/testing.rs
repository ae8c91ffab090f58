//! Fake external tools for tests.
//!
//! The shell fakes under `testdata/bin` are written once per process to a
//! private directory and made executable. Every test that spawns a child
//! process calls [`fake_tools`] first so no fork can race the writes.

// Test support: panics are acceptable
#![allow(clippy::disallowed_methods)]

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use tempfile::TempDir;

use crate::gateway::{GatewayTools, PkiGateway};
use crate::layout::PkiLayout;

const SCRIPTS: &[(&str, &str)] = &[
    ("easyrsa", include_str!("../../../../testdata/bin/easyrsa")),
    ("openssl", include_str!("../../../../testdata/bin/openssl")),
    (
        "openvpn-install.sh",
        include_str!("../../../../testdata/bin/openvpn-install.sh"),
    ),
    ("systemctl", include_str!("../../../../testdata/bin/systemctl")),
    (
        "systemctl-fail",
        include_str!("../../../../testdata/bin/systemctl-fail"),
    ),
];

/// `PATH` given to the fakes.
pub const SEARCH_PATH: &str = "/usr/bin:/bin";

static TOOLS_DIR: OnceLock<PathBuf> = OnceLock::new();

/// Directory holding the executable fakes.
pub fn fake_tools() -> &'static Path {
    TOOLS_DIR.get_or_init(|| {
        let dir = std::env::temp_dir().join(format!("tollgate-fake-tools-{}", std::process::id()));
        fs::create_dir_all(&dir).expect("create fake tool dir");
        for (name, body) in SCRIPTS {
            let path = dir.join(name);
            fs::write(&path, body).expect("write fake tool");
            fs::set_permissions(&path, fs::Permissions::from_mode(0o755))
                .expect("chmod fake tool");
        }
        dir
    })
}

/// Path of one fake tool, e.g. `tool("systemctl-fail")`.
pub fn tool(name: &str) -> PathBuf {
    fake_tools().join(name)
}

/// A scratch easy-rsa installation plus bundle directory.
///
/// ```text
/// <root>/easy-rsa/        easyrsa cwd, PKI at easy-rsa/pki (after init)
/// <root>/bundles/         <name>.ovpn, after collection
/// <root>/installer-home/  where the installer writes bundles (`/root`)
/// <root>/home/<name>/     preferred by the installer when present
/// <root>/fail-<what>      forces a fake to fail
/// <root>/easyrsa.calls    one line per easyrsa invocation
/// ```
pub struct FakePki {
    root: TempDir,
}

impl FakePki {
    /// Creates an empty installation with no PKI yet.
    pub fn new() -> Self {
        fake_tools();
        let root = TempDir::new().expect("create scratch dir");
        fs::create_dir_all(root.path().join("easy-rsa")).expect("create easy-rsa dir");
        fs::create_dir_all(root.path().join("bundles")).expect("create bundle dir");
        fs::create_dir_all(root.path().join("installer-home")).expect("create installer home");
        Self { root }
    }

    /// Scratch root.
    pub fn root(&self) -> &Path {
        self.root.path()
    }

    /// `<root>/easy-rsa`.
    pub fn easyrsa_dir(&self) -> PathBuf {
        self.root().join("easy-rsa")
    }

    /// `<root>/bundles`.
    pub fn bundle_dir(&self) -> PathBuf {
        self.root().join("bundles")
    }

    /// `<root>/installer-home`.
    pub fn installer_home(&self) -> PathBuf {
        self.root().join("installer-home")
    }

    /// `<root>/home`.
    pub fn user_homes(&self) -> PathBuf {
        self.root().join("home")
    }

    /// Tool set pointing at the fakes and this installation's homes.
    pub fn tools(&self) -> GatewayTools {
        GatewayTools {
            easyrsa: tool("easyrsa"),
            openssl: tool("openssl"),
            installer: tool("openvpn-install.sh"),
            installer_home: self.installer_home(),
            user_homes: self.user_homes(),
            search_path: SEARCH_PATH.to_string(),
        }
    }

    /// Layout over this installation.
    pub fn layout(&self) -> PkiLayout {
        PkiLayout::new(self.easyrsa_dir(), self.bundle_dir())
    }

    /// Gateway wired to the fakes.
    pub fn gateway(&self) -> PkiGateway {
        PkiGateway::new(self.layout(), self.tools())
    }

    /// Makes the fake for `what` fail (`issue`, `bundle`, `revoke`, `gen-crl`).
    pub fn fail(&self, what: &str) {
        fs::write(self.root().join(format!("fail-{what}")), "").expect("write marker");
    }

    /// Clears a failure set by [`FakePki::fail`].
    pub fn heal(&self, what: &str) {
        let _ = fs::remove_file(self.root().join(format!("fail-{what}")));
    }

    /// Makes the installer sleep for a second before checking the index.
    pub fn slow_installer(&self) {
        fs::write(self.root().join("slow-issue"), "").expect("write marker");
    }

    /// Arguments of every easyrsa invocation so far.
    pub fn easyrsa_calls(&self) -> Vec<String> {
        fs::read_to_string(self.root().join("easyrsa.calls"))
            .map(|s| s.lines().map(str::to_string).collect())
            .unwrap_or_default()
    }
}

impl Default for FakePki {
    fn default() -> Self {
        Self::new()
    }
}
