//! On-disk layout of an easy-rsa installation and the bundle directory.

use std::path::{Path, PathBuf};

use crate::identity::{ClientIdentity, BUNDLE_EXTENSION};

/// Paths of every artifact the orchestrator reads or removes.
#[derive(Debug, Clone)]
pub struct PkiLayout {
    easyrsa_dir: PathBuf,
    pki_dir: PathBuf,
    bundle_dir: PathBuf,
}

impl PkiLayout {
    /// Layout for `<easyrsa_dir>/pki` with bundles under `bundle_dir`.
    pub fn new(easyrsa_dir: impl Into<PathBuf>, bundle_dir: impl Into<PathBuf>) -> Self {
        let easyrsa_dir = easyrsa_dir.into();
        Self {
            pki_dir: easyrsa_dir.join("pki"),
            easyrsa_dir,
            bundle_dir: bundle_dir.into(),
        }
    }

    /// The easy-rsa installation directory.
    pub fn easyrsa_dir(&self) -> &Path {
        &self.easyrsa_dir
    }

    /// The PKI store, `<easyrsa_dir>/pki`.
    pub fn pki_dir(&self) -> &Path {
        &self.pki_dir
    }

    /// Directory holding `<name>.ovpn` bundles.
    pub fn bundle_dir(&self) -> &Path {
        &self.bundle_dir
    }

    /// `pki/index.txt`.
    pub fn index(&self) -> PathBuf {
        self.pki_dir.join("index.txt")
    }

    /// `pki/crl.pem`, as written by `gen-crl`.
    pub fn crl(&self) -> PathBuf {
        self.pki_dir.join("crl.pem")
    }

    /// `pki/issued`.
    pub fn issued_dir(&self) -> PathBuf {
        self.pki_dir.join("issued")
    }

    /// `pki/issued/<name>.crt`.
    pub fn certificate(&self, id: &ClientIdentity) -> PathBuf {
        self.issued_dir().join(format!("{id}.crt"))
    }

    /// `pki/private/<name>.key`.
    pub fn private_key(&self, id: &ClientIdentity) -> PathBuf {
        self.pki_dir.join("private").join(format!("{id}.key"))
    }

    /// `<bundle_dir>/<name>.ovpn`.
    pub fn bundle(&self, id: &ClientIdentity) -> PathBuf {
        self.bundle_dir.join(id.bundle_file_name())
    }

    /// Bundle, certificate and key, in purge order.
    pub fn artifacts(&self, id: &ClientIdentity) -> [PathBuf; 3] {
        [self.bundle(id), self.certificate(id), self.private_key(id)]
    }

    /// Returns the identity stem if `file_name` is `<valid-name>.ovpn`.
    pub fn bundle_stem(file_name: &str) -> Option<ClientIdentity> {
        let stem = file_name.strip_suffix(BUNDLE_EXTENSION)?.strip_suffix('.')?;
        ClientIdentity::parse(stem).ok()
    }

    /// Returns the identity stem if `file_name` is `<valid-name>.crt`.
    pub fn certificate_stem(file_name: &str) -> Option<ClientIdentity> {
        let stem = file_name.strip_suffix(".crt")?;
        ClientIdentity::parse(stem).ok()
    }
}
