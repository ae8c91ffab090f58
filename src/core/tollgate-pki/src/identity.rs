//! Client identity names and derived status.

use std::fmt;

use crate::error::PkiError;

/// Prefix of allocator-generated identity names.
pub const CLIENT_PREFIX: &str = "client_";

/// File extension of exportable client bundles.
pub const BUNDLE_EXTENSION: &str = "ovpn";

/// Derived lifecycle status of an identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentityStatus {
    /// Certificate, key and bundle exist and the index has not revoked it.
    Issued,
    /// The index records the identity as revoked.
    Revoked,
}

impl fmt::Display for IdentityStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IdentityStatus::Issued => f.write_str("issued"),
            IdentityStatus::Revoked => f.write_str("revoked"),
        }
    }
}

/// A validated VPN client identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClientIdentity {
    name: String,
}

impl ClientIdentity {
    /// Validates `name` against `^[A-Za-z0-9_-]+$`.
    pub fn parse(name: &str) -> Result<Self, PkiError> {
        validate_name(name)?;
        Ok(Self {
            name: name.to_string(),
        })
    }

    /// Builds the allocator-convention name `client_<n>`.
    pub fn numbered(n: u64) -> Self {
        Self {
            name: format!("{CLIENT_PREFIX}{n}"),
        }
    }

    /// The identity name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// `<n>` for names of the form `client_<n>`.
    pub fn numeric_suffix(&self) -> Option<u64> {
        numeric_suffix(&self.name)
    }

    /// Bundle file name, `<name>.ovpn`.
    pub fn bundle_file_name(&self) -> String {
        format!("{}.{BUNDLE_EXTENSION}", self.name)
    }

    /// Consumes the identity, returning the name.
    pub fn into_name(self) -> String {
        self.name
    }
}

impl fmt::Display for ClientIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

impl AsRef<str> for ClientIdentity {
    fn as_ref(&self) -> &str {
        &self.name
    }
}

/// Rejects anything outside `[A-Za-z0-9_-]+`.
pub fn validate_name(name: &str) -> Result<(), PkiError> {
    if name.is_empty()
        || !name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err(PkiError::InvalidName(name.to_string()));
    }
    Ok(())
}

/// Parses `<n>` out of `client_<n>`; any other shape yields `None`.
pub fn numeric_suffix(name: &str) -> Option<u64> {
    let digits = name.strip_prefix(CLIENT_PREFIX)?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}
