//! Client inventory built from the bundle directory.

use std::cmp::Reverse;
use std::io::ErrorKind;
use std::time::SystemTime;

use tollgate_pki::{ClientIdentity, IdentityStatus, PkiIndex, PkiLayout};
use tollgate_trust::ConnectionSnapshot;

use crate::error::LifecycleError;

/// One exported bundle and what is known about its identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientSummary {
    /// Identity named by the bundle stem.
    pub identity: ClientIdentity,
    /// Bundle creation time (modification time where the filesystem has none).
    pub created: Option<SystemTime>,
    /// `None` when the identity is neither revoked nor fully issued.
    pub status: Option<IdentityStatus>,
    /// Present in the connection snapshot.
    pub connected: bool,
}

/// Lists every `<valid-name>.ovpn` in the bundle directory, newest first.
///
/// Ties are broken by name so the order is stable.
pub fn list_clients(
    layout: &PkiLayout,
    connected: &ConnectionSnapshot,
) -> Result<Vec<ClientSummary>, LifecycleError> {
    let dir = layout.bundle_dir();
    let io_err = |source| LifecycleError::Io {
        path: dir.to_path_buf(),
        source,
    };
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(io_err(e)),
    };
    let index = PkiIndex::load(&layout.index())?;

    let mut clients = Vec::new();
    for entry in entries {
        let entry = entry.map_err(io_err)?;
        let Some(identity) = entry.file_name().to_str().and_then(PkiLayout::bundle_stem) else {
            continue;
        };
        let created = entry
            .metadata()
            .ok()
            .and_then(|m| m.created().or_else(|_| m.modified()).ok());
        let status = derive_status(layout, &index, &identity);
        clients.push(ClientSummary {
            connected: connected.contains(identity.name()),
            identity,
            created,
            status,
        });
    }

    sort_newest_first(&mut clients);
    Ok(clients)
}

/// Newest first; unknown creation times last, ties by name.
pub fn sort_newest_first(clients: &mut [ClientSummary]) {
    clients.sort_by(|a, b| {
        Reverse(a.created)
            .cmp(&Reverse(b.created))
            .then_with(|| a.identity.cmp(&b.identity))
    });
}

/// Index flag first; otherwise issued only when certificate and key exist.
pub fn derive_status(
    layout: &PkiLayout,
    index: &PkiIndex,
    identity: &ClientIdentity,
) -> Option<IdentityStatus> {
    if index.is_revoked(identity.name()) {
        return Some(IdentityStatus::Revoked);
    }
    let complete = layout.certificate(identity).exists() && layout.private_key(identity).exists();
    complete.then_some(IdentityStatus::Issued)
}
