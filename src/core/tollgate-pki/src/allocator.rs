//! Numeric identity allocation.
//!
//! The next identity is `client_<k>` where `k` is the smallest positive
//! integer not used by any bundle file stem, any issued certificate or any
//! common name the CA has ever recorded. Gaps left by purged identities are
//! refilled, but a name still present in the index (revoked or not) is never
//! handed out again. A certificate left behind by a failed issuance, with no
//! index record yet, also keeps its name reserved.

use std::collections::{BTreeSet, HashSet};
use std::io::ErrorKind;
use std::path::Path;

use tracing::debug;

use crate::error::PkiError;
use crate::identity::ClientIdentity;
use crate::index::PkiIndex;
use crate::layout::PkiLayout;

/// Computes the next unused `client_<n>` identity.
#[derive(Debug, Clone)]
pub struct IdentityAllocator {
    layout: PkiLayout,
}

impl IdentityAllocator {
    /// Creates an allocator over the given layout.
    pub fn new(layout: PkiLayout) -> Self {
        Self { layout }
    }

    /// Every name claimed by a bundle file, an issued certificate or an
    /// index record.
    pub fn used_names(&self) -> Result<BTreeSet<String>, PkiError> {
        let mut names = stems(self.layout.bundle_dir(), PkiLayout::bundle_stem)?;
        names.extend(stems(&self.layout.issued_dir(), PkiLayout::certificate_stem)?);
        names.extend(PkiIndex::load(&self.layout.index())?.common_names());
        Ok(names)
    }

    /// Returns the smallest free `client_<k>`, `k >= 1`.
    ///
    /// Reads only; callers serialize allocation with issuance.
    pub fn next_identity(&self) -> Result<ClientIdentity, PkiError> {
        let used = self.used_names()?;
        let identity = ClientIdentity::numbered(smallest_free(&used));
        debug!(name = %identity, used = used.len(), "Allocated identity");
        Ok(identity)
    }
}

/// Names of the entries in `dir` that `stem` accepts; a missing `dir` is empty.
fn stems(dir: &Path, stem: fn(&str) -> Option<ClientIdentity>) -> Result<BTreeSet<String>, PkiError> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(BTreeSet::new()),
        Err(e) => return Err(PkiError::io(dir, e)),
    };

    let mut names = BTreeSet::new();
    for entry in entries {
        let entry = entry.map_err(|e| PkiError::io(dir, e))?;
        if let Some(id) = entry.file_name().to_str().and_then(stem) {
            names.insert(id.into_name());
        }
    }
    Ok(names)
}

/// Smallest positive integer not taken by a `client_<n>` name in `used`.
pub fn smallest_free<'a, I>(used: I) -> u64
where
    I: IntoIterator<Item = &'a String>,
{
    let taken: HashSet<u64> = used
        .into_iter()
        .filter_map(|name| crate::identity::numeric_suffix(name))
        .collect();
    let mut n = 1;
    while taken.contains(&n) {
        n += 1;
    }
    n
}
