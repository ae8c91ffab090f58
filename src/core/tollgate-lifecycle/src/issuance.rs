//! Issuance pipeline: allocate the next identity and mint its bundle.

use tracing::info;

use tollgate_pki::{IdentityAllocator, IssuedBundle, PkiGateway};

use crate::error::LifecycleError;
use crate::lock::PkiLock;

/// Allocation and issuance under one lock hold, so two concurrent runs
/// never receive the same name.
pub struct IssuancePipeline<'a> {
    gateway: &'a PkiGateway,
    allocator: &'a IdentityAllocator,
    lock: &'a PkiLock,
}

impl<'a> IssuancePipeline<'a> {
    /// Wires a pipeline.
    pub fn new(
        gateway: &'a PkiGateway,
        allocator: &'a IdentityAllocator,
        lock: &'a PkiLock,
    ) -> Self {
        Self {
            gateway,
            allocator,
            lock,
        }
    }

    /// Initializes the PKI if needed, then issues the next free identity.
    pub fn run(&self) -> Result<IssuedBundle, LifecycleError> {
        let _guard = self.lock.acquire()?;

        if self.gateway.ensure_initialized()? {
            info!(pki = %self.gateway.layout().pki_dir().display(), "Created PKI on first issuance");
        }
        let identity = self.allocator.next_identity()?;
        let issued = self.gateway.issue(&identity)?;
        Ok(issued)
    }
}
