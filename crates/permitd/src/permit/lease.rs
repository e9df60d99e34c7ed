//! RAII lease over granted permits.
//!
//! The manager keeps a balance per lease. Revocation and explicit releases
//! may debit that balance while the lease is alive; on drop the lease returns
//! whatever balance is left, never permits owned by a sibling lease.

use std::sync::Arc;

use super::manager::PermitManager;

/// Permits granted to one provider, returned to the pool on drop.
#[must_use = "dropping a lease immediately returns its permits"]
#[derive(Debug)]
pub struct PermitLease {
    manager: Arc<PermitManager>,
    provider_id: String,
    /// None for an empty grant or once the lease is closed.
    id: Option<u64>,
    granted: u64,
}

impl PermitLease {
    pub(crate) fn new(
        manager: Arc<PermitManager>,
        provider_id: String,
        id: Option<u64>,
        granted: u64,
    ) -> Self {
        Self {
            manager,
            provider_id,
            id,
            granted,
        }
    }

    pub fn provider_id(&self) -> &str {
        &self.provider_id
    }

    /// Permits granted when the lease was taken. May be zero.
    pub fn granted(&self) -> u64 {
        self.granted
    }

    /// Permits this lease still owns after any revocation.
    pub fn held(&self) -> u64 {
        self.id.map_or(0, |id| self.manager.lease_balance(id))
    }

    pub fn is_empty(&self) -> bool {
        self.granted == 0
    }

    /// Return the permits now. Yields how many actually went back to the pool.
    pub fn release_now(mut self) -> u64 {
        self.give_back()
    }

    /// Detach from the pool without returning anything.
    ///
    /// The provider keeps the allocation and must release it explicitly.
    /// Yields the balance that was detached.
    pub fn forget(mut self) -> u64 {
        self.id
            .take()
            .map_or(0, |id| self.manager.detach_lease(id))
    }

    fn give_back(&mut self) -> u64 {
        let Some(id) = self.id.take() else {
            return 0;
        };
        let released = self.manager.end_lease(id);
        if released < self.granted {
            tracing::debug!(
                provider = %self.provider_id,
                granted = self.granted,
                released,
                "Lease permits partly revoked"
            );
        }
        released
    }
}

impl Drop for PermitLease {
    fn drop(&mut self) {
        self.give_back();
    }
}
