//! Permit manager: a fixed-size pool of worker slots shared by named providers.
//!
//! All state lives behind one mutex. Every operation takes it exactly once,
//! does pure in-memory work, and releases it before logging, so operations
//! are linearizable and observers never see a partially applied update.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

use serde::{Deserialize, Serialize};

use super::lease::PermitLease;
use super::revoke::{self, Revocation};
use super::stats::{PoolSnapshot, PoolStats};
use crate::error::{PermitError, Result};

/// Pool size used when the configured total is zero or negative.
pub const DEFAULT_TOTAL_PERMITS: u64 = 10;

/// Outcome of a Request. `granted` may be zero when the pool is exhausted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Grant {
    pub granted: u64,
    pub available: u64,
    pub provider_id: String,
}

/// Outcome of a Release. `released` is clamped to what the provider held.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Release {
    pub released: u64,
    pub available: u64,
    pub provider_id: String,
}

#[derive(Debug, Default)]
struct Counters {
    requests: u64,
    grants: u64,
    releases: u64,
    revocations: u64,
    revoke_calls: u64,
}

/// Permits still owned by one live lease.
#[derive(Debug)]
struct LeaseBalance {
    provider_id: String,
    held: u64,
}

#[derive(Debug)]
struct PoolState {
    total: u64,
    available: u64,
    /// Providers with zero permits are absent, never stored as 0.
    allocations: BTreeMap<String, u64>,
    /// Live leases by id. A provider's lease balances never sum past its
    /// allocation, and drained leases are removed.
    leases: BTreeMap<u64, LeaseBalance>,
    next_lease: u64,
    counters: Counters,
}

impl PoolState {
    fn allocated(&self) -> u64 {
        self.total - self.available
    }

    fn grant(&mut self, provider_id: &str, count: u64) -> u64 {
        self.counters.requests += 1;
        let granted = count.min(self.available);
        if granted > 0 {
            self.available -= granted;
            *self.allocations.entry(provider_id.to_string()).or_insert(0) += granted;
            self.counters.grants += 1;
        }
        granted
    }

    /// Move up to `n` permits from `provider_id` back to the pool.
    fn reclaim(&mut self, provider_id: &str, n: u64) -> u64 {
        let Some(held) = self.allocations.get_mut(provider_id) else {
            return 0;
        };
        let taken = n.min(*held);
        *held -= taken;
        let left = *held;
        if left == 0 {
            self.allocations.remove(provider_id);
        }
        self.available += taken;
        if taken > 0 {
            self.settle_leases(provider_id, left);
        }
        taken
    }

    fn open_lease(&mut self, provider_id: &str, held: u64) -> u64 {
        let id = self.next_lease;
        self.next_lease += 1;
        self.leases.insert(
            id,
            LeaseBalance {
                provider_id: provider_id.to_string(),
                held,
            },
        );
        id
    }

    /// Shrink `provider_id`'s lease balances until they fit in `holding`.
    ///
    /// Permits held outside any lease are lost first; after that the newest
    /// lease is debited first.
    fn settle_leases(&mut self, provider_id: &str, holding: u64) {
        let leased: u64 = self
            .leases
            .values()
            .filter(|lease| lease.provider_id == provider_id)
            .map(|lease| lease.held)
            .sum();
        let mut excess = leased.saturating_sub(holding);
        if excess == 0 {
            return;
        }

        let mut drained = Vec::new();
        for (id, lease) in self.leases.iter_mut().rev() {
            if excess == 0 {
                break;
            }
            if lease.provider_id != provider_id {
                continue;
            }
            let debit = excess.min(lease.held);
            lease.held -= debit;
            excess -= debit;
            if lease.held == 0 {
                drained.push(*id);
            }
        }
        for id in drained {
            self.leases.remove(&id);
        }
    }

    fn stats(&self) -> PoolStats {
        PoolStats {
            total: self.total,
            available: self.available,
            allocated: self.allocated(),
            active_providers: self.allocations.len(),
            total_requests: self.counters.requests,
            total_grants: self.counters.grants,
            total_releases: self.counters.releases,
            total_revocations: self.counters.revocations,
            revoke_calls: self.counters.revoke_calls,
        }
    }
}

fn validate(provider_id: &str, count: i64) -> Result<u64> {
    if provider_id.is_empty() {
        return Err(PermitError::empty_provider());
    }
    positive("count", count)
}

fn positive(field: &str, value: i64) -> Result<u64> {
    u64::try_from(value)
        .ok()
        .filter(|v| *v > 0)
        .ok_or_else(|| PermitError::non_positive(field, value))
}

/// Process-wide permit pool.
///
/// Share it behind an `Arc`; every method takes `&self`.
#[derive(Debug)]
pub struct PermitManager {
    state: Mutex<PoolState>,
}

impl PermitManager {
    /// Create a pool with `total` permits, all available.
    ///
    /// A zero or negative `total` falls back to [`DEFAULT_TOTAL_PERMITS`].
    pub fn new(total: i64) -> Self {
        let total = match u64::try_from(total) {
            Ok(t) if t > 0 => t,
            _ => {
                tracing::debug!(
                    configured = total,
                    default = DEFAULT_TOTAL_PERMITS,
                    "Non-positive pool size, using default"
                );
                DEFAULT_TOTAL_PERMITS
            }
        };

        Self {
            state: Mutex::new(PoolState {
                total,
                available: total,
                allocations: BTreeMap::new(),
                leases: BTreeMap::new(),
                next_lease: 0,
                counters: Counters::default(),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, PoolState> {
        // No operation panics between its writes; poisoned state is still consistent.
        self.state.lock().unwrap_or_else(|poisoned| {
            tracing::error!("Permit pool mutex poisoned - recovering state");
            poisoned.into_inner()
        })
    }

    /// Grant up to `count` permits to `provider_id`.
    ///
    /// Never blocks and never fails for exhaustion: an empty pool yields
    /// `granted == 0`.
    pub fn request(&self, provider_id: &str, count: i64) -> Result<Grant> {
        let count = validate(provider_id, count)?;

        let mut state = self.lock();
        let granted = state.grant(provider_id, count);
        let available = state.available;
        drop(state);

        tracing::debug!(
            provider = provider_id,
            requested = count,
            granted,
            available,
            "Permit request"
        );

        Ok(Grant {
            granted,
            available,
            provider_id: provider_id.to_string(),
        })
    }

    /// Return up to `count` of the permits `provider_id` holds.
    ///
    /// Over-release is clamped, not rejected. Releasing the last permit
    /// removes the provider from the allocation map.
    pub fn release(&self, provider_id: &str, count: i64) -> Result<Release> {
        let count = validate(provider_id, count)?;

        let mut state = self.lock();
        if !state.allocations.contains_key(provider_id) {
            return Err(PermitError::NotFound {
                provider_id: provider_id.to_string(),
            });
        }
        let released = state.reclaim(provider_id, count);
        state.counters.releases += 1;
        let available = state.available;
        drop(state);

        tracing::debug!(
            provider = provider_id,
            requested = count,
            released,
            available,
            "Permit release"
        );

        Ok(Release {
            released,
            available,
            provider_id: provider_id.to_string(),
        })
    }

    /// Forcibly reclaim up to `count` permits spread over all holders.
    ///
    /// Never fails. A non-positive `count` or an empty allocation map yields
    /// an empty result. The revocation counter advances once per provider
    /// touched; `revoke_calls` advances once per call.
    pub fn revoke(&self, count: i64) -> Revocation {
        let mut state = self.lock();
        state.counters.revoke_calls += 1;

        let Ok(count) = u64::try_from(count) else {
            drop(state);
            tracing::debug!(count, "Ignoring revoke with negative count");
            return Revocation::default();
        };

        let revocation = revoke::plan(&state.allocations, count);
        for (provider_id, n) in revocation.iter() {
            state.reclaim(provider_id, n);
        }
        state.counters.revocations += revocation.providers() as u64;
        let available = state.available;
        drop(state);

        if revocation.is_empty() {
            tracing::debug!(requested = count, "Revoke found nothing to reclaim");
        } else {
            tracing::info!(
                requested = count,
                reclaimed = revocation.total(),
                providers = revocation.providers(),
                available,
                "Permits revoked"
            );
        }

        revocation
    }

    /// Change the pool size without touching existing allocations.
    ///
    /// Fails with `Conflict` if `total` is below what is currently allocated;
    /// shrink below that requires an explicit `revoke` first.
    pub fn resize(&self, total: i64) -> Result<PoolStats> {
        let total = positive("total", total)?;

        let mut state = self.lock();
        let allocated = state.allocated();
        if total < allocated {
            return Err(PermitError::Conflict {
                requested: total,
                allocated,
            });
        }
        let previous = state.total;
        state.total = total;
        state.available = total - allocated;
        let stats = state.stats();
        drop(state);

        if previous != total {
            tracing::info!(
                previous,
                total,
                available = stats.available,
                "Permit pool resized"
            );
        }

        Ok(stats)
    }

    pub fn stats(&self) -> PoolStats {
        self.lock().stats()
    }

    /// Copy of the allocation map. Providers holding nothing are absent.
    pub fn allocations(&self) -> BTreeMap<String, u64> {
        self.lock().allocations.clone()
    }

    /// Stats and allocations from the same instant.
    pub fn snapshot(&self) -> PoolSnapshot {
        let state = self.lock();
        PoolSnapshot {
            stats: state.stats(),
            allocations: state.allocations.clone(),
        }
    }

    /// Permits currently held by `provider_id` (zero when absent).
    pub fn holding(&self, provider_id: &str) -> u64 {
        self.lock().allocations.get(provider_id).copied().unwrap_or(0)
    }

    /// Request permits and wrap the grant in a guard that returns them on drop.
    ///
    /// The manager tracks each lease's own balance. Revocation and explicit
    /// releases debit leased permits only once the provider's unleased
    /// permits are gone, so a lease never returns permits owned by another.
    pub fn lease(self: &Arc<Self>, provider_id: &str, count: i64) -> Result<PermitLease> {
        let count = validate(provider_id, count)?;

        let mut state = self.lock();
        let granted = state.grant(provider_id, count);
        let lease_id = (granted > 0).then(|| state.open_lease(provider_id, granted));
        let available = state.available;
        drop(state);

        tracing::debug!(
            provider = provider_id,
            requested = count,
            granted,
            available,
            "Permit lease"
        );

        Ok(PermitLease::new(
            Arc::clone(self),
            provider_id.to_string(),
            lease_id,
            granted,
        ))
    }

    /// Permits lease `lease_id` still owns. Zero once it is drained or closed.
    pub(crate) fn lease_balance(&self, lease_id: u64) -> u64 {
        self.lock().leases.get(&lease_id).map_or(0, |lease| lease.held)
    }

    /// Close a lease and return its remaining balance to the pool.
    pub(crate) fn end_lease(&self, lease_id: u64) -> u64 {
        let mut state = self.lock();
        let Some(lease) = state.leases.remove(&lease_id) else {
            return 0;
        };
        let released = state.reclaim(&lease.provider_id, lease.held);
        state.counters.releases += 1;
        let available = state.available;
        drop(state);

        tracing::debug!(
            provider = %lease.provider_id,
            released,
            available,
            "Lease returned"
        );

        released
    }

    /// Close a lease, leaving its permits allocated to the provider.
    pub(crate) fn detach_lease(&self, lease_id: u64) -> u64 {
        self.lock()
            .leases
            .remove(&lease_id)
            .map_or(0, |lease| lease.held)
    }
}

impl Default for PermitManager {
    fn default() -> Self {
        Self::new(DEFAULT_TOTAL_PERMITS as i64)
    }
}
