//! Read-only views of the permit pool.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Counters and totals captured at a single moment.
///
/// `available + allocated == total` holds for every value produced by the manager.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolStats {
    pub total: u64,
    pub available: u64,
    pub allocated: u64,
    pub active_providers: usize,
    /// Every Request call, including ones that granted nothing.
    pub total_requests: u64,
    /// Request calls that granted at least one permit.
    pub total_grants: u64,
    pub total_releases: u64,
    /// Provider rows touched by revocation (one per provider per Revoke call).
    pub total_revocations: u64,
    /// Revoke calls, including ones that reclaimed nothing.
    pub revoke_calls: u64,
}

/// Which meter `PoolStats::revocations` reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RevocationCounting {
    PerProvider,
    PerCall,
}

impl PoolStats {
    pub fn revocations(&self, counting: RevocationCounting) -> u64 {
        match counting {
            RevocationCounting::PerProvider => self.total_revocations,
            RevocationCounting::PerCall => self.revoke_calls,
        }
    }

    /// No permits left to grant in a non-empty pool.
    pub fn is_saturated(&self) -> bool {
        self.total > 0 && self.available == 0
    }
}

/// Stats and a copy of the allocation map, captured under one lock.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolSnapshot {
    pub stats: PoolStats,
    pub allocations: BTreeMap<String, u64>,
}

impl PoolSnapshot {
    /// Sum of all provider holdings.
    pub fn outstanding(&self) -> u64 {
        self.allocations.values().sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> PoolStats {
        PoolStats {
            total: 10,
            available: 4,
            allocated: 6,
            active_providers: 2,
            total_requests: 5,
            total_grants: 3,
            total_releases: 1,
            total_revocations: 2,
            revoke_calls: 1,
        }
    }

    #[test]
    fn stats_serialize_flat() {
        insta::assert_json_snapshot!(sample(), @r#"
        {
          "total": 10,
          "available": 4,
          "allocated": 6,
          "active_providers": 2,
          "total_requests": 5,
          "total_grants": 3,
          "total_releases": 1,
          "total_revocations": 2,
          "revoke_calls": 1
        }
        "#);
    }

    #[test]
    fn revocation_meter_selection() {
        let stats = sample();
        assert_eq!(stats.revocations(RevocationCounting::PerProvider), 2);
        assert_eq!(stats.revocations(RevocationCounting::PerCall), 1);
    }

    #[test]
    fn saturation_requires_nonempty_pool() {
        assert!(!PoolStats::default().is_saturated());

        let full = PoolStats {
            total: 3,
            available: 0,
            allocated: 3,
            ..PoolStats::default()
        };
        assert!(full.is_saturated());
        assert!(!sample().is_saturated());
    }

    #[test]
    fn snapshot_outstanding_sums_allocations() {
        let snapshot = PoolSnapshot {
            stats: sample(),
            allocations: BTreeMap::from([("cve".to_string(), 4), ("cwe".to_string(), 2)]),
        };
        assert_eq!(snapshot.outstanding(), 6);
    }
}
