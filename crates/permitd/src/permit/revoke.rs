//! Proportional revocation with a minimum-one floor and a remainder sweep.
//!
//! Planning is separate from applying: the manager computes the whole plan
//! against the current allocation map and only then mutates state, so the
//! per-provider updates land as one batch.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Per-provider amounts reclaimed by a single Revoke call.
///
/// Empty when there was nothing to reclaim.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Revocation(BTreeMap<String, u64>);

impl Revocation {
    /// Total permits reclaimed across all providers.
    pub fn total(&self) -> u64 {
        self.0.values().sum()
    }

    pub fn get(&self, provider_id: &str) -> Option<u64> {
        self.0.get(provider_id).copied()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Number of providers that lost at least one permit.
    pub fn providers(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, u64)> {
        self.0.iter().map(|(id, n)| (id.as_str(), *n))
    }

    pub fn into_inner(self) -> BTreeMap<String, u64> {
        self.0
    }
}

/// Compute how many permits to take from each holder to reclaim `count`.
///
/// First walk: each holder gives `floor(held * count / outstanding)`, raised to
/// one while budget remains, clamped by the remaining budget and by its
/// holding. Second walk: whatever budget the floors left behind is taken
/// from residual holdings in the same order. The result never exceeds
/// `min(count, outstanding)` and never takes more than a holder has.
pub(crate) fn plan(allocations: &BTreeMap<String, u64>, count: u64) -> Revocation {
    let outstanding: u64 = allocations.values().sum();
    let mut taken: BTreeMap<String, u64> = BTreeMap::new();
    if count == 0 || outstanding == 0 {
        return Revocation(taken);
    }

    let mut remaining = count;

    for (provider_id, &held) in allocations {
        if remaining == 0 {
            break;
        }
        // u128 keeps held * count exact for any pair of u64 inputs.
        let share = (u128::from(held) * u128::from(count) / u128::from(outstanding)) as u64;
        let share = if share == 0 && held > 0 { 1 } else { share };
        let share = share.min(remaining).min(held);
        if share > 0 {
            taken.insert(provider_id.clone(), share);
            remaining -= share;
        }
    }

    for (provider_id, &held) in allocations {
        if remaining == 0 {
            break;
        }
        let already = taken.get(provider_id).copied().unwrap_or(0);
        let extra = (held - already).min(remaining);
        if extra > 0 {
            *taken.entry(provider_id.clone()).or_insert(0) += extra;
            remaining -= extra;
        }
    }

    Revocation(taken)
}
