//! Health status reported by the broker.

use serde::{Deserialize, Serialize};

use crate::permit::PoolStats;

/// Health of the permit broker.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Health {
    /// Accepting requests with permits to spare
    #[default]
    Ready,
    /// Accepting requests, but every permit is allocated
    Saturated,
    /// Shutdown triggered; new grants are refused
    Stopping,
}

impl Health {
    pub fn from_stats(stats: &PoolStats, stopping: bool) -> Self {
        if stopping {
            Health::Stopping
        } else if stats.is_saturated() {
            Health::Saturated
        } else {
            Health::Ready
        }
    }
}
