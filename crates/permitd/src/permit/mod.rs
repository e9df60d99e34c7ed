//! Permit pool shared by ingestion providers.
//!
//! Providers request permits before starting work and release them when done.
//! A supervisor may revoke permits in bulk; revocation is spread over holders
//! proportionally, with every holder paying at least one while budget remains.

mod lease;
mod manager;
mod revoke;
mod stats;

pub use lease::PermitLease;
pub use manager::{DEFAULT_TOTAL_PERMITS, Grant, PermitManager, Release};
pub use revoke::Revocation;
pub use stats::{PoolSnapshot, PoolStats, RevocationCounting};
