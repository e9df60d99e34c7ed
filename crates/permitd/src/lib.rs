//! permitd: process-wide permit broker for data-ingestion providers.

mod health;

pub mod config;
pub mod error;
pub mod permit;
pub mod service;
pub mod transport;

pub use config::{BrokerConfig, ConfigError};
pub use error::PermitError;
pub use health::Health;
pub use permit::{
    DEFAULT_TOTAL_PERMITS, Grant, PermitLease, PermitManager, PoolSnapshot, PoolStats, Release,
    Revocation, RevocationCounting,
};
pub use service::{BrokerService, HealthSnapshot, PERMITD_VERSION, ServiceError};
