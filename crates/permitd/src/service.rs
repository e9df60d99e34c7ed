//! BrokerService: transport-agnostic front for the permit manager.
//!
//! This service owns:
//! - The shared `PermitManager`
//! - Health reporting (pool saturation, shutdown state)
//! - Shutdown coordination (bidirectional)
//!
//! Transports (HTTP today) delegate to this service and map its errors onto
//! their own envelopes.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::watch;

use crate::config::BrokerConfig;
use crate::error::PermitError;
use crate::health::Health;
use crate::permit::{Grant, PermitManager, PoolSnapshot, PoolStats, Release, Revocation};

/// Broker version from Cargo.toml
pub const PERMITD_VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ServiceError {
    #[error("Broker is shutting down")]
    Stopping,
    #[error(transparent)]
    Permit(#[from] PermitError),
}

impl ServiceError {
    pub fn kind(&self) -> &'static str {
        match self {
            ServiceError::Stopping => "stopping",
            ServiceError::Permit(e) => e.kind(),
        }
    }
}

/// Snapshot of service health for transports to query.
#[derive(Debug, Clone)]
pub struct HealthSnapshot {
    pub state: Health,
    pub stats: PoolStats,
    pub started_at: DateTime<Utc>,
    pub version: &'static str,
}

pub struct BrokerService {
    manager: Arc<PermitManager>,
    started_at: DateTime<Utc>,

    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
}

impl BrokerService {
    pub fn new(manager: Arc<PermitManager>) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        Self {
            manager,
            started_at: Utc::now(),
            shutdown_tx,
            shutdown_rx,
        }
    }

    pub fn from_config(config: &BrokerConfig) -> Self {
        Self::new(Arc::new(PermitManager::new(config.total_permits)))
    }

    pub fn manager(&self) -> &Arc<PermitManager> {
        &self.manager
    }

    pub fn is_stopping(&self) -> bool {
        *self.shutdown_rx.borrow()
    }

    pub fn health(&self) -> HealthSnapshot {
        let stats = self.manager.stats();
        HealthSnapshot {
            state: Health::from_stats(&stats, self.is_stopping()),
            stats,
            started_at: self.started_at,
            version: PERMITD_VERSION,
        }
    }

    /// Grant permits. Refused once shutdown has been triggered.
    pub fn request(&self, provider_id: &str, count: i64) -> Result<Grant, ServiceError> {
        if self.is_stopping() {
            return Err(ServiceError::Stopping);
        }
        Ok(self.manager.request(provider_id, count)?)
    }

    /// Return permits. Still accepted while stopping so providers can drain.
    pub fn release(&self, provider_id: &str, count: i64) -> Result<Release, ServiceError> {
        Ok(self.manager.release(provider_id, count)?)
    }

    pub fn revoke(&self, count: i64) -> Revocation {
        self.manager.revoke(count)
    }

    pub fn resize(&self, total: i64) -> Result<PoolStats, ServiceError> {
        Ok(self.manager.resize(total)?)
    }

    pub fn stats(&self) -> PoolStats {
        self.manager.stats()
    }

    pub fn allocations(&self) -> BTreeMap<String, u64> {
        self.manager.allocations()
    }

    pub fn snapshot(&self) -> PoolSnapshot {
        self.manager.snapshot()
    }

    pub fn trigger_shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }

    pub fn shutdown_rx(&self) -> watch::Receiver<bool> {
        self.shutdown_rx.clone()
    }
}
