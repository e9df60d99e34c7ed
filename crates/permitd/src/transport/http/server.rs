//! HTTP server implementation.

use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
#[cfg(unix)]
use tokio::signal::unix::{SignalKind, signal};
use tokio::sync::watch;
use tracing::{info, warn};

use crate::service::BrokerService;

use super::routes::routes;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// If true, ignore SIGTERM and wait for explicit /shutdown or SIGINT.
    pub await_explicit_shutdown: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 5000,
            await_explicit_shutdown: false,
        }
    }
}

/// Start the HTTP server with provided service.
pub async fn serve(config: ServerConfig, service: Arc<BrokerService>) -> anyhow::Result<()> {
    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    let listener = TcpListener::bind(addr).await?;
    serve_on(listener, config.await_explicit_shutdown, service).await
}

/// Serve on an already bound listener.
///
/// Whatever ends the server also puts the service into its stopping state,
/// so in-flight connections drain without new grants being handed out.
pub(crate) async fn serve_on(
    listener: TcpListener,
    await_explicit_shutdown: bool,
    service: Arc<BrokerService>,
) -> anyhow::Result<()> {
    let app = routes(Arc::clone(&service));

    let actual_addr = listener.local_addr()?;
    let stats = service.stats();
    info!(total = stats.total, "Starting permitd server on {}", actual_addr);

    let draining = Arc::clone(&service);
    let shutdown_rx = service.shutdown_rx();
    let shutdown = async move {
        let cause = wait_for_shutdown(await_explicit_shutdown, shutdown_rx).await;
        draining.trigger_shutdown();
        let stats = draining.stats();
        info!(
            %cause,
            allocated = stats.allocated,
            providers = stats.active_providers,
            "Draining permitd, new grants refused"
        );
    };

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;

    let stats = service.stats();
    info!(
        allocated = stats.allocated,
        providers = stats.active_providers,
        "Server shutdown complete"
    );

    Ok(())
}

/// What stopped the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ShutdownCause {
    Interrupt,
    Terminate,
    Requested,
}

impl fmt::Display for ShutdownCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ShutdownCause::Interrupt => "SIGINT",
            ShutdownCause::Terminate => "SIGTERM",
            ShutdownCause::Requested => "/shutdown",
        })
    }
}

/// Resolve on SIGINT, on SIGTERM unless `await_explicit_shutdown`, or once
/// the service's shutdown flag is set.
///
/// A signal handler that cannot be installed is logged and that source is
/// ignored; the remaining sources still work.
pub(crate) async fn wait_for_shutdown(
    await_explicit_shutdown: bool,
    mut shutdown_rx: watch::Receiver<bool>,
) -> ShutdownCause {
    let interrupt = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Cannot listen for SIGINT");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        if await_explicit_shutdown {
            info!("await_explicit_shutdown enabled, ignoring SIGTERM");
            return std::future::pending::<()>().await;
        }
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Cannot listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = {
        let _ = await_explicit_shutdown;
        std::future::pending::<()>()
    };

    let requested = async {
        // A dropped sender means the service is gone; only signals remain.
        if shutdown_rx.wait_for(|stopping| *stopping).await.is_err() {
            std::future::pending::<()>().await;
        }
    };

    tokio::select! {
        _ = interrupt => ShutdownCause::Interrupt,
        _ = terminate => ShutdownCause::Terminate,
        _ = requested => ShutdownCause::Requested,
    }
}
