//! `linkbridge` binary.
//!
//! Loads the configuration named by `LINKBRIDGE_CONFIG`, serves the bridge
//! routes, reloads the configuration on `SIGHUP`, and shuts down gracefully
//! on Ctrl+C or `SIGTERM`.
//!
//! The binary keeps links in memory. Deployments embedding the bridge in a
//! host platform pass the host's store to [`AppState`] instead.

use std::sync::Arc;

use linkbridge_server::{AppState, BridgeConfig, ConfigHolder, ServerError, build_router, telemetry};
use linkbridge_storage::MemoryBackend;

#[tokio::main]
async fn main() -> Result<(), ServerError> {
    let config = BridgeConfig::from_env()?;
    telemetry::init(config.log_format)?;

    let addr = config.listen_addr;
    let holder = ConfigHolder::new(config)?;
    let state = AppState::builder()
        .config(holder.clone())
        .store(Arc::new(MemoryBackend::new()))
        .build()?;
    let metrics = state.metrics().clone();

    #[cfg(unix)]
    tokio::spawn(reload_on_hangup(holder));

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "linkbridge listening");

    axum::serve(listener, build_router(state)).with_graceful_shutdown(shutdown_signal()).await?;

    let snapshot = metrics.snapshot();
    tracing::info!(
        cas_attempts = snapshot.cas_attempts,
        conflicts = snapshot.conflicts,
        retry_exhausted = snapshot.retry_exhausted,
        partial_links = snapshot.partial_links,
        "linkbridge stopped",
    );
    Ok(())
}

/// Re-reads the configuration file on every `SIGHUP`.
///
/// A configuration that fails to load or validate is logged and the active
/// one is kept.
#[cfg(unix)]
async fn reload_on_hangup(holder: ConfigHolder) {
    use tokio::signal::unix::{SignalKind, signal};

    let mut hangup = match signal(SignalKind::hangup()) {
        Ok(stream) => stream,
        Err(e) => {
            tracing::warn!(error = %e, "SIGHUP handler unavailable; configuration reload disabled");
            return;
        },
    };
    while hangup.recv().await.is_some() {
        match BridgeConfig::from_env().and_then(|config| holder.replace(config)) {
            Ok(_) => tracing::info!("configuration reloaded"),
            Err(e) => tracing::error!(error = %e, "configuration reload failed; keeping previous"),
        }
    }
}

/// Waits for Ctrl+C or `SIGTERM`.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %e, "Ctrl+C handler unavailable");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            },
            Err(e) => {
                tracing::warn!(error = %e, "SIGTERM handler unavailable");
                std::future::pending::<()>().await;
            },
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    tracing::info!("shutdown signal received, draining connections");
}
