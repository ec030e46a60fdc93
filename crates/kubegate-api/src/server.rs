//! Gateway HTTP server

use std::net::SocketAddr;
use std::sync::Arc;

use axum::routing::{any, get};
use axum::Router;
use axum_server::tls_rustls::RustlsConfig;
use tracing::info;

use kubegate_common::TlsConfig;

use crate::dispatcher::dispatch_handler;
use crate::error::Error;
use crate::registry::Registry;

/// Server configuration
#[derive(Clone, Debug)]
pub struct ServerConfig {
    /// Address to bind the server
    pub addr: SocketAddr,
    /// Certificate and key for HTTPS; plain HTTP when None
    pub tls: Option<TlsConfig>,
}

/// Shared state for handlers
#[derive(Clone)]
pub struct AppState {
    /// Cluster id to backend map
    pub registry: Arc<Registry>,
}

/// Build the gateway router
pub fn router(state: AppState) -> Router {
    Router::new()
        // Health check
        .route("/healthz", get(|| async { "ok" }))
        // Every cluster-addressed path goes through the dispatcher, including
        // exec/attach/portforward upgrades
        .route("/clusters/{cluster_id}", any(dispatch_handler))
        .route("/clusters/{cluster_id}/{*path}", any(dispatch_handler))
        .with_state(state)
}

/// Start the gateway and serve until the listener fails
pub async fn start_server(config: ServerConfig, registry: Arc<Registry>) -> Result<(), Error> {
    let clusters = registry.len();
    let app = router(AppState { registry });

    match config.tls {
        Some(tls) => {
            let tls_config = RustlsConfig::from_pem_file(&tls.cert_file, &tls.key_file)
                .await
                .map_err(|e| Error::Internal(format!("TLS config error: {}", e)))?;

            info!(addr = %config.addr, clusters, "Starting gateway (https)");

            axum_server::bind_rustls(config.addr, tls_config)
                .serve(app.into_make_service())
                .await
                .map_err(|e| Error::Internal(format!("Server error: {}", e)))?;
        }
        None => {
            info!(addr = %config.addr, clusters, "Starting gateway (http)");

            axum_server::bind(config.addr)
                .serve(app.into_make_service())
                .await
                .map_err(|e| Error::Internal(format!("Server error: {}", e)))?;
        }
    }

    Ok(())
}
