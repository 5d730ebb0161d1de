//! # Initialization
//!
//! Controller initialization: rustls setup, tracing, metrics, server
//! startup, Kubernetes client setup and the background tasks the reconciler
//! depends on.

use crate::config::{self, ServerConfig};
use crate::configsync::{SyncSettings, Syncer};
use crate::controller::reconciler::Reconciler;
use crate::controller::server::{start_server, ServerState};
use crate::controller::status::StatusManager;
use crate::controller::store::{ClusterStore, KubeStore};
use crate::observability;
use crate::render::ImageAssuranceRenderer;
use anyhow::{anyhow, Result};
use kube::Client;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// Everything the watch loop needs
#[allow(
    missing_debug_implementations,
    reason = "kube::Client does not implement Debug"
)]
pub struct InitializationResult {
    pub client: Client,
    pub reconciler: Arc<Reconciler>,
    /// Server state for health checks
    pub server_state: Arc<ServerState>,
    /// Stops the status manager and the config sync actor
    pub cancel: CancellationToken,
    /// Cancelled once the config sync actor has exited
    pub syncer_done: CancellationToken,
}

/// Initialize the controller runtime
///
/// This function handles:
/// - rustls crypto provider setup
/// - Tracing subscriber setup
/// - Metrics registration
/// - HTTP server startup
/// - Kubernetes client creation
/// - Status manager and config sync startup
/// - Reconciler setup
#[allow(
    clippy::missing_errors_doc,
    reason = "Error documentation is provided in doc comments"
)]
pub async fn initialize() -> Result<InitializationResult> {
    // Must run before anything opens a TLS connection
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow!("Failed to install rustls crypto provider"))?;

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "image_assurance_operator=info".into()),
        )
        .init();

    info!("Starting Image Assurance operator v{}", env!("CARGO_PKG_VERSION"));

    let (controller_config, server_config) = config::load_config();
    info!(
        "Operator namespace: {}, API endpoint: {}",
        controller_config.operator_namespace, controller_config.api_endpoint
    );

    observability::metrics::register_metrics()?;

    let server_state = Arc::new(ServerState {
        is_ready: Arc::new(AtomicBool::new(false)),
    });
    let server_state_clone = Arc::clone(&server_state);
    let bind_addr = server_config.bind_addr();
    let server_handle = tokio::spawn(async move {
        if let Err(e) = start_server(bind_addr, server_state_clone).await {
            error!("HTTP server error: {}", e);
        }
    });
    wait_for_server_ready(&server_state, &server_handle, &server_config).await?;

    let client = Client::try_default().await?;
    let store: Arc<dyn ClusterStore> = Arc::new(KubeStore::new(client.clone()));
    let cancel = CancellationToken::new();

    let status = Arc::new(StatusManager::new(Arc::clone(&store)));
    tokio::spawn(
        Arc::clone(&status).run(controller_config.status_refresh_interval(), cancel.clone()),
    );

    let syncer = Syncer::spawn(
        Arc::clone(&store),
        SyncSettings::from_config(&controller_config),
        cancel.clone(),
    );
    let syncer_done = syncer.done();

    let reconciler = Arc::new(Reconciler::new(
        store,
        status,
        Arc::new(ImageAssuranceRenderer),
        Arc::new(syncer),
        controller_config,
    ));

    info!("Controller initialized, starting watch loop...");

    Ok(InitializationResult {
        client,
        reconciler,
        server_state,
        cancel,
        syncer_done,
    })
}

/// Wait for the HTTP server to become ready
async fn wait_for_server_ready(
    server_state: &Arc<ServerState>,
    server_handle: &tokio::task::JoinHandle<()>,
    server_config: &ServerConfig,
) -> Result<()> {
    let startup_timeout = server_config.startup_timeout;
    let start_time = Instant::now();

    loop {
        if server_handle.is_finished() {
            return Err(anyhow!("HTTP server failed to start"));
        }

        if server_state.is_ready.load(Ordering::Relaxed) {
            info!("HTTP server is ready and accepting connections");
            return Ok(());
        }

        if start_time.elapsed() > startup_timeout {
            return Err(anyhow!(
                "HTTP server failed to become ready within {} seconds",
                startup_timeout.as_secs()
            ));
        }

        tokio::time::sleep(server_config.readiness_poll).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn fast_config() -> ServerConfig {
        ServerConfig {
            port: 0,
            startup_timeout: Duration::from_secs(1),
            readiness_poll: Duration::from_millis(5),
        }
    }

    #[tokio::test]
    async fn test_wait_for_server_ready_returns_once_ready() {
        let state = Arc::new(ServerState {
            is_ready: Arc::new(AtomicBool::new(false)),
        });
        let flag = Arc::clone(&state.is_ready);
        let handle = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            flag.store(true, Ordering::Relaxed);
            std::future::pending::<()>().await;
        });

        wait_for_server_ready(&state, &handle, &fast_config())
            .await
            .unwrap();
        handle.abort();
    }

    #[tokio::test]
    async fn test_wait_for_server_ready_fails_when_server_exits() {
        let state = Arc::new(ServerState {
            is_ready: Arc::new(AtomicBool::new(false)),
        });
        let handle = tokio::spawn(async {});
        tokio::time::sleep(Duration::from_millis(20)).await;

        let err = wait_for_server_ready(&state, &handle, &fast_config())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("failed to start"));
    }
}
