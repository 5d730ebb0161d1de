//! # Configuration Sync
//!
//! Mirrors organization settings from the Image Assurance API into the
//! `tigera-image-assurance-config` config map.
//!
//! The work is done by a single actor task. It stays idle until the
//! reconciler sends the first start signal (the API and its credentials have
//! to be deployed before polling makes sense), then synchronizes immediately
//! and on every tick of a recurring ticker.
//!
//! The reconciler talks to the actor only through [`ConfigSync`]:
//!
//! - [`ConfigSync::start_periodic_sync`] is fire-and-forget and dropped if a
//!   message is already pending
//! - [`ConfigSync::error`] returns the error of the last synchronization
//!
//! The actor stops when its cancellation token fires; [`Syncer::done`] is
//! cancelled once it has.

mod actor;
pub mod api;
pub mod ticker;

use crate::config::ControllerConfig;
use crate::controller::store::ClusterStore;
use actor::SyncActor;
use api::{ApiClientFactory, BastClientFactory};
use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use std::sync::Arc;
use std::time::Duration;
use ticker::{IntervalTickerFactory, TickerFactory};
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Failure of one synchronization, naming the failed step
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SyncError {
    #[error("failed to retrieve image assurance configuration: {0}")]
    ConfigurationRead(String),
    #[error("failed to retrieve API token: {0}")]
    TokenRead(String),
    #[error("API token not available")]
    TokenUnavailable,
    #[error("failed to get Image Assurance API certificate: {0}")]
    Certificate(String),
    #[error("failed to build Image Assurance API client: {0}")]
    ClientBuild(String),
    #[error("failed to get organization settings: {0}")]
    OrganizationQuery(String),
    #[error("failed to update Image Assurance configuration: {0}")]
    ConfigurationWrite(String),
    #[error("configuration sync has stopped")]
    Stopped,
}

impl SyncError {
    /// Metric label for the failed step
    pub fn step(&self) -> &'static str {
        match self {
            SyncError::ConfigurationRead(_) => "configuration_read",
            SyncError::TokenRead(_) | SyncError::TokenUnavailable => "token",
            SyncError::Certificate(_) => "certificate",
            SyncError::ClientBuild(_) => "client_build",
            SyncError::OrganizationQuery(_) => "organization_query",
            SyncError::ConfigurationWrite(_) => "configuration_write",
            SyncError::Stopped => "stopped",
        }
    }
}

/// Control surface of the sync actor
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ConfigSync: Send + Sync {
    /// Start periodic synchronization; no-op once started
    fn start_periodic_sync(&self);

    /// Error of the most recent synchronization, `None` if it succeeded or
    /// none has run
    async fn error(&self) -> Option<SyncError>;
}

/// Settings of the sync actor
#[derive(Debug, Clone)]
pub struct SyncSettings {
    pub endpoint: String,
    pub operator_namespace: String,
    pub interval: Duration,
    pub http_timeout: Duration,
}

impl SyncSettings {
    pub fn from_config(config: &ControllerConfig) -> Self {
        Self {
            endpoint: config.api_endpoint.clone(),
            operator_namespace: config.operator_namespace.clone(),
            interval: config.config_sync_interval(),
            http_timeout: config.config_sync_http_timeout(),
        }
    }
}

enum Request {
    StartSync,
    GetError(oneshot::Sender<Option<SyncError>>),
}

/// Handle to a running sync actor
#[derive(Debug, Clone)]
pub struct Syncer {
    mailbox: mpsc::Sender<Request>,
    done: CancellationToken,
}

impl std::fmt::Debug for Request {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Request::StartSync => f.write_str("StartSync"),
            Request::GetError(_) => f.write_str("GetError"),
        }
    }
}

impl Syncer {
    /// Spawn the actor with the production API client and ticker
    pub fn spawn(
        store: Arc<dyn ClusterStore>,
        settings: SyncSettings,
        cancel: CancellationToken,
    ) -> Self {
        Self::spawn_with(
            store,
            Arc::new(BastClientFactory),
            Arc::new(IntervalTickerFactory),
            settings,
            cancel,
        )
    }

    pub fn spawn_with(
        store: Arc<dyn ClusterStore>,
        api_factory: Arc<dyn ApiClientFactory>,
        ticker_factory: Arc<dyn TickerFactory>,
        settings: SyncSettings,
        cancel: CancellationToken,
    ) -> Self {
        let (mailbox, inbox) = mpsc::channel(1);
        let done = CancellationToken::new();
        let actor = SyncActor::new(store, api_factory, ticker_factory, settings);
        tokio::spawn(actor.run(inbox, cancel, done.clone()));
        Self { mailbox, done }
    }

    /// Cancelled once the actor has stopped
    pub fn done(&self) -> CancellationToken {
        self.done.clone()
    }
}

#[async_trait]
impl ConfigSync for Syncer {
    fn start_periodic_sync(&self) {
        if let Err(e) = self.mailbox.try_send(Request::StartSync) {
            debug!("Start signal not delivered to config sync: {}", e);
        }
    }

    async fn error(&self) -> Option<SyncError> {
        let (reply, response) = oneshot::channel();
        if self.mailbox.send(Request::GetError(reply)).await.is_err() {
            return Some(SyncError::Stopped);
        }
        response.await.unwrap_or(Some(SyncError::Stopped))
    }
}
