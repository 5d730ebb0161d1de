//! # Status Reporting
//!
//! The reconciler reports every degraded / ready transition through
//! [`StatusReporter`]. [`StatusManager`] is the production implementation: it
//! keeps the latest degraded reason in memory, mirrors it into the
//! `image_assurance_degraded` gauge, and derives availability from the ready
//! replicas of the managed deployments, refreshed in the background by
//! [`StatusManager::run`].

use crate::constants::{
    COMPONENT_DEPLOYMENTS, IMAGE_ASSURANCE_NAMESPACE, MIN_TICK_PERIOD,
};
use crate::controller::store::{get_typed, ClusterStore};
use crate::observability;
use k8s_openapi::api::apps::v1::Deployment;
#[cfg(test)]
use mockall::automock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Sink for the reconciler's status transitions
#[cfg_attr(test, automock)]
pub trait StatusReporter: Send + Sync {
    /// The primary resource exists
    fn on_cr_found(&self);

    /// The primary resource is gone; any in-progress status is cleared
    fn on_cr_not_found(&self);

    /// Not yet converged, with a short reason and optional detail
    fn set_degraded(&self, reason: &str, detail: &str);

    fn clear_degraded(&self);

    /// True once every managed deployment reports ready replicas
    fn is_available(&self) -> bool;
}

/// Last reported degraded condition
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Degraded {
    pub reason: String,
    pub detail: String,
}

#[derive(Debug, Default)]
struct StatusState {
    cr_present: bool,
    degraded: Option<Degraded>,
}

/// In-memory status tracker for the Image Assurance component
pub struct StatusManager {
    store: Arc<dyn ClusterStore>,
    state: Mutex<StatusState>,
    deployments_ready: AtomicBool,
}

impl std::fmt::Debug for StatusManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StatusManager")
            .field("state", &self.state)
            .field("deployments_ready", &self.deployments_ready)
            .finish_non_exhaustive()
    }
}

impl StatusManager {
    pub fn new(store: Arc<dyn ClusterStore>) -> Self {
        Self {
            store,
            state: Mutex::new(StatusState::default()),
            deployments_ready: AtomicBool::new(false),
        }
    }

    fn state(&self) -> MutexGuard<'_, StatusState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Currently reported degraded condition, if any
    pub fn degraded(&self) -> Option<Degraded> {
        self.state().degraded.clone()
    }

    pub(crate) fn set_deployments_ready(&self, ready: bool) {
        self.deployments_ready.store(ready, Ordering::Relaxed);
    }

    /// Re-read the managed deployments and update availability
    pub async fn refresh(&self) {
        let mut all_ready = true;
        for name in COMPONENT_DEPLOYMENTS {
            match get_typed::<Deployment>(self.store.as_ref(), Some(IMAGE_ASSURANCE_NAMESPACE), name)
                .await
            {
                Ok(Some(deployment)) if deployment_ready(&deployment) => {}
                Ok(_) => {
                    debug!("Deployment {} is not ready", name);
                    all_ready = false;
                }
                Err(e) => {
                    warn!("Failed to read deployment {}: {}", name, e);
                    all_ready = false;
                }
            }
        }
        self.set_deployments_ready(all_ready);
    }

    /// Refresh availability every `interval` (at least [`MIN_TICK_PERIOD`])
    /// until `cancel` fires
    pub async fn run(self: Arc<Self>, interval: Duration, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(interval.max(MIN_TICK_PERIOD));
        loop {
            tokio::select! {
                () = cancel.cancelled() => {
                    info!("Status manager stopped");
                    return;
                }
                _ = ticker.tick() => self.refresh().await,
            }
        }
    }
}

/// All desired replicas are ready (at least one)
fn deployment_ready(deployment: &Deployment) -> bool {
    let desired = deployment
        .spec
        .as_ref()
        .and_then(|s| s.replicas)
        .unwrap_or(1);
    let ready = deployment
        .status
        .as_ref()
        .and_then(|s| s.ready_replicas)
        .unwrap_or(0);
    ready > 0 && ready >= desired
}

impl StatusReporter for StatusManager {
    fn on_cr_found(&self) {
        self.state().cr_present = true;
    }

    fn on_cr_not_found(&self) {
        let mut state = self.state();
        state.cr_present = false;
        state.degraded = None;
        observability::metrics::set_degraded(false);
    }

    fn set_degraded(&self, reason: &str, detail: &str) {
        let degraded = Degraded {
            reason: reason.to_string(),
            detail: detail.to_string(),
        };
        let mut state = self.state();
        if state.degraded.as_ref() != Some(&degraded) {
            warn!(reason = reason, detail = detail, "⚠️  Image Assurance degraded");
        }
        state.degraded = Some(degraded);
        observability::metrics::set_degraded(true);
    }

    fn clear_degraded(&self) {
        let mut state = self.state();
        if state.degraded.take().is_some() {
            info!("✅ Image Assurance no longer degraded");
        }
        observability::metrics::set_degraded(false);
    }

    fn is_available(&self) -> bool {
        let state = self.state();
        state.cr_present
            && state.degraded.is_none()
            && self.deployments_ready.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::store::memory::InMemoryStore;
    use k8s_openapi::api::apps::v1::{DeploymentSpec, DeploymentStatus};
    use kube::api::ObjectMeta;

    fn deployment(name: &str, ready: i32) -> Deployment {
        Deployment {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                namespace: Some(IMAGE_ASSURANCE_NAMESPACE.to_string()),
                ..ObjectMeta::default()
            },
            spec: Some(DeploymentSpec {
                replicas: Some(1),
                ..DeploymentSpec::default()
            }),
            status: Some(DeploymentStatus {
                ready_replicas: Some(ready),
                ..DeploymentStatus::default()
            }),
        }
    }

    #[tokio::test]
    async fn test_available_requires_all_deployments_ready() {
        let store = Arc::new(InMemoryStore::new());
        let status = StatusManager::new(store.clone());
        status.on_cr_found();

        store.insert(&deployment(COMPONENT_DEPLOYMENTS[0], 1));
        store.insert(&deployment(COMPONENT_DEPLOYMENTS[1], 1));
        status.refresh().await;
        assert!(!status.is_available());

        store.insert(&deployment(COMPONENT_DEPLOYMENTS[2], 1));
        status.refresh().await;
        assert!(status.is_available());
    }

    #[test]
    fn test_degraded_blocks_availability_until_cleared() {
        let status = StatusManager::new(Arc::new(InMemoryStore::new()));
        status.on_cr_found();
        status.set_deployments_ready(true);

        status.set_degraded("Waiting for migrator job to be created", "");
        assert!(!status.is_available());
        assert_eq!(
            status.degraded().map(|d| d.reason),
            Some("Waiting for migrator job to be created".to_string())
        );

        status.clear_degraded();
        assert!(status.is_available());
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_with_zero_interval_refreshes_until_cancelled() {
        let store = Arc::new(InMemoryStore::new());
        for name in COMPONENT_DEPLOYMENTS {
            store.insert(&deployment(name, 1));
        }
        let status = Arc::new(StatusManager::new(store));
        status.on_cr_found();
        let cancel = CancellationToken::new();

        let task = tokio::spawn(Arc::clone(&status).run(Duration::ZERO, cancel.clone()));
        tokio::time::sleep(Duration::from_millis(1500)).await;
        assert!(status.is_available());

        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .expect("refresh loop stops on cancel")
            .expect("refresh loop does not panic");
    }

    #[test]
    fn test_cr_not_found_clears_degraded() {
        let status = StatusManager::new(Arc::new(InMemoryStore::new()));
        status.on_cr_found();
        status.set_degraded("Installation not found", "");

        status.on_cr_not_found();
        assert_eq!(status.degraded(), None);
        assert!(!status.is_available());
    }
}
