//! # Watch Loop
//!
//! Drives the reconciler from cluster events.
//!
//! The primary resource is the cluster-scoped `tigera-secure`
//! ImageAssurance. Objects it owns (migrator job, deployments) and every
//! prerequisite it reads (secrets, config maps, Installation, ImageSet,
//! Authentication) map back to that one resource, so any change anywhere
//! triggers a full convergence pass.

use super::error_policy::{handle_reconciliation_error, handle_watch_stream_error};
use crate::constants::{IMAGE_ASSURANCE_NAMESPACE, TIGERA_SECURE_NAME};
use crate::controller::reconciler::{reconcile_image_assurance, Reconciler};
use crate::controller::server::ServerState;
use crate::crd::{Authentication, ImageAssurance, ImageSet, Installation};
use anyhow::Result;
use futures::StreamExt;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::batch::v1::Job;
use k8s_openapi::api::core::v1::{ConfigMap, Secret};
use kube::api::Api;
use kube::Client;
use kube_runtime::controller::{Controller, Error as ControllerError};
use kube_runtime::reflector::ObjectRef;
use kube_runtime::watcher;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// How long shutdown waits for the config sync actor
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Every watched object maps to the single primary resource
fn primary<T>(_: T) -> Option<ObjectRef<ImageAssurance>> {
    Some(ObjectRef::new(TIGERA_SECURE_NAME))
}

/// Run the controller until a termination signal arrives, then stop the
/// background tasks
#[allow(
    clippy::missing_errors_doc,
    reason = "Error documentation is provided in doc comments"
)]
pub async fn run_watch_loop(
    client: Client,
    reconciler: Arc<Reconciler>,
    server_state: Arc<ServerState>,
    cancel: CancellationToken,
    syncer_done: CancellationToken,
) -> Result<()> {
    let operator_namespace = reconciler.config.operator_namespace.clone();
    let config = watcher::Config::default();

    info!(
        "👀 Watching ImageAssurance {} (operator namespace {}, component namespace {})",
        TIGERA_SECURE_NAME, operator_namespace, IMAGE_ASSURANCE_NAMESPACE
    );

    Controller::new(Api::<ImageAssurance>::all(client.clone()), config.clone())
        .owns(
            Api::<Job>::namespaced(client.clone(), IMAGE_ASSURANCE_NAMESPACE),
            config.clone(),
        )
        .owns(
            Api::<Deployment>::namespaced(client.clone(), IMAGE_ASSURANCE_NAMESPACE),
            config.clone(),
        )
        .watches(
            Api::<Secret>::namespaced(client.clone(), &operator_namespace),
            config.clone(),
            primary,
        )
        .watches(
            Api::<Secret>::namespaced(client.clone(), IMAGE_ASSURANCE_NAMESPACE),
            config.clone(),
            primary,
        )
        .watches(
            Api::<ConfigMap>::namespaced(client.clone(), &operator_namespace),
            config.clone(),
            primary,
        )
        .watches(Api::<Installation>::all(client.clone()), config.clone(), primary)
        .watches(Api::<ImageSet>::all(client.clone()), config.clone(), primary)
        .watches(Api::<Authentication>::all(client), config, primary)
        .shutdown_on_signal()
        .run(reconcile_image_assurance, handle_reconciliation_error, reconciler)
        .for_each(|res| async move {
            match res {
                Ok((obj, action)) => debug!("Reconciled {}: {:?}", obj.name, action),
                // Already logged and backed off by the error policy
                Err(ControllerError::ReconcilerFailed(e, obj)) => {
                    debug!("Reconcile of {} failed: {}", obj.name, e);
                }
                Err(e) => handle_watch_stream_error(&e.to_string()),
            }
        })
        .await;

    info!("🛑 Controller stopped, shutting down background tasks");
    server_state.is_ready.store(false, Ordering::Relaxed);
    cancel.cancel();
    if tokio::time::timeout(SHUTDOWN_GRACE, syncer_done.cancelled())
        .await
        .is_err()
    {
        warn!(
            "Config sync did not stop within {}s",
            SHUTDOWN_GRACE.as_secs()
        );
    }
    Ok(())
}
