//! # Reconciliation
//!
//! Convergence engine for the Image Assurance component.
//!
//! One invocation:
//!
//! 1. Looks up the `tigera-secure` ImageAssurance resource
//! 2. Collects every prerequisite through the readiness gates
//! 3. Renders and applies the desired objects
//! 4. Decides from the migrator job whether to wait, retry, or report ready
//!
//! Nothing is carried between invocations apart from the status reporter's
//! state; every decision is re-derived from storage.

use super::apply::apply;
use super::certificates::{ensure_certificate_secret, service_dns_names, validate_cert_pair};
use super::credentials::get_or_create_pg_user_secret;
use super::dependencies::{self, config_value, DependencyError, DependencySet};
use super::gate::{GateOutcome, Halt, OrFail};
use super::migration::{self, job_progress, JobProgress, MigrationDecision};
use super::types::{ReconcileOutcome, Reconciler, ReconcilerError};
use crate::constants::*;
use crate::controller::store::{get_typed, to_dynamic};
use crate::crd::{Condition, ImageAssurance, ImageAssuranceStatus, STATE_READY};
use crate::observability;
use crate::render::RenderError;
use k8s_openapi::api::batch::v1::Job;
use k8s_openapi::api::core::v1::Secret;
use kube::Resource;
use kube_runtime::controller::Action;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, info_span, warn, Instrument};

/// Controller entry point: runs one reconcile and maps the outcome to an action
#[allow(
    clippy::missing_errors_doc,
    reason = "Error documentation is provided in doc comments"
)]
pub async fn reconcile_image_assurance(
    obj: Arc<ImageAssurance>,
    ctx: Arc<Reconciler>,
) -> Result<Action, ReconcilerError> {
    let name = obj.metadata.name.as_deref().unwrap_or(TIGERA_SECURE_NAME);
    let span = info_span!("controller.reconcile", resource.name = name);

    observability::metrics::increment_reconciliations();
    let start = Instant::now();
    let outcome = reconcile(&ctx).instrument(span).await;
    observability::metrics::observe_reconciliation_duration(start.elapsed().as_secs_f64());

    if !matches!(outcome, ReconcileOutcome::Failed(_)) {
        ctx.reset_backoff(name);
    }
    if let ReconcileOutcome::RequeueAfter(delay) = &outcome {
        debug!("Requeueing {} in {:?}", name, delay);
    }
    outcome.into_action()
}

/// Run one convergence pass
pub async fn reconcile(ctx: &Reconciler) -> ReconcileOutcome {
    let instance =
        match get_typed::<ImageAssurance>(ctx.store.as_ref(), None, TIGERA_SECURE_NAME).await {
            Ok(Some(instance)) => instance,
            Ok(None) => {
                debug!("ImageAssurance {} not found", TIGERA_SECURE_NAME);
                ctx.status.on_cr_not_found();
                return ReconcileOutcome::Idle;
            }
            Err(e) => {
                error!("Error querying for ImageAssurance: {}", e);
                ctx.status
                    .set_degraded("Error querying for ImageAssurance", &e.to_string());
                return ReconcileOutcome::Failed(ReconcilerError::Lookup(e));
            }
        };
    ctx.status.on_cr_found();

    match converge(ctx, &instance).await {
        Ok(outcome) => outcome,
        Err(Halt::Wait { reason, detail }) => {
            info!("⏳ {} {}", reason, detail);
            ctx.status.set_degraded(&reason, &detail);
            ReconcileOutcome::AwaitChange
        }
        Err(Halt::Fail { reason, cause }) => {
            error!("❌ {}: {}", reason, cause);
            ctx.status.set_degraded(&reason, &cause);
            ReconcileOutcome::Failed(ReconcilerError::Degraded { reason, cause })
        }
    }
}

async fn converge(ctx: &Reconciler, instance: &ImageAssurance) -> Result<ReconcileOutcome, Halt> {
    let (deps, decision, components_up) = collect_dependencies(ctx).await?;

    let rendered = ctx
        .renderer
        .render(&deps, decision, components_up)
        .map_err(|e| match e {
            RenderError::ImageSet(_) => halt_fail("Error with images from ImageSet", e),
            RenderError::Conversion(_) => halt_fail("Error rendering Image Assurance objects", e),
        })?;

    let owner = instance.controller_owner_ref(&());
    let report = apply(ctx.store.as_ref(), owner.as_ref(), &rendered)
        .await
        .or_fail("Error creating / updating resource")
        .into_result()?;
    if !report.is_noop() {
        info!(
            "📦 Applied Image Assurance objects: {} created, {} updated, {} deleted",
            report.created, report.updated, report.deleted
        );
    }

    let job = dependencies::migrator_job(ctx.store.as_ref())
        .await
        .or_fail("Error retrieving db-migrator job")
        .into_result()?;

    schedule(ctx, instance, job.as_ref(), decision, components_up).await
}

fn halt_fail(reason: &str, cause: impl std::fmt::Display) -> Halt {
    Halt::Fail {
        reason: reason.to_string(),
        cause: cause.to_string(),
    }
}

/// Gather the dependency set, the migration decision and whether any
/// component deployment exists
async fn collect_dependencies(
    ctx: &Reconciler,
) -> Result<(DependencySet, MigrationDecision, bool), Halt> {
    let store = ctx.store.as_ref();
    let namespace = ctx.config.operator_namespace.as_str();

    let (variant, installation) = match dependencies::installation(store).await {
        Ok(Some(found)) => GateOutcome::Proceed(found),
        Ok(None) => GateOutcome::wait("Installation not found", ""),
        Err(e) => GateOutcome::fail("Error querying installation", e),
    }
    .into_result()?;

    let pull_secrets = dependencies::pull_secrets(store, namespace, &installation)
        .await
        .or_fail("Error retrieving image pull secrets")
        .into_result()?;

    let pg_config = dependencies::pg_config(store, namespace)
        .await
        .or_fail("Error retrieving postgres configuration")
        .into_result()?;
    let org_id = config_value(&pg_config, PG_CONFIG_ORG_ID_KEY)
        .unwrap_or_default()
        .to_string();

    let pg_user_secret = get_or_create_pg_user_secret(store, &org_id)
        .await
        .or_fail("Error retrieving postgres secret")
        .into_result()?;
    let pg_admin_secret = dependencies::pg_admin_secret(store, namespace)
        .await
        .or_fail("Error retrieving postgres admin secret")
        .into_result()?;
    let pg_cert_secret = dependencies::pg_cert_secret(store, namespace)
        .await
        .or_fail("Error retrieving postgres cert secret")
        .into_result()?;

    let internal_manager_tls = match validate_cert_pair(
        store,
        namespace,
        MANAGER_INTERNAL_TLS_SECRET_NAME,
        MANAGER_INTERNAL_SECRET_KEY_NAME,
        MANAGER_INTERNAL_SECRET_CERT_NAME,
    )
    .await
    {
        Ok(Some(secret)) => GateOutcome::Proceed(secret),
        Ok(None) => GateOutcome::wait(
            "Waiting for internal manager tls certificate to be available",
            "",
        ),
        Err(e) => GateOutcome::fail("Error retrieving internal manager tls secret", e),
    }
    .into_result()?;

    let api_tls = api_certificate(ctx)
        .await
        .or_fail("Error in ensuring TLS certificate for image-assurance api")
        .into_result()?;

    let migrator_job = dependencies::migrator_job(store)
        .await
        .or_fail("Error retrieving db-migrator job")
        .into_result()?;

    let image_set = match dependencies::image_set(store, variant).await {
        Ok(set) => GateOutcome::Proceed(set),
        Err(e @ DependencyError::ImageSet(_)) => GateOutcome::fail("Error validating image set", e),
        Err(e) => GateOutcome::fail("Error retrieving image set", e),
    }
    .into_result()?;

    let tenant_key = dependencies::tenant_key(store, namespace)
        .await
        .or_fail("Error retrieving tenant key")
        .into_result()?;

    let decision =
        migration::needs_migration(&installation, image_set.as_ref(), migrator_job.as_ref())
            .or_fail("Error calculating if migration is needed")
            .into_result()?;
    let components_up = migration::components_up(store)
        .await
        .or_fail("Error when checking if image assurance deployments are up")
        .into_result()?;

    let authentication = dependencies::authentication(store)
        .await
        .or_fail("Error querying Authentication")
        .into_result()?;
    if let Some(auth) = &authentication {
        let state = auth
            .status
            .as_ref()
            .and_then(|s| s.state.as_deref())
            .unwrap_or_default();
        if state != STATE_READY {
            return Err(Halt::Wait {
                reason: "Authentication is not ready".to_string(),
                detail: format!("authenticationCR status: {state}"),
            });
        }
    }
    let key_validator = dependencies::key_validator_config(authentication.as_ref())
        .or_fail("Failed to process the authentication CR.")
        .into_result()?;

    let deps = DependencySet {
        variant,
        installation,
        pull_secrets,
        pg_config,
        pg_user_secret,
        pg_admin_secret,
        pg_cert_secret,
        internal_manager_tls,
        api_tls,
        tenant_key,
        migrator_job,
        image_set,
        key_validator,
    };
    Ok((deps, decision, components_up))
}

/// Existing API certificate if it covers the service names, a new one otherwise
async fn api_certificate(
    ctx: &Reconciler,
) -> Result<Secret, super::certificates::CertificateError> {
    let namespace = ctx.config.operator_namespace.as_str();
    let existing = validate_cert_pair(
        ctx.store.as_ref(),
        namespace,
        API_CERT_SECRET_NAME,
        TLS_PRIVATE_KEY_KEY,
        TLS_CERT_KEY,
    )
    .await?;
    let dns_names = service_dns_names(
        API_DEPLOYMENT_NAME,
        IMAGE_ASSURANCE_NAMESPACE,
        &ctx.config.cluster_domain,
    );
    let (secret, _minted) = ensure_certificate_secret(
        API_CERT_SECRET_NAME,
        namespace,
        existing,
        TLS_PRIVATE_KEY_KEY,
        TLS_CERT_KEY,
        &dns_names,
    )?;
    Ok(secret)
}

/// Decide the next step from the migrator job
async fn schedule(
    ctx: &Reconciler,
    instance: &ImageAssurance,
    job: Option<&Job>,
    decision: MigrationDecision,
    components_up: bool,
) -> Result<ReconcileOutcome, Halt> {
    let job = match job {
        Some(job) if !(components_up && decision.needs_migration) => job,
        _ => {
            ctx.status
                .set_degraded("Waiting for migrator job to be created", "");
            observability::metrics::increment_requeues_total("migrator-job");
            return Ok(ReconcileOutcome::RequeueAfter(Duration::from_secs(
                MIGRATOR_CREATE_REQUEUE_SECS,
            )));
        }
    };

    match job_progress(job) {
        JobProgress::Running => {
            return Err(Halt::Wait {
                reason: "Waiting for migrator job to finish running".to_string(),
                detail: String::new(),
            })
        }
        JobProgress::Failed => {
            let failed = job.status.as_ref().and_then(|s| s.failed).unwrap_or(0);
            return Err(Halt::Wait {
                reason: "Migrator job failed".to_string(),
                detail: format!("job {DB_MIGRATOR_JOB_NAME} has {failed} failed pod(s)"),
            });
        }
        JobProgress::Succeeded => {}
    }

    ctx.syncer.start_periodic_sync();
    ctx.status.clear_degraded();
    if let Some(e) = ctx.syncer.error().await {
        warn!("Configuration sync reported an error: {}", e);
    }

    if !ctx.status.is_available() {
        debug!("Image Assurance components are not available yet");
        observability::metrics::increment_requeues_total("availability");
        return Ok(ReconcileOutcome::RequeueAfter(Duration::from_secs(
            AVAILABILITY_REQUEUE_SECS,
        )));
    }

    let current = instance.status.as_ref().and_then(|s| s.state.as_deref());
    if current != Some(STATE_READY) {
        let mut updated = instance.clone();
        updated.status = Some(ImageAssuranceStatus {
            state: Some(STATE_READY.to_string()),
            conditions: vec![Condition::ready("All Image Assurance components are available")],
        });
        let obj = to_dynamic(&updated)
            .or_fail("Error updating status")
            .into_result()?;
        ctx.store
            .update_status(&obj)
            .await
            .or_fail("Error updating status")
            .into_result()?;
        info!("✅ Image Assurance is ready");
    }
    Ok(ReconcileOutcome::Ready)
}
