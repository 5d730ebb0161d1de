//! # Error Policy
//!
//! Backoff for failed reconciles and classification of controller stream
//! errors.

use crate::controller::reconciler::{BackoffState, Reconciler, ReconcilerError};
use crate::constants::{ERROR_BACKOFF_MIN_SECS, TIGERA_SECURE_NAME};
use crate::crd::ImageAssurance;
use crate::observability;
use kube_runtime::controller::Action;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

/// Handle reconciliation errors with Fibonacci backoff
///
/// Backoff state is tracked per resource and reset by the next reconcile that
/// does not fail.
pub fn handle_reconciliation_error(
    obj: Arc<ImageAssurance>,
    error: &ReconcilerError,
    ctx: Arc<Reconciler>,
) -> Action {
    let name = obj.metadata.name.as_deref().unwrap_or(TIGERA_SECURE_NAME);

    let error_span = tracing::span!(
        tracing::Level::ERROR,
        "controller.watch.reconciliation_error",
        resource.name = name,
        error = %error
    );
    let _error_guard = error_span.enter();

    error!("Reconciliation error for {}: {}", name, error);
    observability::metrics::increment_reconciliation_errors();

    let (delay, error_count) = match ctx.backoff_states.lock() {
        Ok(mut states) => {
            let state = states
                .entry(name.to_string())
                .or_insert_with(BackoffState::default);
            state.increment_error();
            (state.backoff.next_backoff(), state.error_count)
        }
        Err(e) => {
            warn!("Failed to lock backoff_states: {}, using default backoff", e);
            (Duration::from_secs(ERROR_BACKOFF_MIN_SECS), 0)
        }
    };

    let next_trigger_time =
        chrono::Utc::now() + chrono::Duration::from_std(delay).unwrap_or_default();
    info!(
        "🔄 Retrying with Fibonacci backoff: {}s (error count: {})",
        delay.as_secs(),
        error_count
    );
    info!(
        "📅 Next retry scheduled: {} (in {}s)",
        next_trigger_time.to_rfc3339(),
        delay.as_secs()
    );

    observability::metrics::increment_requeues_total("error-backoff");
    Action::requeue(delay)
}

/// Broad class of a controller stream error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchErrorKind {
    /// 401: RBAC revoked or token expired
    Unauthorized,
    /// 410: resource version expired, the watcher relists
    Expired,
    /// 429: API server storage reinitializing
    Throttled,
    /// The triggering object was deleted before it was reconciled
    NotFound,
    Other,
}

/// Classify a controller stream error by its rendered message
pub fn classify_watch_error(error_string: &str) -> WatchErrorKind {
    if error_string.contains("401") || error_string.contains("Unauthorized") {
        WatchErrorKind::Unauthorized
    } else if error_string.contains("410")
        || error_string.contains("too old resource version")
        || error_string.contains("Expired")
        || error_string.contains("Gone")
    {
        WatchErrorKind::Expired
    } else if error_string.contains("429")
        || error_string.contains("storage is (re)initializing")
        || error_string.contains("TooManyRequests")
    {
        WatchErrorKind::Throttled
    } else if error_string.contains("ObjectNotFound")
        || (error_string.contains("404") && error_string.contains("not found"))
    {
        WatchErrorKind::NotFound
    } else {
        WatchErrorKind::Other
    }
}

/// Log a controller stream error at a level matching its class
pub fn handle_watch_stream_error(error_string: &str) {
    match classify_watch_error(error_string) {
        WatchErrorKind::Unauthorized => {
            error!("❌ Watch authentication failed (401 Unauthorized): {}", error_string);
            error!("🔍 Check that the operator ClusterRoleBinding and ServiceAccount still exist");
        }
        WatchErrorKind::Expired => {
            warn!("Watch resource version expired (410), watcher will relist");
        }
        WatchErrorKind::Throttled => {
            warn!("API server storage reinitializing (429): {}", error_string);
        }
        WatchErrorKind::NotFound => {
            warn!("Resource not found (likely deleted), continuing watch...");
        }
        WatchErrorKind::Other => {
            error!("Controller stream error: {}", error_string);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ControllerConfig;
    use crate::configsync::MockConfigSync;
    use crate::controller::status::MockStatusReporter;
    use crate::controller::store::memory::InMemoryStore;
    use crate::crd::ImageAssuranceSpec;
    use crate::render::MockObjectProducer;

    fn context() -> Arc<Reconciler> {
        Arc::new(Reconciler::new(
            Arc::new(InMemoryStore::new()),
            Arc::new(MockStatusReporter::new()),
            Arc::new(MockObjectProducer::new()),
            Arc::new(MockConfigSync::new()),
            ControllerConfig::default(),
        ))
    }

    fn degraded() -> ReconcilerError {
        ReconcilerError::Degraded {
            reason: "Error retrieving tenant key".to_string(),
            cause: "connection refused".to_string(),
        }
    }

    #[test]
    fn test_error_backoff_grows_and_resets() {
        let ctx = context();
        let obj = Arc::new(ImageAssurance::new(TIGERA_SECURE_NAME, ImageAssuranceSpec {}));

        let first = handle_reconciliation_error(Arc::clone(&obj), &degraded(), Arc::clone(&ctx));
        let second = handle_reconciliation_error(Arc::clone(&obj), &degraded(), Arc::clone(&ctx));
        let third = handle_reconciliation_error(Arc::clone(&obj), &degraded(), Arc::clone(&ctx));
        assert_eq!(first, Action::requeue(Duration::from_secs(5)));
        assert_eq!(second, Action::requeue(Duration::from_secs(5)));
        assert_eq!(third, Action::requeue(Duration::from_secs(10)));
        assert_eq!(
            ctx.backoff_states.lock().unwrap()[TIGERA_SECURE_NAME].error_count,
            3
        );

        ctx.reset_backoff(TIGERA_SECURE_NAME);
        let after_reset = handle_reconciliation_error(obj, &degraded(), Arc::clone(&ctx));
        assert_eq!(after_reset, Action::requeue(Duration::from_secs(5)));
    }

    #[test]
    fn test_classify_watch_error() {
        assert_eq!(
            classify_watch_error("WatchFailed: 401 Unauthorized"),
            WatchErrorKind::Unauthorized
        );
        assert_eq!(
            classify_watch_error("too old resource version: 123 (456)"),
            WatchErrorKind::Expired
        );
        assert_eq!(
            classify_watch_error("storage is (re)initializing"),
            WatchErrorKind::Throttled
        );
        assert_eq!(
            classify_watch_error("ObjectNotFound: tigera-secure"),
            WatchErrorKind::NotFound
        );
        assert_eq!(classify_watch_error("connection reset"), WatchErrorKind::Other);
    }
}
