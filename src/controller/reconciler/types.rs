//! # Reconciler Types
//!
//! Shared context, errors and outcomes of the convergence engine.

use crate::config::ControllerConfig;
use crate::configsync::ConfigSync;
use crate::constants::{ERROR_BACKOFF_MAX_SECS, ERROR_BACKOFF_MIN_SECS};
use crate::controller::backoff::FibonacciBackoff;
use crate::controller::status::StatusReporter;
use crate::controller::store::{ClusterStore, StoreError};
use crate::render::ObjectProducer;
use kube_runtime::controller::Action;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Per-resource error backoff
#[derive(Debug, Clone)]
pub struct BackoffState {
    pub backoff: FibonacciBackoff,
    pub error_count: u32,
}

impl Default for BackoffState {
    fn default() -> Self {
        Self {
            backoff: FibonacciBackoff::new(ERROR_BACKOFF_MIN_SECS, ERROR_BACKOFF_MAX_SECS),
            error_count: 0,
        }
    }
}

impl BackoffState {
    pub fn increment_error(&mut self) {
        self.error_count = self.error_count.saturating_add(1);
    }

    pub fn reset(&mut self) {
        self.backoff.reset();
        self.error_count = 0;
    }
}

/// Reconciler context shared by every reconcile
pub struct Reconciler {
    pub store: Arc<dyn ClusterStore>,
    pub status: Arc<dyn StatusReporter>,
    pub renderer: Arc<dyn ObjectProducer>,
    pub syncer: Arc<dyn ConfigSync>,
    pub config: ControllerConfig,
    /// Keyed by resource name
    pub backoff_states: Mutex<HashMap<String, BackoffState>>,
}

impl std::fmt::Debug for Reconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reconciler")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Reconciler {
    pub fn new(
        store: Arc<dyn ClusterStore>,
        status: Arc<dyn StatusReporter>,
        renderer: Arc<dyn ObjectProducer>,
        syncer: Arc<dyn ConfigSync>,
        config: ControllerConfig,
    ) -> Self {
        Self {
            store,
            status,
            renderer,
            syncer,
            config,
            backoff_states: Mutex::new(HashMap::new()),
        }
    }

    /// Forget accumulated errors for `name` after a successful reconcile
    pub fn reset_backoff(&self, name: &str) {
        if let Ok(mut states) = self.backoff_states.lock() {
            if let Some(state) = states.get_mut(name) {
                state.reset();
            }
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ReconcilerError {
    /// A prerequisite or write failed; mirrored into the degraded status
    #[error("{reason}: {cause}")]
    Degraded { reason: String, cause: String },
    #[error("failed to read ImageAssurance: {0}")]
    Lookup(#[source] StoreError),
}

/// How a reconcile ended
#[derive(Debug)]
pub enum ReconcileOutcome {
    /// The primary resource does not exist
    Idle,
    /// Waiting on a prerequisite; a watch event will trigger the next run
    AwaitChange,
    RequeueAfter(Duration),
    /// Every component is available and the status says so
    Ready,
    /// Surfaced to the driver so its error backoff applies
    Failed(ReconcilerError),
}

impl ReconcileOutcome {
    /// Driver action for this outcome
    #[allow(
        clippy::missing_errors_doc,
        reason = "Error documentation is provided in doc comments"
    )]
    pub fn into_action(self) -> Result<Action, ReconcilerError> {
        match self {
            ReconcileOutcome::Idle | ReconcileOutcome::AwaitChange | ReconcileOutcome::Ready => {
                Ok(Action::await_change())
            }
            ReconcileOutcome::RequeueAfter(delay) => Ok(Action::requeue(delay)),
            ReconcileOutcome::Failed(e) => Err(e),
        }
    }
}
