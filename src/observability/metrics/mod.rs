//! # Metrics Module
//!
//! Prometheus metrics for monitoring the operator, organized by responsibility.
//!
//! ## Sub-modules
//!
//! - `registry` - Metrics registry setup and registration
//! - `controller_metrics` - Reconciliation metrics (runs, errors, requeues, degraded state)
//! - `sync_metrics` - Configuration sync metrics

pub mod controller_metrics;
pub mod registry;
pub mod sync_metrics;

pub use controller_metrics::*;
pub use registry::*;
pub use sync_metrics::*;
