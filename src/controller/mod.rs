//! # Controller
//!
//! Reconciliation, storage access, status reporting and the health/metrics
//! server.

pub mod backoff;
pub mod reconciler;
pub mod server;
pub mod status;
pub mod store;
