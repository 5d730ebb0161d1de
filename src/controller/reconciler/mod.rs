//! # Reconciler
//!
//! Convergence engine for the Image Assurance component and its building
//! blocks.
//!
//! ## Sub-modules
//!
//! - `gate` - Tri-state readiness gates chained with `?`
//! - `dependencies` - Prerequisite lookups and the [`DependencySet`]
//! - `credentials` - Database user secret get-or-create
//! - `certificates` - TLS pair validation and minting
//! - `migration` - Migrator job tracking
//! - `apply` - Change-set application
//! - `reconcile` - The engine itself
//! - `types` - Context, errors and outcomes

pub mod apply;
pub mod certificates;
pub mod credentials;
pub mod dependencies;
pub mod gate;
pub mod migration;
pub mod reconcile;
#[cfg(test)]
pub(crate) mod test_support;
pub mod types;

pub use dependencies::DependencySet;
pub use migration::MigrationDecision;
pub use reconcile::{reconcile, reconcile_image_assurance};
pub use types::{BackoffState, ReconcileOutcome, Reconciler, ReconcilerError};
