//! # Rendering
//!
//! Desired objects for the Image Assurance component.
//!
//! An [`ObjectProducer`] turns the collected dependencies and the migration
//! decision into the objects that should exist and the objects that must be
//! removed. It performs no I/O; applying the result is the reconciler's job.

pub mod components;
mod image_assurance;

pub use image_assurance::ImageAssuranceRenderer;

use crate::controller::reconciler::{DependencySet, MigrationDecision};
use crate::controller::store::{ObjectKey, StoreError};
use components::ImageSetError;
use kube::api::DynamicObject;
#[cfg(test)]
use mockall::automock;

/// Objects to create or update, and objects to delete
#[derive(Debug, Clone, Default)]
pub struct RenderedObjects {
    pub to_create: Vec<DynamicObject>,
    pub to_delete: Vec<ObjectKey>,
}

#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error(transparent)]
    ImageSet(#[from] ImageSetError),
    #[error(transparent)]
    Conversion(#[from] StoreError),
}

/// Produces the desired change-set for one reconcile
#[cfg_attr(test, automock)]
pub trait ObjectProducer: Send + Sync {
    #[allow(
        clippy::missing_errors_doc,
        reason = "Error documentation is provided in doc comments"
    )]
    fn render(
        &self,
        deps: &DependencySet,
        decision: MigrationDecision,
        components_up: bool,
    ) -> Result<RenderedObjects, RenderError>;
}
