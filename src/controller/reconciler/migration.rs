//! # Migration Tracking
//!
//! Decides whether the database migrator has to (re)run and inspects the
//! migrator job's completion counters.

use crate::constants::{COMPONENT_DEPLOYMENTS, IMAGE_ASSURANCE_NAMESPACE};
use crate::controller::store::{ClusterStore, ObjectKey, StoreError};
use crate::crd::{ImageSet, InstallationSpec};
use crate::render::components::{reference, ImageSetError, COMPONENT_DB_MIGRATOR};
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::batch::v1::Job;

/// Whether the migrator must run before the components may be deployed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MigrationDecision {
    pub needs_migration: bool,
}

/// Progress of the migrator job
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobProgress {
    Running,
    Failed,
    Succeeded,
}

pub fn job_progress(job: &Job) -> JobProgress {
    let status = job.status.as_ref();
    let succeeded = status.and_then(|s| s.succeeded).unwrap_or(0);
    let failed = status.and_then(|s| s.failed).unwrap_or(0);
    match (succeeded, failed) {
        (0, 0) => JobProgress::Running,
        (0, _) => JobProgress::Failed,
        _ => JobProgress::Succeeded,
    }
}

/// Image of the job's first container
pub fn job_image(job: &Job) -> Option<&str> {
    job.spec
        .as_ref()
        .and_then(|s| s.template.spec.as_ref())
        .and_then(|p| p.containers.first())
        .and_then(|c| c.image.as_deref())
}

/// Migrator image implied by the installation and image set
#[allow(
    clippy::missing_errors_doc,
    reason = "Error documentation is provided in doc comments"
)]
pub fn migrator_image(
    installation: &InstallationSpec,
    image_set: Option<&ImageSet>,
) -> Result<String, ImageSetError> {
    reference(
        COMPONENT_DB_MIGRATOR,
        installation.registry.as_deref(),
        installation.image_path.as_deref(),
        installation.image_prefix.as_deref(),
        image_set,
    )
}

/// Migration is needed when there is no prior job, when it has not
/// succeeded, or when it ran a different migrator image
#[allow(
    clippy::missing_errors_doc,
    reason = "Error documentation is provided in doc comments"
)]
pub fn needs_migration(
    installation: &InstallationSpec,
    image_set: Option<&ImageSet>,
    prior_job: Option<&Job>,
) -> Result<MigrationDecision, ImageSetError> {
    let desired = migrator_image(installation, image_set)?;
    let needs_migration = match prior_job {
        None => true,
        Some(job) => {
            let succeeded = job
                .status
                .as_ref()
                .and_then(|s| s.succeeded)
                .unwrap_or(0);
            succeeded == 0 || job_image(job).is_none_or(|image| image != desired)
        }
    };
    Ok(MigrationDecision { needs_migration })
}

/// True if any of the component deployments exists
#[allow(
    clippy::missing_errors_doc,
    reason = "Error documentation is provided in doc comments"
)]
pub async fn components_up(store: &dyn ClusterStore) -> Result<bool, StoreError> {
    for name in COMPONENT_DEPLOYMENTS {
        let key = ObjectKey::of::<Deployment>(Some(IMAGE_ASSURANCE_NAMESPACE), name);
        if store.get(&key).await?.is_some() {
            return Ok(true);
        }
    }
    Ok(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::batch::v1::{JobSpec, JobStatus};
    use k8s_openapi::api::core::v1::{Container, PodSpec, PodTemplateSpec};

    fn job(image: &str, succeeded: i32, failed: i32) -> Job {
        Job {
            spec: Some(JobSpec {
                template: PodTemplateSpec {
                    spec: Some(PodSpec {
                        containers: vec![Container {
                            name: "migrator".to_string(),
                            image: Some(image.to_string()),
                            ..Container::default()
                        }],
                        ..PodSpec::default()
                    }),
                    ..PodTemplateSpec::default()
                },
                ..JobSpec::default()
            }),
            status: Some(JobStatus {
                succeeded: Some(succeeded),
                failed: Some(failed),
                ..JobStatus::default()
            }),
            ..Job::default()
        }
    }

    fn current_image() -> String {
        migrator_image(&InstallationSpec::default(), None).unwrap()
    }

    #[test]
    fn test_no_prior_job_needs_migration() {
        let decision = needs_migration(&InstallationSpec::default(), None, None).unwrap();
        assert!(decision.needs_migration);
    }

    #[test]
    fn test_succeeded_job_with_same_image_is_current() {
        let prior = job(&current_image(), 1, 0);
        let decision = needs_migration(&InstallationSpec::default(), None, Some(&prior)).unwrap();
        assert!(!decision.needs_migration);
    }

    #[test]
    fn test_image_change_needs_migration() {
        let prior = job("quay.io/tigera/image-assurance-db-migrator:v0.0.1", 1, 0);
        let decision = needs_migration(&InstallationSpec::default(), None, Some(&prior)).unwrap();
        assert!(decision.needs_migration);
    }

    #[test]
    fn test_unsucceeded_job_needs_migration() {
        let prior = job(&current_image(), 0, 1);
        let decision = needs_migration(&InstallationSpec::default(), None, Some(&prior)).unwrap();
        assert!(decision.needs_migration);
    }

    #[test]
    fn test_job_progress() {
        assert_eq!(job_progress(&job("i", 0, 0)), JobProgress::Running);
        assert_eq!(job_progress(&job("i", 0, 1)), JobProgress::Failed);
        assert_eq!(job_progress(&job("i", 1, 3)), JobProgress::Succeeded);
    }
}
