//! # Dependency Collection
//!
//! Lookups for every prerequisite of the Image Assurance components.
//!
//! Each function reads one object (or a small group of objects) and checks the
//! fields the renderer relies on. Missing fields are errors, never defaulted.
//! The reconciler chains these into the gate pipeline and assembles the
//! [`DependencySet`].

use crate::constants::*;
use crate::controller::store::{get_typed, ClusterStore, StoreError};
use crate::crd::{Authentication, ImageSet, Installation, InstallationSpec, ProductVariant};
use crate::render::components::{image_set_name, validate_image_set, ImageSetError};
use k8s_openapi::api::batch::v1::Job;
use k8s_openapi::api::core::v1::{ConfigMap, Secret};

/// Client id the manager UI uses against the identity provider
pub const MANAGER_OIDC_CLIENT_ID: &str = "tigera-manager";
const DEFAULT_USERNAME_CLAIM: &str = "email";

#[derive(Debug, thiserror::Error)]
pub enum DependencyError {
    #[error("failed to read {kind} {name:?}: not found")]
    NotFound { kind: &'static str, name: String },
    #[error("expected {kind} {name:?} to have a field named {field:?}")]
    MissingField {
        kind: &'static str,
        name: String,
        field: String,
    },
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    ImageSet(#[from] ImageSetError),
}

/// How the API validates bearer tokens issued to manager users
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyValidatorConfig {
    pub issuer_url: String,
    pub client_id: String,
    pub username_claim: String,
}

/// Snapshot of every prerequisite, gathered once per reconcile
#[derive(Debug, Clone)]
pub struct DependencySet {
    pub variant: ProductVariant,
    pub installation: InstallationSpec,
    pub pull_secrets: Vec<Secret>,
    pub pg_config: ConfigMap,
    pub pg_user_secret: Secret,
    pub pg_admin_secret: Secret,
    pub pg_cert_secret: Secret,
    pub internal_manager_tls: Secret,
    pub api_tls: Secret,
    pub tenant_key: Secret,
    pub migrator_job: Option<Job>,
    pub image_set: Option<ImageSet>,
    pub key_validator: Option<KeyValidatorConfig>,
}

impl DependencySet {
    pub fn org_id(&self) -> &str {
        config_value(&self.pg_config, PG_CONFIG_ORG_ID_KEY).unwrap_or_default()
    }
}

/// Non-empty value of a config map key
pub fn config_value<'a>(cm: &'a ConfigMap, key: &str) -> Option<&'a str> {
    cm.data
        .as_ref()
        .and_then(|d| d.get(key))
        .map(String::as_str)
        .filter(|v| !v.is_empty())
}

/// Non-empty value of a secret key
pub fn secret_value<'a>(secret: &'a Secret, key: &str) -> Option<&'a [u8]> {
    secret
        .data
        .as_ref()
        .and_then(|d| d.get(key))
        .map(|v| v.0.as_slice())
        .filter(|v| !v.is_empty())
}

/// Read a secret that must exist and carry every key in `fields`
#[allow(
    clippy::missing_errors_doc,
    reason = "Error documentation is provided in doc comments"
)]
pub async fn required_secret(
    store: &dyn ClusterStore,
    namespace: &str,
    name: &str,
    fields: &[&str],
) -> Result<Secret, DependencyError> {
    let secret = get_typed::<Secret>(store, Some(namespace), name)
        .await?
        .ok_or_else(|| DependencyError::NotFound {
            kind: "secret",
            name: name.to_string(),
        })?;
    check_secret_fields(&secret, name, fields)?;
    Ok(secret)
}

#[allow(
    clippy::missing_errors_doc,
    reason = "Error documentation is provided in doc comments"
)]
pub fn check_secret_fields(
    secret: &Secret,
    name: &str,
    fields: &[&str],
) -> Result<(), DependencyError> {
    for field in fields {
        if secret_value(secret, field).is_none() {
            return Err(DependencyError::MissingField {
                kind: "secret",
                name: name.to_string(),
                field: (*field).to_string(),
            });
        }
    }
    Ok(())
}

/// Effective installation; `Ok(None)` when it does not exist
#[allow(
    clippy::missing_errors_doc,
    reason = "Error documentation is provided in doc comments"
)]
pub async fn installation(
    store: &dyn ClusterStore,
) -> Result<Option<(ProductVariant, InstallationSpec)>, StoreError> {
    Ok(get_typed::<Installation>(store, None, INSTALLATION_NAME)
        .await?
        .map(|i| i.effective()))
}

/// Image pull secrets referenced by the installation
#[allow(
    clippy::missing_errors_doc,
    reason = "Error documentation is provided in doc comments"
)]
pub async fn pull_secrets(
    store: &dyn ClusterStore,
    operator_namespace: &str,
    installation: &InstallationSpec,
) -> Result<Vec<Secret>, DependencyError> {
    let mut secrets = Vec::with_capacity(installation.image_pull_secrets.len());
    for reference in &installation.image_pull_secrets {
        let secret = get_typed::<Secret>(store, Some(operator_namespace), &reference.name)
            .await?
            .ok_or_else(|| DependencyError::NotFound {
                kind: "pull secret",
                name: reference.name.clone(),
            })?;
        secrets.push(secret);
    }
    Ok(secrets)
}

/// Database connection parameters
#[allow(
    clippy::missing_errors_doc,
    reason = "Error documentation is provided in doc comments"
)]
pub async fn pg_config(
    store: &dyn ClusterStore,
    operator_namespace: &str,
) -> Result<ConfigMap, DependencyError> {
    let cm = get_typed::<ConfigMap>(store, Some(operator_namespace), PG_CONFIG_MAP_NAME)
        .await?
        .ok_or_else(|| DependencyError::NotFound {
            kind: "configmap",
            name: PG_CONFIG_MAP_NAME.to_string(),
        })?;

    for key in [
        PG_CONFIG_HOST_KEY,
        PG_CONFIG_NAME_KEY,
        PG_CONFIG_PORT_KEY,
        PG_CONFIG_ORG_ID_KEY,
        PG_CONFIG_ORG_NAME_KEY,
    ] {
        if config_value(&cm, key).is_none() {
            return Err(DependencyError::MissingField {
                kind: "configmap",
                name: PG_CONFIG_MAP_NAME.to_string(),
                field: key.to_string(),
            });
        }
    }
    Ok(cm)
}

#[allow(
    clippy::missing_errors_doc,
    reason = "Error documentation is provided in doc comments"
)]
pub async fn pg_admin_secret(
    store: &dyn ClusterStore,
    operator_namespace: &str,
) -> Result<Secret, DependencyError> {
    required_secret(
        store,
        operator_namespace,
        PG_ADMIN_USER_SECRET_NAME,
        &[PG_USER_KEY, PG_PASS_KEY],
    )
    .await
}

#[allow(
    clippy::missing_errors_doc,
    reason = "Error documentation is provided in doc comments"
)]
pub async fn pg_cert_secret(
    store: &dyn ClusterStore,
    operator_namespace: &str,
) -> Result<Secret, DependencyError> {
    required_secret(
        store,
        operator_namespace,
        PG_CERT_SECRET_NAME,
        &[PG_SERVER_CA_KEY, PG_CLIENT_KEY_KEY, PG_CLIENT_CERT_KEY],
    )
    .await
}

#[allow(
    clippy::missing_errors_doc,
    reason = "Error documentation is provided in doc comments"
)]
pub async fn tenant_key(
    store: &dyn ClusterStore,
    operator_namespace: &str,
) -> Result<Secret, DependencyError> {
    required_secret(
        store,
        operator_namespace,
        TENANT_KEY_SECRET_NAME,
        &[TENANT_ENCRYPTION_KEY],
    )
    .await
}

/// The database migrator job, if it exists
#[allow(
    clippy::missing_errors_doc,
    reason = "Error documentation is provided in doc comments"
)]
pub async fn migrator_job(store: &dyn ClusterStore) -> Result<Option<Job>, StoreError> {
    get_typed::<Job>(store, Some(IMAGE_ASSURANCE_NAMESPACE), DB_MIGRATOR_JOB_NAME).await
}

/// Image set for the variant, validated; `Ok(None)` when none is published
#[allow(
    clippy::missing_errors_doc,
    reason = "Error documentation is provided in doc comments"
)]
pub async fn image_set(
    store: &dyn ClusterStore,
    variant: ProductVariant,
) -> Result<Option<ImageSet>, DependencyError> {
    let set = get_typed::<ImageSet>(store, None, &image_set_name(variant)).await?;
    if let Some(set) = &set {
        validate_image_set(set)?;
    }
    Ok(set)
}

/// The Authentication resource, if it exists
#[allow(
    clippy::missing_errors_doc,
    reason = "Error documentation is provided in doc comments"
)]
pub async fn authentication(
    store: &dyn ClusterStore,
) -> Result<Option<Authentication>, StoreError> {
    get_typed::<Authentication>(store, None, TIGERA_SECURE_NAME).await
}

/// Token validation settings derived from the Authentication resource
///
/// An explicit OIDC issuer wins; otherwise the bundled Dex instance behind the
/// manager domain is used.
#[allow(
    clippy::missing_errors_doc,
    reason = "Error documentation is provided in doc comments"
)]
pub fn key_validator_config(
    authentication: Option<&Authentication>,
) -> Result<Option<KeyValidatorConfig>, DependencyError> {
    let Some(auth) = authentication else {
        return Ok(None);
    };

    let oidc = auth.spec.oidc.as_ref();
    let username_claim = oidc
        .and_then(|o| o.username_claim.clone())
        .unwrap_or_else(|| DEFAULT_USERNAME_CLAIM.to_string());

    let issuer_url = match oidc.and_then(|o| o.issuer_url.clone()) {
        Some(issuer) => issuer,
        None if !auth.spec.manager_domain.is_empty() => {
            format!("{}/dex", auth.spec.manager_domain.trim_end_matches('/'))
        }
        None => {
            return Err(DependencyError::MissingField {
                kind: "authentication",
                name: TIGERA_SECURE_NAME.to_string(),
                field: "managerDomain".to_string(),
            })
        }
    };

    Ok(Some(KeyValidatorConfig {
        issuer_url,
        client_id: MANAGER_OIDC_CLIENT_ID.to_string(),
        username_claim,
    }))
}
