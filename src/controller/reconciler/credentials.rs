//! # Database Credentials
//!
//! Get-or-create of the per-organization database user secret.

use super::dependencies::{check_secret_fields, DependencyError};
use crate::constants::{
    IMAGE_ASSURANCE_NAMESPACE, PG_PASSWORD_LENGTH, PG_PASS_KEY, PG_USER_KEY, PG_USER_SECRET_NAME,
};
use crate::controller::store::{get_typed, ClusterStore};
use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::ByteString;
use kube::api::ObjectMeta;
use rand::distributions::Alphanumeric;
use rand::rngs::OsRng;
use rand::Rng;
use std::collections::BTreeMap;
use tracing::info;
use zeroize::Zeroizing;

/// Random alphanumeric password from the OS CSPRNG
pub fn random_password(length: usize) -> Zeroizing<String> {
    Zeroizing::new(
        OsRng
            .sample_iter(&Alphanumeric)
            .take(length)
            .map(char::from)
            .collect(),
    )
}

/// Return the database user secret, generating a new one if none exists
///
/// A generated secret is only returned, not written; it is created with the
/// rest of the rendered objects. An existing secret is validated and never
/// overwritten.
#[allow(
    clippy::missing_errors_doc,
    reason = "Error documentation is provided in doc comments"
)]
pub async fn get_or_create_pg_user_secret(
    store: &dyn ClusterStore,
    org_id: &str,
) -> Result<Secret, DependencyError> {
    if let Some(existing) =
        get_typed::<Secret>(store, Some(IMAGE_ASSURANCE_NAMESPACE), PG_USER_SECRET_NAME).await?
    {
        check_secret_fields(&existing, PG_USER_SECRET_NAME, &[PG_USER_KEY, PG_PASS_KEY])?;
        return Ok(existing);
    }

    info!("🔑 Generating database user credentials for organization {}", org_id);
    let password = random_password(PG_PASSWORD_LENGTH);
    Ok(Secret {
        metadata: ObjectMeta {
            name: Some(PG_USER_SECRET_NAME.to_string()),
            namespace: Some(IMAGE_ASSURANCE_NAMESPACE.to_string()),
            ..ObjectMeta::default()
        },
        data: Some(BTreeMap::from([
            (
                PG_USER_KEY.to_string(),
                ByteString(format!("{org_id}_user").into_bytes()),
            ),
            (
                PG_PASS_KEY.to_string(),
                ByteString(password.as_bytes().to_vec()),
            ),
        ])),
        ..Secret::default()
    })
}
