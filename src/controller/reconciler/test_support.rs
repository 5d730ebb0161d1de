//! Fixtures shared by the reconciler and renderer tests.

use super::dependencies::DependencySet;
use crate::constants::*;
use crate::controller::store::memory::InMemoryStore;
use crate::crd::{ImageAssurance, ImageAssuranceSpec, Installation, InstallationSpec, ProductVariant};
use k8s_openapi::api::core::v1::{ConfigMap, Secret};
use k8s_openapi::ByteString;
use kube::api::ObjectMeta;
use std::collections::BTreeMap;

pub(crate) const ORG_ID: &str = "org-1";

pub(crate) fn secret(namespace: &str, name: &str, data: &[(&str, &str)]) -> Secret {
    Secret {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(namespace.to_string()),
            ..ObjectMeta::default()
        },
        data: Some(
            data.iter()
                .map(|(k, v)| ((*k).to_string(), ByteString(v.as_bytes().to_vec())))
                .collect(),
        ),
        ..Secret::default()
    }
}

pub(crate) fn pg_config() -> ConfigMap {
    ConfigMap {
        metadata: ObjectMeta {
            name: Some(PG_CONFIG_MAP_NAME.to_string()),
            namespace: Some(DEFAULT_OPERATOR_NAMESPACE.to_string()),
            ..ObjectMeta::default()
        },
        data: Some(BTreeMap::from([
            (PG_CONFIG_HOST_KEY.to_string(), "db.example.com".to_string()),
            (PG_CONFIG_NAME_KEY.to_string(), "tigera_ia".to_string()),
            (PG_CONFIG_PORT_KEY.to_string(), "5432".to_string()),
            (PG_CONFIG_ORG_ID_KEY.to_string(), ORG_ID.to_string()),
            (PG_CONFIG_ORG_NAME_KEY.to_string(), "Acme".to_string()),
        ])),
        ..ConfigMap::default()
    }
}

pub(crate) fn pg_admin_secret() -> Secret {
    secret(
        DEFAULT_OPERATOR_NAMESPACE,
        PG_ADMIN_USER_SECRET_NAME,
        &[(PG_USER_KEY, "admin"), (PG_PASS_KEY, "admin-password")],
    )
}

pub(crate) fn pg_cert_secret() -> Secret {
    secret(
        DEFAULT_OPERATOR_NAMESPACE,
        PG_CERT_SECRET_NAME,
        &[
            (PG_SERVER_CA_KEY, "ca"),
            (PG_CLIENT_CERT_KEY, "cert"),
            (PG_CLIENT_KEY_KEY, "key"),
        ],
    )
}

pub(crate) fn tenant_key() -> Secret {
    secret(
        DEFAULT_OPERATOR_NAMESPACE,
        TENANT_KEY_SECRET_NAME,
        &[(TENANT_ENCRYPTION_KEY, "0123456789abcdef")],
    )
}

pub(crate) fn internal_manager_tls() -> Secret {
    secret(
        DEFAULT_OPERATOR_NAMESPACE,
        MANAGER_INTERNAL_TLS_SECRET_NAME,
        &[
            (MANAGER_INTERNAL_SECRET_KEY_NAME, "manager-key"),
            (MANAGER_INTERNAL_SECRET_CERT_NAME, "manager-cert"),
        ],
    )
}

/// A complete dependency set for a fresh install
pub(crate) fn dependency_set() -> DependencySet {
    DependencySet {
        variant: ProductVariant::TigeraSecureEnterprise,
        installation: InstallationSpec::default(),
        pull_secrets: vec![],
        pg_config: pg_config(),
        pg_user_secret: secret(
            IMAGE_ASSURANCE_NAMESPACE,
            PG_USER_SECRET_NAME,
            &[(PG_USER_KEY, "org-1_user"), (PG_PASS_KEY, "0123456789abcdef")],
        ),
        pg_admin_secret: pg_admin_secret(),
        pg_cert_secret: pg_cert_secret(),
        internal_manager_tls: internal_manager_tls(),
        api_tls: secret(
            DEFAULT_OPERATOR_NAMESPACE,
            API_CERT_SECRET_NAME,
            &[(TLS_PRIVATE_KEY_KEY, "api-key"), (TLS_CERT_KEY, "api-cert")],
        ),
        tenant_key: tenant_key(),
        migrator_job: None,
        image_set: None,
        key_validator: None,
    }
}

/// Seed the primary resource and every prerequisite of a fresh install
pub(crate) fn seed_prerequisites(store: &InMemoryStore) {
    store.insert(&ImageAssurance::new(TIGERA_SECURE_NAME, ImageAssuranceSpec {}));
    store.insert(&Installation::new(
        INSTALLATION_NAME,
        InstallationSpec {
            variant: Some(ProductVariant::TigeraSecureEnterprise),
            ..InstallationSpec::default()
        },
    ));
    store.insert(&pg_config());
    store.insert(&pg_admin_secret());
    store.insert(&pg_cert_secret());
    store.insert(&tenant_key());
    store.insert(&internal_manager_tls());
}
