//! # Image Assurance Renderer
//!
//! Renders the namespace, copied credentials, the migrator job and the API,
//! scanner and admission webhook deployments.
//!
//! Migration rules:
//! - components up and migration needed: delete the deployments and the job
//!   so the migrator reruns against a quiesced database;
//! - a prior job that ran a different migrator image is deleted, never
//!   updated (job templates are immutable);
//! - deployments are only rendered once no migration is pending.

use super::components::{
    reference, Component, COMPONENT_API, COMPONENT_CAW, COMPONENT_SCANNER,
};
use super::{ObjectProducer, RenderError, RenderedObjects};
use crate::constants::*;
use crate::controller::reconciler::dependencies::config_value;
use crate::controller::reconciler::migration::{job_image, migrator_image};
use crate::controller::reconciler::{DependencySet, MigrationDecision};
use crate::controller::store::{to_dynamic, ObjectKey};
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::batch::v1::Job;
use k8s_openapi::api::core::v1::{ConfigMap, Namespace, Secret};
use kube::api::{DynamicObject, ObjectMeta};
use serde_json::{json, Value};
use std::collections::BTreeMap;

const API_PORT: u16 = 5557;
const TLS_MOUNT_PATH: &str = "/certs/https";
const PG_CERTS_MOUNT_PATH: &str = "/certs/db";

/// Default [`ObjectProducer`] for the Image Assurance component
#[derive(Debug, Clone, Copy, Default)]
pub struct ImageAssuranceRenderer;

impl ObjectProducer for ImageAssuranceRenderer {
    fn render(
        &self,
        deps: &DependencySet,
        decision: MigrationDecision,
        components_up: bool,
    ) -> Result<RenderedObjects, RenderError> {
        let mut out = RenderedObjects::default();

        out.to_create.push(to_dynamic(&namespace())?);
        for secret in &deps.pull_secrets {
            out.to_create
                .push(to_dynamic(&copy_secret(secret, IMAGE_ASSURANCE_NAMESPACE))?);
        }
        // Passthrough so a freshly minted API certificate is persisted
        out.to_create.push(to_dynamic(&copy_secret(
            &deps.api_tls,
            deps.api_tls
                .metadata
                .namespace
                .as_deref()
                .unwrap_or(DEFAULT_OPERATOR_NAMESPACE),
        ))?);
        for secret in [
            &deps.api_tls,
            &deps.pg_user_secret,
            &deps.pg_admin_secret,
            &deps.pg_cert_secret,
            &deps.tenant_key,
            &deps.internal_manager_tls,
        ] {
            out.to_create
                .push(to_dynamic(&copy_secret(secret, IMAGE_ASSURANCE_NAMESPACE))?);
        }
        out.to_create.push(to_dynamic(&configuration_config_map(deps.org_id()))?);

        let job_key = ObjectKey::of::<Job>(Some(IMAGE_ASSURANCE_NAMESPACE), DB_MIGRATOR_JOB_NAME);
        let deployment_keys = COMPONENT_DEPLOYMENTS
            .iter()
            .map(|name| ObjectKey::of::<Deployment>(Some(IMAGE_ASSURANCE_NAMESPACE), name));

        if decision.needs_migration && components_up {
            out.to_delete.extend(deployment_keys);
            out.to_delete.push(job_key);
            return Ok(out);
        }

        let desired_migrator = migrator_image(&deps.installation, deps.image_set.as_ref())?;
        let prior_image = deps.migrator_job.as_ref().and_then(job_image);
        if prior_image.is_some_and(|image| image != desired_migrator) {
            out.to_delete.push(job_key);
        } else {
            out.to_create
                .push(to_dynamic(&migrator_job(deps, &desired_migrator))?);
        }

        if !decision.needs_migration {
            out.to_create
                .push(to_dynamic(&api_deployment(deps, &self.image(deps, COMPONENT_API)?))?);
            out.to_create.push(to_dynamic(&component_deployment(
                deps,
                SCANNER_DEPLOYMENT_NAME,
                &self.image(deps, COMPONENT_SCANNER)?,
            ))?);
            out.to_create.push(to_dynamic(&component_deployment(
                deps,
                CAW_DEPLOYMENT_NAME,
                &self.image(deps, COMPONENT_CAW)?,
            ))?);
        }

        Ok(out)
    }
}

impl ImageAssuranceRenderer {
    fn image(self, deps: &DependencySet, component: Component) -> Result<String, RenderError> {
        Ok(reference(
            component,
            deps.installation.registry.as_deref(),
            deps.installation.image_path.as_deref(),
            deps.installation.image_prefix.as_deref(),
            deps.image_set.as_ref(),
        )?)
    }
}

fn meta(name: &str, namespace: Option<&str>) -> ObjectMeta {
    ObjectMeta {
        name: Some(name.to_string()),
        namespace: namespace.map(str::to_string),
        ..ObjectMeta::default()
    }
}

fn namespace() -> Namespace {
    Namespace {
        metadata: meta(IMAGE_ASSURANCE_NAMESPACE, None),
        ..Namespace::default()
    }
}

/// Copy of a secret's payload into `namespace`, without server-side metadata
fn copy_secret(secret: &Secret, namespace: &str) -> Secret {
    Secret {
        metadata: meta(
            secret.metadata.name.as_deref().unwrap_or_default(),
            Some(namespace),
        ),
        data: secret.data.clone(),
        type_: secret.type_.clone(),
        ..Secret::default()
    }
}

/// Configuration shared with the components; the config sync adds its
/// settings next to the organization id
fn configuration_config_map(org_id: &str) -> ConfigMap {
    ConfigMap {
        metadata: meta(CONFIGURATION_CONFIG_MAP_NAME, Some(IMAGE_ASSURANCE_NAMESPACE)),
        data: Some(BTreeMap::from([(
            CONFIGURATION_ORG_ID_KEY.to_string(),
            org_id.to_string(),
        )])),
        ..ConfigMap::default()
    }
}

fn secret_env(name: &str, secret: &str, key: &str) -> Value {
    json!({
        "name": name,
        "valueFrom": { "secretKeyRef": { "name": secret, "key": key } }
    })
}

fn value_env(name: &str, value: &str) -> Value {
    json!({ "name": name, "value": value })
}

fn database_env(deps: &DependencySet, user_secret: &str) -> Vec<Value> {
    let cfg = |key: &str| config_value(&deps.pg_config, key).unwrap_or_default();
    vec![
        value_env("IMAGE_ASSURANCE_PG_HOST", cfg(PG_CONFIG_HOST_KEY)),
        value_env("IMAGE_ASSURANCE_PG_PORT", cfg(PG_CONFIG_PORT_KEY)),
        value_env("IMAGE_ASSURANCE_PG_NAME", cfg(PG_CONFIG_NAME_KEY)),
        value_env("IMAGE_ASSURANCE_ORGANIZATION_ID", cfg(PG_CONFIG_ORG_ID_KEY)),
        value_env("IMAGE_ASSURANCE_ORGANIZATION_NAME", cfg(PG_CONFIG_ORG_NAME_KEY)),
        value_env("IMAGE_ASSURANCE_PG_SSL_CERT", &format!("{PG_CERTS_MOUNT_PATH}/{PG_CLIENT_CERT_KEY}")),
        value_env("IMAGE_ASSURANCE_PG_SSL_KEY", &format!("{PG_CERTS_MOUNT_PATH}/{PG_CLIENT_KEY_KEY}")),
        value_env("IMAGE_ASSURANCE_PG_SSL_ROOT_CERT", &format!("{PG_CERTS_MOUNT_PATH}/{PG_SERVER_CA_KEY}")),
        secret_env("IMAGE_ASSURANCE_PG_USER", user_secret, PG_USER_KEY),
        secret_env("IMAGE_ASSURANCE_PG_PASSWORD", user_secret, PG_PASS_KEY),
    ]
}

fn pull_secret_refs(deps: &DependencySet) -> Vec<Value> {
    deps.pull_secrets
        .iter()
        .filter_map(|s| s.metadata.name.as_deref())
        .map(|name| json!({ "name": name }))
        .collect()
}

fn secret_volume(name: &str, secret: &str) -> Value {
    json!({ "name": name, "secret": { "secretName": secret } })
}

fn migrator_job(deps: &DependencySet, image: &str) -> Value {
    let mut env = database_env(deps, PG_ADMIN_USER_SECRET_NAME);
    env.push(secret_env("IMAGE_ASSURANCE_TENANT_ENCRYPTION_KEY", TENANT_KEY_SECRET_NAME, TENANT_ENCRYPTION_KEY));
    env.push(secret_env("IMAGE_ASSURANCE_TENANT_PG_USER", PG_USER_SECRET_NAME, PG_USER_KEY));
    env.push(secret_env("IMAGE_ASSURANCE_TENANT_PG_PASSWORD", PG_USER_SECRET_NAME, PG_PASS_KEY));

    json!({
        "apiVersion": "batch/v1",
        "kind": "Job",
        "metadata": { "name": DB_MIGRATOR_JOB_NAME, "namespace": IMAGE_ASSURANCE_NAMESPACE },
        "spec": {
            "backoffLimit": 0,
            "template": {
                "metadata": { "labels": { "k8s-app": DB_MIGRATOR_JOB_NAME } },
                "spec": {
                    "restartPolicy": "Never",
                    "imagePullSecrets": pull_secret_refs(deps),
                    "containers": [{
                        "name": DB_MIGRATOR_JOB_NAME,
                        "image": image,
                        "env": env,
                        "volumeMounts": [{ "name": "pg-certs", "mountPath": PG_CERTS_MOUNT_PATH, "readOnly": true }]
                    }],
                    "volumes": [secret_volume("pg-certs", PG_CERT_SECRET_NAME)]
                }
            }
        }
    })
}

fn deployment(
    deps: &DependencySet,
    name: &str,
    image: &str,
    env: Vec<Value>,
    mounts: &[(&str, &str, &str)],
) -> Value {
    let volume_mounts: Vec<Value> = mounts
        .iter()
        .map(|(volume, _, path)| json!({ "name": volume, "mountPath": path, "readOnly": true }))
        .collect();
    let volumes: Vec<Value> = mounts
        .iter()
        .map(|(volume, secret, _)| secret_volume(volume, secret))
        .collect();

    json!({
        "apiVersion": "apps/v1",
        "kind": "Deployment",
        "metadata": { "name": name, "namespace": IMAGE_ASSURANCE_NAMESPACE },
        "spec": {
            "replicas": 1,
            "selector": { "matchLabels": { "k8s-app": name } },
            "template": {
                "metadata": { "labels": { "k8s-app": name } },
                "spec": {
                    "imagePullSecrets": pull_secret_refs(deps),
                    "containers": [{
                        "name": name,
                        "image": image,
                        "env": env,
                        "volumeMounts": volume_mounts
                    }],
                    "volumes": volumes
                }
            }
        }
    })
}

fn api_deployment(deps: &DependencySet, image: &str) -> Value {
    let mut env = database_env(deps, PG_USER_SECRET_NAME);
    env.push(value_env("IMAGE_ASSURANCE_HTTPS_LISTEN_ADDRESS", &format!(":{API_PORT}")));
    env.push(value_env("IMAGE_ASSURANCE_HTTPS_CERT", &format!("{TLS_MOUNT_PATH}/{TLS_CERT_KEY}")));
    env.push(value_env("IMAGE_ASSURANCE_HTTPS_KEY", &format!("{TLS_MOUNT_PATH}/{TLS_PRIVATE_KEY_KEY}")));
    env.push(secret_env("IMAGE_ASSURANCE_TENANT_ENCRYPTION_KEY", TENANT_KEY_SECRET_NAME, TENANT_ENCRYPTION_KEY));
    if let Some(kvc) = &deps.key_validator {
        env.push(value_env("IMAGE_ASSURANCE_DEX_ENABLED", "true"));
        env.push(value_env("IMAGE_ASSURANCE_OIDC_ISSUER", &kvc.issuer_url));
        env.push(value_env("IMAGE_ASSURANCE_OIDC_CLIENT_ID", &kvc.client_id));
        env.push(value_env("IMAGE_ASSURANCE_OIDC_USERNAME_CLAIM", &kvc.username_claim));
    }
    deployment(
        deps,
        API_DEPLOYMENT_NAME,
        image,
        env,
        &[
            ("api-tls", API_CERT_SECRET_NAME, TLS_MOUNT_PATH),
            ("pg-certs", PG_CERT_SECRET_NAME, PG_CERTS_MOUNT_PATH),
        ],
    )
}

fn component_deployment(deps: &DependencySet, name: &str, image: &str) -> Value {
    let env = vec![
        value_env(
            "IMAGE_ASSURANCE_API_URL",
            &format!("https://{API_DEPLOYMENT_NAME}.{IMAGE_ASSURANCE_NAMESPACE}.svc:{API_PORT}"),
        ),
        value_env("IMAGE_ASSURANCE_ORGANIZATION_ID", deps.org_id()),
        value_env("IMAGE_ASSURANCE_CA_BUNDLE_PATH", &format!("{TLS_MOUNT_PATH}/{TLS_CERT_KEY}")),
    ];
    deployment(deps, name, image, env, &[("api-tls", API_CERT_SECRET_NAME, TLS_MOUNT_PATH)])
}

/// Keys of rendered objects, for assertions
#[cfg(test)]
pub(crate) fn keys(objects: &[DynamicObject]) -> Vec<ObjectKey> {
    objects.iter().filter_map(ObjectKey::from_object).collect()
}
