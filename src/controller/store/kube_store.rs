//! # Kubernetes Store
//!
//! [`ClusterStore`] backed by the Kubernetes API server.

use super::{ClusterStore, ObjectKey, StoreError};
use crate::constants::CONTROLLER_NAME;
use async_trait::async_trait;
use kube::api::{
    Api, ApiResource, DeleteParams, DynamicObject, GroupVersionKind, Patch, PatchParams,
    PostParams,
};
use kube::Client;
use tracing::debug;

/// Store that reads and writes through a kube [`Client`]
#[derive(Clone)]
pub struct KubeStore {
    client: Client,
}

impl std::fmt::Debug for KubeStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubeStore").finish_non_exhaustive()
    }
}

impl KubeStore {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn api(&self, key: &ObjectKey) -> Api<DynamicObject> {
        let (group, version) = key
            .api_version
            .split_once('/')
            .unwrap_or(("", key.api_version.as_str()));
        let resource = ApiResource::from_gvk(&GroupVersionKind::gvk(group, version, &key.kind));
        match &key.namespace {
            Some(ns) => Api::namespaced_with(self.client.clone(), ns, &resource),
            None => Api::all_with(self.client.clone(), &resource),
        }
    }

    fn post_params() -> PostParams {
        PostParams {
            field_manager: Some(CONTROLLER_NAME.to_string()),
            ..PostParams::default()
        }
    }
}

/// Map 404/409 responses onto store errors
fn classify(error: kube::Error, key: &ObjectKey, creating: bool) -> StoreError {
    match error {
        kube::Error::Api(api_err) if api_err.code == 404 => StoreError::NotFound(key.clone()),
        kube::Error::Api(api_err) if api_err.code == 409 && creating => {
            StoreError::AlreadyExists(key.clone())
        }
        kube::Error::Api(api_err) if api_err.code == 409 => StoreError::Conflict(key.clone()),
        other => StoreError::Api(other),
    }
}

#[async_trait]
impl ClusterStore for KubeStore {
    async fn get(&self, key: &ObjectKey) -> Result<Option<DynamicObject>, StoreError> {
        let mut obj = self.api(key).get_opt(&key.name).await?;
        // The API server omits apiVersion/kind on some responses
        if let Some(obj) = obj.as_mut() {
            if obj.types.is_none() {
                obj.types = Some(kube::core::TypeMeta {
                    api_version: key.api_version.clone(),
                    kind: key.kind.clone(),
                });
            }
        }
        Ok(obj)
    }

    async fn create(&self, obj: &DynamicObject) -> Result<DynamicObject, StoreError> {
        let key = ObjectKey::from_object(obj).ok_or(StoreError::InvalidObject)?;
        debug!("Creating {}", key);
        self.api(&key)
            .create(&Self::post_params(), obj)
            .await
            .map_err(|e| classify(e, &key, true))
    }

    async fn update(&self, obj: &DynamicObject) -> Result<DynamicObject, StoreError> {
        let key = ObjectKey::from_object(obj).ok_or(StoreError::InvalidObject)?;
        debug!("Updating {}", key);
        self.api(&key)
            .replace(&key.name, &Self::post_params(), obj)
            .await
            .map_err(|e| classify(e, &key, false))
    }

    async fn delete(&self, key: &ObjectKey) -> Result<(), StoreError> {
        debug!("Deleting {}", key);
        match self
            .api(key)
            .delete(&key.name, &DeleteParams::background())
            .await
        {
            Ok(_) => Ok(()),
            Err(kube::Error::Api(api_err)) if api_err.code == 404 => Ok(()),
            Err(e) => Err(StoreError::Api(e)),
        }
    }

    async fn update_status(&self, obj: &DynamicObject) -> Result<(), StoreError> {
        let key = ObjectKey::from_object(obj).ok_or(StoreError::InvalidObject)?;
        let status = obj
            .data
            .get("status")
            .cloned()
            .unwrap_or(serde_json::Value::Null);
        let patch = serde_json::json!({ "status": status });
        self.api(&key)
            .patch_status(
                &key.name,
                &PatchParams::apply(CONTROLLER_NAME),
                &Patch::Merge(&patch),
            )
            .await
            .map_err(|e| classify(e, &key, false))?;
        Ok(())
    }
}
