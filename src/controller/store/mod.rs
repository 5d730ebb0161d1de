//! # Cluster Store
//!
//! Storage collaborator shared by the reconciler and the config sync actor.
//!
//! Objects are addressed by [`ObjectKey`] and handled as [`DynamicObject`]s so
//! a single trait covers secrets, config maps, jobs, deployments and the
//! operator's own custom resources. Typed access goes through [`get_typed`] and
//! [`to_dynamic`].
//!
//! Updates are optimistic: the object handed to [`ClusterStore::update`] carries
//! the `resourceVersion` it was read at, and a stale version fails with
//! [`StoreError::Conflict`].

mod kube_store;
#[cfg(test)]
pub(crate) mod memory;

pub use kube_store::KubeStore;

use async_trait::async_trait;
use kube::api::DynamicObject;
use kube::Resource;
#[cfg(test)]
use mockall::automock;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt;

/// Address of a single object in the cluster
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectKey {
    pub api_version: String,
    pub kind: String,
    /// `None` for cluster-scoped objects
    pub namespace: Option<String>,
    pub name: String,
}

impl ObjectKey {
    pub fn new(api_version: &str, kind: &str, namespace: Option<&str>, name: &str) -> Self {
        Self {
            api_version: api_version.to_string(),
            kind: kind.to_string(),
            namespace: namespace.map(str::to_string),
            name: name.to_string(),
        }
    }

    /// Key for a statically typed resource
    pub fn of<K>(namespace: Option<&str>, name: &str) -> Self
    where
        K: Resource<DynamicType = ()>,
    {
        Self::new(&K::api_version(&()), &K::kind(&()), namespace, name)
    }

    /// Key of an existing object, `None` when type or name is unset
    pub fn from_object(obj: &DynamicObject) -> Option<Self> {
        let types = obj.types.as_ref()?;
        let name = obj.metadata.name.as_deref()?;
        Some(Self::new(
            &types.api_version,
            &types.kind,
            obj.metadata.namespace.as_deref(),
            name,
        ))
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.namespace {
            Some(ns) => write!(f, "{} {}/{}", self.kind, ns, self.name),
            None => write!(f, "{} {}", self.kind, self.name),
        }
    }
}

/// Storage errors
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("{0} not found")]
    NotFound(ObjectKey),
    #[error("{0} already exists")]
    AlreadyExists(ObjectKey),
    #[error("{0} was modified concurrently")]
    Conflict(ObjectKey),
    #[error("object is missing apiVersion, kind or name")]
    InvalidObject,
    #[error("failed to convert {kind}: {source}")]
    Serialization {
        kind: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("kubernetes API error: {0}")]
    Api(#[from] kube::Error),
}

/// Get/create/update/delete access to named cluster objects
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ClusterStore: Send + Sync {
    /// Fetch an object; `Ok(None)` when it does not exist
    async fn get(&self, key: &ObjectKey) -> Result<Option<DynamicObject>, StoreError>;

    /// Create an object; fails with `AlreadyExists` if present
    async fn create(&self, obj: &DynamicObject) -> Result<DynamicObject, StoreError>;

    /// Replace an object at the resource version it carries
    async fn update(&self, obj: &DynamicObject) -> Result<DynamicObject, StoreError>;

    /// Delete an object; deleting a missing object succeeds
    async fn delete(&self, key: &ObjectKey) -> Result<(), StoreError>;

    /// Write the `status` subresource of an object
    async fn update_status(&self, obj: &DynamicObject) -> Result<(), StoreError>;
}

/// Fetch and decode a typed object
#[allow(
    clippy::missing_errors_doc,
    reason = "Error documentation is provided in doc comments"
)]
pub async fn get_typed<K>(
    store: &dyn ClusterStore,
    namespace: Option<&str>,
    name: &str,
) -> Result<Option<K>, StoreError>
where
    K: Resource<DynamicType = ()> + DeserializeOwned,
{
    let key = ObjectKey::of::<K>(namespace, name);
    store
        .get(&key)
        .await?
        .map(|obj| from_dynamic::<K>(&obj))
        .transpose()
}

/// Convert a typed object (with `apiVersion`/`kind` set) into a [`DynamicObject`]
#[allow(
    clippy::missing_errors_doc,
    reason = "Error documentation is provided in doc comments"
)]
pub fn to_dynamic<K: Serialize>(obj: &K) -> Result<DynamicObject, StoreError> {
    let kind = std::any::type_name::<K>().to_string();
    let value = serde_json::to_value(obj).map_err(|source| StoreError::Serialization {
        kind: kind.clone(),
        source,
    })?;
    serde_json::from_value(value).map_err(|source| StoreError::Serialization { kind, source })
}

/// Decode a [`DynamicObject`] into a typed object
#[allow(
    clippy::missing_errors_doc,
    reason = "Error documentation is provided in doc comments"
)]
pub fn from_dynamic<K: DeserializeOwned>(obj: &DynamicObject) -> Result<K, StoreError> {
    let kind = obj
        .types
        .as_ref()
        .map_or_else(|| "object".to_string(), |t| t.kind.clone());
    let value = serde_json::to_value(obj).map_err(|source| StoreError::Serialization {
        kind: kind.clone(),
        source,
    })?;
    serde_json::from_value(value).map_err(|source| StoreError::Serialization { kind, source })
}
