//! In-memory [`ClusterStore`] for tests.
//!
//! Emulates resource versions and optimistic concurrency, and counts every
//! write so tests can assert that a reconcile pass was a no-op.

use super::{to_dynamic, ClusterStore, ObjectKey, StoreError};
use async_trait::async_trait;
use kube::api::DynamicObject;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Mutex;

#[derive(Debug, Default)]
pub(crate) struct InMemoryStore {
    objects: Mutex<BTreeMap<ObjectKey, DynamicObject>>,
    version: AtomicU64,
    mutations: AtomicUsize,
    fail_writes: AtomicBool,
}

impl InMemoryStore {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Seed a typed object without counting it as a mutation
    pub(crate) fn insert<K: Serialize>(&self, obj: &K) {
        let mut obj = to_dynamic(obj).expect("seed object converts");
        let key = ObjectKey::from_object(&obj).expect("seed object has a key");
        obj.metadata.resource_version = Some(self.next_version());
        self.objects.lock().expect("store lock").insert(key, obj);
    }

    pub(crate) fn object(&self, key: &ObjectKey) -> Option<DynamicObject> {
        self.objects.lock().expect("store lock").get(key).cloned()
    }

    pub(crate) fn contains(&self, key: &ObjectKey) -> bool {
        self.objects.lock().expect("store lock").contains_key(key)
    }

    /// Writes performed through the trait since creation
    pub(crate) fn mutations(&self) -> usize {
        self.mutations.load(Ordering::SeqCst)
    }

    /// Make every create/update/delete fail
    pub(crate) fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    fn next_version(&self) -> String {
        (self.version.fetch_add(1, Ordering::SeqCst) + 1).to_string()
    }

    fn check_writable(&self) -> Result<(), StoreError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::InvalidObject);
        }
        Ok(())
    }
}

#[async_trait]
impl ClusterStore for InMemoryStore {
    async fn get(&self, key: &ObjectKey) -> Result<Option<DynamicObject>, StoreError> {
        Ok(self.object(key))
    }

    async fn create(&self, obj: &DynamicObject) -> Result<DynamicObject, StoreError> {
        self.check_writable()?;
        let key = ObjectKey::from_object(obj).ok_or(StoreError::InvalidObject)?;
        let mut objects = self.objects.lock().expect("store lock");
        if objects.contains_key(&key) {
            return Err(StoreError::AlreadyExists(key));
        }
        let mut stored = obj.clone();
        stored.metadata.resource_version = Some(self.next_version());
        objects.insert(key, stored.clone());
        self.mutations.fetch_add(1, Ordering::SeqCst);
        Ok(stored)
    }

    async fn update(&self, obj: &DynamicObject) -> Result<DynamicObject, StoreError> {
        self.check_writable()?;
        let key = ObjectKey::from_object(obj).ok_or(StoreError::InvalidObject)?;
        let mut objects = self.objects.lock().expect("store lock");
        let current = objects
            .get(&key)
            .ok_or_else(|| StoreError::NotFound(key.clone()))?;
        if obj.metadata.resource_version != current.metadata.resource_version {
            return Err(StoreError::Conflict(key));
        }
        let mut stored = obj.clone();
        stored.metadata.resource_version = Some(self.next_version());
        objects.insert(key, stored.clone());
        self.mutations.fetch_add(1, Ordering::SeqCst);
        Ok(stored)
    }

    async fn delete(&self, key: &ObjectKey) -> Result<(), StoreError> {
        self.check_writable()?;
        if self.objects.lock().expect("store lock").remove(key).is_some() {
            self.mutations.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }

    async fn update_status(&self, obj: &DynamicObject) -> Result<(), StoreError> {
        let key = ObjectKey::from_object(obj).ok_or(StoreError::InvalidObject)?;
        let mut objects = self.objects.lock().expect("store lock");
        let current = objects
            .get_mut(&key)
            .ok_or_else(|| StoreError::NotFound(key.clone()))?;
        if let Some(status) = obj.data.get("status") {
            current.data["status"] = status.clone();
        }
        current.metadata.resource_version = Some(self.next_version());
        self.mutations.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::core::v1::ConfigMap;
    use kube::api::ObjectMeta;

    fn config_map() -> ConfigMap {
        ConfigMap {
            metadata: ObjectMeta {
                name: Some("cm".to_string()),
                namespace: Some("ns".to_string()),
                ..ObjectMeta::default()
            },
            ..ConfigMap::default()
        }
    }

    #[tokio::test]
    async fn test_stale_update_conflicts() {
        let store = InMemoryStore::new();
        store.insert(&config_map());
        let key = ObjectKey::of::<ConfigMap>(Some("ns"), "cm");

        let first = store.get(&key).await.unwrap().unwrap();
        let stale = first.clone();
        store.update(&first).await.expect("fresh update succeeds");

        assert!(matches!(
            store.update(&stale).await,
            Err(StoreError::Conflict(_))
        ));
        assert_eq!(store.mutations(), 1);
    }

    #[tokio::test]
    async fn test_create_existing_fails() {
        let store = InMemoryStore::new();
        store.insert(&config_map());
        let obj = to_dynamic(&config_map()).unwrap();

        assert!(matches!(
            store.create(&obj).await,
            Err(StoreError::AlreadyExists(_))
        ));
    }
}
