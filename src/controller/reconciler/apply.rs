//! # Change-set Application
//!
//! Creates, updates and deletes rendered objects.
//!
//! Every applied object is labelled `app.kubernetes.io/managed-by` and owned by
//! the ImageAssurance resource. An existing object is left untouched when the
//! desired object is a subset of it, so server-side defaults never cause a
//! write. Deletions only touch objects carrying the managed-by label.

use crate::constants::{CONTROLLER_NAME, MANAGED_BY_LABEL};
use crate::controller::store::{ClusterStore, ObjectKey, StoreError};
use crate::render::RenderedObjects;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::api::DynamicObject;
use serde_json::{Map, Value};
use tracing::{debug, info};

/// Counts of what one apply pass did
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ApplyReport {
    pub created: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub deleted: usize,
}

impl ApplyReport {
    pub fn is_noop(&self) -> bool {
        self.created == 0 && self.updated == 0 && self.deleted == 0
    }
}

/// Metadata fields the operator manages; everything else is server-owned
const MANAGED_METADATA: [&str; 5] = ["name", "namespace", "labels", "annotations", "ownerReferences"];

/// Apply `rendered`, stopping at the first failing write
#[allow(
    clippy::missing_errors_doc,
    reason = "Error documentation is provided in doc comments"
)]
pub async fn apply(
    store: &dyn ClusterStore,
    owner: Option<&OwnerReference>,
    rendered: &RenderedObjects,
) -> Result<ApplyReport, StoreError> {
    let mut report = ApplyReport::default();

    for desired in &rendered.to_create {
        let key = ObjectKey::from_object(desired).ok_or(StoreError::InvalidObject)?;
        let desired = desired_value(desired, owner)?;

        match store.get(&key).await? {
            None => {
                store.create(&from_value(&key, desired)?).await?;
                debug!("Created {}", key);
                report.created += 1;
            }
            Some(existing) => {
                let mut merged = to_value(&key, &existing)?;
                if is_subset(&desired, &merged) {
                    report.unchanged += 1;
                    continue;
                }
                merge(&mut merged, &desired);
                store.update(&from_value(&key, merged)?).await?;
                debug!("Updated {}", key);
                report.updated += 1;
            }
        }
    }

    for key in &rendered.to_delete {
        let Some(existing) = store.get(key).await? else {
            continue;
        };
        if !is_managed(&existing) {
            debug!("Not deleting {}: not managed by {}", key, CONTROLLER_NAME);
            continue;
        }
        store.delete(key).await?;
        info!("🗑️  Deleted {}", key);
        report.deleted += 1;
    }

    Ok(report)
}

pub fn is_managed(obj: &DynamicObject) -> bool {
    obj.metadata
        .labels
        .as_ref()
        .and_then(|l| l.get(MANAGED_BY_LABEL))
        .is_some_and(|v| v == CONTROLLER_NAME)
}

fn to_value(key: &ObjectKey, obj: &DynamicObject) -> Result<Value, StoreError> {
    serde_json::to_value(obj).map_err(|source| StoreError::Serialization {
        kind: key.kind.clone(),
        source,
    })
}

fn from_value(key: &ObjectKey, value: Value) -> Result<DynamicObject, StoreError> {
    serde_json::from_value(value).map_err(|source| StoreError::Serialization {
        kind: key.kind.clone(),
        source,
    })
}

/// Desired object as JSON with the managed label, owner and only the
/// operator-managed metadata
fn desired_value(
    desired: &DynamicObject,
    owner: Option<&OwnerReference>,
) -> Result<Value, StoreError> {
    let key = ObjectKey::from_object(desired).ok_or(StoreError::InvalidObject)?;
    let mut obj = desired.clone();
    obj.metadata
        .labels
        .get_or_insert_with(Default::default)
        .insert(MANAGED_BY_LABEL.to_string(), CONTROLLER_NAME.to_string());
    if let Some(owner) = owner {
        obj.metadata.owner_references = Some(vec![owner.clone()]);
    }

    let mut value = to_value(&key, &obj)?;
    if let Some(Value::Object(metadata)) = value.get_mut("metadata") {
        metadata.retain(|field, _| MANAGED_METADATA.contains(&field.as_str()));
    }
    Ok(value)
}

/// Every field of `desired` is present with an equal value in `existing`
fn is_subset(desired: &Value, existing: &Value) -> bool {
    match (desired, existing) {
        (Value::Object(d), Value::Object(e)) => d
            .iter()
            .all(|(k, v)| v.is_null() || e.get(k).is_some_and(|ev| is_subset(v, ev))),
        (Value::Array(d), Value::Array(e)) => {
            d.len() == e.len() && d.iter().zip(e).all(|(a, b)| is_subset(a, b))
        }
        _ => desired == existing,
    }
}

/// Overlay `desired` onto `target`: objects merge, everything else replaces
fn merge(target: &mut Value, desired: &Value) {
    match (target, desired) {
        (Value::Object(t), Value::Object(d)) => merge_maps(t, d),
        (t, d) if !d.is_null() => *t = d.clone(),
        _ => {}
    }
}

fn merge_maps(target: &mut Map<String, Value>, desired: &Map<String, Value>) {
    for (k, v) in desired {
        if v.is_null() {
            continue;
        }
        match target.get_mut(k) {
            Some(existing) => merge(existing, v),
            None => {
                target.insert(k.clone(), v.clone());
            }
        }
    }
}
