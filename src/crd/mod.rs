//! # Custom Resource Definitions
//!
//! CRD types read and written by the operator.
//!
//! `ImageAssurance` is the primary resource the reconciler converges. The
//! `Installation`, `ImageSet` and `Authentication` resources are owned by other
//! controllers of the `operator.tigera.io` group and are only read here.

mod installation;
mod status;

pub use installation::*;
pub use status::*;

use serde::{Deserialize, Serialize};

/// ImageAssurance Custom Resource Definition
///
/// Enables Image Assurance in the cluster. The resource is a cluster-scoped
/// singleton named `tigera-secure`.
///
/// # Example
///
/// ```yaml
/// apiVersion: operator.tigera.io/v1
/// kind: ImageAssurance
/// metadata:
///   name: tigera-secure
/// spec: {}
/// ```
#[derive(kube::CustomResource, Debug, Clone, Default, Deserialize, Serialize, schemars::JsonSchema)]
#[kube(
    kind = "ImageAssurance",
    group = "operator.tigera.io",
    version = "v1",
    status = "ImageAssuranceStatus",
    printcolumn = r#"{"name":"State", "type":"string", "jsonPath":".status.state"}"#
)]
#[serde(rename_all = "camelCase")]
#[allow(
    clippy::empty_structs_with_brackets,
    reason = "CustomResource derive requires a braced struct"
)]
pub struct ImageAssuranceSpec {}

/// Status state reported once every component is available
pub const STATE_READY: &str = "Ready";
