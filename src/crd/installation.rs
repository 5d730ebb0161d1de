//! # Upstream Operator Resources
//!
//! Read-only views of the `Installation`, `ImageSet` and `Authentication`
//! resources. Only the fields the Image Assurance reconciler consumes are
//! modelled; unknown fields are ignored on deserialization.

use serde::{Deserialize, Serialize};

/// Product variant being installed
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default, schemars::JsonSchema)]
pub enum ProductVariant {
    #[default]
    Calico,
    TigeraSecureEnterprise,
}

impl ProductVariant {
    /// Prefix used to name the ImageSet for this variant
    pub fn image_set_prefix(self) -> &'static str {
        match self {
            ProductVariant::Calico => "calico",
            ProductVariant::TigeraSecureEnterprise => "enterprise",
        }
    }
}

/// Reference to an image pull secret in the operator namespace
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq, schemars::JsonSchema)]
pub struct PullSecretRef {
    pub name: String,
}

/// Installation Custom Resource Definition
///
/// Cluster-scoped singleton named `default`. The `status.computed` field holds
/// the fully defaulted spec and is preferred over `spec` when present.
#[derive(kube::CustomResource, Debug, Clone, Default, Deserialize, Serialize, schemars::JsonSchema)]
#[kube(
    kind = "Installation",
    group = "operator.tigera.io",
    version = "v1",
    status = "InstallationStatus"
)]
#[serde(rename_all = "camelCase")]
pub struct InstallationSpec {
    #[serde(default)]
    pub variant: Option<ProductVariant>,
    /// Registry to pull images from, e.g. `quay.io/`
    #[serde(default)]
    pub registry: Option<String>,
    /// Path override inserted between registry and image name
    #[serde(default)]
    pub image_path: Option<String>,
    /// Prefix prepended to each image name
    #[serde(default)]
    pub image_prefix: Option<String>,
    #[serde(default)]
    pub image_pull_secrets: Vec<PullSecretRef>,
    #[serde(default)]
    pub kubernetes_provider: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct InstallationStatus {
    #[serde(default)]
    pub variant: Option<ProductVariant>,
    #[serde(default)]
    pub image_set: Option<String>,
    #[serde(default)]
    pub computed: Option<InstallationSpec>,
}

impl Installation {
    /// Effective variant and spec: the computed spec when the installation
    /// controller has published one, the raw spec otherwise
    pub fn effective(&self) -> (ProductVariant, InstallationSpec) {
        let status = self.status.as_ref();
        let spec = status
            .and_then(|s| s.computed.clone())
            .unwrap_or_else(|| self.spec.clone());
        let variant = status
            .and_then(|s| s.variant)
            .or(spec.variant)
            .unwrap_or_default();
        (variant, spec)
    }
}

/// Digest pinned for a single component image
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq, schemars::JsonSchema)]
pub struct ImageDigest {
    /// Image name without registry, e.g. `tigera/image-assurance-api`
    pub image: String,
    /// Content digest, e.g. `sha256:...`
    pub digest: String,
}

/// ImageSet Custom Resource Definition
///
/// Pins component images to digests for one release. Named
/// `<variant-prefix>-<release>`.
#[derive(kube::CustomResource, Debug, Clone, Default, Deserialize, Serialize, schemars::JsonSchema)]
#[kube(kind = "ImageSet", group = "operator.tigera.io", version = "v1")]
#[serde(rename_all = "camelCase")]
pub struct ImageSetSpec {
    #[serde(default)]
    pub images: Vec<ImageDigest>,
}

/// OIDC settings of the Authentication resource
#[derive(Debug, Clone, Deserialize, Serialize, Default, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct AuthenticationOidc {
    #[serde(default, rename = "issuerURL")]
    pub issuer_url: Option<String>,
    #[serde(default)]
    pub username_claim: Option<String>,
}

/// Authentication Custom Resource Definition
#[derive(kube::CustomResource, Debug, Clone, Default, Deserialize, Serialize, schemars::JsonSchema)]
#[kube(
    kind = "Authentication",
    group = "operator.tigera.io",
    version = "v1",
    status = "AuthenticationStatus"
)]
#[serde(rename_all = "camelCase")]
pub struct AuthenticationSpec {
    /// Domain the manager UI is served from
    #[serde(default)]
    pub manager_domain: String,
    #[serde(default)]
    pub oidc: Option<AuthenticationOidc>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct AuthenticationStatus {
    #[serde(default)]
    pub state: Option<String>,
}
