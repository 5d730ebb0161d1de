//! # Component Images
//!
//! Image references for the Image Assurance components.
//!
//! A reference is `<registry><path>/<prefix><name>` followed by `@<digest>` when
//! an [`ImageSet`] pins the image, or `:<version>` otherwise. The image set for
//! a product variant is named `<variant-prefix>-<release>`.

use crate::crd::{ImageSet, ProductVariant};
use regex::Regex;
use std::sync::LazyLock;

/// Release the bundled component versions belong to
pub const RELEASE: &str = "v3.15.0";

pub const DEFAULT_REGISTRY: &str = "quay.io/";

/// A deployable image
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Component {
    /// Image name including its default path, e.g. `tigera/image-assurance-api`
    pub image: &'static str,
    pub version: &'static str,
}

pub const COMPONENT_API: Component = Component {
    image: "tigera/image-assurance-api",
    version: "v1.7.3",
};

pub const COMPONENT_SCANNER: Component = Component {
    image: "tigera/image-assurance-scanner",
    version: "v1.7.3",
};

pub const COMPONENT_CAW: Component = Component {
    image: "tigera/image-assurance-admission-controller-webhook",
    version: "v1.7.3",
};

pub const COMPONENT_DB_MIGRATOR: Component = Component {
    image: "tigera/image-assurance-db-migrator",
    version: "v1.7.3",
};

/// Every component an image set may pin
pub const ALL_COMPONENTS: [Component; 4] = [
    COMPONENT_API,
    COMPONENT_SCANNER,
    COMPONENT_CAW,
    COMPONENT_DB_MIGRATOR,
];

static DIGEST_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^sha256:[0-9a-f]{64}$").expect("digest pattern is valid - this should never happen")
});

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ImageSetError {
    #[error("ImageSet {set} does not contain image {image}")]
    MissingImage { set: String, image: String },
    #[error("ImageSet {set} lists unknown image {image}")]
    UnknownImage { set: String, image: String },
    #[error("ImageSet {set} has invalid digest {digest:?} for image {image}")]
    InvalidDigest {
        set: String,
        image: String,
        digest: String,
    },
}

/// Name of the image set that pins images for `variant`
pub fn image_set_name(variant: ProductVariant) -> String {
    format!("{}-{}", variant.image_set_prefix(), RELEASE)
}

/// Build the image reference for `component`
///
/// `image_path` replaces the default path of the image and `image_prefix` is
/// prepended to its final segment.
#[allow(
    clippy::missing_errors_doc,
    reason = "Error documentation is provided in doc comments"
)]
pub fn reference(
    component: Component,
    registry: Option<&str>,
    image_path: Option<&str>,
    image_prefix: Option<&str>,
    image_set: Option<&ImageSet>,
) -> Result<String, ImageSetError> {
    let registry = match registry.filter(|r| !r.is_empty()) {
        Some(r) if r.ends_with('/') => r.to_string(),
        Some(r) => format!("{r}/"),
        None => DEFAULT_REGISTRY.to_string(),
    };

    let (default_path, name) = component
        .image
        .rsplit_once('/')
        .unwrap_or(("", component.image));
    let path = image_path
        .filter(|p| !p.is_empty())
        .unwrap_or(default_path)
        .trim_matches('/');
    let name = format!("{}{}", image_prefix.unwrap_or_default(), name);
    let image = if path.is_empty() {
        name
    } else {
        format!("{path}/{name}")
    };

    let Some(set) = image_set else {
        return Ok(format!("{registry}{image}:{}", component.version));
    };

    set.spec
        .images
        .iter()
        .find(|i| i.image == component.image)
        .map(|i| format!("{registry}{image}@{}", i.digest))
        .ok_or_else(|| ImageSetError::MissingImage {
            set: set.metadata.name.clone().unwrap_or_default(),
            image: component.image.to_string(),
        })
}

/// Check that every image in the set is a known component pinned by sha256 digest
#[allow(
    clippy::missing_errors_doc,
    reason = "Error documentation is provided in doc comments"
)]
pub fn validate_image_set(set: &ImageSet) -> Result<(), ImageSetError> {
    let name = set.metadata.name.clone().unwrap_or_default();
    for entry in &set.spec.images {
        if !ALL_COMPONENTS.iter().any(|c| c.image == entry.image) {
            return Err(ImageSetError::UnknownImage {
                set: name,
                image: entry.image.clone(),
            });
        }
        if !DIGEST_PATTERN.is_match(&entry.digest) {
            return Err(ImageSetError::InvalidDigest {
                set: name,
                image: entry.image.clone(),
                digest: entry.digest.clone(),
            });
        }
    }
    Ok(())
}
