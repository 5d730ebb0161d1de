//! # Image Reference Tests
//!
//! Image naming rules for the Image Assurance components:
//! - Registry, path and prefix overrides from the Installation
//! - Digest pinning through an ImageSet
//! - ImageSet validation

use image_assurance_operator::crd::{ImageDigest, ImageSet, ImageSetSpec, ProductVariant};
use image_assurance_operator::render::components::{
    image_set_name, reference, validate_image_set, ImageSetError, COMPONENT_API,
    COMPONENT_DB_MIGRATOR, COMPONENT_SCANNER, RELEASE,
};

const DIGEST: &str = "sha256:fedcba9876543210fedcba9876543210fedcba9876543210fedcba9876543210";

fn image_set(images: &[(&str, &str)]) -> ImageSet {
    ImageSet::new(
        &image_set_name(ProductVariant::TigeraSecureEnterprise),
        ImageSetSpec {
            images: images
                .iter()
                .map(|(image, digest)| ImageDigest {
                    image: (*image).to_string(),
                    digest: (*digest).to_string(),
                })
                .collect(),
        },
    )
}

#[test]
fn test_default_reference_uses_quay_and_version() {
    let image = reference(COMPONENT_API, None, None, None, None).unwrap();
    assert_eq!(
        image,
        format!("quay.io/tigera/image-assurance-api:{}", COMPONENT_API.version)
    );
}

#[test]
fn test_private_registry_with_path_and_prefix() {
    let image = reference(
        COMPONENT_SCANNER,
        Some("registry.corp.example"),
        Some("mirror/calico"),
        Some("corp-"),
        None,
    )
    .unwrap();
    assert_eq!(
        image,
        format!(
            "registry.corp.example/mirror/calico/corp-image-assurance-scanner:{}",
            COMPONENT_SCANNER.version
        )
    );
}

#[test]
fn test_image_set_pins_digest() {
    let set = image_set(&[(COMPONENT_DB_MIGRATOR.image, DIGEST)]);
    let image = reference(COMPONENT_DB_MIGRATOR, Some("quay.io/"), None, None, Some(&set)).unwrap();
    assert_eq!(
        image,
        format!("quay.io/tigera/image-assurance-db-migrator@{DIGEST}")
    );
}

#[test]
fn test_image_set_without_component_is_an_error() {
    let set = image_set(&[(COMPONENT_DB_MIGRATOR.image, DIGEST)]);
    let err = reference(COMPONENT_API, None, None, None, Some(&set)).unwrap_err();
    assert!(matches!(err, ImageSetError::MissingImage { .. }));
}

#[test]
fn test_image_set_name_per_variant() {
    assert_eq!(
        image_set_name(ProductVariant::TigeraSecureEnterprise),
        format!("enterprise-{RELEASE}")
    );
    assert_eq!(
        image_set_name(ProductVariant::Calico),
        format!("calico-{RELEASE}")
    );
}

#[test]
fn test_validate_image_set() {
    assert!(validate_image_set(&image_set(&[(COMPONENT_API.image, DIGEST)])).is_ok());

    let unknown = image_set(&[("tigera/not-a-component", DIGEST)]);
    assert!(matches!(
        validate_image_set(&unknown),
        Err(ImageSetError::UnknownImage { .. })
    ));

    let tagged = image_set(&[(COMPONENT_API.image, "v1.7.3")]);
    assert!(matches!(
        validate_image_set(&tagged),
        Err(ImageSetError::InvalidDigest { .. })
    ));
}
