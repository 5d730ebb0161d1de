//! # TLS Certificates
//!
//! Validation of existing key/certificate secrets and minting of self-signed
//! service certificates.
//!
//! A certificate is reused only while its subject alternative names cover
//! every expected service DNS name. Initial creation and regeneration both go
//! through [`mint_certificate_secret`].

use super::dependencies::secret_value;
use crate::controller::store::{get_typed, ClusterStore, StoreError};
use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::ByteString;
use kube::api::ObjectMeta;
use std::collections::BTreeMap;
use tracing::info;
use x509_parser::extensions::GeneralName;
use x509_parser::pem::parse_x509_pem;

#[derive(Debug, thiserror::Error)]
pub enum CertificateError {
    #[error("expected secret {secret:?} to have a field named {field:?}")]
    MissingField { secret: String, field: String },
    #[error("invalid certificate PEM: {0}")]
    InvalidPem(String),
    #[error("failed to generate certificate: {0}")]
    Generation(#[from] rcgen::Error),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// DNS names a cluster service is reachable under
pub fn service_dns_names(service: &str, namespace: &str, cluster_domain: &str) -> Vec<String> {
    vec![
        service.to_string(),
        format!("{service}.{namespace}"),
        format!("{service}.{namespace}.svc"),
        format!("{service}.{namespace}.svc.{cluster_domain}"),
    ]
}

/// Read a key/certificate secret
///
/// Returns `Ok(None)` if the secret does not exist and an error if either
/// field is missing or empty.
#[allow(
    clippy::missing_errors_doc,
    reason = "Error documentation is provided in doc comments"
)]
pub async fn validate_cert_pair(
    store: &dyn ClusterStore,
    namespace: &str,
    name: &str,
    key_field: &str,
    cert_field: &str,
) -> Result<Option<Secret>, CertificateError> {
    let Some(secret) = get_typed::<Secret>(store, Some(namespace), name).await? else {
        return Ok(None);
    };
    for field in [key_field, cert_field] {
        if secret_value(&secret, field).is_none() {
            return Err(CertificateError::MissingField {
                secret: name.to_string(),
                field: field.to_string(),
            });
        }
    }
    Ok(Some(secret))
}

/// DNS subject alternative names of a PEM certificate
#[allow(
    clippy::missing_errors_doc,
    reason = "Error documentation is provided in doc comments"
)]
pub fn certificate_dns_names(pem: &[u8]) -> Result<Vec<String>, CertificateError> {
    let (_, pem) = parse_x509_pem(pem).map_err(|e| CertificateError::InvalidPem(e.to_string()))?;
    let cert = pem
        .parse_x509()
        .map_err(|e| CertificateError::InvalidPem(e.to_string()))?;
    let names = cert
        .subject_alternative_name()
        .map_err(|e| CertificateError::InvalidPem(e.to_string()))?
        .map(|san| {
            san.value
                .general_names
                .iter()
                .filter_map(|name| match name {
                    GeneralName::DNSName(dns) => Some((*dns).to_string()),
                    _ => None,
                })
                .collect()
        })
        .unwrap_or_default();
    Ok(names)
}

/// Mint a self-signed certificate secret for `dns_names`
#[allow(
    clippy::missing_errors_doc,
    reason = "Error documentation is provided in doc comments"
)]
pub fn mint_certificate_secret(
    name: &str,
    namespace: &str,
    key_field: &str,
    cert_field: &str,
    dns_names: &[String],
) -> Result<Secret, CertificateError> {
    let certified = rcgen::generate_simple_self_signed(dns_names.to_vec())?;
    Ok(Secret {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(namespace.to_string()),
            ..ObjectMeta::default()
        },
        type_: Some("kubernetes.io/tls".to_string()),
        data: Some(BTreeMap::from([
            (
                key_field.to_string(),
                ByteString(certified.key_pair.serialize_pem().into_bytes()),
            ),
            (
                cert_field.to_string(),
                ByteString(certified.cert.pem().into_bytes()),
            ),
        ])),
        ..Secret::default()
    })
}

/// Keep `existing` if it covers `dns_names`, otherwise mint a replacement
///
/// Returns the secret and whether it was newly minted.
#[allow(
    clippy::missing_errors_doc,
    reason = "Error documentation is provided in doc comments"
)]
pub fn ensure_certificate_secret(
    name: &str,
    namespace: &str,
    existing: Option<Secret>,
    key_field: &str,
    cert_field: &str,
    dns_names: &[String],
) -> Result<(Secret, bool), CertificateError> {
    if let Some(secret) = existing {
        let cert = secret_value(&secret, cert_field).ok_or_else(|| {
            CertificateError::MissingField {
                secret: name.to_string(),
                field: cert_field.to_string(),
            }
        })?;
        // An unparsable certificate is replaced like one with stale names
        let covered = certificate_dns_names(cert)
            .map(|names| dns_names.iter().all(|n| names.contains(n)))
            .unwrap_or(false);
        if covered {
            return Ok((secret, false));
        }
        info!("🔐 Certificate {}/{} does not cover expected DNS names, regenerating", namespace, name);
    } else {
        info!("🔐 Creating certificate {}/{}", namespace, name);
    }

    let minted = mint_certificate_secret(name, namespace, key_field, cert_field, dns_names)?;
    Ok((minted, true))
}
