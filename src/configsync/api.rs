//! # Image Assurance API Client
//!
//! Minimal client for the organization settings endpoint.
//!
//! The sync actor builds a fresh HTTPS client for every synchronization (the
//! token and certificate may rotate) and hands it to an [`ApiClientFactory`],
//! which wraps it into an [`OrganizationApi`].

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;
use reqwest::{Certificate, Client as ReqwestClient, StatusCode};
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("invalid API certificate: {0}")]
    Certificate(#[source] reqwest::Error),
    #[error("failed to build HTTP client: {0}")]
    ClientBuild(#[source] reqwest::Error),
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("unexpected response status {0}")]
    Status(StatusCode),
}

/// Organization as returned by the API; unknown fields are ignored
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Organization {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub settings: OrganizationSettings,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct OrganizationSettings {
    #[serde(default)]
    pub runtime_view_enabled: bool,
}

/// Read access to organization settings
#[cfg_attr(test, automock)]
#[async_trait]
pub trait OrganizationApi: Send + Sync {
    #[allow(
        clippy::missing_errors_doc,
        reason = "Error documentation is provided in doc comments"
    )]
    async fn get_organization(&self, org_id: &str) -> Result<Organization, ApiError>;
}

/// Builds an [`OrganizationApi`] from an HTTP client, base URL and bearer token
pub trait ApiClientFactory: Send + Sync {
    fn create(&self, http: ReqwestClient, base_url: &str, token: &str) -> Box<dyn OrganizationApi>;
}

/// HTTPS client trusting only `ca_pem`
#[allow(
    clippy::missing_errors_doc,
    reason = "Error documentation is provided in doc comments"
)]
pub fn https_client(ca_pem: &[u8], timeout: Duration) -> Result<ReqwestClient, ApiError> {
    let certificate = Certificate::from_pem(ca_pem).map_err(ApiError::Certificate)?;
    ReqwestClient::builder()
        .tls_built_in_root_certs(false)
        .add_root_certificate(certificate)
        .timeout(timeout)
        .build()
        .map_err(ApiError::ClientBuild)
}

/// REST client for the Image Assurance API
#[derive(Debug, Clone)]
pub struct BastClient {
    http: ReqwestClient,
    base_url: String,
    token: String,
}

impl BastClient {
    pub fn new(http: ReqwestClient, base_url: &str, token: &str) -> Self {
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.to_string(),
        }
    }

    fn organization_url(&self, org_id: &str) -> String {
        format!("{}/organizations/{}", self.base_url, org_id)
    }
}

#[async_trait]
impl OrganizationApi for BastClient {
    async fn get_organization(&self, org_id: &str) -> Result<Organization, ApiError> {
        let url = self.organization_url(org_id);
        debug!("Querying organization settings from {}", url);

        let response = self.http.get(&url).bearer_auth(&self.token).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ApiError::Status(status));
        }
        Ok(response.json::<Organization>().await?)
    }
}

/// Production factory producing [`BastClient`]s
#[derive(Debug, Clone, Copy, Default)]
pub struct BastClientFactory;

impl ApiClientFactory for BastClientFactory {
    fn create(&self, http: ReqwestClient, base_url: &str, token: &str) -> Box<dyn OrganizationApi> {
        Box::new(BastClient::new(http, base_url, token))
    }
}
