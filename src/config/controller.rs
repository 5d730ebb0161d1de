//! # Controller Configuration
//!
//! Reconciler and config sync settings loaded from environment variables.

use super::env_var_or_default;
use crate::constants::MIN_TICK_PERIOD;
use std::time::Duration;

/// Operator configuration for the reconciler and the config sync actor
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// Namespace the operator runs in; prerequisite secrets live here
    pub operator_namespace: String,
    /// Cluster DNS domain used for service certificate names
    pub cluster_domain: String,
    /// Base URL of the Image Assurance API
    pub api_endpoint: String,
    /// Interval between periodic config syncs
    pub config_sync_interval_secs: u64,
    /// Per-request timeout for the Image Assurance API client
    pub config_sync_http_timeout_secs: u64,
    /// How often deployment readiness is refreshed for the status manager
    pub status_refresh_interval_secs: u64,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        use crate::constants::*;
        Self {
            operator_namespace: DEFAULT_OPERATOR_NAMESPACE.to_string(),
            cluster_domain: DEFAULT_CLUSTER_DOMAIN.to_string(),
            api_endpoint: DEFAULT_API_ENDPOINT.to_string(),
            config_sync_interval_secs: DEFAULT_CONFIG_SYNC_INTERVAL_SECS,
            config_sync_http_timeout_secs: DEFAULT_CONFIG_SYNC_HTTP_TIMEOUT_SECS,
            status_refresh_interval_secs: DEFAULT_STATUS_REFRESH_INTERVAL_SECS,
        }
    }
}

impl ControllerConfig {
    /// Load configuration from environment variables with defaults
    pub fn from_env() -> Self {
        use crate::constants::*;
        Self {
            operator_namespace: env_var_or_default(
                "OPERATOR_NAMESPACE",
                DEFAULT_OPERATOR_NAMESPACE.to_string(),
            ),
            cluster_domain: env_var_or_default("CLUSTER_DOMAIN", DEFAULT_CLUSTER_DOMAIN.to_string()),
            api_endpoint: env_var_or_default(
                "IMAGE_ASSURANCE_API_ENDPOINT",
                DEFAULT_API_ENDPOINT.to_string(),
            ),
            config_sync_interval_secs: env_var_or_default(
                "CONFIG_SYNC_INTERVAL_SECS",
                DEFAULT_CONFIG_SYNC_INTERVAL_SECS,
            ),
            config_sync_http_timeout_secs: env_var_or_default(
                "CONFIG_SYNC_HTTP_TIMEOUT_SECS",
                DEFAULT_CONFIG_SYNC_HTTP_TIMEOUT_SECS,
            ),
            status_refresh_interval_secs: env_var_or_default(
                "STATUS_REFRESH_INTERVAL_SECS",
                DEFAULT_STATUS_REFRESH_INTERVAL_SECS,
            ),
        }
    }

    /// Never shorter than [`MIN_TICK_PERIOD`]
    pub fn config_sync_interval(&self) -> Duration {
        Duration::from_secs(self.config_sync_interval_secs).max(MIN_TICK_PERIOD)
    }

    pub fn config_sync_http_timeout(&self) -> Duration {
        Duration::from_secs(self.config_sync_http_timeout_secs)
    }

    /// Never shorter than [`MIN_TICK_PERIOD`]
    pub fn status_refresh_interval(&self) -> Duration {
        Duration::from_secs(self.status_refresh_interval_secs).max(MIN_TICK_PERIOD)
    }
}
