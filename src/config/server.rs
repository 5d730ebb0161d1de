//! # Probe Server Configuration
//!
//! Bind address and startup wait of the health/metrics endpoint.

use super::env_var_or_default;
use crate::constants::{
    DEFAULT_METRICS_PORT, DEFAULT_SERVER_POLL_INTERVAL_MS, DEFAULT_SERVER_STARTUP_TIMEOUT_SECS,
};
use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;

/// Health, readiness and `/metrics` endpoint settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// Listens on every interface; kubelet probes and Prometheus scrape the pod IP
    pub port: u16,
    /// Initialization fails if the listener is not bound within this time
    pub startup_timeout: Duration,
    pub readiness_poll: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::from_parts(
            DEFAULT_METRICS_PORT,
            DEFAULT_SERVER_STARTUP_TIMEOUT_SECS,
            DEFAULT_SERVER_POLL_INTERVAL_MS,
        )
    }
}

impl ServerConfig {
    /// `METRICS_PORT`, `SERVER_STARTUP_TIMEOUT_SECS`, `SERVER_POLL_INTERVAL_MS`
    pub fn from_env() -> Self {
        Self::from_parts(
            env_var_or_default("METRICS_PORT", DEFAULT_METRICS_PORT),
            env_var_or_default(
                "SERVER_STARTUP_TIMEOUT_SECS",
                DEFAULT_SERVER_STARTUP_TIMEOUT_SECS,
            ),
            env_var_or_default("SERVER_POLL_INTERVAL_MS", DEFAULT_SERVER_POLL_INTERVAL_MS),
        )
    }

    /// The poll is at least 1 ms and never longer than the startup timeout
    fn from_parts(port: u16, startup_timeout_secs: u64, poll_interval_ms: u64) -> Self {
        let startup_timeout = Duration::from_secs(startup_timeout_secs);
        let readiness_poll = Duration::from_millis(poll_interval_ms.max(1)).min(
            startup_timeout.max(Duration::from_millis(1)),
        );
        Self {
            port,
            startup_timeout,
            readiness_poll,
        }
    }

    pub fn bind_addr(&self) -> SocketAddr {
        SocketAddr::from((Ipv4Addr::UNSPECIFIED, self.port))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ServerConfig::default();
        assert_eq!(config.bind_addr().to_string(), "0.0.0.0:8080");
        assert_eq!(config.startup_timeout, Duration::from_secs(10));
        assert_eq!(config.readiness_poll, Duration::from_millis(50));
    }

    #[test]
    fn test_zero_poll_interval_is_raised() {
        let config = ServerConfig::from_parts(9090, 10, 0);
        assert_eq!(config.readiness_poll, Duration::from_millis(1));
    }

    #[test]
    fn test_poll_never_exceeds_startup_timeout() {
        let config = ServerConfig::from_parts(9090, 1, 5_000);
        assert_eq!(config.readiness_poll, Duration::from_secs(1));
    }
}
