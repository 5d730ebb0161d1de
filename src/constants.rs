//! # Constants
//!
//! Resource names, data keys and default tunables shared by the reconciler,
//! the config sync actor and the runtime.

use std::time::Duration;

/// Field manager / managed-by value written on every applied object
pub const CONTROLLER_NAME: &str = "image-assurance-operator";

/// Label marking objects created by this operator
pub const MANAGED_BY_LABEL: &str = "app.kubernetes.io/managed-by";

/// Default namespace the operator runs in (overridden by `OPERATOR_NAMESPACE`)
pub const DEFAULT_OPERATOR_NAMESPACE: &str = "tigera-operator";

/// Namespace the Image Assurance components run in
pub const IMAGE_ASSURANCE_NAMESPACE: &str = "tigera-image-assurance";

/// Name of the singleton ImageAssurance and Authentication resources
pub const TIGERA_SECURE_NAME: &str = "tigera-secure";

/// Name of the singleton Installation resource
pub const INSTALLATION_NAME: &str = "default";

pub const DEFAULT_CLUSTER_DOMAIN: &str = "cluster.local";

// Postgres configuration (operator namespace)
pub const PG_CONFIG_MAP_NAME: &str = "tigera-image-assurance-postgres";
pub const PG_CONFIG_HOST_KEY: &str = "host";
pub const PG_CONFIG_NAME_KEY: &str = "name";
pub const PG_CONFIG_PORT_KEY: &str = "port";
pub const PG_CONFIG_ORG_ID_KEY: &str = "orgID";
pub const PG_CONFIG_ORG_NAME_KEY: &str = "orgName";

// Postgres credentials
pub const PG_USER_SECRET_NAME: &str = "tigera-image-assurance-postgres-user";
pub const PG_ADMIN_USER_SECRET_NAME: &str = "tigera-image-assurance-postgres-admin-user";
pub const PG_USER_KEY: &str = "username";
pub const PG_PASS_KEY: &str = "password";
pub const PG_PASSWORD_LENGTH: usize = 16;

// Postgres client TLS
pub const PG_CERT_SECRET_NAME: &str = "tigera-image-assurance-postgres-cert";
pub const PG_SERVER_CA_KEY: &str = "server-ca";
pub const PG_CLIENT_CERT_KEY: &str = "client-cert";
pub const PG_CLIENT_KEY_KEY: &str = "client-key";

// Manager internal TLS pair, issued by the manager controller
pub const MANAGER_INTERNAL_TLS_SECRET_NAME: &str = "internal-manager-tls";
pub const MANAGER_INTERNAL_SECRET_KEY_NAME: &str = "key";
pub const MANAGER_INTERNAL_SECRET_CERT_NAME: &str = "cert";

// Image Assurance API TLS pair
pub const API_CERT_SECRET_NAME: &str = "tigera-image-assurance-api-tls";
pub const TLS_PRIVATE_KEY_KEY: &str = "tls.key";
pub const TLS_CERT_KEY: &str = "tls.crt";

// Tenant encryption key
pub const TENANT_KEY_SECRET_NAME: &str = "tigera-image-assurance-tenant-encryption-key";
pub const TENANT_ENCRYPTION_KEY: &str = "encryption_key";

// Managed workloads
pub const DB_MIGRATOR_JOB_NAME: &str = "tigera-image-assurance-db-migrator";
pub const API_DEPLOYMENT_NAME: &str = "tigera-image-assurance-api";
pub const SCANNER_DEPLOYMENT_NAME: &str = "tigera-image-assurance-scanner";
pub const CAW_DEPLOYMENT_NAME: &str = "tigera-image-assurance-caw";

/// Deployments whose presence means the component is (at least partly) up
pub const COMPONENT_DEPLOYMENTS: [&str; 3] = [
    API_DEPLOYMENT_NAME,
    SCANNER_DEPLOYMENT_NAME,
    CAW_DEPLOYMENT_NAME,
];

// Configuration mirrored from the Image Assurance API
pub const CONFIGURATION_CONFIG_MAP_NAME: &str = "tigera-image-assurance-config";
pub const CONFIGURATION_ORG_ID_KEY: &str = "organizationID";
pub const CONFIGURATION_RUNTIME_VIEW_KEY: &str = "runtimeViewEnabled";

/// Service account whose token the operator uses against the Image Assurance API
pub const OPERATOR_API_ACCESS_SERVICE_ACCOUNT: &str = "tigera-image-assurance-operator-api-access";
pub const SERVICE_ACCOUNT_TOKEN_KEY: &str = "token";

pub const DEFAULT_API_ENDPOINT: &str =
    "https://tigera-image-assurance-api.tigera-image-assurance.svc:9443";

// Requeue delays
pub const MIGRATOR_CREATE_REQUEUE_SECS: u64 = 1;
pub const AVAILABILITY_REQUEUE_SECS: u64 = 30;

// Config sync defaults
pub const DEFAULT_CONFIG_SYNC_INTERVAL_SECS: u64 = 60;
pub const DEFAULT_CONFIG_SYNC_HTTP_TIMEOUT_SECS: u64 = 5;

/// How often the status manager re-reads deployment readiness
pub const DEFAULT_STATUS_REFRESH_INTERVAL_SECS: u64 = 10;

/// Shortest period a recurring timer is armed with; tokio rejects zero
pub const MIN_TICK_PERIOD: Duration = Duration::from_secs(1);

// Error back-off bounds (seconds)
pub const ERROR_BACKOFF_MIN_SECS: u64 = 5;
pub const ERROR_BACKOFF_MAX_SECS: u64 = 300;

// HTTP server
pub const DEFAULT_METRICS_PORT: u16 = 8080;
pub const DEFAULT_SERVER_STARTUP_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_SERVER_POLL_INTERVAL_MS: u64 = 50;
