// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

/// The operator name used for field management and as the default cache label value
pub const OPERATOR_NAME: &str = "pg-operator";

/// API group served by the operator's custom resources
pub const API_GROUP: &str = "postgresql.cnpg.io";

/// API version served by the operator's custom resources
pub const API_VERSION: &str = "v1";

/// Kubernetes label keys used by the operator
pub mod labels {
    /// Default cache label key, set on every object the operator manages
    pub const MANAGED_BY: &str = "app.kubernetes.io/managed-by";
    /// Marks a Service as the endpoint of a sidecar plugin
    pub const PLUGIN_NAME: &str = "cnpg.io/pluginName";
}

/// Webhook server configuration
pub mod webhook {
    /// Certificate directory used when the operator manages its own PKI
    pub const DEFAULT_CERT_DIR: &str = "/run/secrets/cnpg.io/webhook";
    /// Certificate filename when the operator manages its own PKI
    pub const SELF_MANAGED_CERT_NAME: &str = "tls.crt";
    /// Key filename when the operator manages its own PKI
    pub const SELF_MANAGED_KEY_NAME: &str = "tls.key";
    /// Certificate filename used by external certificate managers (OLM)
    pub const EXTERNAL_CERT_NAME: &str = "apiserver.crt";
    /// Key filename used by external certificate managers (OLM)
    pub const EXTERNAL_KEY_NAME: &str = "apiserver.key";
    /// Default listening port
    pub const DEFAULT_PORT: u16 = 9443;
}

/// Leader election configuration
pub mod leader {
    /// Name of the Lease object guarding the controllers
    pub const LEASE_NAME: &str = "pg-operator-leader";
    pub const DEFAULT_LEASE_DURATION_SECS: u64 = 15;
    pub const DEFAULT_RENEW_DEADLINE_SECS: u64 = 10;
    /// Interval between acquire attempts while another instance leads
    pub const RETRY_PERIOD_SECS: u64 = 2;
}

/// Diagnostics server configuration
pub mod diagnostics {
    pub const DEFAULT_ADDR: &str = "0.0.0.0:6060";
    /// Grace period granted to the diagnostics server on shutdown
    pub const SHUTDOWN_GRACE_PERIOD_SECS: u64 = 5;
}

/// Default timeout applied to each capability probe
pub const DEFAULT_PROBE_TIMEOUT_SECS: u64 = 10;

/// Default directory scanned for sidecar plugin sockets
pub const DEFAULT_PLUGIN_SOCKET_DIR: &str = "/plugins";
