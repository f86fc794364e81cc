// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0
use crate::capabilities::Capability;
use crate::constants::{self, labels, leader, OPERATOR_NAME};
use crate::error::{OperatorError, Result};
use anyhow::Context;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::env;
use std::net::SocketAddr;
use std::time::Duration;

/// Keys recognized in the configuration ConfigMap, Secret and environment
pub mod keys {
    pub const WATCH_NAMESPACE: &str = "WATCH_NAMESPACE";
    pub const CLUSTER_WIDE_CACHE_FILTER: &str = "CLUSTER_WIDE_CACHE_FILTER";
    pub const CACHE_LABEL_NAME: &str = "CACHE_LABEL_NAME";
    pub const CACHE_LABEL_VALUE: &str = "CACHE_LABEL_VALUE";
    pub const MANDATORY_LABELS: &str = "MANDATORY_LABELS";
    pub const MANDATORY_ANNOTATIONS: &str = "MANDATORY_ANNOTATIONS";
    pub const ENABLE_NODE_API: &str = "ENABLE_NODE_API";
    pub const ENABLE_POD_MONITOR_API: &str = "ENABLE_POD_MONITOR_API";
    pub const ENABLE_VOLUME_SNAPSHOT_API: &str = "ENABLE_VOLUME_SNAPSHOT_API";
    pub const ENABLE_CLUSTER_IMAGE_CATALOG_API: &str = "ENABLE_CLUSTER_IMAGE_CATALOG_API";
    pub const WEBHOOK_CERT_DIR: &str = "WEBHOOK_CERT_DIR";
    pub const PLUGIN_SOCKET_DIR: &str = "PLUGIN_SOCKET_DIR";
    pub const CA_SECRET_NAME: &str = "CA_SECRET_NAME";
    pub const WEBHOOK_SECRET_NAME: &str = "WEBHOOK_SECRET_NAME";
    pub const WEBHOOK_SERVICE_NAME: &str = "WEBHOOK_SERVICE_NAME";
    pub const MUTATING_WEBHOOK_NAME: &str = "MUTATING_WEBHOOK_NAME";
    pub const VALIDATING_WEBHOOK_NAME: &str = "VALIDATING_WEBHOOK_NAME";
    pub const OPERATOR_SELECTOR: &str = "OPERATOR_SELECTOR";

    pub const ALL: &[&str] = &[
        WATCH_NAMESPACE,
        CLUSTER_WIDE_CACHE_FILTER,
        CACHE_LABEL_NAME,
        CACHE_LABEL_VALUE,
        MANDATORY_LABELS,
        MANDATORY_ANNOTATIONS,
        ENABLE_NODE_API,
        ENABLE_POD_MONITOR_API,
        ENABLE_VOLUME_SNAPSHOT_API,
        ENABLE_CLUSTER_IMAGE_CATALOG_API,
        WEBHOOK_CERT_DIR,
        PLUGIN_SOCKET_DIR,
        CA_SECRET_NAME,
        WEBHOOK_SECRET_NAME,
        WEBHOOK_SERVICE_NAME,
        MUTATING_WEBHOOK_NAME,
        VALIDATING_WEBHOOK_NAME,
        OPERATOR_SELECTOR,
    ];
}

/// Process options read from the environment before anything touches the cluster
#[derive(Debug, Clone)]
pub struct StartupOptions {
    /// Namespace the operator runs in
    pub operator_namespace: String,
    /// Name of the optional configuration ConfigMap (empty disables it)
    pub config_map_name: String,
    /// Name of the optional configuration Secret (empty disables it)
    pub secret_name: String,
    pub webhook_port: u16,
    pub leader_election: LeaderElectionConfig,
    /// Address of the diagnostics server, when enabled
    pub debug_server: Option<SocketAddr>,
    /// Upper bound for each capability probe
    pub probe_timeout: Duration,
}

/// Leader election parameters handed to the manager
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeaderElectionConfig {
    pub enabled: bool,
    /// Identity written into the Lease holder field
    pub holder_id: String,
    pub lease_duration: Duration,
    pub renew_deadline: Duration,
    /// Pause between acquire attempts and between renewals
    pub retry_period: Duration,
}

impl StartupOptions {
    /// Load startup options from environment variables
    pub fn from_env() -> anyhow::Result<Self> {
        let operator_namespace = env::var("OPERATOR_NAMESPACE")
            .context("OPERATOR_NAMESPACE environment variable not set")?;
        let config_map_name =
            env::var("OPERATOR_CONFIG_MAP").unwrap_or_else(|_| format!("{}-config", OPERATOR_NAME));
        let secret_name =
            env::var("OPERATOR_SECRET").unwrap_or_else(|_| format!("{}-config", OPERATOR_NAME));

        let webhook_port = parse_env("WEBHOOK_PORT", constants::webhook::DEFAULT_PORT)?;
        let leader_enabled = parse_env("LEADER_ELECT", true)?;
        let lease_secs = parse_env("LEADER_LEASE_DURATION_SECS", leader::DEFAULT_LEASE_DURATION_SECS)?;
        let renew_secs = parse_env("LEADER_RENEW_DEADLINE_SECS", leader::DEFAULT_RENEW_DEADLINE_SECS)?;
        let retry_secs = parse_env("LEADER_RETRY_PERIOD_SECS", leader::RETRY_PERIOD_SECS)?;
        if renew_secs >= lease_secs {
            anyhow::bail!(
                "LEADER_RENEW_DEADLINE_SECS ({}) must be lower than LEADER_LEASE_DURATION_SECS ({})",
                renew_secs,
                lease_secs
            );
        }
        let holder_id = env::var("POD_NAME")
            .or_else(|_| env::var("HOSTNAME"))
            .unwrap_or_else(|_| OPERATOR_NAME.to_string());

        let debug_server = if parse_env("DEBUG_SERVER", false)? {
            let addr = env::var("DEBUG_SERVER_ADDR")
                .unwrap_or_else(|_| constants::diagnostics::DEFAULT_ADDR.to_string());
            Some(addr.parse().context("DEBUG_SERVER_ADDR is not a socket address")?)
        } else {
            None
        };

        let probe_timeout =
            Duration::from_secs(parse_env("PROBE_TIMEOUT_SECS", constants::DEFAULT_PROBE_TIMEOUT_SECS)?);

        Ok(StartupOptions {
            operator_namespace,
            config_map_name,
            secret_name,
            webhook_port,
            leader_election: LeaderElectionConfig {
                enabled: leader_enabled,
                holder_id,
                lease_duration: Duration::from_secs(lease_secs),
                renew_deadline: Duration::from_secs(renew_secs),
                retry_period: Duration::from_secs(retry_secs),
            },
            debug_server,
            probe_timeout,
        })
    }
}

fn parse_env<T>(name: &str, default: T) -> anyhow::Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("{} has an invalid value '{}'", name, raw)),
        Err(_) => Ok(default),
    }
}

/// A single label used as the cache filter key
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CacheLabel {
    pub name: String,
    pub value: String,
}

impl CacheLabel {
    /// Render as a Kubernetes equality label selector
    pub fn selector(&self) -> String {
        format!("{}={}", self.name, self.value)
    }
}

/// Optional capabilities of the surrounding cluster.
///
/// Flags can only be switched off once constructed: there is no way to turn a
/// disabled capability back on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FeatureFlags {
    node_api: bool,
    pod_monitor: bool,
    volume_snapshot: bool,
    cluster_image_catalog: bool,
}

impl Default for FeatureFlags {
    fn default() -> Self {
        Self {
            node_api: true,
            pod_monitor: true,
            volume_snapshot: true,
            cluster_image_catalog: true,
        }
    }
}

impl FeatureFlags {
    pub fn is_enabled(&self, capability: Capability) -> bool {
        *self.slot(capability)
    }

    /// Turn a capability off. Returns true when the flag actually changed.
    pub fn disable(&mut self, capability: Capability) -> bool {
        let slot = self.slot_mut(capability);
        std::mem::replace(slot, false)
    }

    /// Capabilities that are still enabled
    pub fn enabled(&self) -> impl Iterator<Item = Capability> + '_ {
        Capability::ALL.iter().copied().filter(|c| self.is_enabled(*c))
    }

    fn slot(&self, capability: Capability) -> &bool {
        match capability {
            Capability::NodeApi => &self.node_api,
            Capability::PodMonitor => &self.pod_monitor,
            Capability::VolumeSnapshot => &self.volume_snapshot,
            Capability::ClusterImageCatalog => &self.cluster_image_catalog,
        }
    }

    fn slot_mut(&mut self, capability: Capability) -> &mut bool {
        match capability {
            Capability::NodeApi => &mut self.node_api,
            Capability::PodMonitor => &mut self.pod_monitor,
            Capability::VolumeSnapshot => &mut self.volume_snapshot,
            Capability::ClusterImageCatalog => &mut self.cluster_image_catalog,
        }
    }
}

/// Names of the objects involved in the self-managed PKI
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PkiNames {
    pub ca_secret_name: String,
    pub webhook_secret_name: String,
    pub webhook_service_name: String,
    pub mutating_webhook_name: String,
    pub validating_webhook_name: String,
    pub operator_selector: String,
}

impl Default for PkiNames {
    fn default() -> Self {
        Self {
            ca_secret_name: format!("{}-ca-secret", OPERATOR_NAME),
            webhook_secret_name: format!("{}-webhook-cert", OPERATOR_NAME),
            webhook_service_name: format!("{}-webhook-service", OPERATOR_NAME),
            mutating_webhook_name: format!("{}-mutating-webhook-configuration", OPERATOR_NAME),
            validating_webhook_name: format!("{}-validating-webhook-configuration", OPERATOR_NAME),
            operator_selector: format!("app.kubernetes.io/name={}", OPERATOR_NAME),
        }
    }
}

/// Operator configuration, merged from the configuration sources during
/// bootstrap and read-only afterwards.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OperatorConfiguration {
    pub operator_namespace: String,
    /// Empty means cluster-wide
    pub watched_namespaces: BTreeSet<String>,
    pub cluster_wide_cache_filter: bool,
    pub cache_label: CacheLabel,
    /// Mandatory labels other than the cache label
    pub extra_mandatory_labels: BTreeMap<String, String>,
    pub mandatory_annotations: BTreeMap<String, String>,
    pub features: FeatureFlags,
    /// Non-empty when an external agent manages the webhook certificates
    pub webhook_cert_dir: String,
    pub plugin_socket_dir: String,
    pub pki: PkiNames,
}

impl OperatorConfiguration {
    /// Defaults for an operator running in the given namespace
    pub fn new(operator_namespace: impl Into<String>) -> Self {
        Self {
            operator_namespace: operator_namespace.into(),
            watched_namespaces: BTreeSet::new(),
            cluster_wide_cache_filter: false,
            cache_label: CacheLabel {
                name: labels::MANAGED_BY.to_string(),
                value: OPERATOR_NAME.to_string(),
            },
            extra_mandatory_labels: BTreeMap::new(),
            mandatory_annotations: BTreeMap::new(),
            features: FeatureFlags::default(),
            webhook_cert_dir: String::new(),
            plugin_socket_dir: constants::DEFAULT_PLUGIN_SOCKET_DIR.to_string(),
            pki: PkiNames::default(),
        }
    }

    /// Build the configuration from layered sources; later layers win on key collisions
    pub fn from_layers<'a, I>(operator_namespace: &str, layers: I) -> Result<Self>
    where
        I: IntoIterator<Item = &'a BTreeMap<String, String>>,
    {
        let mut merged = BTreeMap::new();
        for layer in layers {
            merged.extend(layer.iter().map(|(k, v)| (k.clone(), v.clone())));
        }

        let mut config = Self::new(operator_namespace);
        config.apply(&merged)?;
        Ok(config)
    }

    fn apply(&mut self, data: &BTreeMap<String, String>) -> Result<()> {
        if let Some(raw) = data.get(keys::WATCH_NAMESPACE) {
            self.watched_namespaces = raw
                .split(',')
                .map(str::trim)
                .filter(|ns| !ns.is_empty())
                .map(str::to_string)
                .collect();
        }
        if let Some(raw) = data.get(keys::CLUSTER_WIDE_CACHE_FILTER) {
            self.cluster_wide_cache_filter = parse_bool(keys::CLUSTER_WIDE_CACHE_FILTER, raw)?;
        }
        if let Some(name) = data.get(keys::CACHE_LABEL_NAME) {
            if name.trim().is_empty() {
                return Err(OperatorError::ConfigError(format!(
                    "{} cannot be empty",
                    keys::CACHE_LABEL_NAME
                )));
            }
            self.cache_label.name = name.trim().to_string();
        }
        if let Some(value) = data.get(keys::CACHE_LABEL_VALUE) {
            self.cache_label.value = value.trim().to_string();
        }
        if let Some(raw) = data.get(keys::MANDATORY_LABELS) {
            self.extra_mandatory_labels = parse_key_values(keys::MANDATORY_LABELS, raw)?;
        }
        if let Some(raw) = data.get(keys::MANDATORY_ANNOTATIONS) {
            self.mandatory_annotations = parse_key_values(keys::MANDATORY_ANNOTATIONS, raw)?;
        }

        for capability in Capability::ALL {
            if let Some(raw) = data.get(capability.config_key()) {
                if !parse_bool(capability.config_key(), raw)? {
                    self.features.disable(*capability);
                }
            }
        }

        let strings = [
            (keys::WEBHOOK_CERT_DIR, &mut self.webhook_cert_dir),
            (keys::PLUGIN_SOCKET_DIR, &mut self.plugin_socket_dir),
            (keys::CA_SECRET_NAME, &mut self.pki.ca_secret_name),
            (keys::WEBHOOK_SECRET_NAME, &mut self.pki.webhook_secret_name),
            (keys::WEBHOOK_SERVICE_NAME, &mut self.pki.webhook_service_name),
            (keys::MUTATING_WEBHOOK_NAME, &mut self.pki.mutating_webhook_name),
            (keys::VALIDATING_WEBHOOK_NAME, &mut self.pki.validating_webhook_name),
            (keys::OPERATOR_SELECTOR, &mut self.pki.operator_selector),
        ];
        for (key, slot) in strings {
            if let Some(value) = data.get(key) {
                *slot = value.trim().to_string();
            }
        }

        Ok(())
    }

    /// Labels every operator-managed object must carry, cache label included
    pub fn mandatory_labels(&self) -> BTreeMap<String, String> {
        let mut labels = self.extra_mandatory_labels.clone();
        labels.insert(self.cache_label.name.clone(), self.cache_label.value.clone());
        labels
    }

    pub fn mandatory_annotations(&self) -> &BTreeMap<String, String> {
        &self.mandatory_annotations
    }

    /// Whether an external agent (e.g. OLM) provides the webhook certificates
    pub fn uses_external_certificates(&self) -> bool {
        !self.webhook_cert_dir.is_empty()
    }
}

/// Configuration keys set in the process environment; these override the
/// ConfigMap and Secret.
pub fn env_overrides() -> BTreeMap<String, String> {
    keys::ALL
        .iter()
        .filter_map(|key| env::var(key).ok().map(|v| (key.to_string(), v)))
        .collect()
}

fn parse_bool(key: &str, raw: &str) -> Result<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" => Ok(true),
        "false" => Ok(false),
        other => Err(OperatorError::ConfigError(format!(
            "{} must be 'true' or 'false', got '{}'",
            key, other
        ))),
    }
}

fn parse_key_values(key: &str, raw: &str) -> Result<BTreeMap<String, String>> {
    raw.split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| match entry.split_once('=') {
            Some((k, v)) if !k.trim().is_empty() => Ok((k.trim().to_string(), v.trim().to_string())),
            _ => Err(OperatorError::ConfigError(format!(
                "{} entry '{}' is not in key=value form",
                key, entry
            ))),
        })
        .collect()
}
