// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Selection of what the operator's watch caches hold.

use crate::capabilities::Capability;
use crate::config::OperatorConfiguration;
use k8s_openapi::NamespaceResourceScope;
use kube::api::{ApiResource, DynamicObject};
use kube::{Api, Client, Resource};
use kube_runtime::watcher::Config as WatcherConfig;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use tracing::{info, warn};

/// Kinds the operator writes and watches, and may therefore label-filter
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum ObjectKind {
    ConfigMap,
    Secret,
    Deployment,
    Job,
    PersistentVolumeClaim,
    Pod,
    Role,
    RoleBinding,
    Service,
    ServiceAccount,
    PodMonitor,
    VolumeSnapshot,
}

impl ObjectKind {
    /// Kinds filtered unconditionally in cluster-wide filtered mode
    pub const ALWAYS_FILTERED: &'static [ObjectKind] = &[
        ObjectKind::ConfigMap,
        ObjectKind::Secret,
        ObjectKind::Deployment,
        ObjectKind::Job,
        ObjectKind::PersistentVolumeClaim,
        ObjectKind::Pod,
        ObjectKind::Role,
        ObjectKind::RoleBinding,
        ObjectKind::Service,
        ObjectKind::ServiceAccount,
    ];
}

impl fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// What the watch caches subscribe to. Computed once during bootstrap.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "mode", rename_all = "camelCase")]
pub enum CacheScopePlan {
    /// One cache per watched namespace, plus one on the operator namespace
    /// for the operator's own objects. Unfiltered.
    Namespaced {
        watched: BTreeSet<String>,
        operator: String,
    },
    /// Cluster-wide, with a label selector on every listed kind
    #[serde(rename_all = "camelCase")]
    LabelFiltered {
        selectors: BTreeMap<ObjectKind, String>,
    },
    /// Cluster-wide and unfiltered
    Unfiltered,
}

/// Where a single watch is rooted
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchScope {
    All,
    Namespace(String),
}

impl WatchScope {
    pub fn api<K>(&self, client: Client) -> Api<K>
    where
        K: Resource<Scope = NamespaceResourceScope>,
        <K as Resource>::DynamicType: Default,
    {
        match self {
            WatchScope::All => Api::all(client),
            WatchScope::Namespace(ns) => Api::namespaced(client, ns),
        }
    }

    pub fn dynamic_api(&self, client: Client, resource: &ApiResource) -> Api<DynamicObject> {
        match self {
            WatchScope::All => Api::all_with(client, resource),
            WatchScope::Namespace(ns) => Api::namespaced_with(client, ns, resource),
        }
    }
}

impl fmt::Display for WatchScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WatchScope::All => f.write_str("cluster-wide"),
            WatchScope::Namespace(ns) => f.write_str(ns),
        }
    }
}

impl CacheScopePlan {
    /// Roots of the resource controllers: one per watched namespace, or a
    /// single cluster-wide one. The operator namespace is only a root when
    /// it is itself watched.
    pub fn scopes(&self) -> Vec<WatchScope> {
        match self {
            CacheScopePlan::Namespaced { watched, .. } => watched
                .iter()
                .cloned()
                .map(WatchScope::Namespace)
                .collect(),
            _ => vec![WatchScope::All],
        }
    }

    /// Every namespace holding a cache, `None` when caching cluster-wide
    pub fn cached_namespaces(&self) -> Option<BTreeSet<&str>> {
        match self {
            CacheScopePlan::Namespaced { watched, operator } => Some(
                watched
                    .iter()
                    .map(String::as_str)
                    .chain(std::iter::once(operator.as_str()))
                    .collect(),
            ),
            _ => None,
        }
    }

    pub fn label_selector(&self, kind: ObjectKind) -> Option<&str> {
        match self {
            CacheScopePlan::LabelFiltered { selectors } => selectors.get(&kind).map(String::as_str),
            _ => None,
        }
    }

    /// Kinds that carry a label filter
    pub fn filtered_kinds(&self) -> BTreeSet<ObjectKind> {
        match self {
            CacheScopePlan::LabelFiltered { selectors } => selectors.keys().copied().collect(),
            _ => BTreeSet::new(),
        }
    }

    /// Watcher configuration for a kind, honoring its label filter
    pub fn watcher_config(&self, kind: ObjectKind) -> WatcherConfig {
        match self.label_selector(kind) {
            Some(selector) => WatcherConfig::default().labels(selector),
            None => WatcherConfig::default(),
        }
    }
}

/// Decide the cache scope from the negotiated configuration
pub fn select_scope(config: &OperatorConfiguration) -> CacheScopePlan {
    if !config.watched_namespaces.is_empty() {
        info!(watch_namespaces = ?config.watched_namespaces, "Listening for changes");
        return CacheScopePlan::Namespaced {
            watched: config.watched_namespaces.clone(),
            operator: config.operator_namespace.clone(),
        };
    }

    if config.cluster_wide_cache_filter {
        let selector = config.cache_label.selector();
        let mut selectors: BTreeMap<ObjectKind, String> = ObjectKind::ALWAYS_FILTERED
            .iter()
            .map(|kind| (*kind, selector.clone()))
            .collect();
        if config.features.is_enabled(Capability::PodMonitor) {
            selectors.insert(ObjectKind::PodMonitor, selector.clone());
        }
        if config.features.is_enabled(Capability::VolumeSnapshot) {
            selectors.insert(ObjectKind::VolumeSnapshot, selector.clone());
        }
        info!(%selector, "Operator is cluster-wide with filtered cache, listening for changes on all namespaces");
        return CacheScopePlan::LabelFiltered { selectors };
    }

    warn!("Operator is cluster-wide WITHOUT filtered cache, listening for changes on all namespaces");
    CacheScopePlan::Unfiltered
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_config() -> OperatorConfiguration {
        OperatorConfiguration::new("pg-system")
    }

    fn filtered_config() -> OperatorConfiguration {
        let mut config = base_config();
        config.cluster_wide_cache_filter = true;
        config
    }

    #[test]
    fn test_defaults_select_unfiltered() {
        let empty = BTreeMap::new();
        let config = OperatorConfiguration::from_layers("pg-system", [&empty]).unwrap();

        assert_eq!(select_scope(&config), CacheScopePlan::Unfiltered);
    }

    #[test]
    fn test_watched_namespaces_are_controller_roots() {
        let mut config = base_config();
        config.watched_namespaces = BTreeSet::from(["team-a".to_string(), "team-b".to_string()]);

        let plan = select_scope(&config);

        assert_eq!(
            plan.scopes(),
            vec![
                WatchScope::Namespace("team-a".to_string()),
                WatchScope::Namespace("team-b".to_string()),
            ]
        );
        assert!(plan.filtered_kinds().is_empty());
    }

    #[test]
    fn test_operator_namespace_is_cached_but_not_a_controller_root() {
        let mut config = base_config();
        config.watched_namespaces = BTreeSet::from(["team-a".to_string()]);

        let plan = select_scope(&config);

        assert!(!plan
            .scopes()
            .contains(&WatchScope::Namespace("pg-system".to_string())));
        assert_eq!(
            plan.cached_namespaces(),
            Some(BTreeSet::from(["pg-system", "team-a"]))
        );
    }

    #[test]
    fn test_watched_operator_namespace_is_a_controller_root() {
        let mut config = base_config();
        config.watched_namespaces = BTreeSet::from(["pg-system".to_string()]);

        let plan = select_scope(&config);

        assert_eq!(plan.scopes(), vec![WatchScope::Namespace("pg-system".to_string())]);
        assert_eq!(plan.cached_namespaces(), Some(BTreeSet::from(["pg-system"])));
    }

    #[test]
    fn test_watched_namespaces_win_over_cache_filter() {
        let mut config = base_config();
        config.watched_namespaces = BTreeSet::from(["team-a".to_string()]);
        config.cluster_wide_cache_filter = true;

        assert!(matches!(select_scope(&config), CacheScopePlan::Namespaced { .. }));
    }

    #[test]
    fn test_cluster_wide_filtered_covers_fixed_kinds() {
        let mut config = filtered_config();
        config.features.disable(Capability::PodMonitor);
        config.features.disable(Capability::VolumeSnapshot);

        let plan = select_scope(&config);

        let expected: BTreeSet<ObjectKind> = ObjectKind::ALWAYS_FILTERED.iter().copied().collect();
        assert_eq!(plan.filtered_kinds(), expected);
        assert_eq!(plan.scopes(), vec![WatchScope::All]);
    }

    #[test]
    fn test_cluster_wide_filtered_adds_enabled_optional_kinds() {
        let mut config = filtered_config();
        config.features.disable(Capability::VolumeSnapshot);

        let kinds = select_scope(&config).filtered_kinds();

        assert!(kinds.contains(&ObjectKind::PodMonitor));
        assert!(!kinds.contains(&ObjectKind::VolumeSnapshot));
        assert_eq!(kinds.len(), ObjectKind::ALWAYS_FILTERED.len() + 1);
    }

    #[test]
    fn test_filtered_watcher_config_uses_cache_label() {
        let plan = select_scope(&filtered_config());

        let config = plan.watcher_config(ObjectKind::Secret);
        assert_eq!(
            config.label_selector.as_deref(),
            Some("app.kubernetes.io/managed-by=pg-operator")
        );
    }

    #[test]
    fn test_unfiltered_without_cache_filter() {
        let mut config = base_config();
        config.cluster_wide_cache_filter = false;

        let plan = select_scope(&config);

        assert_eq!(plan, CacheScopePlan::Unfiltered);
        assert!(plan.watcher_config(ObjectKind::ConfigMap).label_selector.is_none());
        assert_eq!(plan.scopes(), vec![WatchScope::All]);
        assert_eq!(plan.cached_namespaces(), None);
    }

    #[test]
    fn test_plan_serializes_with_mode_tag() {
        let plan = CacheScopePlan::Unfiltered;
        let json = serde_json::to_value(&plan).unwrap();

        assert_eq!(json["mode"], "unfiltered");

        let plan = CacheScopePlan::Namespaced {
            watched: BTreeSet::from(["team-a".to_string()]),
            operator: "pg-system".to_string(),
        };
        let json = serde_json::to_value(&plan).unwrap();
        assert_eq!(json["mode"], "namespaced");
        assert_eq!(json["operator"], "pg-system");
        assert_eq!(json["watched"], serde_json::json!(["team-a"]));
    }
}
