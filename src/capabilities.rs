// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Negotiation of optional cluster capabilities.
//!
//! Every capability starts enabled (unless configuration says otherwise) and is
//! probed once at startup. Any probe failure disables the capability: an
//! operator that cannot tell whether a kind exists behaves as if it does not.

use crate::config::{keys, OperatorConfiguration};
use crate::constants::{API_GROUP, API_VERSION};
use crate::error::Result;
use async_trait::async_trait;
use kube::api::GroupVersionKind;
use serde::Serialize;
use std::fmt;
use tracing::{debug, info, instrument, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum Capability {
    NodeApi,
    PodMonitor,
    VolumeSnapshot,
    ClusterImageCatalog,
}

impl Capability {
    pub const ALL: &'static [Capability] = &[
        Capability::NodeApi,
        Capability::PodMonitor,
        Capability::VolumeSnapshot,
        Capability::ClusterImageCatalog,
    ];

    /// The kind whose presence backs this capability
    pub fn gvk(self) -> GroupVersionKind {
        match self {
            Capability::NodeApi => GroupVersionKind::gvk("", "v1", "Node"),
            Capability::PodMonitor => GroupVersionKind::gvk("monitoring.coreos.com", "v1", "PodMonitor"),
            Capability::VolumeSnapshot => {
                GroupVersionKind::gvk("snapshot.storage.k8s.io", "v1", "VolumeSnapshot")
            }
            Capability::ClusterImageCatalog => {
                GroupVersionKind::gvk(API_GROUP, API_VERSION, "ClusterImageCatalog")
            }
        }
    }

    /// Whether the backing kind is probed inside the operator namespace
    pub fn namespaced(self) -> bool {
        matches!(self, Capability::PodMonitor | Capability::VolumeSnapshot)
    }

    /// Configuration key that can switch the capability off up front
    pub fn config_key(self) -> &'static str {
        match self {
            Capability::NodeApi => keys::ENABLE_NODE_API,
            Capability::PodMonitor => keys::ENABLE_POD_MONITOR_API,
            Capability::VolumeSnapshot => keys::ENABLE_VOLUME_SNAPSHOT_API,
            Capability::ClusterImageCatalog => keys::ENABLE_CLUSTER_IMAGE_CATALOG_API,
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Capability::NodeApi => "node-api",
            Capability::PodMonitor => "pod-monitor",
            Capability::VolumeSnapshot => "volume-snapshot",
            Capability::ClusterImageCatalog => "cluster-image-catalog",
        };
        f.write_str(name)
    }
}

/// Answers "can the operator list this kind?" against the cluster API surface.
///
/// Implementations own retries and timeouts; the negotiator calls each probe once.
#[async_trait]
pub trait DiscoveryPort: Send + Sync {
    /// Whether `gvk` is served and listable, inside `namespace` when one is given
    async fn list_kind_exists(
        &self,
        gvk: &GroupVersionKind,
        namespace: Option<&str>,
    ) -> Result<bool>;
}

/// Probe every still-enabled capability and disable the ones that are not usable
#[instrument(skip(discovery, config))]
pub async fn negotiate<D>(discovery: &D, mut config: OperatorConfiguration) -> OperatorConfiguration
where
    D: DiscoveryPort + ?Sized,
{
    for capability in Capability::ALL.iter().copied() {
        if !config.features.is_enabled(capability) {
            debug!(%capability, "Capability disabled by configuration, skipping probe");
            continue;
        }

        let gvk = capability.gvk();
        let namespace = capability
            .namespaced()
            .then_some(config.operator_namespace.as_str());

        match discovery.list_kind_exists(&gvk, namespace).await {
            Ok(true) => {
                debug!(%capability, kind = %gvk.kind, "Capability available");
            }
            Ok(false) => {
                warn!(%capability, kind = %gvk.kind, "Kind not available, disabling capability");
                config.features.disable(capability);
            }
            Err(e) => {
                warn!(%capability, kind = %gvk.kind, error = %e, "Capability probe failed, disabling capability");
                config.features.disable(capability);
            }
        }
    }

    info!(
        node_api = config.features.is_enabled(Capability::NodeApi),
        pod_monitor = config.features.is_enabled(Capability::PodMonitor),
        volume_snapshot = config.features.is_enabled(Capability::VolumeSnapshot),
        cluster_image_catalog = config.features.is_enabled(Capability::ClusterImageCatalog),
        "Capability negotiation complete"
    );

    config
}
