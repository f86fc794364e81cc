// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Kind availability probing against the API server

use crate::capabilities::DiscoveryPort;
use crate::error::{OperatorError, Result};
use async_trait::async_trait;
use kube::api::{DynamicObject, GroupVersionKind, ListParams};
use kube::discovery::{pinned_kind, Scope};
use kube::{Api, Client};
use std::time::Duration;
use tracing::{debug, instrument};

/// Discovery port backed by the API server's discovery endpoints
pub struct KubeDiscovery {
    client: Client,
    timeout: Duration,
}

impl KubeDiscovery {
    pub fn new(client: Client, timeout: Duration) -> Self {
        Self { client, timeout }
    }

    /// A kind exists when discovery serves it and a one-item list succeeds
    async fn probe(&self, gvk: &GroupVersionKind, namespace: Option<&str>) -> Result<bool> {
        let (resource, capabilities) = match pinned_kind(&self.client, gvk).await {
            Ok(found) => found,
            Err(kube::Error::Discovery(e)) => {
                debug!("Kind {} not served: {}", gvk.kind, e);
                return Ok(false);
            }
            Err(kube::Error::Api(err)) if err.code == 404 => {
                debug!("API {} not served", gvk.api_version());
                return Ok(false);
            }
            Err(e) => return Err(e.into()),
        };

        let api: Api<DynamicObject> = match (&capabilities.scope, namespace) {
            (Scope::Namespaced, Some(ns)) => Api::namespaced_with(self.client.clone(), ns, &resource),
            _ => Api::all_with(self.client.clone(), &resource),
        };
        api.list(&ListParams::default().limit(1)).await?;

        Ok(true)
    }
}

#[async_trait]
impl DiscoveryPort for KubeDiscovery {
    #[instrument(skip(self, gvk), fields(kind = %gvk.kind))]
    async fn list_kind_exists(
        &self,
        gvk: &GroupVersionKind,
        namespace: Option<&str>,
    ) -> Result<bool> {
        match tokio::time::timeout(self.timeout, self.probe(gvk, namespace)).await {
            Ok(result) => result,
            Err(_) => Err(OperatorError::DiscoveryError(format!(
                "probe for {} timed out after {:?}",
                gvk.kind, self.timeout
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{api_resource_list_json, empty_list_json, status_json, MockService};

    const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

    fn pod_monitor_gvk() -> GroupVersionKind {
        GroupVersionKind::gvk("monitoring.coreos.com", "v1", "PodMonitor")
    }

    #[tokio::test]
    async fn test_kind_served_and_listable() {
        let client = MockService::new()
            .on_get(
                "/apis/monitoring.coreos.com/v1",
                200,
                &api_resource_list_json("monitoring.coreos.com/v1", "PodMonitor", "podmonitors", true),
            )
            .on_get(
                "/apis/monitoring.coreos.com/v1/namespaces/pg-system/podmonitors",
                200,
                &empty_list_json("monitoring.coreos.com/v1", "PodMonitorList"),
            )
            .into_client();

        let discovery = KubeDiscovery::new(client, PROBE_TIMEOUT);
        let exists = discovery
            .list_kind_exists(&pod_monitor_gvk(), Some("pg-system"))
            .await
            .unwrap();

        assert!(exists);
    }

    #[tokio::test]
    async fn test_group_not_served() {
        let client = MockService::new().into_client();

        let discovery = KubeDiscovery::new(client, PROBE_TIMEOUT);
        let exists = discovery
            .list_kind_exists(&pod_monitor_gvk(), Some("pg-system"))
            .await
            .unwrap();

        assert!(!exists);
    }

    #[tokio::test]
    async fn test_kind_missing_from_group() {
        let client = MockService::new()
            .on_get(
                "/apis/monitoring.coreos.com/v1",
                200,
                &api_resource_list_json(
                    "monitoring.coreos.com/v1",
                    "ServiceMonitor",
                    "servicemonitors",
                    true,
                ),
            )
            .into_client();

        let discovery = KubeDiscovery::new(client, PROBE_TIMEOUT);
        let exists = discovery
            .list_kind_exists(&pod_monitor_gvk(), Some("pg-system"))
            .await
            .unwrap();

        assert!(!exists);
    }

    #[tokio::test]
    async fn test_list_forbidden_is_an_error() {
        let client = MockService::new()
            .on_get(
                "/apis/monitoring.coreos.com/v1",
                200,
                &api_resource_list_json("monitoring.coreos.com/v1", "PodMonitor", "podmonitors", true),
            )
            .on_get(
                "/apis/monitoring.coreos.com/v1/namespaces/pg-system/podmonitors",
                403,
                &status_json(403, "Forbidden", "podmonitors is forbidden"),
            )
            .into_client();

        let discovery = KubeDiscovery::new(client, PROBE_TIMEOUT);
        let result = discovery
            .list_kind_exists(&pod_monitor_gvk(), Some("pg-system"))
            .await;

        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_cluster_scoped_kind_lists_cluster_wide() {
        let client = MockService::new()
            .on_get("/api/v1", 200, &api_resource_list_json("v1", "Node", "nodes", false))
            .on_get("/api/v1/nodes", 200, &empty_list_json("v1", "NodeList"))
            .into_client();

        let discovery = KubeDiscovery::new(client, PROBE_TIMEOUT);
        let exists = discovery
            .list_kind_exists(&GroupVersionKind::gvk("", "v1", "Node"), None)
            .await
            .unwrap();

        assert!(exists);
    }
}
