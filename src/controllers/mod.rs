// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Controllers for the `postgresql.cnpg.io/v1` resources.
//!
//! Each controller sets up the watches its reconciler depends on, rooted
//! where the cache plan says and filtered by its label selectors.

pub mod backup;
pub mod cluster;
pub mod plugin;
pub mod pooler;
pub mod scheduled_backup;

use crate::config::OperatorConfiguration;
use crate::error::{OperatorError, Result};
use crate::manager::Manager;
use crate::plugins::PluginRepository;
use crate::types::Cluster;
use kube::{Api, Client};
use std::sync::Arc;
use std::time::Duration;

/// Requeue interval while a referenced object is missing
pub(crate) const MISSING_REFERENCE_REQUEUE: Duration = Duration::from_secs(30);

/// Requeue interval after a failed reconciliation
pub(crate) const ERROR_REQUEUE: Duration = Duration::from_secs(60);

/// Shared state handed to every reconciler
pub struct ControllerContext {
    pub client: Client,
    pub config: Arc<OperatorConfiguration>,
}

impl ControllerContext {
    pub fn new(client: Client, config: Arc<OperatorConfiguration>) -> Self {
        Self { client, config }
    }

    /// Point-read of a Cluster; not subject to the cache label filter
    pub async fn cluster_exists(&self, namespace: &str, name: &str) -> Result<bool> {
        if name.is_empty() {
            return Ok(false);
        }
        let clusters: Api<Cluster> = Api::namespaced(self.client.clone(), namespace);
        Ok(clusters.get_opt(name).await?.is_some())
    }
}

/// Register every controller with the manager, in a fixed order:
/// cluster, backup, plugin, scheduled backup, pooler.
pub fn register_controllers(
    manager: &mut Manager,
    config: &Arc<OperatorConfiguration>,
    plugins: &Arc<PluginRepository>,
) -> Result<()> {
    cluster::setup(manager, config).map_err(|e| registration_error("cluster", e))?;
    backup::setup(manager, config).map_err(|e| registration_error("backup", e))?;
    plugin::setup(manager, config, plugins).map_err(|e| registration_error("plugin", e))?;
    scheduled_backup::setup(manager, config).map_err(|e| registration_error("scheduled-backup", e))?;
    pooler::setup(manager, config).map_err(|e| registration_error("pooler", e))?;
    Ok(())
}

fn registration_error(name: &str, error: OperatorError) -> OperatorError {
    match error {
        e @ OperatorError::RegistrationError { .. } => e,
        e => OperatorError::RegistrationError {
            kind: "controller",
            name: name.to_string(),
            reason: e.to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::MockService;

    #[tokio::test]
    async fn test_cluster_exists() {
        let cluster = serde_json::json!({
            "apiVersion": "postgresql.cnpg.io/v1",
            "kind": "Cluster",
            "metadata": {"name": "cluster-example", "namespace": "default"},
            "spec": {"instances": 3}
        })
        .to_string();
        let client = MockService::new()
            .on_get(
                "/apis/postgresql.cnpg.io/v1/namespaces/default/clusters/cluster-example",
                200,
                &cluster,
            )
            .into_client();
        let ctx = ControllerContext::new(client, Arc::new(OperatorConfiguration::new("pg-system")));

        assert!(ctx.cluster_exists("default", "cluster-example").await.unwrap());
        assert!(!ctx.cluster_exists("default", "missing").await.unwrap());
        assert!(!ctx.cluster_exists("default", "").await.unwrap());
    }

    #[test]
    fn test_registration_error_keeps_original() {
        let original = OperatorError::RegistrationError {
            kind: "controller",
            name: "pooler".to_string(),
            reason: "already registered".to_string(),
        };

        let wrapped = registration_error("pooler", original);
        assert!(wrapped.to_string().contains("already registered"));

        let wrapped = registration_error("cluster", OperatorError::ManagerError("boom".to_string()));
        assert!(matches!(wrapped, OperatorError::RegistrationError { kind: "controller", .. }));
    }
}
