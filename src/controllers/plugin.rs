// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0
use super::ERROR_REQUEUE;
use crate::cache::ObjectKind;
use crate::config::OperatorConfiguration;
use crate::constants::labels;
use crate::error::{OperatorError, Result};
use crate::manager::Manager;
use crate::plugins::PluginRepository;
use futures::{FutureExt, StreamExt};
use k8s_openapi::api::core::v1::Service;
use kube::{
    runtime::{controller::Action, watcher, Controller},
    Api, ResourceExt,
};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

struct PluginContext {
    plugins: Arc<PluginRepository>,
}

/// Label selector for plugin Services, narrowed by the cache filter if any
pub fn plugin_selector(cache_selector: Option<&str>) -> String {
    match cache_selector {
        Some(selector) => format!("{},{}", selector, labels::PLUGIN_NAME),
        None => labels::PLUGIN_NAME.to_string(),
    }
}

pub fn setup(
    manager: &mut Manager,
    config: &Arc<OperatorConfiguration>,
    plugins: &Arc<PluginRepository>,
) -> Result<()> {
    let client = manager.client();
    let selector = plugin_selector(manager.cache_plan().label_selector(ObjectKind::Service));
    let services: Api<Service> = Api::namespaced(client, &config.operator_namespace);
    let context = Arc::new(PluginContext {
        plugins: plugins.clone(),
    });

    debug!("Watching plugin services in {} with {}", config.operator_namespace, selector);
    let controller = Controller::new(services, watcher::Config::default().labels(&selector))
        .run(reconcile, error_policy, context)
        .for_each(|res| async move {
            match res {
                Ok(o) => debug!("Reconciled plugin service: {:?}", o),
                Err(e) => warn!("Reconciliation error: {:?}", e),
            }
        });

    manager.add_controller("plugin", controller.boxed())
}

async fn reconcile(service: Arc<Service>, ctx: Arc<PluginContext>) -> Result<Action> {
    let Some(plugin) = service.labels().get(labels::PLUGIN_NAME) else {
        return Ok(Action::await_change());
    };

    if ctx.plugins.contains(plugin) {
        info!("Plugin {} available through service {}", plugin, service.name_any());
    } else {
        warn!(
            "Service {} announces plugin {} which has no local socket",
            service.name_any(),
            plugin
        );
    }

    Ok(Action::await_change())
}

fn error_policy(service: Arc<Service>, error: &OperatorError, _ctx: Arc<PluginContext>) -> Action {
    error!("Reconciliation error for plugin service {}: {}", service.name_any(), error);
    Action::requeue(ERROR_REQUEUE)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plugin_selector() {
        assert_eq!(plugin_selector(None), "cnpg.io/pluginName");
        assert_eq!(
            plugin_selector(Some("app.kubernetes.io/managed-by=pg-operator")),
            "app.kubernetes.io/managed-by=pg-operator,cnpg.io/pluginName"
        );
    }
}
