// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0
use super::{ControllerContext, ERROR_REQUEUE};
use crate::cache::ObjectKind;
use crate::capabilities::Capability;
use crate::config::OperatorConfiguration;
use crate::error::{OperatorError, Result};
use crate::manager::Manager;
use crate::types::Cluster;
use futures::future::join_all;
use futures::{FutureExt, StreamExt};
use k8s_openapi::api::batch::v1::Job;
use k8s_openapi::api::core::v1::{
    ConfigMap, Node, PersistentVolumeClaim, Pod, Secret, Service, ServiceAccount,
};
use k8s_openapi::api::rbac::v1::{Role, RoleBinding};
use kube::{
    api::{ApiResource, DynamicObject},
    runtime::{controller::Action, reflector::ObjectRef, watcher, Controller},
    Api, ResourceExt,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, warn};

/// Requeue interval while a cluster is not ready yet
const NOT_READY_REQUEUE: Duration = Duration::from_secs(30);

pub fn setup(manager: &mut Manager, config: &Arc<OperatorConfiguration>) -> Result<()> {
    let client = manager.client();
    let plan = manager.cache_plan().clone();
    let context = Arc::new(ControllerContext::new(client.clone(), config.clone()));

    let mut controllers = Vec::new();
    for scope in plan.scopes() {
        let mut controller = Controller::new(scope.api::<Cluster>(client.clone()), watcher::Config::default())
            .owns(scope.api::<Pod>(client.clone()), plan.watcher_config(ObjectKind::Pod))
            .owns(
                scope.api::<PersistentVolumeClaim>(client.clone()),
                plan.watcher_config(ObjectKind::PersistentVolumeClaim),
            )
            .owns(scope.api::<Service>(client.clone()), plan.watcher_config(ObjectKind::Service))
            .owns(scope.api::<Secret>(client.clone()), plan.watcher_config(ObjectKind::Secret))
            .owns(scope.api::<ConfigMap>(client.clone()), plan.watcher_config(ObjectKind::ConfigMap))
            .owns(
                scope.api::<ServiceAccount>(client.clone()),
                plan.watcher_config(ObjectKind::ServiceAccount),
            )
            .owns(scope.api::<Role>(client.clone()), plan.watcher_config(ObjectKind::Role))
            .owns(scope.api::<RoleBinding>(client.clone()), plan.watcher_config(ObjectKind::RoleBinding))
            .owns(scope.api::<Job>(client.clone()), plan.watcher_config(ObjectKind::Job));

        if config.features.is_enabled(Capability::PodMonitor) {
            let resource = ApiResource::from_gvk(&Capability::PodMonitor.gvk());
            controller = controller.owns_with(
                scope.dynamic_api(client.clone(), &resource),
                resource,
                plan.watcher_config(ObjectKind::PodMonitor),
            );
        }

        if config.features.is_enabled(Capability::NodeApi) {
            let store = controller.store();
            controller = controller.watches(
                Api::<Node>::all(client.clone()),
                watcher::Config::default(),
                move |_node: Node| {
                    store
                        .state()
                        .into_iter()
                        .map(|cluster| ObjectRef::from_obj(&*cluster))
                        .collect::<Vec<_>>()
                },
            );
        }

        if config.features.is_enabled(Capability::ClusterImageCatalog) {
            let store = controller.store();
            let resource = ApiResource::from_gvk(&Capability::ClusterImageCatalog.gvk());
            controller = controller.watches_with(
                Api::all_with(client.clone(), &resource),
                resource,
                watcher::Config::default(),
                move |catalog: DynamicObject| {
                    let name = catalog.name_any();
                    store
                        .state()
                        .into_iter()
                        .filter(|cluster| cluster.uses_catalog("ClusterImageCatalog", &name))
                        .map(|cluster| ObjectRef::from_obj(&*cluster))
                        .collect::<Vec<_>>()
                },
            );
        }

        debug!("Watching clusters in {}", scope);
        controllers.push(
            controller
                .run(reconcile, error_policy, context.clone())
                .for_each(|res| async move {
                    match res {
                        Ok(o) => debug!("Reconciled cluster: {:?}", o),
                        Err(e) => warn!("Reconciliation error: {:?}", e),
                    }
                }),
        );
    }

    manager.add_controller("cluster", join_all(controllers).map(|_| ()).boxed())
}

async fn reconcile(cluster: Arc<Cluster>, _ctx: Arc<ControllerContext>) -> Result<Action> {
    debug!("Reconciling cluster: {}", cluster.name_any());

    if !cluster.is_ready() {
        debug!("Cluster {} not ready yet", cluster.name_any());
        return Ok(Action::requeue(NOT_READY_REQUEUE));
    }

    Ok(Action::await_change())
}

fn error_policy(cluster: Arc<Cluster>, error: &OperatorError, _ctx: Arc<ControllerContext>) -> Action {
    error!("Reconciliation error for cluster {}: {}", cluster.name_any(), error);
    Action::requeue(ERROR_REQUEUE)
}
