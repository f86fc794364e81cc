// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0
use super::{ControllerContext, ERROR_REQUEUE, MISSING_REFERENCE_REQUEUE};
use crate::cache::ObjectKind;
use crate::capabilities::Capability;
use crate::config::OperatorConfiguration;
use crate::error::{OperatorError, Result};
use crate::manager::Manager;
use crate::types::Pooler;
use futures::future::join_all;
use futures::{FutureExt, StreamExt};
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::Service;
use kube::{
    api::ApiResource,
    runtime::{controller::Action, watcher, Controller},
    ResourceExt,
};
use std::sync::Arc;
use tracing::{debug, error, warn};

pub fn setup(manager: &mut Manager, config: &Arc<OperatorConfiguration>) -> Result<()> {
    let client = manager.client();
    let plan = manager.cache_plan().clone();
    let context = Arc::new(ControllerContext::new(client.clone(), config.clone()));

    let mut controllers = Vec::new();
    for scope in plan.scopes() {
        let mut controller = Controller::new(scope.api::<Pooler>(client.clone()), watcher::Config::default())
            .owns(scope.api::<Deployment>(client.clone()), plan.watcher_config(ObjectKind::Deployment))
            .owns(scope.api::<Service>(client.clone()), plan.watcher_config(ObjectKind::Service));

        if config.features.is_enabled(Capability::PodMonitor) {
            let resource = ApiResource::from_gvk(&Capability::PodMonitor.gvk());
            controller = controller.owns_with(
                scope.dynamic_api(client.clone(), &resource),
                resource,
                plan.watcher_config(ObjectKind::PodMonitor),
            );
        }

        debug!("Watching poolers in {}", scope);
        controllers.push(
            controller
                .run(reconcile, error_policy, context.clone())
                .for_each(|res| async move {
                    match res {
                        Ok(o) => debug!("Reconciled pooler: {:?}", o),
                        Err(e) => warn!("Reconciliation error: {:?}", e),
                    }
                }),
        );
    }

    manager.add_controller("pooler", join_all(controllers).map(|_| ()).boxed())
}

async fn reconcile(pooler: Arc<Pooler>, ctx: Arc<ControllerContext>) -> Result<Action> {
    let namespace = pooler.namespace().unwrap_or_default();
    debug!("Reconciling pooler: {}/{}", namespace, pooler.name_any());

    if !ctx.cluster_exists(&namespace, pooler.cluster_name()).await? {
        warn!(
            "Pooler {} references unknown cluster {:?}",
            pooler.name_any(),
            pooler.cluster_name()
        );
        return Ok(Action::requeue(MISSING_REFERENCE_REQUEUE));
    }

    if !pooler.is_automated_integration() {
        debug!("Pooler {} integration is managed by the user", pooler.name_any());
    }

    Ok(Action::await_change())
}

fn error_policy(pooler: Arc<Pooler>, error: &OperatorError, _ctx: Arc<ControllerContext>) -> Action {
    error!("Reconciliation error for pooler {}: {}", pooler.name_any(), error);
    Action::requeue(ERROR_REQUEUE)
}
