// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0
use super::{ControllerContext, ERROR_REQUEUE, MISSING_REFERENCE_REQUEUE};
use crate::cache::ObjectKind;
use crate::capabilities::Capability;
use crate::config::OperatorConfiguration;
use crate::error::{OperatorError, Result};
use crate::manager::Manager;
use crate::types::Backup;
use futures::future::join_all;
use futures::{FutureExt, StreamExt};
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
        let mut controller = Controller::new(scope.api::<Backup>(client.clone()), watcher::Config::default());

        if config.features.is_enabled(Capability::VolumeSnapshot) {
            let resource = ApiResource::from_gvk(&Capability::VolumeSnapshot.gvk());
            controller = controller.owns_with(
                scope.dynamic_api(client.clone(), &resource),
                resource,
                plan.watcher_config(ObjectKind::VolumeSnapshot),
            );
        }

        debug!("Watching backups in {}", scope);
        controllers.push(
            controller
                .run(reconcile, error_policy, context.clone())
                .for_each(|res| async move {
                    match res {
                        Ok(o) => debug!("Reconciled backup: {:?}", o),
                        Err(e) => warn!("Reconciliation error: {:?}", e),
                    }
                }),
        );
    }

    manager.add_controller("backup", join_all(controllers).map(|_| ()).boxed())
}

async fn reconcile(backup: Arc<Backup>, ctx: Arc<ControllerContext>) -> Result<Action> {
    let namespace = backup.namespace().unwrap_or_default();
    debug!("Reconciling backup: {}/{}", namespace, backup.name_any());

    if !ctx.cluster_exists(&namespace, &backup.spec.cluster.name).await? {
        warn!(
            "Backup {} references unknown cluster {:?}",
            backup.name_any(),
            backup.spec.cluster.name
        );
        return Ok(Action::requeue(MISSING_REFERENCE_REQUEUE));
    }

    Ok(Action::await_change())
}

fn error_policy(backup: Arc<Backup>, error: &OperatorError, _ctx: Arc<ControllerContext>) -> Action {
    error!("Reconciliation error for backup {}: {}", backup.name_any(), error);
    Action::requeue(ERROR_REQUEUE)
}
