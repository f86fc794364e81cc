// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0
use super::{ControllerContext, ERROR_REQUEUE};
use crate::config::OperatorConfiguration;
use crate::error::{OperatorError, Result};
use crate::manager::Manager;
use crate::types::{Backup, ScheduledBackup};
use futures::future::join_all;
use futures::{FutureExt, StreamExt};
use kube::{
    runtime::{controller::Action, watcher, Controller},
    ResourceExt,
};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

pub fn setup(manager: &mut Manager, config: &Arc<OperatorConfiguration>) -> Result<()> {
    let client = manager.client();
    let plan = manager.cache_plan().clone();
    let context = Arc::new(ControllerContext::new(client.clone(), config.clone()));

    let mut controllers = Vec::new();
    for scope in plan.scopes() {
        let controller = Controller::new(scope.api::<ScheduledBackup>(client.clone()), watcher::Config::default())
            .owns(scope.api::<Backup>(client.clone()), watcher::Config::default());

        debug!("Watching scheduled backups in {}", scope);
        controllers.push(
            controller
                .run(reconcile, error_policy, context.clone())
                .for_each(|res| async move {
                    match res {
                        Ok(o) => debug!("Reconciled scheduled backup: {:?}", o),
                        Err(e) => warn!("Reconciliation error: {:?}", e),
                    }
                }),
        );
    }

    manager.add_controller("scheduled-backup", join_all(controllers).map(|_| ()).boxed())
}

async fn reconcile(scheduled: Arc<ScheduledBackup>, _ctx: Arc<ControllerContext>) -> Result<Action> {
    if scheduled.spec.suspend.unwrap_or(false) {
        info!("Scheduled backup {} is suspended", scheduled.name_any());
        return Ok(Action::await_change());
    }

    debug!(
        "Reconciling scheduled backup {} with schedule {:?}",
        scheduled.name_any(),
        scheduled.spec.schedule
    );
    Ok(Action::await_change())
}

fn error_policy(scheduled: Arc<ScheduledBackup>, error: &OperatorError, _ctx: Arc<ControllerContext>) -> Action {
    error!("Reconciliation error for scheduled backup {}: {}", scheduled.name_any(), error);
    Action::requeue(ERROR_REQUEUE)
}
