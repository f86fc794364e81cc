// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Admission webhooks for the `postgresql.cnpg.io/v1` resources.
//!
//! Validators and defaulters are pure functions of the object under review
//! and the operator configuration, so they are safe to call concurrently.

pub mod backup;
pub mod cluster;
pub mod defaulter;
pub mod handler;
pub mod pooler;

use crate::config::OperatorConfiguration;
use crate::error::Result;
use crate::server::Router;
use crate::types::{Backup, Cluster, Pooler, ScheduledBackup};
use std::fmt;
use std::sync::Arc;
use tracing::info;

pub use backup::{BackupWebhook, ScheduledBackupWebhook};
pub use cluster::ClusterWebhook;
pub use defaulter::{apply_defaults, MandatoryMetadata};
pub use handler::{mutate_path, register_webhook, validate_path};
pub use pooler::PoolerWebhook;

/// A single invalid field, rendered the way the API server reports them
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldError {
    pub path: String,
    pub value: String,
    pub detail: String,
}

impl FieldError {
    pub fn invalid(path: &[&str], value: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            path: path.join("."),
            value: value.into(),
            detail: detail.into(),
        }
    }
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: Invalid value: {:?}: {}", self.path, self.value, self.detail)
    }
}

/// Result of an admission decision: the request is admitted iff `errors` is empty
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AdmissionOutcome {
    pub warnings: Vec<String>,
    pub errors: Vec<FieldError>,
}

impl AdmissionOutcome {
    pub fn allowed() -> Self {
        Self::default()
    }

    pub fn with_errors(errors: Vec<FieldError>) -> Self {
        Self {
            warnings: Vec::new(),
            errors,
        }
    }

    pub fn is_allowed(&self) -> bool {
        self.errors.is_empty()
    }

    /// Aggregated denial message, `None` when the request is admitted
    pub fn rejection_message(&self, kind: &str, group: &str, name: &str) -> Option<String> {
        let errors: Vec<String> = self.errors.iter().map(ToString::to_string).collect();
        match errors.as_slice() {
            [] => None,
            [single] => Some(format!("{}.{} {:?} is invalid: {}", kind, group, name, single)),
            all => Some(format!(
                "{}.{} {:?} is invalid: [{}]",
                kind,
                group,
                name,
                all.join(", ")
            )),
        }
    }
}

pub trait AdmissionValidator<K>: Send + Sync {
    fn validate_create(&self, obj: K) -> AdmissionOutcome;

    fn validate_update(&self, old: K, new: K) -> AdmissionOutcome;

    fn validate_delete(&self, _obj: &K) -> AdmissionOutcome {
        AdmissionOutcome::allowed()
    }
}

pub trait AdmissionDefaulter<K>: Send + Sync {
    fn apply_defaults(&self, obj: &mut K);
}

/// Register the validating and mutating endpoints of every webhook,
/// in a fixed order: cluster, backup, scheduled backup, pooler.
pub fn register_webhooks(router: &mut Router, config: &OperatorConfiguration) -> Result<()> {
    let defaults = MandatoryMetadata::from_config(config);

    register_webhook::<Cluster, _>(router, Arc::new(ClusterWebhook::new(defaults.clone())))?;
    register_webhook::<Backup, _>(router, Arc::new(BackupWebhook::new(defaults.clone())))?;
    register_webhook::<ScheduledBackup, _>(router, Arc::new(ScheduledBackupWebhook::new(defaults.clone())))?;
    register_webhook::<Pooler, _>(router, Arc::new(PoolerWebhook::new(defaults)))?;

    info!("Registered admission webhooks");
    Ok(())
}
