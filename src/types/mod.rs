// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Custom resources served under `postgresql.cnpg.io/v1`.

pub mod backup;
pub mod cluster;
pub mod pooler;

use serde::{Deserialize, Serialize};

pub use backup::{Backup, BackupSpec, ScheduledBackup, ScheduledBackupSpec};
pub use cluster::{Cluster, ClusterSpec, ImageCatalogRef};
pub use pooler::{PgBouncerSpec, Pooler, PoolerSpec};

/// Reference to an object in the same namespace
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq, schemars::JsonSchema)]
pub struct LocalObjectReference {
    #[serde(default)]
    pub name: String,
}

impl LocalObjectReference {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}
