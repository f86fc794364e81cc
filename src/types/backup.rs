// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0
use super::LocalObjectReference;
use kube::CustomResource;
use serde::{Deserialize, Serialize};

/// An on-demand backup of a Cluster
#[derive(CustomResource, Serialize, Deserialize, Clone, Debug, Default, PartialEq, schemars::JsonSchema)]
#[kube(group = "postgresql.cnpg.io", version = "v1", kind = "Backup")]
#[kube(namespaced)]
#[kube(derive = "PartialEq")]
#[serde(rename_all = "camelCase")]
pub struct BackupSpec {
    pub cluster: LocalObjectReference,
    /// Backup method, e.g. `barmanObjectStore`, `volumeSnapshot` or `plugin`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
}

/// A cron-scheduled Backup
#[derive(CustomResource, Serialize, Deserialize, Clone, Debug, Default, PartialEq, schemars::JsonSchema)]
#[kube(group = "postgresql.cnpg.io", version = "v1", kind = "ScheduledBackup")]
#[kube(namespaced)]
#[kube(derive = "PartialEq")]
#[serde(rename_all = "camelCase")]
pub struct ScheduledBackupSpec {
    #[serde(default)]
    pub schedule: String,
    pub cluster: LocalObjectReference,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suspend: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub immediate: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
}
