// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0
use super::LocalObjectReference;
use kube::CustomResource;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A connection pooler fronting a database Cluster
#[derive(CustomResource, Serialize, Deserialize, Clone, Debug, Default, PartialEq, schemars::JsonSchema)]
#[kube(group = "postgresql.cnpg.io", version = "v1", kind = "Pooler")]
#[kube(namespaced)]
#[kube(status = "PoolerStatus")]
#[kube(derive = "PartialEq")]
#[serde(rename_all = "camelCase")]
pub struct PoolerSpec {
    /// The Cluster this pooler connects to
    pub cluster: LocalObjectReference,
    #[serde(rename = "type", default)]
    pub pooler_type: PoolerType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instances: Option<i32>,
    #[serde(rename = "pgbouncer", skip_serializing_if = "Option::is_none")]
    pub pg_bouncer: Option<PgBouncerSpec>,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq, schemars::JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum PoolerType {
    #[default]
    Rw,
    Ro,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq, schemars::JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum PgBouncerPoolMode {
    #[default]
    Session,
    Transaction,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct PgBouncerSpec {
    #[serde(default)]
    pub pool_mode: PgBouncerPoolMode,
    /// Secret holding the credentials used to run the auth query
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auth_query_secret: Option<LocalObjectReference>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub auth_query: String,
    /// PgBouncer runtime parameters
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub parameters: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub paused: Option<bool>,
}

impl PgBouncerSpec {
    /// Name of the auth query secret, if one is set and non-empty
    pub fn auth_query_secret_name(&self) -> Option<&str> {
        self.auth_query_secret
            .as_ref()
            .map(|s| s.name.as_str())
            .filter(|name| !name.is_empty())
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct PoolerStatus {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instances: Option<i32>,
}

impl Pooler {
    /// Whether the operator can wire this pooler to its Cluster on its own.
    ///
    /// A custom auth query or auth query secret means the user owns the
    /// integration.
    pub fn is_automated_integration(&self) -> bool {
        match &self.spec.pg_bouncer {
            None => true,
            Some(pgbouncer) => {
                pgbouncer.auth_query_secret_name().is_none() && pgbouncer.auth_query.is_empty()
            }
        }
    }

    pub fn cluster_name(&self) -> &str {
        &self.spec.cluster.name
    }
}
