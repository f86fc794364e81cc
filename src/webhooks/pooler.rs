// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Admission rules for `Pooler` resources

use super::{AdmissionDefaulter, AdmissionOutcome, AdmissionValidator, FieldError, MandatoryMetadata};
use crate::types::Pooler;
use kube::ResourceExt;
use tracing::info;

/// PgBouncer parameters users are allowed to set
pub const ALLOWED_PGBOUNCER_PARAMETERS: &[&str] = &[
    "application_name_add_host",
    "autodb_idle_timeout",
    "client_idle_timeout",
    "client_login_timeout",
    "default_pool_size",
    "disable_pqexec",
    "idle_transaction_timeout",
    "ignore_startup_parameters",
    "log_connections",
    "log_disconnections",
    "log_pooler_errors",
    "log_stats",
    "max_client_conn",
    "max_db_connections",
    "max_prepared_statements",
    "max_user_connections",
    "min_pool_size",
    "query_timeout",
    "query_wait_timeout",
    "reserve_pool_size",
    "reserve_pool_timeout",
    "server_check_delay",
    "server_check_query",
    "server_connect_timeout",
    "server_fast_close",
    "server_idle_timeout",
    "server_lifetime",
    "server_login_retry",
    "server_reset_query",
    "server_reset_query_always",
    "server_round_robin",
    "stats_period",
    "tcp_keepalive",
    "tcp_keepcnt",
    "tcp_keepidle",
    "tcp_keepintvl",
    "tcp_user_timeout",
    "verbose",
];

pub fn is_allowed_parameter(name: &str) -> bool {
    ALLOWED_PGBOUNCER_PARAMETERS.contains(&name)
}

/// Structural PgBouncer checks, at most one, followed by one error per
/// rejected parameter
pub fn validate_pg_bouncer(pooler: &Pooler) -> Vec<FieldError> {
    let Some(pgbouncer) = &pooler.spec.pg_bouncer else {
        return vec![FieldError::invalid(
            &["spec", "pgbouncer"],
            "",
            "required pgbouncer configuration",
        )];
    };

    let mut errors = Vec::new();

    match (pgbouncer.auth_query_secret_name(), pgbouncer.auth_query.is_empty()) {
        (Some(_), true) => errors.push(FieldError::invalid(
            &["spec", "pgbouncer", "authQuery"],
            "",
            "must specify an auth query when providing an auth query secret",
        )),
        (None, false) => errors.push(FieldError::invalid(
            &["spec", "pgbouncer", "authQuerySecret", "name"],
            "",
            "must specify an existing auth query secret when providing an auth query secret",
        )),
        _ => {}
    }

    for key in pgbouncer.parameters.keys() {
        if !is_allowed_parameter(key) {
            errors.push(FieldError::invalid(
                &["spec", "cluster", "parameters"],
                key.clone(),
                "Invalid or reserved parameter",
            ));
        }
    }

    errors
}

pub fn validate_cluster(pooler: &Pooler) -> Vec<FieldError> {
    let mut errors = Vec::new();
    let cluster = pooler.cluster_name();

    if cluster.is_empty() {
        errors.push(FieldError::invalid(
            &["spec", "cluster", "name"],
            "",
            "must specify a cluster name",
        ));
    }
    if cluster == pooler.name_any() {
        errors.push(FieldError::invalid(
            &["metadata", "name"],
            pooler.name_any(),
            "the pooler resource cannot have the same name of a cluster",
        ));
    }

    errors
}

pub fn validate(pooler: &Pooler) -> Vec<FieldError> {
    let mut errors = validate_pg_bouncer(pooler);
    errors.extend(validate_cluster(pooler));
    errors
}

fn manual_configuration_warning(pooler: &Pooler) -> String {
    format!(
        "The operator won't handle the Pooler {:?} integration with the Cluster {:?} ({:?}). \
         Manually configure it as described in the docs.",
        pooler.name_any(),
        pooler.cluster_name(),
        pooler.namespace().unwrap_or_default()
    )
}

pub struct PoolerWebhook {
    defaults: MandatoryMetadata,
}

impl PoolerWebhook {
    pub fn new(defaults: MandatoryMetadata) -> Self {
        Self { defaults }
    }
}

impl AdmissionDefaulter<Pooler> for PoolerWebhook {
    fn apply_defaults(&self, obj: &mut Pooler) {
        self.defaults.apply(obj);
    }
}

impl AdmissionValidator<Pooler> for PoolerWebhook {
    fn validate_create(&self, mut pooler: Pooler) -> AdmissionOutcome {
        self.apply_defaults(&mut pooler);
        info!(name = %pooler.name_any(), namespace = ?pooler.namespace(), "Validation for Pooler create");

        let mut outcome = AdmissionOutcome::with_errors(validate(&pooler));
        if !pooler.is_automated_integration() {
            info!(name = %pooler.name_any(), "Pooler not automatically configured");
            outcome.warnings.push(manual_configuration_warning(&pooler));
        }
        outcome
    }

    fn validate_update(&self, mut old: Pooler, mut new: Pooler) -> AdmissionOutcome {
        self.apply_defaults(&mut old);
        self.apply_defaults(&mut new);
        info!(name = %new.name_any(), namespace = ?new.namespace(), "Validation for Pooler update");

        let mut outcome = AdmissionOutcome::with_errors(validate(&new));
        if old.is_automated_integration() && !new.is_automated_integration() {
            info!(name = %new.name_any(), "Pooler not automatically configured");
            outcome.warnings.push(manual_configuration_warning(&new));
        }
        outcome
    }
}
