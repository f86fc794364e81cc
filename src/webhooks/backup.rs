// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0
use super::{AdmissionDefaulter, AdmissionOutcome, AdmissionValidator, FieldError, MandatoryMetadata};
use crate::types::{Backup, LocalObjectReference, ScheduledBackup};

fn validate_cluster_reference(cluster: &LocalObjectReference, errors: &mut Vec<FieldError>) {
    if cluster.name.is_empty() {
        errors.push(FieldError::invalid(
            &["spec", "cluster", "name"],
            "",
            "must specify a cluster name",
        ));
    }
}

pub struct BackupWebhook {
    defaults: MandatoryMetadata,
}

impl BackupWebhook {
    pub fn new(defaults: MandatoryMetadata) -> Self {
        Self { defaults }
    }

    fn validate(&self, backup: &Backup) -> AdmissionOutcome {
        let mut errors = Vec::new();
        validate_cluster_reference(&backup.spec.cluster, &mut errors);
        AdmissionOutcome::with_errors(errors)
    }
}

impl AdmissionDefaulter<Backup> for BackupWebhook {
    fn apply_defaults(&self, obj: &mut Backup) {
        self.defaults.apply(obj);
    }
}

impl AdmissionValidator<Backup> for BackupWebhook {
    fn validate_create(&self, obj: Backup) -> AdmissionOutcome {
        self.validate(&obj)
    }

    fn validate_update(&self, _old: Backup, new: Backup) -> AdmissionOutcome {
        self.validate(&new)
    }
}

pub struct ScheduledBackupWebhook {
    defaults: MandatoryMetadata,
}

impl ScheduledBackupWebhook {
    pub fn new(defaults: MandatoryMetadata) -> Self {
        Self { defaults }
    }

    fn validate(&self, scheduled: &ScheduledBackup) -> AdmissionOutcome {
        let mut errors = Vec::new();
        if scheduled.spec.schedule.trim().is_empty() {
            errors.push(FieldError::invalid(
                &["spec", "schedule"],
                scheduled.spec.schedule.clone(),
                "must specify a schedule",
            ));
        }
        validate_cluster_reference(&scheduled.spec.cluster, &mut errors);
        AdmissionOutcome::with_errors(errors)
    }
}

impl AdmissionDefaulter<ScheduledBackup> for ScheduledBackupWebhook {
    fn apply_defaults(&self, obj: &mut ScheduledBackup) {
        self.defaults.apply(obj);
    }
}

impl AdmissionValidator<ScheduledBackup> for ScheduledBackupWebhook {
    fn validate_create(&self, obj: ScheduledBackup) -> AdmissionOutcome {
        self.validate(&obj)
    }

    fn validate_update(&self, _old: ScheduledBackup, new: ScheduledBackup) -> AdmissionOutcome {
        self.validate(&new)
    }
}
