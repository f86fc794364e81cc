// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0
use super::{AdmissionDefaulter, AdmissionOutcome, AdmissionValidator, FieldError, MandatoryMetadata};
use crate::types::Cluster;
use kube::ResourceExt;
use tracing::debug;

pub struct ClusterWebhook {
    defaults: MandatoryMetadata,
}

impl ClusterWebhook {
    pub fn new(defaults: MandatoryMetadata) -> Self {
        Self { defaults }
    }

    fn validate(&self, cluster: &Cluster) -> AdmissionOutcome {
        debug!(name = %cluster.name_any(), "Validating Cluster");

        let mut errors = Vec::new();
        if cluster.spec.instances < 1 {
            errors.push(FieldError::invalid(
                &["spec", "instances"],
                cluster.spec.instances.to_string(),
                "the number of instances must be at least 1",
            ));
        }
        AdmissionOutcome::with_errors(errors)
    }
}

impl AdmissionDefaulter<Cluster> for ClusterWebhook {
    fn apply_defaults(&self, obj: &mut Cluster) {
        self.defaults.apply(obj);
    }
}

impl AdmissionValidator<Cluster> for ClusterWebhook {
    fn validate_create(&self, obj: Cluster) -> AdmissionOutcome {
        self.validate(&obj)
    }

    fn validate_update(&self, _old: Cluster, new: Cluster) -> AdmissionOutcome {
        self.validate(&new)
    }
}
