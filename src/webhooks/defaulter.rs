// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Injection of the operator's mandatory labels and annotations

use super::AdmissionDefaulter;
use crate::config::OperatorConfiguration;
use kube::{Resource, ResourceExt};
use std::collections::BTreeMap;

/// Labels and annotations every operator-managed object must carry
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MandatoryMetadata {
    pub labels: BTreeMap<String, String>,
    pub annotations: BTreeMap<String, String>,
}

impl MandatoryMetadata {
    pub fn from_config(config: &OperatorConfiguration) -> Self {
        Self {
            labels: config.mandatory_labels(),
            annotations: config.mandatory_annotations().clone(),
        }
    }

    /// Add every missing key; existing values are never overwritten.
    /// Returns whether the object changed.
    pub fn apply<K: Resource>(&self, obj: &mut K) -> bool {
        let mut changed = false;

        for (key, value) in &self.labels {
            if !obj.labels().contains_key(key) {
                obj.labels_mut().insert(key.clone(), value.clone());
                changed = true;
            }
        }
        for (key, value) in &self.annotations {
            if !obj.annotations().contains_key(key) {
                obj.annotations_mut().insert(key.clone(), value.clone());
                changed = true;
            }
        }

        changed
    }
}

impl<K: Resource> AdmissionDefaulter<K> for MandatoryMetadata {
    fn apply_defaults(&self, obj: &mut K) {
        self.apply(obj);
    }
}

/// Return `obj` with the mandatory labels and annotations filled in
pub fn apply_defaults<K: Resource>(
    mut obj: K,
    labels: &BTreeMap<String, String>,
    annotations: &BTreeMap<String, String>,
) -> K {
    let metadata = MandatoryMetadata {
        labels: labels.clone(),
        annotations: annotations.clone(),
    };
    metadata.apply(&mut obj);
    obj
}
