// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Kubernetes utilities for capability discovery and configuration loading.

pub mod config_source;
pub mod discovery;

pub use config_source::{load_configuration, read_config_map, read_secret};
pub use discovery::KubeDiscovery;
