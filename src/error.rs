// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0
use crate::bootstrap::BootstrapStep;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum OperatorError {
    #[error("Kubernetes API error: {0}")]
    KubeError(#[from] kube::Error),

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Invalid configuration: {0}")]
    ConfigError(String),

    #[error("Unable to read configuration source {kind} '{namespace}/{name}': {reason}")]
    ConfigSourceError {
        kind: &'static str,
        namespace: String,
        name: String,
        reason: String,
    },

    #[error("Discovery probe failed: {0}")]
    DiscoveryError(String),

    #[error("Unable to build manager: {0}")]
    ManagerError(String),

    #[error("PKI setup failed: {0}")]
    PkiError(String),

    #[error("Plugin discovery failed: {0}")]
    PluginError(String),

    #[error("Unable to register {kind} '{name}': {reason}")]
    RegistrationError {
        kind: &'static str,
        name: String,
        reason: String,
    },

    #[error("Webhook server error: {0}")]
    WebhookError(String),

    #[error("Leader election failed: {0}")]
    LeaderElectionError(String),

    #[error("Bootstrap step '{step}' cannot run after '{last}'")]
    OutOfOrder {
        step: BootstrapStep,
        last: BootstrapStep,
    },

    #[error("Bootstrap step '{step}' failed: {source}")]
    Bootstrap {
        step: BootstrapStep,
        #[source]
        source: Box<OperatorError>,
    },
}

pub type Result<T> = std::result::Result<T, OperatorError>;
