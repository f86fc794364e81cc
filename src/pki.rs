// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Webhook certificate material: where it lives and how it gets there

use crate::config::OperatorConfiguration;
use crate::constants::webhook;
use crate::error::{OperatorError, Result};
use crate::manager::WebhookServerOptions;
use async_trait::async_trait;
use k8s_openapi::api::admissionregistration::v1::{
    MutatingWebhookConfiguration, ValidatingWebhookConfiguration, WebhookClientConfig,
};
use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::ByteString;
use kube::api::PostParams;
use kube::{Api, Client};
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, instrument};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CertificateMode {
    /// An external agent provides `apiserver.{crt,key}`
    External,
    /// The operator installs `tls.{crt,key}` itself
    SelfManaged,
}

/// Point the webhook server at the certificate files for the configured mode
pub fn resolve_certificates(config: &OperatorConfiguration, options: &mut WebhookServerOptions) -> CertificateMode {
    if config.uses_external_certificates() {
        options.cert_dir = PathBuf::from(&config.webhook_cert_dir);
        options.cert_name = webhook::EXTERNAL_CERT_NAME.to_string();
        options.key_name = webhook::EXTERNAL_KEY_NAME.to_string();
        info!("Using webhook certificates provided in {}", options.cert_dir.display());
        CertificateMode::External
    } else {
        options.cert_name = webhook::SELF_MANAGED_CERT_NAME.to_string();
        options.key_name = webhook::SELF_MANAGED_KEY_NAME.to_string();
        info!("Operator manages its webhook certificates in {}", options.cert_dir.display());
        CertificateMode::SelfManaged
    }
}

/// Everything the PKI manager needs to install webhook certificates
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PkiConfig {
    pub ca_secret_name: String,
    pub cert_dir: PathBuf,
    pub secret_name: String,
    pub service_name: String,
    pub operator_namespace: String,
    pub mutating_webhook_name: String,
    pub validating_webhook_name: String,
    pub operator_selector: String,
}

impl PkiConfig {
    pub fn new(config: &OperatorConfiguration, cert_dir: &Path) -> Self {
        Self {
            ca_secret_name: config.pki.ca_secret_name.clone(),
            cert_dir: cert_dir.to_path_buf(),
            secret_name: config.pki.webhook_secret_name.clone(),
            service_name: config.pki.webhook_service_name.clone(),
            operator_namespace: config.operator_namespace.clone(),
            mutating_webhook_name: config.pki.mutating_webhook_name.clone(),
            validating_webhook_name: config.pki.validating_webhook_name.clone(),
            operator_selector: config.pki.operator_selector.clone(),
        }
    }
}

#[async_trait]
pub trait PkiManager: Send + Sync {
    /// Make sure the certificate pair is in `cert_dir` and the CA bundle is
    /// installed in the webhook configurations. Must be idempotent.
    async fn ensure(&self, pki: &PkiConfig) -> Result<()>;
}

/// PKI manager reading pre-provisioned CA and leaf certificates from Secrets
pub struct SecretPkiManager {
    client: Client,
}

impl SecretPkiManager {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    async fn read_secret_key(&self, secrets: &Api<Secret>, name: &str, key: &str) -> Result<Vec<u8>> {
        let secret = secrets
            .get_opt(name)
            .await?
            .ok_or_else(|| OperatorError::PkiError(format!("secret {} not found", name)))?;

        secret
            .data
            .and_then(|mut data| data.remove(key))
            .map(|value| value.0)
            .filter(|value| !value.is_empty())
            .ok_or_else(|| OperatorError::PkiError(format!("secret {} has no {}", name, key)))
    }

    async fn install_ca_bundle(&self, pki: &PkiConfig, ca_bundle: &[u8]) -> Result<()> {
        let mutating: Api<MutatingWebhookConfiguration> = Api::all(self.client.clone());
        let mut config = mutating.get_opt(&pki.mutating_webhook_name).await?.ok_or_else(|| {
            OperatorError::PkiError(format!(
                "mutating webhook configuration {} not found",
                pki.mutating_webhook_name
            ))
        })?;
        let changed = config
            .webhooks
            .iter_mut()
            .flatten()
            .fold(false, |changed, hook| set_ca_bundle(&mut hook.client_config, ca_bundle) || changed);
        if changed {
            mutating
                .replace(&pki.mutating_webhook_name, &PostParams::default(), &config)
                .await?;
            info!("Installed CA bundle in {}", pki.mutating_webhook_name);
        }

        let validating: Api<ValidatingWebhookConfiguration> = Api::all(self.client.clone());
        let mut config = validating.get_opt(&pki.validating_webhook_name).await?.ok_or_else(|| {
            OperatorError::PkiError(format!(
                "validating webhook configuration {} not found",
                pki.validating_webhook_name
            ))
        })?;
        let changed = config
            .webhooks
            .iter_mut()
            .flatten()
            .fold(false, |changed, hook| set_ca_bundle(&mut hook.client_config, ca_bundle) || changed);
        if changed {
            validating
                .replace(&pki.validating_webhook_name, &PostParams::default(), &config)
                .await?;
            info!("Installed CA bundle in {}", pki.validating_webhook_name);
        }

        Ok(())
    }
}

fn set_ca_bundle(client_config: &mut WebhookClientConfig, ca_bundle: &[u8]) -> bool {
    if client_config.ca_bundle.as_ref().map(|b| b.0.as_slice()) == Some(ca_bundle) {
        return false;
    }
    client_config.ca_bundle = Some(ByteString(ca_bundle.to_vec()));
    true
}

/// Permissions of the webhook certificate file
const CERT_FILE_MODE: u32 = 0o644;
/// Permissions of the webhook private key file
const KEY_FILE_MODE: u32 = 0o600;

#[cfg_attr(not(unix), allow(unused_variables))]
async fn write_if_changed(path: &Path, contents: &[u8], mode: u32) -> Result<()> {
    if matches!(tokio::fs::read(path).await, Ok(existing) if existing == contents) {
        debug!("{} is up to date", path.display());
        return Ok(());
    }

    let mut options = tokio::fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    options.mode(mode);
    let mut file = options.open(path).await?;

    // The mode only applies on creation
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        file.set_permissions(std::fs::Permissions::from_mode(mode)).await?;
    }

    file.write_all(contents).await?;
    file.flush().await?;
    info!("Wrote {}", path.display());
    Ok(())
}

#[async_trait]
impl PkiManager for SecretPkiManager {
    #[instrument(skip(self, pki), fields(namespace = %pki.operator_namespace, service = %pki.service_name))]
    async fn ensure(&self, pki: &PkiConfig) -> Result<()> {
        debug!(selector = %pki.operator_selector, "Ensuring webhook PKI");
        let secrets: Api<Secret> = Api::namespaced(self.client.clone(), &pki.operator_namespace);

        let ca_bundle = self.read_secret_key(&secrets, &pki.ca_secret_name, "ca.crt").await?;
        let cert = self
            .read_secret_key(&secrets, &pki.secret_name, webhook::SELF_MANAGED_CERT_NAME)
            .await?;
        let key = self
            .read_secret_key(&secrets, &pki.secret_name, webhook::SELF_MANAGED_KEY_NAME)
            .await?;

        tokio::fs::create_dir_all(&pki.cert_dir).await?;
        write_if_changed(&pki.cert_dir.join(webhook::SELF_MANAGED_CERT_NAME), &cert, CERT_FILE_MODE).await?;
        write_if_changed(&pki.cert_dir.join(webhook::SELF_MANAGED_KEY_NAME), &key, KEY_FILE_MODE).await?;

        self.install_ca_bundle(pki, &ca_bundle).await
    }
}
