// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Reading the operator configuration from its ConfigMap and Secret

use crate::config::OperatorConfiguration;
use crate::error::{OperatorError, Result};
use k8s_openapi::api::core::v1::{ConfigMap, Secret};
use kube::{Api, Client};
use std::collections::BTreeMap;
use tracing::{info, instrument};

/// Read the data of a ConfigMap. A missing ConfigMap or an empty name yields `None`.
#[instrument(skip(client))]
pub async fn read_config_map(
    client: &Client,
    namespace: &str,
    name: &str,
) -> Result<Option<BTreeMap<String, String>>> {
    if name.is_empty() || namespace.is_empty() {
        return Ok(None);
    }

    info!("Loading configuration from ConfigMap '{}/{}'", namespace, name);

    let config_maps: Api<ConfigMap> = Api::namespaced(client.clone(), namespace);
    let config_map = config_maps
        .get_opt(name)
        .await
        .map_err(|e| source_error("ConfigMap", namespace, name, e.to_string()))?;

    Ok(config_map.map(|cm| cm.data.unwrap_or_default()))
}

/// Read the data of a Secret as strings. A missing Secret or an empty name yields `None`.
#[instrument(skip(client))]
pub async fn read_secret(
    client: &Client,
    namespace: &str,
    name: &str,
) -> Result<Option<BTreeMap<String, String>>> {
    if name.is_empty() || namespace.is_empty() {
        return Ok(None);
    }

    info!("Loading configuration from Secret '{}/{}'", namespace, name);

    let secrets: Api<Secret> = Api::namespaced(client.clone(), namespace);
    let Some(secret) = secrets
        .get_opt(name)
        .await
        .map_err(|e| source_error("Secret", namespace, name, e.to_string()))?
    else {
        return Ok(None);
    };

    let mut data = BTreeMap::new();
    for (key, value) in secret.data.unwrap_or_default() {
        let decoded = String::from_utf8(value.0).map_err(|e| {
            source_error("Secret", namespace, name, format!("key {} is not UTF-8: {}", key, e))
        })?;
        data.insert(key, decoded);
    }

    Ok(Some(data))
}

/// Merge the ConfigMap, then the Secret, then `overrides` into the operator configuration
pub async fn load_configuration(
    client: &Client,
    operator_namespace: &str,
    config_map_name: &str,
    secret_name: &str,
    overrides: &BTreeMap<String, String>,
) -> Result<OperatorConfiguration> {
    let config_map = read_config_map(client, operator_namespace, config_map_name).await?;
    let secret = read_secret(client, operator_namespace, secret_name).await?;

    let layers = config_map
        .iter()
        .chain(secret.iter())
        .chain(std::iter::once(overrides));

    OperatorConfiguration::from_layers(operator_namespace, layers)
}

fn source_error(kind: &'static str, namespace: &str, name: &str, reason: String) -> OperatorError {
    OperatorError::ConfigSourceError {
        kind,
        namespace: namespace.to_string(),
        name: name.to_string(),
        reason,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::keys;
    use crate::test_utils::{config_map_json, secret_json, status_json, MockService};

    #[tokio::test]
    async fn test_missing_sources_are_not_errors() {
        let client = MockService::new().into_client();

        let config = load_configuration(&client, "pg-system", "pg-config", "pg-config", &BTreeMap::new())
            .await
            .unwrap();

        assert_eq!(config, OperatorConfiguration::new("pg-system"));
    }

    #[tokio::test]
    async fn test_empty_names_skip_reads() {
        let client = MockService::new().into_client();

        assert_eq!(read_config_map(&client, "pg-system", "").await.unwrap(), None);
        assert_eq!(read_secret(&client, "pg-system", "").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_secret_overrides_config_map() {
        let client = MockService::new()
            .on_get(
                "/api/v1/namespaces/pg-system/configmaps/pg-config",
                200,
                &config_map_json(
                    "pg-system",
                    "pg-config",
                    &[
                        (keys::WATCH_NAMESPACE, "team-a"),
                        (keys::WEBHOOK_CERT_DIR, "/configmap"),
                    ],
                ),
            )
            .on_get(
                "/api/v1/namespaces/pg-system/secrets/pg-config",
                200,
                &secret_json("pg-system", "pg-config", &[(keys::WEBHOOK_CERT_DIR, "/secret")]),
            )
            .into_client();

        let config = load_configuration(&client, "pg-system", "pg-config", "pg-config", &BTreeMap::new())
            .await
            .unwrap();

        assert_eq!(config.webhook_cert_dir, "/secret");
        assert!(config.watched_namespaces.contains("team-a"));
    }

    #[tokio::test]
    async fn test_overrides_win() {
        let client = MockService::new()
            .on_get(
                "/api/v1/namespaces/pg-system/secrets/pg-config",
                200,
                &secret_json("pg-system", "pg-config", &[(keys::PLUGIN_SOCKET_DIR, "/secret")]),
            )
            .into_client();
        let overrides = BTreeMap::from([(keys::PLUGIN_SOCKET_DIR.to_string(), "/env".to_string())]);

        let config = load_configuration(&client, "pg-system", "", "pg-config", &overrides)
            .await
            .unwrap();

        assert_eq!(config.plugin_socket_dir, "/env");
    }

    #[tokio::test]
    async fn test_read_failure_other_than_not_found_is_fatal() {
        let client = MockService::new()
            .on_get(
                "/api/v1/namespaces/pg-system/configmaps/pg-config",
                403,
                &status_json(403, "Forbidden", "configmaps is forbidden"),
            )
            .into_client();

        let err = load_configuration(&client, "pg-system", "pg-config", "", &BTreeMap::new())
            .await
            .unwrap_err();

        assert!(matches!(err, OperatorError::ConfigSourceError { kind: "ConfigMap", .. }));
    }
}
