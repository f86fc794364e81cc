// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! The manager owns the API client, the cache plan, the webhook server and
//! the registered controller loops, and runs them until shutdown.

use crate::cache::CacheScopePlan;
use crate::config::LeaderElectionConfig;
use crate::constants::webhook;
use crate::error::{OperatorError, Result};
use crate::leader::LeaderElector;
use crate::server::{self, Router};
use futures::future::{self, BoxFuture};
use kube::Client;
use std::future::Future;
use std::path::{Path, PathBuf};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{error, info, warn};

/// Listening port and certificate location of the webhook server
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebhookServerOptions {
    pub port: u16,
    pub cert_dir: PathBuf,
    pub cert_name: String,
    pub key_name: String,
}

impl Default for WebhookServerOptions {
    fn default() -> Self {
        Self {
            port: webhook::DEFAULT_PORT,
            cert_dir: PathBuf::from(webhook::DEFAULT_CERT_DIR),
            cert_name: webhook::SELF_MANAGED_CERT_NAME.to_string(),
            key_name: webhook::SELF_MANAGED_KEY_NAME.to_string(),
        }
    }
}

impl WebhookServerOptions {
    pub fn cert_path(&self) -> PathBuf {
        self.cert_dir.join(&self.cert_name)
    }

    pub fn key_path(&self) -> PathBuf {
        self.cert_dir.join(&self.key_name)
    }
}

#[derive(Default)]
pub struct WebhookServer {
    pub options: WebhookServerOptions,
    router: Router,
}

impl WebhookServer {
    pub fn new(options: WebhookServerOptions) -> Self {
        Self {
            options,
            router: Router::new(),
        }
    }

    /// Request multiplexer the webhooks and probes are registered on
    pub fn router_mut(&mut self) -> &mut Router {
        &mut self.router
    }

    pub fn router(&self) -> &Router {
        &self.router
    }

    async fn verify_certificates(&self) -> Result<()> {
        for path in [self.options.cert_path(), self.options.key_path()] {
            ensure_file(&path).await?;
        }
        Ok(())
    }
}

async fn ensure_file(path: &Path) -> Result<()> {
    match tokio::fs::metadata(path).await {
        Ok(metadata) if metadata.is_file() => Ok(()),
        Ok(_) => Err(OperatorError::WebhookError(format!("{} is not a file", path.display()))),
        Err(e) => Err(OperatorError::WebhookError(format!(
            "certificate material {} unavailable: {}",
            path.display(),
            e
        ))),
    }
}

pub struct ManagerOptions {
    pub operator_namespace: String,
    pub cache: CacheScopePlan,
    pub leader_election: LeaderElectionConfig,
    pub webhook: WebhookServerOptions,
}

pub type ControllerFuture = BoxFuture<'static, ()>;

pub struct Manager {
    kube_config: kube::Config,
    client: Client,
    operator_namespace: String,
    cache: CacheScopePlan,
    leader_election: LeaderElectionConfig,
    webhook_server: WebhookServer,
    controllers: Vec<(String, ControllerFuture)>,
}

impl Manager {
    pub fn new(kube_config: kube::Config, options: ManagerOptions) -> Result<Self> {
        let client = Client::try_from(kube_config.clone())
            .map_err(|e| OperatorError::ManagerError(format!("Failed to create client: {}", e)))?;

        Ok(Self {
            kube_config,
            client,
            operator_namespace: options.operator_namespace,
            cache: options.cache,
            leader_election: options.leader_election,
            webhook_server: WebhookServer::new(options.webhook),
            controllers: Vec::new(),
        })
    }

    /// The API server configuration the manager resolved
    pub fn kube_config(&self) -> &kube::Config {
        &self.kube_config
    }

    pub fn client(&self) -> Client {
        self.client.clone()
    }

    pub fn cache_plan(&self) -> &CacheScopePlan {
        &self.cache
    }

    pub fn webhook_server(&self) -> &WebhookServer {
        &self.webhook_server
    }

    pub fn webhook_server_mut(&mut self) -> &mut WebhookServer {
        &mut self.webhook_server
    }

    /// Register a controller run loop. Names must be unique.
    pub fn add_controller(&mut self, name: &str, controller: ControllerFuture) -> Result<()> {
        if self.controllers.iter().any(|(existing, _)| existing == name) {
            return Err(OperatorError::RegistrationError {
                kind: "controller",
                name: name.to_string(),
                reason: "already registered".to_string(),
            });
        }
        info!("Registered controller {}", name);
        self.controllers.push((name.to_string(), controller));
        Ok(())
    }

    pub fn controller_names(&self) -> impl Iterator<Item = &str> {
        self.controllers.iter().map(|(name, _)| name.as_str())
    }

    /// Serve webhooks and, once leading, run the controllers until `shutdown`
    /// resolves or leadership is lost.
    pub async fn start<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send,
    {
        let Manager {
            client,
            operator_namespace,
            leader_election,
            webhook_server,
            controllers,
            ..
        } = self;

        webhook_server.verify_certificates().await?;
        let listener = TcpListener::bind(("0.0.0.0", webhook_server.options.port)).await?;
        let (stop_tx, mut stop_rx) = watch::channel(false);
        let mut webhook_task = tokio::spawn(server::serve(listener, webhook_server.router, async move {
            let _ = stop_rx.wait_for(|stop| *stop).await;
        }));

        tokio::pin!(shutdown);

        let lease = if leader_election.enabled {
            let elector = LeaderElector::new(client.clone(), &operator_namespace, &leader_election);
            tokio::select! {
                acquired = elector.acquire() => acquired?,
                _ = &mut shutdown => {
                    info!("Shutdown requested before acquiring leadership");
                    let _ = stop_tx.send(true);
                    return Ok(());
                }
            }
            Some(elector)
        } else {
            None
        };

        info!("Starting {} controllers", controllers.len());
        let controllers = future::join_all(controllers.into_iter().map(|(name, controller)| async move {
            controller.await;
            warn!("Controller {} stopped", name);
        }));
        let leadership = async {
            match &lease {
                Some(elector) => elector.hold().await,
                None => future::pending().await,
            }
        };

        let result = tokio::select! {
            _ = controllers => {
                // Controller streams only end when their watches are gone
                warn!("All controllers stopped");
                Ok(())
            }
            lost = leadership => lost,
            served = &mut webhook_task => match served {
                Ok(Ok(())) => Err(OperatorError::WebhookError("webhook server stopped".to_string())),
                Ok(Err(e)) => Err(e),
                Err(e) => Err(OperatorError::WebhookError(format!("webhook server panicked: {}", e))),
            },
            _ = &mut shutdown => {
                info!("Shutdown signal received");
                Ok(())
            }
        };

        if let Some(elector) = &lease {
            if let Err(e) = elector.release().await {
                error!("Failed to release leadership: {}", e);
            }
        }
        let _ = stop_tx.send(true);

        result
    }
}
