// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Startup sequence taking the operator from stopped to serving.
//!
//! Steps run strictly in order and the first failure aborts the sequence.
//! The supervisor is expected to restart the process.

use crate::cache::{select_scope, CacheScopePlan};
use crate::capabilities::negotiate;
use crate::config::{env_overrides, OperatorConfiguration, StartupOptions};
use crate::constants::diagnostics;
use crate::controllers::register_controllers;
use crate::error::{OperatorError, Result};
use crate::kubernetes::{load_configuration, KubeDiscovery};
use crate::manager::{Manager, ManagerOptions, WebhookServerOptions};
use crate::pki::{resolve_certificates, CertificateMode, PkiConfig, PkiManager, SecretPkiManager};
use crate::plugins::PluginRepository;
use crate::server::{self, json_document, readiness_probe, Router};
use crate::webhooks::register_webhooks;
use kube::Client;
use std::fmt;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, info_span, warn, Instrument};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum BootstrapStep {
    Stopped,
    LoadConfiguration,
    NegotiateCapabilities,
    BuildManager,
    ResolveCertificates,
    BuildClient,
    EnsurePki,
    LoadPlugins,
    Register,
    InstallProbes,
    Serve,
}

impl BootstrapStep {
    /// The only step allowed to follow this one
    pub fn next(self) -> Option<BootstrapStep> {
        use BootstrapStep::*;
        match self {
            Stopped => Some(LoadConfiguration),
            LoadConfiguration => Some(NegotiateCapabilities),
            NegotiateCapabilities => Some(BuildManager),
            BuildManager => Some(ResolveCertificates),
            ResolveCertificates => Some(BuildClient),
            BuildClient => Some(EnsurePki),
            EnsurePki => Some(LoadPlugins),
            LoadPlugins => Some(Register),
            Register => Some(InstallProbes),
            InstallProbes => Some(Serve),
            Serve => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            BootstrapStep::Stopped => "stopped",
            BootstrapStep::LoadConfiguration => "load-configuration",
            BootstrapStep::NegotiateCapabilities => "negotiate-capabilities",
            BootstrapStep::BuildManager => "build-manager",
            BootstrapStep::ResolveCertificates => "resolve-certificates",
            BootstrapStep::BuildClient => "build-client",
            BootstrapStep::EnsurePki => "ensure-pki",
            BootstrapStep::LoadPlugins => "load-plugins",
            BootstrapStep::Register => "register",
            BootstrapStep::InstallProbes => "install-probes",
            BootstrapStep::Serve => "serve",
        }
    }
}

impl fmt::Display for BootstrapStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Enforces the step order and the fail-fast policy
#[derive(Debug)]
pub struct Sequencer {
    last: BootstrapStep,
    failed: bool,
}

impl Default for Sequencer {
    fn default() -> Self {
        Self {
            last: BootstrapStep::Stopped,
            failed: false,
        }
    }
}

impl Sequencer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Last step that completed
    pub fn last(&self) -> BootstrapStep {
        self.last
    }

    pub fn has_failed(&self) -> bool {
        self.failed
    }

    /// Run `step`, which must directly follow the last completed step.
    /// Once a step has failed, no further step runs.
    pub async fn step<T, F>(&mut self, step: BootstrapStep, work: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        if self.failed || self.last.next() != Some(step) {
            return Err(OperatorError::OutOfOrder { step, last: self.last });
        }

        let span = info_span!("bootstrap", step = %step);
        match work.instrument(span).await {
            Ok(value) => {
                info!(%step, "Bootstrap step completed");
                self.last = step;
                Ok(value)
            }
            Err(e) => {
                error!(%step, error = %e, "Bootstrap step failed");
                self.failed = true;
                Err(OperatorError::Bootstrap {
                    step,
                    source: Box::new(e),
                })
            }
        }
    }
}

/// Routes of the diagnostics server
pub fn diagnostics_router(config: &OperatorConfiguration, plan: &CacheScopePlan) -> Result<Router> {
    let mut router = Router::new();
    router.route("/debug/configuration", json_document(config)?)?;
    router.route("/debug/cache-scope", json_document(plan)?)?;
    Ok(router)
}

async fn start_diagnostics(
    addr: SocketAddr,
    router: Router,
    mut stop: watch::Receiver<bool>,
) -> Result<JoinHandle<Result<()>>> {
    let listener = TcpListener::bind(addr).await?;
    info!("Diagnostics server listening on {}", addr);
    Ok(tokio::spawn(server::serve(listener, router, async move {
        let _ = stop.wait_for(|stop| *stop).await;
    })))
}

async fn stop_diagnostics(handle: JoinHandle<Result<()>>) {
    let grace = Duration::from_secs(diagnostics::SHUTDOWN_GRACE_PERIOD_SECS);
    match tokio::time::timeout(grace, handle).await {
        Ok(Ok(Ok(()))) => info!("Diagnostics server stopped"),
        Ok(Ok(Err(e))) => warn!("Diagnostics server failed: {}", e),
        Ok(Err(e)) => warn!("Diagnostics server task failed: {}", e),
        Err(_) => warn!("Diagnostics server did not stop within {:?}", grace),
    }
}

#[allow(clippy::expect_used)]
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, shutting down"),
        _ = terminate => info!("Received SIGTERM, shutting down"),
    }
}

fn kube_client(config: &kube::Config) -> Result<Client> {
    Ok(Client::try_from(config.clone())?)
}

/// Bring the operator up and serve until shutdown
pub async fn run(options: StartupOptions) -> Result<()> {
    use BootstrapStep::*;
    let mut sequencer = Sequencer::new();

    let (kube_config, config) = sequencer
        .step(LoadConfiguration, async {
            let kube_config = kube::Config::infer()
                .await
                .map_err(|e| OperatorError::ManagerError(format!("Failed to infer Kubernetes config: {}", e)))?;
            let client = kube_client(&kube_config)?;
            let config = load_configuration(
                &client,
                &options.operator_namespace,
                &options.config_map_name,
                &options.secret_name,
                &env_overrides(),
            )
            .await?;
            Ok((kube_config, config))
        })
        .await?;

    let config = sequencer
        .step(NegotiateCapabilities, async {
            let discovery = KubeDiscovery::new(kube_client(&kube_config)?, options.probe_timeout);
            Ok(negotiate(&discovery, config).await)
        })
        .await?;
    let config = Arc::new(config);

    let plan = select_scope(&config);
    debug!(cached_namespaces = ?plan.cached_namespaces(), "Cache scope selected");
    let mut manager = sequencer
        .step(BuildManager, async {
            Manager::new(
                kube_config,
                ManagerOptions {
                    operator_namespace: config.operator_namespace.clone(),
                    cache: plan.clone(),
                    leader_election: options.leader_election.clone(),
                    webhook: WebhookServerOptions {
                        port: options.webhook_port,
                        ..Default::default()
                    },
                },
            )
        })
        .await?;

    let certificates = sequencer
        .step(ResolveCertificates, async {
            Ok(resolve_certificates(&config, &mut manager.webhook_server_mut().options))
        })
        .await?;

    let client = sequencer
        .step(BuildClient, async { kube_client(manager.kube_config()) })
        .await?;

    sequencer
        .step(EnsurePki, async {
            if certificates == CertificateMode::External {
                info!("Webhook certificates are managed externally, skipping PKI setup");
                return Ok(());
            }
            let pki = PkiConfig::new(&config, &manager.webhook_server().options.cert_dir);
            SecretPkiManager::new(client.clone()).ensure(&pki).await
        })
        .await?;

    let plugins = sequencer
        .step(LoadPlugins, async {
            let mut plugins = PluginRepository::new();
            match plugins
                .register_unix_socket_plugins_in_path(&config.plugin_socket_dir)
                .await
            {
                Ok(names) => info!(plugins = ?names, "Loaded plugins"),
                Err(e) => warn!("Skipping plugins: {}", e),
            }
            Ok(Arc::new(plugins))
        })
        .await?;

    sequencer
        .step(Register, async {
            register_controllers(&mut manager, &config, &plugins)?;
            register_webhooks(manager.webhook_server_mut().router_mut(), &config)
        })
        .await?;

    sequencer
        .step(InstallProbes, async {
            let router = manager.webhook_server_mut().router_mut();
            router.route("/readyz", readiness_probe())?;
            router.route("/healthz", readiness_probe())
        })
        .await?;

    sequencer
        .step(Serve, async {
            let (shutdown_tx, shutdown_rx) = watch::channel(false);
            let shutdown_tx = Arc::new(shutdown_tx);
            let signal_tx = shutdown_tx.clone();
            tokio::spawn(async move {
                shutdown_signal().await;
                let _ = signal_tx.send(true);
            });

            // Follows the shutdown signal directly, not the manager's teardown
            let diagnostics = match options.debug_server {
                Some(addr) => {
                    let router = diagnostics_router(&config, &plan)?;
                    Some(start_diagnostics(addr, router, shutdown_rx.clone()).await?)
                }
                None => None,
            };

            info!("Starting manager");
            let mut manager_rx = shutdown_rx.clone();
            let result = manager
                .start(async move {
                    let _ = manager_rx.wait_for(|stop| *stop).await;
                })
                .await;

            // The manager may also return on its own, e.g. after losing leadership
            let _ = shutdown_tx.send(true);
            if let Some(handle) = diagnostics {
                stop_diagnostics(handle).await;
            }
            result
        })
        .await
}
