// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0
use anyhow::Result;
use tracing::info;
use tracing_subscriber::EnvFilter;

use pg_operator::bootstrap;
use pg_operator::config::StartupOptions;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("pg_operator=info,kube=info")),
        )
        .init();

    info!("Starting pg-operator");

    let options = StartupOptions::from_env()?;
    info!(
        "Startup options loaded: namespace={}, webhook_port={}, leader_election={}",
        options.operator_namespace, options.webhook_port, options.leader_election.enabled
    );

    bootstrap::run(options).await?;

    info!("pg-operator stopped");
    Ok(())
}
