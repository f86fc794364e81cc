// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Leader election on a `coordination.k8s.io/v1` Lease

use crate::config::LeaderElectionConfig;
use crate::constants::leader::LEASE_NAME;
use crate::error::{OperatorError, Result};
use async_trait::async_trait;
use kube::Client;
use kube_leader_election::{LeaseLock, LeaseLockParams};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// A single round against the lease
#[async_trait]
pub trait LeaseRound: Send + Sync {
    /// Acquire or renew; returns whether this instance holds the lease afterwards
    async fn acquire_or_renew(&self) -> Result<bool>;

    /// Give the lease up if this instance holds it
    async fn step_down(&self) -> Result<()>;
}

#[async_trait]
impl LeaseRound for LeaseLock {
    async fn acquire_or_renew(&self) -> Result<bool> {
        self.try_acquire_or_renew()
            .await
            .map(|result| result.acquired_lease)
            .map_err(|e| OperatorError::LeaderElectionError(e.to_string()))
    }

    async fn step_down(&self) -> Result<()> {
        LeaseLock::step_down(self)
            .await
            .map_err(|e| OperatorError::LeaderElectionError(e.to_string()))
    }
}

/// Drives a lease: waits for leadership, keeps it renewed and releases it
pub struct LeaderElector<L = LeaseLock> {
    lock: L,
    holder_id: String,
    renew_deadline: Duration,
    retry_period: Duration,
}

impl LeaderElector {
    pub fn new(client: Client, namespace: &str, config: &LeaderElectionConfig) -> Self {
        let lock = LeaseLock::new(
            client,
            namespace,
            LeaseLockParams {
                holder_id: config.holder_id.clone(),
                lease_name: LEASE_NAME.to_string(),
                lease_ttl: config.lease_duration,
            },
        );
        Self::with_lock(lock, config)
    }
}

impl<L: LeaseRound> LeaderElector<L> {
    pub fn with_lock(lock: L, config: &LeaderElectionConfig) -> Self {
        Self {
            lock,
            holder_id: config.holder_id.clone(),
            renew_deadline: config.renew_deadline,
            retry_period: config.retry_period,
        }
    }

    /// One round, bounded by `budget`
    async fn round(&self, budget: Duration) -> Result<bool> {
        match tokio::time::timeout(budget, self.lock.acquire_or_renew()).await {
            Ok(result) => result,
            Err(_) => Err(OperatorError::LeaderElectionError(format!(
                "lease {} round did not complete within {:?}",
                LEASE_NAME, budget
            ))),
        }
    }

    /// Block until this instance holds the lease
    pub async fn acquire(&self) -> Result<()> {
        info!(holder_id = %self.holder_id, lease_name = LEASE_NAME, "Waiting to acquire leadership");
        loop {
            match self.round(self.renew_deadline).await {
                Ok(true) => {
                    info!(lease_name = LEASE_NAME, "Acquired leadership");
                    return Ok(());
                }
                Ok(false) => debug!("Another instance is leader, waiting"),
                Err(e) => warn!("Failed to acquire lease: {}, retrying", e),
            }
            tokio::time::sleep(self.retry_period).await;
        }
    }

    /// Keep renewing the lease. Only returns when leadership is lost, which
    /// includes not completing a renewal within the renew deadline.
    pub async fn hold(&self) -> Result<()> {
        let mut last_renewed = Instant::now();
        loop {
            tokio::time::sleep(self.retry_period).await;

            let remaining = self.renew_deadline.saturating_sub(last_renewed.elapsed());
            if remaining.is_zero() {
                return Err(OperatorError::LeaderElectionError(format!(
                    "could not renew lease {} within {:?}",
                    LEASE_NAME, self.renew_deadline
                )));
            }

            match self.round(remaining).await {
                Ok(true) => last_renewed = Instant::now(),
                Ok(false) => {
                    return Err(OperatorError::LeaderElectionError(format!(
                        "lease {} taken over by another instance",
                        LEASE_NAME
                    )))
                }
                Err(e) => warn!("Failed to renew lease {}: {}", LEASE_NAME, e),
            }
        }
    }

    /// Step down, giving up after the renew deadline
    pub async fn release(&self) -> Result<()> {
        match tokio::time::timeout(self.renew_deadline, self.lock.step_down()).await {
            Ok(result) => result?,
            Err(_) => {
                return Err(OperatorError::LeaderElectionError(format!(
                    "could not release lease {} within {:?}",
                    LEASE_NAME, self.renew_deadline
                )))
            }
        }
        info!(lease_name = LEASE_NAME, "Released leadership");
        Ok(())
    }
}
