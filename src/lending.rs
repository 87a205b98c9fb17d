//! Periodic refresh of the principal's lending position.
//!
//! Runs beside the lending feed rather than inside it: the position is a
//! point-in-time contract read, not an event, so it has no ledger position
//! and never enters the merge store.

use alloy::primitives::Address;
use ledger_chain::{ChainReader, read_contract};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::bindings::ILendingPool;
use crate::decode::HEALTH_FACTOR_DECIMALS;
use crate::error::LendingError;
use crate::registry::{TokenRegistry, format_amount};

pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LendingPosition {
    pub collateral_value: String,
    pub debt: String,
    pub health_factor: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LendingMonitorConfig {
    pub lending_pool: Address,
    pub user: Address,
    pub refresh_interval: Duration,
    pub read_timeout: Duration,
}

pub async fn fetch_position<C: ChainReader + ?Sized>(
    chain: &C,
    config: &LendingMonitorConfig,
    registry: &TokenRegistry,
) -> Result<LendingPosition, LendingError> {
    let call = ILendingPool::getUserPositionCall { user: config.user };

    let position = tokio::time::timeout(
        config.read_timeout,
        read_contract(chain, config.lending_pool, &call),
    )
    .await
    .map_err(|_| LendingError::Timeout(config.read_timeout))??;

    let stablecoin_decimals = registry.stablecoin().decimals;

    Ok(LendingPosition {
        collateral_value: format_amount(position.collateralValue, stablecoin_decimals)?,
        debt: format_amount(position.debt, stablecoin_decimals)?,
        health_factor: format_amount(position.healthFactor, HEALTH_FACTOR_DECIMALS)?,
    })
}

pub struct LendingMonitor {
    position: watch::Receiver<Option<LendingPosition>>,
    task: JoinHandle<()>,
}

impl LendingMonitor {
    /// Polls the position until `shutdown` flips to true. A failed read keeps
    /// the last published position.
    pub fn spawn<C: ChainReader>(
        chain: Arc<C>,
        registry: Arc<TokenRegistry>,
        config: LendingMonitorConfig,
        mut shutdown: watch::Receiver<bool>,
    ) -> Self {
        let (sender, position) = watch::channel(None);

        info!(
            "Starting lending position refresh for {} every {:?}",
            config.user, config.refresh_interval
        );

        let task = tokio::spawn(async move {
            let mut interval = tokio::time::interval(config.refresh_interval);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        match fetch_position(chain.as_ref(), &config, &registry).await {
                            Ok(position) => {
                                debug!("Lending position refreshed: {position:?}");
                                sender.send_if_modified(|current| {
                                    let changed = current.as_ref() != Some(&position);
                                    *current = Some(position);
                                    changed
                                });
                            }
                            Err(e) => warn!("Lending position refresh failed: {e}"),
                        }
                    }
                    _ = shutdown.changed() => {
                        if *shutdown.borrow() {
                            info!("Shutting down lending position refresh");
                            break;
                        }
                    }
                }
            }
        });

        Self { position, task }
    }

    pub fn current(&self) -> Option<LendingPosition> {
        self.position.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<LendingPosition>> {
        self.position.clone()
    }

    pub async fn wait(self) {
        if let Err(e) = self.task.await {
            warn!("Lending monitor task panicked: {e}");
        }
    }
}
