use alloy::providers::{DynProvider, Provider, ProviderBuilder, WsConnect};
use backon::{ExponentialBuilder, Retryable};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

pub mod backfill;
pub mod bindings;
pub mod controller;
pub mod decode;
pub mod entry;
pub mod env;
pub mod error;
pub mod feed;
pub mod lending;
pub mod live;
pub mod position;
pub mod ranking;
pub mod registry;
pub mod store;
pub mod telemetry;

#[cfg(test)]
pub mod test_utils;

pub use controller::{FeedHandle, FeedHub, FeedPhase, start_feed};
pub use decode::{EntryDecoder, EventKind, Scope, TimestampFallback};
pub use entry::{ActionKind, EntryDetails, HistoryEntry, Timestamp, TimestampSource};
pub use env::Env;
pub use feed::{ContractAddresses, FeedDefinition, FeedName, FeedSettings, SourceSpec};
pub use lending::{LendingMonitor, LendingMonitorConfig, LendingPosition};
pub use position::{EntryKey, LedgerPosition};
pub use ranking::{PlayerStanding, rank_players};
pub use registry::{DisplayUnit, TokenInfo, TokenRegistry};
pub use store::{FeedState, MergeStore};

use ledger_chain::AlloyChain;

const CONNECT_RETRIES: usize = 5;

async fn connect(url: &url::Url) -> anyhow::Result<DynProvider> {
    let provider = (|| async {
        ProviderBuilder::new()
            .connect_ws(WsConnect::new(url.as_str()))
            .await
    })
    .retry(
        ExponentialBuilder::default()
            .with_min_delay(Duration::from_secs(1))
            .with_max_times(CONNECT_RETRIES),
    )
    .notify(|e, delay| warn!("Websocket connection to {url} failed: {e}, retrying in {delay:?}"))
    .await?;

    Ok(provider.erased())
}

fn report_state(feed: FeedName, state: &FeedState) {
    info!(
        "{feed} feed: {} entries, loading: {}, error: {:?}",
        state.entries.len(),
        state.is_loading,
        state.error
    );

    if let Some(newest) = state.newest() {
        match serde_json::to_string(newest) {
            Ok(json) => debug!("Newest {feed} entry: {json}"),
            Err(e) => warn!("Failed to serialize newest {feed} entry: {e}"),
        }
    }

    if feed == FeedName::Ranking && !state.is_loading {
        for standing in rank_players(&state.entries).iter().take(10) {
            info!(
                "#{} {} rounds: {} wins: {} payout: {}",
                standing.rank,
                standing.player,
                standing.rounds_played,
                standing.rounds_won,
                standing.total_payout
            );
        }
    }
}

fn spawn_position_reporter(monitor: &LendingMonitor) -> tokio::task::JoinHandle<()> {
    let mut positions = monitor.subscribe();

    tokio::spawn(async move {
        while positions.changed().await.is_ok() {
            if let Some(position) = positions.borrow_and_update().clone() {
                info!(
                    "Lending position: collateral {} debt {} health factor {}",
                    position.collateral_value, position.debt, position.health_factor
                );
            }
        }
    })
}

pub async fn launch(env: Env) -> anyhow::Result<()> {
    let provider = connect(&env.evm_env.ws_rpc_url).await?;
    let chain = Arc::new(AlloyChain::new(provider));
    let registry = Arc::new(env.token_registry());
    let settings = env.feed_settings();
    let definition = env.feed_definition();
    let feed = definition.name;

    info!(
        "Starting {feed} feed with {} sources, backfill window {} blocks",
        definition.sources.len(),
        settings.backfill_window
    );

    let hub = FeedHub::new(chain.clone(), registry.clone(), settings);
    let handle = hub.start_feed(definition, env.principal).await;
    let reporter = handle.on_change(move |state| report_state(feed, &state));

    let (shutdown, shutdown_receiver) = watch::channel(false);

    let monitor = if feed == FeedName::Lending {
        env.lending_monitor_config().map(|config| {
            LendingMonitor::spawn(chain.clone(), registry.clone(), config, shutdown_receiver)
        })
    } else {
        None
    };
    let position_reporter = monitor.as_ref().map(spawn_position_reporter);

    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Received shutdown signal, shutting down gracefully..."),
        Err(e) => error!("Failed to listen for shutdown signal: {e}"),
    }

    shutdown.send_replace(true);
    hub.stop_all().await;

    if let Err(e) = reporter.await {
        error!("Feed reporter task panicked: {e}");
    }

    if let Some(monitor) = monitor {
        monitor.wait().await;
    }
    if let Some(position_reporter) = position_reporter {
        position_reporter.abort();
    }

    info!("Shutdown complete");
    Ok(())
}
