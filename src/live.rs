use alloy::rpc::types::Log;
use futures_util::stream::BoxStream;
use futures_util::{StreamExt, future};
use ledger_chain::{ChainError, ChainReader, SubscriptionId};
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinSet;
use tracing::{debug, info, trace, warn};

use crate::decode::EntryDecoder;
use crate::entry::HistoryEntry;
use crate::feed::{FeedDefinition, SourceSpec};

/// One open log subscription per source, each forwarding decoded batches.
pub struct LiveTail<C> {
    chain: Arc<C>,
    subscriptions: Vec<SubscriptionId>,
    tasks: JoinSet<()>,
}

impl<C: ChainReader> LiveTail<C> {
    /// Opens a subscription for every source. Sources whose subscription
    /// cannot be opened are skipped; there is no resubscription.
    pub async fn start(
        chain: Arc<C>,
        decoder: Arc<EntryDecoder<C>>,
        definition: &FeedDefinition,
        on_batch: UnboundedSender<Vec<HistoryEntry>>,
    ) -> Self {
        let scope = decoder.scope();

        let opened = future::join_all(definition.sources.iter().map(|source| {
            let filter = source.log_filter(scope);
            let chain = chain.clone();
            async move { (source, chain.subscribe_logs(&filter).await) }
        }))
        .await;

        let mut subscriptions = Vec::with_capacity(opened.len());
        let mut tasks = JoinSet::new();

        for (source, result) in opened {
            match result {
                Ok(subscription) => {
                    debug!(
                        "Subscribed to {} on {} ({})",
                        source.event, source.address, subscription.id
                    );
                    subscriptions.push(subscription.id);
                    tasks.spawn(forward_batches(
                        *source,
                        subscription.batches,
                        decoder.clone(),
                        on_batch.clone(),
                    ));
                }
                Err(e) => {
                    warn!(
                        "Failed to subscribe to {} on {}: {e}",
                        source.event, source.address
                    );
                }
            }
        }

        info!(
            "{} live tail started with {}/{} subscriptions",
            definition.name,
            subscriptions.len(),
            definition.sources.len()
        );

        Self {
            chain,
            subscriptions,
            tasks,
        }
    }

    pub fn subscription_count(&self) -> usize {
        self.subscriptions.len()
    }

    /// Stops every forwarding task and closes every subscription. A failure
    /// to close one subscription does not stop the others from closing.
    pub async fn unsubscribe(mut self) -> Vec<ChainError> {
        self.tasks.abort_all();
        while self.tasks.join_next().await.is_some() {}

        let failures = future::join_all(
            self.subscriptions
                .iter()
                .map(|id| self.chain.unsubscribe(*id)),
        )
        .await
        .into_iter()
        .filter_map(Result::err)
        .collect::<Vec<_>>();

        for e in &failures {
            warn!("Failed to close live subscription: {e}");
        }

        debug!(
            "Closed {}/{} live subscriptions",
            self.subscriptions.len() - failures.len(),
            self.subscriptions.len()
        );

        failures
    }
}

async fn forward_batches<C: ChainReader>(
    source: SourceSpec,
    mut batches: BoxStream<'static, Vec<Log>>,
    decoder: Arc<EntryDecoder<C>>,
    on_batch: UnboundedSender<Vec<HistoryEntry>>,
) {
    while let Some(logs) = batches.next().await {
        trace!(
            "Received {} live {} logs from {}",
            logs.len(),
            source.event,
            source.address
        );

        let entries = decoder.decode_batch(&source, logs).await;

        if on_batch.send(entries).is_err() {
            debug!("Live batch receiver dropped, stopping {} forwarder", source.event);
            return;
        }
    }

    debug!(
        "Subscription stream for {} on {} ended",
        source.event, source.address
    );
}
