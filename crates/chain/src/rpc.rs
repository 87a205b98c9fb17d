use alloy::primitives::{Address, Bytes};
use alloy::providers::Provider;
use alloy::rpc::types::{Log, TransactionRequest};
use async_trait::async_trait;
use futures_util::StreamExt;
use tracing::debug;

use crate::{BlockRef, ChainError, ChainReader, LogFilter, LogQuery, LogSubscription, SubscriptionId};

/// Upper bound on how many already-buffered subscription logs are grouped
/// into one delivered batch.
const DEFAULT_SUBSCRIPTION_BATCH_SIZE: usize = 256;

/// [`ChainReader`] backed by an alloy provider. Live subscriptions need a
/// pubsub transport (websocket or IPC).
#[derive(Debug, Clone)]
pub struct AlloyChain<P> {
    provider: P,
    subscription_batch_size: usize,
}

impl<P> AlloyChain<P> {
    pub const fn new(provider: P) -> Self {
        Self {
            provider,
            subscription_batch_size: DEFAULT_SUBSCRIPTION_BATCH_SIZE,
        }
    }

    #[must_use]
    pub fn with_subscription_batch_size(mut self, batch_size: usize) -> Self {
        self.subscription_batch_size = batch_size.max(1);
        self
    }
}

#[async_trait]
impl<P> ChainReader for AlloyChain<P>
where
    P: Provider + Clone + Send + Sync + 'static,
{
    async fn current_block_height(&self) -> Result<u64, ChainError> {
        Ok(self.provider.get_block_number().await?)
    }

    async fn query_logs(&self, query: &LogQuery) -> Result<Vec<Log>, ChainError> {
        let logs = self.provider.get_logs(&query.to_filter()).await?;

        debug!(
            "eth_getLogs {:?} {}..={} returned {} logs",
            query.filter.address,
            query.from_block,
            query.to_block,
            logs.len()
        );

        Ok(logs)
    }

    async fn subscribe_logs(&self, filter: &LogFilter) -> Result<LogSubscription, ChainError> {
        let subscription = self.provider.subscribe_logs(&filter.to_filter()).await?;
        let id = SubscriptionId(*subscription.local_id());

        debug!(
            "Opened log subscription {id} for {:?} ({})",
            filter.address, filter.event_signature
        );

        let batches = subscription
            .into_stream()
            .ready_chunks(self.subscription_batch_size)
            .boxed();

        Ok(LogSubscription { id, batches })
    }

    async fn unsubscribe(&self, id: SubscriptionId) -> Result<(), ChainError> {
        self.provider.unsubscribe(id.0).await?;
        Ok(())
    }

    async fn block_timestamp(&self, block: BlockRef) -> Result<u64, ChainError> {
        let maybe_block = match block {
            BlockRef::Hash(hash) => self.provider.get_block_by_hash(hash).await?,
            BlockRef::Number(number) => self.provider.get_block_by_number(number.into()).await?,
        };

        maybe_block
            .map(|found| found.header.timestamp)
            .ok_or(ChainError::BlockNotFound(block))
    }

    async fn call(&self, to: Address, input: Bytes) -> Result<Bytes, ChainError> {
        let request = TransactionRequest::default().to(to).input(input.into());
        Ok(self.provider.call(request).await?)
    }
}
