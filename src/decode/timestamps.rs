use alloy::rpc::types::Log;
use chrono::Utc;
use futures_util::FutureExt;
use futures_util::future::{BoxFuture, Shared};
use ledger_chain::{BlockRef, ChainReader};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tracing::{debug, warn};

use crate::entry::{Timestamp, TimestampSource};

/// What to report when a block's timestamp cannot be looked up.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum TimestampFallback {
    /// Leave the entry's timestamp empty.
    #[default]
    Absent,
    /// Use the local clock and mark the timestamp as substituted.
    LocalClock,
}

type PendingTimestamp = Shared<BoxFuture<'static, Option<u64>>>;

/// Block timestamps keyed by the block reference they were fetched with.
/// Concurrent lookups for one block share a single request. Successful
/// lookups stay cached for the lifetime of the feed; failed ones are
/// forgotten so a later batch can retry.
pub struct BlockTimestamps<C> {
    chain: Arc<C>,
    map: Mutex<HashMap<BlockRef, PendingTimestamp>>,
    fallback: TimestampFallback,
    lookup_timeout: Duration,
}

impl<C> std::fmt::Debug for BlockTimestamps<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlockTimestamps")
            .field("blocks", &self.blocks().len())
            .field("fallback", &self.fallback)
            .field("lookup_timeout", &self.lookup_timeout)
            .finish_non_exhaustive()
    }
}

impl<C> BlockTimestamps<C> {
    fn blocks(&self) -> MutexGuard<'_, HashMap<BlockRef, PendingTimestamp>> {
        self.map.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<C: ChainReader> BlockTimestamps<C> {
    pub fn new(chain: Arc<C>, fallback: TimestampFallback, lookup_timeout: Duration) -> Self {
        Self {
            chain,
            map: Mutex::new(HashMap::new()),
            fallback,
            lookup_timeout,
        }
    }

    pub async fn lookup(&self, log: &Log) -> Option<Timestamp> {
        if let Some(seconds) = log.block_timestamp {
            return Some(Timestamp::from_block(seconds));
        }

        let block = match log.block_hash {
            Some(hash) => BlockRef::Hash(hash),
            None => BlockRef::Number(log.block_number?),
        };

        let pending = self.pending(block);

        if let Some(seconds) = pending.clone().await {
            return Some(Timestamp::from_block(seconds));
        }

        self.forget(block, &pending);
        self.fallback()
    }

    fn pending(&self, block: BlockRef) -> PendingTimestamp {
        self.blocks()
            .entry(block)
            .or_insert_with(|| {
                fetch_timestamp(self.chain.clone(), block, self.lookup_timeout)
                    .boxed()
                    .shared()
            })
            .clone()
    }

    fn forget(&self, block: BlockRef, failed: &PendingTimestamp) {
        let mut blocks = self.blocks();
        if blocks.get(&block).is_some_and(|current| current.ptr_eq(failed)) {
            blocks.remove(&block);
        }
    }

    fn fallback(&self) -> Option<Timestamp> {
        match self.fallback {
            TimestampFallback::Absent => None,
            TimestampFallback::LocalClock => {
                debug!("Substituting local clock for block timestamp");
                Some(Timestamp {
                    seconds: u64::try_from(Utc::now().timestamp()).ok()?,
                    source: TimestampSource::LocalClock,
                })
            }
        }
    }

    #[cfg(test)]
    fn cached_blocks(&self) -> usize {
        self.blocks().len()
    }
}

async fn fetch_timestamp<C: ChainReader>(
    chain: Arc<C>,
    block: BlockRef,
    lookup_timeout: Duration,
) -> Option<u64> {
    match tokio::time::timeout(lookup_timeout, chain.block_timestamp(block)).await {
        Ok(Ok(seconds)) => Some(seconds),
        Ok(Err(e)) => {
            warn!("Failed to fetch timestamp for block {block}: {e}");
            None
        }
        Err(_) => {
            warn!("Timestamp lookup for block {block} timed out after {lookup_timeout:?}");
            None
        }
    }
}
