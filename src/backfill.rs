use alloy::rpc::types::Log;
use futures_util::future;
use ledger_chain::{ChainReader, LogQuery};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::decode::EntryDecoder;
use crate::entry::HistoryEntry;
use crate::error::FeedError;
use crate::feed::{FeedDefinition, FeedSettings, SourceSpec};
use crate::store::dedup_and_sort;

/// Inclusive block range scanned by a backfill.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockWindow {
    pub from_block: u64,
    pub to_block: u64,
}

impl BlockWindow {
    /// The `width` blocks ending at `head`, clamped at genesis.
    pub const fn ending_at(head: u64, width: u64) -> Self {
        Self {
            from_block: head.saturating_sub(width),
            to_block: head,
        }
    }
}

pub fn generate_batch_ranges(start_block: u64, end_block: u64, batch_size: u64) -> Vec<(u64, u64)> {
    let batch_size = batch_size.max(1);

    (start_block..=end_block)
        .step_by(usize::try_from(batch_size).unwrap_or(usize::MAX))
        .map(|batch_start| {
            let batch_end = batch_start.saturating_add(batch_size - 1).min(end_block);
            (batch_start, batch_end)
        })
        .collect()
}

pub struct BackfillScanner<C> {
    chain: Arc<C>,
    decoder: Arc<EntryDecoder<C>>,
    settings: FeedSettings,
}

impl<C: ChainReader> BackfillScanner<C> {
    pub const fn new(chain: Arc<C>, decoder: Arc<EntryDecoder<C>>, settings: FeedSettings) -> Self {
        Self {
            chain,
            decoder,
            settings,
        }
    }

    /// Fetches and decodes every source over the backfill window. Individual
    /// source failures are tolerated; only a failed head lookup or every
    /// source failing is an error.
    pub async fn scan(&self, definition: &FeedDefinition) -> Result<Vec<HistoryEntry>, FeedError> {
        let head = tokio::time::timeout(self.settings.query_timeout, self.chain.current_block_height())
            .await
            .map_err(|_| FeedError::BlockHeightTimeout(self.settings.query_timeout))?
            .map_err(FeedError::BlockHeight)?;

        let window = BlockWindow::ending_at(head, self.settings.backfill_window);

        info!(
            "Starting {} backfill over blocks {}-{} ({} sources)",
            definition.name,
            window.from_block,
            window.to_block,
            definition.sources.len()
        );

        let source_results = future::join_all(
            definition
                .sources
                .iter()
                .map(|source| self.scan_source(source, window)),
        )
        .await;

        let failed_sources = source_results.iter().filter(|result| result.is_none()).count();

        if !definition.sources.is_empty() && failed_sources == definition.sources.len() {
            return Err(FeedError::AllSourcesFailed(failed_sources));
        }

        let entries = dedup_and_sort(source_results.into_iter().flatten().flatten().collect());

        info!(
            "{} backfill completed: {} entries, {failed_sources} failed sources",
            definition.name,
            entries.len()
        );

        Ok(entries)
    }

    /// `None` when no query for this source succeeded.
    async fn scan_source(&self, source: &SourceSpec, window: BlockWindow) -> Option<Vec<HistoryEntry>> {
        let filter = source.log_filter(self.decoder.scope());

        let chunk_results = future::join_all(
            generate_batch_ranges(window.from_block, window.to_block, self.settings.chunk_size)
                .into_iter()
                .map(|(from_block, to_block)| {
                    self.fetch_chunk(
                        source,
                        LogQuery {
                            filter,
                            from_block,
                            to_block,
                        },
                    )
                }),
        )
        .await;

        if chunk_results.iter().all(Option::is_none) {
            return None;
        }

        let logs = chunk_results.into_iter().flatten().flatten().collect::<Vec<_>>();

        Some(self.decoder.decode_batch(source, logs).await)
    }

    async fn fetch_chunk(&self, source: &SourceSpec, query: LogQuery) -> Option<Vec<Log>> {
        match tokio::time::timeout(self.settings.query_timeout, self.chain.query_logs(&query)).await {
            Ok(Ok(logs)) => {
                debug!(
                    "Found {} {} logs from {} in blocks {}-{}",
                    logs.len(),
                    source.event,
                    source.address,
                    query.from_block,
                    query.to_block
                );
                Some(logs)
            }
            Ok(Err(e)) => {
                warn!(
                    "{} query on {} failed for blocks {}-{}: {e}",
                    source.event, source.address, query.from_block, query.to_block
                );
                None
            }
            Err(_) => {
                warn!(
                    "{} query on {} timed out after {:?} for blocks {}-{}",
                    source.event,
                    source.address,
                    self.settings.query_timeout,
                    query.from_block,
                    query.to_block
                );
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bindings::IAuctionHouse::{self, BidPlaced};
    use crate::bindings::IGameController::{Deposit, RoundPlayed};
    use crate::decode::{EventKind, Scope};
    use crate::entry::EntryDetails;
    use crate::feed::FeedName;
    use crate::test_utils::{
        AUCTION_HOUSE, GAME_CONTROLLER, GAME_CONTROLLER_V2, PLATFORM_TOKEN, PRINCIPAL, STRANGER,
        USDT, event_log, test_registry, test_settings,
    };
    use alloy::primitives::{Address, Bytes, U256};
    use alloy::sol_types::SolCall;
    use ledger_chain::TestChain;
    use std::time::Duration;

    fn scanner(chain: &TestChain, scope: Scope, settings: FeedSettings) -> BackfillScanner<TestChain> {
        let chain = Arc::new(chain.clone());
        let decoder = Arc::new(EntryDecoder::new(
            chain.clone(),
            Arc::new(test_registry()),
            scope,
            &settings,
        ));
        BackfillScanner::new(chain, decoder, settings)
    }

    fn definition(sources: Vec<SourceSpec>) -> FeedDefinition {
        FeedDefinition {
            name: FeedName::Game,
            principal_scoped: true,
            sources,
        }
    }

    fn round(controller: Address, player: Address, block_number: u64, log_index: u64) -> Log {
        event_log(
            controller,
            &RoundPlayed {
                player,
                gameId: U256::from(block_number),
                diceValues: [1, 2, 3],
                payout: U256::ZERO,
            },
            block_number,
            log_index,
        )
    }

    #[test]
    fn test_window_clamps_at_genesis() {
        assert_eq!(
            BlockWindow::ending_at(10_000, 50_000),
            BlockWindow {
                from_block: 0,
                to_block: 10_000
            }
        );
    }

    #[test]
    fn test_window_below_head() {
        assert_eq!(
            BlockWindow::ending_at(120_000, 50_000),
            BlockWindow {
                from_block: 70_000,
                to_block: 120_000
            }
        );
    }

    #[test]
    fn test_generate_batch_ranges_single_batch() {
        let ranges = generate_batch_ranges(100, 500, 1000);
        assert_eq!(ranges, vec![(100, 500)]);
    }

    #[test]
    fn test_generate_batch_ranges_exact_batch_size() {
        let ranges = generate_batch_ranges(100, 1099, 1000);
        assert_eq!(ranges, vec![(100, 1099)]);
    }

    #[test]
    fn test_generate_batch_ranges_multiple_batches() {
        let ranges = generate_batch_ranges(100, 2500, 1000);
        assert_eq!(ranges, vec![(100, 1099), (1100, 2099), (2100, 2500)]);
    }

    #[test]
    fn test_generate_batch_ranges_single_block() {
        let ranges = generate_batch_ranges(42, 42, 1000);
        assert_eq!(ranges, vec![(42, 42)]);
    }

    #[test]
    fn test_generate_batch_ranges_empty() {
        let ranges = generate_batch_ranges(100, 99, 1000);
        assert_eq!(ranges.len(), 0);
    }

    #[test]
    fn test_generate_batch_ranges_zero_size_is_one_block() {
        let ranges = generate_batch_ranges(7, 9, 0);
        assert_eq!(ranges, vec![(7, 7), (8, 8), (9, 9)]);
    }

    #[tokio::test]
    async fn test_scan_merges_deployments_sorted_desc() {
        let chain = TestChain::new(1_000);
        chain.push_log(round(GAME_CONTROLLER, PRINCIPAL, 100, 0));
        chain.push_log(round(GAME_CONTROLLER_V2, PRINCIPAL, 300, 1));
        chain.push_log(round(GAME_CONTROLLER, PRINCIPAL, 200, 5));
        chain.push_log(round(GAME_CONTROLLER_V2, STRANGER, 250, 0));

        let entries = scanner(&chain, Scope::Principal(PRINCIPAL), test_settings())
            .scan(&definition(vec![
                SourceSpec::new(GAME_CONTROLLER, EventKind::RoundPlayed),
                SourceSpec::new(GAME_CONTROLLER_V2, EventKind::RoundPlayed),
            ]))
            .await
            .unwrap();

        let blocks = entries
            .iter()
            .map(|entry| entry.position.block_number)
            .collect::<Vec<_>>();
        assert_eq!(blocks, vec![300, 200, 100]);
    }

    #[tokio::test]
    async fn test_scan_respects_window() {
        let chain = TestChain::new(100_000);
        chain.push_log(round(GAME_CONTROLLER, PRINCIPAL, 49_999, 0));
        chain.push_log(round(GAME_CONTROLLER, PRINCIPAL, 50_000, 0));

        let entries = scanner(&chain, Scope::Principal(PRINCIPAL), test_settings())
            .scan(&definition(vec![SourceSpec::new(
                GAME_CONTROLLER,
                EventKind::RoundPlayed,
            )]))
            .await
            .unwrap();

        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].position.block_number, 50_000);
    }

    #[tokio::test]
    async fn test_scan_chunks_the_window() {
        let chain = TestChain::new(10_000);
        chain.push_log(round(GAME_CONTROLLER, PRINCIPAL, 10, 0));
        chain.push_log(round(GAME_CONTROLLER, PRINCIPAL, 9_990, 0));

        let settings = FeedSettings {
            chunk_size: 2_500,
            ..test_settings()
        };

        let entries = scanner(&chain, Scope::Principal(PRINCIPAL), settings)
            .scan(&definition(vec![SourceSpec::new(
                GAME_CONTROLLER,
                EventKind::RoundPlayed,
            )]))
            .await
            .unwrap();

        assert_eq!(entries.len(), 2);
        assert_eq!(chain.query_count(), 5);
    }

    #[tokio::test]
    async fn test_partial_source_failure_is_tolerated() {
        let chain = TestChain::new(1_000);
        chain.fail_queries_for(GAME_CONTROLLER);
        for log_index in 0..3 {
            chain.push_log(round(GAME_CONTROLLER_V2, PRINCIPAL, 500, log_index));
        }

        let entries = scanner(&chain, Scope::Principal(PRINCIPAL), test_settings())
            .scan(&definition(vec![
                SourceSpec::new(GAME_CONTROLLER, EventKind::RoundPlayed),
                SourceSpec::new(GAME_CONTROLLER_V2, EventKind::RoundPlayed),
            ]))
            .await
            .unwrap();

        assert_eq!(entries.len(), 3);
    }

    #[tokio::test]
    async fn test_all_sources_failed() {
        let chain = TestChain::new(1_000);
        chain.fail_queries_for(GAME_CONTROLLER);
        chain.fail_queries_for(GAME_CONTROLLER_V2);

        let error = scanner(&chain, Scope::Principal(PRINCIPAL), test_settings())
            .scan(&definition(vec![
                SourceSpec::new(GAME_CONTROLLER, EventKind::RoundPlayed),
                SourceSpec::new(GAME_CONTROLLER_V2, EventKind::RoundPlayed),
            ]))
            .await
            .unwrap_err();

        assert!(matches!(error, FeedError::AllSourcesFailed(2)));
    }

    #[tokio::test]
    async fn test_block_height_failure() {
        let chain = TestChain::new(1_000);
        chain.make_unavailable();

        let error = scanner(&chain, Scope::Principal(PRINCIPAL), test_settings())
            .scan(&definition(vec![SourceSpec::new(
                GAME_CONTROLLER,
                EventKind::RoundPlayed,
            )]))
            .await
            .unwrap_err();

        assert!(matches!(error, FeedError::BlockHeight(_)));
    }

    #[tokio::test]
    async fn test_stalled_query_times_out() {
        let chain = TestChain::new(1_000);
        chain.pause_queries();

        let settings = FeedSettings {
            query_timeout: Duration::from_millis(20),
            ..test_settings()
        };

        let error = scanner(&chain, Scope::Principal(PRINCIPAL), settings)
            .scan(&definition(vec![SourceSpec::new(
                GAME_CONTROLLER,
                EventKind::RoundPlayed,
            )]))
            .await
            .unwrap_err();

        assert!(matches!(error, FeedError::AllSourcesFailed(1)));
    }

    #[tokio::test]
    async fn test_failed_listing_read_drops_only_that_bid() {
        let chain = TestChain::new(1_000);
        let good_listing = IAuctionHouse::getListingCall {
            listingId: U256::from(1),
        };
        let broken_listing = IAuctionHouse::getListingCall {
            listingId: U256::from(2),
        };

        chain.respond_to_call(
            AUCTION_HOUSE,
            Bytes::from(good_listing.abi_encode()),
            Bytes::from(IAuctionHouse::getListingCall::abi_encode_returns(
                &IAuctionHouse::Listing {
                    seller: STRANGER,
                    tokenId: U256::from(10),
                    paymentToken: PLATFORM_TOKEN,
                    reservePrice: U256::ZERO,
                    endTime: 0,
                    settled: false,
                },
            )),
        );
        chain.revert_call(
            AUCTION_HOUSE,
            Bytes::from(broken_listing.abi_encode()),
            "listing missing",
        );

        for (listing_id, block_number) in [(1u64, 400u64), (2, 401)] {
            chain.push_log(event_log(
                AUCTION_HOUSE,
                &BidPlaced {
                    listingId: U256::from(listing_id),
                    bidder: PRINCIPAL,
                    amount: U256::from(1_000_000_000_000_000_000u128),
                },
                block_number,
                0,
            ));
        }
        chain.push_log(event_log(
            GAME_CONTROLLER,
            &Deposit {
                user: PRINCIPAL,
                token: USDT,
                amount: U256::from(1_000_000u64),
            },
            402,
            0,
        ));

        let entries = scanner(&chain, Scope::Principal(PRINCIPAL), test_settings())
            .scan(&definition(vec![
                SourceSpec::new(AUCTION_HOUSE, EventKind::BidPlaced),
                SourceSpec::new(GAME_CONTROLLER, EventKind::Deposit),
            ]))
            .await
            .unwrap();

        assert_eq!(entries.len(), 2);
        assert!(matches!(entries[0].details, EntryDetails::Deposit { .. }));
        assert!(matches!(
            entries[1].details,
            EntryDetails::AuctionBid { listing_id, .. } if listing_id == U256::from(1)
        ));
    }

    #[tokio::test]
    async fn test_no_sources_scans_nothing() {
        let chain = TestChain::new(1_000);

        let entries = scanner(&chain, Scope::Everyone, test_settings())
            .scan(&definition(Vec::new()))
            .await
            .unwrap();

        assert!(entries.is_empty());
        assert_eq!(chain.query_count(), 0);
    }
}
