//! Turns raw logs into [`HistoryEntry`] values.
//!
//! Every watched event is a variant of the closed [`EventKind`] set; the
//! variant knows its signature hash, which indexed topic (if any) carries the
//! principal, and how to decode itself. Backfill and live tail share the same
//! [`EntryDecoder`], so both paths produce identical entries for the same log.

use alloy::primitives::{Address, B256, U256};
use alloy::rpc::types::Log;
use alloy::sol_types::{SolCall, SolEvent};
use futures_util::future;
use ledger_chain::{ChainReader, TopicPosition, read_contract};
use std::fmt::{self, Display};
use std::sync::Arc;
use std::time::Duration;
use tracing::{trace, warn};

use crate::bindings::{IAuctionHouse, IGameController, ILendingPool, INftMarketplace, IOfferBook};
use crate::entry::{EntryDetails, HistoryEntry};
use crate::error::DecodeError;
use crate::feed::{FeedSettings, SourceSpec};
use crate::position::LedgerPosition;
use crate::registry::{DisplayUnit, TokenRegistry, format_amount};

mod game;
mod lending;
mod nft;
pub mod timestamps;

pub use lending::HEALTH_FACTOR_DECIMALS;
pub use timestamps::{BlockTimestamps, TimestampFallback};

/// Whose activity a feed shows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scope {
    Principal(Address),
    Everyone,
}

impl Scope {
    pub const fn principal(&self) -> Option<Address> {
        match self {
            Self::Principal(principal) => Some(*principal),
            Self::Everyone => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Deposit,
    Withdraw,
    SessionPurchased,
    RoundPlayed,
    PendingReward,
    RewardClaimed,
    RewardForfeited,
    RefundClaimed,
    PoolContribution,
    Listed,
    Purchased,
    BidPlaced,
    AuctionSettled,
    OfferCreated,
    OfferAccepted,
    CollateralDeposited,
    Borrowed,
    Repaid,
    Liquidated,
}

impl EventKind {
    pub const fn name(self) -> &'static str {
        match self {
            Self::Deposit => "Deposit",
            Self::Withdraw => "Withdraw",
            Self::SessionPurchased => "SessionPurchased",
            Self::RoundPlayed => "RoundPlayed",
            Self::PendingReward => "PendingReward",
            Self::RewardClaimed => "RewardClaimed",
            Self::RewardForfeited => "RewardForfeited",
            Self::RefundClaimed => "RefundClaimed",
            Self::PoolContribution => "PoolContribution",
            Self::Listed => "Listed",
            Self::Purchased => "Purchased",
            Self::BidPlaced => "BidPlaced",
            Self::AuctionSettled => "AuctionSettled",
            Self::OfferCreated => "OfferCreated",
            Self::OfferAccepted => "OfferAccepted",
            Self::CollateralDeposited => "CollateralDeposited",
            Self::Borrowed => "Borrowed",
            Self::Repaid => "Repaid",
            Self::Liquidated => "Liquidated",
        }
    }

    pub const fn signature_hash(self) -> B256 {
        match self {
            Self::Deposit => IGameController::Deposit::SIGNATURE_HASH,
            Self::Withdraw => IGameController::Withdraw::SIGNATURE_HASH,
            Self::SessionPurchased => IGameController::SessionPurchased::SIGNATURE_HASH,
            Self::RoundPlayed => IGameController::RoundPlayed::SIGNATURE_HASH,
            Self::PendingReward => IGameController::PendingReward::SIGNATURE_HASH,
            Self::RewardClaimed => IGameController::RewardClaimed::SIGNATURE_HASH,
            Self::RewardForfeited => IGameController::RewardForfeited::SIGNATURE_HASH,
            Self::RefundClaimed => IGameController::RefundClaimed::SIGNATURE_HASH,
            Self::PoolContribution => IGameController::PoolContribution::SIGNATURE_HASH,
            Self::Listed => INftMarketplace::Listed::SIGNATURE_HASH,
            Self::Purchased => INftMarketplace::Purchased::SIGNATURE_HASH,
            Self::BidPlaced => IAuctionHouse::BidPlaced::SIGNATURE_HASH,
            Self::AuctionSettled => IAuctionHouse::AuctionSettled::SIGNATURE_HASH,
            Self::OfferCreated => IOfferBook::OfferCreated::SIGNATURE_HASH,
            Self::OfferAccepted => IOfferBook::OfferAccepted::SIGNATURE_HASH,
            Self::CollateralDeposited => ILendingPool::CollateralDeposited::SIGNATURE_HASH,
            Self::Borrowed => ILendingPool::Borrowed::SIGNATURE_HASH,
            Self::Repaid => ILendingPool::Repaid::SIGNATURE_HASH,
            Self::Liquidated => ILendingPool::Liquidated::SIGNATURE_HASH,
        }
    }

    /// The indexed topic holding the address whose activity this event is.
    /// `None` when the principal is not indexed (or may appear in more than
    /// one role), in which case logs are fetched unfiltered and the decoder
    /// checks ownership itself.
    pub const fn principal_topic(self) -> Option<TopicPosition> {
        match self {
            Self::Deposit
            | Self::Withdraw
            | Self::SessionPurchased
            | Self::RoundPlayed
            | Self::PendingReward
            | Self::RewardClaimed
            | Self::RewardForfeited
            | Self::RefundClaimed
            | Self::PoolContribution
            | Self::CollateralDeposited
            | Self::Borrowed
            | Self::Repaid
            | Self::Liquidated => Some(TopicPosition::First),
            Self::Listed | Self::BidPlaced | Self::OfferCreated => Some(TopicPosition::Second),
            Self::Purchased | Self::AuctionSettled | Self::OfferAccepted => None,
        }
    }

    /// Decodes one log of this kind. `Ok(None)` means the log is valid but
    /// belongs to someone other than the principal.
    pub async fn decode(
        self,
        log: &Log,
        ctx: &DecodeContext<'_>,
    ) -> Result<Option<HistoryEntry>, DecodeError> {
        let found = log.topic0().copied();
        if found != Some(self.signature_hash()) {
            return Err(DecodeError::SignatureMismatch {
                expected: self,
                found,
            });
        }

        match self {
            Self::Deposit => game::deposit(log, ctx),
            Self::Withdraw => game::withdraw(log, ctx),
            Self::SessionPurchased => game::session_purchased(log, ctx),
            Self::RoundPlayed => game::round_played(log, ctx),
            Self::PendingReward => game::pending_reward(log, ctx),
            Self::RewardClaimed => game::reward_claimed(log, ctx),
            Self::RewardForfeited => game::reward_forfeited(log, ctx),
            Self::RefundClaimed => game::refund_claimed(log, ctx),
            Self::PoolContribution => game::pool_contribution(log, ctx),
            Self::Listed => nft::listed(log, ctx),
            Self::Purchased => nft::purchased(log, ctx),
            Self::BidPlaced => nft::bid_placed(log, ctx).await,
            Self::AuctionSettled => nft::auction_settled(log, ctx).await,
            Self::OfferCreated => nft::offer_created(log, ctx),
            Self::OfferAccepted => nft::offer_accepted(log, ctx),
            Self::CollateralDeposited => lending::collateral_deposited(log, ctx),
            Self::Borrowed => lending::borrowed(log, ctx),
            Self::Repaid => lending::repaid(log, ctx),
            Self::Liquidated => lending::liquidated(log, ctx),
        }
    }
}

impl Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Collaborators available to a single decode call.
pub struct DecodeContext<'a> {
    pub scope: Scope,
    pub registry: &'a TokenRegistry,
    pub reader: &'a dyn ChainReader,
    pub dependent_read_timeout: Duration,
}

impl DecodeContext<'_> {
    pub fn owns(&self, address: Address) -> bool {
        self.scope
            .principal()
            .is_none_or(|principal| principal == address)
    }

    /// The one extra contract read a decoder may issue, bounded by its own timeout.
    pub async fn dependent_read<C>(&self, to: Address, call: &C) -> Result<C::Return, DecodeError>
    where
        C: SolCall + Sync,
    {
        tokio::time::timeout(
            self.dependent_read_timeout,
            read_contract(self.reader, to, call),
        )
        .await
        .map_err(|_| DecodeError::DependentReadTimeout(self.dependent_read_timeout))?
        .map_err(DecodeError::from)
    }

    pub fn entry(
        &self,
        log: &Log,
        raw_amount: U256,
        display_unit: DisplayUnit,
        details: EntryDetails,
    ) -> Result<HistoryEntry, DecodeError> {
        Ok(HistoryEntry {
            position: LedgerPosition::try_from(log)?,
            source: log.address(),
            timestamp: None,
            primary_amount: format_amount(raw_amount, display_unit.decimals())?,
            raw_amount,
            display_unit,
            details,
        })
    }
}

pub(crate) fn decode_event<E: SolEvent>(log: &Log) -> Result<E, DecodeError> {
    Ok(log.log_decode::<E>()?.inner.data)
}

/// Decoder shared by backfill and live tail for one feed instance.
#[derive(Debug)]
pub struct EntryDecoder<C> {
    chain: Arc<C>,
    registry: Arc<TokenRegistry>,
    scope: Scope,
    timestamps: BlockTimestamps<C>,
    dependent_read_timeout: Duration,
}

impl<C: ChainReader> EntryDecoder<C> {
    pub fn new(
        chain: Arc<C>,
        registry: Arc<TokenRegistry>,
        scope: Scope,
        settings: &FeedSettings,
    ) -> Self {
        let timestamps = BlockTimestamps::new(
            chain.clone(),
            settings.timestamp_fallback,
            settings.dependent_read_timeout,
        );

        Self {
            chain,
            registry,
            scope,
            timestamps,
            dependent_read_timeout: settings.dependent_read_timeout,
        }
    }

    pub const fn scope(&self) -> Scope {
        self.scope
    }

    /// Decodes every log concurrently. Logs that fail to decode, or that do
    /// not belong to the feed's principal, are dropped individually.
    pub async fn decode_batch(&self, source: &SourceSpec, logs: Vec<Log>) -> Vec<HistoryEntry> {
        future::join_all(logs.into_iter().map(|log| self.decode_log(source, log)))
            .await
            .into_iter()
            .flatten()
            .collect()
    }

    async fn decode_log(&self, source: &SourceSpec, log: Log) -> Option<HistoryEntry> {
        if log.removed {
            trace!(
                "Dropping removed {} log: tx_hash={:?}, log_index={:?}",
                source.event, log.transaction_hash, log.log_index
            );
            return None;
        }

        let ctx = DecodeContext {
            scope: self.scope,
            registry: &self.registry,
            reader: self.chain.as_ref(),
            dependent_read_timeout: self.dependent_read_timeout,
        };

        match source.event.decode(&log, &ctx).await {
            Ok(Some(mut entry)) => {
                entry.timestamp = self.timestamps.lookup(&log).await;
                Some(entry)
            }
            Ok(None) => {
                trace!(
                    "{} log filtered (not owned by principal): tx_hash={:?}, log_index={:?}",
                    source.event, log.transaction_hash, log.log_index
                );
                None
            }
            Err(e) => {
                warn!(
                    "Dropping {} log from {:?}: tx_hash={:?}, log_index={:?}: {e}",
                    source.event, source.address, log.transaction_hash, log.log_index
                );
                None
            }
        }
    }
}
