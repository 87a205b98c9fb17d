use alloy::primitives::{Address, U256};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt::{self, Display};

use crate::position::{EntryKey, LedgerPosition};
use crate::registry::DisplayUnit;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum TimestampSource {
    Block,
    /// Substituted from the local clock because the block lookup failed.
    LocalClock,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Timestamp {
    pub seconds: u64,
    pub source: TimestampSource,
}

impl Timestamp {
    pub const fn from_block(seconds: u64) -> Self {
        Self {
            seconds,
            source: TimestampSource::Block,
        }
    }

    pub fn to_datetime(self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(i64::try_from(self.seconds).ok()?, 0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ActionKind {
    Deposit,
    Withdraw,
    BuySession,
    PlayRound,
    PendingReward,
    RewardClaimed,
    RewardForfeited,
    ClaimRefund,
    PoolContribution,
    NftListed,
    NftPurchased,
    AuctionBid,
    AuctionSettled,
    OfferCreated,
    OfferAccepted,
    CollateralDeposited,
    Borrowed,
    Repaid,
    Liquidated,
}

impl ActionKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Deposit => "Deposit",
            Self::Withdraw => "Withdraw",
            Self::BuySession => "BuySession",
            Self::PlayRound => "PlayRound",
            Self::PendingReward => "PendingReward",
            Self::RewardClaimed => "RewardClaimed",
            Self::RewardForfeited => "RewardForfeited",
            Self::ClaimRefund => "ClaimRefund",
            Self::PoolContribution => "PoolContribution",
            Self::NftListed => "NftListed",
            Self::NftPurchased => "NftPurchased",
            Self::AuctionBid => "AuctionBid",
            Self::AuctionSettled => "AuctionSettled",
            Self::OfferCreated => "OfferCreated",
            Self::OfferAccepted => "OfferAccepted",
            Self::CollateralDeposited => "CollateralDeposited",
            Self::Borrowed => "Borrowed",
            Self::Repaid => "Repaid",
            Self::Liquidated => "Liquidated",
        }
    }
}

impl Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Kind-specific fields. Only what the emitting contract actually reported
/// (or the dependent read returned) is carried.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "actionKind", rename_all_fields = "camelCase")]
pub enum EntryDetails {
    Deposit {
        user: Address,
        token: Address,
    },
    Withdraw {
        user: Address,
        token: Address,
    },
    BuySession {
        player: Address,
        session_id: U256,
        rounds: U256,
    },
    PlayRound {
        player: Address,
        game_id: U256,
        dice_values: [u8; 3],
    },
    PendingReward {
        player: Address,
        game_id: U256,
    },
    RewardClaimed {
        player: Address,
    },
    RewardForfeited {
        player: Address,
    },
    ClaimRefund {
        player: Address,
    },
    PoolContribution {
        contributor: Address,
    },
    NftListed {
        listing_id: U256,
        seller: Address,
        token_id: U256,
    },
    NftPurchased {
        listing_id: U256,
        buyer: Address,
        seller: Address,
        token_id: U256,
    },
    AuctionBid {
        listing_id: U256,
        bidder: Address,
        token_id: U256,
    },
    AuctionSettled {
        listing_id: U256,
        winner: Address,
        seller: Address,
        token_id: U256,
    },
    OfferCreated {
        offer_id: U256,
        offerer: Address,
        token_id: U256,
    },
    OfferAccepted {
        offer_id: U256,
        buyer: Address,
        seller: Address,
        token_id: U256,
    },
    CollateralDeposited {
        user: Address,
        token: Address,
    },
    Borrowed {
        user: Address,
        health_factor: String,
    },
    Repaid {
        user: Address,
    },
    Liquidated {
        user: Address,
        liquidator: Address,
        collateral_token: Address,
        collateral_seized: String,
    },
}

impl EntryDetails {
    pub const fn action_kind(&self) -> ActionKind {
        match self {
            Self::Deposit { .. } => ActionKind::Deposit,
            Self::Withdraw { .. } => ActionKind::Withdraw,
            Self::BuySession { .. } => ActionKind::BuySession,
            Self::PlayRound { .. } => ActionKind::PlayRound,
            Self::PendingReward { .. } => ActionKind::PendingReward,
            Self::RewardClaimed { .. } => ActionKind::RewardClaimed,
            Self::RewardForfeited { .. } => ActionKind::RewardForfeited,
            Self::ClaimRefund { .. } => ActionKind::ClaimRefund,
            Self::PoolContribution { .. } => ActionKind::PoolContribution,
            Self::NftListed { .. } => ActionKind::NftListed,
            Self::NftPurchased { .. } => ActionKind::NftPurchased,
            Self::AuctionBid { .. } => ActionKind::AuctionBid,
            Self::AuctionSettled { .. } => ActionKind::AuctionSettled,
            Self::OfferCreated { .. } => ActionKind::OfferCreated,
            Self::OfferAccepted { .. } => ActionKind::OfferAccepted,
            Self::CollateralDeposited { .. } => ActionKind::CollateralDeposited,
            Self::Borrowed { .. } => ActionKind::Borrowed,
            Self::Repaid { .. } => ActionKind::Repaid,
            Self::Liquidated { .. } => ActionKind::Liquidated,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    pub position: LedgerPosition,
    /// Contract that emitted the log.
    pub source: Address,
    pub timestamp: Option<Timestamp>,
    pub primary_amount: String,
    pub raw_amount: U256,
    pub display_unit: DisplayUnit,
    #[serde(flatten)]
    pub details: EntryDetails,
}

impl HistoryEntry {
    pub const fn key(&self) -> EntryKey {
        self.position.key()
    }

    pub const fn action_kind(&self) -> ActionKind {
        self.details.action_kind()
    }
}
