use alloy::primitives::{Address, B256, LogData, U256, address};
use alloy::rpc::types::Log;
use alloy::sol_types::SolEvent;
use std::time::Duration;

use crate::decode::TimestampFallback;
use crate::entry::{EntryDetails, HistoryEntry};
use crate::feed::{ContractAddresses, FeedSettings};
use crate::position::LedgerPosition;
use crate::registry::{DisplayUnit, TokenInfo, TokenRegistry, format_amount};

pub const PRINCIPAL: Address = address!("0xaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa");
pub const STRANGER: Address = address!("0xbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb");

pub const GAME_CONTROLLER: Address = address!("0x1000000000000000000000000000000000000001");
pub const GAME_CONTROLLER_V2: Address = address!("0x1000000000000000000000000000000000000002");
pub const MARKETPLACE: Address = address!("0x2000000000000000000000000000000000000001");
pub const AUCTION_HOUSE: Address = address!("0x2000000000000000000000000000000000000002");
pub const OFFER_BOOK: Address = address!("0x2000000000000000000000000000000000000003");
pub const LENDING_POOL: Address = address!("0x3000000000000000000000000000000000000001");

pub const USDT: Address = address!("0x00000000000000000000000000000000000000d1");
pub const PLATFORM_TOKEN: Address = address!("0x00000000000000000000000000000000000000d2");

/// Deterministic, distinct transaction hash per (block, log index).
pub fn tx_hash(block_number: u64, log_index: u64) -> B256 {
    let mut bytes = [0u8; 32];
    bytes[..8].copy_from_slice(&block_number.to_be_bytes());
    bytes[24..].copy_from_slice(&log_index.to_be_bytes());
    B256::from(bytes)
}

/// Creates a `Log` stub with no topics or data at the supplied position.
/// Useful when only the positional fields matter for the assertion.
pub fn create_log(block_number: u64, log_index: u64) -> Log {
    Log {
        inner: alloy::primitives::Log {
            address: address!("0xfefefefefefefefefefefefefefefefefefefefe"),
            data: LogData::empty(),
        },
        block_hash: None,
        block_number: Some(block_number),
        block_timestamp: None,
        transaction_hash: Some(tx_hash(block_number, log_index)),
        transaction_index: None,
        log_index: Some(log_index),
        removed: false,
    }
}

/// ABI-encodes `event` into a log emitted by `address` at the given position.
pub fn event_log<E: SolEvent>(address: Address, event: &E, block_number: u64, log_index: u64) -> Log {
    let mut log = create_log(block_number, log_index);
    log.inner = alloy::primitives::Log {
        address,
        data: event.encode_log_data(),
    };
    log
}

pub fn test_registry() -> TokenRegistry {
    TokenRegistry::new(
        TokenInfo::new(USDT, "USDT", 6),
        TokenInfo::new(PLATFORM_TOKEN, "DICE", 18),
    )
}

pub fn test_contracts() -> ContractAddresses {
    ContractAddresses {
        game_controllers: vec![GAME_CONTROLLER, GAME_CONTROLLER_V2],
        marketplace: MARKETPLACE,
        auction_house: AUCTION_HOUSE,
        offer_book: OFFER_BOOK,
        lending_pool: LENDING_POOL,
    }
}

pub fn test_settings() -> FeedSettings {
    FeedSettings {
        backfill_window: 50_000,
        chunk_size: 50_000,
        query_timeout: Duration::from_millis(500),
        dependent_read_timeout: Duration::from_millis(100),
        timestamp_fallback: TimestampFallback::Absent,
    }
}

/// Builds a `HistoryEntry` without going through a decoder.
pub struct HistoryEntryBuilder {
    entry: HistoryEntry,
}

impl HistoryEntryBuilder {
    pub fn new(block_number: u64, log_index: u64) -> Self {
        Self {
            entry: HistoryEntry {
                position: LedgerPosition {
                    block_number,
                    transaction_hash: tx_hash(block_number, log_index),
                    log_index,
                },
                source: GAME_CONTROLLER,
                timestamp: None,
                primary_amount: "50".to_string(),
                raw_amount: U256::from(50_000_000u64),
                display_unit: DisplayUnit::Known {
                    symbol: "USDT".to_string(),
                    decimals: 6,
                },
                details: EntryDetails::Deposit {
                    user: PRINCIPAL,
                    token: USDT,
                },
            },
        }
    }

    pub fn with_details(mut self, details: EntryDetails) -> Self {
        self.entry.details = details;
        self
    }

    /// Sets the raw amount in USDT base units and re-derives the display amount.
    pub fn with_amount(mut self, raw_amount: u64) -> Self {
        self.entry.raw_amount = U256::from(raw_amount);
        self.entry.primary_amount = format_amount(self.entry.raw_amount, 6).unwrap();
        self
    }

    pub fn with_transaction_hash(mut self, transaction_hash: B256) -> Self {
        self.entry.position.transaction_hash = transaction_hash;
        self
    }

    pub fn build(self) -> HistoryEntry {
        self.entry
    }
}
