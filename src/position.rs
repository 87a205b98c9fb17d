use alloy::primitives::B256;
use alloy::rpc::types::Log;
use serde::Serialize;
use std::cmp::Ordering;

use crate::error::DecodeError;

/// Where an event sits on the ledger. Ordering is by recency: a greater
/// position is a more recent event (higher block, then higher log index).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerPosition {
    pub block_number: u64,
    pub transaction_hash: B256,
    pub log_index: u64,
}

/// Identity of one physical log, stable across backfill and live delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EntryKey {
    pub transaction_hash: B256,
    pub log_index: u64,
}

impl LedgerPosition {
    pub const fn key(&self) -> EntryKey {
        EntryKey {
            transaction_hash: self.transaction_hash,
            log_index: self.log_index,
        }
    }
}

impl TryFrom<&Log> for LedgerPosition {
    type Error = DecodeError;

    fn try_from(log: &Log) -> Result<Self, Self::Error> {
        Ok(Self {
            block_number: log.block_number.ok_or(DecodeError::NoBlockNumber)?,
            transaction_hash: log.transaction_hash.ok_or(DecodeError::NoTxHash)?,
            log_index: log.log_index.ok_or(DecodeError::NoLogIndex)?,
        })
    }
}

impl Ord for LedgerPosition {
    fn cmp(&self, other: &Self) -> Ordering {
        self.block_number
            .cmp(&other.block_number)
            .then(self.log_index.cmp(&other.log_index))
            .then_with(|| self.transaction_hash.cmp(&other.transaction_hash))
    }
}

impl PartialOrd for LedgerPosition {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::create_log;

    fn position(block_number: u64, log_index: u64) -> LedgerPosition {
        LedgerPosition {
            block_number,
            transaction_hash: B256::with_last_byte(1),
            log_index,
        }
    }

    #[test]
    fn test_later_block_is_greater() {
        assert!(position(101, 0) > position(100, 9));
    }

    #[test]
    fn test_log_index_breaks_ties_within_block() {
        assert!(position(100, 3) > position(100, 2));
    }

    #[test]
    fn test_descending_sort() {
        let mut positions = vec![position(5, 1), position(9, 0), position(5, 4), position(7, 2)];
        positions.sort_by(|a, b| b.cmp(a));

        assert_eq!(
            positions,
            vec![position(9, 0), position(7, 2), position(5, 4), position(5, 1)]
        );
    }

    #[test]
    fn test_key_ignores_block_number() {
        let first = position(100, 2);
        let second = LedgerPosition {
            block_number: 250,
            ..first
        };

        assert_eq!(first.key(), second.key());
    }

    #[test]
    fn test_try_from_log() {
        let log = create_log(100, 2);
        let position = LedgerPosition::try_from(&log).unwrap();

        assert_eq!(position.block_number, 100);
        assert_eq!(position.log_index, 2);
        assert_eq!(Some(position.transaction_hash), log.transaction_hash);
    }

    #[test]
    fn test_try_from_log_missing_fields() {
        let mut log = create_log(100, 2);
        log.log_index = None;
        assert!(matches!(
            LedgerPosition::try_from(&log),
            Err(DecodeError::NoLogIndex)
        ));

        let mut log = create_log(100, 2);
        log.transaction_hash = None;
        assert!(matches!(
            LedgerPosition::try_from(&log),
            Err(DecodeError::NoTxHash)
        ));

        let mut log = create_log(100, 2);
        log.block_number = None;
        assert!(matches!(
            LedgerPosition::try_from(&log),
            Err(DecodeError::NoBlockNumber)
        ));
    }
}
