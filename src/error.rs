//! Domain error types, split by where in the pipeline they arise.
//! Decode errors stay per-log; feed errors are the only ones a consumer sees.

use alloy::primitives::B256;
use alloy::primitives::utils::UnitsError;
use ledger_chain::ChainError;
use std::time::Duration;

use crate::decode::EventKind;

/// Reasons a single raw log could not be turned into a history entry.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("No transaction hash found in log")]
    NoTxHash,
    #[error("No log index found in log")]
    NoLogIndex,
    #[error("No block number found in log")]
    NoBlockNumber,
    #[error("Expected {expected} log but found signature {found:?}")]
    SignatureMismatch {
        expected: EventKind,
        found: Option<B256>,
    },
    #[error("Sol type error: {0}")]
    SolType(#[from] alloy::sol_types::Error),
    #[error("Failed to format amount: {0}")]
    Units(#[from] UnitsError),
    #[error("Dependent read failed: {0}")]
    DependentRead(#[from] ChainError),
    #[error("Dependent read timed out after {0:?}")]
    DependentReadTimeout(Duration),
}

/// Failures that prevent a backfill from producing anything at all.
#[derive(Debug, thiserror::Error)]
pub enum FeedError {
    #[error("Failed to fetch current block height: {0}")]
    BlockHeight(#[source] ChainError),
    #[error("Current block height request timed out after {0:?}")]
    BlockHeightTimeout(Duration),
    #[error("All {0} sources failed during backfill")]
    AllSourcesFailed(usize),
}

/// Failures refreshing the principal's lending position.
#[derive(Debug, thiserror::Error)]
pub enum LendingError {
    #[error("Lending position read failed: {0}")]
    Read(#[from] ChainError),
    #[error("Lending position read timed out after {0:?}")]
    Timeout(Duration),
    #[error("Failed to format lending position: {0}")]
    Units(#[from] UnitsError),
}
