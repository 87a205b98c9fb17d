use alloy::transports::{RpcError, TransportErrorKind};

use crate::BlockRef;

#[derive(Debug, thiserror::Error)]
pub enum ChainError {
    #[error("RPC transport error: {0}")]
    RpcTransport(#[from] RpcError<TransportErrorKind>),
    #[error("Sol type error: {0}")]
    SolType(#[from] alloy::sol_types::Error),
    #[error("Block not found: {0}")]
    BlockNotFound(BlockRef),
    #[error("Unknown subscription: {0}")]
    UnknownSubscription(String),
    #[error("Chain unavailable: {0}")]
    Unavailable(String),
}
