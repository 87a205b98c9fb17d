use alloy::primitives::{Address, B256, Bytes};
use alloy::rpc::types::{Filter, Log};
use alloy::sol_types::SolCall;
use async_trait::async_trait;
use futures_util::stream::BoxStream;
use std::fmt::{Debug, Display};

pub mod error;
pub mod rpc;

pub use error::ChainError;
pub use rpc::AlloyChain;
pub use test::TestChain;

/// Which indexed topic of an event carries the value being filtered on.
/// Topic zero is always the event signature, so only 1..=3 are addressable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TopicPosition {
    First,
    Second,
    Third,
}

impl TopicPosition {
    pub const fn index(self) -> usize {
        match self {
            Self::First => 1,
            Self::Second => 2,
            Self::Third => 3,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct IndexedTopic {
    pub position: TopicPosition,
    pub value: B256,
}

impl IndexedTopic {
    /// Filters on an address stored in an indexed topic (left padded to 32 bytes).
    pub fn address(position: TopicPosition, address: Address) -> Self {
        Self {
            position,
            value: address.into_word(),
        }
    }
}

/// One contract + one event signature, optionally constrained on an indexed topic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LogFilter {
    pub address: Address,
    pub event_signature: B256,
    pub indexed: Option<IndexedTopic>,
}

impl LogFilter {
    pub fn to_filter(&self) -> Filter {
        let filter = Filter::new()
            .address(self.address)
            .event_signature(self.event_signature);

        match self.indexed {
            None => filter,
            Some(IndexedTopic { position, value }) => match position {
                TopicPosition::First => filter.topic1(value),
                TopicPosition::Second => filter.topic2(value),
                TopicPosition::Third => filter.topic3(value),
            },
        }
    }

    pub fn matches(&self, log: &Log) -> bool {
        if log.address() != self.address || log.topic0() != Some(&self.event_signature) {
            return false;
        }

        self.indexed.is_none_or(|IndexedTopic { position, value }| {
            log.topics().get(position.index()) == Some(&value)
        })
    }
}

/// A bounded historical log query, both block bounds inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogQuery {
    pub filter: LogFilter,
    pub from_block: u64,
    pub to_block: u64,
}

impl LogQuery {
    pub fn to_filter(&self) -> Filter {
        self.filter
            .to_filter()
            .from_block(self.from_block)
            .to_block(self.to_block)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlockRef {
    Hash(B256),
    Number(u64),
}

impl Display for BlockRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Hash(hash) => write!(f, "{hash}"),
            Self::Number(number) => write!(f, "#{number}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(pub B256);

impl Display for SubscriptionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// An open live log subscription. Each stream item is one batch of logs as
/// delivered by the node; the stream ends when the subscription is closed.
pub struct LogSubscription {
    pub id: SubscriptionId,
    pub batches: BoxStream<'static, Vec<Log>>,
}

impl Debug for LogSubscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogSubscription")
            .field("id", &self.id)
            .finish_non_exhaustive()
    }
}

/// Read-only view of a chain: the only operations the activity feed needs.
#[async_trait]
pub trait ChainReader: Send + Sync + 'static {
    async fn current_block_height(&self) -> Result<u64, ChainError>;

    async fn query_logs(&self, query: &LogQuery) -> Result<Vec<Log>, ChainError>;

    async fn subscribe_logs(&self, filter: &LogFilter) -> Result<LogSubscription, ChainError>;

    async fn unsubscribe(&self, id: SubscriptionId) -> Result<(), ChainError>;

    /// Unix timestamp (seconds) of the referenced block.
    async fn block_timestamp(&self, block: BlockRef) -> Result<u64, ChainError>;

    /// Raw `eth_call` against the latest block.
    async fn call(&self, to: Address, input: Bytes) -> Result<Bytes, ChainError>;
}

/// Encodes `call`, executes it against `to` and decodes the typed return value.
pub async fn read_contract<R, C>(reader: &R, to: Address, call: &C) -> Result<C::Return, ChainError>
where
    R: ChainReader + ?Sized,
    C: SolCall + Sync,
{
    let output = reader.call(to, Bytes::from(call.abi_encode())).await?;
    Ok(C::abi_decode_returns(&output)?)
}
