//! What a feed watches: sources, scope and scan settings.

use alloy::primitives::Address;
use ledger_chain::{IndexedTopic, LogFilter, TopicPosition};
use std::fmt::{self, Display};
use std::time::Duration;

use crate::decode::{EventKind, Scope, TimestampFallback};

mod definitions;

pub use definitions::ContractAddresses;

pub const DEFAULT_BACKFILL_WINDOW: u64 = 50_000;
pub const DEFAULT_CHUNK_SIZE: u64 = 50_000;
pub const DEFAULT_QUERY_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_DEPENDENT_READ_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, clap::ValueEnum)]
pub enum FeedName {
    Game,
    Transactions,
    Nft,
    Lending,
    Ranking,
}

impl FeedName {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Game => "game",
            Self::Transactions => "transactions",
            Self::Nft => "nft",
            Self::Lending => "lending",
            Self::Ranking => "ranking",
        }
    }
}

impl Display for FeedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeedSettings {
    /// Number of blocks behind the head covered by the backfill.
    pub backfill_window: u64,
    /// Largest block range requested in a single log query.
    pub chunk_size: u64,
    pub query_timeout: Duration,
    /// Bound on each dependent contract read and block timestamp lookup.
    pub dependent_read_timeout: Duration,
    pub timestamp_fallback: TimestampFallback,
}

impl Default for FeedSettings {
    fn default() -> Self {
        Self {
            backfill_window: DEFAULT_BACKFILL_WINDOW,
            chunk_size: DEFAULT_CHUNK_SIZE,
            query_timeout: DEFAULT_QUERY_TIMEOUT,
            dependent_read_timeout: DEFAULT_DEPENDENT_READ_TIMEOUT,
            timestamp_fallback: TimestampFallback::default(),
        }
    }
}

/// One contract emitting one event kind. `principal_topic` names the indexed
/// topic that is constrained to the principal when the feed is scoped to one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SourceSpec {
    pub address: Address,
    pub event: EventKind,
    pub principal_topic: Option<TopicPosition>,
}

impl SourceSpec {
    pub const fn new(address: Address, event: EventKind) -> Self {
        Self {
            address,
            event,
            principal_topic: event.principal_topic(),
        }
    }

    /// A source that is never narrowed by topic, even for a principal-scoped feed.
    pub const fn unfiltered(address: Address, event: EventKind) -> Self {
        Self {
            address,
            event,
            principal_topic: None,
        }
    }

    pub fn log_filter(&self, scope: Scope) -> LogFilter {
        let indexed = self
            .principal_topic
            .zip(scope.principal())
            .map(|(position, principal)| IndexedTopic::address(position, principal));

        LogFilter {
            address: self.address,
            event_signature: self.event.signature_hash(),
            indexed,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedDefinition {
    pub name: FeedName,
    /// Whether the feed shows one principal's activity or everyone's.
    pub principal_scoped: bool,
    pub sources: Vec<SourceSpec>,
}

impl FeedDefinition {
    /// A feed with no sources, or with a source at the zero address, has not
    /// been configured and never touches the chain.
    pub fn is_configured(&self) -> bool {
        !self.sources.is_empty()
            && self
                .sources
                .iter()
                .all(|source| source.address != Address::ZERO)
    }

    /// The scope this feed runs with for `principal`, or `None` when a
    /// principal-scoped feed has no usable principal.
    pub fn scope_for(&self, principal: Option<Address>) -> Option<Scope> {
        if !self.principal_scoped {
            return Some(Scope::Everyone);
        }

        principal
            .filter(|principal| *principal != Address::ZERO)
            .map(Scope::Principal)
    }
}
