use alloy::primitives::Address;

use super::{FeedDefinition, FeedName, SourceSpec};
use crate::decode::EventKind;

const GAME_EVENTS: [EventKind; 4] = [
    EventKind::RoundPlayed,
    EventKind::PendingReward,
    EventKind::RewardClaimed,
    EventKind::RewardForfeited,
];

const TRANSACTION_EVENTS: [EventKind; 5] = [
    EventKind::Deposit,
    EventKind::Withdraw,
    EventKind::SessionPurchased,
    EventKind::RefundClaimed,
    EventKind::PoolContribution,
];

const LENDING_EVENTS: [EventKind; 4] = [
    EventKind::CollateralDeposited,
    EventKind::Borrowed,
    EventKind::Repaid,
    EventKind::Liquidated,
];

/// Deployed contract addresses. Every game-controller deployment emits the
/// same events and is merged into the same feeds.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContractAddresses {
    pub game_controllers: Vec<Address>,
    pub marketplace: Address,
    pub auction_house: Address,
    pub offer_book: Address,
    pub lending_pool: Address,
}

impl ContractAddresses {
    fn across_controllers(&self, events: &[EventKind]) -> Vec<SourceSpec> {
        self.game_controllers
            .iter()
            .flat_map(|controller| {
                events
                    .iter()
                    .map(|event| SourceSpec::new(*controller, *event))
            })
            .collect()
    }
}

impl FeedDefinition {
    pub fn for_name(name: FeedName, contracts: &ContractAddresses) -> Self {
        match name {
            FeedName::Game => Self::game(contracts),
            FeedName::Transactions => Self::transactions(contracts),
            FeedName::Nft => Self::nft(contracts),
            FeedName::Lending => Self::lending(contracts),
            FeedName::Ranking => Self::ranking(contracts),
        }
    }

    pub fn game(contracts: &ContractAddresses) -> Self {
        Self {
            name: FeedName::Game,
            principal_scoped: true,
            sources: contracts.across_controllers(&GAME_EVENTS),
        }
    }

    pub fn transactions(contracts: &ContractAddresses) -> Self {
        Self {
            name: FeedName::Transactions,
            principal_scoped: true,
            sources: contracts.across_controllers(&TRANSACTION_EVENTS),
        }
    }

    pub fn nft(contracts: &ContractAddresses) -> Self {
        Self {
            name: FeedName::Nft,
            principal_scoped: true,
            sources: vec![
                SourceSpec::new(contracts.marketplace, EventKind::Listed),
                SourceSpec::new(contracts.marketplace, EventKind::Purchased),
                SourceSpec::new(contracts.auction_house, EventKind::BidPlaced),
                SourceSpec::new(contracts.auction_house, EventKind::AuctionSettled),
                SourceSpec::new(contracts.offer_book, EventKind::OfferCreated),
                SourceSpec::new(contracts.offer_book, EventKind::OfferAccepted),
            ],
        }
    }

    pub fn lending(contracts: &ContractAddresses) -> Self {
        Self {
            name: FeedName::Lending,
            principal_scoped: true,
            sources: LENDING_EVENTS
                .iter()
                .map(|event| SourceSpec::new(contracts.lending_pool, *event))
                .collect(),
        }
    }

    /// Every round played by anyone, for the leaderboard.
    pub fn ranking(contracts: &ContractAddresses) -> Self {
        Self {
            name: FeedName::Ranking,
            principal_scoped: false,
            sources: contracts
                .game_controllers
                .iter()
                .map(|controller| SourceSpec::unfiltered(*controller, EventKind::RoundPlayed))
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{GAME_CONTROLLER, GAME_CONTROLLER_V2, test_contracts};

    #[test]
    fn test_game_feed_spans_every_deployment() {
        let definition = FeedDefinition::game(&test_contracts());

        assert_eq!(definition.sources.len(), 8);
        assert_eq!(
            definition
                .sources
                .iter()
                .filter(|source| source.event == EventKind::RoundPlayed)
                .map(|source| source.address)
                .collect::<Vec<_>>(),
            vec![GAME_CONTROLLER, GAME_CONTROLLER_V2]
        );
        assert!(definition.is_configured());
    }

    #[test]
    fn test_transactions_feed_sources() {
        let definition = FeedDefinition::transactions(&test_contracts());

        assert_eq!(definition.sources.len(), 10);
        assert!(definition.principal_scoped);
    }

    #[test]
    fn test_nft_feed_sources() {
        let contracts = test_contracts();
        let definition = FeedDefinition::nft(&contracts);

        assert_eq!(definition.sources.len(), 6);
        assert!(
            definition
                .sources
                .iter()
                .filter(|source| source.address == contracts.auction_house)
                .all(|source| matches!(
                    source.event,
                    EventKind::BidPlaced | EventKind::AuctionSettled
                ))
        );
    }

    #[test]
    fn test_lending_feed_sources() {
        let contracts = test_contracts();
        let definition = FeedDefinition::for_name(FeedName::Lending, &contracts);

        assert_eq!(definition.name, FeedName::Lending);
        assert_eq!(definition.sources.len(), 4);
        assert!(
            definition
                .sources
                .iter()
                .all(|source| source.address == contracts.lending_pool)
        );
    }

    #[test]
    fn test_ranking_feed_is_unfiltered() {
        let definition = FeedDefinition::ranking(&test_contracts());

        assert!(!definition.principal_scoped);
        assert_eq!(definition.sources.len(), 2);
        assert!(
            definition
                .sources
                .iter()
                .all(|source| source.principal_topic.is_none())
        );
    }

    #[test]
    fn test_missing_addresses_leave_feeds_unconfigured() {
        let contracts = ContractAddresses::default();

        assert!(!FeedDefinition::game(&contracts).is_configured());
        assert!(!FeedDefinition::nft(&contracts).is_configured());
        assert!(!FeedDefinition::lending(&contracts).is_configured());
    }
}
