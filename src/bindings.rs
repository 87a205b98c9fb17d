use alloy::sol;

sol!(
    #[sol(all_derives = true)]
    interface IGameController {
        event Deposit(address indexed user, address indexed token, uint256 amount);
        event Withdraw(address indexed user, address indexed token, uint256 amount);
        event SessionPurchased(address indexed player, uint256 indexed sessionId, uint256 rounds, uint256 price);
        event RoundPlayed(address indexed player, uint256 indexed gameId, uint8[3] diceValues, uint256 payout);
        event PendingReward(address indexed player, uint256 indexed gameId, uint256 amount);
        event RewardClaimed(address indexed player, uint256 amount);
        event RewardForfeited(address indexed player, uint256 amount);
        event RefundClaimed(address indexed player, uint256 amount);
        event PoolContribution(address indexed contributor, uint256 amount);
    }
);

sol!(
    #[sol(all_derives = true)]
    interface INftMarketplace {
        event Listed(uint256 indexed listingId, address indexed seller, uint256 tokenId, address paymentToken, uint256 price);
        event Purchased(uint256 indexed listingId, address indexed buyer, address seller, uint256 tokenId, address paymentToken, uint256 price);
    }
);

sol!(
    #[sol(all_derives = true)]
    interface IAuctionHouse {
        struct Listing {
            address seller;
            uint256 tokenId;
            address paymentToken;
            uint256 reservePrice;
            uint64 endTime;
            bool settled;
        }

        event BidPlaced(uint256 indexed listingId, address indexed bidder, uint256 amount);
        event AuctionSettled(uint256 indexed listingId, address indexed winner, uint256 amount);

        function getListing(uint256 listingId) external view returns (Listing memory);
    }
);

sol!(
    #[sol(all_derives = true)]
    interface IOfferBook {
        event OfferCreated(uint256 indexed offerId, address indexed offerer, uint256 tokenId, address paymentToken, uint256 amount);
        event OfferAccepted(uint256 indexed offerId, address buyer, address seller, uint256 tokenId, address paymentToken, uint256 amount);
    }
);

sol!(
    #[sol(all_derives = true)]
    interface ILendingPool {
        struct UserPosition {
            uint256 collateralValue;
            uint256 debt;
            uint256 healthFactor;
        }

        event CollateralDeposited(address indexed user, address indexed token, uint256 amount);
        event Borrowed(address indexed user, uint256 amount, uint256 healthFactor);
        event Repaid(address indexed user, uint256 amount);
        event Liquidated(address indexed user, address indexed liquidator, address collateralToken, uint256 debtCovered, uint256 collateralSeized);

        function getUserPosition(address user) external view returns (UserPosition memory);
    }
);
