//! Marketplace, auction and offer-book events.
//!
//! Auction events do not carry the token or payment currency, so both auction
//! decoders read the listing back from the auction house that emitted the log.

use alloy::rpc::types::Log;

use super::{DecodeContext, decode_event};
use crate::bindings::IAuctionHouse::{self, AuctionSettled, BidPlaced};
use crate::bindings::INftMarketplace::{Listed, Purchased};
use crate::bindings::IOfferBook::{OfferAccepted, OfferCreated};
use crate::entry::{EntryDetails, HistoryEntry};
use crate::error::DecodeError;

type Decoded = Result<Option<HistoryEntry>, DecodeError>;

pub(super) fn listed(log: &Log, ctx: &DecodeContext<'_>) -> Decoded {
    let Listed {
        listingId,
        seller,
        tokenId,
        paymentToken,
        price,
    } = decode_event(log)?;

    if !ctx.owns(seller) {
        return Ok(None);
    }

    ctx.entry(
        log,
        price,
        ctx.registry.unit_for(paymentToken),
        EntryDetails::NftListed {
            listing_id: listingId,
            seller,
            token_id: tokenId,
        },
    )
    .map(Some)
}

pub(super) fn purchased(log: &Log, ctx: &DecodeContext<'_>) -> Decoded {
    let Purchased {
        listingId,
        buyer,
        seller,
        tokenId,
        paymentToken,
        price,
    } = decode_event(log)?;

    if !ctx.owns(buyer) && !ctx.owns(seller) {
        return Ok(None);
    }

    ctx.entry(
        log,
        price,
        ctx.registry.unit_for(paymentToken),
        EntryDetails::NftPurchased {
            listing_id: listingId,
            buyer,
            seller,
            token_id: tokenId,
        },
    )
    .map(Some)
}

pub(super) async fn bid_placed(log: &Log, ctx: &DecodeContext<'_>) -> Decoded {
    let BidPlaced {
        listingId,
        bidder,
        amount,
    } = decode_event(log)?;

    if !ctx.owns(bidder) {
        return Ok(None);
    }

    let listing = ctx
        .dependent_read(log.address(), &IAuctionHouse::getListingCall { listingId })
        .await?;

    ctx.entry(
        log,
        amount,
        ctx.registry.unit_for(listing.paymentToken),
        EntryDetails::AuctionBid {
            listing_id: listingId,
            bidder,
            token_id: listing.tokenId,
        },
    )
    .map(Some)
}

/// Belongs to the principal as winner or as the listing's seller; the seller
/// is only known after the listing read.
pub(super) async fn auction_settled(log: &Log, ctx: &DecodeContext<'_>) -> Decoded {
    let AuctionSettled {
        listingId,
        winner,
        amount,
    } = decode_event(log)?;

    let listing = ctx
        .dependent_read(log.address(), &IAuctionHouse::getListingCall { listingId })
        .await?;

    if !ctx.owns(winner) && !ctx.owns(listing.seller) {
        return Ok(None);
    }

    ctx.entry(
        log,
        amount,
        ctx.registry.unit_for(listing.paymentToken),
        EntryDetails::AuctionSettled {
            listing_id: listingId,
            winner,
            seller: listing.seller,
            token_id: listing.tokenId,
        },
    )
    .map(Some)
}

pub(super) fn offer_created(log: &Log, ctx: &DecodeContext<'_>) -> Decoded {
    let OfferCreated {
        offerId,
        offerer,
        tokenId,
        paymentToken,
        amount,
    } = decode_event(log)?;

    if !ctx.owns(offerer) {
        return Ok(None);
    }

    ctx.entry(
        log,
        amount,
        ctx.registry.unit_for(paymentToken),
        EntryDetails::OfferCreated {
            offer_id: offerId,
            offerer,
            token_id: tokenId,
        },
    )
    .map(Some)
}

pub(super) fn offer_accepted(log: &Log, ctx: &DecodeContext<'_>) -> Decoded {
    let OfferAccepted {
        offerId,
        buyer,
        seller,
        tokenId,
        paymentToken,
        amount,
    } = decode_event(log)?;

    if !ctx.owns(buyer) && !ctx.owns(seller) {
        return Ok(None);
    }

    ctx.entry(
        log,
        amount,
        ctx.registry.unit_for(paymentToken),
        EntryDetails::OfferAccepted {
            offer_id: offerId,
            buyer,
            seller,
            token_id: tokenId,
        },
    )
    .map(Some)
}
