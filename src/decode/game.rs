use alloy::rpc::types::Log;

use super::{DecodeContext, decode_event};
use crate::bindings::IGameController::{
    Deposit, PendingReward, PoolContribution, RefundClaimed, RewardClaimed, RewardForfeited,
    RoundPlayed, SessionPurchased, Withdraw,
};
use crate::entry::{EntryDetails, HistoryEntry};
use crate::error::DecodeError;

type Decoded = Result<Option<HistoryEntry>, DecodeError>;

pub(super) fn deposit(log: &Log, ctx: &DecodeContext<'_>) -> Decoded {
    let Deposit {
        user,
        token,
        amount,
    } = decode_event(log)?;

    if !ctx.owns(user) {
        return Ok(None);
    }

    ctx.entry(
        log,
        amount,
        ctx.registry.unit_for(token),
        EntryDetails::Deposit { user, token },
    )
    .map(Some)
}

pub(super) fn withdraw(log: &Log, ctx: &DecodeContext<'_>) -> Decoded {
    let Withdraw {
        user,
        token,
        amount,
    } = decode_event(log)?;

    if !ctx.owns(user) {
        return Ok(None);
    }

    ctx.entry(
        log,
        amount,
        ctx.registry.unit_for(token),
        EntryDetails::Withdraw { user, token },
    )
    .map(Some)
}

pub(super) fn session_purchased(log: &Log, ctx: &DecodeContext<'_>) -> Decoded {
    let SessionPurchased {
        player,
        sessionId,
        rounds,
        price,
    } = decode_event(log)?;

    if !ctx.owns(player) {
        return Ok(None);
    }

    ctx.entry(
        log,
        price,
        ctx.registry.stablecoin_unit(),
        EntryDetails::BuySession {
            player,
            session_id: sessionId,
            rounds,
        },
    )
    .map(Some)
}

/// The primary amount of a round is its payout; zero means the round was lost.
pub(super) fn round_played(log: &Log, ctx: &DecodeContext<'_>) -> Decoded {
    let RoundPlayed {
        player,
        gameId,
        diceValues,
        payout,
    } = decode_event(log)?;

    if !ctx.owns(player) {
        return Ok(None);
    }

    ctx.entry(
        log,
        payout,
        ctx.registry.stablecoin_unit(),
        EntryDetails::PlayRound {
            player,
            game_id: gameId,
            dice_values: diceValues,
        },
    )
    .map(Some)
}

pub(super) fn pending_reward(log: &Log, ctx: &DecodeContext<'_>) -> Decoded {
    let PendingReward {
        player,
        gameId,
        amount,
    } = decode_event(log)?;

    if !ctx.owns(player) {
        return Ok(None);
    }

    ctx.entry(
        log,
        amount,
        ctx.registry.stablecoin_unit(),
        EntryDetails::PendingReward {
            player,
            game_id: gameId,
        },
    )
    .map(Some)
}

pub(super) fn reward_claimed(log: &Log, ctx: &DecodeContext<'_>) -> Decoded {
    let RewardClaimed { player, amount } = decode_event(log)?;

    if !ctx.owns(player) {
        return Ok(None);
    }

    ctx.entry(
        log,
        amount,
        ctx.registry.stablecoin_unit(),
        EntryDetails::RewardClaimed { player },
    )
    .map(Some)
}

pub(super) fn reward_forfeited(log: &Log, ctx: &DecodeContext<'_>) -> Decoded {
    let RewardForfeited { player, amount } = decode_event(log)?;

    if !ctx.owns(player) {
        return Ok(None);
    }

    ctx.entry(
        log,
        amount,
        ctx.registry.stablecoin_unit(),
        EntryDetails::RewardForfeited { player },
    )
    .map(Some)
}

pub(super) fn refund_claimed(log: &Log, ctx: &DecodeContext<'_>) -> Decoded {
    let RefundClaimed { player, amount } = decode_event(log)?;

    if !ctx.owns(player) {
        return Ok(None);
    }

    ctx.entry(
        log,
        amount,
        ctx.registry.stablecoin_unit(),
        EntryDetails::ClaimRefund { player },
    )
    .map(Some)
}

pub(super) fn pool_contribution(log: &Log, ctx: &DecodeContext<'_>) -> Decoded {
    let PoolContribution {
        contributor,
        amount,
    } = decode_event(log)?;

    if !ctx.owns(contributor) {
        return Ok(None);
    }

    ctx.entry(
        log,
        amount,
        ctx.registry.stablecoin_unit(),
        EntryDetails::PoolContribution { contributor },
    )
    .map(Some)
}
