//! Leaderboard built from the ranking feed's `PlayRound` entries.

use alloy::primitives::{Address, U256};
use itertools::Itertools;
use serde::Serialize;
use std::collections::HashMap;

use crate::entry::{EntryDetails, HistoryEntry};
use crate::registry::{DEFAULT_DECIMALS, format_amount};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerStanding {
    pub rank: usize,
    pub player: Address,
    pub rounds_played: u64,
    pub rounds_won: u64,
    pub total_payout: String,
    pub raw_total_payout: U256,
}

#[derive(Default)]
struct Tally {
    rounds_played: u64,
    rounds_won: u64,
    total_payout: U256,
    decimals: Option<u8>,
}

/// A round counts as won when it paid out anything. Ties on payout are
/// broken by wins, then by address so the order is stable.
pub fn rank_players(entries: &[HistoryEntry]) -> Vec<PlayerStanding> {
    let mut tallies: HashMap<Address, Tally> = HashMap::new();

    for entry in entries {
        let EntryDetails::PlayRound { player, .. } = entry.details else {
            continue;
        };

        let tally = tallies.entry(player).or_default();
        tally.rounds_played += 1;
        if !entry.raw_amount.is_zero() {
            tally.rounds_won += 1;
        }
        tally.total_payout = tally.total_payout.saturating_add(entry.raw_amount);
        tally.decimals.get_or_insert(entry.display_unit.decimals());
    }

    tallies
        .into_iter()
        .sorted_by(|(a_player, a), (b_player, b)| {
            b.total_payout
                .cmp(&a.total_payout)
                .then(b.rounds_won.cmp(&a.rounds_won))
                .then(a_player.cmp(b_player))
        })
        .enumerate()
        .map(|(index, (player, tally))| {
            let decimals = tally.decimals.unwrap_or(DEFAULT_DECIMALS);
            PlayerStanding {
                rank: index + 1,
                player,
                rounds_played: tally.rounds_played,
                rounds_won: tally.rounds_won,
                total_payout: format_amount(tally.total_payout, decimals)
                    .unwrap_or_else(|_| tally.total_payout.to_string()),
                raw_total_payout: tally.total_payout,
            }
        })
        .collect()
}
