//! Reward split for a finished race

use crate::ledger::BetRecord;
use serde::{Deserialize, Serialize};

/// A bet that covered both recorded winners
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Winner {
    pub bettor: String,
    /// Amount originally staked
    pub amount: u128,
}

/// How the pot is split between winning bets
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payout {
    /// Sum of every bet
    pub total_pot: u128,
    pub winners: Vec<Winner>,
    /// `total_pot / winners` rounded down, zero without winners
    pub reward_per_winner: u128,
}

impl Payout {
    /// Split the pot of `bets` between those covering `first` and `second`.
    /// The division remainder stays undistributed.
    ///
    /// Returns `None` when the pot does not fit in a `u128`.
    pub fn compute(bets: &[BetRecord], first: u32, second: u32) -> Option<Self> {
        let total_pot = bets
            .iter()
            .try_fold(0u128, |pot, b| pot.checked_add(b.amount))?;
        let winners: Vec<Winner> = bets
            .iter()
            .filter(|b| b.covers(first, second))
            .map(|b| Winner {
                bettor: b.bettor.clone(),
                amount: b.amount,
            })
            .collect();

        let reward_per_winner = match winners.len() {
            0 => 0,
            n => total_pot / n as u128,
        };

        Some(Self {
            total_pot,
            winners,
            reward_per_winner,
        })
    }

    /// Undistributed remainder of the integer split
    pub fn remainder(&self) -> u128 {
        self.total_pot - self.reward_per_winner * self.winners.len() as u128
    }
}
