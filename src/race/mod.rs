//! Race domain types
//!
//! Horses, simulated bets, race status codes and the race result produced
//! by a simulated run.

pub mod shuffle;

use serde::{Deserialize, Serialize};
use std::fmt;

pub use shuffle::{RngShuffler, ScriptedShuffler, Shuffler};

/// Decimals of the ledger's native token (1 token = 10^12 units)
pub const TOKEN_DECIMALS: u32 = 12;

/// A horse taking part in the race
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Horse {
    /// Horse id, starting at 1
    pub id: u32,
    /// Display name
    pub name: String,
}

impl Horse {
    pub fn new(id: u32, name: &str) -> Self {
        Self {
            id,
            name: name.to_string(),
        }
    }

    /// Name encoded the way the contract stores it
    pub fn name_bytes(&self) -> Vec<u8> {
        self.name.as_bytes().to_vec()
    }
}

/// A bet placed by the simulation script
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimulatedBet {
    /// Pair of horse ids the bet is placed on
    pub choice: [u32; 2],
    /// Amount in the smallest currency unit
    pub amount: u128,
}

impl SimulatedBet {
    pub fn new(first: u32, second: u32, amount: u128) -> Self {
        Self {
            choice: [first, second],
            amount,
        }
    }
}

/// Race status as stored by the contract
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RaceStatus {
    Pending,
    Started,
    Finished,
}

impl RaceStatus {
    /// Numeric code sent to `setStatus`
    pub fn code(self) -> u8 {
        match self {
            RaceStatus::Pending => 0,
            RaceStatus::Started => 1,
            RaceStatus::Finished => 2,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(RaceStatus::Pending),
            1 => Some(RaceStatus::Started),
            2 => Some(RaceStatus::Finished),
            _ => None,
        }
    }
}

impl fmt::Display for RaceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            RaceStatus::Pending => "Pending",
            RaceStatus::Started => "Started",
            RaceStatus::Finished => "Finished",
        };
        f.write_str(label)
    }
}

/// Final standings of a simulated race
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RaceResult {
    pub first: Horse,
    pub second: Horse,
    pub third: Horse,
    /// Full finishing order
    pub all: Vec<Horse>,
}

impl RaceResult {
    /// Build a result from a finishing order. Returns `None` when fewer than
    /// three horses ran.
    pub fn from_order(all: Vec<Horse>) -> Option<Self> {
        if all.len() < 3 {
            return None;
        }
        Some(Self {
            first: all[0].clone(),
            second: all[1].clone(),
            third: all[2].clone(),
            all,
        })
    }

    /// The (first, second) id pair recorded as winners
    pub fn winning_pair(&self) -> (u32, u32) {
        (self.first.id, self.second.id)
    }
}

/// Horses used by the simulation script
pub fn default_horses() -> Vec<Horse> {
    vec![
        Horse::new(1, "Thunder Bolt"),
        Horse::new(2, "Silver Arrow"),
        Horse::new(3, "Golden Star"),
        Horse::new(4, "Dark Knight"),
        Horse::new(5, "Wild Spirit"),
        Horse::new(6, "Lucky Charm"),
    ]
}

/// Bets placed by the simulation script
pub fn default_bets() -> Vec<SimulatedBet> {
    vec![
        SimulatedBet::new(1, 2, 1_000_000_000_000),
        SimulatedBet::new(3, 4, 2_000_000_000_000),
        SimulatedBet::new(1, 5, 1_500_000_000_000),
    ]
}

/// Format an amount in smallest units as tokens with four decimals,
/// rounding half up.
pub fn format_tokens(amount: u128) -> String {
    let unit = 10u128.pow(TOKEN_DECIMALS);
    let step = unit / 10_000;
    let scaled = amount / step + u128::from(amount % step >= step / 2);
    format!("{}.{:04}", scaled / 10_000, scaled % 10_000)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        for status in [RaceStatus::Pending, RaceStatus::Started, RaceStatus::Finished] {
            assert_eq!(RaceStatus::from_code(status.code()), Some(status));
        }
        assert_eq!(RaceStatus::from_code(7), None);
    }

    #[test]
    fn test_format_tokens() {
        assert_eq!(format_tokens(1_000_000_000_000), "1.0000");
        assert_eq!(format_tokens(1_500_000_000_000), "1.5000");
        assert_eq!(format_tokens(4_500_000_000_000 / 3), "1.5000");
        assert_eq!(format_tokens(0), "0.0000");
        assert_eq!(format_tokens(49_999_999), "0.0000");
        assert_eq!(format_tokens(50_000_000), "0.0001");
    }

    #[test]
    fn test_race_result_needs_three_horses() {
        let horses = default_horses();
        assert!(RaceResult::from_order(horses[..2].to_vec()).is_none());

        let result = RaceResult::from_order(horses.clone()).unwrap();
        assert_eq!(result.winning_pair(), (1, 2));
        assert_eq!(result.third.id, 3);
        assert_eq!(result.all.len(), 6);
    }
}
