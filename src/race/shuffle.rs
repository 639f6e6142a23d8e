//! Race order randomness
//!
//! Every lap snapshot and the final standings come from a `Shuffler`, so
//! tests can script the finishing order.

use super::{Horse, RaceResult};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use std::collections::VecDeque;

/// Source of finishing orders
pub trait Shuffler: Send {
    /// Return the horses in a new finishing order
    fn order(&mut self, horses: &[Horse]) -> Vec<Horse>;
}

/// Uniform shuffle backed by a `rand` generator
pub struct RngShuffler<R: Rng + Send> {
    rng: R,
}

impl RngShuffler<StdRng> {
    /// Shuffler seeded from OS entropy
    pub fn from_entropy() -> Self {
        Self {
            rng: StdRng::from_entropy(),
        }
    }

    /// Reproducible shuffler
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl<R: Rng + Send> RngShuffler<R> {
    pub fn new(rng: R) -> Self {
        Self { rng }
    }
}

impl<R: Rng + Send> Shuffler for RngShuffler<R> {
    fn order(&mut self, horses: &[Horse]) -> Vec<Horse> {
        let mut positions = horses.to_vec();
        positions.shuffle(&mut self.rng);
        positions
    }
}

/// Replays fixed finishing orders given as horse ids.
///
/// Each call consumes the next scripted order. Ids missing from a script
/// keep their roster order after the scripted ones; once the script runs
/// out the roster order is returned unchanged.
#[derive(Debug, Clone, Default)]
pub struct ScriptedShuffler {
    orders: VecDeque<Vec<u32>>,
}

impl ScriptedShuffler {
    pub fn new(orders: Vec<Vec<u32>>) -> Self {
        Self {
            orders: orders.into(),
        }
    }

    /// Script the three laps and the final standings with the same order
    pub fn repeating(order: Vec<u32>, times: usize) -> Self {
        Self::new(vec![order; times])
    }
}

impl Shuffler for ScriptedShuffler {
    fn order(&mut self, horses: &[Horse]) -> Vec<Horse> {
        let Some(script) = self.orders.pop_front() else {
            return horses.to_vec();
        };

        let mut positions: Vec<Horse> = script
            .iter()
            .filter_map(|id| horses.iter().find(|h| h.id == *id).cloned())
            .collect();
        positions.extend(
            horses
                .iter()
                .filter(|h| !script.contains(&h.id))
                .cloned(),
        );
        positions
    }
}

/// Run one race and take the top three as the result
pub fn simulate_race(shuffler: &mut dyn Shuffler, horses: &[Horse]) -> Option<RaceResult> {
    RaceResult::from_order(shuffler.order(horses))
}

/// Progress bar drawn next to a horse in a lap snapshot
pub fn lap_bar(position: usize, field_size: usize) -> String {
    let filled = field_size.saturating_sub(position);
    format!("{}{}", "█".repeat(filled), "░".repeat(field_size - filled))
}
