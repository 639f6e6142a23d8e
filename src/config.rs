//! Console configuration

use crate::race::{default_bets, default_horses, Horse, SimulatedBet};
use anyhow::{ensure, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Default node of the devnet the contract is deployed to
pub const DEVNET_WS_URL: &str = "wss://devnet02.xode.net";

/// Default local node
pub const LOCAL_WS_URL: &str = "ws://127.0.0.1:9944";

/// Address of the deployed race contract on devnet
pub const DEVNET_CONTRACT: &str = "XqFfUXhebfpLLFKPKyb5uK7YJBxYjexFAm5UJKeg3VLvno8eA";

/// Pauses between simulation steps, in milliseconds
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Pacing {
    /// After announcing a phase
    pub phase_ms: u64,
    /// After a single contract call
    pub step_ms: u64,
    /// After each horse is added
    pub horse_ms: u64,
    /// After each lap snapshot
    pub lap_ms: u64,
}

impl Default for Pacing {
    fn default() -> Self {
        Self {
            phase_ms: 1000,
            step_ms: 500,
            horse_ms: 300,
            lap_ms: 1500,
        }
    }
}

impl Pacing {
    /// No pauses at all
    pub fn none() -> Self {
        Self {
            phase_ms: 0,
            step_ms: 0,
            horse_ms: 0,
            lap_ms: 0,
        }
    }

    pub fn phase(&self) -> Duration {
        Duration::from_millis(self.phase_ms)
    }

    pub fn step(&self) -> Duration {
        Duration::from_millis(self.step_ms)
    }

    pub fn horse(&self) -> Duration {
        Duration::from_millis(self.horse_ms)
    }

    pub fn lap(&self) -> Duration {
        Duration::from_millis(self.lap_ms)
    }
}

/// Main console configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsoleConfig {
    /// WebSocket endpoint of the node
    pub ws_url: String,

    /// Address of the deployed race contract
    pub contract_address: String,

    /// Account used to sign transactions
    pub signer: Option<String>,

    /// Horses entered by the simulation
    pub horses: Vec<Horse>,

    /// Bets placed by the simulation
    pub bets: Vec<SimulatedBet>,

    /// Lap snapshots shown before the final standings
    pub laps: u32,

    /// Log pacing
    pub pacing: Pacing,

    /// Output directory for run archives and reports
    pub output_dir: String,
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        Self {
            ws_url: DEVNET_WS_URL.to_string(),
            contract_address: DEVNET_CONTRACT.to_string(),
            signer: None,
            horses: default_horses(),
            bets: default_bets(),
            laps: 3,
            pacing: Pacing::default(),
            output_dir: "output".to_string(),
        }
    }
}

impl ConsoleConfig {
    /// Config for the public devnet deployment
    pub fn devnet() -> Self {
        Self::default()
    }

    /// Config for a contract deployed on a local node
    pub fn local() -> Self {
        Self {
            ws_url: LOCAL_WS_URL.to_string(),
            contract_address: String::new(),
            ..Default::default()
        }
    }

    /// Config for a quick run without pauses
    pub fn quick_test() -> Self {
        Self {
            pacing: Pacing::none(),
            ..Self::local()
        }
    }

    /// Load a JSON config file. Missing fields take their defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: Self = serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Check the roster can produce a race result
    pub fn validate(&self) -> Result<()> {
        ensure!(
            self.horses.len() >= 3,
            "At least 3 horses are needed for a race, got {}",
            self.horses.len()
        );
        ensure!(
            self.horses.iter().all(|h| h.id >= 1),
            "Horse ids start at 1"
        );

        let ids: HashSet<u32> = self.horses.iter().map(|h| h.id).collect();
        ensure!(ids.len() == self.horses.len(), "Horse ids must be unique");

        for bet in &self.bets {
            ensure!(
                bet.choice.iter().all(|id| ids.contains(id)),
                "Bet on {:?} names a horse outside the roster",
                bet.choice
            );
        }
        Ok(())
    }
}
