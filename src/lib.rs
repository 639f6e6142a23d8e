//! Karera DS race contract console
//!
//! Drives a horse racing betting contract through a scripted race:
//! horses are entered, bets placed, a mock race run, winners recorded and
//! rewards distributed, with a timestamped log of every step.

pub mod analytics;
pub mod config;
pub mod ledger;
pub mod race;
pub mod simulation;

pub use analytics::report::generate_report;
pub use config::ConsoleConfig;
pub use simulation::orchestrator::Orchestrator;
