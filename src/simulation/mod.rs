//! Simulation modules

pub mod delay;
pub mod log;
pub mod orchestrator;
pub mod payout;

pub use delay::{Delay, NoDelay, TokioDelay};
pub use log::{LogCategory, LogEntry, Phase, SimEvent};
pub use orchestrator::{Orchestrator, Outcome, RunReport};
pub use payout::{Payout, Winner};
