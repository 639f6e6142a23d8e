//! Simulation log and progress events

use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

/// Tracing target of mirrored log entries
pub const MIRROR_TARGET: &str = "karera::log";

/// Kind of a log line, drives its colour in the rendered log
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogCategory {
    Info,
    Success,
    Warning,
    Error,
    Header,
    Phase,
    Race,
    Reward,
}

impl LogCategory {
    pub fn as_str(self) -> &'static str {
        match self {
            LogCategory::Info => "info",
            LogCategory::Success => "success",
            LogCategory::Warning => "warning",
            LogCategory::Error => "error",
            LogCategory::Header => "header",
            LogCategory::Phase => "phase",
            LogCategory::Race => "race",
            LogCategory::Reward => "reward",
        }
    }
}

/// One line of the simulation log
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    /// Local wall-clock time, `HH:MM:SS`
    pub timestamp: String,
    pub message: String,
    pub category: LogCategory,
}

impl LogEntry {
    pub fn new(message: impl Into<String>, category: LogCategory) -> Self {
        Self {
            timestamp: chrono::Local::now().format("%H:%M:%S").to_string(),
            message: message.into(),
            category,
        }
    }

    /// Mirror the entry to the tracing subscriber under [`MIRROR_TARGET`]
    pub fn trace(&self) {
        debug!(target: MIRROR_TARGET, category = self.category.as_str(), "{}", self.message);
    }
}

impl fmt::Display for LogEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.timestamp, self.message)
    }
}

/// Coarse progress of the simulation script
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Idle,
    Setup,
    Betting,
    Racing,
    Results,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Phase::Idle => "idle",
            Phase::Setup => "setup",
            Phase::Betting => "betting",
            Phase::Racing => "racing",
            Phase::Results => "results",
        };
        f.write_str(label)
    }
}

/// Update published to subscribers while a run progresses
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SimEvent {
    /// The log was cleared for a new run
    Cleared,
    Log(LogEntry),
    Phase(Phase),
}

/// Filter directives for a console that prints the log panel itself.
/// Mirrored entries are switched off so each line shows up once.
pub fn console_directives(verbose: bool) -> String {
    let level = if verbose { "debug" } else { "info" };
    format!("{level},{MIRROR_TARGET}=off")
}
