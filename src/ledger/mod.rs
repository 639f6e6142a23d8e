//! Ledger access
//!
//! The console never talks to a node directly. Everything goes through a
//! `LedgerClient`, which knows how to dry-run a contract message as a query
//! and how to sign and submit it as a transaction.

pub mod contract;
pub mod memory;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use thiserror::Error;

pub use contract::{BetRecord, RaceContract, RewardRecord};
pub use memory::MemoryLedger;

/// Errors surfaced by a ledger client
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("Contract or account not connected")]
    NotConnected,

    #[error("No signing account selected")]
    NoSigner,

    #[error("{method} rejected: {reason}")]
    Rejected { method: String, reason: String },

    #[error("Failed to decode {method} output: {reason}")]
    Decode { method: String, reason: String },

    #[error("Ledger state error: {0}")]
    State(String),
}

impl LedgerError {
    pub fn rejected(method: &str, reason: impl Into<String>) -> Self {
        Self::Rejected {
            method: method.to_string(),
            reason: reason.into(),
        }
    }

    pub fn decode(method: &str, reason: impl Into<String>) -> Self {
        Self::Decode {
            method: method.to_string(),
            reason: reason.into(),
        }
    }
}

/// Hash of the block a transaction was included in
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockHash(pub String);

impl fmt::Display for BlockHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Capability to call the deployed contract
#[async_trait]
pub trait LedgerClient: Send + Sync {
    /// Whether node and contract are both reachable
    fn is_connected(&self) -> bool;

    /// Address of the account that signs transactions
    fn signer(&self) -> Option<String>;

    /// Read-only call. Returns the decoded, human-readable output.
    async fn query(&self, method: &str, args: &[Value]) -> Result<Value, LedgerError>;

    /// Signed call carrying `value` units. Resolves once included in a block.
    async fn transact(
        &self,
        method: &str,
        args: &[Value],
        value: u128,
    ) -> Result<BlockHash, LedgerError>;
}
