//! In-memory ledger
//!
//! Stores what was submitted and answers the getters from that store,
//! rendering output the way a node's human-readable decoding does. Used as
//! the dry-run target of the console and as the test double of the
//! orchestrator. It does not enforce the contract's rules beyond refusing a
//! duplicate horse id.

use super::contract::{methods, parse_amount, parse_id, BetRecord, RewardRecord};
use super::{BlockHash, LedgerClient, LedgerError};
use crate::race::Horse;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info};

/// Contract storage as seen by the getters
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LedgerState {
    pub status: u8,
    pub horses: Vec<Horse>,
    pub bets: Vec<BetRecord>,
    pub winners: (u32, u32),
    pub winning_combinations: Vec<(u32, u32)>,
    pub rewards: Vec<RewardRecord>,
    pub block_number: u64,
}

/// A call submitted to the ledger, successful or not
#[derive(Debug, Clone, PartialEq)]
pub struct CallRecord {
    pub method: String,
    pub args: Vec<Value>,
    pub value: u128,
    pub succeeded: bool,
}

/// Injected failure for calls to `method`, optionally only when the first
/// argument equals `first_arg`
#[derive(Debug, Clone)]
struct Rejection {
    method: String,
    first_arg: Option<Value>,
    reason: String,
}

#[derive(Debug, Default)]
struct Inner {
    state: LedgerState,
    journal: Vec<CallRecord>,
    rejections: Vec<Rejection>,
    responses: HashMap<String, Value>,
}

/// Shared-state ledger; clones observe the same storage
#[derive(Debug, Clone)]
pub struct MemoryLedger {
    inner: Arc<Mutex<Inner>>,
    signer: Option<String>,
    connected: bool,
}

impl Default for MemoryLedger {
    fn default() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner::default())),
            signer: None,
            connected: true,
        }
    }
}

impl MemoryLedger {
    /// Connected ledger with `signer` selected
    pub fn with_signer(signer: &str) -> Self {
        Self {
            signer: Some(signer.to_string()),
            ..Default::default()
        }
    }

    /// Ledger that is not reachable
    pub fn disconnected() -> Self {
        Self {
            connected: false,
            ..Default::default()
        }
    }

    /// Start from previously saved storage
    pub fn from_state(state: LedgerState, signer: Option<String>) -> Self {
        let ledger = Self {
            signer,
            ..Default::default()
        };
        ledger.lock().state = state;
        ledger
    }

    /// Load storage from a JSON state file. A missing file yields empty storage.
    pub fn load(path: &Path, signer: Option<String>) -> Result<Self, LedgerError> {
        if !path.exists() {
            debug!("No ledger state at {}, starting empty", path.display());
            return Ok(Self::from_state(LedgerState::default(), signer));
        }

        let contents = fs::read_to_string(path)
            .map_err(|e| LedgerError::State(format!("read {}: {e}", path.display())))?;
        let state: LedgerState = serde_json::from_str(&contents)
            .map_err(|e| LedgerError::State(format!("parse {}: {e}", path.display())))?;
        Ok(Self::from_state(state, signer))
    }

    /// Write storage to a JSON state file
    pub fn save(&self, path: &Path) -> Result<(), LedgerError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .map_err(|e| LedgerError::State(format!("create {}: {e}", parent.display())))?;
        }
        let json = serde_json::to_string_pretty(&self.state())
            .map_err(|e| LedgerError::State(e.to_string()))?;
        fs::write(path, json)
            .map_err(|e| LedgerError::State(format!("write {}: {e}", path.display())))?;
        info!("Ledger state saved to {}", path.display());
        Ok(())
    }

    /// Reject every call to `method`
    pub fn reject(&self, method: &str, reason: &str) {
        self.lock().rejections.push(Rejection {
            method: method.to_string(),
            first_arg: None,
            reason: reason.to_string(),
        });
    }

    /// Reject calls to `method` whose first argument is `first_arg`
    pub fn reject_when(&self, method: &str, first_arg: Value, reason: &str) {
        self.lock().rejections.push(Rejection {
            method: method.to_string(),
            first_arg: Some(first_arg),
            reason: reason.to_string(),
        });
    }

    /// Answer queries to `method` with a fixed output instead of storage
    pub fn respond(&self, method: &str, output: Value) {
        self.lock().responses.insert(method.to_string(), output);
    }

    /// Snapshot of the storage
    pub fn state(&self) -> LedgerState {
        self.lock().state.clone()
    }

    /// Every transaction attempted so far
    pub fn journal(&self) -> Vec<CallRecord> {
        self.lock().journal.clone()
    }

    /// Transactions attempted for one message
    pub fn calls_to(&self, method: &str) -> Vec<CallRecord> {
        self.lock()
            .journal
            .iter()
            .filter(|c| c.method == method)
            .cloned()
            .collect()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn ensure_ready(&self) -> Result<&str, LedgerError> {
        if !self.connected {
            return Err(LedgerError::NotConnected);
        }
        self.signer.as_deref().ok_or(LedgerError::NoSigner)
    }
}

impl Inner {
    fn rejection(&self, method: &str, args: &[Value]) -> Option<String> {
        self.rejections
            .iter()
            .find(|r| {
                r.method == method
                    && r.first_arg
                        .as_ref()
                        .map_or(true, |expected| args.first() == Some(expected))
            })
            .map(|r| r.reason.clone())
    }

    fn apply(
        &mut self,
        method: &str,
        args: &[Value],
        value: u128,
        signer: &str,
    ) -> Result<(), LedgerError> {
        let arg = |i: usize| {
            args.get(i)
                .ok_or_else(|| LedgerError::rejected(method, format!("missing argument {i}")))
        };
        let id_arg = |i: usize| {
            arg(i).and_then(|v| {
                parse_id(v).ok_or_else(|| LedgerError::rejected(method, format!("bad argument {v}")))
            })
        };

        let state = &mut self.state;
        match method {
            methods::SET_STATUS => {
                let code = id_arg(0)?;
                state.status = u8::try_from(code)
                    .map_err(|_| LedgerError::rejected(method, "status out of range"))?;
            }
            methods::ADD_HORSE => {
                let id = id_arg(0)?;
                if state.horses.iter().any(|h| h.id == id) {
                    return Err(LedgerError::rejected(method, "HorseAlreadyExists"));
                }
                let name = match arg(1)? {
                    Value::Array(bytes) => {
                        let bytes: Vec<u8> = bytes
                            .iter()
                            .filter_map(|b| parse_id(b).and_then(|b| u8::try_from(b).ok()))
                            .collect();
                        String::from_utf8_lossy(&bytes).into_owned()
                    }
                    other => other.as_str().unwrap_or_default().to_string(),
                };
                state.horses.push(Horse { id, name });
            }
            methods::ADD_BET => {
                let choice = arg(0)?
                    .as_array()
                    .map(|ids| ids.iter().filter_map(parse_id).collect())
                    .unwrap_or_default();
                state.bets.push(BetRecord {
                    bettor: signer.to_string(),
                    amount: value,
                    choice,
                });
            }
            methods::SET_WINNERS => {
                state.winners = (id_arg(0)?, id_arg(1)?);
            }
            methods::ADD_WINNING_COMBINATION => {
                state.winning_combinations.push((id_arg(0)?, id_arg(1)?));
            }
            methods::ADD_REWARD => {
                let bettor = arg(0)?
                    .as_str()
                    .ok_or_else(|| LedgerError::rejected(method, "bettor must be an address"))?
                    .to_string();
                let amount = parse_amount(arg(1)?);
                state.rewards.push(RewardRecord { bettor, amount });
            }
            other => return Err(LedgerError::rejected(other, "unknown message")),
        }
        Ok(())
    }

    fn render(&self, method: &str) -> Result<Value, LedgerError> {
        let state = &self.state;
        let output = match method {
            methods::GET_STATUS => json!(state.status.to_string()),
            methods::GET_HORSES => Value::Array(
                state
                    .horses
                    .iter()
                    .map(|h| json!({"id": h.id.to_string(), "name": h.name}))
                    .collect(),
            ),
            methods::GET_BETS => Value::Array(
                state
                    .bets
                    .iter()
                    .map(|b| {
                        json!({
                            "bettor": b.bettor,
                            "amount": human_amount(b.amount),
                            "choice": b.choice.iter().map(u32::to_string).collect::<Vec<_>>(),
                        })
                    })
                    .collect(),
            ),
            methods::GET_WINNERS => json!([state.winners.0.to_string(), state.winners.1.to_string()]),
            methods::GET_WINNING_COMBINATIONS => Value::Array(
                state
                    .winning_combinations
                    .iter()
                    .map(|(a, b)| json!([a.to_string(), b.to_string()]))
                    .collect(),
            ),
            methods::GET_REWARDS => Value::Array(
                state
                    .rewards
                    .iter()
                    .map(|r| json!({"bettor": r.bettor, "amount": human_amount(r.amount)}))
                    .collect(),
            ),
            other => return Err(LedgerError::rejected(other, "unknown message")),
        };
        Ok(json!({ "Ok": output }))
    }
}

/// Render a balance with thousands separators
pub fn human_amount(amount: u128) -> String {
    let digits = amount.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

fn block_hash(block_number: u64, method: &str, args: &[Value]) -> BlockHash {
    let mut hasher = Sha256::new();
    hasher.update(block_number.to_le_bytes());
    hasher.update(method.as_bytes());
    hasher.update(Value::Array(args.to_vec()).to_string().as_bytes());
    BlockHash(format!("0x{}", hex::encode(hasher.finalize())))
}

#[async_trait]
impl LedgerClient for MemoryLedger {
    fn is_connected(&self) -> bool {
        self.connected
    }

    fn signer(&self) -> Option<String> {
        self.signer.clone()
    }

    async fn query(&self, method: &str, _args: &[Value]) -> Result<Value, LedgerError> {
        if !self.connected {
            return Err(LedgerError::NotConnected);
        }
        let inner = self.lock();
        if let Some(reason) = inner.rejection(method, &[]) {
            return Err(LedgerError::rejected(method, reason));
        }
        if let Some(output) = inner.responses.get(method) {
            return Ok(output.clone());
        }
        inner.render(method)
    }

    async fn transact(
        &self,
        method: &str,
        args: &[Value],
        value: u128,
    ) -> Result<BlockHash, LedgerError> {
        let signer = self.ensure_ready()?.to_string();
        let mut inner = self.lock();

        let outcome = match inner.rejection(method, args) {
            Some(reason) => Err(LedgerError::rejected(method, reason)),
            None => inner.apply(method, args, value, &signer),
        };

        inner.journal.push(CallRecord {
            method: method.to_string(),
            args: args.to_vec(),
            value,
            succeeded: outcome.is_ok(),
        });
        outcome?;

        inner.state.block_number += 1;
        let hash = block_hash(inner.state.block_number, method, args);
        debug!("{} included in block #{} ({})", method, inner.state.block_number, hash);
        Ok(hash)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_human_amount() {
        assert_eq!(human_amount(0), "0");
        assert_eq!(human_amount(999), "999");
        assert_eq!(human_amount(1_000), "1,000");
        assert_eq!(human_amount(1_500_000_000_000), "1,500,000,000,000");
    }

    #[tokio::test]
    async fn test_duplicate_horse_rejected() {
        let ledger = MemoryLedger::with_signer("5Alice");
        let args = [json!(1), json!(b"Thunder Bolt".to_vec())];

        ledger.transact(methods::ADD_HORSE, &args, 0).await.unwrap();
        let err = ledger.transact(methods::ADD_HORSE, &args, 0).await.unwrap_err();

        assert!(matches!(err, LedgerError::Rejected { .. }));
        assert_eq!(ledger.state().horses.len(), 1);
        assert_eq!(ledger.state().horses[0].name, "Thunder Bolt");
        assert_eq!(ledger.calls_to(methods::ADD_HORSE).len(), 2);
    }

    #[tokio::test]
    async fn test_transact_requires_signer() {
        let ledger = MemoryLedger::default();
        let err = ledger.transact(methods::SET_STATUS, &[json!(0)], 0).await.unwrap_err();
        assert!(matches!(err, LedgerError::NoSigner));

        let ledger = MemoryLedger::disconnected();
        let err = ledger.query(methods::GET_STATUS, &[]).await.unwrap_err();
        assert!(matches!(err, LedgerError::NotConnected));
    }

    #[tokio::test]
    async fn test_targeted_rejection() {
        let ledger = MemoryLedger::with_signer("5Alice");
        ledger.reject_when(methods::SET_STATUS, json!(1), "NotOwner");

        assert!(ledger.transact(methods::SET_STATUS, &[json!(0)], 0).await.is_ok());
        assert!(ledger.transact(methods::SET_STATUS, &[json!(1)], 0).await.is_err());
        assert_eq!(ledger.state().status, 0);
        assert_eq!(ledger.state().block_number, 1);
    }

    #[tokio::test]
    async fn test_scripted_response() {
        let ledger = MemoryLedger::with_signer("5Alice");
        ledger.respond(methods::GET_WINNERS, json!({"Ok": ["4", "2"]}));

        let output = ledger.query(methods::GET_WINNERS, &[]).await.unwrap();
        assert_eq!(output, json!({"Ok": ["4", "2"]}));
    }

    #[test]
    fn test_state_file_round_trip() {
        let dir = tempdir::TempDir::new("ledger-state").unwrap();
        let path = dir.path().join("state.json");

        let mut state = LedgerState::default();
        state.status = 2;
        state.bets.push(BetRecord {
            bettor: "5Alice".to_string(),
            amount: 2_000_000_000_000,
            choice: vec![3, 4],
        });
        MemoryLedger::from_state(state, None).save(&path).unwrap();

        let loaded = MemoryLedger::load(&path, Some("5Bob".to_string())).unwrap();
        assert_eq!(loaded.state().status, 2);
        assert_eq!(loaded.state().bets[0].amount, 2_000_000_000_000);
        assert_eq!(loaded.signer().as_deref(), Some("5Bob"));

        let missing = MemoryLedger::load(&dir.path().join("none.json"), None).unwrap();
        assert!(missing.state().horses.is_empty());
    }
}
