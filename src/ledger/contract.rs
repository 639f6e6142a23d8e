//! Typed facade over the race contract
//!
//! One method per contract message. Query output arrives in its
//! human-readable form (numbers may be strings with thousands separators,
//! results may be wrapped in an `Ok` envelope) and is decoded here.

use super::{BlockHash, LedgerClient, LedgerError};
use crate::race::{Horse, RaceStatus};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::debug;

/// Contract message names
pub mod methods {
    pub const SET_STATUS: &str = "setStatus";
    pub const ADD_HORSE: &str = "addHorse";
    pub const ADD_BET: &str = "addBet";
    pub const SET_WINNERS: &str = "setWinners";
    pub const ADD_WINNING_COMBINATION: &str = "addWinningCombination";
    pub const ADD_REWARD: &str = "addReward";

    pub const GET_STATUS: &str = "getStatus";
    pub const GET_HORSES: &str = "getHorses";
    pub const GET_BETS: &str = "getBets";
    pub const GET_WINNERS: &str = "getWinners";
    pub const GET_WINNING_COMBINATIONS: &str = "getWinningCombinations";
    pub const GET_REWARDS: &str = "getRewards";
}

/// A bet as reported by `getBets`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BetRecord {
    pub bettor: String,
    pub amount: u128,
    pub choice: Vec<u32>,
}

impl BetRecord {
    /// Whether the bet covers both horses of the pair
    pub fn covers(&self, first: u32, second: u32) -> bool {
        self.choice.contains(&first) && self.choice.contains(&second)
    }
}

/// A reward as reported by `getRewards`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewardRecord {
    pub bettor: String,
    pub amount: u128,
}

/// The race contract, reached through a ledger client
pub struct RaceContract<L: LedgerClient> {
    ledger: L,
}

impl<L: LedgerClient> RaceContract<L> {
    pub fn new(ledger: L) -> Self {
        Self { ledger }
    }

    pub fn ledger(&self) -> &L {
        &self.ledger
    }

    /// Connected with a signing account selected
    pub fn is_ready(&self) -> bool {
        self.ledger.is_connected() && self.ledger.signer().is_some()
    }

    // ---- transactions ----

    pub async fn set_status(&self, status: RaceStatus) -> Result<BlockHash, LedgerError> {
        self.ledger
            .transact(methods::SET_STATUS, &[json!(status.code())], 0)
            .await
    }

    pub async fn add_horse(&self, horse: &Horse) -> Result<BlockHash, LedgerError> {
        self.ledger
            .transact(
                methods::ADD_HORSE,
                &[json!(horse.id), json!(horse.name_bytes())],
                0,
            )
            .await
    }

    pub async fn add_bet(&self, choice: &[u32], value: u128) -> Result<BlockHash, LedgerError> {
        self.ledger
            .transact(methods::ADD_BET, &[json!(choice)], value)
            .await
    }

    pub async fn set_winners(&self, first: u32, second: u32) -> Result<BlockHash, LedgerError> {
        self.ledger
            .transact(methods::SET_WINNERS, &[json!(first), json!(second)], 0)
            .await
    }

    pub async fn add_winning_combination(
        &self,
        first: u32,
        second: u32,
    ) -> Result<BlockHash, LedgerError> {
        self.ledger
            .transact(
                methods::ADD_WINNING_COMBINATION,
                &[json!(first), json!(second)],
                0,
            )
            .await
    }

    pub async fn add_reward(&self, bettor: &str, amount: u128) -> Result<BlockHash, LedgerError> {
        // u128 does not fit a JSON number, balances travel as decimal strings
        self.ledger
            .transact(
                methods::ADD_REWARD,
                &[json!(bettor), json!(amount.to_string())],
                0,
            )
            .await
    }

    // ---- queries ----

    /// Raw decoded output of a getter, with the `Ok` envelope removed
    pub async fn query_raw(&self, method: &str) -> Result<Value, LedgerError> {
        let output = self.ledger.query(method, &[]).await?;
        unwrap_envelope(method, output)
    }

    pub async fn status(&self) -> Result<RaceStatus, LedgerError> {
        let value = self.query_raw(methods::GET_STATUS).await?;
        parse_id(&value)
            .and_then(|code| u8::try_from(code).ok())
            .and_then(RaceStatus::from_code)
            .ok_or_else(|| LedgerError::decode(methods::GET_STATUS, format!("unknown status {value}")))
    }

    pub async fn horses(&self) -> Result<Vec<Horse>, LedgerError> {
        let value = self.query_raw(methods::GET_HORSES).await?;
        decode_list(methods::GET_HORSES, &value, |item| {
            let id = parse_id(field(item, "id", 0)?)?;
            let name = decode_name(field(item, "name", 1)?)?;
            Some(Horse { id, name })
        })
    }

    pub async fn bets(&self) -> Result<Vec<BetRecord>, LedgerError> {
        let value = self.query_raw(methods::GET_BETS).await?;
        decode_list(methods::GET_BETS, &value, decode_bet)
    }

    pub async fn winners(&self) -> Result<Vec<u32>, LedgerError> {
        let value = self.query_raw(methods::GET_WINNERS).await?;
        decode_list(methods::GET_WINNERS, &value, parse_id)
    }

    pub async fn winning_combinations(&self) -> Result<Vec<Vec<u32>>, LedgerError> {
        let value = self.query_raw(methods::GET_WINNING_COMBINATIONS).await?;
        decode_list(methods::GET_WINNING_COMBINATIONS, &value, |item| {
            Some(item.as_array()?.iter().filter_map(parse_id).collect())
        })
    }

    pub async fn rewards(&self) -> Result<Vec<RewardRecord>, LedgerError> {
        let value = self.query_raw(methods::GET_REWARDS).await?;
        decode_list(methods::GET_REWARDS, &value, |item| {
            Some(RewardRecord {
                bettor: field(item, "bettor", 0)?.as_str()?.to_string(),
                amount: parse_amount(field(item, "amount", 1)?),
            })
        })
    }
}

/// Strip the `{"Ok": ..}` wrapper of a message returning `Result`, turning
/// `{"Err": ..}` into a rejection.
fn unwrap_envelope(method: &str, output: Value) -> Result<Value, LedgerError> {
    match output {
        Value::Object(mut map) if map.len() == 1 => {
            if let Some(inner) = map.remove("Ok") {
                Ok(inner)
            } else if let Some(err) = map.remove("Err") {
                Err(LedgerError::rejected(method, err.to_string()))
            } else {
                Ok(Value::Object(map))
            }
        }
        other => Ok(other),
    }
}

fn decode_list<T>(
    method: &str,
    value: &Value,
    decode: impl Fn(&Value) -> Option<T>,
) -> Result<Vec<T>, LedgerError> {
    let items = match value {
        Value::Null => return Ok(Vec::new()),
        Value::Array(items) => items,
        other => return Err(LedgerError::decode(method, format!("expected a list, got {other}"))),
    };

    let mut decoded = Vec::with_capacity(items.len());
    for item in items {
        match decode(item) {
            Some(v) => decoded.push(v),
            None => debug!("Skipping undecodable {} entry: {}", method, item),
        }
    }
    Ok(decoded)
}

/// Struct fields come back as objects, or as positional tuples
fn field<'a>(item: &'a Value, name: &str, index: usize) -> Option<&'a Value> {
    match item {
        Value::Object(map) => map.get(name),
        Value::Array(items) => items.get(index),
        _ => None,
    }
}

fn decode_bet(item: &Value) -> Option<BetRecord> {
    let bettor = field(item, "bettor", 0)?.as_str()?.to_string();
    let amount = parse_amount(field(item, "amount", 1)?);
    let choice = field(item, "choice", 2)
        .and_then(Value::as_array)
        .map(|ids| ids.iter().filter_map(parse_id).collect())
        .unwrap_or_default();
    Some(BetRecord {
        bettor,
        amount,
        choice,
    })
}

fn decode_name(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Array(bytes) => {
            let bytes: Option<Vec<u8>> = bytes
                .iter()
                .map(|b| parse_id(b).and_then(|b| u8::try_from(b).ok()))
                .collect();
            Some(String::from_utf8_lossy(&bytes?).into_owned())
        }
        _ => None,
    }
}

/// Parse a balance, accepting `"1,000,000"` style strings. Anything
/// unparsable counts as zero.
pub fn parse_amount(value: &Value) -> u128 {
    match value {
        Value::Number(n) => n.as_u64().map(u128::from).unwrap_or(0),
        Value::String(s) => s.replace(',', "").trim().parse().unwrap_or(0),
        _ => 0,
    }
}

/// Parse a small integer id given as a number or a string
pub fn parse_id(value: &Value) -> Option<u32> {
    match value {
        Value::Number(n) => n.as_u64().and_then(|n| u32::try_from(n).ok()),
        Value::String(s) => s.replace(',', "").trim().parse().ok(),
        _ => None,
    }
}
