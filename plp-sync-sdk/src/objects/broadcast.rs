//! Payloads pushed to stream consumers.
//!
//! Every vote-revealing field is optional: the service nulls them while a
//! market is unresolved, so consumers must treat `None` as "hidden", not
//! as zero.

use serde::{Deserialize, Serialize};

use super::amount::Amount;

/// Market resolution as stored on the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Resolution {
    Unresolved,
    YesWins,
    NoWins,
    Refund,
}

impl Resolution {
    pub fn is_resolved(self) -> bool {
        !matches!(self, Resolution::Unresolved)
    }
}

/// Market phase as stored on the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarketPhase {
    Prediction,
    Funding,
}

/// Derived lifecycle state of a market.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    Open,
    PoolFull,
    Expired,
    Resolved,
}

/// Action a participant or founder can currently take on a market.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarketAction {
    Vote,
    Resolve,
    Extend,
    Claim,
}

impl MarketAction {
    pub fn as_str(self) -> &'static str {
        match self {
            MarketAction::Vote => "vote",
            MarketAction::Resolve => "resolve",
            MarketAction::Extend => "extend",
            MarketAction::Claim => "claim",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PositionSide {
    Yes,
    No,
}

/// Snapshot of a market after reconciliation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarketUpdatePayload {
    pub market_address: String,
    pub slot: u64,
    pub resolution: Resolution,
    pub phase: MarketPhase,
    pub lifecycle: LifecycleState,
    pub available_actions: Vec<MarketAction>,
    pub expiry_time: i64,
    pub target_pool: Amount,
    pub pool_balance: Amount,
    pub pool_progress_percentage: u8,
    pub token_mint: Option<String>,
    pub yes_pool: Option<Amount>,
    pub no_pool: Option<Amount>,
    pub total_yes_shares: Option<Amount>,
    pub total_no_shares: Option<Amount>,
    pub yes_percentage: Option<u8>,
    pub no_percentage: Option<u8>,
    pub yes_vote_count: Option<i64>,
    pub no_vote_count: Option<i64>,
    pub total_yes_staked: Option<Amount>,
    pub total_no_staked: Option<Amount>,
    /// Unix timestamp (seconds) of the reconciliation that produced this payload.
    pub synced_at: i64,
}

/// Snapshot of a single participant position after reconciliation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PositionUpdatePayload {
    pub position_address: String,
    pub market_address: String,
    pub owner: String,
    pub slot: u64,
    /// Resolution of the owning market at the time of the update.
    pub market_resolution: Resolution,
    pub side: Option<PositionSide>,
    pub yes_shares: Option<Amount>,
    pub no_shares: Option<Amount>,
    pub total_invested: Amount,
    pub claimed: bool,
    pub synced_at: i64,
}

/// Emitted once when a market row transitions from unresolved to resolved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarketResolvedPayload {
    pub market_address: String,
    pub resolution: Resolution,
    pub slot: u64,
}

/// A message delivered on one or more topics.
///
/// ```json
/// {"type":"market_update","data":{ ... }}
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum BroadcastMessage {
    MarketUpdate(MarketUpdatePayload),
    PositionUpdate(PositionUpdatePayload),
    MarketResolved(MarketResolvedPayload),
}

impl BroadcastMessage {
    /// Market address this message refers to.
    pub fn market_address(&self) -> &str {
        match self {
            BroadcastMessage::MarketUpdate(p) => &p.market_address,
            BroadcastMessage::PositionUpdate(p) => &p.market_address,
            BroadcastMessage::MarketResolved(p) => &p.market_address,
        }
    }
}
