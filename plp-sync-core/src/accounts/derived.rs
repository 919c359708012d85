//! Values derived from a decoded market.
//!
//! Everything here is a pure function of the decoded record and the
//! current unix time. Balances and shares are widened to `u128` before
//! any multiplication.

use plp_sync_sdk::objects::{LifecycleState, MarketAction, MarketPhase};
use rust_decimal::Decimal;

use super::ParsedMarketRecord;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DerivedFields {
    pub pool_progress_percentage: u8,
    pub yes_percentage: u8,
    pub no_percentage: u8,
    pub lifecycle: LifecycleState,
    pub available_actions: Vec<MarketAction>,
    /// `yes_pool + no_pool`, the market's AMM volume.
    pub total_pool: u128,
}

/// `min(100, balance * 100 / target)`; a zero target counts as full.
pub fn pool_progress_percentage(pool_balance: u64, target_pool: u64) -> u8 {
    if target_pool == 0 {
        return 100;
    }
    let pct = u128::from(pool_balance) * 100 / u128::from(target_pool);
    pct.min(100) as u8
}

/// Share-based yes percentage, 50 when no shares exist.
pub fn shares_yes_percentage(total_yes_shares: u64, total_no_shares: u64) -> u8 {
    let total = u128::from(total_yes_shares) + u128::from(total_no_shares);
    if total == 0 {
        return 50;
    }
    (u128::from(total_yes_shares) * 100 / total) as u8
}

pub fn is_pool_full(market: &ParsedMarketRecord) -> bool {
    market.pool_balance >= market.target_pool
}

pub fn lifecycle_state(market: &ParsedMarketRecord, now: i64) -> LifecycleState {
    if market.resolution.is_resolved() {
        LifecycleState::Resolved
    } else if now >= market.expiry_time {
        LifecycleState::Expired
    } else if is_pool_full(market) {
        LifecycleState::PoolFull
    } else {
        LifecycleState::Open
    }
}

pub fn available_actions(market: &ParsedMarketRecord, state: LifecycleState) -> Vec<MarketAction> {
    match state {
        LifecycleState::Open => vec![MarketAction::Vote],
        LifecycleState::PoolFull | LifecycleState::Expired => {
            let mut actions = vec![MarketAction::Resolve];
            // extending is only offered once, from the prediction phase
            if is_pool_full(market)
                && market.total_yes_shares > market.total_no_shares
                && market.phase == MarketPhase::Prediction
            {
                actions.push(MarketAction::Extend);
            }
            actions
        }
        LifecycleState::Resolved => vec![MarketAction::Claim],
    }
}

/// AMM yes price, `no_pool / (yes_pool + no_pool)`, rounded to 9 places.
pub fn yes_price(yes_pool: u64, no_pool: u64) -> Option<Decimal> {
    let total = Decimal::from(yes_pool) + Decimal::from(no_pool);
    Decimal::from(no_pool)
        .checked_div(total)
        .map(|price| price.round_dp(9))
}

pub fn calculate_derived_fields(market: &ParsedMarketRecord, now: i64) -> DerivedFields {
    let yes_percentage = shares_yes_percentage(market.total_yes_shares, market.total_no_shares);
    let lifecycle = lifecycle_state(market, now);
    DerivedFields {
        pool_progress_percentage: pool_progress_percentage(market.pool_balance, market.target_pool),
        yes_percentage,
        no_percentage: 100 - yes_percentage,
        lifecycle,
        available_actions: available_actions(market, lifecycle),
        total_pool: u128::from(market.yes_pool) + u128::from(market.no_pool),
    }
}
