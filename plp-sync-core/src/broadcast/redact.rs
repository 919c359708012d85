//! Vote-revealing fields never leave the process while a market is
//! unresolved.
//!
//! Redaction is keyed on the resolution carried by the payload itself, so
//! a caller cannot bypass it by passing the wrong flag.

use plp_sync_sdk::objects::{
    BroadcastMessage, MarketAction, MarketUpdatePayload, PositionUpdatePayload,
};

pub fn redact_market(mut payload: MarketUpdatePayload) -> MarketUpdatePayload {
    if !payload.resolution.is_resolved() {
        payload.yes_percentage = None;
        payload.no_percentage = None;
        payload.yes_vote_count = None;
        payload.no_vote_count = None;
        payload.total_yes_staked = None;
        payload.total_no_staked = None;
        payload.yes_pool = None;
        payload.no_pool = None;
        payload.total_yes_shares = None;
        payload.total_no_shares = None;
        // extend is only offered while yes leads
        payload
            .available_actions
            .retain(|action| *action != MarketAction::Extend);
    }
    payload
}

pub fn redact_position(mut payload: PositionUpdatePayload) -> PositionUpdatePayload {
    if !payload.market_resolution.is_resolved() {
        payload.side = None;
        payload.yes_shares = None;
        payload.no_shares = None;
    }
    payload
}

pub fn redact(message: BroadcastMessage) -> BroadcastMessage {
    match message {
        BroadcastMessage::MarketUpdate(payload) => {
            BroadcastMessage::MarketUpdate(redact_market(payload))
        }
        BroadcastMessage::PositionUpdate(payload) => {
            BroadcastMessage::PositionUpdate(redact_position(payload))
        }
        resolved @ BroadcastMessage::MarketResolved(_) => resolved,
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use plp_sync_sdk::objects::{
        Amount, LifecycleState, MarketAction, MarketPhase, MarketUpdatePayload, PositionSide,
        PositionUpdatePayload, Resolution,
    };

    pub fn market_payload(resolution: Resolution) -> MarketUpdatePayload {
        MarketUpdatePayload {
            market_address: "Mkt".into(),
            slot: 10,
            resolution,
            phase: MarketPhase::Prediction,
            lifecycle: LifecycleState::Open,
            available_actions: vec![MarketAction::Vote],
            expiry_time: 1_900_000_000,
            target_pool: Amount(100),
            pool_balance: Amount(40),
            pool_progress_percentage: 40,
            token_mint: None,
            yes_pool: Some(Amount(9)),
            no_pool: Some(Amount(11)),
            total_yes_shares: Some(Amount(70)),
            total_no_shares: Some(Amount(30)),
            yes_percentage: Some(70),
            no_percentage: Some(30),
            yes_vote_count: Some(4),
            no_vote_count: Some(2),
            total_yes_staked: Some(Amount(25)),
            total_no_staked: Some(Amount(15)),
            synced_at: 1_700_000_000,
        }
    }

    pub fn position_payload(resolution: Resolution) -> PositionUpdatePayload {
        PositionUpdatePayload {
            position_address: "Pos".into(),
            market_address: "Mkt".into(),
            owner: "Owner".into(),
            slot: 10,
            market_resolution: resolution,
            side: Some(PositionSide::Yes),
            yes_shares: Some(Amount(25)),
            no_shares: Some(Amount(0)),
            total_invested: Amount(500),
            claimed: false,
            synced_at: 1_700_000_000,
        }
    }
}
