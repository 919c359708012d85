//! Merging decoded ledger state into the read model.

use plp_sync_sdk::objects::{
    Amount, MarketResolvedPayload, MarketUpdatePayload, PositionUpdatePayload, Resolution,
};
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::{Outcome, ProcessError, SkipReason};
use crate::accounts::{Address, DerivedFields, ParsedMarketRecord, ParsedPositionRecord};
use crate::accounts::calculate_derived_fields;
use crate::broadcast::Broadcaster;
use crate::entities::{
    MarketRecord, MarketSnapshotInsert, MarketSyncUpdate, ParticipantUpsert, to_amount,
};
use crate::store::ReadModelStore;

/// A ledger total that differs from the value cached in the read model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Discrepancy {
    pub field: &'static str,
    pub cached: Decimal,
    pub ledger: Decimal,
}

/// Financial totals whose cached value disagrees with the ledger.
///
/// Rows that were never synced hold placeholders and are not compared.
pub fn financial_discrepancies(cached: &MarketRecord, update: &MarketSyncUpdate) -> Vec<Discrepancy> {
    if cached.sync_count == 0 {
        return Vec::new();
    }
    [
        ("pool_balance", cached.pool_balance, update.pool_balance),
        ("yes_pool", cached.yes_pool, update.yes_pool),
        ("no_pool", cached.no_pool, update.no_pool),
        ("total_yes_shares", cached.total_yes_shares, update.total_yes_shares),
        ("total_no_shares", cached.total_no_shares, update.total_no_shares),
    ]
    .into_iter()
    .filter(|(_, cached, ledger)| cached != ledger)
    .map(|(field, cached, ledger)| Discrepancy {
        field,
        cached,
        ledger,
    })
    .collect()
}

pub struct Reconciler {
    store: Arc<dyn ReadModelStore>,
    broadcaster: Broadcaster,
}

impl Reconciler {
    pub fn new(store: Arc<dyn ReadModelStore>, broadcaster: Broadcaster) -> Self {
        Self { store, broadcaster }
    }

    pub fn store(&self) -> &Arc<dyn ReadModelStore> {
        &self.store
    }

    pub async fn reconcile_market(
        &self,
        address: &Address,
        slot: u64,
        market: &ParsedMarketRecord,
        now: i64,
    ) -> Result<Outcome, ProcessError> {
        let Some(cached) = self.store.market(address).await? else {
            info!(address = %address, "Market is not registered in the read model, skipping");
            return Ok(Outcome::Skipped(SkipReason::MissingRow));
        };
        if cached.is_newer_than(slot) {
            debug!(address = %address, slot, last_slot = cached.last_slot, "Stale market update");
            return Ok(Outcome::Skipped(SkipReason::StaleSlot));
        }

        let derived = calculate_derived_fields(market, now);
        let update = MarketSyncUpdate::from_ledger(address, slot, market, &derived);
        for d in financial_discrepancies(&cached, &update) {
            warn!(
                address = %address,
                field = d.field,
                cached = %d.cached,
                ledger = %d.ledger,
                "Cached market total differs from ledger state, overwriting"
            );
        }

        let Some(row) = self.store.apply_market_sync(update).await? else {
            debug!(address = %address, slot, "Market row moved past this slot concurrently");
            return Ok(Outcome::Skipped(SkipReason::StaleSlot));
        };

        let snapshot = MarketSnapshotInsert::from_ledger(address, slot, market, &derived);
        if let Err(e) = self.store.record_snapshot(snapshot).await {
            warn!(address = %address, error = %e, "Failed to record market snapshot");
        }

        self.broadcaster.broadcast_market_update(
            address,
            market_payload(address, slot, market, &derived, &row, now),
        );
        if !cached.resolution.is_resolved() && market.resolution.is_resolved() {
            info!(address = %address, resolution = ?market.resolution, "Market resolved");
            self.broadcaster.broadcast_market_resolved(MarketResolvedPayload {
                market_address: address.to_string(),
                resolution: market.resolution,
                slot,
            });
        }

        debug!(address = %address, slot, sync_count = row.sync_count, "Market reconciled");
        Ok(Outcome::Applied)
    }

    pub async fn reconcile_position(
        &self,
        address: &Address,
        slot: u64,
        position: &ParsedPositionRecord,
        now: i64,
    ) -> Result<Outcome, ProcessError> {
        let Some(market) = self.store.market(&position.market).await? else {
            info!(
                address = %address,
                market = %position.market,
                "Position belongs to an unregistered market, skipping"
            );
            return Ok(Outcome::Skipped(SkipReason::MissingRow));
        };

        let upsert = ParticipantUpsert::from_ledger(address, slot, position);
        let Some(synced) = self.store.sync_participant(upsert).await? else {
            debug!(address = %address, slot, "Stale position update");
            return Ok(Outcome::Skipped(SkipReason::StaleSlot));
        };
        if synced.inserted {
            info!(
                address = %address,
                market = %position.market,
                owner = %position.user,
                "New market participant"
            );
        }

        self.broadcaster.broadcast_position_update(
            &position.user,
            address,
            position_payload(address, slot, position, market.resolution.into(), now),
        );
        Ok(Outcome::Applied)
    }
}

pub fn market_payload(
    address: &Address,
    slot: u64,
    market: &ParsedMarketRecord,
    derived: &DerivedFields,
    row: &MarketRecord,
    now: i64,
) -> MarketUpdatePayload {
    MarketUpdatePayload {
        market_address: address.to_string(),
        slot,
        resolution: market.resolution,
        phase: market.phase,
        lifecycle: derived.lifecycle,
        available_actions: derived.available_actions.clone(),
        expiry_time: market.expiry_time,
        target_pool: Amount(market.target_pool),
        pool_balance: Amount(market.pool_balance),
        pool_progress_percentage: derived.pool_progress_percentage,
        token_mint: market.token_mint.as_ref().map(Address::to_string),
        yes_pool: Some(Amount(market.yes_pool)),
        no_pool: Some(Amount(market.no_pool)),
        total_yes_shares: Some(Amount(market.total_yes_shares)),
        total_no_shares: Some(Amount(market.total_no_shares)),
        yes_percentage: Some(derived.yes_percentage),
        no_percentage: Some(derived.no_percentage),
        yes_vote_count: Some(row.yes_vote_count),
        no_vote_count: Some(row.no_vote_count),
        total_yes_staked: Some(to_amount(row.total_yes_staked)),
        total_no_staked: Some(to_amount(row.total_no_staked)),
        synced_at: now,
    }
}

pub fn position_payload(
    address: &Address,
    slot: u64,
    position: &ParsedPositionRecord,
    market_resolution: Resolution,
    now: i64,
) -> PositionUpdatePayload {
    PositionUpdatePayload {
        position_address: address.to_string(),
        market_address: position.market.to_string(),
        owner: position.user.to_string(),
        slot,
        market_resolution,
        side: position.side(),
        yes_shares: Some(Amount(position.yes_shares)),
        no_shares: Some(Amount(position.no_shares)),
        total_invested: Amount(position.total_invested),
        claimed: position.claimed,
        synced_at: now,
    }
}
