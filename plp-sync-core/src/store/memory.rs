use async_trait::async_trait;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Mutex;

use super::{ReadModelStore, StoreError, parse_addresses};
use crate::accounts::Address;
use crate::entities::{
    MarketParticipant, MarketRecord, MarketResolution, MarketSnapshotInsert, MarketSyncUpdate,
    ParticipantSynced, ParticipantUpsert, PositionSideKind, SyncState, utc_now,
};

/// In-process [`ReadModelStore`] with the same row semantics as the
/// Postgres store. Used by tests and local runs without a database.
#[derive(Default)]
pub struct MemoryReadModelStore {
    state: Mutex<State>,
    fail_writes: AtomicBool,
    fail_snapshots: AtomicBool,
}

#[derive(Default)]
struct State {
    markets: HashMap<String, MarketRecord>,
    participants: HashMap<(String, String), MarketParticipant>,
    snapshots: Vec<MarketSnapshotInsert>,
}

impl MemoryReadModelStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a market row, as the web application does on creation.
    pub async fn insert_market(&self, record: MarketRecord) {
        let mut state = self.state.lock().await;
        state.markets.insert(record.address.clone(), record);
    }

    pub async fn participant(&self, market: &Address, owner: &Address) -> Option<MarketParticipant> {
        let state = self.state.lock().await;
        state
            .participants
            .get(&(market.to_string(), owner.to_string()))
            .cloned()
    }

    pub async fn snapshots(&self) -> Vec<MarketSnapshotInsert> {
        self.state.lock().await.snapshots.clone()
    }

    /// Make every market and participant write fail until reset.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_snapshots(&self, fail: bool) {
        self.fail_snapshots.store(fail, Ordering::SeqCst);
    }

    fn check_writes(&self) -> Result<(), StoreError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("writes disabled"));
        }
        Ok(())
    }
}

#[async_trait]
impl ReadModelStore for MemoryReadModelStore {
    async fn market(&self, address: &Address) -> Result<Option<MarketRecord>, StoreError> {
        let state = self.state.lock().await;
        Ok(state.markets.get(&address.to_string()).cloned())
    }

    async fn apply_market_sync(
        &self,
        update: MarketSyncUpdate,
    ) -> Result<Option<MarketRecord>, StoreError> {
        self.check_writes()?;
        let mut state = self.state.lock().await;
        let Some(row) = state.markets.get_mut(&update.address) else {
            return Ok(None);
        };
        if row.last_slot > update.slot {
            return Ok(None);
        }
        row.founder = Some(update.founder);
        row.ipfs_cid = Some(update.ipfs_cid);
        row.metadata_uri = Some(update.metadata_uri);
        row.token_mint = update.token_mint;
        row.target_pool = update.target_pool;
        row.pool_balance = update.pool_balance;
        row.distribution_pool = update.distribution_pool;
        row.yes_pool = update.yes_pool;
        row.no_pool = update.no_pool;
        row.total_yes_shares = update.total_yes_shares;
        row.total_no_shares = update.total_no_shares;
        row.expiry_time = update.expiry_time;
        row.phase = update.phase;
        row.resolution = update.resolution;
        row.pool_progress_percentage = update.pool_progress_percentage;
        row.yes_percentage = update.yes_percentage;
        row.no_percentage = update.no_percentage;
        row.available_actions = update.available_actions;
        row.last_slot = update.slot;
        row.last_synced_at = Some(utc_now());
        row.sync_status = SyncState::Synced;
        row.sync_count += 1;
        Ok(Some(row.clone()))
    }

    async fn sync_participant(
        &self,
        upsert: ParticipantUpsert,
    ) -> Result<Option<ParticipantSynced>, StoreError> {
        self.check_writes()?;
        let mut state = self.state.lock().await;
        if !state.markets.contains_key(&upsert.market_address) {
            return Err(StoreError::MissingMarket(upsert.market_address));
        }

        let key = (upsert.market_address.clone(), upsert.owner.clone());
        let now = utc_now();
        let inserted = match state.participants.get_mut(&key) {
            Some(existing) if existing.last_slot > upsert.slot => return Ok(None),
            Some(existing) => {
                existing.position_address = upsert.position_address;
                existing.yes_shares = upsert.yes_shares;
                existing.no_shares = upsert.no_shares;
                existing.total_invested = upsert.total_invested;
                existing.side = upsert.side;
                existing.claimed = upsert.claimed;
                existing.last_slot = upsert.slot;
                existing.updated_at = now;
                false
            }
            None => {
                state.participants.insert(
                    key,
                    MarketParticipant {
                        market_address: upsert.market_address.clone(),
                        owner: upsert.owner,
                        position_address: upsert.position_address,
                        yes_shares: upsert.yes_shares,
                        no_shares: upsert.no_shares,
                        total_invested: upsert.total_invested,
                        side: upsert.side,
                        claimed: upsert.claimed,
                        last_slot: upsert.slot,
                        created_at: now,
                        updated_at: now,
                    },
                );
                true
            }
        };

        let (mut yes_staked, mut no_staked) = (Decimal::ZERO, Decimal::ZERO);
        for participant in state
            .participants
            .values()
            .filter(|p| p.market_address == upsert.market_address)
        {
            match participant.side {
                Some(PositionSideKind::Yes) => yes_staked += participant.total_invested,
                Some(PositionSideKind::No) => no_staked += participant.total_invested,
                None => {}
            }
        }

        let Some(market) = state.markets.get_mut(&upsert.market_address) else {
            return Err(StoreError::MissingMarket(upsert.market_address));
        };
        if inserted {
            match upsert.side {
                Some(PositionSideKind::Yes) => market.yes_vote_count += 1,
                Some(PositionSideKind::No) => market.no_vote_count += 1,
                None => {}
            }
        }
        market.total_yes_staked = yes_staked;
        market.total_no_staked = no_staked;

        Ok(Some(ParticipantSynced { inserted }))
    }

    async fn record_snapshot(&self, snapshot: MarketSnapshotInsert) -> Result<(), StoreError> {
        if self.fail_snapshots.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("snapshot writes disabled"));
        }
        self.state.lock().await.snapshots.push(snapshot);
        Ok(())
    }

    async fn mark_sync_failed(&self, address: &Address) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        if let Some(row) = state.markets.get_mut(&address.to_string()) {
            row.sync_status = SyncState::Failed;
        }
        Ok(())
    }

    async fn unresolved_markets(&self) -> Result<Vec<Address>, StoreError> {
        let state = self.state.lock().await;
        let mut rows: Vec<&MarketRecord> = state
            .markets
            .values()
            .filter(|row| row.resolution == MarketResolution::Unresolved)
            .collect();
        rows.sort_by_key(|row| row.created_at);
        parse_addresses(rows.into_iter().map(|row| row.address.clone()).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accounts::{calculate_derived_fields, fixtures};

    async fn store_with_market(address: &Address) -> MemoryReadModelStore {
        let store = MemoryReadModelStore::new();
        store
            .insert_market(MarketRecord::registered(address.to_string(), utc_now()))
            .await;
        store
    }

    fn sync_update(address: &Address, slot: u64) -> MarketSyncUpdate {
        let market = fixtures::market();
        let derived = calculate_derived_fields(&market, 0);
        MarketSyncUpdate::from_ledger(address, slot, &market, &derived)
    }

    #[tokio::test]
    async fn market_sync_stamps_metadata_and_rejects_older_slots() {
        let address = fixtures::address(2);
        let store = store_with_market(&address).await;

        let row = store.apply_market_sync(sync_update(&address, 10)).await.unwrap().unwrap();
        assert_eq!(row.sync_count, 1);
        assert_eq!(row.last_slot, 10);
        assert_eq!(row.sync_status, SyncState::Synced);
        assert!(row.last_synced_at.is_some());

        let row = store.apply_market_sync(sync_update(&address, 10)).await.unwrap().unwrap();
        assert_eq!(row.sync_count, 2);

        assert!(store.apply_market_sync(sync_update(&address, 9)).await.unwrap().is_none());
        assert_eq!(store.market(&address).await.unwrap().unwrap().sync_count, 2);
    }

    #[tokio::test]
    async fn missing_market_is_not_created() {
        let address = fixtures::address(2);
        let store = MemoryReadModelStore::new();
        assert!(store.apply_market_sync(sync_update(&address, 1)).await.unwrap().is_none());
        assert!(store.market(&address).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn first_participant_insert_counts_a_vote_once() {
        let market = fixtures::address(2);
        let store = store_with_market(&market).await;
        let position = fixtures::position();
        let upsert = ParticipantUpsert::from_ledger(&fixtures::address(5), 3, &position);

        let first = store.sync_participant(upsert.clone()).await.unwrap().unwrap();
        assert!(first.inserted);

        let second = store.sync_participant(upsert).await.unwrap().unwrap();
        assert!(!second.inserted);

        let row = store.market(&market).await.unwrap().unwrap();
        assert_eq!(row.yes_vote_count, 1);
        assert_eq!(row.no_vote_count, 0);
        assert_eq!(row.total_yes_staked, Decimal::from(500_000_000u64));
        assert_eq!(row.total_no_staked, Decimal::ZERO);
    }

    #[tokio::test]
    async fn participant_update_overwrites_optimistic_values() {
        let market = fixtures::address(2);
        let store = store_with_market(&market).await;
        let mut position = fixtures::position();
        store
            .sync_participant(ParticipantUpsert::from_ledger(&fixtures::address(5), 3, &position))
            .await
            .unwrap();

        position.yes_shares = 40;
        position.total_invested = 900_000_000;
        store
            .sync_participant(ParticipantUpsert::from_ledger(&fixtures::address(5), 4, &position))
            .await
            .unwrap();

        let stale = ParticipantUpsert::from_ledger(&fixtures::address(5), 2, &fixtures::position());
        assert!(store.sync_participant(stale).await.unwrap().is_none());

        let row = store.participant(&market, &position.user).await.unwrap();
        assert_eq!(row.yes_shares, Decimal::from(40u64));
        assert_eq!(row.total_invested, Decimal::from(900_000_000u64));
        assert_eq!(row.last_slot, 4);
    }

    #[tokio::test]
    async fn lists_only_unresolved_markets() {
        let open = fixtures::address(2);
        let store = store_with_market(&open).await;
        let mut resolved = MarketRecord::registered(fixtures::address(4).to_string(), utc_now());
        resolved.resolution = MarketResolution::YesWins;
        store.insert_market(resolved).await;

        assert_eq!(store.unresolved_markets().await.unwrap(), vec![open]);
    }
}
