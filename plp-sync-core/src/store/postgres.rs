use async_trait::async_trait;
use kanau::processor::Processor;
use sqlx::PgPool;

use super::{ReadModelStore, StoreError, parse_addresses};
use crate::accounts::Address;
use crate::entities::market::{
    ApplyMarketSync, GetMarketByAddress, ListUnresolvedMarkets, MarkMarketSyncFailed,
};
use crate::entities::participant::SyncParticipant;
use crate::entities::snapshot::InsertMarketSnapshot;
use crate::entities::{
    MarketRecord, MarketSnapshotInsert, MarketSyncUpdate, ParticipantSynced, ParticipantUpsert,
};
use crate::framework::DatabaseProcessor;

/// [`ReadModelStore`] over the Postgres read model.
#[derive(Clone)]
pub struct PgReadModelStore {
    db: DatabaseProcessor,
}

impl PgReadModelStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            db: DatabaseProcessor { pool },
        }
    }
}

#[async_trait]
impl ReadModelStore for PgReadModelStore {
    async fn market(&self, address: &Address) -> Result<Option<MarketRecord>, StoreError> {
        let query = GetMarketByAddress {
            address: address.to_string(),
        };
        Ok(self.db.process(query).await?)
    }

    async fn apply_market_sync(
        &self,
        update: MarketSyncUpdate,
    ) -> Result<Option<MarketRecord>, StoreError> {
        Ok(self.db.process(ApplyMarketSync { update }).await?)
    }

    async fn sync_participant(
        &self,
        upsert: ParticipantUpsert,
    ) -> Result<Option<ParticipantSynced>, StoreError> {
        Ok(self.db.process(SyncParticipant { upsert }).await?)
    }

    async fn record_snapshot(&self, snapshot: MarketSnapshotInsert) -> Result<(), StoreError> {
        Ok(self.db.process(InsertMarketSnapshot { snapshot }).await?)
    }

    async fn mark_sync_failed(&self, address: &Address) -> Result<(), StoreError> {
        let query = MarkMarketSyncFailed {
            address: address.to_string(),
        };
        self.db.process(query).await?;
        Ok(())
    }

    async fn unresolved_markets(&self) -> Result<Vec<Address>, StoreError> {
        let addresses = self.db.process(ListUnresolvedMarkets).await?;
        parse_addresses(addresses)
    }
}
