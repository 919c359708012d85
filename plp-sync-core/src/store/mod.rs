//! Read-model persistence seen from the event processor.
//!
//! The processor only ever reads a market row, overwrites its ledger
//! columns, upserts participants and appends snapshots. Rows are created
//! elsewhere; nothing here inserts a market.

pub mod memory;
pub mod postgres;

pub use memory::MemoryReadModelStore;
pub use postgres::PgReadModelStore;

use async_trait::async_trait;
use thiserror::Error;

use crate::accounts::{Address, AddressParseError};
use crate::entities::{
    MarketRecord, MarketSnapshotInsert, MarketSyncUpdate, ParticipantSynced, ParticipantUpsert,
};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("stored address {value} is invalid: {source}")]
    InvalidAddress {
        value: String,
        source: AddressParseError,
    },

    #[error("market {0} is not registered")]
    MissingMarket(String),

    #[error("store unavailable: {0}")]
    Unavailable(&'static str),
}

#[async_trait]
pub trait ReadModelStore: Send + Sync {
    async fn market(&self, address: &Address) -> Result<Option<MarketRecord>, StoreError>;

    /// Overwrite the market's ledger columns and bump its sync metadata.
    ///
    /// Returns the updated row, or `None` when the row is missing or holds
    /// a newer slot.
    async fn apply_market_sync(
        &self,
        update: MarketSyncUpdate,
    ) -> Result<Option<MarketRecord>, StoreError>;

    /// Upsert a participant, counting a first-time voter and refreshing
    /// staked totals atomically. `None` when the stored row is newer.
    async fn sync_participant(
        &self,
        upsert: ParticipantUpsert,
    ) -> Result<Option<ParticipantSynced>, StoreError>;

    async fn record_snapshot(&self, snapshot: MarketSnapshotInsert) -> Result<(), StoreError>;

    async fn mark_sync_failed(&self, address: &Address) -> Result<(), StoreError>;

    async fn unresolved_markets(&self) -> Result<Vec<Address>, StoreError>;
}

pub(crate) fn parse_addresses(values: Vec<String>) -> Result<Vec<Address>, StoreError> {
    values
        .into_iter()
        .map(|value| match value.parse() {
            Ok(address) => Ok(address),
            Err(source) => Err(StoreError::InvalidAddress { value, source }),
        })
        .collect()
}
