use kanau::processor::Processor;
use rust_decimal::Decimal;

use super::{MarketPhaseKind, MarketResolution, PositionSideKind, SyncState, to_numeric};
use crate::accounts::{Address, DerivedFields, ParsedMarketRecord};
use crate::framework::{DatabaseAccessor, DatabaseProcessor};

/// A row of `markets`.
///
/// Ledger-sourced columns are `NULL`/zero until the first reconciliation.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct MarketRecord {
    pub address: String,
    pub founder: Option<String>,
    pub ipfs_cid: Option<String>,
    pub metadata_uri: Option<String>,
    pub token_mint: Option<String>,
    pub target_pool: Decimal,
    pub pool_balance: Decimal,
    pub distribution_pool: Decimal,
    pub yes_pool: Decimal,
    pub no_pool: Decimal,
    pub total_yes_shares: Decimal,
    pub total_no_shares: Decimal,
    pub expiry_time: i64,
    pub phase: MarketPhaseKind,
    pub resolution: MarketResolution,
    pub pool_progress_percentage: i16,
    pub yes_percentage: i16,
    pub no_percentage: i16,
    pub available_actions: Vec<String>,
    pub yes_vote_count: i64,
    pub no_vote_count: i64,
    pub total_yes_staked: Decimal,
    pub total_no_staked: Decimal,
    pub last_synced_at: Option<time::PrimitiveDateTime>,
    pub last_slot: i64,
    pub sync_status: SyncState,
    pub sync_count: i64,
    pub created_at: time::PrimitiveDateTime,
}

const MARKET_COLUMNS: &str = "address, founder, ipfs_cid, metadata_uri, token_mint, \
    target_pool, pool_balance, distribution_pool, yes_pool, no_pool, \
    total_yes_shares, total_no_shares, expiry_time, phase, resolution, \
    pool_progress_percentage, yes_percentage, no_percentage, available_actions, \
    yes_vote_count, no_vote_count, total_yes_staked, total_no_staked, \
    last_synced_at, last_slot, sync_status, sync_count, created_at";

impl MarketRecord {
    /// A row as it looks right after registration, before any sync.
    pub fn registered(address: impl Into<String>, created_at: time::PrimitiveDateTime) -> Self {
        Self {
            address: address.into(),
            founder: None,
            ipfs_cid: None,
            metadata_uri: None,
            token_mint: None,
            target_pool: Decimal::ZERO,
            pool_balance: Decimal::ZERO,
            distribution_pool: Decimal::ZERO,
            yes_pool: Decimal::ZERO,
            no_pool: Decimal::ZERO,
            total_yes_shares: Decimal::ZERO,
            total_no_shares: Decimal::ZERO,
            expiry_time: 0,
            phase: MarketPhaseKind::Prediction,
            resolution: MarketResolution::Unresolved,
            pool_progress_percentage: 0,
            yes_percentage: 50,
            no_percentage: 50,
            available_actions: Vec::new(),
            yes_vote_count: 0,
            no_vote_count: 0,
            total_yes_staked: Decimal::ZERO,
            total_no_staked: Decimal::ZERO,
            last_synced_at: None,
            last_slot: 0,
            sync_status: SyncState::Pending,
            sync_count: 0,
            created_at,
        }
    }

    /// Whether an event observed at `slot` is older than what the row holds.
    pub fn is_newer_than(&self, slot: u64) -> bool {
        self.last_slot > slot_to_i64(slot)
    }
}

/// Ledger state and derived fields written by one reconciliation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarketSyncUpdate {
    pub address: String,
    pub slot: i64,
    pub founder: String,
    pub ipfs_cid: String,
    pub metadata_uri: String,
    pub token_mint: Option<String>,
    pub target_pool: Decimal,
    pub pool_balance: Decimal,
    pub distribution_pool: Decimal,
    pub yes_pool: Decimal,
    pub no_pool: Decimal,
    pub total_yes_shares: Decimal,
    pub total_no_shares: Decimal,
    pub expiry_time: i64,
    pub phase: MarketPhaseKind,
    pub resolution: MarketResolution,
    pub pool_progress_percentage: i16,
    pub yes_percentage: i16,
    pub no_percentage: i16,
    pub available_actions: Vec<String>,
}

impl MarketSyncUpdate {
    pub fn from_ledger(
        address: &Address,
        slot: u64,
        market: &ParsedMarketRecord,
        derived: &DerivedFields,
    ) -> Self {
        Self {
            address: address.to_string(),
            slot: slot_to_i64(slot),
            founder: market.founder.to_string(),
            ipfs_cid: market.ipfs_cid.clone(),
            metadata_uri: market.metadata_uri.clone(),
            token_mint: market.token_mint.as_ref().map(Address::to_string),
            target_pool: to_numeric(market.target_pool),
            pool_balance: to_numeric(market.pool_balance),
            distribution_pool: to_numeric(market.distribution_pool),
            yes_pool: to_numeric(market.yes_pool),
            no_pool: to_numeric(market.no_pool),
            total_yes_shares: to_numeric(market.total_yes_shares),
            total_no_shares: to_numeric(market.total_no_shares),
            expiry_time: market.expiry_time,
            phase: market.phase.into(),
            resolution: market.resolution.into(),
            pool_progress_percentage: i16::from(derived.pool_progress_percentage),
            yes_percentage: i16::from(derived.yes_percentage),
            no_percentage: i16::from(derived.no_percentage),
            available_actions: derived
                .available_actions
                .iter()
                .map(|action| action.as_str().to_owned())
                .collect(),
        }
    }
}

pub(crate) fn slot_to_i64(slot: u64) -> i64 {
    i64::try_from(slot).unwrap_or(i64::MAX)
}

#[derive(Debug, Clone)]
pub struct GetMarketByAddress {
    pub address: String,
}

impl Processor<GetMarketByAddress> for DatabaseProcessor {
    type Output = Option<MarketRecord>;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:GetMarketByAddress")]
    async fn process(&self, query: GetMarketByAddress) -> Result<Option<MarketRecord>, sqlx::Error> {
        let sql = format!("SELECT {MARKET_COLUMNS} FROM markets WHERE address = $1");
        sqlx::query_as::<_, MarketRecord>(&sql)
            .bind(query.address)
            .fetch_optional(&self.pool)
            .await
    }
}

/// Overwrite ledger-sourced columns and stamp sync metadata.
///
/// Returns `None` when the row is missing or already holds a newer slot.
#[derive(Debug, Clone)]
pub struct ApplyMarketSync {
    pub update: MarketSyncUpdate,
}

impl Processor<ApplyMarketSync> for DatabaseProcessor {
    type Output = Option<MarketRecord>;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:ApplyMarketSync")]
    async fn process(&self, query: ApplyMarketSync) -> Result<Option<MarketRecord>, sqlx::Error> {
        let update = query.update;
        let sql = format!(
            r#"
            UPDATE markets SET
                founder = $3,
                ipfs_cid = $4,
                metadata_uri = $5,
                token_mint = $6,
                target_pool = $7,
                pool_balance = $8,
                distribution_pool = $9,
                yes_pool = $10,
                no_pool = $11,
                total_yes_shares = $12,
                total_no_shares = $13,
                expiry_time = $14,
                phase = $15,
                resolution = $16,
                pool_progress_percentage = $17,
                yes_percentage = $18,
                no_percentage = $19,
                available_actions = $20,
                last_slot = $2,
                last_synced_at = (now() AT TIME ZONE 'utc'),
                sync_status = 'synced',
                sync_count = sync_count + 1
            WHERE address = $1 AND last_slot <= $2
            RETURNING {MARKET_COLUMNS}
            "#
        );
        sqlx::query_as::<_, MarketRecord>(&sql)
            .bind(update.address)
            .bind(update.slot)
            .bind(update.founder)
            .bind(update.ipfs_cid)
            .bind(update.metadata_uri)
            .bind(update.token_mint)
            .bind(update.target_pool)
            .bind(update.pool_balance)
            .bind(update.distribution_pool)
            .bind(update.yes_pool)
            .bind(update.no_pool)
            .bind(update.total_yes_shares)
            .bind(update.total_no_shares)
            .bind(update.expiry_time)
            .bind(update.phase)
            .bind(update.resolution)
            .bind(update.pool_progress_percentage)
            .bind(update.yes_percentage)
            .bind(update.no_percentage)
            .bind(update.available_actions)
            .fetch_optional(&self.pool)
            .await
    }
}

#[derive(Debug, Clone)]
pub struct ListUnresolvedMarkets;

impl Processor<ListUnresolvedMarkets> for DatabaseProcessor {
    type Output = Vec<String>;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:ListUnresolvedMarkets")]
    async fn process(&self, _query: ListUnresolvedMarkets) -> Result<Vec<String>, sqlx::Error> {
        sqlx::query_scalar::<_, String>(
            "SELECT address FROM markets WHERE resolution = 'unresolved' ORDER BY created_at",
        )
        .fetch_all(&self.pool)
        .await
    }
}

#[derive(Debug, Clone)]
pub struct MarkMarketSyncFailed {
    pub address: String,
}

impl Processor<MarkMarketSyncFailed> for DatabaseProcessor {
    type Output = u64;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:MarkMarketSyncFailed")]
    async fn process(&self, query: MarkMarketSyncFailed) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("UPDATE markets SET sync_status = 'failed' WHERE address = $1")
            .bind(query.address)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

/// Count a first-time participant towards the side they hold.
pub async fn increment_vote_count(
    db: &mut impl DatabaseAccessor,
    market_address: &str,
    side: PositionSideKind,
) -> Result<(), sqlx::Error> {
    let sql = match side {
        PositionSideKind::Yes => {
            "UPDATE markets SET yes_vote_count = yes_vote_count + 1 WHERE address = $1"
        }
        PositionSideKind::No => {
            "UPDATE markets SET no_vote_count = no_vote_count + 1 WHERE address = $1"
        }
    };
    sqlx::query(sql)
        .bind(market_address)
        .execute(db.acquire())
        .await?;
    Ok(())
}

/// Recompute per-side staked totals from participant rows.
pub async fn refresh_staked_totals(
    db: &mut impl DatabaseAccessor,
    market_address: &str,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        UPDATE markets m SET
            total_yes_staked = totals.yes_staked,
            total_no_staked = totals.no_staked
        FROM (
            SELECT
                COALESCE(SUM(total_invested) FILTER (WHERE side = 'yes'), 0) AS yes_staked,
                COALESCE(SUM(total_invested) FILTER (WHERE side = 'no'), 0) AS no_staked
            FROM market_participants
            WHERE market_address = $1
        ) totals
        WHERE m.address = $1
        "#,
    )
    .bind(market_address)
    .execute(db.acquire())
    .await?;
    Ok(())
}
