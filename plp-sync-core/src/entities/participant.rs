use kanau::processor::Processor;
use rust_decimal::Decimal;

use super::market::{increment_vote_count, refresh_staked_totals, slot_to_i64};
use super::{PositionSideKind, to_numeric};
use crate::accounts::{Address, ParsedPositionRecord};
use crate::framework::{DatabaseAccessor, DatabaseProcessor};

/// A row of `market_participants`, one per (market, owner).
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct MarketParticipant {
    pub market_address: String,
    pub owner: String,
    pub position_address: String,
    pub yes_shares: Decimal,
    pub no_shares: Decimal,
    pub total_invested: Decimal,
    pub side: Option<PositionSideKind>,
    pub claimed: bool,
    pub last_slot: i64,
    pub created_at: time::PrimitiveDateTime,
    pub updated_at: time::PrimitiveDateTime,
}

/// Data for upserting a participant from a decoded position account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParticipantUpsert {
    pub market_address: String,
    pub owner: String,
    pub position_address: String,
    pub yes_shares: Decimal,
    pub no_shares: Decimal,
    pub total_invested: Decimal,
    pub side: Option<PositionSideKind>,
    pub claimed: bool,
    pub slot: i64,
}

impl ParticipantUpsert {
    pub fn from_ledger(position_address: &Address, slot: u64, position: &ParsedPositionRecord) -> Self {
        Self {
            market_address: position.market.to_string(),
            owner: position.user.to_string(),
            position_address: position_address.to_string(),
            yes_shares: to_numeric(position.yes_shares),
            no_shares: to_numeric(position.no_shares),
            total_invested: to_numeric(position.total_invested),
            side: position.side().map(PositionSideKind::from),
            claimed: position.claimed,
            slot: slot_to_i64(slot),
        }
    }
}

/// Result of a participant reconciliation that was applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParticipantSynced {
    /// First row ever written for this (market, owner).
    pub inserted: bool,
}

/// Insert or overwrite a participant row unless it already holds a newer
/// slot. Returns `Some(inserted)` when the row was written.
pub async fn upsert_participant(
    db: &mut impl DatabaseAccessor,
    upsert: &ParticipantUpsert,
) -> Result<Option<bool>, sqlx::Error> {
    sqlx::query_scalar::<_, bool>(
        r#"
        INSERT INTO market_participants
            (market_address, owner, position_address, yes_shares, no_shares,
             total_invested, side, claimed, last_slot)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        ON CONFLICT (market_address, owner) DO UPDATE SET
            position_address = EXCLUDED.position_address,
            yes_shares = EXCLUDED.yes_shares,
            no_shares = EXCLUDED.no_shares,
            total_invested = EXCLUDED.total_invested,
            side = EXCLUDED.side,
            claimed = EXCLUDED.claimed,
            last_slot = EXCLUDED.last_slot,
            updated_at = (now() AT TIME ZONE 'utc')
        WHERE market_participants.last_slot <= EXCLUDED.last_slot
        RETURNING (xmax = 0) AS inserted
        "#,
    )
    .bind(&upsert.market_address)
    .bind(&upsert.owner)
    .bind(&upsert.position_address)
    .bind(upsert.yes_shares)
    .bind(upsert.no_shares)
    .bind(upsert.total_invested)
    .bind(upsert.side)
    .bind(upsert.claimed)
    .bind(upsert.slot)
    .fetch_optional(db.acquire())
    .await
}

/// Upsert a participant, count a first-time voter and refresh the market's
/// staked totals in one transaction.
///
/// Returns `None` when the stored row is newer than the update.
#[derive(Debug, Clone)]
pub struct SyncParticipant {
    pub upsert: ParticipantUpsert,
}

impl Processor<SyncParticipant> for DatabaseProcessor {
    type Output = Option<ParticipantSynced>;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:SyncParticipant")]
    async fn process(&self, query: SyncParticipant) -> Result<Option<ParticipantSynced>, sqlx::Error> {
        let upsert = query.upsert;
        let mut tx = self.begin().await?;

        let Some(inserted) = upsert_participant(&mut tx, &upsert).await? else {
            return Ok(None);
        };
        if inserted {
            if let Some(side) = upsert.side {
                increment_vote_count(&mut tx, &upsert.market_address, side).await?;
            }
        }
        refresh_staked_totals(&mut tx, &upsert.market_address).await?;

        tx.commit().await?;
        Ok(Some(ParticipantSynced { inserted }))
    }
}
