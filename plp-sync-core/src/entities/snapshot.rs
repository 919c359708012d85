use kanau::processor::Processor;
use rust_decimal::Decimal;

use super::market::slot_to_i64;
use super::{MarketResolution, to_numeric};
use crate::accounts::derived::yes_price;
use crate::accounts::{Address, DerivedFields, ParsedMarketRecord};
use crate::framework::DatabaseProcessor;

/// One immutable charting point, appended per processed market update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarketSnapshotInsert {
    pub market_address: String,
    pub slot: i64,
    /// `None` while both AMM pools are empty.
    pub yes_price: Option<Decimal>,
    pub yes_percentage: i16,
    pub pool_balance: Decimal,
    pub yes_pool: Decimal,
    pub no_pool: Decimal,
    pub volume: Decimal,
    pub resolution: MarketResolution,
}

impl MarketSnapshotInsert {
    pub fn from_ledger(
        address: &Address,
        slot: u64,
        market: &ParsedMarketRecord,
        derived: &DerivedFields,
    ) -> Self {
        Self {
            market_address: address.to_string(),
            slot: slot_to_i64(slot),
            yes_price: yes_price(market.yes_pool, market.no_pool),
            yes_percentage: i16::from(derived.yes_percentage),
            pool_balance: to_numeric(market.pool_balance),
            yes_pool: to_numeric(market.yes_pool),
            no_pool: to_numeric(market.no_pool),
            volume: to_numeric(market.yes_pool) + to_numeric(market.no_pool),
            resolution: market.resolution.into(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct InsertMarketSnapshot {
    pub snapshot: MarketSnapshotInsert,
}

impl Processor<InsertMarketSnapshot> for DatabaseProcessor {
    type Output = ();
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:InsertMarketSnapshot")]
    async fn process(&self, insert: InsertMarketSnapshot) -> Result<(), sqlx::Error> {
        let snapshot = insert.snapshot;
        sqlx::query(
            r#"
            INSERT INTO market_snapshots
                (market_address, slot, yes_price, yes_percentage, pool_balance,
                 yes_pool, no_pool, volume, resolution)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(snapshot.market_address)
        .bind(snapshot.slot)
        .bind(snapshot.yes_price)
        .bind(snapshot.yes_percentage)
        .bind(snapshot.pool_balance)
        .bind(snapshot.yes_pool)
        .bind(snapshot.no_pool)
        .bind(snapshot.volume)
        .bind(snapshot.resolution)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accounts::{calculate_derived_fields, fixtures};
    use std::str::FromStr;

    #[test]
    fn snapshot_records_price_and_volume() {
        let market = fixtures::market();
        let derived = calculate_derived_fields(&market, 0);
        let snapshot = MarketSnapshotInsert::from_ledger(&fixtures::address(2), 5, &market, &derived);

        assert_eq!(snapshot.yes_price, Some(Decimal::from_str("0.55").unwrap()));
        assert_eq!(snapshot.volume, Decimal::from(2_000_000_000_000u64));
        assert_eq!(snapshot.yes_percentage, 70);
    }

    #[test]
    fn empty_pools_have_no_price() {
        let mut market = fixtures::market();
        market.yes_pool = 0;
        market.no_pool = 0;
        let derived = calculate_derived_fields(&market, 0);
        let snapshot = MarketSnapshotInsert::from_ledger(&fixtures::address(2), 5, &market, &derived);
        assert_eq!(snapshot.yes_price, None);
    }
}
