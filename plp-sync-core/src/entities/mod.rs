pub mod market;
pub mod participant;
pub mod snapshot;

pub use market::{MarketRecord, MarketSyncUpdate};
pub use participant::{MarketParticipant, ParticipantSynced, ParticipantUpsert};
pub use snapshot::MarketSnapshotInsert;

use plp_sync_sdk::objects::{
    Amount, MarketPhase as SdkMarketPhase, PositionSide as SdkPositionSide,
    Resolution as SdkResolution,
};
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;

/// Market resolution for database operations.
///
/// This is the sqlx::Type version. For API/DTO use, see `plp_sync_sdk::objects::Resolution`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, sqlx::Type)]
#[sqlx(rename_all = "snake_case", type_name = "market_resolution")]
pub enum MarketResolution {
    Unresolved,
    YesWins,
    NoWins,
    Refund,
}

impl MarketResolution {
    pub fn is_resolved(self) -> bool {
        SdkResolution::from(self).is_resolved()
    }
}

impl From<MarketResolution> for SdkResolution {
    fn from(value: MarketResolution) -> Self {
        match value {
            MarketResolution::Unresolved => SdkResolution::Unresolved,
            MarketResolution::YesWins => SdkResolution::YesWins,
            MarketResolution::NoWins => SdkResolution::NoWins,
            MarketResolution::Refund => SdkResolution::Refund,
        }
    }
}

impl From<SdkResolution> for MarketResolution {
    fn from(value: SdkResolution) -> Self {
        match value {
            SdkResolution::Unresolved => MarketResolution::Unresolved,
            SdkResolution::YesWins => MarketResolution::YesWins,
            SdkResolution::NoWins => MarketResolution::NoWins,
            SdkResolution::Refund => MarketResolution::Refund,
        }
    }
}

/// Market phase for database operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, sqlx::Type)]
#[sqlx(rename_all = "snake_case", type_name = "market_phase")]
pub enum MarketPhaseKind {
    Prediction,
    Funding,
}

impl From<MarketPhaseKind> for SdkMarketPhase {
    fn from(value: MarketPhaseKind) -> Self {
        match value {
            MarketPhaseKind::Prediction => SdkMarketPhase::Prediction,
            MarketPhaseKind::Funding => SdkMarketPhase::Funding,
        }
    }
}

impl From<SdkMarketPhase> for MarketPhaseKind {
    fn from(value: SdkMarketPhase) -> Self {
        match value {
            SdkMarketPhase::Prediction => MarketPhaseKind::Prediction,
            SdkMarketPhase::Funding => MarketPhaseKind::Funding,
        }
    }
}

/// Sync status stamped on a market row.
///
/// Rows start as `Pending` when registered, become `Synced` on every
/// successful reconciliation and `Failed` when an event for the market is
/// dead-lettered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, sqlx::Type)]
#[sqlx(rename_all = "snake_case", type_name = "sync_state")]
pub enum SyncState {
    Pending,
    Synced,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, sqlx::Type)]
#[sqlx(rename_all = "snake_case", type_name = "position_side")]
pub enum PositionSideKind {
    Yes,
    No,
}

impl From<PositionSideKind> for SdkPositionSide {
    fn from(value: PositionSideKind) -> Self {
        match value {
            PositionSideKind::Yes => SdkPositionSide::Yes,
            PositionSideKind::No => SdkPositionSide::No,
        }
    }
}

impl From<SdkPositionSide> for PositionSideKind {
    fn from(value: SdkPositionSide) -> Self {
        match value {
            SdkPositionSide::Yes => PositionSideKind::Yes,
            SdkPositionSide::No => PositionSideKind::No,
        }
    }
}

/// Current UTC time in the form stored in `TIMESTAMP` columns.
pub fn utc_now() -> time::PrimitiveDateTime {
    let now = time::OffsetDateTime::now_utc();
    time::PrimitiveDateTime::new(now.date(), now.time())
}

/// Lamport or share quantity as stored in a `NUMERIC` column.
pub fn to_numeric(value: u64) -> Decimal {
    Decimal::from(value)
}

/// Inverse of [`to_numeric`]; values outside `u64` saturate.
pub fn to_amount(value: Decimal) -> Amount {
    if value.is_sign_negative() {
        return Amount::ZERO;
    }
    Amount(value.trunc().to_u64().unwrap_or(u64::MAX))
}
