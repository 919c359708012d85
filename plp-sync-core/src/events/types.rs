//! Queue event definitions.

use plp_sync_sdk::objects::DeadLetterEntry;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::accounts::{AccountClass, Address, classify};

/// Discriminant of [`EventPayload`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    AccountUpdate,
    Resync,
    MarketResolved,
}

impl EventKind {
    pub fn as_str(self) -> &'static str {
        match self {
            EventKind::AccountUpdate => "account_update",
            EventKind::Resync => "resync",
            EventKind::MarketResolved => "market_resolved",
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the event asks the processor to do.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EventPayload {
    /// Account bytes pushed by the ledger feed.
    AccountUpdate {
        #[serde(with = "base64_bytes")]
        data: Vec<u8>,
    },
    /// Operator-requested reconciliation from freshly fetched state.
    Resync,
    /// A resolve transaction landed; the fetched state must show it.
    MarketResolved,
}

impl EventPayload {
    pub fn kind(&self) -> EventKind {
        match self {
            EventPayload::AccountUpdate { .. } => EventKind::AccountUpdate,
            EventPayload::Resync => EventKind::Resync,
            EventPayload::MarketResolved => EventKind::MarketResolved,
        }
    }
}

/// A unit of work in the event queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueuedEvent {
    pub id: Uuid,
    pub address: Address,
    pub account_class: AccountClass,
    /// Ledger slot the payload was observed at; 0 for events that fetch
    /// state when processed.
    pub slot: u64,
    /// Unix timestamp (seconds).
    pub received_at: i64,
    #[serde(default)]
    pub retry_count: u32,
    #[serde(default)]
    pub last_error: Option<String>,
    pub payload: EventPayload,
}

impl QueuedEvent {
    fn new(address: Address, account_class: AccountClass, slot: u64, payload: EventPayload) -> Self {
        Self {
            id: Uuid::now_v7(),
            address,
            account_class,
            slot,
            received_at: time::OffsetDateTime::now_utc().unix_timestamp(),
            retry_count: 0,
            last_error: None,
            payload,
        }
    }

    /// Event for account bytes seen on the feed, classified by shape.
    pub fn account_update(address: Address, slot: u64, data: Vec<u8>) -> Self {
        let class = classify(&data);
        Self::new(address, class, slot, EventPayload::AccountUpdate { data })
    }

    pub fn resync(address: Address, account_class: AccountClass) -> Self {
        Self::new(address, account_class, 0, EventPayload::Resync)
    }

    pub fn market_resolved(address: Address) -> Self {
        Self::new(address, AccountClass::Market, 0, EventPayload::MarketResolved)
    }

    pub fn kind(&self) -> EventKind {
        self.payload.kind()
    }

    /// Key of the short-lived duplicate marker.
    ///
    /// Feed updates dedup on (address, slot). Resolution notices dedup on
    /// the address alone. Operator resyncs are never deduplicated.
    pub fn dedup_key(&self) -> Option<String> {
        match self.payload {
            EventPayload::AccountUpdate { .. } => Some(format!("{}:{}", self.address, self.slot)),
            EventPayload::MarketResolved => Some(format!("{}:resolved", self.address)),
            EventPayload::Resync => None,
        }
    }

    pub fn to_dead_letter_entry(&self) -> DeadLetterEntry {
        DeadLetterEntry {
            event_id: self.id,
            kind: self.kind().as_str().to_owned(),
            account_class: self.account_class.as_str().to_owned(),
            address: self.address.to_string(),
            slot: self.slot,
            received_at: self.received_at,
            retry_count: self.retry_count,
            last_error: self.last_error.clone(),
        }
    }
}

mod base64_bytes {
    use base64::Engine;
    use base64::engine::general_purpose::STANDARD;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        STANDARD.decode(s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accounts::fixtures;

    #[test]
    fn account_update_is_classified_on_creation() {
        let event = QueuedEvent::account_update(
            fixtures::address(2),
            99,
            fixtures::market().encode(),
        );
        assert_eq!(event.account_class, AccountClass::Market);
        assert_eq!(event.kind(), EventKind::AccountUpdate);
        assert_eq!(event.retry_count, 0);
    }

    #[test]
    fn serialized_form_is_tagged_and_base64() {
        let event = QueuedEvent::account_update(fixtures::address(0), 5, vec![1, 2, 3]);
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["payload"]["kind"], "account_update");
        assert_eq!(value["payload"]["data"], "AQID");
        assert_eq!(value["address"], "11111111111111111111111111111111");
        assert_eq!(value["account_class"], "unknown");

        let back: QueuedEvent = serde_json::from_value(value).unwrap();
        assert_eq!(back, event);
    }

    #[test]
    fn dedup_keys_by_kind() {
        let address = fixtures::address(0);
        let update = QueuedEvent::account_update(address, 7, vec![]);
        assert_eq!(
            update.dedup_key().as_deref(),
            Some("11111111111111111111111111111111:7")
        );
        assert!(
            QueuedEvent::resync(address, AccountClass::Market)
                .dedup_key()
                .is_none()
        );
        assert!(QueuedEvent::market_resolved(address).dedup_key().is_some());
    }
}
