//! Events flowing through the pipeline.
//!
//! # Event Flow
//!
//! 1. `SubscriptionClient` classifies each confirmed notification and
//!    pushes an `account_update` event onto the `EventQueue`
//! 2. Operators and external collaborators enqueue `resync` and
//!    `market_resolved` events through the admin surface
//! 3. `EventProcessor` pops, decodes, reconciles into the read model and
//!    hands payloads to the `Broadcaster`
//!
//! Events are self-contained: an `account_update` carries the account
//! bytes observed at its slot, the other kinds carry only an address and
//! are resolved against the ledger when processed.

pub mod types;

pub use types::{EventKind, EventPayload, QueuedEvent};
