//! Admin API request and response types.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A dead-lettered event as shown to operators.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeadLetterEntry {
    pub event_id: Uuid,
    pub kind: String,
    pub account_class: String,
    pub address: String,
    pub slot: u64,
    pub received_at: i64,
    pub retry_count: u32,
    pub last_error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeadLetterList {
    pub entries: Vec<DeadLetterEntry>,
    pub total: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplayResponse {
    pub replayed: u64,
}

/// Result of an operator enqueue request (resync, resolved notice).
///
/// `event_id` is `None` when the request collapsed into an event that was
/// already queued.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnqueueResponse {
    pub event_id: Option<Uuid>,
    pub duplicate: bool,
}

/// Header carrying the plaintext admin secret on admin API requests.
pub const ADMIN_AUTH_HEADER: &str = "Plp-Admin-Authorization";
