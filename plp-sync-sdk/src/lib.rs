//! Wire types shared between the PLP sync service and its consumers.
//!
//! Enable the `client` feature for a WebSocket stream client and an admin
//! HTTP client.

pub mod objects;

#[cfg(feature = "client")]
pub mod client;
