#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![forbid(unsafe_code)]
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used, clippy::panic))]

pub mod accounts;
pub mod broadcast;
pub mod config;
pub mod entities;
pub mod events;
pub mod feed;
pub mod framework;
pub mod processor;
pub mod queue;
pub mod store;
