//! HTTP surface: status, consumer stream and admin endpoints.

pub mod admin;
pub mod extractors;
pub mod status;
pub mod stream;
