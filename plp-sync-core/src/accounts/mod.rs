//! Decoding of ledger account state.
//!
//! Account buffers are classified with a cheap shape heuristic
//! ([`classify`]) before they are queued; full decoding happens in the
//! processor. Decoding never panics: malformed input yields a
//! [`DecodeError`].

pub mod address;
mod codec;
pub mod derived;
pub mod market;
pub mod position;

pub use address::{Address, AddressParseError};
pub use derived::{DerivedFields, calculate_derived_fields};
pub use market::ParsedMarketRecord;
pub use position::ParsedPositionRecord;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Length of the type discriminator that prefixes every program account.
pub const DISCRIMINATOR_LEN: usize = 8;

/// Errors produced while decoding account bytes.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("account data ends at {len} bytes, needed {needed} more at offset {offset}")]
    UnexpectedEnd {
        offset: usize,
        needed: usize,
        len: usize,
    },

    #[error("string length {len} at offset {offset} exceeds maximum {max}")]
    StringTooLong { offset: usize, len: usize, max: usize },

    #[error("string at offset {offset} is not valid utf-8")]
    InvalidUtf8 { offset: usize },

    #[error("invalid {field} value {value}")]
    InvalidEnum { field: &'static str, value: u8 },

    #[error("invalid bool byte {value} at offset {offset}")]
    InvalidBool { offset: usize, value: u8 },

    #[error("invalid option flag {value} at offset {offset}")]
    InvalidOption { offset: usize, value: u8 },

    #[error("account size {len} does not match the {expected}-byte position layout")]
    PositionSize { len: usize, expected: usize },

    #[error("account data ({len} bytes) matches no known layout")]
    Unrecognized { len: usize },
}

/// Account classes the pipeline knows how to reconcile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountClass {
    Market,
    Position,
    Unknown,
}

impl AccountClass {
    pub fn as_str(self) -> &'static str {
        match self {
            AccountClass::Market => "market",
            AccountClass::Position => "position",
            AccountClass::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for AccountClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classify an account buffer by shape without decoding it.
///
/// Market shape is tried first: a discriminator, a 32-byte address, then a
/// length-prefixed string whose length must be small and fit the buffer.
/// Otherwise a buffer of exactly the position size is a position.
pub fn classify(data: &[u8]) -> AccountClass {
    if market::looks_like_market(data) {
        AccountClass::Market
    } else if data.len() == position::POSITION_ACCOUNT_SIZE {
        AccountClass::Position
    } else {
        AccountClass::Unknown
    }
}

/// A fully decoded account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodedAccount {
    Market(ParsedMarketRecord),
    Position(ParsedPositionRecord),
}

/// Decode `data` according to `class`.
///
/// Returns `Ok(None)` for [`AccountClass::Unknown`]; callers skip such
/// accounts rather than failing.
pub fn decode_account(
    class: AccountClass,
    data: &[u8],
) -> Result<Option<DecodedAccount>, DecodeError> {
    match class {
        AccountClass::Market => ParsedMarketRecord::decode(data)
            .map(DecodedAccount::Market)
            .map(Some),
        AccountClass::Position => ParsedPositionRecord::decode(data)
            .map(DecodedAccount::Position)
            .map(Some),
        AccountClass::Unknown => Ok(None),
    }
}
