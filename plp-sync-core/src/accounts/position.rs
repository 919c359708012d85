use plp_sync_sdk::objects::PositionSide;

use super::codec::{AccountReader, AccountWriter};
use super::{Address, DISCRIMINATOR_LEN, DecodeError};

/// Exact allocated size of a position account.
pub const POSITION_ACCOUNT_SIZE: usize = 136;

/// Decoded participant position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedPositionRecord {
    pub discriminator: [u8; DISCRIMINATOR_LEN],
    pub user: Address,
    pub market: Address,
    pub yes_shares: u64,
    pub no_shares: u64,
    pub total_invested: u64,
    pub claimed: bool,
    pub bump: u8,
}

impl ParsedPositionRecord {
    pub fn decode(data: &[u8]) -> Result<Self, DecodeError> {
        if data.len() != POSITION_ACCOUNT_SIZE {
            return Err(DecodeError::PositionSize {
                len: data.len(),
                expected: POSITION_ACCOUNT_SIZE,
            });
        }
        let mut r = AccountReader::new(data);
        Ok(Self {
            discriminator: r.read_array()?,
            user: r.read_address()?,
            market: r.read_address()?,
            yes_shares: r.read_u64()?,
            no_shares: r.read_u64()?,
            total_invested: r.read_u64()?,
            claimed: r.read_bool()?,
            bump: r.read_u8()?,
        })
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut w = AccountWriter::with_capacity(POSITION_ACCOUNT_SIZE);
        w.bytes(&self.discriminator)
            .address(&self.user)
            .address(&self.market)
            .u64(self.yes_shares)
            .u64(self.no_shares)
            .u64(self.total_invested)
            .bool(self.claimed)
            .u8(self.bump);
        w.finish_padded(POSITION_ACCOUNT_SIZE)
    }

    /// Side the participant holds more shares on; `None` for an empty
    /// position. Ties count as yes.
    pub fn side(&self) -> Option<PositionSide> {
        match (self.yes_shares, self.no_shares) {
            (0, 0) => None,
            (yes, no) if yes >= no => Some(PositionSide::Yes),
            _ => Some(PositionSide::No),
        }
    }

    pub fn total_shares(&self) -> u128 {
        u128::from(self.yes_shares) + u128::from(self.no_shares)
    }
}
