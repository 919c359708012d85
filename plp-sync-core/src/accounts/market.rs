use plp_sync_sdk::objects::{MarketPhase, Resolution};

use super::codec::{AccountReader, AccountWriter};
use super::{Address, DISCRIMINATOR_LEN, DecodeError};

/// Allocated size of a market account, including the discriminator.
pub const MARKET_ACCOUNT_SIZE: usize = 480;
pub const MAX_IPFS_CID_LEN: usize = 64;
pub const MAX_METADATA_URI_LEN: usize = 200;

/// Bytes of a market account excluding both string bodies.
const MARKET_FIXED_LEN: usize = DISCRIMINATOR_LEN
    + 32 // founder
    + 4 // ipfs_cid length
    + 8 * 7 // pool and share counters
    + 8 // expiry_time
    + 1 // phase
    + 1 // resolution
    + 4 // metadata_uri length
    + 1 // token_mint flag
    + 8 // platform_tokens_allocated
    + 1 // platform_tokens_claimed
    + 8 // yes_voter_tokens_allocated
    + 8 // founder_excess_sol_allocated
    + 1 // founder_vesting_initialized
    + 32 // treasury
    + 1; // bump

/// Decoded market account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedMarketRecord {
    pub discriminator: [u8; DISCRIMINATOR_LEN],
    pub founder: Address,
    pub ipfs_cid: String,
    pub target_pool: u64,
    pub pool_balance: u64,
    pub distribution_pool: u64,
    pub yes_pool: u64,
    pub no_pool: u64,
    pub total_yes_shares: u64,
    pub total_no_shares: u64,
    pub expiry_time: i64,
    pub phase: MarketPhase,
    pub resolution: Resolution,
    pub metadata_uri: String,
    pub token_mint: Option<Address>,
    pub platform_tokens_allocated: u64,
    pub platform_tokens_claimed: bool,
    pub yes_voter_tokens_allocated: u64,
    pub founder_excess_sol_allocated: u64,
    pub founder_vesting_initialized: bool,
    pub treasury: Address,
    pub bump: u8,
}

pub(crate) fn looks_like_market(data: &[u8]) -> bool {
    let cid_len_at = DISCRIMINATOR_LEN + 32;
    let Some(prefix) = data.get(cid_len_at..cid_len_at + 4) else {
        return false;
    };
    let mut len_bytes = [0u8; 4];
    len_bytes.copy_from_slice(prefix);
    let cid_len = u32::from_le_bytes(len_bytes) as usize;
    cid_len <= MAX_IPFS_CID_LEN && data.len() >= MARKET_FIXED_LEN + cid_len
}

pub fn phase_from_u8(value: u8) -> Result<MarketPhase, DecodeError> {
    match value {
        0 => Ok(MarketPhase::Prediction),
        1 => Ok(MarketPhase::Funding),
        value => Err(DecodeError::InvalidEnum {
            field: "phase",
            value,
        }),
    }
}

pub fn phase_to_u8(phase: MarketPhase) -> u8 {
    match phase {
        MarketPhase::Prediction => 0,
        MarketPhase::Funding => 1,
    }
}

pub fn resolution_from_u8(value: u8) -> Result<Resolution, DecodeError> {
    match value {
        0 => Ok(Resolution::Unresolved),
        1 => Ok(Resolution::YesWins),
        2 => Ok(Resolution::NoWins),
        3 => Ok(Resolution::Refund),
        value => Err(DecodeError::InvalidEnum {
            field: "resolution",
            value,
        }),
    }
}

pub fn resolution_to_u8(resolution: Resolution) -> u8 {
    match resolution {
        Resolution::Unresolved => 0,
        Resolution::YesWins => 1,
        Resolution::NoWins => 2,
        Resolution::Refund => 3,
    }
}

impl ParsedMarketRecord {
    pub fn decode(data: &[u8]) -> Result<Self, DecodeError> {
        let mut r = AccountReader::new(data);
        Ok(Self {
            discriminator: r.read_array()?,
            founder: r.read_address()?,
            ipfs_cid: r.read_string(MAX_IPFS_CID_LEN)?,
            target_pool: r.read_u64()?,
            pool_balance: r.read_u64()?,
            distribution_pool: r.read_u64()?,
            yes_pool: r.read_u64()?,
            no_pool: r.read_u64()?,
            total_yes_shares: r.read_u64()?,
            total_no_shares: r.read_u64()?,
            expiry_time: r.read_i64()?,
            phase: phase_from_u8(r.read_u8()?)?,
            resolution: resolution_from_u8(r.read_u8()?)?,
            metadata_uri: r.read_string(MAX_METADATA_URI_LEN)?,
            token_mint: r.read_option_address()?,
            platform_tokens_allocated: r.read_u64()?,
            platform_tokens_claimed: r.read_bool()?,
            yes_voter_tokens_allocated: r.read_u64()?,
            founder_excess_sol_allocated: r.read_u64()?,
            founder_vesting_initialized: r.read_bool()?,
            treasury: r.read_address()?,
            bump: r.read_u8()?,
        })
    }

    /// Serialize back into the on-ledger layout, zero-padded to
    /// [`MARKET_ACCOUNT_SIZE`].
    pub fn encode(&self) -> Vec<u8> {
        let mut w = AccountWriter::with_capacity(MARKET_ACCOUNT_SIZE);
        w.bytes(&self.discriminator)
            .address(&self.founder)
            .string(&self.ipfs_cid)
            .u64(self.target_pool)
            .u64(self.pool_balance)
            .u64(self.distribution_pool)
            .u64(self.yes_pool)
            .u64(self.no_pool)
            .u64(self.total_yes_shares)
            .u64(self.total_no_shares)
            .i64(self.expiry_time)
            .u8(phase_to_u8(self.phase))
            .u8(resolution_to_u8(self.resolution))
            .string(&self.metadata_uri)
            .option_address(self.token_mint.as_ref())
            .u64(self.platform_tokens_allocated)
            .bool(self.platform_tokens_claimed)
            .u64(self.yes_voter_tokens_allocated)
            .u64(self.founder_excess_sol_allocated)
            .bool(self.founder_vesting_initialized)
            .address(&self.treasury)
            .u8(self.bump);
        w.finish_padded(MARKET_ACCOUNT_SIZE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accounts::fixtures;

    #[test]
    fn decodes_encoded_market() {
        let mut market = fixtures::market();
        market.token_mint = Some(fixtures::address(7));
        market.resolution = Resolution::NoWins;
        let bytes = market.encode();
        assert_eq!(bytes.len(), MARKET_ACCOUNT_SIZE);
        assert_eq!(ParsedMarketRecord::decode(&bytes), Ok(market));
    }

    #[test]
    fn boundary_records_survive_encoding() {
        let base = fixtures::market();
        let cases: Vec<(&str, ParsedMarketRecord)> = vec![
            (
                "empty strings",
                ParsedMarketRecord {
                    ipfs_cid: String::new(),
                    metadata_uri: String::new(),
                    ..base.clone()
                },
            ),
            (
                "longest strings with mint",
                ParsedMarketRecord {
                    ipfs_cid: "c".repeat(MAX_IPFS_CID_LEN),
                    metadata_uri: "u".repeat(MAX_METADATA_URI_LEN),
                    token_mint: Some(fixtures::address(7)),
                    ..base.clone()
                },
            ),
            (
                "saturated counters",
                ParsedMarketRecord {
                    target_pool: u64::MAX,
                    pool_balance: u64::MAX,
                    distribution_pool: u64::MAX,
                    yes_pool: u64::MAX,
                    no_pool: u64::MAX,
                    total_yes_shares: u64::MAX,
                    total_no_shares: u64::MAX,
                    platform_tokens_allocated: u64::MAX,
                    yes_voter_tokens_allocated: u64::MAX,
                    founder_excess_sol_allocated: u64::MAX,
                    ..base.clone()
                },
            ),
            (
                "zero counters",
                ParsedMarketRecord {
                    target_pool: 0,
                    pool_balance: 0,
                    yes_pool: 0,
                    no_pool: 0,
                    total_yes_shares: 0,
                    total_no_shares: 0,
                    expiry_time: 0,
                    ..base.clone()
                },
            ),
            (
                "negative expiry",
                ParsedMarketRecord {
                    expiry_time: i64::MIN,
                    ..base.clone()
                },
            ),
            (
                "funding phase refund with flags set",
                ParsedMarketRecord {
                    phase: MarketPhase::Funding,
                    resolution: Resolution::Refund,
                    platform_tokens_claimed: true,
                    founder_vesting_initialized: true,
                    bump: u8::MAX,
                    ..base.clone()
                },
            ),
        ];

        for (name, market) in cases {
            let bytes = market.encode();
            assert_eq!(bytes.len(), MARKET_ACCOUNT_SIZE, "{name}");
            assert!(looks_like_market(&bytes), "{name}");
            assert_eq!(ParsedMarketRecord::decode(&bytes), Ok(market), "{name}");
        }
    }

    #[test]
    fn fixed_offsets_match_layout() {
        let market = fixtures::market();
        let bytes = market.encode();
        let cid_len = market.ipfs_cid.len();
        // target_pool sits right after the cid body
        let at = DISCRIMINATOR_LEN + 32 + 4 + cid_len;
        assert_eq!(
            u64::from_le_bytes(bytes[at..at + 8].try_into().unwrap()),
            market.target_pool
        );
        // expiry_time after seven u64 counters
        let at = at + 8 * 7;
        assert_eq!(
            i64::from_le_bytes(bytes[at..at + 8].try_into().unwrap()),
            market.expiry_time
        );
    }

    #[test]
    fn invalid_resolution_byte_is_typed_error() {
        let market = fixtures::market();
        let mut bytes = market.encode();
        let at = DISCRIMINATOR_LEN + 32 + 4 + market.ipfs_cid.len() + 8 * 8 + 1;
        bytes[at] = 9;
        assert_eq!(
            ParsedMarketRecord::decode(&bytes),
            Err(DecodeError::InvalidEnum {
                field: "resolution",
                value: 9
            })
        );
    }

    #[test]
    fn truncated_market_never_panics() {
        let bytes = fixtures::market().encode();
        for len in 0..MARKET_FIXED_LEN {
            assert!(ParsedMarketRecord::decode(&bytes[..len]).is_err());
        }
    }

    #[test]
    fn shape_check_rejects_long_cid() {
        let mut bytes = fixtures::market().encode();
        bytes[40..44].copy_from_slice(&65u32.to_le_bytes());
        assert!(!looks_like_market(&bytes));
    }
}
