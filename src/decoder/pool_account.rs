//! AMM pool account state decoding.
//!
//! Layout after the 8-byte discriminator: base mint, quote mint (32 bytes
//! each), then base reserve, quote reserve, and LP supply as little-endian
//! u64s. Base is the launched token, quote is wrapped SOL.

use super::{read_pubkey_b58, read_u64_le};

const OFFSET_BASE_MINT: usize = 0x08;
const OFFSET_QUOTE_MINT: usize = 0x28;
const OFFSET_BASE_RESERVE: usize = 0x48;
const OFFSET_QUOTE_RESERVE: usize = 0x50;
const OFFSET_LP_SUPPLY: usize = 0x58;

const MIN_LEN: usize = OFFSET_LP_SUPPLY + 8;

/// Decoded snapshot of an AMM pool account.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct PoolAccountState {
    pub pool_address: String,
    pub base_mint: String,
    pub quote_mint: String,
    pub base_reserve: u64,
    pub quote_reserve: u64,
    pub lp_supply: u64,
}

impl PoolAccountState {
    pub fn from_account_data(address: &str, data: &[u8]) -> Option<Self> {
        if data.len() < MIN_LEN {
            return None;
        }

        Some(Self {
            pool_address: address.to_string(),
            base_mint: read_pubkey_b58(data, OFFSET_BASE_MINT)?,
            quote_mint: read_pubkey_b58(data, OFFSET_QUOTE_MINT)?,
            base_reserve: read_u64_le(data, OFFSET_BASE_RESERVE)?,
            quote_reserve: read_u64_le(data, OFFSET_QUOTE_RESERVE)?,
            lp_supply: read_u64_le(data, OFFSET_LP_SUPPLY)?,
        })
    }
}
