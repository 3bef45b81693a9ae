//! Bonding-curve account state decoding.
//!
//! Layout after the 8-byte discriminator (all integers little-endian):
//!
//! | offset | field                  |
//! |--------|------------------------|
//! | 0x08   | virtual_token_reserves |
//! | 0x10   | virtual_sol_reserves   |
//! | 0x18   | real_token_reserves    |
//! | 0x20   | real_sol_reserves      |
//! | 0x28   | token_total_supply     |
//! | 0x30   | complete (1 byte)      |
//! | 0x31   | creator (32 bytes)     |

use super::{read_pubkey_b58, read_u64_le};

const OFFSET_VIRTUAL_TOKEN_RESERVES: usize = 0x08;
const OFFSET_VIRTUAL_SOL_RESERVES: usize = 0x10;
const OFFSET_REAL_TOKEN_RESERVES: usize = 0x18;
const OFFSET_REAL_SOL_RESERVES: usize = 0x20;
const OFFSET_TOKEN_TOTAL_SUPPLY: usize = 0x28;
const OFFSET_COMPLETE: usize = 0x30;
const OFFSET_CREATOR: usize = 0x31;

/// Minimum payload: discriminator + five u64 fields + completion flag.
/// Older curve accounts predate the creator field, so it stays optional.
const MIN_LEN: usize = OFFSET_COMPLETE + 1;

/// Decoded snapshot of a bonding-curve account. Immutable; a later write to
/// the same address supersedes it wholesale.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct CurveAccountState {
    pub address: String,
    pub virtual_token_reserves: u64,
    pub virtual_sol_reserves: u64,
    pub real_token_reserves: u64,
    pub real_sol_reserves: u64,
    pub token_total_supply: u64,
    pub complete: bool,
    pub creator: Option<String>,
}

impl CurveAccountState {
    /// Decode from raw account bytes. The caller has already verified the
    /// discriminator; this only checks lengths.
    pub fn from_account_data(address: &str, data: &[u8]) -> Option<Self> {
        if data.len() < MIN_LEN {
            return None;
        }

        Some(Self {
            address: address.to_string(),
            virtual_token_reserves: read_u64_le(data, OFFSET_VIRTUAL_TOKEN_RESERVES)?,
            virtual_sol_reserves: read_u64_le(data, OFFSET_VIRTUAL_SOL_RESERVES)?,
            real_token_reserves: read_u64_le(data, OFFSET_REAL_TOKEN_RESERVES)?,
            real_sol_reserves: read_u64_le(data, OFFSET_REAL_SOL_RESERVES)?,
            token_total_supply: read_u64_le(data, OFFSET_TOKEN_TOTAL_SUPPLY)?,
            complete: data[OFFSET_COMPLETE] != 0,
            creator: read_pubkey_b58(data, OFFSET_CREATOR),
        })
    }
}
