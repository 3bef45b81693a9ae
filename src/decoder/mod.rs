//! Binary decoding for the two tracked on-chain programs.
//!
//! Everything in this module is total and side-effect-free: account payloads
//! that do not match a known discriminator come back as `Unrecognized`, and
//! transactions with no recognizable trade instruction decode to an empty
//! vec. Nothing here touches the network; the monitor converts gRPC frames
//! into the raw types below before handing them over.

pub mod curve_account;
pub mod pool_account;
pub mod trade;

pub use curve_account::CurveAccountState;
pub use pool_account::PoolAccountState;
pub use trade::{TradeDecodeParams, TradeEvent, TradeSide};

/// Bonding-curve program: `6EF8rrecthR5Dkzon8Nwu78hRvfCKubJ14M5uBEwF6P`
pub const CURVE_PROGRAM_ID: &str = "6EF8rrecthR5Dkzon8Nwu78hRvfCKubJ14M5uBEwF6P";

/// AMM program tokens graduate into: `pAMMBay6oceH9fJKBRHGP5D4bD4sWpmSwMn52FMfXEA`
pub const AMM_PROGRAM_ID: &str = "pAMMBay6oceH9fJKBRHGP5D4bD4sWpmSwMn52FMfXEA";

/// SPL Token program, for classifying inner transfer instructions.
pub const TOKEN_PROGRAM_ID: &str = "TokenkegQfeZyiNwAJbNbGKPFXCWuBvf9Ss623VQ5DA";

/// Wrapped SOL mint prefix (both the mint and token accounts start with it).
pub const WSOL_MINT: &str = "So11111111111111111111111111111111111111112";

/// Account discriminators - first 8 bytes of sha256("account:<Name>")
pub mod discriminators {
    /// Bonding-curve state account
    pub const CURVE_ACCOUNT: [u8; 8] = [0x17, 0xb7, 0xf8, 0x37, 0x60, 0xd8, 0xac, 0x60];

    /// AMM pool state account
    pub const POOL_ACCOUNT: [u8; 8] = [0xf1, 0x9a, 0x6d, 0x04, 0x11, 0xb1, 0x6d, 0xbc];

    /// `buy` instruction: sha256("global:buy")[0..8]
    pub const BUY: [u8; 8] = [102, 6, 61, 18, 1, 218, 235, 234];

    /// `sell` instruction: sha256("global:sell")[0..8]
    pub const SELL: [u8; 8] = [51, 230, 133, 164, 1, 127, 131, 173];
}

/// Outcome of decoding a raw account payload.
///
/// `Unrecognized` is the normal case for the many accounts the programs own
/// that we do not track (global config, fee vaults, token accounts); it is
/// not an error.
#[derive(Debug, Clone)]
pub enum DecodedAccount {
    Curve(CurveAccountState),
    Pool(PoolAccountState),
    Unrecognized,
}

/// Account update as delivered by the feed, already stripped of transport
/// types.
#[derive(Debug, Clone)]
pub struct RawAccountUpdate {
    pub address: String,
    pub owner: String,
    pub slot: u64,
    pub data: Vec<u8>,
}

/// One compiled instruction: indexes into the transaction's account key list
/// plus opaque data bytes.
#[derive(Debug, Clone)]
pub struct RawInstruction {
    pub program_index: usize,
    pub account_indexes: Vec<usize>,
    pub data: Vec<u8>,
}

/// Inner (CPI) instructions grouped under the outer instruction that invoked
/// them.
#[derive(Debug, Clone)]
pub struct RawInnerInstructions {
    pub outer_index: usize,
    pub instructions: Vec<RawInstruction>,
}

/// Transaction update as delivered by the feed, already stripped of
/// transport types.
#[derive(Debug, Clone)]
pub struct RawTransaction {
    pub signature: String,
    pub slot: u64,
    pub block_time: Option<i64>,
    pub account_keys: Vec<String>,
    pub instructions: Vec<RawInstruction>,
    pub inner_instructions: Vec<RawInnerInstructions>,
    pub log_lines: Vec<String>,
}

/// Decode a raw account payload owned by one of the tracked programs.
///
/// Dispatches on the 8-byte discriminator prefix. Payloads that are too
/// short, carry an unknown discriminator, or belong to a program we do not
/// track all yield `Unrecognized`.
pub fn decode_account(owner: &str, address: &str, data: &[u8]) -> DecodedAccount {
    if data.len() < 8 {
        return DecodedAccount::Unrecognized;
    }

    match &data[0..8] {
        d if d == discriminators::CURVE_ACCOUNT && owner == CURVE_PROGRAM_ID => {
            match CurveAccountState::from_account_data(address, data) {
                Some(curve) => DecodedAccount::Curve(curve),
                None => DecodedAccount::Unrecognized,
            }
        }
        d if d == discriminators::POOL_ACCOUNT && owner == AMM_PROGRAM_ID => {
            match PoolAccountState::from_account_data(address, data) {
                Some(pool) => DecodedAccount::Pool(pool),
                None => DecodedAccount::Unrecognized,
            }
        }
        _ => DecodedAccount::Unrecognized,
    }
}

/// Read a little-endian u64 at `offset`, if the slice is long enough.
pub(crate) fn read_u64_le(data: &[u8], offset: usize) -> Option<u64> {
    data.get(offset..offset + 8)
        .and_then(|bytes| bytes.try_into().ok())
        .map(u64::from_le_bytes)
}

/// Read a 32-byte key at `offset` as a base58 string.
pub(crate) fn read_pubkey_b58(data: &[u8], offset: usize) -> Option<String> {
    data.get(offset..offset + 32)
        .map(|bytes| bs58::encode(bytes).into_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_payload_is_unrecognized() {
        let decoded = decode_account(CURVE_PROGRAM_ID, "curve_addr", &[0u8; 4]);
        assert!(matches!(decoded, DecodedAccount::Unrecognized));
    }

    #[test]
    fn test_unknown_discriminator_is_unrecognized() {
        let mut data = vec![0u8; 128];
        data[0..8].copy_from_slice(&[9, 9, 9, 9, 9, 9, 9, 9]);
        let decoded = decode_account(CURVE_PROGRAM_ID, "curve_addr", &data);
        assert!(matches!(decoded, DecodedAccount::Unrecognized));
    }

    #[test]
    fn test_wrong_owner_is_unrecognized() {
        // Valid curve bytes, but owned by the AMM program: not a curve account.
        let mut data = vec![0u8; 81];
        data[0..8].copy_from_slice(&discriminators::CURVE_ACCOUNT);
        let decoded = decode_account(AMM_PROGRAM_ID, "addr", &data);
        assert!(matches!(decoded, DecodedAccount::Unrecognized));
    }
}
