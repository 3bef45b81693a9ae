//! Curve-address resolution.
//!
//! Account updates identify a bonding curve by its PDA, not by the mint, so
//! the tracker keeps a mint ⇄ curve-address cache derived lazily from
//! observed trades. Curve updates that arrive before any trade for their
//! mint sit in a bounded pending buffer and are dropped (and counted) when
//! they stay unresolved past the timeout.

use solana_pubkey::Pubkey;
use std::collections::HashMap;
use std::time::{Duration, Instant};

use crate::decoder::{CurveAccountState, CURVE_PROGRAM_ID};

/// PDA seed binding a mint to its bonding-curve account.
const CURVE_SEED: &[u8] = b"bonding-curve";

/// Derive the bonding-curve PDA for a mint. Fails only when the mint is not
/// a valid 32-byte base58 key.
pub fn derive_curve_address(mint: &str) -> Option<String> {
    let mint_bytes: [u8; 32] = bs58::decode(mint).into_vec().ok()?.try_into().ok()?;
    let program: [u8; 32] = bs58::decode(CURVE_PROGRAM_ID)
        .into_vec()
        .ok()?
        .try_into()
        .ok()?;

    let (pda, _bump) = Pubkey::find_program_address(
        &[CURVE_SEED, &mint_bytes],
        &Pubkey::new_from_array(program),
    );
    Some(pda.to_string())
}

struct PendingCurve {
    update: CurveAccountState,
    slot: u64,
    buffered_at: Instant,
}

pub struct CurveResolver {
    curve_to_mint: HashMap<String, String>,
    mint_to_curve: HashMap<String, String>,
    pending: HashMap<String, PendingCurve>,
    max_pending: usize,
    pending_ttl: Duration,
}

impl CurveResolver {
    pub fn new(max_pending: usize, pending_ttl: Duration) -> Self {
        Self {
            curve_to_mint: HashMap::new(),
            mint_to_curve: HashMap::new(),
            pending: HashMap::new(),
            max_pending: max_pending.max(1),
            pending_ttl,
        }
    }

    /// Record a mint seen in trade history, deriving its curve address on
    /// first sight. Returns false when the mint cannot be derived (not a
    /// valid key), which callers treat as a resolution failure.
    ///
    /// Any pending curve update this unlocks is returned for immediate
    /// application.
    pub fn note_mint(&mut self, mint: &str) -> Result<Vec<(String, CurveAccountState, u64)>, ()> {
        if self.mint_to_curve.contains_key(mint) {
            return Ok(Vec::new());
        }

        let Some(curve_address) = derive_curve_address(mint) else {
            return Err(());
        };

        self.mint_to_curve.insert(mint.to_string(), curve_address.clone());
        self.curve_to_mint.insert(curve_address.clone(), mint.to_string());

        let mut unlocked = Vec::new();
        if let Some(pending) = self.pending.remove(&curve_address) {
            unlocked.push((mint.to_string(), pending.update, pending.slot));
        }
        Ok(unlocked)
    }

    /// Mint owning the given curve account, if known.
    pub fn resolve(&self, curve_address: &str) -> Option<&str> {
        self.curve_to_mint.get(curve_address).map(String::as_str)
    }

    pub fn curve_address_for(&self, mint: &str) -> Option<&str> {
        self.mint_to_curve.get(mint).map(String::as_str)
    }

    /// Buffer a curve update whose address is not yet resolvable. Keeps the
    /// newest update per address; when the buffer is full the incoming
    /// update is rejected (returned as dropped).
    pub fn buffer_unresolved(&mut self, update: CurveAccountState, slot: u64) -> bool {
        let address = update.address.clone();
        if self.pending.len() >= self.max_pending && !self.pending.contains_key(&address) {
            return false;
        }

        self.pending.insert(
            address,
            PendingCurve {
                update,
                slot,
                buffered_at: Instant::now(),
            },
        );
        true
    }

    /// Drop pending entries older than the timeout. Returns how many were
    /// abandoned.
    pub fn expire_pending(&mut self) -> usize {
        let ttl = self.pending_ttl;
        let before = self.pending.len();
        self.pending.retain(|_, entry| entry.buffered_at.elapsed() < ttl);
        before - self.pending.len()
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }
}
