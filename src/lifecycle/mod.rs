//! Per-token lifecycle state.
//!
//! One `TokenLifecycle` aggregate exists per mint, created on the first
//! observed event and never deleted. The phase only moves forward; stale or
//! out-of-order frames can update metrics at most within their own slot
//! lane, never regress the phase.

pub mod resolution;
pub mod tracker;

pub use resolution::CurveResolver;
pub use tracker::{LifecycleTracker, TrackerConfig};

/// Lifecycle phase, ordered: a token only ever moves rightward.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, serde::Serialize, serde::Deserialize,
)]
pub enum Phase {
    Discovered,
    BondingCurve,
    Graduated,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Discovered => "discovered",
            Phase::BondingCurve => "bonding_curve",
            Phase::Graduated => "graduated",
        }
    }
}

/// The mutable aggregate owned by the tracker, one per mint.
#[derive(Debug, Clone)]
pub struct TokenLifecycle {
    pub mint: String,
    pub phase: Phase,
    pub first_seen_slot: u64,
    pub creator: Option<String>,
    pub total_supply: u64,
    pub latest_price_sol: f64,
    pub latest_price_usd: f64,
    pub latest_market_cap_usd: f64,
    /// Only meaningful while on the curve; pinned at 100 after graduation.
    pub latest_curve_progress_pct: f64,
    /// Bound 1:1 on graduation, first sighting wins.
    pub pool_address: Option<String>,
    /// Set exactly once.
    pub graduated_at_slot: Option<u64>,
    pub updated_at: i64,
    /// Token-side pool reserve from the latest pool read; drives the
    /// graduated market-cap policy.
    pub(crate) last_pool_base_reserve: Option<u64>,
    // Per-field slot watermarks. The account and transaction channels are
    // not ordered relative to each other, so each lane tracks its own.
    pub(crate) last_trade_slot: u64,
    pub(crate) last_curve_slot: u64,
    pub(crate) last_pool_slot: u64,
}

impl TokenLifecycle {
    pub fn new(mint: &str, first_seen_slot: u64, now: i64) -> Self {
        Self {
            mint: mint.to_string(),
            phase: Phase::Discovered,
            first_seen_slot,
            creator: None,
            total_supply: 0,
            latest_price_sol: 0.0,
            latest_price_usd: 0.0,
            latest_market_cap_usd: 0.0,
            latest_curve_progress_pct: 0.0,
            pool_address: None,
            graduated_at_slot: None,
            updated_at: now,
            last_pool_base_reserve: None,
            last_trade_slot: 0,
            last_curve_slot: 0,
            last_pool_slot: 0,
        }
    }

    /// Advance the phase if `next` is further along. Returns true on an
    /// actual transition.
    pub(crate) fn advance_phase(&mut self, next: Phase) -> bool {
        if next > self.phase {
            self.phase = next;
            true
        } else {
            false
        }
    }
}

/// Fan-out payload emitted on every lifecycle transition.
#[derive(Debug, Clone, serde::Serialize)]
pub struct LifecycleUpdate {
    pub mint: String,
    pub phase: Phase,
    pub price_usd: f64,
    pub market_cap_usd: f64,
    pub curve_progress_pct: f64,
    pub timestamp: i64,
}
