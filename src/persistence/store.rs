//! Storage interface and persisted record shapes.
//!
//! The hot path only ever talks to `TokenStore`: upsert-by-mint for token
//! snapshots and insert-if-absent keyed on the transaction signature for
//! trades. The uniqueness constraint on signature is the one hard
//! requirement on any backing store.

use async_trait::async_trait;

use crate::decoder::{TradeEvent, TradeSide};
use crate::lifecycle::{Phase, TokenLifecycle};

#[derive(Debug)]
pub enum StoreError {
    Database(String),
    Io(std::io::Error),
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        StoreError::Database(err.to_string())
    }
}

impl From<std::io::Error> for StoreError {
    fn from(err: std::io::Error) -> Self {
        StoreError::Io(err)
    }
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreError::Database(e) => write!(f, "Database error: {}", e),
            StoreError::Io(e) => write!(f, "IO error: {}", e),
        }
    }
}

impl std::error::Error for StoreError {}

/// Latest derived state for one token, keyed by mint.
#[derive(Debug, Clone, PartialEq)]
pub struct TokenSnapshot {
    pub mint: String,
    pub phase: Phase,
    pub price_sol: f64,
    pub price_usd: f64,
    pub market_cap_usd: f64,
    pub curve_progress_pct: f64,
    pub first_seen_slot: u64,
    pub graduated_at_slot: Option<u64>,
    pub pool_address: Option<String>,
    pub creator: Option<String>,
    pub updated_at: i64,
}

impl From<&TokenLifecycle> for TokenSnapshot {
    fn from(token: &TokenLifecycle) -> Self {
        Self {
            mint: token.mint.clone(),
            phase: token.phase,
            price_sol: token.latest_price_sol,
            price_usd: token.latest_price_usd,
            market_cap_usd: token.latest_market_cap_usd,
            curve_progress_pct: token.latest_curve_progress_pct,
            first_seen_slot: token.first_seen_slot,
            graduated_at_slot: token.graduated_at_slot,
            pool_address: token.pool_address.clone(),
            creator: token.creator.clone(),
            updated_at: token.updated_at,
        }
    }
}

/// One trade row, unique on signature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TradeRecord {
    pub signature: String,
    pub mint: String,
    pub side: TradeSide,
    pub sol_amount: u64,
    pub token_amount: u64,
    pub user: Option<String>,
    pub slot: u64,
    pub observed_at: i64,
}

impl From<&TradeEvent> for TradeRecord {
    fn from(trade: &TradeEvent) -> Self {
        Self {
            signature: trade.signature.clone(),
            mint: trade.mint.clone(),
            side: trade.side,
            sol_amount: trade.sol_amount,
            token_amount: trade.token_amount,
            user: trade.user.clone(),
            slot: trade.slot,
            observed_at: trade.observed_at,
        }
    }
}

/// Command queued by the tracker toward the persistence batcher.
#[derive(Debug, Clone)]
pub enum PersistCommand {
    UpsertToken(TokenSnapshot),
    InsertTrade(TradeRecord),
}

/// A coalesced flush unit: at most one snapshot per mint, trades deduped by
/// signature.
#[derive(Debug, Default)]
pub struct PersistBatch {
    pub tokens: Vec<TokenSnapshot>,
    pub trades: Vec<TradeRecord>,
}

impl PersistBatch {
    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty() && self.trades.is_empty()
    }

    pub fn len(&self) -> usize {
        self.tokens.len() + self.trades.len()
    }
}

#[async_trait]
pub trait TokenStore: Send + Sync {
    /// Insert or update the token row for `snapshot.mint`.
    async fn upsert_token(&self, snapshot: &TokenSnapshot) -> Result<(), StoreError>;

    /// Insert the trade unless a row with the same signature exists.
    /// Re-applying the same signature must leave exactly one row.
    async fn insert_trade_if_absent(&self, record: &TradeRecord) -> Result<(), StoreError>;

    /// Write a whole batch; used by the batcher's flush path.
    async fn bulk_upsert(&self, batch: &PersistBatch) -> Result<(), StoreError>;
}
