//! SQLite-backed token store.
//!
//! Single connection behind a mutex, WAL journal, batched writes inside one
//! transaction per flush. Trade idempotence rides on the UNIQUE signature
//! column plus `INSERT OR IGNORE`.

use async_trait::async_trait;
use rusqlite::{params, Connection};
use std::path::Path;
use std::sync::Mutex;

use super::store::{PersistBatch, StoreError, TokenSnapshot, TokenStore, TradeRecord};
use crate::lifecycle::Phase;

pub struct SqliteTokenStore {
    conn: Mutex<Connection>,
}

impl SqliteTokenStore {
    pub fn new(db_path: impl AsRef<Path>) -> Result<Self, StoreError> {
        if let Some(parent) = db_path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(db_path)?;
        apply_pragmas(&conn)?;
        create_schema(&conn)?;

        log::info!("✅ SQLite token store initialized with WAL mode");
        Ok(Self { conn: Mutex::new(conn) })
    }

    /// Read back a token row; used by repair tooling and tests.
    pub fn fetch_token(&self, mint: &str) -> Result<Option<TokenSnapshot>, StoreError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT mint, phase, price_sol, price_usd, market_cap_usd, curve_progress_pct,
                    first_seen_slot, graduated_at_slot, pool_address, creator, updated_at
             FROM tokens WHERE mint = ?1",
        )?;

        let mut rows = stmt.query(params![mint])?;
        let Some(row) = rows.next()? else {
            return Ok(None);
        };

        let phase_text: String = row.get(1)?;
        Ok(Some(TokenSnapshot {
            mint: row.get(0)?,
            phase: parse_phase(&phase_text),
            price_sol: row.get(2)?,
            price_usd: row.get(3)?,
            market_cap_usd: row.get(4)?,
            curve_progress_pct: row.get(5)?,
            first_seen_slot: row.get::<_, i64>(6)? as u64,
            graduated_at_slot: row.get::<_, Option<i64>>(7)?.map(|s| s as u64),
            pool_address: row.get(8)?,
            creator: row.get(9)?,
            updated_at: row.get(10)?,
        }))
    }

    pub fn count_trades(&self) -> Result<u64, StoreError> {
        let conn = self.conn.lock().unwrap();
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM trades", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    pub fn count_trades_for_mint(&self, mint: &str) -> Result<u64, StoreError> {
        let conn = self.conn.lock().unwrap();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM trades WHERE mint = ?1",
            params![mint],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    fn upsert_token_tx(conn: &Connection, snapshot: &TokenSnapshot) -> Result<(), StoreError> {
        conn.execute(
            "INSERT INTO tokens (
                mint, phase, price_sol, price_usd, market_cap_usd, curve_progress_pct,
                first_seen_slot, graduated_at_slot, pool_address, creator, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
            ON CONFLICT(mint) DO UPDATE SET
                phase = excluded.phase,
                price_sol = excluded.price_sol,
                price_usd = excluded.price_usd,
                market_cap_usd = excluded.market_cap_usd,
                curve_progress_pct = excluded.curve_progress_pct,
                graduated_at_slot = COALESCE(tokens.graduated_at_slot, excluded.graduated_at_slot),
                pool_address = COALESCE(tokens.pool_address, excluded.pool_address),
                creator = COALESCE(tokens.creator, excluded.creator),
                updated_at = excluded.updated_at",
            params![
                snapshot.mint,
                snapshot.phase.as_str(),
                snapshot.price_sol,
                snapshot.price_usd,
                snapshot.market_cap_usd,
                snapshot.curve_progress_pct,
                snapshot.first_seen_slot as i64,
                snapshot.graduated_at_slot.map(|s| s as i64),
                snapshot.pool_address,
                snapshot.creator,
                snapshot.updated_at,
            ],
        )?;
        Ok(())
    }

    fn insert_trade_tx(conn: &Connection, record: &TradeRecord) -> Result<(), StoreError> {
        conn.execute(
            "INSERT OR IGNORE INTO trades
                (signature, mint, side, sol_amount, token_amount, user_account, slot, observed_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                record.signature,
                record.mint,
                record.side.as_str(),
                record.sol_amount as i64,
                record.token_amount as i64,
                record.user,
                record.slot as i64,
                record.observed_at,
            ],
        )?;
        Ok(())
    }
}

#[async_trait]
impl TokenStore for SqliteTokenStore {
    async fn upsert_token(&self, snapshot: &TokenSnapshot) -> Result<(), StoreError> {
        let conn = self.conn.lock().unwrap();
        Self::upsert_token_tx(&conn, snapshot)
    }

    async fn insert_trade_if_absent(&self, record: &TradeRecord) -> Result<(), StoreError> {
        let conn = self.conn.lock().unwrap();
        Self::insert_trade_tx(&conn, record)
    }

    async fn bulk_upsert(&self, batch: &PersistBatch) -> Result<(), StoreError> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;

        for snapshot in &batch.tokens {
            Self::upsert_token_tx(&tx, snapshot)?;
        }
        for record in &batch.trades {
            Self::insert_trade_tx(&tx, record)?;
        }

        tx.commit()?;
        log::debug!(
            "✅ Flushed {} token snapshots, {} trades",
            batch.tokens.len(),
            batch.trades.len()
        );
        Ok(())
    }
}

fn apply_pragmas(conn: &Connection) -> Result<(), StoreError> {
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "synchronous", "NORMAL")?;
    conn.pragma_update(None, "temp_store", "MEMORY")?;
    conn.pragma_update(None, "wal_autocheckpoint", 1000)?;
    Ok(())
}

fn create_schema(conn: &Connection) -> Result<(), StoreError> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS tokens (
            mint TEXT PRIMARY KEY,
            phase TEXT NOT NULL,
            price_sol REAL NOT NULL,
            price_usd REAL NOT NULL,
            market_cap_usd REAL NOT NULL,
            curve_progress_pct REAL NOT NULL,
            first_seen_slot INTEGER NOT NULL,
            graduated_at_slot INTEGER,
            pool_address TEXT,
            creator TEXT,
            updated_at INTEGER NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS trades (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            signature TEXT UNIQUE NOT NULL,
            mint TEXT NOT NULL,
            side TEXT NOT NULL,
            sol_amount INTEGER NOT NULL,
            token_amount INTEGER NOT NULL,
            user_account TEXT,
            slot INTEGER NOT NULL,
            observed_at INTEGER NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_trades_mint_slot ON trades(mint, slot DESC)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_tokens_phase ON tokens(phase)",
        [],
    )?;

    Ok(())
}

fn parse_phase(text: &str) -> Phase {
    match text {
        "bonding_curve" => Phase::BondingCurve,
        "graduated" => Phase::Graduated,
        _ => Phase::Discovered,
    }
}
