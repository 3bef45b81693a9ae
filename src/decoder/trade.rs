//! Buy/sell trade extraction from transaction updates.
//!
//! Trades are identified by the 8-byte instruction discriminator on any
//! curve-program instruction, outer or inner (CPI). Amounts come from the
//! instruction data when it carries them; otherwise from the inner SPL-token
//! transfers invoked by the same outer instruction, classified into SOL leg
//! vs token leg with a magnitude heuristic; and as a last resort from an
//! `amount:` pattern in the program logs.
//!
//! The magnitude heuristic has no authoritative fallback: a transfer at or
//! below `sol_leg_max_amount` lamports is assumed to be the SOL leg. The
//! threshold is deliberately exposed as a tunable parameter instead of being
//! hidden in a constant.

use super::{discriminators, RawInstruction, RawTransaction, CURVE_PROGRAM_ID, TOKEN_PROGRAM_ID};

/// Position of the token mint in the buy/sell instruction account list.
const ACCOUNT_POS_MINT: usize = 2;

/// Position of the acting user in the buy/sell instruction account list.
const ACCOUNT_POS_USER: usize = 6;

/// SPL Token `Transfer` / `TransferChecked` instruction tags.
const TOKEN_IX_TRANSFER: u8 = 3;
const TOKEN_IX_TRANSFER_CHECKED: u8 = 12;

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum TradeSide {
    Buy,
    Sell,
}

impl TradeSide {
    pub fn as_str(&self) -> &'static str {
        match self {
            TradeSide::Buy => "BUY",
            TradeSide::Sell => "SELL",
        }
    }
}

/// Virtual reserves reported by the program in the same transaction, when
/// the event log carries them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReservesAfter {
    pub virtual_sol_reserves: u64,
    pub virtual_token_reserves: u64,
}

/// A single buy or sell derived from a transaction. The signature is the
/// natural idempotency key; the same signature is never applied twice
/// downstream.
#[derive(Debug, Clone)]
pub struct TradeEvent {
    pub signature: String,
    pub slot: u64,
    pub mint: String,
    pub side: TradeSide,
    pub user: Option<String>,
    /// Token amount in base units (6 decimals).
    pub token_amount: u64,
    /// SOL amount in lamports.
    pub sol_amount: u64,
    pub reserves_after: Option<ReservesAfter>,
    pub observed_at: i64,
}

/// Tunables for trade decoding.
#[derive(Debug, Clone, Copy)]
pub struct TradeDecodeParams {
    /// Inner transfers at or below this many lamports are treated as the
    /// SOL leg of a trade, larger ones as the token leg.
    pub sol_leg_max_amount: u64,
}

impl Default for TradeDecodeParams {
    fn default() -> Self {
        Self {
            // 50 SOL. Curve trades rarely exceed it, and token legs in
            // 6-decimal base units sit orders of magnitude above it.
            sol_leg_max_amount: 50_000_000_000,
        }
    }
}

/// Decode every buy/sell in a transaction. Transactions without a
/// recognizable trade instruction decode to an empty vec; nothing here
/// panics on malformed input.
pub fn decode_transaction(
    tx: &RawTransaction,
    params: &TradeDecodeParams,
    now_ts: i64,
) -> Vec<TradeEvent> {
    let mut trades = Vec::new();
    let observed_at = tx.block_time.unwrap_or(now_ts);
    let reserves_after = parse_reserves_from_logs(&tx.log_lines);

    for (outer_index, candidate) in trade_instructions(tx) {
        let Some(side) = match_side(&candidate.data) else {
            continue;
        };

        let Some(mint) = resolve_account(tx, &candidate, ACCOUNT_POS_MINT) else {
            continue;
        };
        let user = resolve_account(tx, &candidate, ACCOUNT_POS_USER);

        let (token_amount, sol_amount) = decode_amounts(tx, &candidate, outer_index, params);

        trades.push(TradeEvent {
            signature: tx.signature.clone(),
            slot: tx.slot,
            mint,
            side,
            user,
            token_amount,
            sol_amount,
            reserves_after,
            observed_at,
        });
    }

    trades
}

/// All curve-program instructions in the transaction, outer first, each
/// paired with the outer index its inner transfers are grouped under.
fn trade_instructions(tx: &RawTransaction) -> Vec<(usize, RawInstruction)> {
    let mut found = Vec::new();

    for (idx, ix) in tx.instructions.iter().enumerate() {
        if instruction_program(tx, ix) == Some(CURVE_PROGRAM_ID) {
            found.push((idx, ix.clone()));
        }
    }

    for group in &tx.inner_instructions {
        for ix in &group.instructions {
            if instruction_program(tx, ix) == Some(CURVE_PROGRAM_ID) {
                found.push((group.outer_index, ix.clone()));
            }
        }
    }

    found
}

fn instruction_program<'a>(tx: &'a RawTransaction, ix: &RawInstruction) -> Option<&'a str> {
    tx.account_keys.get(ix.program_index).map(String::as_str)
}

fn match_side(data: &[u8]) -> Option<TradeSide> {
    match data.get(0..8)? {
        d if d == discriminators::BUY => Some(TradeSide::Buy),
        d if d == discriminators::SELL => Some(TradeSide::Sell),
        _ => None,
    }
}

fn resolve_account(tx: &RawTransaction, ix: &RawInstruction, position: usize) -> Option<String> {
    let key_index = *ix.account_indexes.get(position)?;
    tx.account_keys.get(key_index).cloned()
}

/// Amount resolution ladder: direct instruction fields, then inner transfer
/// classification, then the log fallback.
fn decode_amounts(
    tx: &RawTransaction,
    ix: &RawInstruction,
    outer_index: usize,
    params: &TradeDecodeParams,
) -> (u64, u64) {
    if ix.data.len() >= 24 {
        let token_amount = u64::from_le_bytes(ix.data[8..16].try_into().unwrap_or([0u8; 8]));
        let sol_amount = u64::from_le_bytes(ix.data[16..24].try_into().unwrap_or([0u8; 8]));
        if token_amount > 0 || sol_amount > 0 {
            return (token_amount, sol_amount);
        }
    }

    let transfers = inner_transfer_amounts(tx, outer_index);
    if !transfers.is_empty() {
        return classify_legs(&transfers, params.sol_leg_max_amount);
    }

    let logged = parse_amounts_from_logs(&tx.log_lines);
    classify_legs(&logged, params.sol_leg_max_amount)
}

/// Amounts of all SPL-token transfers invoked under the given outer
/// instruction.
fn inner_transfer_amounts(tx: &RawTransaction, outer_index: usize) -> Vec<u64> {
    let mut amounts = Vec::new();

    for group in &tx.inner_instructions {
        if group.outer_index != outer_index {
            continue;
        }
        for ix in &group.instructions {
            if instruction_program(tx, ix) != Some(TOKEN_PROGRAM_ID) {
                continue;
            }
            let Some(&tag) = ix.data.first() else { continue };
            if tag != TOKEN_IX_TRANSFER && tag != TOKEN_IX_TRANSFER_CHECKED {
                continue;
            }
            if let Some(bytes) = ix.data.get(1..9) {
                if let Ok(raw) = bytes.try_into() {
                    amounts.push(u64::from_le_bytes(raw));
                }
            }
        }
    }

    amounts
}

/// Split raw amounts into (token leg, SOL leg) by the magnitude threshold,
/// taking the largest candidate on each side.
fn classify_legs(amounts: &[u64], sol_leg_max: u64) -> (u64, u64) {
    let sol_amount = amounts
        .iter()
        .copied()
        .filter(|&a| a <= sol_leg_max)
        .max()
        .unwrap_or(0);
    let token_amount = amounts
        .iter()
        .copied()
        .filter(|&a| a > sol_leg_max)
        .max()
        .unwrap_or(0);
    (token_amount, sol_amount)
}

/// Last-resort amount source: `amount: <n>` entries in the program logs.
fn parse_amounts_from_logs(log_lines: &[String]) -> Vec<u64> {
    log_lines
        .iter()
        .filter_map(|line| parse_labeled_u64(line, "amount:"))
        .collect()
}

/// Post-trade virtual reserves, when the program's event log reports them.
fn parse_reserves_from_logs(log_lines: &[String]) -> Option<ReservesAfter> {
    let mut sol = None;
    let mut token = None;

    for line in log_lines {
        if sol.is_none() {
            sol = parse_labeled_u64(line, "virtual_sol_reserves:");
        }
        if token.is_none() {
            token = parse_labeled_u64(line, "virtual_token_reserves:");
        }
    }

    Some(ReservesAfter {
        virtual_sol_reserves: sol?,
        virtual_token_reserves: token?,
    })
}

/// Parse the integer following `label` in a log line, tolerating trailing
/// punctuation.
fn parse_labeled_u64(line: &str, label: &str) -> Option<u64> {
    let rest = &line[line.find(label)? + label.len()..];
    let token = rest.split_whitespace().next()?;
    token.trim_matches(|c: char| !c.is_ascii_digit()).parse().ok()
}
