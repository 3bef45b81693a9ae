//! The lifecycle tracker: folds decoded feed events into per-mint state.
//!
//! A single consumer task drives `run()`, so all mutation of the lifecycle
//! map is serialized by construction; the account and transaction channels
//! interleave freely upstream and are reconciled here through the per-field
//! slot watermarks on each aggregate.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tokio::time::interval;

use super::resolution::CurveResolver;
use super::{LifecycleUpdate, Phase, TokenLifecycle};
use crate::decoder::{
    self, trade::TradeDecodeParams, CurveAccountState, DecodedAccount, PoolAccountState,
    TradeEvent, WSOL_MINT,
};
use crate::monitor::FeedEvent;
use crate::persistence::{PersistCommand, TokenSnapshot, TradeRecord};
use crate::pricing::{self, SolPriceSource};
use crate::telemetry::EngineCounters;

#[derive(Debug, Clone)]
pub struct TrackerConfig {
    /// Curve token allocation used for progress math, in base units.
    pub initial_curve_tokens: u64,
    /// Supply assumed for market cap before the first curve account read.
    pub assumed_total_supply: u64,
    pub trade_decode: TradeDecodeParams,
    pub max_pending_curves: usize,
    pub pending_curve_ttl: Duration,
    pub broadcast_capacity: usize,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            initial_curve_tokens: pricing::DEFAULT_INITIAL_CURVE_TOKENS,
            assumed_total_supply: 1_000_000_000_000_000,
            trade_decode: TradeDecodeParams::default(),
            max_pending_curves: 1024,
            pending_curve_ttl: Duration::from_secs(30),
            broadcast_capacity: 256,
        }
    }
}

pub struct LifecycleTracker {
    tokens: HashMap<String, TokenLifecycle>,
    resolver: CurveResolver,
    config: TrackerConfig,
    sol_price: Arc<dyn SolPriceSource>,
    persist_tx: mpsc::Sender<PersistCommand>,
    broadcast_tx: broadcast::Sender<LifecycleUpdate>,
    counters: Arc<EngineCounters>,
    now_fn: Box<dyn Fn() -> i64 + Send + Sync>,
}

impl LifecycleTracker {
    pub fn new(
        config: TrackerConfig,
        sol_price: Arc<dyn SolPriceSource>,
        persist_tx: mpsc::Sender<PersistCommand>,
        counters: Arc<EngineCounters>,
    ) -> Self {
        Self::with_timestamp_fn(
            config,
            sol_price,
            persist_tx,
            counters,
            Box::new(|| chrono::Utc::now().timestamp()),
        )
    }

    /// Deterministic timestamps for tests.
    pub fn with_timestamp_fn(
        config: TrackerConfig,
        sol_price: Arc<dyn SolPriceSource>,
        persist_tx: mpsc::Sender<PersistCommand>,
        counters: Arc<EngineCounters>,
        now_fn: Box<dyn Fn() -> i64 + Send + Sync>,
    ) -> Self {
        let (broadcast_tx, _) = broadcast::channel(config.broadcast_capacity.max(1));
        let resolver = CurveResolver::new(config.max_pending_curves, config.pending_curve_ttl);
        Self {
            tokens: HashMap::new(),
            resolver,
            config,
            sol_price,
            persist_tx,
            broadcast_tx,
            counters,
            now_fn,
        }
    }

    /// Subscribe to lifecycle transitions. Slow consumers lag and lose old
    /// messages rather than backpressure ingestion.
    pub fn subscribe(&self) -> broadcast::Receiver<LifecycleUpdate> {
        self.broadcast_tx.subscribe()
    }

    pub fn token(&self, mint: &str) -> Option<&TokenLifecycle> {
        self.tokens.get(mint)
    }

    pub fn tracked_mints(&self) -> usize {
        self.tokens.len()
    }

    /// Consume the feed until it closes, expiring unresolved curve buffers
    /// on a periodic tick.
    pub async fn run(mut self, mut rx: mpsc::Receiver<FeedEvent>) {
        log::info!("🚀 Lifecycle tracker started");
        let mut expiry = interval(Duration::from_secs(1));

        loop {
            tokio::select! {
                event = rx.recv() => {
                    match event {
                        Some(event) => self.handle_event(event).await,
                        None => {
                            log::info!("✅ Feed closed, lifecycle tracker stopping");
                            break;
                        }
                    }
                }
                _ = expiry.tick() => {
                    self.expire_unresolved();
                }
            }
        }
    }

    /// Drop pending curve updates past their resolution timeout; each one
    /// is a counted resolution failure.
    pub fn expire_unresolved(&mut self) {
        let dropped = self.resolver.expire_pending();
        if dropped > 0 {
            for _ in 0..dropped {
                EngineCounters::bump(&self.counters.resolution_failures);
            }
            log::warn!("⚠️ Dropped {} curve updates unresolved past timeout", dropped);
        }
    }

    pub async fn handle_event(&mut self, event: FeedEvent) {
        match event {
            FeedEvent::Account(update) => {
                match decoder::decode_account(&update.owner, &update.address, &update.data) {
                    DecodedAccount::Curve(curve) => {
                        EngineCounters::bump(&self.counters.accounts_decoded);
                        self.handle_curve_update(curve, update.slot).await;
                    }
                    DecodedAccount::Pool(pool) => {
                        EngineCounters::bump(&self.counters.accounts_decoded);
                        self.apply_pool(pool, update.slot).await;
                    }
                    DecodedAccount::Unrecognized => {
                        log::debug!(
                            "Unrecognized account payload at {} ({} bytes, discr {})",
                            update.address,
                            update.data.len(),
                            hex::encode(&update.data[..update.data.len().min(8)])
                        );
                    }
                }
            }
            FeedEvent::Transaction(tx) => {
                let now = (self.now_fn)();
                let trades = decoder::trade::decode_transaction(&tx, &self.config.trade_decode, now);
                for trade in trades {
                    EngineCounters::bump(&self.counters.trades_decoded);
                    self.apply_trade(trade).await;
                }
            }
        }
    }

    async fn handle_curve_update(&mut self, curve: CurveAccountState, slot: u64) {
        match self.resolver.resolve(&curve.address) {
            Some(mint) => {
                let mint = mint.to_string();
                self.apply_curve(&mint, curve, slot).await;
            }
            None => {
                if !self.resolver.buffer_unresolved(curve, slot) {
                    EngineCounters::bump(&self.counters.resolution_failures);
                    log::warn!("⚠️ Pending curve buffer full, dropping unresolved update");
                }
            }
        }
    }

    async fn apply_trade(&mut self, trade: TradeEvent) {
        let unlocked = match self.resolver.note_mint(&trade.mint) {
            Ok(unlocked) => unlocked,
            Err(()) => {
                EngineCounters::bump(&self.counters.resolution_failures);
                log::warn!("⚠️ Trade {} references underivable mint {}", trade.signature, trade.mint);
                return;
            }
        };

        let now = (self.now_fn)();
        let sol_usd = self.sol_price.current_price_usd().await;

        let token = self
            .tokens
            .entry(trade.mint.clone())
            .or_insert_with(|| TokenLifecycle::new(&trade.mint, trade.slot, now));

        let mut transitioned = false;
        if trade.slot >= token.last_trade_slot {
            token.last_trade_slot = trade.slot;
            transitioned = token.advance_phase(Phase::BondingCurve);

            if let Some(reserves) = trade.reserves_after {
                let price = pricing::price_from_reserves(
                    reserves.virtual_token_reserves,
                    reserves.virtual_sol_reserves,
                    sol_usd,
                );
                token.latest_price_sol = price.price_sol;
                token.latest_price_usd = price.price_usd;
                token.latest_market_cap_usd = pricing::market_cap_usd(
                    price.price_usd,
                    effective_supply(token, self.config.assumed_total_supply),
                    token.last_pool_base_reserve,
                );
            }
            token.updated_at = now;
        }

        let snapshot = TokenSnapshot::from(&*token);
        let update = transitioned.then(|| lifecycle_update(token, now));
        self.queue_persist(PersistCommand::InsertTrade(TradeRecord::from(&trade))).await;
        self.queue_persist(PersistCommand::UpsertToken(snapshot)).await;
        if let Some(update) = update {
            self.broadcast(update);
        }

        // A first trade for a mint may unlock curve updates that were
        // buffered before the mint was known.
        for (mint, curve, curve_slot) in unlocked {
            self.apply_curve(&mint, curve, curve_slot).await;
        }
    }

    async fn apply_curve(&mut self, mint: &str, curve: CurveAccountState, slot: u64) {
        let now = (self.now_fn)();
        let sol_usd = self.sol_price.current_price_usd().await;

        let token = self
            .tokens
            .entry(mint.to_string())
            .or_insert_with(|| TokenLifecycle::new(mint, slot, now));

        if slot < token.last_curve_slot {
            log::debug!("Stale curve update for {} (slot {} < {})", mint, slot, token.last_curve_slot);
            return;
        }
        token.last_curve_slot = slot;

        token.total_supply = curve.token_total_supply;
        if token.creator.is_none() {
            token.creator = curve.creator.clone();
        }

        let price = pricing::price_from_reserves(
            curve.virtual_token_reserves,
            curve.virtual_sol_reserves,
            sol_usd,
        );
        token.latest_price_sol = price.price_sol;
        token.latest_price_usd = price.price_usd;

        let mut transitioned = token.advance_phase(Phase::BondingCurve);
        if curve.complete {
            transitioned |= graduate(token, slot);
        }

        // Progress stays pinned at 100 once graduated, whatever the
        // reserve-derived figure says.
        token.latest_curve_progress_pct = pricing::curve_progress_pct(
            curve.real_token_reserves,
            self.config.initial_curve_tokens,
            curve.complete || token.phase == Phase::Graduated,
        );

        token.latest_market_cap_usd = pricing::market_cap_usd(
            price.price_usd,
            effective_supply(token, self.config.assumed_total_supply),
            token.last_pool_base_reserve,
        );
        token.updated_at = now;

        let snapshot = TokenSnapshot::from(&*token);
        let update = transitioned.then(|| lifecycle_update(token, now));
        self.queue_persist(PersistCommand::UpsertToken(snapshot)).await;
        if let Some(update) = update {
            self.broadcast(update);
        }
    }

    async fn apply_pool(&mut self, pool: PoolAccountState, slot: u64) {
        // Pools quote the launched token against wrapped SOL; tolerate
        // either side ordering.
        let (mint, token_reserve, sol_reserve) = if pool.base_mint.starts_with(WSOL_MINT) {
            (pool.quote_mint.clone(), pool.quote_reserve, pool.base_reserve)
        } else {
            (pool.base_mint.clone(), pool.base_reserve, pool.quote_reserve)
        };

        let now = (self.now_fn)();
        let sol_usd = self.sol_price.current_price_usd().await;

        let token = self
            .tokens
            .entry(mint.clone())
            .or_insert_with(|| TokenLifecycle::new(&mint, slot, now));

        if slot < token.last_pool_slot {
            log::debug!("Stale pool update for {} (slot {} < {})", mint, slot, token.last_pool_slot);
            return;
        }
        token.last_pool_slot = slot;

        if token.pool_address.is_none() {
            token.pool_address = Some(pool.pool_address.clone());
        }
        token.last_pool_base_reserve = Some(token_reserve);

        let price = pricing::price_from_reserves(token_reserve, sol_reserve, sol_usd);
        token.latest_price_sol = price.price_sol;
        token.latest_price_usd = price.price_usd;

        let transitioned = graduate(token, slot);
        token.latest_curve_progress_pct = 100.0;
        token.latest_market_cap_usd = pricing::market_cap_usd(
            price.price_usd,
            effective_supply(token, self.config.assumed_total_supply),
            token.last_pool_base_reserve,
        );
        token.updated_at = now;

        let snapshot = TokenSnapshot::from(&*token);
        let update = transitioned.then(|| lifecycle_update(token, now));
        self.queue_persist(PersistCommand::UpsertToken(snapshot)).await;
        if let Some(update) = update {
            self.broadcast(update);
        }
    }

    async fn queue_persist(&self, command: PersistCommand) {
        if self.persist_tx.send(command).await.is_err() {
            log::debug!("Persistence channel closed, dropping command");
        }
    }

    fn broadcast(&self, update: LifecycleUpdate) {
        if log::log_enabled!(log::Level::Debug) {
            if let Ok(json) = serde_json::to_string(&update) {
                log::debug!("Lifecycle transition: {}", json);
            }
        }
        // No subscribers is fine; broadcast is best-effort fan-out.
        let _ = self.broadcast_tx.send(update);
    }
}

/// Supply used for market-cap math: the curve-reported total once known.
fn effective_supply(token: &TokenLifecycle, assumed: u64) -> u64 {
    if token.total_supply > 0 {
        token.total_supply
    } else {
        assumed
    }
}

/// Idempotent graduation: the slot is recorded on the first transition only.
fn graduate(token: &mut TokenLifecycle, slot: u64) -> bool {
    let transitioned = token.advance_phase(Phase::Graduated);
    if transitioned && token.graduated_at_slot.is_none() {
        token.graduated_at_slot = Some(slot);
        log::info!("🎓 {} graduated at slot {}", token.mint, slot);
    }
    transitioned
}

fn lifecycle_update(token: &TokenLifecycle, now: i64) -> LifecycleUpdate {
    LifecycleUpdate {
        mint: token.mint.clone(),
        phase: token.phase,
        price_usd: token.latest_price_usd,
        market_cap_usd: token.latest_market_cap_usd,
        curve_progress_pct: token.latest_curve_progress_pct,
        timestamp: now,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoder::curve_account::tests::encode_curve_account;
    use crate::decoder::pool_account::tests::encode_pool_account;
    use crate::decoder::trade::tests::make_trade_tx;
    use crate::decoder::trade::TradeSide;
    use crate::decoder::{RawAccountUpdate, AMM_PROGRAM_ID, CURVE_PROGRAM_ID};
    use crate::lifecycle::resolution::derive_curve_address;
    use crate::pricing::FixedSolPrice;

    fn mint(n: u8) -> String {
        bs58::encode([n; 32]).into_string()
    }

    fn make_tracker() -> (LifecycleTracker, mpsc::Receiver<PersistCommand>, Arc<EngineCounters>) {
        let counters = Arc::new(EngineCounters::default());
        let (tx, rx) = mpsc::channel(256);
        let tracker = LifecycleTracker::with_timestamp_fn(
            TrackerConfig::default(),
            Arc::new(FixedSolPrice(100.0)),
            tx,
            counters.clone(),
            Box::new(|| 1_700_000_000),
        );
        (tracker, rx, counters)
    }

    fn trade_event(mint: &str, signature: &str, slot: u64) -> FeedEvent {
        FeedEvent::Transaction(make_trade_tx(
            signature,
            slot,
            mint,
            "wallet",
            TradeSide::Buy,
            1_000_000_000,
            500_000_000,
        ))
    }

    fn curve_event(mint: &str, slot: u64, real_token_reserves: u64, complete: bool) -> FeedEvent {
        let address = derive_curve_address(mint).unwrap();
        let data = encode_curve_account(
            1_000_000_000_000_000,
            32_000_000_000,
            real_token_reserves,
            1_000_000_000_000_000,
            complete,
        );
        FeedEvent::Account(RawAccountUpdate {
            address,
            owner: CURVE_PROGRAM_ID.to_string(),
            slot,
            data,
        })
    }

    fn pool_event(mint_bytes: [u8; 32], slot: u64, base_reserve: u64) -> FeedEvent {
        let wsol: [u8; 32] = bs58::decode(WSOL_MINT).into_vec().unwrap().try_into().unwrap();
        let data = encode_pool_account(&mint_bytes, &wsol, base_reserve, 85_000_000_000, 1);
        FeedEvent::Account(RawAccountUpdate {
            address: "pool_address_1".to_string(),
            owner: AMM_PROGRAM_ID.to_string(),
            slot,
            data,
        })
    }

    #[tokio::test]
    async fn test_trade_discovers_token() {
        let (mut tracker, _rx, _counters) = make_tracker();
        let m = mint(1);

        tracker.handle_event(trade_event(&m, "sig_1", 100)).await;

        let token = tracker.token(&m).unwrap();
        assert_eq!(token.phase, Phase::BondingCurve);
        assert_eq!(token.first_seen_slot, 100);
    }

    #[tokio::test]
    async fn test_curve_update_sets_metrics() {
        let (mut tracker, _rx, _counters) = make_tracker();
        let m = mint(2);

        tracker.handle_event(trade_event(&m, "sig_1", 100)).await;
        tracker.handle_event(curve_event(&m, 101, 400_000_000_000_000, false)).await;

        let token = tracker.token(&m).unwrap();
        assert_eq!(token.total_supply, 1_000_000_000_000_000);
        assert!(token.latest_price_usd > 0.0);
        assert!((token.latest_curve_progress_pct - 49.558638).abs() < 1e-3);
        assert_eq!(token.phase, Phase::BondingCurve);
    }

    #[tokio::test]
    async fn test_graduation_via_complete_flag_exactly_once() {
        let (mut tracker, _rx, _counters) = make_tracker();
        let m = mint(3);
        let mut updates = tracker.subscribe();

        tracker.handle_event(trade_event(&m, "sig_1", 100)).await;
        tracker.handle_event(curve_event(&m, 101, 0, true)).await;
        // Repeated graduation signals are no-ops.
        tracker.handle_event(curve_event(&m, 102, 0, true)).await;
        tracker.handle_event(pool_event([3u8; 32], 103, 200_000_000_000_000)).await;

        let token = tracker.token(&m).unwrap();
        assert_eq!(token.phase, Phase::Graduated);
        assert_eq!(token.graduated_at_slot, Some(101));
        assert_eq!(token.latest_curve_progress_pct, 100.0);

        let mut graduation_updates = 0;
        while let Ok(update) = updates.try_recv() {
            if update.phase == Phase::Graduated {
                graduation_updates += 1;
            }
        }
        assert_eq!(graduation_updates, 1);
    }

    #[tokio::test]
    async fn test_graduation_via_pool_sighting() {
        let (mut tracker, _rx, _counters) = make_tracker();
        let m = mint(4);

        tracker.handle_event(pool_event([4u8; 32], 500, 250_000_000_000_000)).await;

        let token = tracker.token(&m).unwrap();
        assert_eq!(token.phase, Phase::Graduated);
        assert_eq!(token.graduated_at_slot, Some(500));
        assert_eq!(token.pool_address.as_deref(), Some("pool_address_1"));
    }

    #[tokio::test]
    async fn test_phase_never_regresses_on_stale_curve() {
        let (mut tracker, _rx, _counters) = make_tracker();
        let m = mint(5);

        tracker.handle_event(trade_event(&m, "sig_1", 100)).await;
        tracker.handle_event(curve_event(&m, 200, 0, true)).await;
        // A stale, incomplete curve read from before graduation.
        tracker.handle_event(curve_event(&m, 150, 500_000_000_000_000, false)).await;

        let token = tracker.token(&m).unwrap();
        assert_eq!(token.phase, Phase::Graduated);
        assert_eq!(token.graduated_at_slot, Some(200));
        // Stale slot was rejected wholesale: progress still pinned.
        assert_eq!(token.latest_curve_progress_pct, 100.0);
    }

    #[tokio::test]
    async fn test_per_field_slots_are_independent() {
        let (mut tracker, _rx, _counters) = make_tracker();
        let m = mint(6);

        // Curve channel is far ahead of the trade channel.
        tracker.handle_event(trade_event(&m, "sig_1", 100)).await;
        tracker.handle_event(curve_event(&m, 5_000, 700_000_000_000_000, false)).await;
        // A trade at a lower slot than the curve watermark still applies.
        tracker.handle_event(trade_event(&m, "sig_2", 101)).await;

        let token = tracker.token(&m).unwrap();
        assert_eq!(token.last_trade_slot, 101);
        assert_eq!(token.last_curve_slot, 5_000);
    }

    #[tokio::test]
    async fn test_unresolvable_trade_counted_not_tracked() {
        let (mut tracker, mut rx, counters) = make_tracker();

        tracker
            .handle_event(FeedEvent::Transaction(make_trade_tx(
                "sig_bad",
                100,
                "not-a-valid-mint",
                "wallet",
                TradeSide::Buy,
                1,
                1,
            )))
            .await;

        assert_eq!(tracker.tracked_mints(), 0);
        assert_eq!(counters.snapshot().resolution_failures, 1);
        assert!(rx.try_recv().is_err(), "nothing may reach persistence");
    }

    #[tokio::test]
    async fn test_buffered_curve_unlocked_by_trade() {
        let (mut tracker, _rx, _counters) = make_tracker();
        let m = mint(7);

        // Curve update arrives before any trade names the mint.
        tracker.handle_event(curve_event(&m, 90, 600_000_000_000_000, false)).await;
        assert_eq!(tracker.tracked_mints(), 0);

        tracker.handle_event(trade_event(&m, "sig_1", 100)).await;

        let token = tracker.token(&m).unwrap();
        assert_eq!(token.last_curve_slot, 90);
        assert!(token.latest_curve_progress_pct > 0.0);
    }

    #[tokio::test]
    async fn test_unresolved_curve_expires_with_counter() {
        let counters = Arc::new(EngineCounters::default());
        let (tx, _rx) = mpsc::channel(16);
        let mut tracker = LifecycleTracker::with_timestamp_fn(
            TrackerConfig {
                pending_curve_ttl: Duration::from_millis(0),
                ..Default::default()
            },
            Arc::new(FixedSolPrice(100.0)),
            tx,
            counters.clone(),
            Box::new(|| 0),
        );

        tracker.handle_event(curve_event(&mint(8), 90, 1, false)).await;
        tracker.expire_unresolved();

        assert_eq!(counters.snapshot().resolution_failures, 1);
        assert_eq!(tracker.tracked_mints(), 0);
    }

    #[tokio::test]
    async fn test_persistence_commands_queued() {
        let (mut tracker, mut rx, _counters) = make_tracker();
        let m = mint(9);

        tracker.handle_event(trade_event(&m, "sig_1", 100)).await;

        let mut saw_trade = false;
        let mut saw_token = false;
        while let Ok(command) = rx.try_recv() {
            match command {
                PersistCommand::InsertTrade(record) => {
                    assert_eq!(record.signature, "sig_1");
                    saw_trade = true;
                }
                PersistCommand::UpsertToken(snapshot) => {
                    assert_eq!(snapshot.mint, m);
                    saw_token = true;
                }
            }
        }
        assert!(saw_trade && saw_token);
    }
}
