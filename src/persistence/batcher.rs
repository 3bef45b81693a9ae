//! Persistence batching.
//!
//! Consumes `PersistCommand`s from the tracker, coalesces them (one snapshot
//! per mint, last value wins; trades deduped by signature), and flushes on a
//! size threshold or interval. Flush failures keep the batch in memory and
//! retry on the next tick; sustained failure only raises a degraded-mode
//! counter — ingestion upstream is never stopped by a storage outage.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::time::{interval_at, Duration, Instant, MissedTickBehavior};

use super::store::{PersistBatch, PersistCommand, TokenSnapshot, TokenStore, TradeRecord};
use crate::telemetry::EngineCounters;

#[derive(Debug, Clone)]
pub struct BatcherConfig {
    pub flush_interval: Duration,
    /// Flush early once this many pending commands accumulate.
    pub max_batch: usize,
    /// Consecutive failed flushes before the degraded-mode signal.
    pub degraded_after_failures: u32,
}

impl Default for BatcherConfig {
    fn default() -> Self {
        Self {
            flush_interval: Duration::from_millis(1_000),
            max_batch: 256,
            degraded_after_failures: 5,
        }
    }
}

/// Pending writes between flushes. Coalescing multiple snapshots for the
/// same mint into one row write is an explicit relaxation: within a flush
/// window, last value wins per mint.
#[derive(Default)]
struct Pending {
    tokens: HashMap<String, TokenSnapshot>,
    trades: HashMap<String, TradeRecord>,
}

impl Pending {
    fn push(&mut self, command: PersistCommand) {
        match command {
            PersistCommand::UpsertToken(snapshot) => {
                self.tokens.insert(snapshot.mint.clone(), snapshot);
            }
            PersistCommand::InsertTrade(record) => {
                self.trades.entry(record.signature.clone()).or_insert(record);
            }
        }
    }

    fn len(&self) -> usize {
        self.tokens.len() + self.trades.len()
    }

    fn drain(&mut self) -> PersistBatch {
        PersistBatch {
            tokens: self.tokens.drain().map(|(_, v)| v).collect(),
            trades: self.trades.drain().map(|(_, v)| v).collect(),
        }
    }
}

/// Run the batching loop until the command channel closes. A final flush
/// runs on shutdown.
pub async fn run_persistence_batcher(
    mut rx: mpsc::Receiver<PersistCommand>,
    store: Arc<dyn TokenStore>,
    config: BatcherConfig,
    counters: Arc<EngineCounters>,
) {
    log::info!(
        "🗄️ Persistence batcher started (flush every {:?}, batch cap {})",
        config.flush_interval,
        config.max_batch
    );

    let mut pending = Pending::default();
    let mut consecutive_failures: u32 = 0;
    // First tick one full interval out; an immediate empty flush is useless.
    let mut timer = interval_at(Instant::now() + config.flush_interval, config.flush_interval);
    timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            command = rx.recv() => {
                match command {
                    Some(command) => {
                        pending.push(command);
                        if pending.len() >= config.max_batch {
                            flush(&store, &mut pending, &mut consecutive_failures, &config, &counters).await;
                        }
                    }
                    None => {
                        flush(&store, &mut pending, &mut consecutive_failures, &config, &counters).await;
                        log::info!("✅ Persistence batcher stopped");
                        return;
                    }
                }
            }
            _ = timer.tick() => {
                flush(&store, &mut pending, &mut consecutive_failures, &config, &counters).await;
            }
        }
    }
}

async fn flush(
    store: &Arc<dyn TokenStore>,
    pending: &mut Pending,
    consecutive_failures: &mut u32,
    config: &BatcherConfig,
    counters: &EngineCounters,
) {
    if pending.len() == 0 {
        return;
    }

    let batch = pending.drain();
    match store.bulk_upsert(&batch).await {
        Ok(()) => {
            *consecutive_failures = 0;
        }
        Err(e) => {
            // Put everything back; the next tick retries the whole batch.
            for snapshot in batch.tokens {
                pending.tokens.entry(snapshot.mint.clone()).or_insert(snapshot);
            }
            for record in batch.trades {
                pending.trades.entry(record.signature.clone()).or_insert(record);
            }

            *consecutive_failures += 1;
            EngineCounters::bump(&counters.persistence_retries);
            log::warn!(
                "⚠️ Persistence flush failed (attempt {}): {}",
                consecutive_failures,
                e
            );

            if *consecutive_failures == config.degraded_after_failures {
                EngineCounters::bump(&counters.persistence_degraded);
                log::error!(
                    "❌ Persistence degraded: {} consecutive failed flushes; ingestion continues",
                    consecutive_failures
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoder::TradeSide;
    use crate::lifecycle::Phase;
    use crate::persistence::store::StoreError;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingStore {
        fail_first: AtomicU64,
        flushes: Mutex<Vec<PersistBatch>>,
    }

    #[async_trait]
    impl TokenStore for RecordingStore {
        async fn upsert_token(&self, _snapshot: &TokenSnapshot) -> Result<(), StoreError> {
            Ok(())
        }
        async fn insert_trade_if_absent(&self, _record: &TradeRecord) -> Result<(), StoreError> {
            Ok(())
        }
        async fn bulk_upsert(&self, batch: &PersistBatch) -> Result<(), StoreError> {
            if self.fail_first.load(Ordering::SeqCst) > 0 {
                self.fail_first.fetch_sub(1, Ordering::SeqCst);
                return Err(StoreError::Database("injected".to_string()));
            }
            self.flushes.lock().unwrap().push(PersistBatch {
                tokens: batch.tokens.clone(),
                trades: batch.trades.clone(),
            });
            Ok(())
        }
    }

    fn snapshot(mint: &str, price_usd: f64) -> TokenSnapshot {
        TokenSnapshot {
            mint: mint.to_string(),
            phase: Phase::BondingCurve,
            price_sol: 0.0,
            price_usd,
            market_cap_usd: 0.0,
            curve_progress_pct: 0.0,
            first_seen_slot: 1,
            graduated_at_slot: None,
            pool_address: None,
            creator: None,
            updated_at: 0,
        }
    }

    fn trade(signature: &str) -> TradeRecord {
        TradeRecord {
            signature: signature.to_string(),
            mint: "m".to_string(),
            side: TradeSide::Buy,
            sol_amount: 1,
            token_amount: 2,
            user: None,
            slot: 1,
            observed_at: 0,
        }
    }

    #[tokio::test]
    async fn test_coalesces_same_mint_last_wins() {
        let store = Arc::new(RecordingStore::default());
        let counters = Arc::new(EngineCounters::default());
        let (tx, rx) = mpsc::channel(16);

        let handle = tokio::spawn(run_persistence_batcher(
            rx,
            store.clone() as Arc<dyn TokenStore>,
            BatcherConfig { flush_interval: Duration::from_secs(5), ..Default::default() },
            counters,
        ));

        tx.send(PersistCommand::UpsertToken(snapshot("mint_a", 1.0))).await.unwrap();
        tx.send(PersistCommand::UpsertToken(snapshot("mint_a", 2.0))).await.unwrap();
        drop(tx);
        handle.await.unwrap();

        let flushes = store.flushes.lock().unwrap();
        assert_eq!(flushes.len(), 1);
        assert_eq!(flushes[0].tokens.len(), 1);
        assert_eq!(flushes[0].tokens[0].price_usd, 2.0);
    }

    #[tokio::test]
    async fn test_failed_flush_retries_without_loss() {
        let store = Arc::new(RecordingStore::default());
        store.fail_first.store(1, Ordering::SeqCst);
        let counters = Arc::new(EngineCounters::default());
        let (tx, rx) = mpsc::channel(16);

        let handle = tokio::spawn(run_persistence_batcher(
            rx,
            store.clone() as Arc<dyn TokenStore>,
            BatcherConfig { flush_interval: Duration::from_millis(20), ..Default::default() },
            counters.clone(),
        ));

        tx.send(PersistCommand::InsertTrade(trade("sig_1"))).await.unwrap();
        tokio::time::sleep(Duration::from_millis(120)).await;
        drop(tx);
        handle.await.unwrap();

        let flushes = store.flushes.lock().unwrap();
        assert_eq!(flushes.len(), 1);
        assert_eq!(flushes[0].trades.len(), 1);
        assert_eq!(counters.snapshot().persistence_retries, 1);
    }

    #[tokio::test]
    async fn test_trade_dedup_within_window() {
        let store = Arc::new(RecordingStore::default());
        let counters = Arc::new(EngineCounters::default());
        let (tx, rx) = mpsc::channel(16);

        let handle = tokio::spawn(run_persistence_batcher(
            rx,
            store.clone() as Arc<dyn TokenStore>,
            BatcherConfig::default(),
            counters,
        ));

        tx.send(PersistCommand::InsertTrade(trade("same_sig"))).await.unwrap();
        tx.send(PersistCommand::InsertTrade(trade("same_sig"))).await.unwrap();
        drop(tx);
        handle.await.unwrap();

        let flushes = store.flushes.lock().unwrap();
        assert_eq!(flushes.len(), 1);
        assert_eq!(flushes[0].trades.len(), 1);
    }
}
