//! Production runtime: wires the monitor, tracker, and persistence batcher
//! together and runs until ctrl-c.

use std::sync::Arc;
use tokio::sync::mpsc;

use pumpflow::config::Config;
use pumpflow::lifecycle::LifecycleTracker;
use pumpflow::monitor::{SubscriptionFilters, SubscriptionManager};
use pumpflow::persistence::{run_persistence_batcher, SqliteTokenStore, TokenStore};
use pumpflow::pricing::HttpSolPriceSource;
use pumpflow::telemetry::EngineCounters;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv::dotenv().ok();

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .target(env_logger::Target::Stderr)
        .init();

    // NOTE: Workaround for rustls issue
    rustls::crypto::aws_lc_rs::default_provider()
        .install_default()
        .expect("Can't set crypto provider to aws_lc_rs");

    let config = Config::from_env()?;

    log::info!("🚀 Starting pumpflow...");
    log::info!("📊 Configuration:");
    log::info!("   GEYSER_URL: {}", config.geyser_url);
    log::info!("   DB_PATH: {}", config.db_path);
    log::info!("   Commitment: {:?}", config.commitment_level);

    let counters = Arc::new(EngineCounters::default());

    let store: Arc<dyn TokenStore> = Arc::new(SqliteTokenStore::new(&config.db_path)?);
    let sol_price = Arc::new(HttpSolPriceSource::new(
        &config.sol_price_api,
        config.sol_price_ttl,
    )?);

    let (persist_tx, persist_rx) = mpsc::channel(config.persist_buffer);
    let batcher = tokio::spawn(run_persistence_batcher(
        persist_rx,
        store,
        config.batcher_config(),
        counters.clone(),
    ));

    let tracker = LifecycleTracker::new(
        config.tracker_config(),
        sol_price,
        persist_tx,
        counters.clone(),
    );
    // Broadcast receiver available for a dashboard/alerting sidecar.
    let _lifecycle_updates = tracker.subscribe();

    let manager = SubscriptionManager::new(config.monitor_config(), counters.clone());
    let (feed_rx, subscription) =
        manager.connect(SubscriptionFilters::tracked_programs(), config.feed_buffer);

    let tracker_task = tokio::spawn(tracker.run(feed_rx));

    let status_counters = counters.clone();
    let status_task = tokio::spawn(async move {
        let mut timer = tokio::time::interval(std::time::Duration::from_secs(30));
        timer.tick().await;
        loop {
            timer.tick().await;
            let snap = status_counters.snapshot();
            log::info!(
                "📊 frames={} trades={} accounts={} dropped={} dupes={} reconnects={} unresolved={} persist_retries={}",
                snap.frames_received,
                snap.trades_decoded,
                snap.accounts_decoded,
                snap.frames_dropped,
                snap.duplicates_dropped,
                snap.reconnects,
                snap.resolution_failures,
                snap.persistence_retries,
            );
        }
    });

    log::info!("✅ Pipeline configured, streaming...");

    tokio::signal::ctrl_c().await?;
    log::info!("🛑 Shutdown requested");

    subscription.close();
    status_task.abort();
    // Tracker drains the feed channel, then the batcher flushes and exits.
    let _ = tracker_task.await;
    let _ = batcher.await;

    log::info!("✅ pumpflow stopped");
    Ok(())
}
