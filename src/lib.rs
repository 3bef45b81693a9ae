//! pumpflow — streaming ingestion engine for a two-phase token-launch
//! protocol.
//!
//! Tokens launch on a constant-product bonding curve and, on completion,
//! graduate to a conventional AMM pool. This crate subscribes to the geyser
//! feed for both programs, decodes their binary account and instruction
//! formats, derives price/market-cap/curve-progress metrics, tracks each
//! token's lifecycle through graduation, and persists idempotent snapshots.
//!
//! Data flow:
//!
//! ```text
//! geyser feed → monitor (two channels) → decoder → lifecycle tracker
//!                                                     ├→ persistence batcher → SQLite
//!                                                     └→ broadcast (dashboard/alerts)
//! ```

pub mod config;
pub mod decoder;
pub mod lifecycle;
pub mod monitor;
pub mod persistence;
pub mod pricing;
pub mod telemetry;

pub use config::{Config, ConfigError};
pub use lifecycle::{LifecycleTracker, Phase, TokenLifecycle};
pub use monitor::{FeedEvent, SubscriptionFilters, SubscriptionManager};
pub use telemetry::EngineCounters;
