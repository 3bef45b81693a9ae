//! Persistence: the narrow storage interface, its SQLite implementation,
//! and the batching adapter between the tracker and the store.

pub mod batcher;
pub mod sqlite_store;
pub mod store;

pub use batcher::{run_persistence_batcher, BatcherConfig};
pub use sqlite_store::SqliteTokenStore;
pub use store::{PersistBatch, PersistCommand, StoreError, TokenSnapshot, TokenStore, TradeRecord};
