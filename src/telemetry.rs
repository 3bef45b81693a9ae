//! Process-wide operational counters.
//!
//! Every recoverable fault path bumps a counter here instead of raising;
//! components share one instance behind an `Arc`. Snapshots feed the
//! periodic status log line in the runtime.

use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct EngineCounters {
    pub frames_received: AtomicU64,
    pub trades_decoded: AtomicU64,
    pub accounts_decoded: AtomicU64,
    pub frames_dropped: AtomicU64,
    pub duplicates_dropped: AtomicU64,
    pub reconnects: AtomicU64,
    pub filter_updates: AtomicU64,
    pub resolution_failures: AtomicU64,
    pub persistence_retries: AtomicU64,
    pub persistence_degraded: AtomicU64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CountersSnapshot {
    pub frames_received: u64,
    pub trades_decoded: u64,
    pub accounts_decoded: u64,
    pub frames_dropped: u64,
    pub duplicates_dropped: u64,
    pub reconnects: u64,
    pub filter_updates: u64,
    pub resolution_failures: u64,
    pub persistence_retries: u64,
    pub persistence_degraded: u64,
}

impl EngineCounters {
    pub fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> CountersSnapshot {
        CountersSnapshot {
            frames_received: self.frames_received.load(Ordering::Relaxed),
            trades_decoded: self.trades_decoded.load(Ordering::Relaxed),
            accounts_decoded: self.accounts_decoded.load(Ordering::Relaxed),
            frames_dropped: self.frames_dropped.load(Ordering::Relaxed),
            duplicates_dropped: self.duplicates_dropped.load(Ordering::Relaxed),
            reconnects: self.reconnects.load(Ordering::Relaxed),
            filter_updates: self.filter_updates.load(Ordering::Relaxed),
            resolution_failures: self.resolution_failures.load(Ordering::Relaxed),
            persistence_retries: self.persistence_retries.load(Ordering::Relaxed),
            persistence_degraded: self.persistence_degraded.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_reflects_bumps() {
        let counters = EngineCounters::default();
        EngineCounters::bump(&counters.frames_received);
        EngineCounters::bump(&counters.frames_received);
        EngineCounters::bump(&counters.resolution_failures);

        let snap = counters.snapshot();
        assert_eq!(snap.frames_received, 2);
        assert_eq!(snap.resolution_failures, 1);
        assert_eq!(snap.reconnects, 0);
    }
}
