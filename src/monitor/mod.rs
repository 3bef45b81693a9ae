//! Feed subscription management.
//!
//! Owns the duplex gRPC channels to the geyser endpoint: one logical
//! subscription for account updates, one for transaction updates. Each runs
//! its own connect/backoff/reconnect loop and forwards converted frames into
//! a single bounded channel consumed by the lifecycle tracker.

pub mod backoff;
pub mod filters;
pub mod frames;
pub mod rate_limit;
pub mod stream;

pub use filters::SubscriptionFilters;
pub use stream::{SubscriptionHandle, SubscriptionManager};

use std::time::Duration;
use yellowstone_grpc_proto::geyser::CommitmentLevel;

use crate::decoder::{RawAccountUpdate, RawTransaction};

/// A converted frame from either logical channel.
#[derive(Debug, Clone)]
pub enum FeedEvent {
    Account(RawAccountUpdate),
    Transaction(RawTransaction),
}

#[derive(Debug, Clone)]
pub struct MonitorConfig {
    pub grpc_url: String,
    pub x_token: Option<String>,
    pub commitment: CommitmentLevel,
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
    /// A silent stream longer than this forces a reconnect.
    pub idle_timeout: Duration,
    pub backoff_initial: Duration,
    pub backoff_max: Duration,
    /// Uptime after which the backoff counter resets.
    pub backoff_stable_after: Duration,
    /// Subscription registrations allowed per rolling window.
    pub registrations_per_window: usize,
    pub registration_window: Duration,
    /// Redelivered-signature suppression window.
    pub seen_signatures_limit: usize,
    pub seen_signatures_ttl: Duration,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            grpc_url: String::new(),
            x_token: None,
            commitment: CommitmentLevel::Confirmed,
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(30),
            idle_timeout: Duration::from_secs(60),
            backoff_initial: Duration::from_secs(1),
            backoff_max: Duration::from_secs(60),
            backoff_stable_after: Duration::from_secs(120),
            registrations_per_window: 30,
            registration_window: Duration::from_secs(60),
            seen_signatures_limit: 10_000,
            seen_signatures_ttl: Duration::from_secs(120),
        }
    }
}
