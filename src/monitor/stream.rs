//! Stream loops for the two logical feed channels.
//!
//! Each channel connects, subscribes with its filter, answers liveness pings
//! inline, and forwards converted frames downstream. Channel errors and idle
//! timeouts trigger reconnects with exponential backoff, indefinitely.
//! Filter changes arrive over a watch channel and are re-registered on the
//! open subscription without reconnecting.

use futures_util::{Sink, SinkExt, StreamExt};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tonic::transport::ClientTlsConfig;
use yellowstone_grpc_client::GeyserGrpcClient;
use yellowstone_grpc_proto::geyser::{
    subscribe_update::UpdateOneof, SubscribeRequest, SubscribeRequestPing, SubscribeUpdate,
};

use super::backoff::ReconnectBackoff;
use super::filters::SubscriptionFilters;
use super::frames;
use super::rate_limit::RegistrationLimiter;
use super::{FeedEvent, MonitorConfig};
use crate::telemetry::EngineCounters;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ChannelKind {
    Accounts,
    Transactions,
}

impl ChannelKind {
    fn label(&self) -> &'static str {
        match self {
            ChannelKind::Accounts => "accounts",
            ChannelKind::Transactions => "transactions",
        }
    }
}

pub struct SubscriptionManager {
    config: MonitorConfig,
    counters: Arc<EngineCounters>,
}

/// Handle to a running subscription: change filters on the open channels or
/// shut them down.
pub struct SubscriptionHandle {
    filter_tx: watch::Sender<SubscriptionFilters>,
    reconnect_tx: watch::Sender<u64>,
    tasks: Vec<JoinHandle<()>>,
}

impl SubscriptionHandle {
    /// Re-register both channels with new filters, without reconnecting.
    pub fn update_filters(&self, filters: SubscriptionFilters) {
        if self.filter_tx.send(filters).is_err() {
            log::warn!("⚠️ Filter update ignored: subscription loops have exited");
        }
    }

    /// Force both channels to drop their stream and re-dial.
    pub fn reconnect(&self) {
        self.reconnect_tx.send_modify(|generation| *generation += 1);
    }

    pub fn close(self) {
        for task in &self.tasks {
            task.abort();
        }
        log::info!("🔌 Subscription channels closed");
    }
}

impl SubscriptionManager {
    pub fn new(config: MonitorConfig, counters: Arc<EngineCounters>) -> Self {
        Self { config, counters }
    }

    /// Open both logical channels. Frames arrive on the returned receiver;
    /// the handle controls filters and shutdown.
    pub fn connect(
        self,
        filters: SubscriptionFilters,
        buffer: usize,
    ) -> (mpsc::Receiver<FeedEvent>, SubscriptionHandle) {
        let (event_tx, event_rx) = mpsc::channel(buffer);
        let (filter_tx, filter_rx) = watch::channel(filters);
        let (reconnect_tx, reconnect_rx) = watch::channel(0u64);
        let limiter = Arc::new(RegistrationLimiter::new(
            self.config.registrations_per_window,
            self.config.registration_window,
        ));
        let config = Arc::new(self.config);

        let mut tasks = Vec::new();
        for kind in [ChannelKind::Accounts, ChannelKind::Transactions] {
            let config = Arc::clone(&config);
            let limiter = Arc::clone(&limiter);
            let counters = Arc::clone(&self.counters);
            let filter_rx = filter_rx.clone();
            let reconnect_rx = reconnect_rx.clone();
            let event_tx = event_tx.clone();
            tasks.push(tokio::spawn(async move {
                channel_stream_loop(config, kind, filter_rx, reconnect_rx, limiter, event_tx, counters)
                    .await;
            }));
        }

        (event_rx, SubscriptionHandle { filter_tx, reconnect_tx, tasks })
    }
}

fn build_request(
    kind: ChannelKind,
    filters: &SubscriptionFilters,
    config: &MonitorConfig,
) -> SubscribeRequest {
    match kind {
        ChannelKind::Accounts => filters.account_request(config.commitment),
        ChannelKind::Transactions => filters.transaction_request(config.commitment),
    }
}

async fn channel_stream_loop(
    config: Arc<MonitorConfig>,
    kind: ChannelKind,
    mut filter_rx: watch::Receiver<SubscriptionFilters>,
    mut reconnect_rx: watch::Receiver<u64>,
    limiter: Arc<RegistrationLimiter>,
    event_tx: mpsc::Sender<FeedEvent>,
    counters: Arc<EngineCounters>,
) {
    let mut reconnect = ReconnectBackoff::new(
        config.backoff_initial,
        config.backoff_max,
        config.backoff_stable_after,
    );
    let mut dedup = SignatureDedup::new(config.seen_signatures_limit, config.seen_signatures_ttl);

    loop {
        if event_tx.is_closed() {
            log::info!("✅ {} channel: downstream closed, stopping", kind.label());
            return;
        }

        limiter.acquire().await;

        let builder = match GeyserGrpcClient::build_from_shared(config.grpc_url.clone())
            .and_then(|b| b.x_token(config.x_token.clone()))
        {
            Ok(builder) => builder,
            Err(e) => {
                log::error!("❌ {} channel: invalid endpoint config: {}", kind.label(), e);
                EngineCounters::bump(&counters.reconnects);
                reconnect.sleep().await;
                continue;
            }
        };

        let builder = if config.grpc_url.to_ascii_lowercase().starts_with("https://") {
            match builder.tls_config(ClientTlsConfig::new().with_native_roots()) {
                Ok(builder) => builder,
                Err(e) => {
                    log::error!("❌ {} channel: invalid TLS config: {}", kind.label(), e);
                    EngineCounters::bump(&counters.reconnects);
                    reconnect.sleep().await;
                    continue;
                }
            }
        } else {
            builder
        };

        let mut client = match builder
            .connect_timeout(config.connect_timeout)
            .timeout(config.request_timeout)
            .http2_adaptive_window(true)
            .tcp_nodelay(true)
            .connect()
            .await
        {
            Ok(client) => client,
            Err(e) => {
                log::warn!("❌ {} channel: connect failed: {}", kind.label(), e);
                EngineCounters::bump(&counters.reconnects);
                reconnect.sleep().await;
                continue;
            }
        };

        let (mut subscribe_tx, mut stream) = match client.subscribe().await {
            Ok(parts) => parts,
            Err(e) => {
                log::warn!("❌ {} channel: subscribe failed: {}", kind.label(), e);
                EngineCounters::bump(&counters.reconnects);
                reconnect.sleep().await;
                continue;
            }
        };

        let request = build_request(kind, &filter_rx.borrow_and_update(), &config);
        if let Err(e) = subscribe_tx.send(request).await {
            log::warn!("❌ {} channel: filter registration failed: {}", kind.label(), e);
            EngineCounters::bump(&counters.reconnects);
            reconnect.sleep().await;
            continue;
        }

        reconnect.note_connected();
        log::info!("✅ {} channel connected: {}", kind.label(), config.grpc_url);

        // Mark the current reconnect generation as seen.
        reconnect_rx.borrow_and_update();

        let mut filters_open = true;
        let mut reconnect_open = true;
        loop {
            tokio::select! {
                forced = reconnect_rx.changed(), if reconnect_open => {
                    if forced.is_err() {
                        // Handle dropped; forced reconnects no longer possible.
                        reconnect_open = false;
                        continue;
                    }
                    log::info!("🔄 {} channel: reconnect requested", kind.label());
                    break;
                }
                changed = filter_rx.changed(), if filters_open => {
                    if changed.is_err() {
                        // Handle dropped: nobody can update filters anymore,
                        // keep streaming with the current ones.
                        filters_open = false;
                        continue;
                    }
                    limiter.acquire().await;
                    let request = build_request(kind, &filter_rx.borrow_and_update(), &config);
                    match subscribe_tx.send(request).await {
                        Ok(()) => {
                            EngineCounters::bump(&counters.filter_updates);
                            log::info!("🔄 {} channel: filters updated in place", kind.label());
                        }
                        Err(e) => {
                            log::warn!("❌ {} channel: filter update failed: {}", kind.label(), e);
                            break;
                        }
                    }
                }
                next = tokio::time::timeout(config.idle_timeout, stream.next()) => {
                    match next {
                        Ok(Some(Ok(update))) => {
                            EngineCounters::bump(&counters.frames_received);
                            let outcome = handle_update(
                                update,
                                kind,
                                &mut subscribe_tx,
                                &mut dedup,
                                &event_tx,
                                &counters,
                            )
                            .await;
                            match outcome {
                                FrameOutcome::Continue => {}
                                FrameOutcome::Reconnect => break,
                                FrameOutcome::Stop => return,
                            }
                        }
                        Ok(Some(Err(e))) => {
                            log::warn!("❌ {} channel: stream error: {}", kind.label(), e);
                            break;
                        }
                        Ok(None) => {
                            log::warn!("❌ {} channel: stream ended", kind.label());
                            break;
                        }
                        Err(_) => {
                            log::warn!(
                                "⏰ {} channel: idle for {:?}, reconnecting",
                                kind.label(),
                                config.idle_timeout
                            );
                            break;
                        }
                    }
                }
            }
        }

        EngineCounters::bump(&counters.reconnects);
        reconnect.sleep().await;
    }
}

enum FrameOutcome {
    Continue,
    Reconnect,
    Stop,
}

/// Process one inbound frame. Liveness probes are answered before anything
/// else; malformed frames are counted and dropped, never raised.
async fn handle_update<S>(
    update: SubscribeUpdate,
    kind: ChannelKind,
    subscribe_tx: &mut S,
    dedup: &mut SignatureDedup,
    event_tx: &mpsc::Sender<FeedEvent>,
    counters: &EngineCounters,
) -> FrameOutcome
where
    S: Sink<SubscribeRequest> + Unpin,
    S::Error: std::fmt::Display,
{
    let created_at = update.created_at;
    let Some(oneof) = update.update_oneof else {
        EngineCounters::bump(&counters.frames_dropped);
        return FrameOutcome::Continue;
    };

    match oneof {
        UpdateOneof::Ping(_) => {
            let reply = SubscribeRequest {
                ping: Some(SubscribeRequestPing { id: 1 }),
                ..Default::default()
            };
            if let Err(e) = subscribe_tx.send(reply).await {
                log::warn!("❌ {} channel: ping reply failed: {}", kind.label(), e);
                return FrameOutcome::Reconnect;
            }
            FrameOutcome::Continue
        }
        UpdateOneof::Pong(_) => FrameOutcome::Continue,
        UpdateOneof::Account(account_update) => {
            match frames::account_update_from_proto(account_update) {
                Some(raw) => {
                    if event_tx.send(FeedEvent::Account(raw)).await.is_err() {
                        return FrameOutcome::Stop;
                    }
                    FrameOutcome::Continue
                }
                None => {
                    EngineCounters::bump(&counters.frames_dropped);
                    FrameOutcome::Continue
                }
            }
        }
        UpdateOneof::Transaction(tx_update) => {
            match frames::transaction_from_proto(tx_update, created_at) {
                Some(raw) => {
                    if !dedup.check_and_mark(&raw.signature) {
                        EngineCounters::bump(&counters.duplicates_dropped);
                        return FrameOutcome::Continue;
                    }
                    if event_tx.send(FeedEvent::Transaction(raw)).await.is_err() {
                        return FrameOutcome::Stop;
                    }
                    FrameOutcome::Continue
                }
                None => {
                    EngineCounters::bump(&counters.frames_dropped);
                    FrameOutcome::Continue
                }
            }
        }
        // Slot/block/entry updates are not part of either logical channel.
        _ => FrameOutcome::Continue,
    }
}

/// Redelivery suppression: remembers recently forwarded signatures for a
/// bounded count and TTL.
struct SignatureDedup {
    limit: usize,
    ttl: Duration,
    order: VecDeque<(Instant, String)>,
    seen: HashMap<String, Instant>,
}

impl SignatureDedup {
    fn new(limit: usize, ttl: Duration) -> Self {
        Self {
            limit: limit.max(1),
            ttl,
            order: VecDeque::new(),
            seen: HashMap::new(),
        }
    }

    /// Returns true when the signature has not been seen within the window,
    /// and marks it seen.
    fn check_and_mark(&mut self, signature: &str) -> bool {
        let now = Instant::now();
        self.prune(now);

        if let Some(&seen_at) = self.seen.get(signature) {
            if now.duration_since(seen_at) < self.ttl {
                return false;
            }
        }

        self.seen.insert(signature.to_string(), now);
        self.order.push_back((now, signature.to_string()));
        true
    }

    fn prune(&mut self, now: Instant) {
        while self.order.len() > self.limit {
            if let Some((_, signature)) = self.order.pop_front() {
                self.seen.remove(&signature);
            }
        }
        while let Some((seen_at, _)) = self.order.front() {
            if now.duration_since(*seen_at) >= self.ttl {
                if let Some((_, signature)) = self.order.pop_front() {
                    self.seen.remove(&signature);
                }
            } else {
                break;
            }
        }
    }
}
