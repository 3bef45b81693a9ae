//! Reconnect backoff: exponential with a ceiling, unbounded retries.
//!
//! The attempt counter resets only after a connection has stayed up for a
//! sustained period, so a link that flaps every few seconds keeps climbing
//! toward the ceiling instead of hammering the endpoint.

use std::time::{Duration, Instant};
use tokio::time::sleep;

#[derive(Debug)]
pub struct ReconnectBackoff {
    initial_delay: Duration,
    max_delay: Duration,
    stable_after: Duration,
    attempt: u32,
    connected_at: Option<Instant>,
}

impl ReconnectBackoff {
    pub fn new(initial_delay: Duration, max_delay: Duration, stable_after: Duration) -> Self {
        Self {
            initial_delay,
            max_delay,
            stable_after,
            attempt: 0,
            connected_at: None,
        }
    }

    /// Record a successful (re)subscription. The counter is not reset here;
    /// that happens in `sleep()` once the uptime proves sustained.
    pub fn note_connected(&mut self) {
        self.connected_at = Some(Instant::now());
    }

    /// Delay for the upcoming attempt, without sleeping.
    pub fn next_delay(&self) -> Duration {
        let factor = 2u32.saturating_pow(self.attempt);
        self.initial_delay
            .saturating_mul(factor)
            .min(self.max_delay)
    }

    /// Sleep before the next attempt. Never gives up.
    pub async fn sleep(&mut self) {
        if let Some(connected_at) = self.connected_at.take() {
            if connected_at.elapsed() >= self.stable_after {
                self.attempt = 0;
            }
        }

        let delay = self.next_delay();
        log::warn!("⏳ Reconnecting in {:.1}s", delay.as_secs_f64());
        sleep(delay).await;
        self.attempt = self.attempt.saturating_add(1);
    }
}
