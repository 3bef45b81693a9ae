//! Registration rate limiting.
//!
//! Subscription (re)registrations against the feed are capped per rolling
//! window. Hitting the cap defers the registration until the oldest one in
//! the window ages out; it never fails the caller.

use std::collections::VecDeque;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tokio::time::sleep;

#[derive(Debug)]
pub struct RegistrationLimiter {
    max_per_window: usize,
    window: Duration,
    timestamps: Mutex<VecDeque<Instant>>,
}

impl RegistrationLimiter {
    pub fn new(max_per_window: usize, window: Duration) -> Self {
        Self {
            max_per_window: max_per_window.max(1),
            window,
            timestamps: Mutex::new(VecDeque::new()),
        }
    }

    /// Wait until a registration slot is available, then claim it.
    pub async fn acquire(&self) {
        loop {
            let wait = {
                let mut timestamps = self.timestamps.lock().await;
                let now = Instant::now();

                while let Some(&oldest) = timestamps.front() {
                    if now.duration_since(oldest) >= self.window {
                        timestamps.pop_front();
                    } else {
                        break;
                    }
                }

                if timestamps.len() < self.max_per_window {
                    timestamps.push_back(now);
                    None
                } else {
                    // Deferred: sleep until the oldest registration leaves
                    // the window, then re-check.
                    timestamps
                        .front()
                        .map(|&oldest| self.window.saturating_sub(now.duration_since(oldest)))
                }
            };

            match wait {
                None => return,
                Some(delay) => {
                    log::warn!(
                        "⏳ Registration rate limit reached ({} per {:?}); deferring {:.1}s",
                        self.max_per_window,
                        self.window,
                        delay.as_secs_f64()
                    );
                    sleep(delay.max(Duration::from_millis(1))).await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_under_cap_is_immediate() {
        let limiter = RegistrationLimiter::new(3, Duration::from_secs(60));
        let start = Instant::now();
        for _ in 0..3 {
            limiter.acquire().await;
        }
        assert!(start.elapsed() < Duration::from_millis(100));
    }

    #[tokio::test]
    async fn test_over_cap_defers_until_window_rolls() {
        let limiter = RegistrationLimiter::new(2, Duration::from_millis(100));
        limiter.acquire().await;
        limiter.acquire().await;

        let start = Instant::now();
        limiter.acquire().await;
        // Third registration waited for the first to age out of the window.
        assert!(start.elapsed() >= Duration::from_millis(80));
    }
}
