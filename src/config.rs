//! Environment-driven configuration.
//!
//! The feed endpoint and the database path are the only hard requirements;
//! everything else has a default. Missing required configuration is the one
//! condition that halts startup.

use std::env;
use std::time::Duration;
use yellowstone_grpc_proto::geyser::CommitmentLevel;

use crate::decoder::trade::TradeDecodeParams;
use crate::lifecycle::TrackerConfig;
use crate::monitor::MonitorConfig;
use crate::persistence::BatcherConfig;
use crate::pricing;

#[derive(Debug)]
pub enum ConfigError {
    MissingVariable(String),
    InvalidValue(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::MissingVariable(var) => write!(f, "Missing environment variable: {}", var),
            ConfigError::InvalidValue(msg) => write!(f, "Invalid configuration value: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {}

#[derive(Debug, Clone)]
pub struct Config {
    pub geyser_url: String,
    pub x_token: Option<String>,
    pub commitment_level: CommitmentLevel,
    pub db_path: String,
    pub sol_price_api: String,
    pub sol_price_ttl: Duration,
    pub sol_leg_max_amount: u64,
    pub initial_curve_tokens: u64,
    pub feed_buffer: usize,
    pub persist_buffer: usize,
    pub flush_interval: Duration,
    pub max_batch: usize,
    pub registrations_per_minute: usize,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        let geyser_url = env::var("GEYSER_URL")
            .map_err(|_| ConfigError::MissingVariable("GEYSER_URL".to_string()))?;

        if !geyser_url.starts_with("http://") && !geyser_url.starts_with("https://") {
            return Err(ConfigError::InvalidValue(
                "GEYSER_URL must start with http:// or https://".to_string(),
            ));
        }

        let x_token = env::var("X_TOKEN").ok();

        let db_path = env::var("DB_PATH")
            .map_err(|_| ConfigError::MissingVariable("DB_PATH".to_string()))?;
        if db_path.trim().is_empty() {
            return Err(ConfigError::InvalidValue("DB_PATH cannot be empty".to_string()));
        }

        let commitment_str = env::var("COMMITMENT_LEVEL").unwrap_or_else(|_| "Confirmed".to_string());
        let commitment_level = match commitment_str.to_lowercase().as_str() {
            "finalized" => CommitmentLevel::Finalized,
            "confirmed" => CommitmentLevel::Confirmed,
            "processed" => CommitmentLevel::Processed,
            _ => {
                log::warn!(
                    "Invalid COMMITMENT_LEVEL '{}', defaulting to Confirmed",
                    commitment_str
                );
                CommitmentLevel::Confirmed
            }
        };

        Ok(Self {
            geyser_url,
            x_token,
            commitment_level,
            db_path,
            sol_price_api: env::var("SOL_PRICE_API")
                .unwrap_or_else(|_| "https://api.dexscreener.com".to_string()),
            sol_price_ttl: Duration::from_secs(parse_or("SOL_PRICE_TTL_SECS", 30)),
            sol_leg_max_amount: parse_or("SOL_LEG_MAX_AMOUNT", 50_000_000_000),
            initial_curve_tokens: parse_or(
                "INITIAL_CURVE_TOKENS",
                pricing::DEFAULT_INITIAL_CURVE_TOKENS,
            ),
            feed_buffer: parse_or("FEED_BUFFER", 10_000) as usize,
            persist_buffer: parse_or("PERSIST_BUFFER", 10_000) as usize,
            flush_interval: Duration::from_millis(parse_or("FLUSH_INTERVAL_MS", 1_000)),
            max_batch: parse_or("MAX_BATCH", 256) as usize,
            registrations_per_minute: parse_or("REGISTRATIONS_PER_MINUTE", 30) as usize,
        })
    }

    pub fn monitor_config(&self) -> MonitorConfig {
        MonitorConfig {
            grpc_url: self.geyser_url.clone(),
            x_token: self.x_token.clone(),
            commitment: self.commitment_level,
            registrations_per_window: self.registrations_per_minute,
            registration_window: Duration::from_secs(60),
            ..MonitorConfig::default()
        }
    }

    pub fn tracker_config(&self) -> TrackerConfig {
        TrackerConfig {
            initial_curve_tokens: self.initial_curve_tokens,
            trade_decode: TradeDecodeParams {
                sol_leg_max_amount: self.sol_leg_max_amount,
            },
            ..TrackerConfig::default()
        }
    }

    pub fn batcher_config(&self) -> BatcherConfig {
        BatcherConfig {
            flush_interval: self.flush_interval,
            max_batch: self.max_batch,
            ..BatcherConfig::default()
        }
    }
}

fn parse_or(var: &str, default: u64) -> u64 {
    env::var(var)
        .ok()
        .and_then(|raw| raw.parse::<u64>().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    // Env-var handling is process-global, so these tests stick to the pure
    // pieces and uniquely named variables.

    #[test]
    fn test_parse_or_ignores_garbage() {
        std::env::set_var("PUMPFLOW_TEST_PARSE", "not-a-number");
        assert_eq!(parse_or("PUMPFLOW_TEST_PARSE", 7), 7);
        std::env::remove_var("PUMPFLOW_TEST_PARSE");
        assert_eq!(parse_or("PUMPFLOW_TEST_PARSE", 9), 9);
    }

    #[test]
    fn test_derived_configs_carry_tunables() {
        let config = Config {
            geyser_url: "http://localhost:10000".to_string(),
            x_token: None,
            commitment_level: CommitmentLevel::Confirmed,
            db_path: "test.db".to_string(),
            sol_price_api: "https://api.dexscreener.com".to_string(),
            sol_price_ttl: Duration::from_secs(30),
            sol_leg_max_amount: 123,
            initial_curve_tokens: 456,
            feed_buffer: 10,
            persist_buffer: 10,
            flush_interval: Duration::from_millis(500),
            max_batch: 32,
            registrations_per_minute: 12,
        };

        assert_eq!(config.tracker_config().trade_decode.sol_leg_max_amount, 123);
        assert_eq!(config.tracker_config().initial_curve_tokens, 456);
        assert_eq!(config.monitor_config().registrations_per_window, 12);
        assert_eq!(config.batcher_config().max_batch, 32);
    }
}
