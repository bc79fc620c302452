//! Engine configuration loaded from environment variables.
//!
//! Follows 12-factor style: all settings come from environment variables
//! (or a `.env` file via `dotenvy`), with working defaults for every key.

use std::time::Duration;

use crate::domain::WalletAddress;
use crate::error::TandaError;

const DEFAULT_POOL_WALLET: &str = "https://wallet.example/tanda-pool";
const DEFAULT_INVITE_BASE_URL: &str = "http://localhost:3001";

/// Top-level engine configuration.
///
/// Loaded once at startup via [`EngineConfig::from_env`].
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Server-owned wallet that holds each round's pool.
    pub pool_wallet: WalletAddress,

    /// Upper bound in seconds for any single payment-gateway call; the
    /// per-tanda exclusive section is held across that call, so this
    /// bound is what keeps the section from being held indefinitely.
    pub gateway_timeout_secs: u64,

    /// Capacity of the event-bus broadcast channel.
    pub event_bus_capacity: usize,

    /// Base URL embedded into shareable invite links.
    pub invite_base_url: String,
}

impl EngineConfig {
    /// Loads configuration from environment variables.
    ///
    /// Falls back to defaults when a variable is not set. Calls
    /// `dotenvy::dotenv().ok()` to optionally load a `.env` file.
    ///
    /// # Errors
    ///
    /// Returns [`TandaError::InvalidConfig`] if `POOL_WALLET_URL` is set
    /// but empty, or `GATEWAY_TIMEOUT_SECS` is zero.
    pub fn from_env() -> Result<Self, TandaError> {
        dotenvy::dotenv().ok();

        let pool_wallet = WalletAddress::from(
            std::env::var("POOL_WALLET_URL").unwrap_or_else(|_| DEFAULT_POOL_WALLET.to_string()),
        );
        if pool_wallet.is_empty() {
            return Err(TandaError::InvalidConfig(
                "POOL_WALLET_URL must not be empty".to_string(),
            ));
        }

        let gateway_timeout_secs = parse_env("GATEWAY_TIMEOUT_SECS", 30);
        if gateway_timeout_secs == 0 {
            return Err(TandaError::InvalidConfig(
                "GATEWAY_TIMEOUT_SECS must be positive".to_string(),
            ));
        }

        let event_bus_capacity = parse_env("EVENT_BUS_CAPACITY", 10_000);
        let invite_base_url = std::env::var("INVITE_BASE_URL")
            .unwrap_or_else(|_| DEFAULT_INVITE_BASE_URL.to_string());

        Ok(Self {
            pool_wallet,
            gateway_timeout_secs,
            event_bus_capacity,
            invite_base_url,
        })
    }

    /// The gateway bound as a [`Duration`].
    #[must_use]
    pub const fn gateway_timeout(&self) -> Duration {
        Duration::from_secs(self.gateway_timeout_secs)
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            pool_wallet: WalletAddress::from(DEFAULT_POOL_WALLET),
            gateway_timeout_secs: 30,
            event_bus_capacity: 10_000,
            invite_base_url: DEFAULT_INVITE_BASE_URL.to_string(),
        }
    }
}

/// Parses an environment variable as `T`, returning `default` on missing
/// or invalid values.
fn parse_env<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
