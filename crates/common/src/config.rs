use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

pub const DEFAULT_COINEX_BASE_URL: &str = "https://api.coinex.com";
pub const DEFAULT_TOOBIT_BASE_URL: &str = "https://api.toobit.com";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value for {key}: {value:?}")]
    InvalidValue { key: &'static str, value: String },
}

/// What a cancelled execution does to the orders it already placed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CancelPolicy {
    /// Stop watching. Resting orders and positions stay exactly as they are.
    #[default]
    LeaveAsIs,
    /// Best-effort cancel of resting orders when cancelled before the position opened.
    CancelRestingOrders,
}

impl FromStr for CancelPolicy {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "leave" | "leave-as-is" | "none" => Ok(CancelPolicy::LeaveAsIs),
            "cancel-orders" | "cancel" => Ok(CancelPolicy::CancelRestingOrders),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub telegram_token: Option<String>,
    pub subscriptions_path: PathBuf,
    pub poll_interval: Duration,
    pub sweep_interval: Duration,
    pub feed_interval: Duration,
    pub cancel_policy: CancelPolicy,
    pub coinex_base_url: String,
    pub toobit_base_url: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            telegram_token: None,
            subscriptions_path: PathBuf::from("subscriptions.json"),
            poll_interval: Duration::from_millis(1000),
            sweep_interval: Duration::from_millis(1000),
            feed_interval: Duration::from_millis(1000),
            cancel_policy: CancelPolicy::default(),
            coinex_base_url: DEFAULT_COINEX_BASE_URL.to_string(),
            toobit_base_url: DEFAULT_TOOBIT_BASE_URL.to_string(),
        }
    }
}

impl Settings {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let telegram_token = lookup("TELEGRAM_BOT_TOKEN").filter(|t| !t.trim().is_empty());

        let subscriptions_path = lookup("SUBSCRIPTIONS_PATH")
            .map(PathBuf::from)
            .unwrap_or(defaults.subscriptions_path);

        let poll_interval = millis(&lookup, "POLL_INTERVAL_MS")?.unwrap_or(defaults.poll_interval);
        let sweep_interval =
            millis(&lookup, "SWEEP_INTERVAL_MS")?.unwrap_or(defaults.sweep_interval);
        let feed_interval = millis(&lookup, "FEED_INTERVAL_MS")?.unwrap_or(defaults.feed_interval);

        let cancel_policy = match lookup("CANCEL_POLICY") {
            Some(raw) => raw.parse().map_err(|_| ConfigError::InvalidValue {
                key: "CANCEL_POLICY",
                value: raw,
            })?,
            None => defaults.cancel_policy,
        };

        Ok(Self {
            telegram_token,
            subscriptions_path,
            poll_interval,
            sweep_interval,
            feed_interval,
            cancel_policy,
            coinex_base_url: lookup("COINEX_BASE_URL").unwrap_or(defaults.coinex_base_url),
            toobit_base_url: lookup("TOOBIT_BASE_URL").unwrap_or(defaults.toobit_base_url),
        })
    }
}

// Zero is refused: a zero interval turns every poll loop into a busy loop.
fn millis<F>(lookup: &F, key: &'static str) -> Result<Option<Duration>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let Some(raw) = lookup(key) else {
        return Ok(None);
    };

    match raw.trim().parse::<u64>() {
        Ok(ms) if ms > 0 => Ok(Some(Duration::from_millis(ms))),
        _ => Err(ConfigError::InvalidValue { key, value: raw }),
    }
}
