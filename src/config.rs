//! Application configuration loaded from environment variables.
//!
//! The configuration is read once at startup, validated, and then passed by
//! reference everywhere. Nothing reads the environment after that point.

use std::time::Duration;

use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer};
use strum::{Display, EnumString};

use crate::error::ConfigError;

/// How the bot comes to hold a position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, Default)]
#[strum(ascii_case_insensitive)]
pub enum EntryPolicyKind {
    /// Adopt positions the exchange reports as held.
    #[default]
    #[strum(to_string = "adopt")]
    Adopt,
    /// Never enter on its own; positions are opened explicitly.
    #[strum(to_string = "manual")]
    Manual,
}

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    // === Exchange ===
    /// Instrument ticker to manage.
    #[serde(default)]
    pub kalshi_ticker: String,

    /// REST API base URL.
    #[serde(default = "default_api_url")]
    pub kalshi_api_url: String,

    /// Bearer token for authenticated endpoints (orders, positions).
    #[serde(default)]
    pub kalshi_api_token: Option<String>,

    // === Strategy Parameters ===
    /// Rolling window size in samples.
    #[serde(rename = "mr_window", default = "default_window_size")]
    pub window_size: usize,

    /// Upward deviation from the median, in percent, that triggers an exit.
    #[serde(rename = "mr_threshold", default = "default_threshold_pct")]
    pub deviation_threshold_pct: Decimal,

    /// Maximum hold time in seconds before a forced exit.
    #[serde(rename = "mr_max_hold", default = "default_max_hold_seconds")]
    pub max_hold_seconds: u64,

    /// Seconds between decision cycles.
    #[serde(rename = "mr_refresh", default = "default_refresh_seconds")]
    pub refresh_interval_seconds: u64,

    /// Entry policy: "adopt" or "manual".
    #[serde(rename = "mr_entry_policy", default = "default_entry_policy")]
    pub entry_policy: String,

    /// Optional stop loss, percent below entry.
    #[serde(rename = "mr_stop_loss_pct", default)]
    pub stop_loss_pct: Option<Decimal>,

    /// Absolute price floor for the stop loss.
    #[serde(rename = "mr_stop_loss_floor", default)]
    pub stop_loss_floor: Decimal,

    /// Seconds a position must be held before loss stops apply.
    #[serde(rename = "mr_min_hold", default)]
    pub min_hold_seconds: u64,

    /// Exit once P&L falls to minus this many percent.
    #[serde(rename = "mr_max_loss_pct", default)]
    pub max_loss_pct: Option<Decimal>,

    /// Exit a losing position held this many seconds.
    #[serde(rename = "mr_losing_stop_secs", default)]
    pub losing_stop_seconds: Option<u64>,

    /// Exit a position near break-even after this many seconds.
    #[serde(rename = "mr_break_even_secs", default)]
    pub break_even_seconds: Option<u64>,

    /// Enable the tiered trailing stop.
    #[serde(rename = "mr_trailing_stop", default, deserialize_with = "deserialize_flag")]
    pub trailing_stop: bool,

    /// Cycles between exchange position reconciliations.
    #[serde(rename = "mr_reconcile_every", default = "default_reconcile_every")]
    pub reconcile_every_cycles: u64,

    // === Operation Modes ===
    /// Simulate fills instead of sending orders.
    #[serde(default, deserialize_with = "deserialize_flag")]
    pub paper_trading: bool,

    // === Timeouts ===
    /// Per-request HTTP timeout in milliseconds.
    #[serde(default = "default_http_timeout_ms")]
    pub http_timeout_ms: u64,

    /// Upper bound on a price fetch in milliseconds.
    #[serde(default = "default_fetch_timeout_ms")]
    pub fetch_timeout_ms: u64,

    /// Upper bound on order submission plus fill confirmation in milliseconds.
    #[serde(default = "default_order_timeout_ms")]
    pub order_timeout_ms: u64,

    /// Poll interval while waiting on a pending order in milliseconds.
    #[serde(default = "default_order_poll_interval_ms")]
    pub order_poll_interval_ms: u64,

    // === Trade Log ===
    /// CSV log for live trading.
    #[serde(default = "default_log_file")]
    pub kalshi_log_file: String,

    /// CSV log for paper trading.
    #[serde(default = "default_simulated_log_file")]
    pub simulated_trades_log: String,

    // === Server Configuration ===
    /// HTTP server port for health/status/metrics endpoints.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub rust_log: String,
}

/// Accept the usual spellings of a boolean flag: true/false, 1/0, yes/no, on/off.
fn deserialize_flag<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" | "" => Ok(false),
        other => Err(serde::de::Error::custom(format!(
            "expected a boolean flag, got {:?}",
            other
        ))),
    }
}

fn default_api_url() -> String {
    "https://api.elections.kalshi.com/trade-api/v2".to_string()
}

fn default_window_size() -> usize {
    15
}

fn default_threshold_pct() -> Decimal {
    Decimal::new(50, 1) // 5.0%
}

fn default_max_hold_seconds() -> u64 {
    60 * 60
}

fn default_refresh_seconds() -> u64 {
    2
}

fn default_entry_policy() -> String {
    "adopt".to_string()
}

fn default_reconcile_every() -> u64 {
    5
}

fn default_http_timeout_ms() -> u64 {
    2000
}

fn default_fetch_timeout_ms() -> u64 {
    3000
}

fn default_order_timeout_ms() -> u64 {
    5000
}

fn default_order_poll_interval_ms() -> u64 {
    250
}

fn default_log_file() -> String {
    "trading_log.csv".to_string()
}

fn default_simulated_log_file() -> String {
    "simulated_trades.csv".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            kalshi_ticker: String::new(),
            kalshi_api_url: default_api_url(),
            kalshi_api_token: None,
            window_size: default_window_size(),
            deviation_threshold_pct: default_threshold_pct(),
            max_hold_seconds: default_max_hold_seconds(),
            refresh_interval_seconds: default_refresh_seconds(),
            entry_policy: default_entry_policy(),
            stop_loss_pct: None,
            stop_loss_floor: Decimal::ZERO,
            min_hold_seconds: 0,
            max_loss_pct: None,
            losing_stop_seconds: None,
            break_even_seconds: None,
            trailing_stop: false,
            reconcile_every_cycles: default_reconcile_every(),
            paper_trading: false,
            http_timeout_ms: default_http_timeout_ms(),
            fetch_timeout_ms: default_fetch_timeout_ms(),
            order_timeout_ms: default_order_timeout_ms(),
            order_poll_interval_ms: default_order_poll_interval_ms(),
            kalshi_log_file: default_log_file(),
            simulated_trades_log: default_simulated_log_file(),
            port: default_port(),
            rust_log: default_log_level(),
        }
    }
}

impl Config {
    /// Load configuration from environment, reading .env file first.
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Ok(envy::from_env()?)
    }

    /// Load and validate in one step. Any failure is startup-fatal.
    pub fn load_validated() -> Result<Self, ConfigError> {
        let config = Self::load()?;
        config.validate()?;
        Ok(config)
    }

    /// Check that every value is usable before the loop starts.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.kalshi_ticker.trim().is_empty() {
            return Err(ConfigError::invalid("KALSHI_TICKER", "is required"));
        }

        if self.window_size == 0 {
            return Err(ConfigError::invalid("MR_WINDOW", "must be a positive integer"));
        }

        if self.deviation_threshold_pct <= Decimal::ZERO {
            return Err(ConfigError::invalid(
                "MR_THRESHOLD",
                format!("must be positive, got {}", self.deviation_threshold_pct),
            ));
        }

        if self.max_hold_seconds == 0 {
            return Err(ConfigError::invalid("MR_MAX_HOLD", "must be a positive integer"));
        }

        if self.refresh_interval_seconds == 0 {
            return Err(ConfigError::invalid("MR_REFRESH", "must be a positive integer"));
        }

        if self.reconcile_every_cycles == 0 {
            return Err(ConfigError::invalid(
                "MR_RECONCILE_EVERY",
                "must be a positive integer",
            ));
        }

        self.entry_policy_kind()?;

        if let Some(pct) = self.stop_loss_pct {
            if pct <= Decimal::ZERO || pct >= Decimal::ONE_HUNDRED {
                return Err(ConfigError::invalid(
                    "MR_STOP_LOSS_PCT",
                    format!("must be between 0 and 100 exclusive, got {}", pct),
                ));
            }
        }

        if self.stop_loss_floor < Decimal::ZERO {
            return Err(ConfigError::invalid("MR_STOP_LOSS_FLOOR", "must be non-negative"));
        }

        if let Some(pct) = self.max_loss_pct {
            if pct <= Decimal::ZERO || pct >= Decimal::ONE_HUNDRED {
                return Err(ConfigError::invalid(
                    "MR_MAX_LOSS_PCT",
                    format!("must be between 0 and 100 exclusive, got {}", pct),
                ));
            }
        }

        for (field, value) in [
            ("MR_LOSING_STOP_SECS", self.losing_stop_seconds),
            ("MR_BREAK_EVEN_SECS", self.break_even_seconds),
        ] {
            if value == Some(0) {
                return Err(ConfigError::invalid(field, "must be a positive integer when set"));
            }
        }

        for (field, value) in [
            ("HTTP_TIMEOUT_MS", self.http_timeout_ms),
            ("FETCH_TIMEOUT_MS", self.fetch_timeout_ms),
            ("ORDER_TIMEOUT_MS", self.order_timeout_ms),
            ("ORDER_POLL_INTERVAL_MS", self.order_poll_interval_ms),
        ] {
            if value == 0 {
                return Err(ConfigError::invalid(field, "must be a positive integer"));
            }
        }

        if !self.paper_trading && self.kalshi_api_token.is_none() {
            return Err(ConfigError::invalid(
                "KALSHI_API_TOKEN",
                "is required unless PAPER_TRADING is enabled",
            ));
        }

        Ok(())
    }

    /// Parsed entry policy.
    pub fn entry_policy_kind(&self) -> Result<EntryPolicyKind, ConfigError> {
        self.entry_policy.parse().map_err(|_| {
            ConfigError::invalid(
                "MR_ENTRY_POLICY",
                format!("expected adopt or manual, got {:?}", self.entry_policy),
            )
        })
    }

    /// Maximum hold duration.
    pub fn max_hold(&self) -> Duration {
        Duration::from_secs(self.max_hold_seconds)
    }

    /// Delay between decision cycles.
    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_seconds)
    }

    /// Price fetch timeout.
    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_millis(self.fetch_timeout_ms)
    }

    /// Order submission timeout.
    pub fn order_timeout(&self) -> Duration {
        Duration::from_millis(self.order_timeout_ms)
    }

    /// Pending order poll interval.
    pub fn order_poll_interval(&self) -> Duration {
        Duration::from_millis(self.order_poll_interval_ms)
    }

    /// Trade log path for the current mode.
    pub fn trade_log_path(&self) -> &str {
        if self.paper_trading {
            &self.simulated_trades_log
        } else {
            &self.kalshi_log_file
        }
    }
}
