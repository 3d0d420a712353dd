//! Unified error types for the median-reversion bot.

use rust_decimal::Decimal;
use thiserror::Error;

use crate::trading::position::PositionStatus;

/// Unified error type for the bot.
#[derive(Error, Debug)]
pub enum BotError {
    /// Configuration loading or validation error.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Market data error.
    #[error("market error: {0}")]
    Market(#[from] MarketError),

    /// Trading/order error.
    #[error("trading error: {0}")]
    Trading(#[from] TradingError),

    /// Position state machine violation. Always fatal for the trading loop.
    #[error("position state error: {0}")]
    State(#[from] StateError),

    /// Strategy evaluation error.
    #[error("strategy error: {0}")]
    Strategy(#[from] StrategyError),

    /// Trade recorder error.
    #[error("recorder error: {0}")]
    Recorder(#[from] RecorderError),
}

/// Configuration errors. Raised before the loop starts and never afterwards.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Environment could not be deserialized.
    #[error("failed to load environment: {0}")]
    Env(#[from] envy::Error),

    /// A value failed validation.
    #[error("invalid {field}: {reason}")]
    Invalid {
        /// Environment variable name.
        field: &'static str,
        /// Why the value was rejected.
        reason: String,
    },
}

impl ConfigError {
    pub(crate) fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        ConfigError::Invalid {
            field,
            reason: reason.into(),
        }
    }
}

/// Market data errors.
#[derive(Error, Debug)]
pub enum MarketError {
    /// The instrument does not exist on the exchange.
    #[error("market {ticker} not found")]
    NotFound {
        /// The instrument ticker.
        ticker: String,
    },

    /// Failed to fetch market information.
    #[error("failed to fetch market {ticker}: {reason}")]
    FetchFailed {
        /// The instrument ticker.
        ticker: String,
        /// Reason for failure.
        reason: String,
    },

    /// The market has no usable quote right now.
    #[error("market {ticker} has no quote")]
    NoQuote {
        /// The instrument ticker.
        ticker: String,
    },

    /// The fetch did not complete in time.
    #[error("price fetch for {ticker} timed out after {timeout_ms}ms")]
    Timeout {
        /// The instrument ticker.
        ticker: String,
        /// Timeout that elapsed.
        timeout_ms: u64,
    },

    /// Failed to parse market data.
    #[error("failed to parse market data: {0}")]
    ParseError(String),

    /// HTTP request failed.
    #[error("http request failed: {0}")]
    HttpError(#[from] reqwest::Error),
}

/// Trading and order execution errors.
#[derive(Error, Debug)]
pub enum TradingError {
    /// Order submission failed.
    #[error("order submission failed: {0}")]
    SubmissionFailed(String),

    /// Order submission or fill confirmation did not complete in time.
    #[error("order for {ticker} not resolved within {timeout_ms}ms")]
    Timeout {
        /// The instrument ticker.
        ticker: String,
        /// Timeout that elapsed.
        timeout_ms: u64,
    },

    /// Failed to get order status.
    #[error("failed to get order status for {order_id}: {reason}")]
    StatusFailed {
        /// Order ID.
        order_id: String,
        /// Reason for failure.
        reason: String,
    },

    /// Failed to get the exchange position.
    #[error("failed to get position for {ticker}: {reason}")]
    PositionFailed {
        /// The instrument ticker.
        ticker: String,
        /// Reason for failure.
        reason: String,
    },

    /// Invalid order parameters.
    #[error("invalid order parameters: {0}")]
    InvalidParams(String),

    /// Authentication failed.
    #[error("authentication failed: {0}")]
    AuthenticationFailed(String),

    /// Rate limited by the API.
    #[error("rate limited: retry after {retry_after_seconds}s")]
    RateLimited {
        /// Seconds to wait before retrying.
        retry_after_seconds: u64,
    },

    /// Order rejected by the exchange.
    #[error("order rejected: {reason}")]
    OrderRejected {
        /// Rejection reason from the exchange.
        reason: String,
    },
}

/// Position state machine violations.
///
/// These indicate a logic bug (double entry, double exit) and must stop trading
/// rather than continue against corrupted position state.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StateError {
    /// Transition not allowed from the current state.
    #[error("invalid transition: cannot {attempted} while {state}")]
    InvalidTransition {
        /// The transition that was attempted.
        attempted: &'static str,
        /// State the position was in.
        state: PositionStatus,
    },

    /// Entry parameters are not usable.
    #[error("invalid entry: {0}")]
    InvalidEntry(String),

    /// Partial close larger than the open quantity.
    #[error("cannot reduce by {quantity} contracts while holding {held}")]
    InvalidReduce {
        /// Contracts to remove.
        quantity: u32,
        /// Contracts held.
        held: u32,
    },
}

/// Strategy evaluation errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StrategyError {
    /// Median is zero or absent, so deviation is undefined.
    #[error("cannot compute deviation against median {median:?}")]
    DivisionByZero {
        /// The offending median.
        median: Option<Decimal>,
    },
}

/// Trade recorder errors.
#[derive(Error, Debug)]
pub enum RecorderError {
    /// CSV serialization or write failure.
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    /// IO error opening or flushing the log.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenient Result type alias.
pub type Result<T> = std::result::Result<T, BotError>;
