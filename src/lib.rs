//! Median-reversion exit bot for a single Kalshi contract.
//!
//! The bot watches the best YES bid of one contract, keeps a rolling median of
//! the last N prices, and sells a held position when the price rises far
//! enough above that median. A maximum hold time forces the exit otherwise.
//!
//! # Strategy
//!
//! ```text
//! window:    [0.50, 0.51, 0.50, 0.49, 0.50]   median = 0.50
//! price:     0.53
//! deviation: (0.53 - 0.50) / 0.50 = +6.0%  >= 5.0%  -> EXIT_THRESHOLD
//! ```
//!
//! # Modules
//!
//! - [`config`]: Configuration loading from environment
//! - [`error`]: Unified error types
//! - [`market`]: Price samples, Kalshi client and scripted mocks
//! - [`strategy`]: Rolling window, exit rules and entry policies
//! - [`trading`]: Orders, executors and the position state machine
//! - [`engine`]: The polling decision loop
//! - [`recorder`]: Append-only trade log
//! - [`api`]: HTTP API for health/status/metrics
//! - [`metrics`]: Prometheus metric names and helpers
//! - [`utils`]: Shutdown signal handling

pub mod api;
pub mod config;
pub mod engine;
pub mod error;
pub mod market;
pub mod metrics;
pub mod recorder;
pub mod strategy;
pub mod trading;
pub mod utils;

pub use config::Config;
pub use engine::{DecisionEvent, TradeDecisionLoop};
pub use error::{BotError, Result};
