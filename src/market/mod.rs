//! Market module for a single Kalshi contract.
//!
//! This module handles:
//! - Price sample and exchange position types
//! - The market data collaborator interface
//! - Kalshi API client
//! - Scripted collaborators for testing

pub mod client;
pub mod mock;
pub mod source;
pub mod types;

pub use client::KalshiClient;
pub use mock::{MockMarketData, MockOrderExecutor};
pub use source::MarketDataSource;
pub use types::{ExchangePosition, MarketInfo, PriceSample};
