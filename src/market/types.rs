//! Market-related types for a single prediction-market contract.

use rust_decimal::Decimal;
use time::OffsetDateTime;

/// One observed price for the managed instrument.
///
/// Immutable once recorded. The price is the best YES bid in dollars, which is
/// what a sell would execute against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PriceSample {
    /// When the price was observed.
    pub timestamp: OffsetDateTime,
    /// Observed price.
    pub price: Decimal,
}

impl PriceSample {
    /// Create a sample.
    pub fn new(timestamp: OffsetDateTime, price: Decimal) -> Self {
        Self { timestamp, price }
    }

    /// Create a sample stamped with the current time.
    pub fn now(price: Decimal) -> Self {
        Self::new(OffsetDateTime::now_utc(), price)
    }
}

/// Position in the instrument as reported by the exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExchangePosition {
    /// Instrument ticker.
    pub instrument_id: String,
    /// Contracts held (always positive; flat positions are reported as `None`).
    pub quantity: u32,
    /// Average cost per contract, when the exchange reports one.
    pub avg_price: Option<Decimal>,
}

/// Descriptive market info, used by the CLI diagnostics.
#[derive(Debug, Clone)]
pub struct MarketInfo {
    /// Instrument ticker.
    pub ticker: String,
    /// Market title.
    pub title: Option<String>,
    /// Market status string (e.g. "active").
    pub status: Option<String>,
    /// Best YES bid in dollars.
    pub yes_bid: Option<Decimal>,
    /// Best YES ask in dollars.
    pub yes_ask: Option<Decimal>,
}
