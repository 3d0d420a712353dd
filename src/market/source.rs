//! Market data collaborator interface.

use async_trait::async_trait;

use super::types::PriceSample;
use crate::error::MarketError;

/// Source of live prices for an instrument.
///
/// Implementations must not retry internally for long; the decision loop
/// bounds every call with its own timeout and treats a failure as a no-op cycle.
#[async_trait]
pub trait MarketDataSource: Send + Sync {
    /// Fetch the current price of `instrument_id`.
    async fn fetch_price(&self, instrument_id: &str) -> Result<PriceSample, MarketError>;
}
