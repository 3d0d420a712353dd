//! Order execution collaborator interfaces.

use async_trait::async_trait;

use super::order::{OrderParams, OrderResult};
use crate::error::TradingError;
use crate::market::ExchangePosition;

/// Read-only view of the exchange-reported position.
#[async_trait]
pub trait PositionSource: Send + Sync {
    /// Position held in `instrument_id`, `None` when flat.
    async fn fetch_position(
        &self,
        instrument_id: &str,
    ) -> Result<Option<ExchangePosition>, TradingError>;
}

/// Submits orders and reports their outcome.
#[async_trait]
pub trait OrderExecutor: PositionSource {
    /// Submit an order. A `Pending` result is polled with [`order_status`].
    ///
    /// [`order_status`]: OrderExecutor::order_status
    async fn submit_order(&self, params: &OrderParams) -> Result<OrderResult, TradingError>;

    /// Current status of a previously submitted order.
    async fn order_status(&self, order_id: &str) -> Result<OrderResult, TradingError>;

    /// Cancel a resting order. The returned state may carry contracts that
    /// executed before the cancel took effect.
    async fn cancel_order(&self, order_id: &str) -> Result<OrderResult, TradingError>;

    /// True when fills are simulated.
    fn is_paper_mode(&self) -> bool;
}
