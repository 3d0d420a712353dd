//! Simulated order execution.
//!
//! Fills are deterministic: every valid order fills immediately at its
//! reference price with no fee. The simulated book is layered on top of an
//! optional upstream position source so that a real position opened by hand
//! can be managed without sending orders.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rust_decimal::Decimal;
use tracing::{info, instrument};

use super::executor::{OrderExecutor, PositionSource};
use super::order::{OrderParams, OrderResult, Side};
use crate::error::TradingError;
use crate::market::ExchangePosition;

#[derive(Debug, Clone, Default)]
struct SimulatedHolding {
    /// Net contracts bought minus sold. May go negative against an upstream position.
    net_quantity: i64,
    avg_price: Option<Decimal>,
}

/// Paper-trading executor.
pub struct PaperExecutor {
    upstream: Option<Arc<dyn PositionSource>>,
    book: Mutex<HashMap<String, SimulatedHolding>>,
    fills: Mutex<HashMap<String, OrderResult>>,
    next_id: AtomicU64,
}

impl PaperExecutor {
    /// Executor with an empty simulated book and no upstream.
    pub fn new() -> Self {
        Self {
            upstream: None,
            book: Mutex::new(HashMap::new()),
            fills: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Report positions from `upstream` in addition to simulated fills.
    pub fn with_upstream(mut self, upstream: Arc<dyn PositionSource>) -> Self {
        self.upstream = Some(upstream);
        self
    }

    /// Seed a simulated holding.
    pub fn with_position(self, instrument_id: &str, quantity: u32, avg_price: Decimal) -> Self {
        if let Ok(mut book) = self.book.lock() {
            book.insert(
                instrument_id.to_string(),
                SimulatedHolding {
                    net_quantity: i64::from(quantity),
                    avg_price: Some(avg_price),
                },
            );
        }
        self
    }

    fn next_order_id(&self) -> String {
        format!("paper-{}", self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    fn lock_err<T>(_: T) -> TradingError {
        TradingError::SubmissionFailed("paper book lock poisoned".to_string())
    }
}

impl Default for PaperExecutor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PositionSource for PaperExecutor {
    async fn fetch_position(
        &self,
        instrument_id: &str,
    ) -> Result<Option<ExchangePosition>, TradingError> {
        let upstream = match &self.upstream {
            Some(source) => source.fetch_position(instrument_id).await?,
            None => None,
        };

        let simulated = self
            .book
            .lock()
            .map_err(Self::lock_err)?
            .get(instrument_id)
            .cloned()
            .unwrap_or_default();

        let upstream_qty = upstream.as_ref().map_or(0, |p| i64::from(p.quantity));
        let total = upstream_qty + simulated.net_quantity;
        if total <= 0 {
            return Ok(None);
        }

        let avg_price = upstream
            .and_then(|p| p.avg_price)
            .or(simulated.avg_price);

        Ok(Some(ExchangePosition {
            instrument_id: instrument_id.to_string(),
            quantity: u32::try_from(total).unwrap_or(u32::MAX),
            avg_price,
        }))
    }
}

#[async_trait]
impl OrderExecutor for PaperExecutor {
    #[instrument(skip(self, params), fields(ticker = %params.instrument_id, side = %params.side))]
    async fn submit_order(&self, params: &OrderParams) -> Result<OrderResult, TradingError> {
        params.validate().map_err(TradingError::InvalidParams)?;

        let order_id = self.next_order_id();
        let result = OrderResult::filled(
            &order_id,
            params.quantity,
            params.reference_price,
            Decimal::ZERO,
        );

        {
            let mut book = self.book.lock().map_err(Self::lock_err)?;
            let holding = book.entry(params.instrument_id.clone()).or_default();
            let qty = i64::from(params.quantity);
            match params.side {
                Side::Buy => {
                    holding.net_quantity += qty;
                    holding.avg_price = Some(params.reference_price);
                }
                Side::Sell => holding.net_quantity -= qty,
            }
        }

        self.fills
            .lock()
            .map_err(Self::lock_err)?
            .insert(order_id.clone(), result.clone());

        info!(
            order_id = %order_id,
            quantity = params.quantity,
            price = %params.reference_price,
            "Paper order filled"
        );

        Ok(result)
    }

    async fn order_status(&self, order_id: &str) -> Result<OrderResult, TradingError> {
        self.fills
            .lock()
            .map_err(Self::lock_err)?
            .get(order_id)
            .cloned()
            .ok_or_else(|| TradingError::StatusFailed {
                order_id: order_id.to_string(),
                reason: "unknown paper order".to_string(),
            })
    }

    async fn cancel_order(&self, order_id: &str) -> Result<OrderResult, TradingError> {
        // Paper orders fill on submission, so there is never anything to cancel.
        self.order_status(order_id).await
    }

    fn is_paper_mode(&self) -> bool {
        true
    }
}
