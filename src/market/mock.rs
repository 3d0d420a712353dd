//! Scripted collaborators for tests.
//!
//! These never touch the network. Prices, order outcomes and the exchange
//! position are set up front, and every call is recorded for assertions.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use rust_decimal::Decimal;
use time::macros::datetime;
use time::OffsetDateTime;

use super::source::MarketDataSource;
use super::types::{ExchangePosition, PriceSample};
use crate::error::{MarketError, TradingError};
use crate::trading::{OrderExecutor, OrderParams, OrderResult, OrderStatus, PositionSource, Side};

/// Start of the synthetic clock used by [`MockMarketData::new`].
pub const MOCK_EPOCH: OffsetDateTime = datetime!(2025-01-01 00:00 UTC);

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[derive(Debug)]
struct MarketScript {
    queue: VecDeque<Result<PriceSample, String>>,
    clock: OffsetDateTime,
    step: time::Duration,
    latency: Option<Duration>,
    fetches: u32,
}

/// Market data source that replays a scripted price sequence.
///
/// Each pushed price is stamped with a synthetic clock that advances by
/// `step` per push, so the decision loop sees deterministic timestamps.
#[derive(Debug, Clone)]
pub struct MockMarketData {
    script: Arc<Mutex<MarketScript>>,
}

impl MockMarketData {
    /// Script starting at [`MOCK_EPOCH`], advancing `step` per price.
    pub fn new(step: time::Duration) -> Self {
        Self::starting_at(MOCK_EPOCH, step)
    }

    /// Script starting at `start`.
    pub fn starting_at(start: OffsetDateTime, step: time::Duration) -> Self {
        Self {
            script: Arc::new(Mutex::new(MarketScript {
                queue: VecDeque::new(),
                clock: start,
                step,
                latency: None,
                fetches: 0,
            })),
        }
    }

    /// Queue a price at the next clock tick.
    pub fn push_price(&self, price: Decimal) -> OffsetDateTime {
        let mut script = lock(&self.script);
        let at = script.clock;
        script.queue.push_back(Ok(PriceSample::new(at, price)));
        script.clock = at + script.step;
        at
    }

    /// Queue several prices.
    pub fn push_prices(&self, prices: &[Decimal]) {
        for price in prices {
            self.push_price(*price);
        }
    }

    /// Queue a failed fetch. The clock still advances.
    pub fn push_failure(&self, reason: impl Into<String>) {
        let mut script = lock(&self.script);
        script.queue.push_back(Err(reason.into()));
        script.clock = script.clock + script.step;
    }

    /// Timestamp the next pushed price will carry.
    pub fn next_timestamp(&self) -> OffsetDateTime {
        lock(&self.script).clock
    }

    /// Delay every fetch.
    pub fn set_latency(&self, latency: Duration) {
        lock(&self.script).latency = Some(latency);
    }

    /// Number of fetches made so far.
    pub fn fetch_count(&self) -> u32 {
        lock(&self.script).fetches
    }

    /// Scripted entries not yet consumed.
    pub fn remaining(&self) -> usize {
        lock(&self.script).queue.len()
    }
}

#[async_trait]
impl MarketDataSource for MockMarketData {
    async fn fetch_price(&self, instrument_id: &str) -> Result<PriceSample, MarketError> {
        let latency = lock(&self.script).latency;
        if let Some(delay) = latency {
            tokio::time::sleep(delay).await;
        }

        let mut script = lock(&self.script);
        script.fetches += 1;
        match script.queue.pop_front() {
            Some(Ok(sample)) => Ok(sample),
            Some(Err(reason)) => Err(MarketError::FetchFailed {
                ticker: instrument_id.to_string(),
                reason,
            }),
            None => Err(MarketError::FetchFailed {
                ticker: instrument_id.to_string(),
                reason: "mock script exhausted".to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone)]
struct MockOrder {
    params: OrderParams,
    polls_until_fill: u32,
    result: OrderResult,
}

#[derive(Debug, Default)]
struct ExecutorScript {
    position: Option<ExchangePosition>,
    fail_positions: bool,
    fail_submissions: u32,
    reject_submissions: u32,
    pending_polls: u32,
    partial_fill: Option<u32>,
    fee: Decimal,
    latency: Option<Duration>,
    status_latency: Option<Duration>,
    paper: bool,
    submitted: Vec<OrderParams>,
    cancelled: Vec<String>,
    orders: HashMap<String, MockOrder>,
    next_id: u64,
}

impl ExecutorScript {
    fn apply_fill(&mut self, params: &OrderParams, filled: u32) {
        let current = self.position.as_ref().map_or(0, |p| p.quantity);
        let quantity = match params.side {
            Side::Buy => current.saturating_add(filled),
            Side::Sell => current.saturating_sub(filled),
        };

        self.position = if quantity == 0 {
            None
        } else {
            let avg_price = self
                .position
                .as_ref()
                .and_then(|p| p.avg_price)
                .or(Some(params.reference_price));
            Some(ExchangePosition {
                instrument_id: params.instrument_id.clone(),
                quantity,
                avg_price,
            })
        };
    }
}

/// Order executor with scripted outcomes.
///
/// By default every order fills immediately at its reference price and the
/// exchange position is updated to match.
#[derive(Debug, Clone, Default)]
pub struct MockOrderExecutor {
    script: Arc<Mutex<ExecutorScript>>,
}

impl MockOrderExecutor {
    /// Executor that fills everything.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the exchange-reported position.
    pub fn set_position(&self, position: Option<ExchangePosition>) {
        lock(&self.script).position = position;
    }

    /// Convenience for a held position.
    pub fn hold(&self, instrument_id: &str, quantity: u32, avg_price: Decimal) {
        self.set_position(Some(ExchangePosition {
            instrument_id: instrument_id.to_string(),
            quantity,
            avg_price: Some(avg_price),
        }));
    }

    /// Make position queries fail.
    pub fn fail_positions(&self, fail: bool) {
        lock(&self.script).fail_positions = fail;
    }

    /// Fail the next `n` submissions with a transport error.
    pub fn fail_next_submissions(&self, n: u32) {
        lock(&self.script).fail_submissions = n;
    }

    /// Reject the next `n` submissions.
    pub fn reject_next_orders(&self, n: u32) {
        lock(&self.script).reject_submissions = n;
    }

    /// Report each new order as pending for `polls` status queries.
    pub fn set_pending_polls(&self, polls: u32) {
        lock(&self.script).pending_polls = polls;
    }

    /// Cancel the next submission after `filled` of its contracts execute.
    pub fn partial_fill_next(&self, filled: u32) {
        lock(&self.script).partial_fill = Some(filled);
    }

    /// Let every pending order fill on its next status query.
    pub fn release_pending_orders(&self) {
        let mut script = lock(&self.script);
        for order in script.orders.values_mut() {
            order.polls_until_fill = 0;
        }
    }

    /// Fee charged per fill.
    pub fn set_fee(&self, fee: Decimal) {
        lock(&self.script).fee = fee;
    }

    /// Delay every submission.
    pub fn set_latency(&self, latency: Duration) {
        lock(&self.script).latency = Some(latency);
    }

    /// Delay every status query and cancel.
    pub fn set_status_latency(&self, latency: Duration) {
        lock(&self.script).status_latency = Some(latency);
    }

    /// Report paper mode.
    pub fn set_paper_mode(&self, paper: bool) {
        lock(&self.script).paper = paper;
    }

    /// Every order submitted so far, in order.
    pub fn submitted_orders(&self) -> Vec<OrderParams> {
        lock(&self.script).submitted.clone()
    }

    /// Order ids cancelled so far.
    pub fn cancelled_orders(&self) -> Vec<String> {
        lock(&self.script).cancelled.clone()
    }

    /// Current exchange-reported position.
    pub fn position(&self) -> Option<ExchangePosition> {
        lock(&self.script).position.clone()
    }
}

#[async_trait]
impl PositionSource for MockOrderExecutor {
    async fn fetch_position(
        &self,
        instrument_id: &str,
    ) -> Result<Option<ExchangePosition>, TradingError> {
        let script = lock(&self.script);
        if script.fail_positions {
            return Err(TradingError::PositionFailed {
                ticker: instrument_id.to_string(),
                reason: "mock position failure".to_string(),
            });
        }
        Ok(script
            .position
            .clone()
            .filter(|p| p.instrument_id == instrument_id))
    }
}

#[async_trait]
impl OrderExecutor for MockOrderExecutor {
    async fn submit_order(&self, params: &OrderParams) -> Result<OrderResult, TradingError> {
        let latency = lock(&self.script).latency;
        if let Some(delay) = latency {
            tokio::time::sleep(delay).await;
        }

        let mut script = lock(&self.script);
        script.submitted.push(params.clone());

        if script.fail_submissions > 0 {
            script.fail_submissions -= 1;
            return Err(TradingError::SubmissionFailed("mock submission failure".to_string()));
        }

        script.next_id += 1;
        let order_id = format!("mock-{}", script.next_id);

        if script.reject_submissions > 0 {
            script.reject_submissions -= 1;
            return Ok(OrderResult::rejected(order_id, "mock rejection"));
        }

        let result = if let Some(filled) = script.partial_fill.take() {
            let filled = filled.min(params.quantity);
            script.apply_fill(params, filled);
            OrderResult::partially_filled(&order_id, filled, params.reference_price, script.fee)
        } else if script.pending_polls > 0 {
            OrderResult::pending(&order_id)
        } else {
            script.apply_fill(params, params.quantity);
            OrderResult::filled(&order_id, params.quantity, params.reference_price, script.fee)
        };

        let polls_until_fill = script.pending_polls;
        script.orders.insert(
            order_id,
            MockOrder {
                params: params.clone(),
                polls_until_fill,
                result: result.clone(),
            },
        );

        Ok(result)
    }

    async fn order_status(&self, order_id: &str) -> Result<OrderResult, TradingError> {
        let latency = lock(&self.script).status_latency;
        if let Some(delay) = latency {
            tokio::time::sleep(delay).await;
        }

        let mut script = lock(&self.script);
        let fee = script.fee;

        let mut order = script
            .orders
            .get(order_id)
            .cloned()
            .ok_or_else(|| TradingError::StatusFailed {
                order_id: order_id.to_string(),
                reason: "unknown mock order".to_string(),
            })?;

        if order.result.status == OrderStatus::Pending {
            if order.polls_until_fill > 0 {
                order.polls_until_fill -= 1;
            }
            if order.polls_until_fill == 0 {
                script.apply_fill(&order.params, order.params.quantity);
                order.result = OrderResult::filled(
                    order_id,
                    order.params.quantity,
                    order.params.reference_price,
                    fee,
                );
            }
        }

        let result = order.result.clone();
        script.orders.insert(order_id.to_string(), order);
        Ok(result)
    }

    async fn cancel_order(&self, order_id: &str) -> Result<OrderResult, TradingError> {
        let latency = lock(&self.script).status_latency;
        if let Some(delay) = latency {
            tokio::time::sleep(delay).await;
        }

        let mut script = lock(&self.script);
        let order = script
            .orders
            .get_mut(order_id)
            .ok_or_else(|| TradingError::StatusFailed {
                order_id: order_id.to_string(),
                reason: "unknown mock order".to_string(),
            })?;

        if order.result.status == OrderStatus::Pending {
            order.result = OrderResult::rejected(order_id, "cancelled");
        }
        let result = order.result.clone();
        script.cancelled.push(order_id.to_string());
        Ok(result)
    }

    fn is_paper_mode(&self) -> bool {
        lock(&self.script).paper
    }
}
