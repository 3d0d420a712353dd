//! Order submission with bounded fill confirmation.

use std::time::Duration;

use tokio::time::{sleep, timeout, Instant};
use tracing::{debug, info, instrument, warn};

use super::executor::OrderExecutor;
use super::order::{OrderParams, OrderResult};
use crate::error::TradingError;
use crate::metrics;

/// Poll for order status until terminal or timeout.
///
/// Returns the last known state; a result that is still `Pending` means the
/// order did not resolve within `limit`. Each status query is cut off at the
/// time left, so a hung request cannot stretch the wait.
#[instrument(skip(executor), fields(order_id = %order_id))]
pub async fn wait_for_terminal_order<E: OrderExecutor + ?Sized>(
    executor: &E,
    order_id: &str,
    limit: Duration,
    poll_interval: Duration,
) -> OrderResult {
    let start = Instant::now();

    loop {
        let left = limit.saturating_sub(start.elapsed());
        match timeout(left, executor.order_status(order_id)).await {
            Ok(Ok(state)) if state.status.is_terminal() => return state,
            Ok(Ok(_)) => {}
            Ok(Err(e)) => {
                warn!(error = %e, "Error getting order status");
            }
            Err(_) => {
                warn!(timeout_ms = limit.as_millis() as u64, "Order status query timed out");
            }
        }

        if start.elapsed() >= limit {
            warn!("Order status polling timed out");
            return OrderResult::pending(order_id);
        }

        sleep(poll_interval).await;
    }
}

/// Submit an order and wait for it to resolve, all within `order_timeout`.
///
/// `Ok` carries a terminal result, or a `Pending` one if the exchange accepted
/// the order but never reported a fill in time.
#[instrument(skip(executor, params), fields(ticker = %params.instrument_id, side = %params.side, qty = params.quantity))]
pub async fn submit_and_confirm<E: OrderExecutor + ?Sized>(
    executor: &E,
    params: &OrderParams,
    order_timeout: Duration,
    poll_interval: Duration,
) -> Result<OrderResult, TradingError> {
    let start = Instant::now();
    let _timer = metrics::LatencyTimer::new(metrics::ORDER_SUBMIT_LATENCY_MS);

    let submitted = timeout(order_timeout, executor.submit_order(params))
        .await
        .map_err(|_| TradingError::Timeout {
            ticker: params.instrument_id.clone(),
            timeout_ms: order_timeout.as_millis() as u64,
        })??;
    metrics::inc_orders_submitted();

    debug!(order_id = %submitted.order_id, status = %submitted.status, "Order submitted");

    let result = if submitted.status.is_terminal() {
        submitted
    } else {
        let remaining = order_timeout.saturating_sub(start.elapsed());
        wait_for_terminal_order(executor, &submitted.order_id, remaining, poll_interval).await
    };

    if result.status.is_filled() {
        metrics::inc_orders_filled();
        info!(
            order_id = %result.order_id,
            fill_price = ?result.fill_price,
            fee = %result.fee,
            "Order filled"
        );
    } else {
        metrics::inc_orders_failed();
    }

    Ok(result)
}
