//! Kalshi REST API client.
//!
//! Implements the market-data, position and order-execution collaborators
//! against the Kalshi trade API. Prices are the best YES bid in dollars.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::StatusCode;
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use super::source::MarketDataSource;
use super::types::{ExchangePosition, MarketInfo, PriceSample};
use crate::config::Config;
use crate::error::{MarketError, TradingError};
use crate::metrics;
use crate::trading::{OrderExecutor, OrderParams, OrderResult, OrderStatus, PositionSource};

/// Kalshi trade API client.
#[derive(Debug, Clone)]
pub struct KalshiClient {
    /// HTTP client for API requests.
    http: reqwest::Client,
    /// Base URL, e.g. `https://api.elections.kalshi.com/trade-api/v2`.
    base_url: String,
    /// Bearer token for portfolio endpoints.
    api_token: Option<String>,
}

/// Order creation request body.
#[derive(Debug, Clone, Serialize)]
struct CreateOrderRequest<'a> {
    ticker: &'a str,
    client_order_id: String,
    action: String,
    side: &'static str,
    count: u32,
    #[serde(rename = "type")]
    order_type: &'static str,
}

impl KalshiClient {
    /// Create a client from config.
    pub fn new(config: &Config) -> Result<Self, MarketError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.http_timeout_ms))
            .connect_timeout(Duration::from_millis(500))
            .tcp_nodelay(true)
            .tcp_keepalive(Duration::from_secs(30))
            .pool_idle_timeout(Duration::from_secs(90))
            .build()?;

        Ok(Self {
            http,
            base_url: config.kalshi_api_url.trim_end_matches('/').to_string(),
            api_token: config.kalshi_api_token.clone(),
        })
    }

    fn authed(&self, request: reqwest::RequestBuilder) -> Result<reqwest::RequestBuilder, TradingError> {
        let token = self.api_token.as_deref().ok_or_else(|| {
            TradingError::AuthenticationFailed("KALSHI_API_TOKEN is not set".to_string())
        })?;
        Ok(request.bearer_auth(token))
    }

    async fn get_market_json(&self, ticker: &str) -> Result<serde_json::Value, MarketError> {
        let url = format!("{}/markets/{}", self.base_url, ticker);
        let start = Instant::now();
        let response = self.http.get(&url).send().await?;
        metrics::record_http_latency(start, "market");

        match response.status() {
            StatusCode::NOT_FOUND => {
                return Err(MarketError::NotFound {
                    ticker: ticker.to_string(),
                })
            }
            status if !status.is_success() => {
                return Err(MarketError::FetchFailed {
                    ticker: ticker.to_string(),
                    reason: format!("HTTP {}", status),
                })
            }
            _ => {}
        }

        let json: serde_json::Value = response
            .json()
            .await
            .map_err(|e| MarketError::ParseError(format!("Failed to parse market: {}", e)))?;

        json.get("market")
            .cloned()
            .ok_or_else(|| MarketError::ParseError("response has no market object".to_string()))
    }

    /// Descriptive market info for diagnostics.
    #[instrument(skip(self))]
    pub async fn market_info(&self, ticker: &str) -> Result<MarketInfo, MarketError> {
        let market = self.get_market_json(ticker).await?;

        Ok(MarketInfo {
            ticker: ticker.to_string(),
            title: market.get("title").and_then(|v| v.as_str()).map(str::to_string),
            status: market.get("status").and_then(|v| v.as_str()).map(str::to_string),
            yes_bid: parse_dollars(&market, "yes_bid_dollars", "yes_bid"),
            yes_ask: parse_dollars(&market, "yes_ask_dollars", "yes_ask"),
        })
    }

    async fn fetch_order(&self, order_id: &str) -> Result<OrderResult, TradingError> {
        let url = format!("{}/portfolio/orders/{}", self.base_url, order_id);
        let response = self
            .authed(self.http.get(&url))?
            .send()
            .await
            .map_err(|e| TradingError::StatusFailed {
                order_id: order_id.to_string(),
                reason: format!("HTTP request failed: {}", e),
            })?;

        if !response.status().is_success() {
            return Err(TradingError::StatusFailed {
                order_id: order_id.to_string(),
                reason: format!("HTTP {}", response.status()),
            });
        }

        let json: serde_json::Value =
            response.json().await.map_err(|e| TradingError::StatusFailed {
                order_id: order_id.to_string(),
                reason: format!("Failed to parse response: {}", e),
            })?;

        Ok(parse_order(order_id, json.get("order").unwrap_or(&json)))
    }

    async fn delete_order(&self, order_id: &str) -> Result<OrderResult, TradingError> {
        let url = format!("{}/portfolio/orders/{}", self.base_url, order_id);
        let failed = |reason: String| TradingError::StatusFailed {
            order_id: order_id.to_string(),
            reason,
        };

        let response = self
            .authed(self.http.delete(&url))?
            .send()
            .await
            .map_err(|e| failed(format!("cancel request failed: {}", e)))?;

        if response.status() == StatusCode::NOT_FOUND {
            // Already executed or cancelled; report whatever the order says now.
            return self.fetch_order(order_id).await;
        }
        if !response.status().is_success() {
            return Err(failed(format!("cancel returned HTTP {}", response.status())));
        }

        let json: serde_json::Value = response
            .json()
            .await
            .map_err(|e| failed(format!("Failed to parse response: {}", e)))?;

        let result = parse_order(order_id, json.get("order").unwrap_or(&json));
        info!(order_id = %order_id, status = %result.status, filled = result.filled_quantity, "Order cancelled");
        Ok(result)
    }
}

#[async_trait]
impl MarketDataSource for KalshiClient {
    #[instrument(skip(self), fields(ticker = %instrument_id))]
    async fn fetch_price(&self, instrument_id: &str) -> Result<PriceSample, MarketError> {
        let market = self.get_market_json(instrument_id).await?;

        let price = parse_dollars(&market, "yes_bid_dollars", "yes_bid")
            .filter(|p| *p > Decimal::ZERO)
            .ok_or_else(|| MarketError::NoQuote {
                ticker: instrument_id.to_string(),
            })?;

        debug!(price = %price, "Fetched price");
        Ok(PriceSample::now(price))
    }
}

#[async_trait]
impl PositionSource for KalshiClient {
    #[instrument(skip(self), fields(ticker = %instrument_id))]
    async fn fetch_position(
        &self,
        instrument_id: &str,
    ) -> Result<Option<ExchangePosition>, TradingError> {
        let url = format!("{}/portfolio/positions", self.base_url);
        let failed = |reason: String| TradingError::PositionFailed {
            ticker: instrument_id.to_string(),
            reason,
        };

        let start = Instant::now();
        let response = self
            .authed(self.http.get(&url).query(&[("ticker", instrument_id)]))?
            .send()
            .await
            .map_err(|e| failed(format!("HTTP request failed: {}", e)))?;
        metrics::record_http_latency(start, "positions");

        match response.status() {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                return Err(TradingError::AuthenticationFailed(format!(
                    "HTTP {}",
                    response.status()
                )))
            }
            status if !status.is_success() => return Err(failed(format!("HTTP {}", status))),
            _ => {}
        }

        let json: serde_json::Value = response
            .json()
            .await
            .map_err(|e| failed(format!("Failed to parse response: {}", e)))?;

        parse_position(instrument_id, &json).map_err(failed)
    }
}

#[async_trait]
impl OrderExecutor for KalshiClient {
    #[instrument(skip(self, params), fields(ticker = %params.instrument_id, side = %params.side))]
    async fn submit_order(&self, params: &OrderParams) -> Result<OrderResult, TradingError> {
        params.validate().map_err(TradingError::InvalidParams)?;

        let body = CreateOrderRequest {
            ticker: &params.instrument_id,
            client_order_id: format!(
                "mrb-{}",
                time::OffsetDateTime::now_utc().unix_timestamp_nanos()
            ),
            action: params.side.to_string(),
            side: "yes",
            count: params.quantity,
            order_type: "market",
        };

        let url = format!("{}/portfolio/orders", self.base_url);
        let start = Instant::now();
        let response = self
            .authed(self.http.post(&url).json(&body))?
            .send()
            .await
            .map_err(|e| TradingError::SubmissionFailed(format!("HTTP request failed: {}", e)))?;
        metrics::record_http_latency(start, "orders");

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after_seconds = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse().ok())
                .unwrap_or(1);
            return Err(TradingError::RateLimited {
                retry_after_seconds,
            });
        }
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(TradingError::AuthenticationFailed(format!("HTTP {}", status)));
        }
        if status.is_client_error() {
            let body = response.text().await.unwrap_or_default();
            warn!(status = %status, body = %body, "Order rejected");
            return Err(TradingError::OrderRejected {
                reason: format!("HTTP {} - {}", status, body),
            });
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TradingError::SubmissionFailed(format!(
                "Order submission failed: HTTP {} - {}",
                status, body
            )));
        }

        let json: serde_json::Value = response.json().await.map_err(|e| {
            TradingError::SubmissionFailed(format!("Failed to parse response: {}", e))
        })?;
        let order = json.get("order").unwrap_or(&json);

        let order_id = order
            .get("order_id")
            .and_then(|v| v.as_str())
            .ok_or_else(|| TradingError::SubmissionFailed("No order ID in response".to_string()))?
            .to_string();

        let result = parse_order(&order_id, order);
        info!(
            order_id = %order_id,
            status = %result.status,
            quantity = params.quantity,
            "Order submitted"
        );

        Ok(result)
    }

    async fn order_status(&self, order_id: &str) -> Result<OrderResult, TradingError> {
        self.fetch_order(order_id).await
    }

    #[instrument(skip(self))]
    async fn cancel_order(&self, order_id: &str) -> Result<OrderResult, TradingError> {
        self.delete_order(order_id).await
    }

    fn is_paper_mode(&self) -> bool {
        false
    }
}

/// Read a dollar amount, falling back to an integer-cents field.
fn parse_dollars(json: &serde_json::Value, dollars_key: &str, cents_key: &str) -> Option<Decimal> {
    parse_decimal_field(json, &[dollars_key])
        .or_else(|| parse_decimal_field(json, &[cents_key]).map(|c| c / Decimal::ONE_HUNDRED))
}

/// Parse a decimal field from JSON, trying multiple field names.
fn parse_decimal_field(json: &serde_json::Value, keys: &[&str]) -> Option<Decimal> {
    for key in keys {
        if let Some(value) = json.get(*key) {
            if let Some(s) = value.as_str() {
                if let Ok(d) = s.parse::<Decimal>() {
                    return Some(d);
                }
            }
            if let Some(n) = value.as_i64() {
                return Some(Decimal::from(n));
            }
            if let Some(n) = value.as_f64() {
                if let Ok(d) = Decimal::try_from(n) {
                    return Some(d);
                }
            }
        }
    }
    None
}

fn parse_order(order_id: &str, order: &serde_json::Value) -> OrderResult {
    let status = order
        .get("status")
        .and_then(|v| v.as_str())
        .and_then(|s| s.parse::<OrderStatus>().ok())
        .unwrap_or(OrderStatus::Pending);

    let filled_quantity = ["fill_count", "filled_count"]
        .iter()
        .find_map(|key| order.get(*key).and_then(|v| v.as_u64()))
        .and_then(|n| u32::try_from(n).ok())
        .unwrap_or(0);
    let fee = parse_dollars(order, "taker_fees_dollars", "taker_fees").unwrap_or_default();
    let cost = parse_dollars(order, "taker_fill_cost_dollars", "taker_fill_cost");
    let fill_price = match cost {
        Some(c) if filled_quantity > 0 => Some(c / Decimal::from(filled_quantity)),
        _ => parse_dollars(order, "yes_price_dollars", "yes_price"),
    };

    match status {
        OrderStatus::Filled => OrderResult {
            order_id: order_id.to_string(),
            status,
            filled_quantity,
            fill_price,
            fee,
            reason: None,
        },
        OrderStatus::Rejected if filled_quantity == 0 => {
            OrderResult::rejected(order_id, "order canceled")
        }
        OrderStatus::Rejected => OrderResult {
            order_id: order_id.to_string(),
            status,
            filled_quantity,
            fill_price,
            fee,
            reason: Some(format!("canceled after {} contracts filled", filled_quantity)),
        },
        OrderStatus::Pending => OrderResult::pending(order_id),
    }
}

/// Extract the YES position in `instrument_id` from a positions response.
///
/// A body without a `market_positions` array is an error, not a flat position.
fn parse_position(
    instrument_id: &str,
    json: &serde_json::Value,
) -> Result<Option<ExchangePosition>, String> {
    let positions = json
        .get("market_positions")
        .and_then(|v| v.as_array())
        .ok_or_else(|| format!("response has no market_positions array: {}", json))?;

    let Some(entry) = positions
        .iter()
        .find(|p| p.get("ticker").and_then(|t| t.as_str()) == Some(instrument_id))
    else {
        return Ok(None);
    };

    // Negative positions are NO contracts, which this bot never manages.
    let contracts = entry
        .get("position")
        .and_then(|v| v.as_i64())
        .ok_or_else(|| format!("position entry for {} has no position count", instrument_id))?;
    let Some(quantity) = u32::try_from(contracts).ok().filter(|q| *q > 0) else {
        return Ok(None);
    };

    let exposure = parse_dollars(entry, "market_exposure_dollars", "market_exposure");
    let avg_price = exposure
        .filter(|e| *e > Decimal::ZERO)
        .map(|e| e / Decimal::from(quantity));

    Ok(Some(ExchangePosition {
        instrument_id: instrument_id.to_string(),
        quantity,
        avg_price,
    }))
}
