//! Order types and creation.

use rust_decimal::Decimal;
use strum::{Display, EnumString};

/// Order side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString)]
pub enum Side {
    /// Buy order.
    #[strum(to_string = "buy", serialize = "BUY")]
    Buy,
    /// Sell order.
    #[strum(to_string = "sell", serialize = "SELL")]
    Sell,
}

/// Outcome of an order as far as the bot is concerned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
pub enum OrderStatus {
    /// Fully filled.
    #[strum(
        to_string = "FILLED",
        serialize = "filled",
        serialize = "executed",
        serialize = "EXECUTED"
    )]
    Filled,
    /// Rejected, cancelled or expired. A cancelled order may still carry a
    /// partial fill in `OrderResult::filled_quantity`.
    #[strum(
        to_string = "REJECTED",
        serialize = "rejected",
        serialize = "canceled",
        serialize = "cancelled",
        serialize = "expired"
    )]
    Rejected,
    /// Accepted but not yet resolved.
    #[strum(
        to_string = "PENDING",
        serialize = "pending",
        serialize = "resting",
        serialize = "open"
    )]
    Pending,
}

impl OrderStatus {
    /// Check if status is terminal (won't change).
    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Filled | OrderStatus::Rejected)
    }

    /// Check if order was filled.
    pub fn is_filled(&self) -> bool {
        matches!(self, OrderStatus::Filled)
    }
}

/// Order parameters for submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderParams {
    /// Instrument ticker to trade.
    pub instrument_id: String,
    /// Order side (buy/sell).
    pub side: Side,
    /// Number of contracts.
    pub quantity: u32,
    /// Last observed price. Paper fills execute here; live orders are market
    /// orders and only use it for logging.
    pub reference_price: Decimal,
}

impl OrderParams {
    /// Create a new sell order.
    pub fn sell(instrument_id: impl Into<String>, quantity: u32, reference_price: Decimal) -> Self {
        Self {
            instrument_id: instrument_id.into(),
            side: Side::Sell,
            quantity,
            reference_price,
        }
    }

    /// Validate order parameters.
    pub fn validate(&self) -> Result<(), String> {
        if self.instrument_id.is_empty() {
            return Err("instrument_id is required".to_string());
        }
        if self.quantity == 0 {
            return Err("quantity must be positive".to_string());
        }
        if self.reference_price <= Decimal::ZERO {
            return Err("reference price must be positive".to_string());
        }
        Ok(())
    }
}

/// Result of submitting or polling an order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderResult {
    /// Exchange (or simulated) order ID.
    pub order_id: String,
    /// Current status.
    pub status: OrderStatus,
    /// Contracts executed so far.
    pub filled_quantity: u32,
    /// Average fill price of the executed contracts.
    pub fill_price: Option<Decimal>,
    /// Fees charged by the exchange.
    pub fee: Decimal,
    /// Rejection reason, if any.
    pub reason: Option<String>,
}

impl OrderResult {
    /// Terminal with at least one contract executed.
    pub fn settled_with_fill(&self) -> bool {
        self.status.is_filled() || (self.status.is_terminal() && self.filled_quantity > 0)
    }

    /// A filled order.
    pub fn filled(
        order_id: impl Into<String>,
        quantity: u32,
        fill_price: Decimal,
        fee: Decimal,
    ) -> Self {
        Self {
            order_id: order_id.into(),
            status: OrderStatus::Filled,
            filled_quantity: quantity,
            fill_price: Some(fill_price),
            fee,
            reason: None,
        }
    }

    /// An order cancelled after some of its contracts executed.
    pub fn partially_filled(
        order_id: impl Into<String>,
        quantity: u32,
        fill_price: Decimal,
        fee: Decimal,
    ) -> Self {
        Self {
            order_id: order_id.into(),
            status: OrderStatus::Rejected,
            filled_quantity: quantity,
            fill_price: Some(fill_price),
            fee,
            reason: Some(format!("cancelled after {} contracts filled", quantity)),
        }
    }

    /// A rejected order.
    pub fn rejected(order_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            order_id: order_id.into(),
            status: OrderStatus::Rejected,
            filled_quantity: 0,
            fill_price: None,
            fee: Decimal::ZERO,
            reason: Some(reason.into()),
        }
    }

    /// An order still waiting for a fill.
    pub fn pending(order_id: impl Into<String>) -> Self {
        Self {
            order_id: order_id.into(),
            status: OrderStatus::Pending,
            filled_quantity: 0,
            fill_price: None,
            fee: Decimal::ZERO,
            reason: None,
        }
    }
}
