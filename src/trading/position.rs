//! Position tracking for the single managed instrument.
//!
//! [`PositionState`] is a two-state machine, FLAT and OPEN. Entering while OPEN
//! or exiting while FLAT is a logic bug, so both return
//! [`StateError::InvalidTransition`] and leave the state untouched.

use rust_decimal::Decimal;
use strum::{Display, EnumString};
use time::OffsetDateTime;

use crate::error::StateError;

/// Whether a position is held.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString)]
pub enum PositionStatus {
    /// No position.
    #[strum(to_string = "FLAT", serialize = "flat")]
    Flat,
    /// Position held.
    #[strum(to_string = "OPEN", serialize = "open")]
    Open,
}

/// Why a position was closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
pub enum ExitReason {
    /// Price rose above the rolling median by the configured margin.
    #[strum(to_string = "deviation threshold")]
    Threshold,
    /// Maximum hold time reached.
    #[strum(to_string = "max hold timeout")]
    Timeout,
    /// Price fell to the stop-loss level.
    #[strum(to_string = "stop loss")]
    StopLoss,
    /// Closed outside the bot.
    #[strum(to_string = "manual close")]
    Manual,
}

/// An open position in the instrument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Position {
    /// Instrument ticker.
    pub instrument_id: String,
    /// Entry price per contract.
    pub entry_price: Decimal,
    /// When the entry was confirmed.
    pub entry_time: OffsetDateTime,
    /// Contracts held.
    pub quantity: u32,
    /// Highest price observed while open.
    pub peak_price: Decimal,
}

impl Position {
    /// Calculate P&L at a given price.
    pub fn pnl(&self, current_price: Decimal) -> Decimal {
        (current_price - self.entry_price) * Decimal::from(self.quantity)
    }

    /// P&L at a given price as a percentage of the entry price.
    pub fn pnl_pct(&self, current_price: Decimal) -> Decimal {
        if self.entry_price.is_zero() {
            Decimal::ZERO
        } else {
            (current_price - self.entry_price) / self.entry_price * Decimal::ONE_HUNDRED
        }
    }
}

/// A position that has just been closed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClosedPosition {
    /// The position as it was when closed.
    pub position: Position,
    /// Exit fill price.
    pub exit_price: Decimal,
    /// When the exit was confirmed.
    pub exit_time: OffsetDateTime,
    /// What triggered the exit.
    pub reason: ExitReason,
    /// `(exit_price - entry_price) * quantity`, before fees.
    pub realized_pnl: Decimal,
}

/// Owner of the single live position.
#[derive(Debug, Clone, Default)]
pub struct PositionState {
    current: Option<Position>,
}

impl PositionState {
    /// Start FLAT.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current status.
    pub fn status(&self) -> PositionStatus {
        if self.current.is_some() {
            PositionStatus::Open
        } else {
            PositionStatus::Flat
        }
    }

    /// Whether a position is held.
    pub fn is_open(&self) -> bool {
        self.current.is_some()
    }

    /// The live position, if any.
    pub fn position(&self) -> Option<&Position> {
        self.current.as_ref()
    }

    /// FLAT -> OPEN.
    pub fn enter(
        &mut self,
        instrument_id: impl Into<String>,
        price: Decimal,
        quantity: u32,
        time: OffsetDateTime,
    ) -> Result<&Position, StateError> {
        if self.current.is_some() {
            return Err(StateError::InvalidTransition {
                attempted: "enter",
                state: PositionStatus::Open,
            });
        }
        if quantity == 0 {
            return Err(StateError::InvalidEntry("quantity must be positive".to_string()));
        }
        if price <= Decimal::ZERO {
            return Err(StateError::InvalidEntry(format!(
                "entry price must be positive, got {}",
                price
            )));
        }

        Ok(self.current.insert(Position {
            instrument_id: instrument_id.into(),
            entry_price: price,
            entry_time: time,
            quantity,
            peak_price: price,
        }))
    }

    /// OPEN -> FLAT. Fees are not subtracted here; the executor reports them.
    pub fn exit(
        &mut self,
        exit_price: Decimal,
        time: OffsetDateTime,
        reason: ExitReason,
    ) -> Result<ClosedPosition, StateError> {
        let position = self.current.take().ok_or(StateError::InvalidTransition {
            attempted: "exit",
            state: PositionStatus::Flat,
        })?;

        let realized_pnl = position.pnl(exit_price);
        Ok(ClosedPosition {
            position,
            exit_price,
            exit_time: time,
            reason,
            realized_pnl,
        })
    }

    /// Shrink the open position after part of it sold at `price`.
    ///
    /// Returns the realized P&L on the sold contracts. Selling the whole
    /// position goes through [`exit`](Self::exit) instead.
    pub fn reduce(&mut self, quantity: u32, price: Decimal) -> Result<Decimal, StateError> {
        let position = self.current.as_mut().ok_or(StateError::InvalidTransition {
            attempted: "reduce",
            state: PositionStatus::Flat,
        })?;
        if quantity == 0 || quantity >= position.quantity {
            return Err(StateError::InvalidReduce {
                quantity,
                held: position.quantity,
            });
        }

        position.quantity -= quantity;
        Ok((price - position.entry_price) * Decimal::from(quantity))
    }

    /// `(current_price - entry_price) * quantity`, OPEN only.
    pub fn unrealized_pnl(&self, current_price: Decimal) -> Option<Decimal> {
        self.current.as_ref().map(|p| p.pnl(current_price))
    }

    /// Unrealized P&L as a percentage of the entry price, OPEN only.
    pub fn unrealized_pnl_pct(&self, current_price: Decimal) -> Option<Decimal> {
        self.current.as_ref().map(|p| p.pnl_pct(current_price))
    }

    /// Track the peak price of the open position.
    pub fn observe_price(&mut self, price: Decimal) {
        if let Some(position) = self.current.as_mut() {
            if price > position.peak_price {
                position.peak_price = price;
            }
        }
    }
}
