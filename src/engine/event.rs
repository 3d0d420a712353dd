//! Per-cycle decision record.

use std::time::Duration;

use rust_decimal::Decimal;
use time::OffsetDateTime;

use crate::strategy::Action;

/// One record per decision cycle. Immutable once emitted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecisionEvent {
    /// When the cycle ran (sample time when a price was observed).
    pub timestamp: OffsetDateTime,
    /// Managed instrument.
    pub instrument_id: String,
    /// What the cycle did.
    pub action: Action,
    /// Rolling median, once any sample is recorded.
    pub median: Option<Decimal>,
    /// Price observed this cycle; absent when the fetch failed.
    pub current_price: Option<Decimal>,
    /// Deviation from the median in percent.
    pub deviation_pct: Option<Decimal>,
    /// Time the position had been held.
    pub hold_duration: Option<Duration>,
    /// Contracts entered or exited.
    pub quantity: Option<u32>,
    /// Entry price of the position involved.
    pub entry_price: Option<Decimal>,
    /// Realized P&L, exit events only.
    pub realized_pnl: Option<Decimal>,
    /// Fee reported by the executor, exit events only.
    pub fee: Option<Decimal>,
    /// Free-form annotation (warm-up, failures, alarms).
    pub note: Option<String>,
    /// Whether fills were simulated.
    pub paper: bool,
}

impl DecisionEvent {
    /// Bare event; fill the optional fields with struct update syntax.
    pub fn new(
        timestamp: OffsetDateTime,
        instrument_id: impl Into<String>,
        action: Action,
        paper: bool,
    ) -> Self {
        Self {
            timestamp,
            instrument_id: instrument_id.into(),
            action,
            median: None,
            current_price: None,
            deviation_pct: None,
            hold_duration: None,
            quantity: None,
            entry_price: None,
            realized_pnl: None,
            fee: None,
            note: None,
            paper,
        }
    }

    /// Attach a note.
    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }

    /// P&L as a percentage of the entry price, when both prices are known.
    pub fn pnl_pct(&self) -> Option<Decimal> {
        let entry = self.entry_price.filter(|e| !e.is_zero())?;
        let price = self.current_price?;
        Some((price - entry) / entry * Decimal::ONE_HUNDRED)
    }

    /// Realized P&L net of fees.
    pub fn net_pnl(&self) -> Option<Decimal> {
        self.realized_pnl
            .map(|pnl| pnl - self.fee.unwrap_or_default())
    }
}
