//! Read-only view of the engine, published between cycles.

use rust_decimal::Decimal;
use time::OffsetDateTime;

use crate::strategy::Action;
use crate::trading::Position;

/// Running totals for the session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionStats {
    pub cycles: u64,
    pub trades_closed: u64,
    pub wins: u64,
    pub losses: u64,
    pub total_realized_pnl: Decimal,
    pub total_fees: Decimal,
    pub failed_exit_attempts: u64,
    pub price_fetch_failures: u64,
    pub reconciliation_alarms: u64,
    pub recorder_failures: u64,
}

impl SessionStats {
    /// Fraction of closed trades with positive P&L, in percent.
    pub fn win_rate(&self) -> Option<Decimal> {
        if self.trades_closed == 0 {
            return None;
        }
        Some(Decimal::from(self.wins) / Decimal::from(self.trades_closed) * Decimal::ONE_HUNDRED)
    }

    /// Realized P&L net of fees.
    pub fn net_pnl(&self) -> Decimal {
        self.total_realized_pnl - self.total_fees
    }
}

/// Engine state as of the end of the last completed cycle.
#[derive(Debug, Clone)]
pub struct EngineSnapshot {
    pub instrument_id: String,
    pub paper: bool,
    pub cycle: u64,
    pub window_len: usize,
    pub window_capacity: usize,
    pub prices: Vec<Decimal>,
    pub median: Option<Decimal>,
    pub last_price: Option<Decimal>,
    pub deviation_pct: Option<Decimal>,
    pub position: Option<Position>,
    pub unrealized_pnl: Option<Decimal>,
    pub unrealized_pnl_pct: Option<Decimal>,
    pub hold_seconds: Option<u64>,
    pub last_action: Option<Action>,
    pub last_note: Option<String>,
    pub exit_pending: bool,
    pub stats: SessionStats,
    pub updated_at: OffsetDateTime,
    /// Set when the loop stopped on a fatal error.
    pub halted: bool,
}

impl EngineSnapshot {
    /// Snapshot before the first cycle.
    pub fn initial(instrument_id: impl Into<String>, paper: bool, window_capacity: usize) -> Self {
        Self {
            instrument_id: instrument_id.into(),
            paper,
            cycle: 0,
            window_len: 0,
            window_capacity,
            prices: Vec::new(),
            median: None,
            last_price: None,
            deviation_pct: None,
            position: None,
            unrealized_pnl: None,
            unrealized_pnl_pct: None,
            hold_seconds: None,
            last_action: None,
            last_note: None,
            exit_pending: false,
            stats: SessionStats::default(),
            updated_at: OffsetDateTime::now_utc(),
            halted: false,
        }
    }

    /// True once the rolling window is full.
    pub fn is_warm(&self) -> bool {
        self.window_len == self.window_capacity
    }
}
