//! Protective exits for an open position.
//!
//! Every stop is off by default. The trailing stop locks in gains and runs
//! from the first cycle; the loss stops only apply once the position has been
//! held for `min_hold`.

use std::time::Duration;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use crate::config::Config;
use crate::trading::Position;

/// Lower edge of the break-even band, in percent P&L.
pub const BREAK_EVEN_LOW_PCT: Decimal = dec!(-2);
/// Upper edge of the break-even band, in percent P&L.
pub const BREAK_EVEN_HIGH_PCT: Decimal = dec!(3);

/// Stop-loss parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StopLoss {
    /// Percent below entry.
    pub pct: Decimal,
    /// Absolute price floor; the stop never sits below it.
    pub floor: Decimal,
}

impl StopLoss {
    /// `max(entry * (1 - pct/100), floor)`.
    pub fn level(&self, entry_price: Decimal) -> Decimal {
        let pct_level = entry_price * (Decimal::ONE - self.pct / Decimal::ONE_HUNDRED);
        pct_level.max(self.floor)
    }

    /// Inclusive: a price at the level triggers.
    pub fn is_hit(&self, entry_price: Decimal, price: Decimal) -> bool {
        price <= self.level(entry_price)
    }
}

/// One rung of the trailing stop: from `min_pnl_pct` up, the price may fall
/// `leash` dollars below its peak.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrailingTier {
    pub min_pnl_pct: Decimal,
    pub leash: Decimal,
}

/// Trailing stop that tightens as unrealized gains grow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrailingStop {
    /// Sorted by `min_pnl_pct`, highest first.
    tiers: Vec<TrailingTier>,
}

impl TrailingStop {
    /// Build from arbitrary tiers.
    pub fn new(mut tiers: Vec<TrailingTier>) -> Self {
        tiers.sort_by(|a, b| b.min_pnl_pct.cmp(&a.min_pnl_pct));
        Self { tiers }
    }

    /// Leash for the current P&L, `None` below the lowest tier.
    pub fn leash(&self, pnl_pct: Decimal) -> Option<Decimal> {
        self.tiers
            .iter()
            .find(|tier| pnl_pct >= tier.min_pnl_pct)
            .map(|tier| tier.leash)
    }

    /// Trigger level for `position` at `price`, if a tier applies.
    pub fn level(&self, position: &Position, price: Decimal) -> Option<Decimal> {
        self.leash(position.pnl_pct(price))
            .map(|leash| position.peak_price - leash)
    }
}

impl Default for TrailingStop {
    fn default() -> Self {
        Self::new(vec![
            TrailingTier { min_pnl_pct: dec!(30), leash: dec!(0.005) },
            TrailingTier { min_pnl_pct: dec!(20), leash: dec!(0.01) },
            TrailingTier { min_pnl_pct: dec!(10), leash: dec!(0.02) },
            TrailingTier { min_pnl_pct: dec!(5), leash: dec!(0.03) },
        ])
    }
}

/// The full set of protective exits.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SafetyStops {
    /// Loss stops are ignored until the position is this old.
    pub min_hold: Duration,
    /// Percent/floor stop loss.
    pub stop_loss: Option<StopLoss>,
    /// Exit once P&L falls to `-max_loss_pct` percent.
    pub max_loss_pct: Option<Decimal>,
    /// Exit a losing position held at least this long.
    pub losing_after: Option<Duration>,
    /// Exit a position stuck near break-even for at least this long.
    pub break_even_after: Option<Duration>,
    /// Profit-protecting trailing stop.
    pub trailing: Option<TrailingStop>,
}

impl SafetyStops {
    /// Build from configuration.
    pub fn from_config(config: &Config) -> Self {
        Self {
            min_hold: Duration::from_secs(config.min_hold_seconds),
            stop_loss: config.stop_loss_pct.map(|pct| StopLoss {
                pct,
                floor: config.stop_loss_floor,
            }),
            max_loss_pct: config.max_loss_pct,
            losing_after: config.losing_stop_seconds.map(Duration::from_secs),
            break_even_after: config.break_even_seconds.map(Duration::from_secs),
            trailing: config.trailing_stop.then(TrailingStop::default),
        }
    }

    /// First stop that fires, described for the trade log.
    pub fn check(&self, position: &Position, price: Decimal, held: Duration) -> Option<String> {
        if let Some(level) = self.trailing.as_ref().and_then(|t| t.level(position, price)) {
            if price <= level {
                return Some(format!(
                    "trailing stop: {} at or below {} (peak {})",
                    price, level, position.peak_price
                ));
            }
        }

        if held < self.min_hold {
            return None;
        }

        if let Some(stop) = self.stop_loss {
            let level = stop.level(position.entry_price);
            if price <= level {
                return Some(format!("stop loss: {} at or below {}", price, level));
            }
        }

        let pnl_pct = position.pnl_pct(price);

        if let Some(max_loss) = self.max_loss_pct {
            if pnl_pct <= -max_loss {
                return Some(format!("max loss: P&L {}% at or below -{}%", pnl_pct.round_dp(2), max_loss));
            }
        }

        if let Some(after) = self.losing_after {
            if held >= after && pnl_pct < Decimal::ZERO {
                return Some(format!("losing for {}s: P&L {}%", held.as_secs(), pnl_pct.round_dp(2)));
            }
        }

        if let Some(after) = self.break_even_after {
            if held >= after && (BREAK_EVEN_LOW_PCT..=BREAK_EVEN_HIGH_PCT).contains(&pnl_pct) {
                return Some(format!(
                    "break-even for {}s: P&L {}%",
                    held.as_secs(),
                    pnl_pct.round_dp(2)
                ));
            }
        }

        None
    }
}
