//! Deviation of the live price from the rolling median.

use rust_decimal::Decimal;

use crate::error::StrategyError;

/// `((current - median) / median) * 100`.
///
/// Fails when the median is absent or zero; callers treat that as
/// insufficient data rather than an error condition.
pub fn deviation_pct(current: Decimal, median: Option<Decimal>) -> Result<Decimal, StrategyError> {
    match median {
        Some(m) if !m.is_zero() => Ok((current - m) / m * Decimal::ONE_HUNDRED),
        _ => Err(StrategyError::DivisionByZero { median }),
    }
}

/// Upside-only, inclusive at the boundary.
pub fn should_exit_on_deviation(deviation_pct: Decimal, threshold_pct: Decimal) -> bool {
    deviation_pct >= threshold_pct
}
