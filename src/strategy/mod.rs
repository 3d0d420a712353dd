//! Median-reversion exit strategy.
//!
//! This module handles:
//! - The rolling price window and its median
//! - Deviation and hold-time exit checks
//! - Protective stops
//! - The pure per-cycle decision
//! - Entry policies

pub mod decision;
pub mod deviation;
pub mod entry;
pub mod risk_clock;
pub mod stops;
pub mod window;

pub use decision::{decide, Action, Decision, DecisionInputs, ExitRules};
pub use deviation::{deviation_pct, should_exit_on_deviation};
pub use entry::{policy_for, AdoptExchangePosition, EntryContext, EntryPolicy, EntrySignal, ManualOnly};
pub use risk_clock::{elapsed, should_force_exit};
pub use stops::{SafetyStops, StopLoss, TrailingStop, TrailingTier};
pub use window::PriceWindow;
