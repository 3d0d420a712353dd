//! Decision engine.
//!
//! This module handles:
//! - The per-cycle decision event
//! - Engine snapshots and session statistics
//! - The polling decision loop

pub mod decision_loop;
pub mod event;
pub mod snapshot;

pub use decision_loop::{TradeDecisionLoop, STALE_ORDER_POLLS};
pub use event::DecisionEvent;
pub use snapshot::{EngineSnapshot, SessionStats};
