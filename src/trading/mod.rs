//! Trading module for order management and execution.
//!
//! This module handles:
//! - Order types and creation
//! - Executor interfaces and the paper executor
//! - Order submission with fill confirmation
//! - The position state machine

pub mod execution;
pub mod executor;
pub mod order;
pub mod paper;
pub mod position;

pub use execution::{submit_and_confirm, wait_for_terminal_order};
pub use executor::{OrderExecutor, PositionSource};
pub use order::{OrderParams, OrderResult, OrderStatus, Side};
pub use paper::PaperExecutor;
pub use position::{ClosedPosition, ExitReason, Position, PositionState, PositionStatus};
