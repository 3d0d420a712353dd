//! Entry policies.
//!
//! The strategy is an exit rule; it never opens positions on price signals.
//! A policy only decides whether a position the exchange already reports
//! should be taken under management.

use rust_decimal::Decimal;
use time::OffsetDateTime;

use crate::config::EntryPolicyKind;
use crate::market::ExchangePosition;

/// What the policy sees while the bot is flat.
#[derive(Debug, Clone, Copy)]
pub struct EntryContext<'a> {
    /// Managed instrument.
    pub instrument_id: &'a str,
    /// Current price.
    pub price: Decimal,
    /// Decision time.
    pub now: OffsetDateTime,
    /// Position reported by the exchange, if it was queried this cycle.
    pub exchange_position: Option<&'a ExchangePosition>,
}

/// Instruction to open a position locally.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntrySignal {
    pub entry_price: Decimal,
    pub quantity: u32,
    pub entry_time: OffsetDateTime,
    pub note: String,
}

/// Pluggable rule for when the bot starts managing a position.
pub trait EntryPolicy: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &'static str;

    /// Whether the loop should query the exchange position every flat cycle.
    fn wants_exchange_position(&self) -> bool;

    /// Called once per warm cycle while flat.
    fn on_flat(&self, ctx: &EntryContext<'_>) -> Option<EntrySignal>;
}

/// Take over any position the exchange reports, at its average cost.
#[derive(Debug, Clone, Copy, Default)]
pub struct AdoptExchangePosition;

impl EntryPolicy for AdoptExchangePosition {
    fn name(&self) -> &'static str {
        "adopt"
    }

    fn wants_exchange_position(&self) -> bool {
        true
    }

    fn on_flat(&self, ctx: &EntryContext<'_>) -> Option<EntrySignal> {
        let held = ctx
            .exchange_position
            .filter(|p| p.quantity > 0 && p.instrument_id == ctx.instrument_id)?;

        // Fall back to the live price when the exchange has no usable cost.
        let entry_price = held
            .avg_price
            .filter(|p| *p > Decimal::ZERO)
            .unwrap_or(ctx.price);

        Some(EntrySignal {
            entry_price,
            quantity: held.quantity,
            entry_time: ctx.now,
            note: format!("adopted exchange position of {}", held.quantity),
        })
    }
}

/// Never enter. Positions are opened explicitly by the operator or tests.
#[derive(Debug, Clone, Copy, Default)]
pub struct ManualOnly;

impl EntryPolicy for ManualOnly {
    fn name(&self) -> &'static str {
        "manual"
    }

    fn wants_exchange_position(&self) -> bool {
        false
    }

    fn on_flat(&self, _ctx: &EntryContext<'_>) -> Option<EntrySignal> {
        None
    }
}

/// Build the configured policy.
pub fn policy_for(kind: EntryPolicyKind) -> Box<dyn EntryPolicy> {
    match kind {
        EntryPolicyKind::Adopt => Box::new(AdoptExchangePosition),
        EntryPolicyKind::Manual => Box::new(ManualOnly),
    }
}
