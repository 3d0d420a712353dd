//! The polling orchestrator.
//!
//! One cycle runs at a time, to completion. Shutdown is only observed while
//! sleeping between cycles, so an order is never left submitted without the
//! position state being updated.

use std::future::Future;
use std::sync::Arc;

use rust_decimal::Decimal;
use time::OffsetDateTime;
use tokio::sync::watch;
use tokio::time::{sleep, timeout};
use tracing::{debug, error, info, instrument, warn};

use super::event::DecisionEvent;
use super::snapshot::{EngineSnapshot, SessionStats};
use crate::config::Config;
use crate::error::{ConfigError, Result, TradingError};
use crate::market::{ExchangePosition, MarketDataSource, PriceSample};
use crate::metrics;
use crate::recorder::TradeRecorder;
use crate::strategy::{
    decide, elapsed, policy_for, Action, Decision, DecisionInputs, EntryContext, EntryPolicy,
    ExitRules, PriceWindow,
};
use crate::trading::{
    submit_and_confirm, ExitReason, OrderExecutor, OrderParams, OrderResult, OrderStatus,
    PositionState,
};

/// Cycles an exit order may stay resting before it is cancelled.
pub const STALE_ORDER_POLLS: u32 = 3;

/// An exit that has been decided but not yet confirmed.
#[derive(Debug, Clone)]
struct PendingExit {
    reason: ExitReason,
    /// Order accepted by the exchange but not yet resolved.
    order_id: Option<String>,
    /// Later cycles that found `order_id` still resting.
    pending_polls: u32,
    attempts: u32,
    /// The last submission may have reached the exchange. Resubmitting is
    /// unsafe until reconciliation shows the position is still held.
    unconfirmed: bool,
}

/// Drives the median-reversion strategy for one instrument.
pub struct TradeDecisionLoop<M: ?Sized, E: ?Sized, R> {
    config: Arc<Config>,
    rules: ExitRules,
    entry_policy: Box<dyn EntryPolicy>,
    market: Arc<M>,
    executor: Arc<E>,
    recorder: R,
    window: PriceWindow,
    position: PositionState,
    pending_exit: Option<PendingExit>,
    stats: SessionStats,
    cycle: u64,
    last_reconciled_cycle: Option<u64>,
    snapshot_tx: watch::Sender<EngineSnapshot>,
}

impl<M, E, R> TradeDecisionLoop<M, E, R>
where
    M: MarketDataSource + ?Sized,
    E: OrderExecutor + ?Sized,
    R: TradeRecorder,
{
    /// Build a loop. The configuration is validated here; an invalid one
    /// never reaches the first cycle.
    pub fn new(
        config: Arc<Config>,
        market: Arc<M>,
        executor: Arc<E>,
        recorder: R,
    ) -> std::result::Result<Self, ConfigError> {
        config.validate()?;
        let entry_policy = policy_for(config.entry_policy_kind()?);
        let paper = executor.is_paper_mode();
        let (snapshot_tx, _) = watch::channel(EngineSnapshot::initial(
            config.kalshi_ticker.clone(),
            paper,
            config.window_size,
        ));

        Ok(Self {
            rules: ExitRules::from_config(&config),
            window: PriceWindow::new(config.window_size),
            entry_policy,
            config,
            market,
            executor,
            recorder,
            position: PositionState::new(),
            pending_exit: None,
            stats: SessionStats::default(),
            cycle: 0,
            last_reconciled_cycle: None,
            snapshot_tx,
        })
    }

    /// Replace the configured entry policy.
    pub fn with_entry_policy(mut self, policy: Box<dyn EntryPolicy>) -> Self {
        self.entry_policy = policy;
        self
    }

    /// Receive a snapshot after every cycle.
    pub fn subscribe(&self) -> watch::Receiver<EngineSnapshot> {
        self.snapshot_tx.subscribe()
    }

    /// Session totals so far.
    pub fn stats(&self) -> &SessionStats {
        &self.stats
    }

    /// Local position state.
    pub fn position(&self) -> &PositionState {
        &self.position
    }

    /// Rolling window.
    pub fn window(&self) -> &PriceWindow {
        &self.window
    }

    fn instrument_id(&self) -> &str {
        &self.config.kalshi_ticker
    }

    fn paper(&self) -> bool {
        self.executor.is_paper_mode()
    }

    /// Start managing a position opened outside the entry policy.
    pub fn open_position(
        &mut self,
        price: Decimal,
        quantity: u32,
        time: OffsetDateTime,
    ) -> Result<DecisionEvent> {
        let instrument_id = self.config.kalshi_ticker.clone();
        self.position.enter(&instrument_id, price, quantity, time)?;
        self.pending_exit = None;

        info!(ticker = %instrument_id, price = %price, quantity, "Position opened");

        let event = DecisionEvent {
            median: self.window.median(),
            current_price: self.window.latest().map(|s| s.price),
            quantity: Some(quantity),
            entry_price: Some(price),
            ..DecisionEvent::new(time, instrument_id, Action::Enter, self.paper())
        }
        .with_note("opened by operator");

        self.record(&event);
        self.publish(&event, time);
        Ok(event)
    }

    /// Run one full cycle.
    ///
    /// Transient failures are folded into a HOLD event. Only a position
    /// state violation returns `Err`, after which the loop must stop.
    #[instrument(skip(self), fields(ticker = %self.config.kalshi_ticker, cycle = self.cycle + 1))]
    pub async fn run_cycle(&mut self) -> Result<DecisionEvent> {
        self.cycle += 1;
        self.stats.cycles += 1;
        metrics::inc_cycles();

        let outcome = self.evaluate_cycle().await;
        match outcome {
            Ok(event) => {
                metrics::inc_decision(&event.action.to_string());
                if event.action == Action::Hold {
                    debug!(
                        price = ?event.current_price,
                        median = ?event.median,
                        deviation_pct = ?event.deviation_pct,
                        note = ?event.note,
                        "HOLD"
                    );
                } else {
                    info!(
                        action = %event.action,
                        price = ?event.current_price,
                        median = ?event.median,
                        deviation_pct = ?event.deviation_pct,
                        realized_pnl = ?event.realized_pnl,
                        note = ?event.note,
                        "Decision"
                    );
                }
                self.record(&event);
                self.publish(&event, event.timestamp);
                Ok(event)
            }
            Err(e) => {
                error!(error = %e, "Position state violated, halting");
                let mut snapshot = self.snapshot_tx.borrow().clone();
                snapshot.halted = true;
                snapshot.last_note = Some(e.to_string());
                snapshot.updated_at = OffsetDateTime::now_utc();
                self.snapshot_tx.send_replace(snapshot);
                Err(e)
            }
        }
    }

    /// Run cycles until `shutdown` flips to true (or its sender is dropped).
    ///
    /// The in-flight cycle always completes before the loop returns.
    pub async fn run(&mut self, mut shutdown: watch::Receiver<bool>) -> Result<SessionStats> {
        info!(
            ticker = %self.instrument_id(),
            window = self.config.window_size,
            threshold_pct = %self.rules.threshold_pct,
            max_hold_secs = self.rules.max_hold.as_secs(),
            refresh_secs = self.config.refresh_interval_seconds,
            entry_policy = self.entry_policy.name(),
            paper = self.paper(),
            "Decision loop starting"
        );

        let refresh = self.config.refresh_interval();
        loop {
            if *shutdown.borrow() {
                break;
            }

            self.run_cycle().await?;

            tokio::select! {
                _ = sleep(refresh) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        if self.position.is_open() {
            warn!("Shutting down with an open position");
        }
        info!(
            cycles = self.stats.cycles,
            trades = self.stats.trades_closed,
            realized_pnl = %self.stats.total_realized_pnl,
            "Decision loop stopped"
        );
        Ok(self.stats.clone())
    }

    async fn evaluate_cycle(&mut self) -> Result<DecisionEvent> {
        let fetched = self.fetch_price().await;
        let sample = match fetched {
            Ok(sample) => sample,
            Err(reason) => {
                self.stats.price_fetch_failures += 1;
                metrics::inc_price_fetch_failures();
                warn!(reason = %reason, "Price fetch failed, skipping cycle");
                return Ok(self
                    .hold_event(OffsetDateTime::now_utc())
                    .with_note(format!("price fetch failed: {}", reason)));
            }
        };

        self.window.record(sample);
        self.position.observe_price(sample.price);
        let median = self.window.median();
        metrics::set_market_gauges(sample.price, median);

        if !self.window.is_warm() {
            return Ok(DecisionEvent {
                median,
                current_price: Some(sample.price),
                ..DecisionEvent::new(sample.timestamp, self.instrument_id(), Action::Hold, self.paper())
            }
            .with_note("warming up"));
        }

        if self.position.is_open() {
            self.evaluate_open(sample).await
        } else {
            self.pending_exit = None;
            self.evaluate_flat(sample).await
        }
    }

    async fn fetch_price(&self) -> std::result::Result<PriceSample, String> {
        let _timer = metrics::LatencyTimer::new(metrics::PRICE_FETCH_LATENCY_MS);
        let limit = self.config.fetch_timeout();
        match timeout(limit, self.market.fetch_price(self.instrument_id())).await {
            Ok(Ok(sample)) => Ok(sample),
            Ok(Err(e)) => Err(e.to_string()),
            Err(_) => Err(format!("timed out after {}ms", limit.as_millis())),
        }
    }

    /// Bound an executor call by the order timeout.
    async fn bounded<T>(
        &self,
        call: impl Future<Output = std::result::Result<T, TradingError>>,
    ) -> std::result::Result<T, TradingError> {
        let limit = self.config.order_timeout();
        timeout(limit, call).await.map_err(|_| TradingError::Timeout {
            ticker: self.config.kalshi_ticker.clone(),
            timeout_ms: limit.as_millis() as u64,
        })?
    }

    async fn exchange_position(&self) -> std::result::Result<Option<ExchangePosition>, TradingError> {
        self.bounded(self.executor.fetch_position(self.instrument_id()))
            .await
    }

    fn reconcile_due(&self) -> bool {
        self.last_reconciled_cycle
            .map_or(true, |last| self.cycle - last >= self.config.reconcile_every_cycles)
    }

    fn raise_alarm(&mut self, message: &str) {
        self.stats.reconciliation_alarms += 1;
        metrics::inc_reconciliation_alarms();
        error!(ticker = %self.config.kalshi_ticker, alarm = %message, "Reconciliation alarm");
    }

    async fn evaluate_flat(&mut self, sample: PriceSample) -> Result<DecisionEvent> {
        let now = sample.timestamp;
        let mut exchange = None;
        let mut note = None;

        if self.entry_policy.wants_exchange_position() || self.reconcile_due() {
            let queried = self.exchange_position().await;
            match queried {
                Ok(held) => {
                    self.last_reconciled_cycle = Some(self.cycle);
                    exchange = held;
                }
                Err(e) => {
                    warn!(error = %e, "Exchange position query failed");
                    note = Some(format!("position query failed: {}", e));
                }
            }
        }

        let ctx = EntryContext {
            instrument_id: self.instrument_id(),
            price: sample.price,
            now,
            exchange_position: exchange.as_ref(),
        };

        if let Some(signal) = self.entry_policy.on_flat(&ctx) {
            let instrument_id = self.config.kalshi_ticker.clone();
            self.position
                .enter(&instrument_id, signal.entry_price, signal.quantity, signal.entry_time)?;
            self.position.observe_price(sample.price);

            info!(
                ticker = %instrument_id,
                entry_price = %signal.entry_price,
                quantity = signal.quantity,
                policy = self.entry_policy.name(),
                "New position detected"
            );

            return Ok(DecisionEvent {
                median: self.window.median(),
                current_price: Some(sample.price),
                quantity: Some(signal.quantity),
                entry_price: Some(signal.entry_price),
                ..DecisionEvent::new(now, instrument_id, Action::Enter, self.paper())
            }
            .with_note(signal.note));
        }

        if let Some(held) = &exchange {
            let message = format!(
                "exchange reports {} contracts but local state is FLAT",
                held.quantity
            );
            self.raise_alarm(&message);
            note = Some(message);
        }

        let decision = self.decide(sample.price, now);
        let mut event = self.decision_event(&decision, sample);
        event.note = note;
        Ok(event)
    }

    async fn evaluate_open(&mut self, sample: PriceSample) -> Result<DecisionEvent> {
        let now = sample.timestamp;

        // Resolve an exit order left pending by an earlier cycle.
        if let Some(order_id) = self.pending_exit.as_ref().and_then(|p| p.order_id.clone()) {
            let resolved = self.poll_pending_order(&order_id).await;
            match resolved {
                Some(result) => {
                    let (reason, attempts) = self
                        .pending_exit
                        .as_ref()
                        .map_or((ExitReason::Manual, 1), |p| (p.reason, p.attempts));
                    if let Some(pending) = self.pending_exit.as_mut() {
                        pending.order_id = None;
                        pending.pending_polls = 0;
                    }
                    if result.settled_with_fill() {
                        let decision = self.decide(sample.price, now);
                        return self.settle_fill(&decision, sample, reason, &result, attempts, None);
                    }
                    warn!(order_id = %order_id, reason = ?result.reason, "Pending exit order was cancelled");
                }
                None if !self.pending_exit.as_ref().is_some_and(|p| p.unconfirmed) => {
                    let decision = self.decide(sample.price, now);
                    return Ok(self
                        .decision_event(&decision, sample)
                        .with_note(format!("exit order {} still pending", order_id)));
                }
                // Status unknown: fall through so reconciliation runs.
                None => {}
            }
        }

        let unconfirmed = self.pending_exit.as_ref().is_some_and(|p| p.unconfirmed);
        if self.reconcile_due() || unconfirmed {
            if let Some(event) = self.reconcile_open(sample).await? {
                return Ok(event);
            }
        }

        let decision = self.decide(sample.price, now);

        if let Some(pending) = &self.pending_exit {
            if pending.unconfirmed || pending.order_id.is_some() {
                return Ok(self
                    .decision_event(&decision, sample)
                    .with_note("exit unconfirmed, waiting for reconciliation"));
            }
        }

        let reason = match decision.action.exit_reason() {
            Some(reason) => reason,
            None => match &self.pending_exit {
                Some(pending) => pending.reason,
                None => return Ok(self.decision_event(&decision, sample)),
            },
        };

        self.execute_exit(&decision, sample, reason).await
    }

    /// Compare local OPEN state with the exchange. Returns an event when the
    /// position turned out to be closed already.
    async fn reconcile_open(&mut self, sample: PriceSample) -> Result<Option<DecisionEvent>> {
        let local_qty = self.position.position().map_or(0, |p| p.quantity);

        let queried = self.exchange_position().await;
        match queried {
            Ok(None) => {
                self.last_reconciled_cycle = Some(self.cycle);
                let decision = self.decide(sample.price, sample.timestamp);
                let (reason, note) = match self.pending_exit.as_ref().map(|p| p.reason) {
                    Some(reason) => (reason, "exit confirmed by reconciliation".to_string()),
                    None => {
                        let message = "position closed outside the bot".to_string();
                        self.raise_alarm(&message);
                        (ExitReason::Manual, message)
                    }
                };
                let event = self.close_position(
                    &decision,
                    sample,
                    reason,
                    sample.price,
                    Decimal::ZERO,
                    Some(note),
                )?;
                Ok(Some(event))
            }
            Ok(Some(held)) => {
                self.last_reconciled_cycle = Some(self.cycle);
                if let Some(pending) = self.pending_exit.as_mut() {
                    pending.unconfirmed = false;
                }
                let order_outstanding = self
                    .pending_exit
                    .as_ref()
                    .is_some_and(|p| p.order_id.is_some());
                if held.quantity < local_qty && order_outstanding {
                    debug!(
                        held = held.quantity,
                        local = local_qty,
                        "Exit order partly executed, waiting for its final state"
                    );
                } else if held.quantity < local_qty {
                    // Contracts left the account without a fill we saw. Shrink
                    // so the next exit never sells more than is held.
                    let sold = local_qty - held.quantity;
                    let realized = self.position.reduce(sold, sample.price)?;
                    self.stats.total_realized_pnl += realized;
                    metrics::set_realized_pnl(self.stats.total_realized_pnl);
                    self.raise_alarm(&format!(
                        "exchange reports {} contracts, local state held {}; resized to match",
                        held.quantity, local_qty
                    ));
                } else if held.quantity > local_qty {
                    self.raise_alarm(&format!(
                        "exchange reports {} contracts, local state holds {}",
                        held.quantity, local_qty
                    ));
                }
                Ok(None)
            }
            Err(e) => {
                warn!(error = %e, "Reconciliation failed");
                Ok(None)
            }
        }
    }

    async fn execute_exit(
        &mut self,
        decision: &Decision,
        sample: PriceSample,
        reason: ExitReason,
    ) -> Result<DecisionEvent> {
        let quantity = self.position.position().map_or(0, |p| p.quantity);
        let params = OrderParams::sell(self.instrument_id(), quantity, sample.price);
        let attempts = self.pending_exit.as_ref().map_or(0, |p| p.attempts) + 1;

        info!(reason = %reason, quantity, price = %sample.price, attempt = attempts, "Submitting exit");

        let outcome = submit_and_confirm(
            &*self.executor,
            &params,
            self.config.order_timeout(),
            self.config.order_poll_interval(),
        )
        .await;

        let (failure, order_id, unconfirmed) = match outcome {
            Ok(result) if result.settled_with_fill() => {
                return self.settle_fill(
                    decision,
                    sample,
                    reason,
                    &result,
                    attempts,
                    decision.note.clone(),
                );
            }
            Ok(result) if result.status == OrderStatus::Pending => (
                format!("exit order {} not filled in time", result.order_id),
                Some(result.order_id),
                false,
            ),
            Ok(result) => (
                format!(
                    "exit rejected: {}",
                    result.reason.as_deref().unwrap_or("no reason given")
                ),
                None,
                false,
            ),
            Err(e) => {
                let unconfirmed = !matches!(
                    e,
                    TradingError::OrderRejected { .. }
                        | TradingError::InvalidParams(_)
                        | TradingError::RateLimited { .. }
                        | TradingError::AuthenticationFailed(_)
                );
                (format!("exit failed: {}", e), None, unconfirmed)
            }
        };

        self.stats.failed_exit_attempts += 1;
        warn!(reason = %reason, attempt = attempts, failure = %failure, "Exit not completed, retrying next cycle");

        self.pending_exit = Some(PendingExit {
            reason,
            order_id,
            pending_polls: 0,
            attempts,
            unconfirmed,
        });

        Ok(self
            .decision_event(decision, sample)
            .with_note(format!("{} exit: {}", reason, failure)))
    }

    /// Check on a resting exit order. Returns its state once terminal.
    ///
    /// An order still resting after [`STALE_ORDER_POLLS`] cycles is cancelled.
    /// When neither the status nor the cancel settles it, the exit is marked
    /// unconfirmed so reconciliation runs every cycle until it does.
    async fn poll_pending_order(&mut self, order_id: &str) -> Option<OrderResult> {
        let status = self.bounded(self.executor.order_status(order_id)).await;
        match status {
            Ok(result) if result.status.is_terminal() => return Some(result),
            Ok(_) => {}
            Err(e) => {
                warn!(order_id = %order_id, error = %e, "Pending exit status unknown");
                self.mark_unconfirmed();
                return None;
            }
        }

        let polls = self.pending_exit.as_mut().map_or(0, |pending| {
            pending.pending_polls += 1;
            pending.pending_polls
        });
        if polls < STALE_ORDER_POLLS {
            return None;
        }

        warn!(order_id = %order_id, polls, "Exit order stale, cancelling");
        let cancelled = self.bounded(self.executor.cancel_order(order_id)).await;
        match cancelled {
            Ok(result) if result.status.is_terminal() => Some(result),
            Ok(result) => {
                warn!(order_id = %order_id, status = %result.status, "Cancel did not settle the order");
                self.mark_unconfirmed();
                None
            }
            Err(e) => {
                warn!(order_id = %order_id, error = %e, "Cancel failed");
                self.mark_unconfirmed();
                None
            }
        }
    }

    fn mark_unconfirmed(&mut self) {
        if let Some(pending) = self.pending_exit.as_mut() {
            pending.unconfirmed = true;
        }
    }

    /// Apply an exit order's executed contracts. A full fill closes the
    /// position; a partial one shrinks it and leaves the rest for the next cycle.
    fn settle_fill(
        &mut self,
        decision: &Decision,
        sample: PriceSample,
        reason: ExitReason,
        result: &OrderResult,
        attempts: u32,
        note: Option<String>,
    ) -> Result<DecisionEvent> {
        let held = self.position.position().map_or(0, |p| p.quantity);
        let fill_price = result.fill_price.unwrap_or(sample.price);
        let filled = if result.status.is_filled() && result.filled_quantity == 0 {
            held
        } else {
            result.filled_quantity
        };

        if filled >= held {
            return self.close_position(decision, sample, reason, fill_price, result.fee, note);
        }

        let realized = self.position.reduce(filled, fill_price)?;
        self.stats.total_realized_pnl += realized;
        self.stats.total_fees += result.fee;
        self.stats.failed_exit_attempts += 1;
        metrics::set_realized_pnl(self.stats.total_realized_pnl);

        let remaining = held - filled;
        warn!(
            reason = %reason,
            order_id = %result.order_id,
            filled,
            remaining,
            fill_price = %fill_price,
            realized_pnl = %realized,
            "Exit partially filled, retrying remainder next cycle"
        );

        self.pending_exit = Some(PendingExit {
            reason,
            order_id: None,
            pending_polls: 0,
            attempts,
            unconfirmed: false,
        });

        Ok(DecisionEvent {
            quantity: Some(filled),
            realized_pnl: Some(realized),
            fee: Some(result.fee),
            ..self.decision_event(decision, sample)
        }
        .with_note(format!(
            "{} exit partially filled: sold {} of {} at {}, {} left",
            reason, filled, held, fill_price, remaining
        )))
    }

    fn close_position(
        &mut self,
        decision: &Decision,
        sample: PriceSample,
        reason: ExitReason,
        exit_price: Decimal,
        fee: Decimal,
        note: Option<String>,
    ) -> Result<DecisionEvent> {
        let closed = self.position.exit(exit_price, sample.timestamp, reason)?;
        self.pending_exit = None;

        let event = DecisionEvent {
            median: decision.median,
            current_price: Some(sample.price),
            deviation_pct: decision.deviation_pct,
            hold_duration: Some(elapsed(sample.timestamp, closed.position.entry_time)),
            quantity: Some(closed.position.quantity),
            entry_price: Some(closed.position.entry_price),
            realized_pnl: Some(closed.realized_pnl),
            fee: Some(fee),
            note,
            ..DecisionEvent::new(sample.timestamp, self.instrument_id(), Action::from(reason), self.paper())
        };

        self.stats.trades_closed += 1;
        if event.net_pnl().is_some_and(|net| net > Decimal::ZERO) {
            self.stats.wins += 1;
        } else {
            self.stats.losses += 1;
        }
        self.stats.total_realized_pnl += closed.realized_pnl;
        self.stats.total_fees += fee;
        metrics::set_realized_pnl(self.stats.total_realized_pnl);

        info!(
            reason = %reason,
            entry_price = %closed.position.entry_price,
            exit_price = %exit_price,
            quantity = closed.position.quantity,
            realized_pnl = %closed.realized_pnl,
            fee = %fee,
            "Position closed"
        );

        Ok(event)
    }

    fn decide(&self, price: Decimal, now: OffsetDateTime) -> Decision {
        decide(
            &self.rules,
            &DecisionInputs {
                price,
                median: self.window.median(),
                warm: self.window.is_warm(),
                position: self.position.position(),
                now,
            },
        )
    }

    /// HOLD event carrying the decision's figures and the open position.
    fn decision_event(&self, decision: &Decision, sample: PriceSample) -> DecisionEvent {
        let position = self.position.position();
        DecisionEvent {
            median: decision.median,
            current_price: Some(sample.price),
            deviation_pct: decision.deviation_pct,
            hold_duration: decision.hold_duration,
            quantity: position.map(|p| p.quantity),
            entry_price: position.map(|p| p.entry_price),
            note: decision.note.clone(),
            ..DecisionEvent::new(sample.timestamp, self.instrument_id(), Action::Hold, self.paper())
        }
    }

    fn hold_event(&self, timestamp: OffsetDateTime) -> DecisionEvent {
        DecisionEvent {
            median: self.window.median(),
            ..DecisionEvent::new(timestamp, self.instrument_id(), Action::Hold, self.paper())
        }
    }

    fn record(&mut self, event: &DecisionEvent) {
        if let Err(e) = self.recorder.append(event) {
            self.stats.recorder_failures += 1;
            metrics::inc_recorder_failures();
            warn!(error = %e, action = %event.action, "Failed to record decision");
        }
    }

    fn publish(&self, event: &DecisionEvent, now: OffsetDateTime) {
        let position = self.position.position().cloned();
        let last_price = self.window.latest().map(|s| s.price);
        let unrealized_pnl = last_price.and_then(|p| self.position.unrealized_pnl(p));
        let unrealized_pnl_pct = last_price.and_then(|p| self.position.unrealized_pnl_pct(p));
        let hold_seconds = position
            .as_ref()
            .map(|p| elapsed(now, p.entry_time).as_secs());

        self.snapshot_tx.send_replace(EngineSnapshot {
            instrument_id: self.config.kalshi_ticker.clone(),
            paper: self.paper(),
            cycle: self.cycle,
            window_len: self.window.len(),
            window_capacity: self.window.capacity(),
            prices: self.window.prices(),
            median: self.window.median(),
            last_price,
            deviation_pct: event.deviation_pct,
            position,
            unrealized_pnl,
            unrealized_pnl_pct,
            hold_seconds,
            last_action: Some(event.action),
            last_note: event.note.clone(),
            exit_pending: self.pending_exit.is_some(),
            stats: self.stats.clone(),
            updated_at: OffsetDateTime::now_utc(),
            halted: false,
        });
    }
}
