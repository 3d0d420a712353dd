//! End-to-end tests for the decision loop against scripted collaborators.
//!
//! No network access; prices, fills and the exchange position are all
//! scripted through the mocks.

use std::sync::Arc;
use std::time::Duration;

use pretty_assertions::assert_eq;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tokio::sync::watch;

use median_reversion_bot::config::Config;
use median_reversion_bot::engine::{TradeDecisionLoop, STALE_ORDER_POLLS};
use median_reversion_bot::market::{MockMarketData, MockOrderExecutor};
use median_reversion_bot::recorder::{CsvTradeRecorder, MemoryRecorder};
use median_reversion_bot::strategy::{Action, ManualOnly};
use median_reversion_bot::trading::PaperExecutor;
use median_reversion_bot::BotError;

const TICKER: &str = "KXTEST-25JAN01";

type MockLoop = TradeDecisionLoop<MockMarketData, MockOrderExecutor, MemoryRecorder>;

fn config(window_size: usize, entry_policy: &str) -> Config {
    Config {
        kalshi_ticker: TICKER.to_string(),
        window_size,
        deviation_threshold_pct: dec!(5.0),
        max_hold_seconds: 3600,
        refresh_interval_seconds: 1,
        entry_policy: entry_policy.to_string(),
        reconcile_every_cycles: 100,
        paper_trading: true,
        order_timeout_ms: 1000,
        order_poll_interval_ms: 10,
        ..Config::default()
    }
}

struct Harness {
    market: MockMarketData,
    executor: MockOrderExecutor,
    recorder: MemoryRecorder,
    bot: MockLoop,
}

fn harness(config: Config) -> Harness {
    let market = MockMarketData::new(time::Duration::seconds(10));
    let executor = MockOrderExecutor::new();
    let recorder = MemoryRecorder::new();
    let bot = TradeDecisionLoop::new(
        Arc::new(config),
        Arc::new(market.clone()),
        Arc::new(executor.clone()),
        recorder.clone(),
    )
    .unwrap();

    Harness {
        market,
        executor,
        recorder,
        bot,
    }
}

/// Feed `prices` and run one cycle per price, returning the actions.
async fn run_prices(h: &mut Harness, prices: &[Decimal]) -> Vec<Action> {
    let mut actions = Vec::new();
    for price in prices {
        h.market.push_price(*price);
        actions.push(h.bot.run_cycle().await.unwrap().action);
    }
    actions
}

#[tokio::test]
async fn threshold_exit_after_warm_up() {
    let mut h = harness(config(3, "manual"));

    let warmup = run_prices(&mut h, &[dec!(100), dec!(100), dec!(100)]).await;
    assert_eq!(warmup, vec![Action::Hold; 3]);
    assert_eq!(h.bot.window().median(), Some(dec!(100)));

    h.executor.hold(TICKER, 1, dec!(100));
    let entry_time = h.market.next_timestamp();
    h.bot.open_position(dec!(100), 1, entry_time).unwrap();

    h.market.push_price(dec!(106));
    let event = h.bot.run_cycle().await.unwrap();

    assert_eq!(event.action, Action::ExitThreshold);
    assert_eq!(event.median, Some(dec!(100)));
    assert_eq!(event.deviation_pct, Some(dec!(6)));
    assert_eq!(event.realized_pnl, Some(dec!(6)));
    assert_eq!(event.current_price, Some(dec!(106)));
    assert!(!h.bot.position().is_open());

    let orders = h.executor.submitted_orders();
    assert_eq!(orders.len(), 1);
    assert_eq!(orders[0].quantity, 1);
    assert_eq!(h.executor.position(), None);

    let stats = h.bot.stats();
    assert_eq!(stats.trades_closed, 1);
    assert_eq!(stats.wins, 1);
    assert_eq!(stats.total_realized_pnl, dec!(6));
}

#[tokio::test]
async fn timeout_exit_when_price_never_moves() {
    let mut cfg = config(3, "manual");
    cfg.max_hold_seconds = 60;
    let mut h = harness(cfg);

    run_prices(&mut h, &[dec!(100), dec!(100), dec!(100)]).await;

    // Entry at T=0; prices then arrive every 10 seconds.
    h.executor.hold(TICKER, 1, dec!(100));
    let entry_time = h.market.next_timestamp();
    h.bot.open_position(dec!(100), 1, entry_time).unwrap();

    let mut actions = run_prices(&mut h, &[dec!(100); 6]).await;
    assert_eq!(actions, vec![Action::Hold; 6]);

    h.market.push_price(dec!(100));
    let event = h.bot.run_cycle().await.unwrap();
    actions.push(event.action);

    assert_eq!(event.action, Action::ExitTimeout);
    assert_eq!(event.hold_duration, Some(Duration::from_secs(60)));
    assert_eq!(event.deviation_pct, Some(Decimal::ZERO));
    assert_eq!(event.realized_pnl, Some(Decimal::ZERO));
    assert!(!h.bot.position().is_open());
}

#[tokio::test]
async fn no_entry_or_exit_before_window_is_warm() {
    let mut h = harness(config(3, "adopt"));
    h.executor.hold(TICKER, 2, dec!(0.40));

    let actions = run_prices(&mut h, &[dec!(0.40), dec!(0.60)]).await;
    assert_eq!(actions, vec![Action::Hold, Action::Hold]);
    assert!(!h.bot.position().is_open());

    let events = h.recorder.events();
    assert!(events
        .iter()
        .all(|e| e.note.as_deref() == Some("warming up")));

    // The third sample warms the window and the exchange position is adopted.
    let actions = run_prices(&mut h, &[dec!(0.40)]).await;
    assert_eq!(actions, vec![Action::Enter]);
}

#[tokio::test]
async fn adopted_position_exits_on_threshold() {
    let mut h = harness(config(3, "adopt"));
    h.executor.hold(TICKER, 5, dec!(0.40));

    let actions = run_prices(&mut h, &[dec!(0.40), dec!(0.40), dec!(0.40)]).await;
    assert_eq!(actions.last(), Some(&Action::Enter));

    let position = h.bot.position().position().cloned().unwrap();
    assert_eq!(position.quantity, 5);
    assert_eq!(position.entry_price, dec!(0.40));

    h.market.push_price(dec!(0.43));
    let event = h.bot.run_cycle().await.unwrap();

    assert_eq!(event.action, Action::ExitThreshold);
    assert_eq!(event.deviation_pct, Some(dec!(7.5)));
    assert_eq!(event.realized_pnl, Some(dec!(0.15)));
    assert_eq!(h.executor.position(), None);
}

#[tokio::test]
async fn rejected_exit_is_retried_next_cycle() {
    let mut h = harness(config(3, "manual"));
    run_prices(&mut h, &[dec!(100), dec!(100), dec!(100)]).await;

    h.executor.hold(TICKER, 1, dec!(100));
    let entry_time = h.market.next_timestamp();
    h.bot.open_position(dec!(100), 1, entry_time).unwrap();
    h.executor.reject_next_orders(1);

    h.market.push_price(dec!(106));
    let event = h.bot.run_cycle().await.unwrap();
    assert_eq!(event.action, Action::Hold);
    assert!(event
        .note
        .as_deref()
        .is_some_and(|n| n.contains("exit rejected")));
    assert!(h.bot.position().is_open());
    assert_eq!(h.bot.stats().failed_exit_attempts, 1);

    // Price is back at the median, but the earlier decision still stands.
    h.market.push_price(dec!(100));
    let event = h.bot.run_cycle().await.unwrap();
    assert_eq!(event.action, Action::ExitThreshold);
    assert_eq!(event.realized_pnl, Some(Decimal::ZERO));
    assert_eq!(h.executor.submitted_orders().len(), 2);
}

#[tokio::test]
async fn failed_submission_is_reconciled_before_retry() {
    let mut h = harness(config(3, "manual"));
    run_prices(&mut h, &[dec!(100), dec!(100), dec!(100)]).await;

    h.executor.hold(TICKER, 1, dec!(100));
    let entry_time = h.market.next_timestamp();
    h.bot.open_position(dec!(100), 1, entry_time).unwrap();
    h.executor.fail_next_submissions(1);

    h.market.push_price(dec!(106));
    let event = h.bot.run_cycle().await.unwrap();
    assert_eq!(event.action, Action::Hold);
    assert!(event
        .note
        .as_deref()
        .is_some_and(|n| n.contains("exit failed")));

    // Exchange still shows the contract, so the exit is resubmitted.
    h.market.push_price(dec!(106));
    let event = h.bot.run_cycle().await.unwrap();
    assert_eq!(event.action, Action::ExitThreshold);
    assert_eq!(h.executor.submitted_orders().len(), 2);
    assert_eq!(h.bot.stats().reconciliation_alarms, 0);
}

#[tokio::test]
async fn failed_submission_that_actually_filled_is_not_resubmitted() {
    let mut h = harness(config(3, "manual"));
    run_prices(&mut h, &[dec!(100), dec!(100), dec!(100)]).await;

    h.executor.hold(TICKER, 1, dec!(100));
    let entry_time = h.market.next_timestamp();
    h.bot.open_position(dec!(100), 1, entry_time).unwrap();
    h.executor.fail_next_submissions(1);

    h.market.push_price(dec!(106));
    h.bot.run_cycle().await.unwrap();

    // The order reached the exchange after all.
    h.executor.set_position(None);

    h.market.push_price(dec!(106));
    let event = h.bot.run_cycle().await.unwrap();
    assert_eq!(event.action, Action::ExitThreshold);
    assert_eq!(event.note.as_deref(), Some("exit confirmed by reconciliation"));
    assert_eq!(h.executor.submitted_orders().len(), 1);
    assert_eq!(h.bot.stats().reconciliation_alarms, 0);
}

#[tokio::test]
async fn position_closed_outside_the_bot_raises_alarm() {
    let mut cfg = config(3, "manual");
    cfg.reconcile_every_cycles = 1;
    let mut h = harness(cfg);
    run_prices(&mut h, &[dec!(100), dec!(100), dec!(100)]).await;

    let entry_time = h.market.next_timestamp();
    h.bot.open_position(dec!(100), 1, entry_time).unwrap();

    // The exchange reports nothing held.
    h.market.push_price(dec!(101));
    let event = h.bot.run_cycle().await.unwrap();

    assert_eq!(event.action, Action::ExitManual);
    assert_eq!(event.note.as_deref(), Some("position closed outside the bot"));
    assert!(!h.bot.position().is_open());
    assert_eq!(h.bot.stats().reconciliation_alarms, 1);
    assert!(h.executor.submitted_orders().is_empty());
}

#[tokio::test]
async fn unexpected_exchange_position_raises_alarm_when_manual() {
    let mut h = harness(config(3, "manual"));
    h.executor.hold(TICKER, 4, dec!(0.30));

    let actions = run_prices(&mut h, &[dec!(0.30), dec!(0.30), dec!(0.30)]).await;
    assert_eq!(actions, vec![Action::Hold; 3]);

    let last = h.recorder.events().pop().unwrap();
    assert_eq!(
        last.note.as_deref(),
        Some("exchange reports 4 contracts but local state is FLAT")
    );
    assert_eq!(h.bot.stats().reconciliation_alarms, 1);
    assert!(!h.bot.position().is_open());
}

#[tokio::test]
async fn price_fetch_failure_is_a_hold() {
    let mut h = harness(config(3, "manual"));
    h.market.push_price(dec!(100));
    h.market.push_failure("connection reset");
    h.market.push_price(dec!(100));

    assert_eq!(h.bot.run_cycle().await.unwrap().action, Action::Hold);

    let event = h.bot.run_cycle().await.unwrap();
    assert_eq!(event.action, Action::Hold);
    assert_eq!(event.current_price, None);
    assert!(event
        .note
        .as_deref()
        .is_some_and(|n| n.starts_with("price fetch failed")));
    assert_eq!(h.bot.window().len(), 1);
    assert_eq!(h.bot.stats().price_fetch_failures, 1);

    h.bot.run_cycle().await.unwrap();
    assert_eq!(h.bot.window().len(), 2);
    assert_eq!(h.bot.stats().cycles, 3);
}

#[tokio::test]
async fn every_cycle_is_recorded_and_published() {
    let mut h = harness(config(3, "manual"));
    let snapshots = h.bot.subscribe();

    run_prices(&mut h, &[dec!(100), dec!(100), dec!(100)]).await;
    h.executor.hold(TICKER, 1, dec!(100));
    let entry_time = h.market.next_timestamp();
    h.bot.open_position(dec!(100), 1, entry_time).unwrap();
    run_prices(&mut h, &[dec!(106)]).await;

    let actions: Vec<Action> = h.recorder.events().iter().map(|e| e.action).collect();
    assert_eq!(
        actions,
        vec![
            Action::Hold,
            Action::Hold,
            Action::Hold,
            Action::Enter,
            Action::ExitThreshold
        ]
    );

    let snapshot = snapshots.borrow().clone();
    assert_eq!(snapshot.cycle, 4);
    assert_eq!(snapshot.last_action, Some(Action::ExitThreshold));
    assert!(snapshot.position.is_none());
    assert_eq!(snapshot.stats.trades_closed, 1);
    assert_eq!(snapshot.prices, vec![dec!(100), dec!(100), dec!(106)]);
    assert!(!snapshot.halted);
}

#[tokio::test]
async fn opening_twice_is_a_state_error() {
    let mut h = harness(config(3, "manual"));
    let t = h.market.next_timestamp();

    let opened = tokio_test::assert_ok!(h.bot.open_position(dec!(0.50), 1, t));
    assert_eq!(opened.action, Action::Enter);
    assert_eq!(opened.note.as_deref(), Some("opened by operator"));

    let err = h.bot.open_position(dec!(0.55), 2, t).unwrap_err();

    assert!(matches!(err, BotError::State(_)));
    let position = h.bot.position().position().unwrap();
    assert_eq!(position.entry_price, dec!(0.50));
    assert_eq!(position.quantity, 1);
}

#[test]
fn invalid_config_is_rejected_at_construction() {
    let cfg = Config {
        window_size: 0,
        ..config(3, "manual")
    };
    let result = MockLoop::new(
        Arc::new(cfg),
        Arc::new(MockMarketData::new(time::Duration::seconds(1))),
        Arc::new(MockOrderExecutor::new()),
        MemoryRecorder::new(),
    );
    assert!(result.is_err());
}

#[tokio::test(start_paused = true)]
async fn run_stops_between_cycles_on_shutdown() {
    let mut h = harness(config(3, "manual"));
    h.market
        .push_prices(&[dec!(100), dec!(100), dec!(100), dec!(100), dec!(100)]);

    let (tx, rx) = watch::channel(false);
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(2500)).await;
        let _ = tx.send(true);
    });

    let stats = h.bot.run(rx).await.unwrap();
    assert_eq!(stats.cycles, 3);
    assert_eq!(h.market.remaining(), 2);
}

#[tokio::test]
async fn run_does_nothing_when_already_shut_down() {
    let mut h = harness(config(3, "manual"));
    h.market.push_price(dec!(100));

    let (_tx, rx) = watch::channel(true);
    let stats = h.bot.run(rx).await.unwrap();

    assert_eq!(stats.cycles, 0);
    assert_eq!(h.market.fetch_count(), 0);
}

#[tokio::test]
async fn paper_session_writes_csv_log() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("simulated_trades.csv");

    let market = MockMarketData::new(time::Duration::seconds(10));
    let executor = PaperExecutor::new().with_position(TICKER, 3, dec!(0.20));
    let recorder = CsvTradeRecorder::open(&path).unwrap();
    let mut bot = TradeDecisionLoop::new(
        Arc::new(config(3, "adopt")),
        Arc::new(market.clone()),
        Arc::new(executor),
        recorder,
    )
    .unwrap();

    market.push_prices(&[dec!(0.20), dec!(0.20), dec!(0.20), dec!(0.22)]);
    let mut actions = Vec::new();
    for _ in 0..4 {
        actions.push(bot.run_cycle().await.unwrap().action);
    }
    assert_eq!(
        actions,
        vec![Action::Hold, Action::Hold, Action::Enter, Action::ExitThreshold]
    );
    assert_eq!(bot.stats().total_realized_pnl, dec!(0.06));

    let contents = std::fs::read_to_string(&path).unwrap();
    let lines: Vec<&str> = contents.lines().collect();
    assert_eq!(lines.len(), 5);
    assert!(lines[0].starts_with("timestamp,ticker,action"));
    assert!(lines[4].contains("EXIT_THRESHOLD"));
    assert!(lines[4].ends_with("PAPER"));
}

#[tokio::test]
async fn manual_policy_override_ignores_exchange_position() {
    let market = MockMarketData::new(time::Duration::seconds(10));
    let executor = MockOrderExecutor::new();
    executor.hold(TICKER, 1, dec!(0.50));

    let mut bot = TradeDecisionLoop::new(
        Arc::new(config(3, "adopt")),
        Arc::new(market.clone()),
        Arc::new(executor.clone()),
        MemoryRecorder::new(),
    )
    .unwrap()
    .with_entry_policy(Box::new(ManualOnly));

    market.push_prices(&[dec!(0.50), dec!(0.50), dec!(0.50)]);
    for _ in 0..3 {
        assert_eq!(bot.run_cycle().await.unwrap().action, Action::Hold);
    }
    assert!(!bot.position().is_open());
}

/// Warm a manual-policy harness at 100 and open `quantity` contracts at 100.
async fn warm_and_open(h: &mut Harness, quantity: u32) {
    run_prices(h, &[dec!(100), dec!(100), dec!(100)]).await;
    h.executor.hold(TICKER, quantity, dec!(100));
    let entry_time = h.market.next_timestamp();
    h.bot.open_position(dec!(100), quantity, entry_time).unwrap();
}

fn note_of(event: &median_reversion_bot::DecisionEvent) -> &str {
    event.note.as_deref().unwrap_or_default()
}

#[tokio::test]
async fn partial_fill_shrinks_position_and_sells_remainder() {
    let mut h = harness(config(3, "manual"));
    warm_and_open(&mut h, 10).await;
    h.executor.partial_fill_next(6);

    h.market.push_price(dec!(106));
    let event = h.bot.run_cycle().await.unwrap();
    assert_eq!(event.action, Action::Hold);
    assert!(note_of(&event).contains("partially filled: sold 6 of 10"), "{:?}", event.note);
    assert_eq!(event.quantity, Some(6));
    assert_eq!(event.realized_pnl, Some(dec!(36)));
    assert_eq!(h.bot.position().position().map(|p| p.quantity), Some(4));
    assert_eq!(h.executor.position().map(|p| p.quantity), Some(4));

    // Only the remaining contracts are offered on the retry.
    h.market.push_price(dec!(106));
    let event = h.bot.run_cycle().await.unwrap();
    assert_eq!(event.action, Action::ExitThreshold);
    assert_eq!(event.quantity, Some(4));
    assert_eq!(event.realized_pnl, Some(dec!(24)));

    let orders = h.executor.submitted_orders();
    assert_eq!(orders.len(), 2);
    assert_eq!(orders[1].quantity, 4);
    assert_eq!(h.executor.position(), None);
    assert_eq!(h.bot.stats().total_realized_pnl, dec!(60));
    assert_eq!(h.bot.stats().trades_closed, 1);
}

#[tokio::test]
async fn resting_exit_order_resolves_on_a_later_cycle() {
    let mut cfg = config(3, "manual");
    cfg.order_timeout_ms = 50;
    let mut h = harness(cfg);
    warm_and_open(&mut h, 1).await;
    h.executor.set_pending_polls(u32::MAX);

    h.market.push_price(dec!(106));
    let event = h.bot.run_cycle().await.unwrap();
    assert_eq!(event.action, Action::Hold);
    assert!(note_of(&event).contains("not filled in time"), "{:?}", event.note);

    h.market.push_price(dec!(106));
    let event = h.bot.run_cycle().await.unwrap();
    assert_eq!(event.action, Action::Hold);
    assert_eq!(note_of(&event), "exit order mock-1 still pending");
    assert!(h.bot.position().is_open());

    h.executor.release_pending_orders();
    h.market.push_price(dec!(100));
    let event = h.bot.run_cycle().await.unwrap();
    assert_eq!(event.action, Action::ExitThreshold);
    assert_eq!(event.realized_pnl, Some(dec!(6)));
    assert_eq!(h.executor.submitted_orders().len(), 1);
    assert!(h.executor.cancelled_orders().is_empty());
    assert!(!h.bot.position().is_open());
}

#[tokio::test]
async fn stale_exit_order_is_cancelled_and_resubmitted() {
    let mut cfg = config(3, "manual");
    cfg.order_timeout_ms = 50;
    let mut h = harness(cfg);
    warm_and_open(&mut h, 1).await;
    h.executor.set_pending_polls(u32::MAX);

    h.market.push_price(dec!(106));
    h.bot.run_cycle().await.unwrap();
    for _ in 1..STALE_ORDER_POLLS {
        h.market.push_price(dec!(106));
        let event = h.bot.run_cycle().await.unwrap();
        assert!(note_of(&event).ends_with("still pending"), "{:?}", event.note);
    }
    assert!(h.executor.cancelled_orders().is_empty());

    // The replacement order fills at once.
    h.executor.set_pending_polls(0);
    h.market.push_price(dec!(106));
    let event = h.bot.run_cycle().await.unwrap();

    assert_eq!(event.action, Action::ExitThreshold);
    assert_eq!(h.executor.cancelled_orders(), vec!["mock-1".to_string()]);
    assert_eq!(h.executor.submitted_orders().len(), 2);
    assert_eq!(h.executor.position(), None);
    assert!(!h.bot.position().is_open());
}

#[tokio::test(start_paused = true)]
async fn slow_price_fetch_times_out_as_a_hold() {
    let mut cfg = config(3, "manual");
    cfg.fetch_timeout_ms = 100;
    let mut h = harness(cfg);
    h.market.set_latency(Duration::from_secs(1));
    h.market.push_price(dec!(100));

    let event = h.bot.run_cycle().await.unwrap();
    assert_eq!(event.action, Action::Hold);
    assert_eq!(event.current_price, None);
    assert_eq!(note_of(&event), "price fetch failed: timed out after 100ms");
    assert_eq!(h.bot.window().len(), 0);
    assert_eq!(h.bot.stats().price_fetch_failures, 1);
    assert_eq!(h.market.remaining(), 1);
}

#[tokio::test]
async fn stop_loss_exit_through_the_loop() {
    let mut cfg = config(3, "manual");
    cfg.stop_loss_pct = Some(dec!(10));
    let mut h = harness(cfg);
    warm_and_open(&mut h, 1).await;

    h.market.push_price(dec!(90));
    let event = h.bot.run_cycle().await.unwrap();

    assert_eq!(event.action, Action::ExitStopLoss);
    assert_eq!(event.deviation_pct, Some(dec!(-10)));
    assert_eq!(event.realized_pnl, Some(dec!(-10)));
    assert!(note_of(&event).starts_with("stop loss"), "{:?}", event.note);
    assert_eq!(h.bot.stats().losses, 1);
    assert_eq!(h.executor.position(), None);
}

#[tokio::test]
async fn max_loss_stop_waits_for_min_hold() {
    let mut cfg = config(3, "manual");
    cfg.min_hold_seconds = 30;
    cfg.max_loss_pct = Some(dec!(5));
    let mut h = harness(cfg);
    warm_and_open(&mut h, 1).await;

    // Samples arrive every 10 seconds, starting at the entry time.
    let actions = run_prices(&mut h, &[dec!(90), dec!(90), dec!(90)]).await;
    assert_eq!(actions, vec![Action::Hold; 3]);

    h.market.push_price(dec!(90));
    let event = h.bot.run_cycle().await.unwrap();
    assert_eq!(event.action, Action::ExitStopLoss);
    assert_eq!(event.hold_duration, Some(Duration::from_secs(30)));
    assert!(note_of(&event).starts_with("max loss"), "{:?}", event.note);
}

#[tokio::test]
async fn exit_fee_is_reported_and_netted() {
    let mut h = harness(config(3, "manual"));
    warm_and_open(&mut h, 1).await;
    h.executor.set_fee(dec!(0.25));

    h.market.push_price(dec!(106));
    let event = h.bot.run_cycle().await.unwrap();

    assert_eq!(event.action, Action::ExitThreshold);
    assert_eq!(event.fee, Some(dec!(0.25)));
    assert_eq!(event.net_pnl(), Some(dec!(5.75)));
    let stats = h.bot.stats();
    assert_eq!(stats.total_fees, dec!(0.25));
    assert_eq!(stats.net_pnl(), dec!(5.75));
    assert_eq!(stats.wins, 1);
}

#[tokio::test]
async fn position_query_failure_keeps_position_open() {
    let mut cfg = config(3, "manual");
    cfg.reconcile_every_cycles = 1;
    let mut h = harness(cfg);
    warm_and_open(&mut h, 1).await;
    h.executor.fail_positions(true);

    h.market.push_price(dec!(101));
    let event = h.bot.run_cycle().await.unwrap();
    assert_eq!(event.action, Action::Hold);
    assert!(h.bot.position().is_open());
    assert_eq!(h.bot.stats().reconciliation_alarms, 0);

    h.executor.fail_positions(false);
    h.market.push_price(dec!(101));
    assert_eq!(h.bot.run_cycle().await.unwrap().action, Action::Hold);
    assert!(h.bot.position().is_open());
}

#[tokio::test]
async fn reconciliation_shrinks_position_to_exchange_quantity() {
    let mut cfg = config(3, "manual");
    cfg.reconcile_every_cycles = 1;
    let mut h = harness(cfg);
    warm_and_open(&mut h, 10).await;
    h.executor.hold(TICKER, 4, dec!(100));

    h.market.push_price(dec!(101));
    let event = h.bot.run_cycle().await.unwrap();
    assert_eq!(event.action, Action::Hold);
    assert_eq!(h.bot.position().position().map(|p| p.quantity), Some(4));
    assert_eq!(h.bot.stats().reconciliation_alarms, 1);

    h.market.push_price(dec!(110));
    let event = h.bot.run_cycle().await.unwrap();
    assert_eq!(event.action, Action::ExitThreshold);
    assert_eq!(h.executor.submitted_orders()[0].quantity, 4);
    assert_eq!(h.executor.position(), None);
}
