//! HTTP API handlers.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use metrics_exporter_prometheus::PrometheusHandle;
use rust_decimal::Decimal;
use serde::Serialize;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use tokio::sync::watch;

use crate::engine::{EngineSnapshot, SessionStats};

/// Application state shared with handlers.
#[derive(Clone)]
pub struct AppState {
    /// Whether the decision loop is running.
    pub ready: Arc<AtomicBool>,
    /// Latest engine snapshot.
    pub snapshot: watch::Receiver<EngineSnapshot>,
    /// Prometheus handle for `/metrics`, when a recorder is installed.
    pub metrics: Option<PrometheusHandle>,
}

impl AppState {
    /// Create new app state.
    pub fn new(snapshot: watch::Receiver<EngineSnapshot>) -> Self {
        Self {
            ready: Arc::new(AtomicBool::new(false)),
            snapshot,
            metrics: None,
        }
    }

    /// Serve metrics from `handle`.
    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics = Some(handle);
        self
    }

    /// Set ready state.
    pub fn set_ready(&self, ready: bool) {
        self.ready.store(ready, Ordering::SeqCst);
    }

    /// Check if ready.
    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }
}

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Status: "ok".
    pub status: &'static str,
}

/// Readiness check response.
#[derive(Debug, Serialize)]
pub struct ReadyResponse {
    /// Loop running, window warm and not halted.
    pub ready: bool,
    /// Window filled.
    pub warm: bool,
    /// Loop stopped on a fatal error.
    pub halted: bool,
    /// Managed instrument.
    pub instrument: String,
}

/// Status response.
#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub status: &'static str,
    pub instrument: String,
    pub mode: &'static str,
    pub cycle: u64,
    pub window: WindowResponse,
    pub last_price: Option<String>,
    pub deviation_pct: Option<String>,
    pub position: Option<PositionResponse>,
    pub last_action: Option<String>,
    pub last_note: Option<String>,
    pub exit_pending: bool,
    pub stats: StatsResponse,
    pub updated_at: String,
}

/// Rolling window in status response.
#[derive(Debug, Serialize)]
pub struct WindowResponse {
    pub len: usize,
    pub capacity: usize,
    pub warm: bool,
    pub median: Option<String>,
    pub prices: Vec<String>,
}

/// Open position in status response.
#[derive(Debug, Serialize)]
pub struct PositionResponse {
    pub entry_price: String,
    pub quantity: u32,
    pub entry_time: String,
    pub peak_price: String,
    pub unrealized_pnl: Option<String>,
    pub unrealized_pnl_pct: Option<String>,
    pub hold_seconds: Option<u64>,
}

/// Statistics in status response.
#[derive(Debug, Serialize)]
pub struct StatsResponse {
    pub cycles: u64,
    pub trades_closed: u64,
    pub wins: u64,
    pub losses: u64,
    pub win_rate_pct: Option<String>,
    pub total_realized_pnl: String,
    pub total_fees: String,
    pub net_pnl: String,
    pub failed_exit_attempts: u64,
    pub price_fetch_failures: u64,
    pub reconciliation_alarms: u64,
}

impl From<&SessionStats> for StatsResponse {
    fn from(stats: &SessionStats) -> Self {
        Self {
            cycles: stats.cycles,
            trades_closed: stats.trades_closed,
            wins: stats.wins,
            losses: stats.losses,
            win_rate_pct: stats.win_rate().map(|r| r.round_dp(2).normalize().to_string()),
            total_realized_pnl: stats.total_realized_pnl.to_string(),
            total_fees: stats.total_fees.to_string(),
            net_pnl: stats.net_pnl().to_string(),
            failed_exit_attempts: stats.failed_exit_attempts,
            price_fetch_failures: stats.price_fetch_failures,
            reconciliation_alarms: stats.reconciliation_alarms,
        }
    }
}

fn dec(value: Option<Decimal>) -> Option<String> {
    value.map(|d| d.normalize().to_string())
}

fn rfc3339(t: OffsetDateTime) -> String {
    t.format(&Rfc3339).unwrap_or_default()
}

/// Health check handler - always returns 200.
pub async fn health() -> impl IntoResponse {
    Json(HealthResponse { status: "ok" })
}

/// Readiness check handler - returns 200 once the loop is running with a
/// warm window, 503 otherwise.
pub async fn ready(State(state): State<AppState>) -> impl IntoResponse {
    let snapshot = state.snapshot.borrow().clone();
    let warm = snapshot.is_warm();
    let is_ready = state.is_ready() && warm && !snapshot.halted;

    let response = ReadyResponse {
        ready: is_ready,
        warm,
        halted: snapshot.halted,
        instrument: snapshot.instrument_id,
    };

    if is_ready {
        (StatusCode::OK, Json(response))
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, Json(response))
    }
}

/// Status handler - returns engine state and session statistics.
pub async fn status(State(state): State<AppState>) -> impl IntoResponse {
    let snap = state.snapshot.borrow().clone();

    let status = if snap.halted {
        "halted"
    } else if !state.is_ready() {
        "starting"
    } else if !snap.is_warm() {
        "warming_up"
    } else {
        "running"
    };

    let position = snap.position.as_ref().map(|p| PositionResponse {
        entry_price: p.entry_price.to_string(),
        quantity: p.quantity,
        entry_time: rfc3339(p.entry_time),
        peak_price: p.peak_price.to_string(),
        unrealized_pnl: dec(snap.unrealized_pnl),
        unrealized_pnl_pct: dec(snap.unrealized_pnl_pct.map(|d| d.round_dp(2))),
        hold_seconds: snap.hold_seconds,
    });

    Json(StatusResponse {
        status,
        instrument: snap.instrument_id.clone(),
        mode: if snap.paper { "paper" } else { "live" },
        cycle: snap.cycle,
        window: WindowResponse {
            len: snap.window_len,
            capacity: snap.window_capacity,
            warm: snap.is_warm(),
            median: dec(snap.median),
            prices: snap.prices.iter().map(|p| p.to_string()).collect(),
        },
        last_price: dec(snap.last_price),
        deviation_pct: dec(snap.deviation_pct.map(|d| d.round_dp(4))),
        position,
        last_action: snap.last_action.map(|a| a.to_string()),
        last_note: snap.last_note.clone(),
        exit_pending: snap.exit_pending,
        stats: StatsResponse::from(&snap.stats),
        updated_at: rfc3339(snap.updated_at),
    })
}

/// Prometheus exposition.
pub async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    match &state.metrics {
        Some(handle) => (StatusCode::OK, handle.render()),
        None => (StatusCode::NOT_FOUND, "metrics recorder not installed".to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn app_state_ready_toggle() {
        let (_tx, rx) = watch::channel(EngineSnapshot::initial("T", true, 3));
        let state = AppState::new(rx);
        assert!(!state.is_ready());

        state.set_ready(true);
        assert!(state.is_ready());

        state.set_ready(false);
        assert!(!state.is_ready());
    }

    #[test]
    fn stats_response_formats_decimals() {
        let stats = SessionStats {
            trades_closed: 2,
            wins: 1,
            total_realized_pnl: Decimal::new(125, 2),
            ..SessionStats::default()
        };
        let response = StatsResponse::from(&stats);
        assert_eq!(response.total_realized_pnl, "1.25");
        assert_eq!(response.win_rate_pct.as_deref(), Some("50"));
    }
}
