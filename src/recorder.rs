//! Append-only trade log.
//!
//! The decision loop hands every [`DecisionEvent`] to a [`TradeRecorder`].
//! Recorders never read back what they wrote.

use std::fs::{File, OpenOptions};
use std::path::Path;
use std::sync::{Arc, Mutex};

use serde::Serialize;
use time::format_description::well_known::Rfc3339;
use tracing::debug;

use crate::engine::DecisionEvent;
use crate::error::RecorderError;

/// Append-only sink for decision events.
pub trait TradeRecorder: Send {
    /// Persist one event.
    fn append(&mut self, event: &DecisionEvent) -> Result<(), RecorderError>;
}

/// Flat CSV row.
#[derive(Debug, Serialize)]
struct CsvRow<'a> {
    timestamp: String,
    ticker: &'a str,
    action: String,
    price: Option<String>,
    median: Option<String>,
    deviation_pct: Option<String>,
    hold_seconds: Option<u64>,
    quantity: Option<u32>,
    entry_price: Option<String>,
    pnl_pct: Option<String>,
    realized_pnl: Option<String>,
    fee: Option<String>,
    net_pnl: Option<String>,
    note: Option<&'a str>,
    mode: &'static str,
}

impl<'a> CsvRow<'a> {
    fn from_event(event: &'a DecisionEvent) -> Self {
        let fmt = |d: Option<rust_decimal::Decimal>| d.map(|v| v.normalize().to_string());
        Self {
            timestamp: event
                .timestamp
                .format(&Rfc3339)
                .unwrap_or_else(|_| event.timestamp.unix_timestamp().to_string()),
            ticker: &event.instrument_id,
            action: event.action.to_string(),
            price: fmt(event.current_price),
            median: fmt(event.median),
            deviation_pct: fmt(event.deviation_pct.map(|d| d.round_dp(4))),
            hold_seconds: event.hold_duration.map(|d| d.as_secs()),
            quantity: event.quantity,
            entry_price: fmt(event.entry_price),
            pnl_pct: fmt(event.pnl_pct().map(|d| d.round_dp(2))),
            realized_pnl: fmt(event.realized_pnl),
            fee: fmt(event.fee),
            net_pnl: fmt(event.net_pnl()),
            note: event.note.as_deref(),
            mode: if event.paper { "PAPER" } else { "LIVE" },
        }
    }
}

/// CSV file recorder. Appends to an existing log, writing the header only
/// when the file is new or empty.
pub struct CsvTradeRecorder {
    writer: csv::Writer<File>,
}

impl CsvTradeRecorder {
    /// Open (or create) the log at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, RecorderError> {
        let path = path.as_ref();
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        let is_empty = file.metadata()?.len() == 0;

        let writer = csv::WriterBuilder::new()
            .has_headers(is_empty)
            .from_writer(file);

        debug!(path = %path.display(), new_file = is_empty, "Trade log opened");
        Ok(Self { writer })
    }
}

impl TradeRecorder for CsvTradeRecorder {
    fn append(&mut self, event: &DecisionEvent) -> Result<(), RecorderError> {
        self.writer.serialize(CsvRow::from_event(event))?;
        self.writer.flush()?;
        Ok(())
    }
}

/// In-memory recorder. Clones share the same buffer.
#[derive(Debug, Clone, Default)]
pub struct MemoryRecorder {
    events: Arc<Mutex<Vec<DecisionEvent>>>,
}

impl MemoryRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything recorded so far.
    pub fn events(&self) -> Vec<DecisionEvent> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }
}

impl TradeRecorder for MemoryRecorder {
    fn append(&mut self, event: &DecisionEvent) -> Result<(), RecorderError> {
        let mut events = self
            .events
            .lock()
            .map_err(|_| RecorderError::Io(std::io::Error::other("recorder lock poisoned")))?;
        events.push(event.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategy::Action;
    use rust_decimal_macros::dec;
    use std::time::Duration;
    use time::macros::datetime;

    fn exit_event() -> DecisionEvent {
        DecisionEvent {
            median: Some(dec!(100)),
            current_price: Some(dec!(106)),
            deviation_pct: Some(dec!(6)),
            hold_duration: Some(Duration::from_secs(42)),
            quantity: Some(1),
            entry_price: Some(dec!(100)),
            realized_pnl: Some(dec!(6)),
            fee: Some(dec!(0.25)),
            ..DecisionEvent::new(datetime!(2025-01-01 12:00 UTC), "KXTEST", Action::ExitThreshold, true)
        }
    }

    #[test]
    fn csv_writes_header_once_across_reopens() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("trades.csv");

        let mut recorder = CsvTradeRecorder::open(&path).unwrap();
        recorder.append(&exit_event()).unwrap();
        drop(recorder);

        let mut recorder = CsvTradeRecorder::open(&path).unwrap();
        recorder
            .append(&DecisionEvent::new(datetime!(2025-01-01 12:00:02 UTC), "KXTEST", Action::Hold, true).with_note("warming up"))
            .unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("timestamp,ticker,action,price,median"));
        assert_eq!(
            lines[1],
            "2025-01-01T12:00:00Z,KXTEST,EXIT_THRESHOLD,106,100,6,42,1,100,6,6,0.25,5.75,,PAPER"
        );
        assert!(lines[2].contains(",HOLD,"));
        assert!(lines[2].ends_with("warming up,PAPER"));
    }

    #[test]
    fn memory_recorder_shares_buffer() {
        let recorder = MemoryRecorder::new();
        let mut writer = recorder.clone();
        writer.append(&exit_event()).unwrap();
        assert_eq!(recorder.events(), vec![exit_event()]);
    }
}
