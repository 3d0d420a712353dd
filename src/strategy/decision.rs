//! The pure exit decision.
//!
//! [`decide`] has no hidden state: identical inputs always produce an identical
//! [`Decision`]. The decision loop owns every side effect.

use std::time::Duration;

use rust_decimal::Decimal;
use strum::{Display, EnumString};
use time::OffsetDateTime;

use super::deviation::{deviation_pct, should_exit_on_deviation};
use super::risk_clock::{elapsed, should_force_exit};
use super::stops::SafetyStops;
use crate::config::Config;
use crate::trading::{ExitReason, Position};

/// What a cycle decided to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString)]
pub enum Action {
    #[strum(to_string = "HOLD")]
    Hold,
    #[strum(to_string = "ENTER")]
    Enter,
    #[strum(to_string = "EXIT_THRESHOLD")]
    ExitThreshold,
    #[strum(to_string = "EXIT_TIMEOUT")]
    ExitTimeout,
    #[strum(to_string = "EXIT_STOP_LOSS")]
    ExitStopLoss,
    #[strum(to_string = "EXIT_MANUAL")]
    ExitManual,
}

impl Action {
    /// Whether this action closes the position.
    pub fn is_exit(&self) -> bool {
        self.exit_reason().is_some()
    }

    /// The exit reason for exit actions.
    pub fn exit_reason(&self) -> Option<ExitReason> {
        match self {
            Action::ExitThreshold => Some(ExitReason::Threshold),
            Action::ExitTimeout => Some(ExitReason::Timeout),
            Action::ExitStopLoss => Some(ExitReason::StopLoss),
            Action::ExitManual => Some(ExitReason::Manual),
            Action::Hold | Action::Enter => None,
        }
    }
}

impl From<ExitReason> for Action {
    fn from(reason: ExitReason) -> Self {
        match reason {
            ExitReason::Threshold => Action::ExitThreshold,
            ExitReason::Timeout => Action::ExitTimeout,
            ExitReason::StopLoss => Action::ExitStopLoss,
            ExitReason::Manual => Action::ExitManual,
        }
    }
}

/// Exit thresholds, fixed for the lifetime of the loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExitRules {
    /// Deviation above the median, in percent, that triggers an exit.
    pub threshold_pct: Decimal,
    /// Longest a position may be held.
    pub max_hold: Duration,
    /// Protective stops, checked after the threshold and max-hold exits.
    pub stops: SafetyStops,
}

impl ExitRules {
    /// Build from configuration.
    pub fn from_config(config: &Config) -> Self {
        Self {
            threshold_pct: config.deviation_threshold_pct,
            max_hold: config.max_hold(),
            stops: SafetyStops::from_config(config),
        }
    }
}

/// Everything [`decide`] looks at.
#[derive(Debug, Clone, Copy)]
pub struct DecisionInputs<'a> {
    /// Current price.
    pub price: Decimal,
    /// Rolling median, if any.
    pub median: Option<Decimal>,
    /// Whether the window is full.
    pub warm: bool,
    /// Open position, if any.
    pub position: Option<&'a Position>,
    /// Decision time.
    pub now: OffsetDateTime,
}

/// Output of [`decide`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decision {
    pub action: Action,
    pub median: Option<Decimal>,
    pub deviation_pct: Option<Decimal>,
    pub hold_duration: Option<Duration>,
    pub note: Option<String>,
}

impl Decision {
    fn hold(median: Option<Decimal>, note: impl Into<String>) -> Self {
        Self {
            action: Action::Hold,
            median,
            deviation_pct: None,
            hold_duration: None,
            note: Some(note.into()),
        }
    }
}

/// Evaluate the exit rules for one cycle.
///
/// Order of precedence for an open position: deviation threshold, then max
/// hold, then the safety stops. A stop exit carries a note naming the stop. A cold window or a zero median never acts. A flat
/// position always holds here; entry is the entry policy's concern.
pub fn decide(rules: &ExitRules, inputs: &DecisionInputs<'_>) -> Decision {
    if !inputs.warm {
        return Decision::hold(inputs.median, "warming up");
    }

    let deviation = match deviation_pct(inputs.price, inputs.median) {
        Ok(d) => d,
        Err(_) => return Decision::hold(inputs.median, "insufficient data"),
    };

    let Some(position) = inputs.position else {
        return Decision {
            action: Action::Hold,
            median: inputs.median,
            deviation_pct: Some(deviation),
            hold_duration: None,
            note: None,
        };
    };

    let held = elapsed(inputs.now, position.entry_time);

    let (action, note) = if should_exit_on_deviation(deviation, rules.threshold_pct) {
        (Action::ExitThreshold, None)
    } else if should_force_exit(held, rules.max_hold) {
        (Action::ExitTimeout, None)
    } else if let Some(stop) = rules.stops.check(position, inputs.price, held) {
        (Action::ExitStopLoss, Some(stop))
    } else {
        (Action::Hold, None)
    };

    Decision {
        action,
        median: inputs.median,
        deviation_pct: Some(deviation),
        hold_duration: Some(held),
        note,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategy::stops::{StopLoss, TrailingStop};
    use rust_decimal_macros::dec;
    use time::macros::datetime;

    const T0: OffsetDateTime = datetime!(2025-01-01 12:00 UTC);

    fn rules() -> ExitRules {
        ExitRules {
            threshold_pct: dec!(5.0),
            max_hold: Duration::from_secs(3600),
            stops: SafetyStops::default(),
        }
    }

    fn position(entry_price: Decimal) -> Position {
        Position {
            instrument_id: "T".to_string(),
            entry_price,
            entry_time: T0,
            quantity: 1,
            peak_price: entry_price,
        }
    }

    fn inputs(price: Decimal, position: Option<&Position>, secs: i64) -> DecisionInputs<'_> {
        DecisionInputs {
            price,
            median: Some(dec!(100)),
            warm: true,
            position,
            now: T0 + time::Duration::seconds(secs),
        }
    }

    #[test]
    fn cold_window_holds() {
        let pos = position(dec!(100));
        let d = decide(
            &rules(),
            &DecisionInputs {
                warm: false,
                ..inputs(dec!(200), Some(&pos), 9999)
            },
        );
        assert_eq!(d.action, Action::Hold);
        assert_eq!(d.note.as_deref(), Some("warming up"));
    }

    #[test]
    fn zero_median_holds() {
        let pos = position(dec!(100));
        let d = decide(
            &rules(),
            &DecisionInputs {
                median: Some(Decimal::ZERO),
                ..inputs(dec!(200), Some(&pos), 9999)
            },
        );
        assert_eq!(d.action, Action::Hold);
        assert_eq!(d.deviation_pct, None);
    }

    #[test]
    fn flat_position_holds_with_deviation() {
        let d = decide(&rules(), &inputs(dec!(110), None, 0));
        assert_eq!(d.action, Action::Hold);
        assert_eq!(d.deviation_pct, Some(dec!(10)));
        assert_eq!(d.hold_duration, None);
    }

    #[test]
    fn threshold_exit_is_inclusive() {
        let pos = position(dec!(100));
        let d = decide(&rules(), &inputs(dec!(105), Some(&pos), 10));
        assert_eq!(d.action, Action::ExitThreshold);
        assert_eq!(d.deviation_pct, Some(dec!(5)));
    }

    #[test]
    fn timeout_exit_at_max_hold() {
        let pos = position(dec!(100));
        assert_eq!(
            decide(&rules(), &inputs(dec!(100), Some(&pos), 3600)).action,
            Action::ExitTimeout
        );
        assert_eq!(
            decide(&rules(), &inputs(dec!(100), Some(&pos), 3599)).action,
            Action::Hold
        );
    }

    #[test]
    fn threshold_takes_precedence_over_timeout() {
        let pos = position(dec!(100));
        let d = decide(&rules(), &inputs(dec!(120), Some(&pos), 7200));
        assert_eq!(d.action, Action::ExitThreshold);
    }

    #[test]
    fn stop_loss_only_when_configured() {
        let pos = position(dec!(100));
        assert_eq!(
            decide(&rules(), &inputs(dec!(80), Some(&pos), 10)).action,
            Action::Hold
        );

        let with_stop = ExitRules {
            stops: SafetyStops {
                stop_loss: Some(StopLoss {
                    pct: dec!(10),
                    floor: Decimal::ZERO,
                }),
                ..SafetyStops::default()
            },
            ..rules()
        };
        let d = decide(&with_stop, &inputs(dec!(90), Some(&pos), 10));
        assert_eq!(d.action, Action::ExitStopLoss);
        assert!(d.note.unwrap().starts_with("stop loss"));
        assert_eq!(
            decide(&with_stop, &inputs(dec!(91), Some(&pos), 10)).action,
            Action::Hold
        );
    }

    #[test]
    fn timeout_takes_precedence_over_stops() {
        let pos = position(dec!(100));
        let with_stops = ExitRules {
            stops: SafetyStops {
                max_loss_pct: Some(dec!(5)),
                ..SafetyStops::default()
            },
            ..rules()
        };
        assert_eq!(
            decide(&with_stops, &inputs(dec!(80), Some(&pos), 3600)).action,
            Action::ExitTimeout
        );
        assert_eq!(
            decide(&with_stops, &inputs(dec!(80), Some(&pos), 60)).action,
            Action::ExitStopLoss
        );
    }

    #[test]
    fn trailing_stop_exits_below_threshold() {
        // Median 100 keeps the deviation below 5% while the trade is well up.
        let pos = Position {
            entry_price: dec!(80),
            peak_price: dec!(104),
            ..position(dec!(80))
        };
        let trailing = ExitRules {
            stops: SafetyStops {
                trailing: Some(TrailingStop::default()),
                ..SafetyStops::default()
            },
            ..rules()
        };
        let d = decide(&trailing, &inputs(dec!(103), Some(&pos), 10));
        assert_eq!(d.action, Action::ExitStopLoss);
        assert!(d.note.unwrap().starts_with("trailing stop"));
    }

    #[test]
    fn identical_inputs_give_identical_decisions() {
        let pos = position(dec!(100));
        let i = inputs(dec!(103), Some(&pos), 1200);
        assert_eq!(decide(&rules(), &i), decide(&rules(), &i));
    }

    #[test]
    fn action_labels() {
        assert_eq!(Action::ExitThreshold.to_string(), "EXIT_THRESHOLD");
        assert_eq!(Action::from(ExitReason::Manual), Action::ExitManual);
        assert_eq!(Action::ExitTimeout.exit_reason(), Some(ExitReason::Timeout));
        assert!(!Action::Enter.is_exit());
    }
}
