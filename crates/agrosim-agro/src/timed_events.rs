//! Signals sent on fixed calendar dates.

use std::str::FromStr;

use agrosim_core::{Day, Outbox, Signal, SignalKind};
use indexmap::IndexMap;
use tracing::debug;

use crate::error::{check_window, ScheduleError};
use crate::schedule::TimedEventsDef;

/// A table mapping dates to the signal sent on each.
///
/// Payloads are decoded into typed signals when the table is built, so a
/// malformed entry fails at setup rather than on its date.
#[derive(Clone, Debug)]
pub struct TimedEventTable {
    name: String,
    comment: String,
    kind: SignalKind,
    events: IndexMap<Day, Signal>,
}

impl TimedEventTable {
    /// Build a table from its definition.
    pub fn new(def: &TimedEventsDef) -> Result<Self, ScheduleError> {
        let payload_err = |source| ScheduleError::Payload {
            table: def.name.clone(),
            source,
        };
        let kind = SignalKind::from_str(&def.event_signal).map_err(payload_err)?;
        let mut events = IndexMap::with_capacity(def.events_table.len());
        for (date, payload) in &def.events_table {
            let signal = Signal::from_payload(kind, payload).map_err(payload_err)?;
            if events.insert(*date, signal).is_some() {
                return Err(ScheduleError::DuplicateEventDate {
                    table: def.name.clone(),
                    date: *date,
                });
            }
        }
        Ok(Self {
            name: def.name.clone(),
            comment: def.comment.clone(),
            kind,
            events,
        })
    }

    /// Check that every date lies in the campaign window.
    pub fn validate(&self, campaign_start: Day, next_start: Option<Day>) -> Result<(), ScheduleError> {
        for date in self.events.keys() {
            check_window(
                || format!("timed event '{}'", self.name),
                *date,
                campaign_start,
                next_start,
            )?;
        }
        Ok(())
    }

    /// Table name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Free-form comment.
    pub fn comment(&self) -> &str {
        &self.comment
    }

    /// Topic sent by this table.
    pub fn kind(&self) -> SignalKind {
        self.kind
    }

    /// Latest date in the table.
    pub fn last_date(&self) -> Option<Day> {
        self.events.keys().max().copied()
    }

    /// Whether any event is scheduled strictly after `day`.
    pub fn has_events_after(&self, day: Day) -> bool {
        self.events.keys().any(|d| *d > day)
    }

    /// Queue the signal scheduled for `day`, if any. Returns whether one fired.
    pub fn step(&self, day: Day, outbox: &mut Outbox) -> bool {
        match self.events.get(&day) {
            Some(signal) => {
                debug!(table = %self.name, topic = %self.kind, %day, "timed event");
                outbox.send(signal.clone());
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agrosim_core::{Irrigate, Payload, PayloadError, Value};

    fn d(m: u32, day: u32) -> Day {
        Day::from_ymd_opt(2020, m, day).unwrap()
    }

    fn irrigation(amount: f64) -> Payload {
        [("amount".to_owned(), Value::Float(amount))].into_iter().collect()
    }

    fn def(entries: Vec<(Day, Payload)>) -> TimedEventsDef {
        TimedEventsDef {
            event_signal: "irrigate".into(),
            name: "irrigation".into(),
            comment: String::new(),
            events_table: entries,
        }
    }

    #[test]
    fn fires_exactly_on_its_dates() {
        let t = TimedEventTable::new(&def(vec![
            (d(5, 1), irrigation(2.0)),
            (d(6, 1), irrigation(3.0)),
        ]))
        .unwrap();
        let mut outbox = Outbox::new();
        assert!(!t.step(d(4, 30), &mut outbox));
        assert!(t.step(d(5, 1), &mut outbox));
        assert_eq!(
            outbox.pop(),
            Some(Signal::Irrigate(Irrigate {
                amount: 2.0,
                efficiency: 1.0
            }))
        );
        assert_eq!(t.last_date(), Some(d(6, 1)));
        assert!(t.has_events_after(d(5, 31)));
        assert!(!t.has_events_after(d(6, 1)));
    }

    #[test]
    fn duplicate_date_fails() {
        let err = TimedEventTable::new(&def(vec![
            (d(5, 1), irrigation(2.0)),
            (d(5, 1), irrigation(3.0)),
        ]))
        .unwrap_err();
        assert!(matches!(err, ScheduleError::DuplicateEventDate { .. }));
    }

    #[test]
    fn unknown_signal_fails() {
        let mut bad = def(vec![]);
        bad.event_signal = "fertilise".into();
        let err = TimedEventTable::new(&bad).unwrap_err();
        assert!(matches!(
            err,
            ScheduleError::Payload {
                source: PayloadError::UnknownTopic { .. },
                ..
            }
        ));
    }

    #[test]
    fn dates_must_fall_in_window() {
        let t = TimedEventTable::new(&def(vec![(d(5, 1), irrigation(2.0))])).unwrap();
        t.validate(d(1, 1), Some(d(5, 2))).unwrap();
        assert!(t.validate(d(1, 1), Some(d(5, 1))).is_err());
    }
}
