//! Signals sent when a registry variable crosses a threshold.
//!
//! For each threshold the table tracks the sign of `value - threshold`
//! from one step to the next. The first evaluation only records the sign.
//! Zero counts as having reached the threshold:
//!
//! | condition | fires when the sign goes |
//! |---|---|
//! | `rising` | from `-1` to `0` or `+1` |
//! | `falling` | from `+1` to `0` or `-1` |
//! | `either` | either of the above |
//!
//! A threshold fires at most once per campaign; afterwards it is consumed.

use std::cmp::Ordering;
use std::str::FromStr;

use agrosim_core::{Outbox, Signal, SignalKind};
use agrosim_kiosk::VariableKiosk;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::ScheduleError;
use crate::schedule::StateEventsDef;

/// Crossing direction that fires a state event.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ZeroCondition {
    /// Value rises to or above the threshold.
    Rising,
    /// Value falls to or below the threshold.
    Falling,
    /// Either direction.
    Either,
}

impl ZeroCondition {
    fn fires(self, previous: Ordering, current: Ordering) -> bool {
        let rising = previous == Ordering::Less && current != Ordering::Less;
        let falling = previous == Ordering::Greater && current != Ordering::Greater;
        match self {
            Self::Rising => rising,
            Self::Falling => falling,
            Self::Either => rising || falling,
        }
    }
}

#[derive(Clone, Debug)]
struct Threshold {
    value: f64,
    signal: Signal,
    previous: Option<Ordering>,
    consumed: bool,
}

/// A table of thresholds on one monitored registry variable.
#[derive(Clone, Debug)]
pub struct StateEventTable {
    name: String,
    comment: String,
    kind: SignalKind,
    variable: String,
    condition: ZeroCondition,
    thresholds: Vec<Threshold>,
}

impl StateEventTable {
    /// Build a table from its definition.
    pub fn new(def: &StateEventsDef) -> Result<Self, ScheduleError> {
        let payload_err = |source| ScheduleError::Payload {
            table: def.name.clone(),
            source,
        };
        let kind = SignalKind::from_str(&def.event_signal).map_err(payload_err)?;
        let mut thresholds: Vec<Threshold> = Vec::with_capacity(def.events_table.len());
        for (value, payload) in &def.events_table {
            if thresholds.iter().any(|t| t.value == *value) {
                return Err(ScheduleError::DuplicateThreshold {
                    table: def.name.clone(),
                    threshold: *value,
                });
            }
            thresholds.push(Threshold {
                value: *value,
                signal: Signal::from_payload(kind, payload).map_err(payload_err)?,
                previous: None,
                consumed: false,
            });
        }
        Ok(Self {
            name: def.name.clone(),
            comment: def.comment.clone(),
            kind,
            variable: def.event_state.clone(),
            condition: def.zero_condition,
            thresholds,
        })
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

    /// Name of the monitored registry variable.
    pub fn variable(&self) -> &str {
        &self.variable
    }

    /// Number of thresholds that have not fired yet.
    pub fn pending(&self) -> usize {
        self.thresholds.iter().filter(|t| !t.consumed).count()
    }

    /// Evaluate against the current registry value of the monitored
    /// variable. An undefined variable (e.g. a crop state before the crop
    /// exists) skips the evaluation and keeps the recorded signs; a defined
    /// variable that is not numeric is a [`ScheduleError::NonNumericState`].
    ///
    /// Returns how many thresholds fired.
    pub fn step(&mut self, kiosk: &VariableKiosk, outbox: &mut Outbox) -> Result<usize, ScheduleError> {
        let Some(value) = kiosk.try_get(&self.variable) else {
            debug!(
                table = %self.name,
                variable = %self.variable,
                "monitored variable undefined, state event skipped"
            );
            return Ok(0);
        };
        match value.as_f64() {
            Some(current) => Ok(self.evaluate(current, outbox)),
            None => Err(ScheduleError::NonNumericState {
                table: self.name.clone(),
                variable: self.variable.clone(),
                found: value.type_name(),
            }),
        }
    }

    /// Evaluate against an explicit value of the monitored variable.
    pub fn evaluate(&mut self, current: f64, outbox: &mut Outbox) -> usize {
        let mut fired = 0;
        for t in self.thresholds.iter_mut().filter(|t| !t.consumed) {
            let Some(sign) = (current - t.value).partial_cmp(&0.0) else {
                continue;
            };
            let fires = t
                .previous
                .is_some_and(|previous| self.condition.fires(previous, sign));
            t.previous = Some(sign);
            if fires {
                t.consumed = true;
                fired += 1;
                debug!(
                    table = %self.name,
                    variable = %self.variable,
                    threshold = t.value,
                    current,
                    "state event"
                );
                outbox.send(t.signal.clone());
            }
        }
        fired
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agrosim_core::{ApplyN, ComponentId, EngineId, Payload, Value, VarKind};
    use proptest::prelude::*;

    fn apply_n(amount: f64) -> Payload {
        [
            ("N_amount".to_owned(), Value::Float(amount)),
            ("N_recovery".to_owned(), Value::Float(0.7)),
        ]
        .into_iter()
        .collect()
    }

    fn table(condition: ZeroCondition, thresholds: &[f64]) -> StateEventTable {
        StateEventTable::new(&StateEventsDef {
            event_signal: "apply_n".into(),
            event_state: "DVS".into(),
            zero_condition: condition,
            name: "dvs_n".into(),
            comment: String::new(),
            events_table: thresholds.iter().map(|t| (*t, apply_n(*t * 10.0))).collect(),
        })
        .unwrap()
    }

    /// Steps (1-based) at which the table fired for a value sequence.
    fn firing_steps(t: &mut StateEventTable, values: &[f64]) -> Vec<usize> {
        let mut steps = Vec::new();
        for (i, v) in values.iter().enumerate() {
            let mut outbox = Outbox::new();
            for _ in 0..t.evaluate(*v, &mut outbox) {
                steps.push(i + 1);
            }
        }
        steps
    }

    #[test]
    fn rising_fires_once_and_is_consumed() {
        // -1 -> 0.5 crosses upward at step 2; the threshold is then spent,
        // so the second upward crossing (-0.2 -> 2.0) at step 4 is silent.
        let mut t = table(ZeroCondition::Rising, &[0.0]);
        assert_eq!(firing_steps(&mut t, &[-1.0, 0.5, -0.2, 2.0]), vec![2]);
        assert_eq!(t.pending(), 0);
    }

    #[test]
    fn reaching_zero_counts_as_rising() {
        let mut t = table(ZeroCondition::Rising, &[0.0]);
        assert_eq!(firing_steps(&mut t, &[-0.5, 0.0, 1.0]), vec![2]);
    }

    #[test]
    fn first_value_only_records_sign() {
        let mut t = table(ZeroCondition::Rising, &[0.0]);
        assert_eq!(firing_steps(&mut t, &[2.0, 3.0]), Vec::<usize>::new());
    }

    #[test]
    fn falling_and_either() {
        let mut f = table(ZeroCondition::Falling, &[1.0]);
        assert_eq!(firing_steps(&mut f, &[2.0, 1.5, 0.5, 2.0, 0.0]), vec![3]);

        let mut e = table(ZeroCondition::Either, &[1.0]);
        assert_eq!(firing_steps(&mut e, &[0.0, 2.0, 0.0]), vec![2]);
    }

    #[test]
    fn several_thresholds_in_one_step() {
        let mut t = table(ZeroCondition::Rising, &[0.3, 0.6, 1.5]);
        let mut outbox = Outbox::new();
        t.evaluate(0.0, &mut outbox);
        assert_eq!(t.evaluate(1.0, &mut outbox), 2);
        assert_eq!(
            outbox.iter().cloned().collect::<Vec<_>>(),
            vec![
                Signal::ApplyN(ApplyN { amount: 3.0, recovery: 0.7 }),
                Signal::ApplyN(ApplyN { amount: 6.0, recovery: 0.7 }),
            ]
        );
        assert_eq!(t.pending(), 1);
    }

    #[test]
    fn undefined_variable_is_skipped() {
        let mut kiosk = VariableKiosk::new(EngineId::next());
        let mut t = table(ZeroCondition::Rising, &[0.5]);
        let mut outbox = Outbox::new();
        assert_eq!(t.step(&kiosk, &mut outbox).unwrap(), 0);

        let crop = ComponentId(1);
        kiosk.register("DVS", crop, VarKind::State).unwrap();
        kiosk.publish(crop, "DVS", 0.2).unwrap();
        assert_eq!(t.step(&kiosk, &mut outbox).unwrap(), 0);
        kiosk.publish(crop, "DVS", 0.7).unwrap();
        assert_eq!(t.step(&kiosk, &mut outbox).unwrap(), 1);
    }

    #[test]
    fn text_variable_is_rejected() {
        let mut kiosk = VariableKiosk::new(EngineId::next());
        let crop = ComponentId(1);
        kiosk.register("DVS", crop, VarKind::State).unwrap();
        kiosk.publish(crop, "DVS", "flowering").unwrap();

        let mut t = table(ZeroCondition::Rising, &[0.5]);
        let mut outbox = Outbox::new();
        match t.step(&kiosk, &mut outbox) {
            Err(ScheduleError::NonNumericState {
                table,
                variable,
                found,
            }) => {
                assert_eq!(table, "dvs_n");
                assert_eq!(variable, "DVS");
                assert_eq!(found, "text");
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(outbox.is_empty());
        assert_eq!(t.pending(), 1);
    }

    #[test]
    fn duplicate_threshold_fails() {
        let err = StateEventTable::new(&StateEventsDef {
            event_signal: "apply_n".into(),
            event_state: "DVS".into(),
            zero_condition: ZeroCondition::Rising,
            name: "dup".into(),
            comment: String::new(),
            events_table: vec![(0.5, apply_n(1.0)), (0.5, apply_n(2.0))],
        })
        .unwrap_err();
        assert!(matches!(err, ScheduleError::DuplicateThreshold { .. }));
    }

    proptest! {
        #[test]
        fn each_threshold_fires_at_most_once(
            values in prop::collection::vec(-5.0f64..5.0, 1..50),
            condition in prop_oneof![
                Just(ZeroCondition::Rising),
                Just(ZeroCondition::Falling),
                Just(ZeroCondition::Either),
            ],
        ) {
            let mut t = table(condition, &[-1.0, 0.0, 2.5]);
            let steps = firing_steps(&mut t, &values);
            prop_assert!(steps.len() <= 3);
            prop_assert_eq!(t.pending(), 3 - steps.len());
        }

        #[test]
        fn monotone_rise_fires_every_crossed_threshold(start in -10.0f64..-3.0, end in 3.0f64..10.0) {
            let mut t = table(ZeroCondition::Rising, &[-1.0, 0.0, 2.5]);
            let steps = firing_steps(&mut t, &[start, end]);
            prop_assert_eq!(steps, vec![2, 2, 2]);
        }
    }
}
