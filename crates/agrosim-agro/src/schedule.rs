//! Parsed agromanagement schedule and its YAML loader.
//!
//! The public definition types describe the schedule structurally and can
//! be built directly in code. [`Schedule::from_yaml_str`] reads the
//! conventional document layout:
//!
//! ```yaml
//! AgroManagement:
//! - 2021-03-01:
//!     CropCalendar:
//!       crop_name: maize
//!       variety_name: grain_maize
//!       crop_start_date: 2021-04-15
//!       crop_start_type: sowing
//!       crop_end_date:
//!       crop_end_type: maturity
//!       max_duration: 200
//!     TimedEvents:
//!     - event_signal: irrigate
//!       name: summer irrigation
//!       comment: all amounts in cm
//!       events_table:
//!       - 2021-07-01: {amount: 3.0, efficiency: 0.7}
//!     StateEvents:
//!     - event_signal: apply_n
//!       event_state: DVS
//!       zero_condition: rising
//!       name: DVS based N application
//!       comment: all amounts in kg N/ha
//!       events_table:
//!       - 0.3: {N_amount: 40, N_recovery: 0.7}
//! - 2022-01-01:
//! ```
//!
//! A campaign whose body is empty is a terminator: the run ends on its
//! start date.

use std::fmt;
use std::marker::PhantomData;

use agrosim_core::{Day, EndType, Payload, StartType};
use serde::de::{self, Deserializer, IgnoredAny, MapAccess, Visitor};
use serde::Deserialize;

use crate::error::ScheduleError;
use crate::state_events::ZeroCondition;

// ── Definitions ────────────────────────────────────────────────

/// A crop calendar as declared in the schedule.
#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct CropCalendarDef {
    /// Crop identity.
    pub crop_name: String,
    /// Variety identity.
    pub variety_name: String,
    /// Day the crop cycle starts.
    pub crop_start_date: Day,
    /// Whether the cycle starts at sowing or emergence.
    pub crop_start_type: StartType,
    /// Day the cycle ends, required for `harvest` and `earliest`.
    #[serde(default)]
    pub crop_end_date: Option<Day>,
    /// How the cycle is meant to end.
    pub crop_end_type: EndType,
    /// Maximum cycle length in days.
    pub max_duration: u32,
}

/// A table of signals sent on fixed dates.
#[derive(Clone, Debug, PartialEq)]
pub struct TimedEventsDef {
    /// Topic name, e.g. `irrigate`.
    pub event_signal: String,
    /// Table name used in errors and logs.
    pub name: String,
    /// Free-form comment.
    pub comment: String,
    /// Dates and the payload sent on each.
    pub events_table: Vec<(Day, Payload)>,
}

/// A table of signals sent when a registry variable crosses thresholds.
#[derive(Clone, Debug, PartialEq)]
pub struct StateEventsDef {
    /// Topic name, e.g. `apply_n`.
    pub event_signal: String,
    /// Registry variable to monitor.
    pub event_state: String,
    /// Crossing direction that fires an event.
    pub zero_condition: ZeroCondition,
    /// Table name used in errors and logs.
    pub name: String,
    /// Free-form comment.
    pub comment: String,
    /// Thresholds and the payload sent when each is crossed.
    pub events_table: Vec<(f64, Payload)>,
}

/// One campaign of the schedule.
#[derive(Clone, Debug, PartialEq)]
pub struct CampaignDef {
    /// First day of the campaign.
    pub start: Day,
    /// The campaign's crop, if any.
    pub crop_calendar: Option<CropCalendarDef>,
    /// Timed event tables, in declaration order.
    pub timed_events: Vec<TimedEventsDef>,
    /// State event tables, in declaration order.
    pub state_events: Vec<StateEventsDef>,
}

impl CampaignDef {
    /// An empty campaign starting on `start`, usable as a terminator.
    pub fn empty(start: Day) -> Self {
        Self {
            start,
            crop_calendar: None,
            timed_events: Vec::new(),
            state_events: Vec::new(),
        }
    }
}

/// A full agromanagement schedule.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Schedule {
    /// Campaigns in chronological order.
    pub campaigns: Vec<CampaignDef>,
}

impl Schedule {
    /// Build a schedule from campaign definitions.
    pub fn new(campaigns: Vec<CampaignDef>) -> Self {
        Self { campaigns }
    }

    /// Parse an `AgroManagement:` YAML document.
    pub fn from_yaml_str(text: &str) -> Result<Self, ScheduleError> {
        let doc: Document = serde_yaml::from_str(text)?;
        let campaigns = doc
            .agro_management
            .into_iter()
            .map(|SingleEntry(start, body)| body.unwrap_or_default().into_def(start))
            .collect();
        Ok(Self { campaigns })
    }
}

// ── Document layout ────────────────────────────────────────────

#[derive(Deserialize)]
struct Document {
    #[serde(rename = "AgroManagement")]
    agro_management: Vec<SingleEntry<Day, Option<CampaignBody>>>,
}

#[derive(Default, Deserialize)]
struct CampaignBody {
    #[serde(rename = "CropCalendar", default)]
    crop_calendar: Option<CropCalendarDef>,
    #[serde(rename = "TimedEvents", default)]
    timed_events: Option<Vec<TimedEventsDoc>>,
    #[serde(rename = "StateEvents", default)]
    state_events: Option<Vec<StateEventsDoc>>,
}

impl CampaignBody {
    fn into_def(self, start: Day) -> CampaignDef {
        CampaignDef {
            start,
            crop_calendar: self.crop_calendar,
            timed_events: self
                .timed_events
                .unwrap_or_default()
                .into_iter()
                .map(TimedEventsDoc::into_def)
                .collect(),
            state_events: self
                .state_events
                .unwrap_or_default()
                .into_iter()
                .map(StateEventsDoc::into_def)
                .collect(),
        }
    }
}

#[derive(Deserialize)]
struct TimedEventsDoc {
    event_signal: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    comment: Option<String>,
    events_table: Vec<SingleEntry<Day, Option<Payload>>>,
}

impl TimedEventsDoc {
    fn into_def(self) -> TimedEventsDef {
        TimedEventsDef {
            name: self.name.unwrap_or_else(|| self.event_signal.clone()),
            event_signal: self.event_signal,
            comment: self.comment.unwrap_or_default(),
            events_table: self
                .events_table
                .into_iter()
                .map(|SingleEntry(d, p)| (d, p.unwrap_or_default()))
                .collect(),
        }
    }
}

#[derive(Deserialize)]
struct StateEventsDoc {
    event_signal: String,
    event_state: String,
    zero_condition: ZeroCondition,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    comment: Option<String>,
    events_table: Vec<SingleEntry<f64, Option<Payload>>>,
}

impl StateEventsDoc {
    fn into_def(self) -> StateEventsDef {
        StateEventsDef {
            name: self.name.unwrap_or_else(|| self.event_signal.clone()),
            event_signal: self.event_signal,
            event_state: self.event_state,
            zero_condition: self.zero_condition,
            comment: self.comment.unwrap_or_default(),
            events_table: self
                .events_table
                .into_iter()
                .map(|SingleEntry(t, p)| (t, p.unwrap_or_default()))
                .collect(),
        }
    }
}

/// A YAML mapping with exactly one entry, e.g. `- 2021-07-01: {...}`.
struct SingleEntry<K, V>(K, V);

impl<'de, K, V> Deserialize<'de> for SingleEntry<K, V>
where
    K: Deserialize<'de>,
    V: Deserialize<'de>,
{
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct EntryVisitor<K, V>(PhantomData<(K, V)>);

        impl<'de, K, V> Visitor<'de> for EntryVisitor<K, V>
        where
            K: Deserialize<'de>,
            V: Deserialize<'de>,
        {
            type Value = SingleEntry<K, V>;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a mapping with exactly one entry")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
                let Some((key, value)) = map.next_entry::<K, V>()? else {
                    return Err(de::Error::invalid_length(0, &self));
                };
                if map.next_key::<IgnoredAny>()?.is_some() {
                    return Err(de::Error::invalid_length(2, &self));
                }
                Ok(SingleEntry(key, value))
            }
        }

        deserializer.deserialize_map(EntryVisitor(PhantomData))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agrosim_core::Value;

    const DOC: &str = r#"
AgroManagement:
- 2021-03-01:
    CropCalendar:
      crop_name: maize
      variety_name: grain_maize
      crop_start_date: 2021-04-15
      crop_start_type: sowing
      crop_end_date:
      crop_end_type: maturity
      max_duration: 200
    TimedEvents:
    - event_signal: irrigate
      name: summer irrigation
      comment: all amounts in cm
      events_table:
      - 2021-07-01: {amount: 3.0, efficiency: 0.7}
      - 2021-07-15: {amount: 2.5, efficiency: 0.7}
    StateEvents:
    - event_signal: apply_n
      event_state: DVS
      zero_condition: rising
      events_table:
      - 0.3: {N_amount: 40, N_recovery: 0.7}
      - 1: {N_amount: 20, N_recovery: 0.7}
- 2022-01-01:
"#;

    fn d(y: i32, m: u32, day: u32) -> Day {
        Day::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn parses_conventional_layout() {
        let s = Schedule::from_yaml_str(DOC).unwrap();
        assert_eq!(s.campaigns.len(), 2);

        let c = &s.campaigns[0];
        assert_eq!(c.start, d(2021, 3, 1));
        let cal = c.crop_calendar.as_ref().unwrap();
        assert_eq!(cal.crop_name, "maize");
        assert_eq!(cal.crop_end_date, None);
        assert_eq!(cal.crop_start_type, StartType::Sowing);
        assert_eq!(cal.max_duration, 200);

        assert_eq!(c.timed_events[0].name, "summer irrigation");
        assert_eq!(c.timed_events[0].events_table.len(), 2);
        assert_eq!(c.timed_events[0].events_table[0].0, d(2021, 7, 1));
        assert_eq!(
            c.timed_events[0].events_table[0].1.get("amount"),
            Some(&Value::Float(3.0))
        );

        let se = &c.state_events[0];
        assert_eq!(se.name, "apply_n");
        assert_eq!(se.zero_condition, ZeroCondition::Rising);
        assert_eq!(se.events_table[0].0, 0.3);
        assert_eq!(se.events_table[1].0, 1.0);
        assert_eq!(se.events_table[0].1.get("N_amount"), Some(&Value::Int(40)));

        assert_eq!(s.campaigns[1], CampaignDef::empty(d(2022, 1, 1)));
    }

    #[test]
    fn multi_entry_mapping_is_rejected() {
        let doc = "AgroManagement:\n- 2021-03-01:\n  2021-04-01:\n";
        assert!(matches!(
            Schedule::from_yaml_str(doc),
            Err(ScheduleError::Yaml(_))
        ));
    }

    #[test]
    fn bad_date_is_rejected() {
        let doc = "AgroManagement:\n- 2021-13-01:\n";
        assert!(Schedule::from_yaml_str(doc).is_err());
    }
}
