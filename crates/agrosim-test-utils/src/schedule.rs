//! Builders for schedules and parameter bundles.

use agrosim_agro::{
    CampaignDef, CropCalendarDef, Schedule, StateEventsDef, TimedEventsDef, ZeroCondition,
};
use agrosim_core::{Day, EndType, ParameterSet, ParameterSource, Payload, StartType, Value};

/// Shorthand for a valid calendar date.
///
/// # Panics
///
/// Panics if the date does not exist.
pub fn day(year: i32, month: u32, day: u32) -> Day {
    Day::from_ymd_opt(year, month, day).expect("valid test date")
}

/// A crop that ends at maturity or after `max_duration` days.
pub fn crop_calendar(crop: &str, variety: &str, start: Day, max_duration: u32) -> CropCalendarDef {
    CropCalendarDef {
        crop_name: crop.to_owned(),
        variety_name: variety.to_owned(),
        crop_start_date: start,
        crop_start_type: StartType::Emergence,
        crop_end_date: None,
        crop_end_type: EndType::Maturity,
        max_duration,
    }
}

/// A crop harvested on `end`.
pub fn harvest_calendar(
    crop: &str,
    variety: &str,
    start: Day,
    end: Day,
    max_duration: u32,
) -> CropCalendarDef {
    CropCalendarDef {
        crop_end_date: Some(end),
        crop_end_type: EndType::Harvest,
        ..crop_calendar(crop, variety, start, max_duration)
    }
}

/// Irrigation of `amount` cm on each listed date.
pub fn irrigation_table(events: &[(Day, f64)]) -> TimedEventsDef {
    TimedEventsDef {
        event_signal: "irrigate".to_owned(),
        name: "irrigation".to_owned(),
        comment: String::new(),
        events_table: events
            .iter()
            .map(|(d, amount)| (*d, payload(&[("amount", *amount), ("efficiency", 0.7)])))
            .collect(),
    }
}

/// Nitrogen applications of `amount` kg/ha when `variable` crosses each
/// threshold.
pub fn apply_n_on_state(
    variable: &str,
    condition: ZeroCondition,
    thresholds: &[(f64, f64)],
) -> StateEventsDef {
    StateEventsDef {
        event_signal: "apply_n".to_owned(),
        event_state: variable.to_owned(),
        zero_condition: condition,
        name: format!("n_on_{variable}"),
        comment: String::new(),
        events_table: thresholds
            .iter()
            .map(|(t, amount)| (*t, payload(&[("N_amount", *amount), ("N_recovery", 0.7)])))
            .collect(),
    }
}

/// One campaign starting with its crop; the run ends when the crop's
/// calendar does.
pub fn single_crop_schedule(crop: &str, start: Day, max_duration: u32) -> Schedule {
    Schedule::new(vec![CampaignDef {
        crop_calendar: Some(crop_calendar(crop, "default", start, max_duration)),
        ..CampaignDef::empty(start)
    }])
}

/// A bundle with every pair in the crop layer.
///
/// # Panics
///
/// Panics on duplicate names.
pub fn params(values: &[(&str, f64)]) -> ParameterSet {
    ParameterSet::new()
        .with(ParameterSource::Crop, values.iter().copied())
        .expect("unique test parameters")
}

fn payload(fields: &[(&str, f64)]) -> Payload {
    fields
        .iter()
        .map(|(k, v)| ((*k).to_owned(), Value::Float(*v)))
        .collect()
}
