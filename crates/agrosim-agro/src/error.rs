//! Scheduling errors.
//!
//! All but [`ScheduleError::NonNumericState`] are raised while the schedule
//! is loaded and validated, before the first step.

use agrosim_core::{Day, EndType, PayloadError};
use thiserror::Error;

/// Errors in an agromanagement schedule.
#[derive(Debug, Error)]
pub enum ScheduleError {
    /// The schedule lists no campaigns.
    #[error("agromanagement schedule contains no campaigns")]
    Empty,
    /// Campaign start dates are not strictly increasing.
    #[error("campaign start dates must be strictly increasing: {previous} is followed by {next}")]
    CampaignOrder {
        /// Start of the earlier campaign.
        previous: Day,
        /// Start of the campaign that follows it.
        next: Day,
    },
    /// The crop end date is not after the start date.
    #[error("crop calendar for '{crop}': end date {end} must be after start date {start}")]
    CropEndBeforeStart {
        /// Crop name.
        crop: String,
        /// Calendar start date.
        start: Day,
        /// Calendar end date.
        end: Day,
    },
    /// An end type that needs an explicit end date has none.
    #[error("crop calendar for '{crop}': end type '{end_type}' requires crop_end_date")]
    MissingEndDate {
        /// Crop name.
        crop: String,
        /// The configured end type.
        end_type: EndType,
    },
    /// `max_duration` is zero.
    #[error("crop calendar for '{crop}': max_duration must be at least one day")]
    ZeroMaxDuration {
        /// Crop name.
        crop: String,
    },
    /// A date lies outside the window of the campaign that declares it.
    #[error("{what} date {date} is outside its campaign window {window}")]
    OutsideWindow {
        /// What the date belongs to.
        what: String,
        /// The offending date.
        date: Day,
        /// The campaign window, `[start, next start)`.
        window: String,
    },
    /// A timed event table lists a date twice.
    #[error("timed event table '{table}' lists {date} more than once")]
    DuplicateEventDate {
        /// Table name.
        table: String,
        /// The repeated date.
        date: Day,
    },
    /// A state event table lists a threshold twice.
    #[error("state event table '{table}' lists threshold {threshold} more than once")]
    DuplicateThreshold {
        /// Table name.
        table: String,
        /// The repeated threshold.
        threshold: f64,
    },
    /// An event table's signal or payload is invalid.
    #[error("event table '{table}': {source}")]
    Payload {
        /// Table name.
        table: String,
        /// The decoding error.
        #[source]
        source: PayloadError,
    },
    /// The final campaign has state events, so the run could end any day.
    #[error("cannot determine end date: final campaign starting {start} has state events")]
    UndecidableEnd {
        /// Start of the final campaign.
        start: Day,
    },
    /// Neither crop calendars nor timed events pin down an end date.
    #[error("cannot determine end date: schedule has no crop calendar or timed events")]
    NoEndDate,
    /// A state event table monitors a variable whose value is not numeric.
    #[error("state event table '{table}': variable '{variable}' holds {found}, expected a number")]
    NonNumericState {
        /// Table name.
        table: String,
        /// The monitored variable.
        variable: String,
        /// Type name of the value found.
        found: &'static str,
    },
    /// The schedule document could not be parsed.
    #[error("invalid agromanagement document: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

pub(crate) fn window(start: Day, end: Option<Day>) -> String {
    match end {
        Some(end) => format!("[{start}, {end})"),
        None => format!("[{start}, ..)"),
    }
}

pub(crate) fn check_window(
    what: impl FnOnce() -> String,
    date: Day,
    start: Day,
    end: Option<Day>,
) -> Result<(), ScheduleError> {
    let inside = date >= start && end.is_none_or(|end| date < end);
    if inside {
        Ok(())
    } else {
        Err(ScheduleError::OutsideWindow {
            what: what(),
            date,
            window: window(start, end),
        })
    }
}
