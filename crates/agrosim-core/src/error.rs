//! Error types shared across the agrosim workspace.
//!
//! Subsystem-specific errors (registry, components, scheduling, engine)
//! live in their own crates and wrap these where needed.

use thiserror::Error;

use crate::signal::SignalKind;
use crate::Day;

/// Errors from the parameter bundle.
#[derive(Clone, Debug, PartialEq, Error)]
pub enum ParameterError {
    /// A component required a parameter that no source provides.
    #[error("value for parameter '{name}' missing")]
    Missing {
        /// The parameter name.
        name: String,
    },
    /// The parameter exists but has a different type.
    #[error("parameter '{name}' has type {found}, expected {expected}")]
    WrongType {
        /// The parameter name.
        name: String,
        /// The expected type.
        expected: &'static str,
        /// The type actually stored.
        found: &'static str,
    },
    /// The same name is provided by two sources.
    #[error("duplicate parameter '{name}' found in {first} and {second} data")]
    Duplicate {
        /// The parameter name.
        name: String,
        /// Source that already provides the name.
        first: &'static str,
        /// Source that tried to provide it again.
        second: &'static str,
    },
    /// `set_override` with checking enabled on a name nobody provides.
    #[error("cannot override '{name}', parameter does not already exist")]
    UnknownOverride {
        /// The parameter name.
        name: String,
    },
    /// `clear_override` on a name that is not overridden.
    #[error("cannot clear '{name}' from override")]
    NotOverridden {
        /// The parameter name.
        name: String,
    },
    /// No crop parameter set matches the requested crop and variety.
    #[error("no crop parameters for crop '{crop}' variety '{variety}'")]
    UnknownCrop {
        /// Requested crop name.
        crop: String,
        /// Requested variety name.
        variety: String,
    },
}

/// Errors decoding a schedule payload into a typed [`Signal`](crate::Signal).
#[derive(Clone, Debug, PartialEq, Error)]
pub enum PayloadError {
    /// The topic name is not one of the known signals.
    #[error("unknown signal '{topic}'")]
    UnknownTopic {
        /// The topic name as written in the schedule.
        topic: String,
    },
    /// The topic exists but cannot be sent from an event table.
    #[error("signal '{topic}' cannot be scheduled from an event table")]
    Unschedulable {
        /// The rejected topic.
        topic: SignalKind,
    },
    /// A required payload field is absent.
    #[error("signal '{topic}' requires field '{field}'")]
    MissingField {
        /// The signal being decoded.
        topic: SignalKind,
        /// The missing field.
        field: &'static str,
    },
    /// A payload field has the wrong type.
    #[error("field '{field}' of signal '{topic}' must be {expected}")]
    WrongType {
        /// The signal being decoded.
        topic: SignalKind,
        /// The offending field.
        field: &'static str,
        /// The expected type.
        expected: &'static str,
    },
}

/// Errors from a weather provider.
#[derive(Clone, Debug, PartialEq, Error)]
pub enum WeatherError {
    /// The provider has no record for the requested day.
    #[error("no driving data for {day}")]
    MissingDay {
        /// The requested day.
        day: Day,
    },
    /// The record exists but is unusable.
    #[error("invalid driving data for {day}: {reason}")]
    Invalid {
        /// The requested day.
        day: Day,
        /// Human-readable description.
        reason: String,
    },
}

/// Errors raised by signal handlers.
///
/// Handler failures propagate to the sender; the engine treats them as a
/// hard failure of the step.
#[derive(Clone, Debug, PartialEq, Error)]
pub enum SignalError {
    /// A connected handler failed while processing a signal.
    #[error("handler for '{topic}' failed: {reason}")]
    HandlerFailed {
        /// The topic being delivered.
        topic: SignalKind,
        /// Human-readable description.
        reason: String,
    },
}
