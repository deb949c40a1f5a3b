//! Test utilities for agrosim development.
//!
//! Provides fixture components ([`fixtures`]), deterministic driving data
//! ([`weather`]) and builders for agromanagement schedules and parameter
//! bundles ([`schedule`]).

#![forbid(unsafe_code)]
#![allow(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

pub mod fixtures;
pub mod schedule;
pub mod weather;

pub use fixtures::{
    ConstantRate, DevelopmentStage, Failing, Log, RateInIntegrate, Recording, SequencePublisher,
    StateInRates, WaterBucket,
};
pub use schedule::{
    apply_n_on_state, crop_calendar, day, harvest_calendar, irrigation_table, params,
    single_crop_schedule,
};
pub use weather::{constant_weather, default_drv, synthetic_weather};
