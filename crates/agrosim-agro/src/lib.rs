//! Agromanagement scheduling for agrosim.
//!
//! An agromanagement schedule is an ordered sequence of campaigns. Each
//! campaign may hold one [`CropCalendar`], any number of
//! [`TimedEventTable`]s and any number of [`StateEventTable`]s. The
//! [`AgroManager`] activates campaigns as the simulated day reaches their
//! start dates, evaluates the active campaign once per step and queues the
//! resulting signals for the engine to dispatch.
//!
//! # Same-day ordering
//!
//! Within one step signals are queued in this order: a forced finish of
//! the previous campaign's crop, the crop calendar, timed tables in
//! declaration order, then state tables in declaration order with their
//! thresholds in declaration order. Components must not rely on it.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod calendar;
pub mod campaign;
pub mod error;
pub mod manager;
pub mod schedule;
pub mod state_events;
pub mod timed_events;

pub use calendar::CropCalendar;
pub use campaign::{Campaign, CampaignStatus};
pub use error::ScheduleError;
pub use manager::AgroManager;
pub use schedule::{CampaignDef, CropCalendarDef, Schedule, StateEventsDef, TimedEventsDef};
pub use state_events::{StateEventTable, ZeroCondition};
pub use timed_events::TimedEventTable;
