//! Core types and traits for the agrosim crop simulation framework.
//!
//! This is the leaf crate with zero internal dependencies. It defines
//! the fundamental abstractions used throughout the agrosim workspace:
//! identifiers, simulated days, typed values, driving data, the
//! parameter bundle, the closed set of signals, and the per-run signal bus.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod bus;
pub mod error;
pub mod id;
pub mod params;
pub mod signal;
pub mod value;
pub mod weather;

pub use bus::{Envelope, Outbox, SignalBus};
pub use error::{ParameterError, PayloadError, SignalError, WeatherError};
pub use id::{ComponentId, EngineId, HandlerId};
pub use params::{ParameterSet, ParameterSource};
pub use signal::{
    ApplyN, ApplyNSnomin, CropFinish, CropStart, EndType, FinishType, Irrigate, Mowing, Payload,
    Signal, SignalKind, StartType,
};
pub use value::{Value, VarKind};
pub use weather::{DrivingData, WeatherProvider, WeatherTable};

/// A simulated calendar day.
///
/// The engine's only notion of time. Advances by exactly one day per step.
pub type Day = chrono::NaiveDate;
