//! Day-stepping simulation engine for agrosim.
//!
//! Provides the top-level [`Engine`] that drives one simulation run:
//! it owns the variable registry, the signal bus, the agromanagement
//! scheduler and the component tree, and advances them one simulated day
//! per [`step()`](Engine::step).

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod config;
pub mod engine;
pub mod output;
pub mod timer;

pub use config::{
    ConfigError, CropFactory, EngineConfig, OutputConfig, OutputInterval, DEFAULT_MAX_STEPS,
};
pub use engine::{Engine, StepError, StepReport, TerminationReason};
pub use output::OutputRecord;
pub use timer::Timer;
