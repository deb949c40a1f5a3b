//! Agrosim: a day-stepping crop and soil simulation core.
//!
//! This is the top-level facade crate that re-exports the public API from all
//! agrosim sub-crates. For most users, adding `agrosim` as a single dependency
//! is sufficient.
//!
//! # Quick start
//!
//! ```rust
//! use agrosim::prelude::*;
//! use agrosim::types::{DrivingData, WeatherTable};
//!
//! // A soil component holding one state that drains at a fixed rate.
//! struct Drain {
//!     level: f64,
//! }
//!
//! impl Component for Drain {
//!     fn name(&self) -> &str { "drain" }
//!     fn initialize(&mut self, ctx: &mut InitContext<'_>) -> Result<(), ComponentError> {
//!         ctx.register("LEVEL", VarKind::State)?;
//!         ctx.publish("LEVEL", self.level)
//!     }
//!     fn calc_rates(&mut self, _ctx: &mut RateContext<'_>) -> Result<(), ComponentError> {
//!         Ok(())
//!     }
//!     fn integrate(&mut self, ctx: &mut IntegrateContext<'_>) -> Result<(), ComponentError> {
//!         self.level -= 0.5 * ctx.delta();
//!         ctx.publish("LEVEL", self.level)
//!     }
//! }
//!
//! let schedule = Schedule::from_yaml_str(
//!     "AgroManagement:\n- 2021-01-01:\n    TimedEvents:\n    - event_signal: irrigate\n      events_table:\n      - 2021-01-03: {amount: 1.0}\n",
//! )
//! .unwrap();
//! let start = Day::from_ymd_opt(2021, 1, 1).unwrap();
//! let drv = DrivingData {
//!     irrad: 1.0e7, tmin: 5.0, tmax: 15.0, vap: 10.0, rain: 0.0,
//!     wind: 2.0, e0: 0.3, es0: 0.3, et0: 0.3, temp: None, dtemp: None,
//! };
//! let weather: WeatherTable = start.iter_days().take(5).map(|d| (d, drv.clone())).collect();
//!
//! let config = EngineConfig::new(ParameterSet::new(), weather, schedule)
//!     .with_soil(Subtree::new(Drain { level: 10.0 }));
//! let mut engine = Engine::new(config).unwrap();
//! assert_eq!(engine.run_till_terminate().unwrap(), TerminationReason::Scheduled);
//! assert_eq!(engine.steps(), 3);
//! assert_eq!(engine.get_variable("LEVEL").unwrap().as_f64(), Some(8.5));
//! ```
//!
//! # Modules
//!
//! Each module corresponds to a sub-crate. Use them for types not in the prelude:
//!
//! | Module | Sub-crate | Contents |
//! |--------|-----------|----------|
//! | [`types`] | `agrosim-core` | Days, values, signals, parameters, driving data, the signal bus |
//! | [`kiosk`] | `agrosim-kiosk` | Variable registry and phases |
//! | [`component`] | `agrosim-component` | Component contract, contexts, typed variable sets, the component tree |
//! | [`agro`] | `agrosim-agro` | Schedules, campaigns, crop calendars, timed and state events |
//! | [`engine`] | `agrosim-engine` | The engine, its configuration and output |

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

/// Core types (`agrosim-core`).
///
/// Contains [`types::Day`], [`types::Value`], the closed [`types::Signal`]
/// set, the layered [`types::ParameterSet`] and the per-run
/// [`types::SignalBus`].
pub use agrosim_core as types;

/// Variable registry (`agrosim-kiosk`).
///
/// [`kiosk::VariableKiosk`] enforces single ownership and phase-correct
/// writes of every published variable.
pub use agrosim_kiosk as kiosk;

/// Component contract (`agrosim-component`).
///
/// The [`component::Component`] trait is the main extension point for
/// user-defined biophysics.
pub use agrosim_component as component;

/// Agromanagement scheduling (`agrosim-agro`).
///
/// Load a [`agro::Schedule`] and let the [`agro::AgroManager`] turn it into
/// signals.
pub use agrosim_agro as agro;

/// The simulation engine (`agrosim-engine`).
///
/// [`engine::Engine`] steps one run day by day.
pub use agrosim_engine as engine;

/// Common imports for typical agrosim usage.
///
/// ```rust
/// use agrosim::prelude::*;
/// ```
pub mod prelude {
    // Core types
    pub use agrosim_core::{
        CropFinish, CropStart, Day, FinishType, ParameterSet, ParameterSource, Signal,
        SignalKind, Value, VarKind, WeatherProvider,
    };

    // Registry
    pub use agrosim_kiosk::{KioskError, Phase, VariableKiosk};

    // Components
    pub use agrosim_component::{
        variable_set, Component, ComponentError, FinalizeContext, FromParameters, InitContext,
        IntegrateContext, OverrideContext, Params, RateContext, Rates, SignalContext, States,
        Subtree,
    };

    // Scheduling
    pub use agrosim_agro::{Schedule, ScheduleError, ZeroCondition};

    // Engine
    pub use agrosim_engine::{
        ConfigError, CropFactory, Engine, EngineConfig, OutputConfig, OutputInterval,
        OutputRecord, StepError, StepReport, TerminationReason,
    };
}
