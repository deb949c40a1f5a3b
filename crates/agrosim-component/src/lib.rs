//! Process component contract and component tree.
//!
//! A [`Component`] is the unit of biophysical computation. The engine
//! drives it through `initialize`, `calc_rates`, `integrate` and
//! `finalize`, each with a phase-specific context. Rates and states live
//! in [`Rates`] and [`States`] wrappers that can only be written through
//! the context of the phase that owns them, so writing a state while
//! rates are computed does not compile. Raw publishes are still checked
//! at run time by the registry.
//!
//! Nested components are held in an explicit [`ComponentTree`] rather
//! than owned by their parents.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod component;
pub mod context;
pub mod error;
pub mod tree;
pub mod vars;

pub use component::Component;
pub use context::{
    FinalizeContext, InitContext, IntegrateContext, OverrideContext, RateContext, SignalContext,
};
pub use error::{ComponentError, ComponentFailure};
pub use tree::{ComponentTree, Increments, Lifecycle, Placement, Subtree};
pub use vars::{FromParameters, Params, RateKind, Rates, StateKind, States, VariableSet, Vars};

/// Items referenced by exported macros.
#[doc(hidden)]
pub mod __private {
    pub use agrosim_core::Value;
}
