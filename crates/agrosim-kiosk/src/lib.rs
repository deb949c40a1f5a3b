//! Variable registry for inter-component data exchange.
//!
//! The [`VariableKiosk`] maps globally-unique variable names to their
//! current values for one engine instance. Each entry has a single owning
//! component; only the owner may publish to it, and only during the phase
//! that permits its kind. Values are invalidated at phase boundaries so a
//! stale rate or state can never be read across phases.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod error;
pub mod kiosk;
pub mod phase;

pub use error::KioskError;
pub use kiosk::VariableKiosk;
pub use phase::Phase;
