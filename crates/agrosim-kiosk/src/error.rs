//! Registry errors.

use agrosim_core::{ComponentId, VarKind};
use thiserror::Error;

use crate::phase::Phase;

/// Errors from [`VariableKiosk`](crate::VariableKiosk) operations.
///
/// Every variant names the offending variable. All of them are fatal
/// configuration or contract errors for the run.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum KioskError {
    /// Another component already owns `name`.
    #[error("duplicate variable '{name}': component {owner} cannot register it, already owned by component {existing}")]
    Duplicate {
        /// The variable name.
        name: String,
        /// Component attempting the registration.
        owner: ComponentId,
        /// Component that owns the name.
        existing: ComponentId,
    },
    /// The owner registered `name` before with the other kind.
    #[error("variable '{name}' is registered as a {registered} variable, not a {requested} variable")]
    KindMismatch {
        /// The variable name.
        name: String,
        /// Kind it was registered with.
        registered: VarKind,
        /// Kind requested now.
        requested: VarKind,
    },
    /// `name` was never registered.
    #[error("variable '{name}' is not registered")]
    NotRegistered {
        /// The variable name.
        name: String,
    },
    /// A component tried to write an entry it does not own.
    #[error("access denied: component {owner} cannot write '{name}', owned by component {registered_owner}")]
    AccessDenied {
        /// The variable name.
        name: String,
        /// Component attempting the write.
        owner: ComponentId,
        /// Component that owns the entry.
        registered_owner: ComponentId,
    },
    /// `name` has no current value: never published, or invalidated.
    #[error("variable '{name}' is undefined")]
    Undefined {
        /// The variable name.
        name: String,
    },
    /// A write to a variable whose kind the current phase forbids.
    #[error("cannot write {kind} variable '{name}' during {phase}")]
    PhaseViolation {
        /// The variable name.
        name: String,
        /// Kind of the variable.
        kind: VarKind,
        /// Phase in which the write was attempted.
        phase: Phase,
    },
    /// The value exists but has a different type than requested.
    #[error("variable '{name}' holds {found}, expected {expected}")]
    TypeMismatch {
        /// The variable name.
        name: String,
        /// Requested type.
        expected: &'static str,
        /// Stored type.
        found: &'static str,
    },
}
