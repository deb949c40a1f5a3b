//! Component errors.

use agrosim_core::{ComponentId, ParameterError, PayloadError};
use agrosim_kiosk::{KioskError, Phase};
use thiserror::Error;

/// Errors returned by [`Component`](crate::Component) operations.
#[derive(Clone, Debug, PartialEq, Error)]
pub enum ComponentError {
    /// A registry operation failed (duplicate name, phase violation, ...).
    #[error(transparent)]
    Kiosk(#[from] KioskError),
    /// A required parameter is missing or mistyped.
    #[error(transparent)]
    Parameter(#[from] ParameterError),
    /// A signal payload could not be interpreted.
    #[error(transparent)]
    Payload(#[from] PayloadError),
    /// `set_variable` named a variable the component does not handle.
    #[error("component does not accept an override of '{name}'")]
    UnknownVariable {
        /// The variable name.
        name: String,
    },
    /// The tree does not contain the referenced component.
    #[error("no component with id {id}")]
    UnknownComponent {
        /// The missing id.
        id: ComponentId,
    },
    /// Component-specific failure.
    #[error("{reason}")]
    Failed {
        /// Human-readable description.
        reason: String,
    },
}

impl ComponentError {
    /// Shorthand for [`ComponentError::Failed`].
    pub fn failed(reason: impl Into<String>) -> Self {
        Self::Failed {
            reason: reason.into(),
        }
    }
}

/// A [`ComponentError`] tagged with the component and phase it came from.
#[derive(Clone, Debug, PartialEq, Error)]
#[error("component '{name}' ({id}) failed during {phase}: {source}")]
pub struct ComponentFailure {
    /// Name of the failing component.
    pub name: String,
    /// Id of the failing component.
    pub id: ComponentId,
    /// Phase being executed.
    pub phase: Phase,
    /// The underlying error.
    #[source]
    pub source: ComponentError,
}
