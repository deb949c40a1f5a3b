//! Engine phases and the writes each one permits.

use std::fmt;

use agrosim_core::VarKind;

/// The phase the owning engine is currently executing.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Phase {
    /// Component initialization. Rates and states may both be published.
    Setup,
    /// Agromanagement scheduling. Nothing may be published.
    Scheduling,
    /// Rate computation. Only rates may be published.
    Rates,
    /// State integration. Only states may be published.
    Integrate,
    /// End-of-life bookkeeping. Only states may be published.
    Finalize,
    /// External state override between steps. Only states may be published.
    Override,
}

impl Phase {
    /// Whether a variable of `kind` may be written in this phase.
    pub fn permits(self, kind: VarKind) -> bool {
        match self {
            Self::Setup => true,
            Self::Scheduling => false,
            Self::Rates => kind == VarKind::Rate,
            Self::Integrate | Self::Finalize | Self::Override => kind == VarKind::State,
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Setup => "setup",
            Self::Scheduling => "scheduling",
            Self::Rates => "rate computation",
            Self::Integrate => "integration",
            Self::Finalize => "finalization",
            Self::Override => "override",
        })
    }
}
