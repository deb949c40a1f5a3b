//! Strongly-typed identifiers.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Counter for unique [`EngineId`] allocation.
static ENGINE_INSTANCE_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Unique per-instance identifier for one simulation run.
///
/// Allocated from a monotonic atomic counter via [`EngineId::next`]. The
/// registry and signal bus of a run carry this id as their scope, so two
/// engines in the same process never observe each other's signals or
/// variables even when they use identical names.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EngineId(u64);

impl EngineId {
    /// Allocate a fresh, unique instance ID.
    ///
    /// Each call returns a new ID that has never been returned before
    /// within this process. Thread-safe.
    pub fn next() -> Self {
        Self(ENGINE_INSTANCE_COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for EngineId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "engine#{}", self.0)
    }
}

/// Identifies a process component within one engine's component tree.
///
/// Assigned sequentially as components are inserted and never reused
/// within a run, so a removed crop's id cannot alias the next crop.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ComponentId(pub u32);

impl fmt::Display for ComponentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for ComponentId {
    fn from(v: u32) -> Self {
        Self(v)
    }
}

/// Identifies a handler connected to a [`SignalBus`](crate::SignalBus).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HandlerId(pub u64);

impl fmt::Display for HandlerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn engine_ids_are_unique() {
        let a = EngineId::next();
        let b = EngineId::next();
        assert_ne!(a, b);
        assert!(b > a);
    }

    #[test]
    fn component_id_display() {
        assert_eq!(ComponentId(7).to_string(), "7");
        assert_eq!(ComponentId::from(3), ComponentId(3));
    }
}
