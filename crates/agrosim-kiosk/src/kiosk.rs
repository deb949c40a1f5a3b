//! The [`VariableKiosk`] registry.

use agrosim_core::{ComponentId, EngineId, Value, VarKind};
use indexmap::IndexMap;
use tracing::trace;

use crate::error::KioskError;
use crate::phase::Phase;

#[derive(Clone, Debug)]
struct Entry {
    owner: ComponentId,
    kind: VarKind,
    value: Option<Value>,
}

/// Name-addressed variable store shared by the components of one run.
///
/// Constructed per engine instance; there is no process-wide registry.
/// The engine drives [`set_phase`](Self::set_phase) and
/// [`invalidate`](Self::invalidate) at phase boundaries; components go
/// through [`register`](Self::register), [`publish`](Self::publish) and
/// [`get`](Self::get).
#[derive(Clone, Debug)]
pub struct VariableKiosk {
    scope: EngineId,
    entries: IndexMap<String, Entry>,
    phase: Phase,
}

impl VariableKiosk {
    /// Create an empty registry for engine instance `scope`.
    pub fn new(scope: EngineId) -> Self {
        Self {
            scope,
            entries: IndexMap::new(),
            phase: Phase::Setup,
        }
    }

    /// The engine instance this registry belongs to.
    pub fn scope(&self) -> EngineId {
        self.scope
    }

    /// Current phase.
    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Enter `phase`. Called by the engine at every phase transition.
    pub fn set_phase(&mut self, phase: Phase) {
        trace!(from = %self.phase, to = %phase, "registry phase");
        self.phase = phase;
    }

    // ── Registration ────────────────────────────────────────────

    /// Register `name` as a `kind` variable owned by `owner`.
    ///
    /// Registering the same name again from the same owner with the same
    /// kind is a no-op.
    pub fn register(
        &mut self,
        name: &str,
        owner: ComponentId,
        kind: VarKind,
    ) -> Result<(), KioskError> {
        if let Some(entry) = self.entries.get(name) {
            if entry.owner != owner {
                return Err(KioskError::Duplicate {
                    name: name.to_owned(),
                    owner,
                    existing: entry.owner,
                });
            }
            if entry.kind != kind {
                return Err(KioskError::KindMismatch {
                    name: name.to_owned(),
                    registered: entry.kind,
                    requested: kind,
                });
            }
            return Ok(());
        }
        self.entries.insert(
            name.to_owned(),
            Entry {
                owner,
                kind,
                value: None,
            },
        );
        Ok(())
    }

    /// Remove a single registration. Only the owner may do this.
    pub fn deregister(&mut self, name: &str, owner: ComponentId) -> Result<(), KioskError> {
        let entry = self.entry(name)?;
        if entry.owner != owner {
            return Err(KioskError::AccessDenied {
                name: name.to_owned(),
                owner,
                registered_owner: entry.owner,
            });
        }
        self.entries.shift_remove(name);
        Ok(())
    }

    /// Remove every entry owned by `owner`. Returns how many were removed.
    pub fn deregister_owner(&mut self, owner: ComponentId) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, e| e.owner != owner);
        before - self.entries.len()
    }

    // ── Writes ──────────────────────────────────────────────────

    /// Overwrite the value of `name`.
    ///
    /// Fails unless `owner` owns the entry and the current phase permits
    /// writing its kind.
    pub fn publish(
        &mut self,
        owner: ComponentId,
        name: &str,
        value: impl Into<Value>,
    ) -> Result<(), KioskError> {
        let phase = self.phase;
        let entry = self
            .entries
            .get_mut(name)
            .ok_or_else(|| KioskError::NotRegistered {
                name: name.to_owned(),
            })?;
        if entry.owner != owner {
            return Err(KioskError::AccessDenied {
                name: name.to_owned(),
                owner,
                registered_owner: entry.owner,
            });
        }
        if !phase.permits(entry.kind) {
            return Err(KioskError::PhaseViolation {
                name: name.to_owned(),
                kind: entry.kind,
                phase,
            });
        }
        entry.value = Some(value.into());
        Ok(())
    }

    /// Clear the values (not the registrations) of every `kind` entry.
    ///
    /// Returns how many defined values were cleared.
    pub fn invalidate(&mut self, kind: VarKind) -> usize {
        let mut cleared = 0;
        for entry in self.entries.values_mut().filter(|e| e.kind == kind) {
            if entry.value.take().is_some() {
                cleared += 1;
            }
        }
        trace!(%kind, cleared, "invalidated registry entries");
        cleared
    }

    // ── Reads ───────────────────────────────────────────────────

    /// Current value of `name`.
    pub fn get(&self, name: &str) -> Result<&Value, KioskError> {
        self.entries
            .get(name)
            .and_then(|e| e.value.as_ref())
            .ok_or_else(|| KioskError::Undefined {
                name: name.to_owned(),
            })
    }

    /// Current numeric value of `name`.
    pub fn get_f64(&self, name: &str) -> Result<f64, KioskError> {
        let value = self.get(name)?;
        value.as_f64().ok_or_else(|| KioskError::TypeMismatch {
            name: name.to_owned(),
            expected: "float",
            found: value.type_name(),
        })
    }

    /// Current value of `name`, or `None` if undefined.
    pub fn try_get(&self, name: &str) -> Option<&Value> {
        self.get(name).ok()
    }

    /// Whether `name` is registered, defined or not.
    pub fn variable_exists(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Whether `name` currently holds a value.
    pub fn is_defined(&self, name: &str) -> bool {
        self.try_get(name).is_some()
    }

    /// Owner of `name`.
    pub fn owner_of(&self, name: &str) -> Option<ComponentId> {
        self.entries.get(name).map(|e| e.owner)
    }

    /// Kind of `name`.
    pub fn kind_of(&self, name: &str) -> Option<VarKind> {
        self.entries.get(name).map(|e| e.kind)
    }

    /// Registered names owned by `owner`, in registration order.
    pub fn names_owned_by(&self, owner: ComponentId) -> impl Iterator<Item = &str> {
        self.entries
            .iter()
            .filter(move |(_, e)| e.owner == owner)
            .map(|(n, _)| n.as_str())
    }

    /// Number of registered names.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn entry(&self, name: &str) -> Result<&Entry, KioskError> {
        self.entries
            .get(name)
            .ok_or_else(|| KioskError::NotRegistered {
                name: name.to_owned(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const CROP: ComponentId = ComponentId(1);
    const SOIL: ComponentId = ComponentId(2);

    fn kiosk() -> VariableKiosk {
        VariableKiosk::new(EngineId::next())
    }

    #[test]
    fn publish_then_get() {
        let mut k = kiosk();
        k.register("DVS", CROP, VarKind::State).unwrap();
        assert!(k.variable_exists("DVS"));
        assert!(!k.is_defined("DVS"));
        k.publish(CROP, "DVS", 0.5).unwrap();
        assert_eq!(k.get_f64("DVS").unwrap(), 0.5);
        assert_eq!(k.owner_of("DVS"), Some(CROP));
    }

    #[test]
    fn second_owner_is_duplicate() {
        let mut k = kiosk();
        k.register("SM", SOIL, VarKind::State).unwrap();
        let err = k.register("SM", CROP, VarKind::State).unwrap_err();
        assert_eq!(
            err,
            KioskError::Duplicate {
                name: "SM".into(),
                owner: CROP,
                existing: SOIL
            }
        );
        // Same owner, same kind: no-op.
        k.register("SM", SOIL, VarKind::State).unwrap();
        assert!(matches!(
            k.register("SM", SOIL, VarKind::Rate),
            Err(KioskError::KindMismatch { .. })
        ));
    }

    #[test]
    fn only_owner_may_publish() {
        let mut k = kiosk();
        k.register("SM", SOIL, VarKind::State).unwrap();
        let err = k.publish(CROP, "SM", 0.2).unwrap_err();
        assert!(matches!(err, KioskError::AccessDenied { .. }));
        assert!(matches!(
            k.publish(CROP, "LAI", 1.0),
            Err(KioskError::NotRegistered { .. })
        ));
    }

    #[test]
    fn phase_gates_writes() {
        let mut k = kiosk();
        k.register("DVS", CROP, VarKind::State).unwrap();
        k.register("DVR", CROP, VarKind::Rate).unwrap();

        k.set_phase(Phase::Rates);
        k.publish(CROP, "DVR", 0.01).unwrap();
        let err = k.publish(CROP, "DVS", 0.3).unwrap_err();
        assert_eq!(
            err,
            KioskError::PhaseViolation {
                name: "DVS".into(),
                kind: VarKind::State,
                phase: Phase::Rates
            }
        );

        k.set_phase(Phase::Integrate);
        k.publish(CROP, "DVS", 0.3).unwrap();
        assert!(matches!(
            k.publish(CROP, "DVR", 0.02),
            Err(KioskError::PhaseViolation { kind: VarKind::Rate, .. })
        ));
    }

    #[test]
    fn invalidate_clears_values_not_names() {
        let mut k = kiosk();
        k.register("DVS", CROP, VarKind::State).unwrap();
        k.register("DVR", CROP, VarKind::Rate).unwrap();
        k.publish(CROP, "DVS", 0.3).unwrap();
        k.publish(CROP, "DVR", 0.01).unwrap();

        assert_eq!(k.invalidate(VarKind::Rate), 1);
        assert!(matches!(k.get("DVR"), Err(KioskError::Undefined { .. })));
        assert!(k.variable_exists("DVR"));
        assert_eq!(k.get_f64("DVS").unwrap(), 0.3);
    }

    #[test]
    fn deregister_owner_frees_names() {
        let mut k = kiosk();
        k.register("DVS", CROP, VarKind::State).unwrap();
        k.register("LAI", CROP, VarKind::State).unwrap();
        k.register("SM", SOIL, VarKind::State).unwrap();
        assert_eq!(k.names_owned_by(CROP).collect::<Vec<_>>(), ["DVS", "LAI"]);
        assert_eq!(k.deregister_owner(CROP), 2);
        assert_eq!(k.len(), 1);
        k.register("DVS", ComponentId(9), VarKind::State).unwrap();
        assert!(matches!(
            k.deregister("SM", CROP),
            Err(KioskError::AccessDenied { .. })
        ));
    }

    #[test]
    fn type_mismatch_on_numeric_read() {
        let mut k = kiosk();
        k.register("STAGE", CROP, VarKind::State).unwrap();
        k.publish(CROP, "STAGE", "emerging").unwrap();
        assert!(matches!(
            k.get_f64("STAGE"),
            Err(KioskError::TypeMismatch { found: "text", .. })
        ));
    }

    // ── Property tests ──────────────────────────────────────────

    fn arb_registrations() -> impl Strategy<Value = Vec<(u8, u32)>> {
        prop::collection::vec((0u8..6, 0u32..4), 1..40)
    }

    proptest! {
        #[test]
        fn first_registrant_owns_the_name(regs in arb_registrations()) {
            let mut k = kiosk();
            let mut owners = IndexMap::new();
            for (name, owner) in &regs {
                let name = format!("V{name}");
                let owner = ComponentId(*owner);
                let result = k.register(&name, owner, VarKind::State);
                let first = *owners.entry(name.clone()).or_insert(owner);
                prop_assert_eq!(result.is_ok(), first == owner);
            }
            for (name, owner) in &owners {
                prop_assert_eq!(k.owner_of(name), Some(*owner));
            }
        }

        #[test]
        fn non_owner_never_overwrites(value in -1e6f64..1e6, intruder in 10u32..20) {
            let mut k = kiosk();
            k.register("X", CROP, VarKind::State).unwrap();
            k.publish(CROP, "X", value).unwrap();
            prop_assert!(k.publish(ComponentId(intruder), "X", 0.0).is_err());
            prop_assert_eq!(k.get_f64("X").unwrap(), value);
        }
    }
}
