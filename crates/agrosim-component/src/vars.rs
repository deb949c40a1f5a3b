//! Phase-tagged variable containers.
//!
//! [`States<T>`] and [`Rates<T>`] wrap a component's own state and rate
//! structs. Both dereference to `&T` for reading at any time, but neither
//! hands out `&mut T` directly: writes go through the context of the phase
//! that owns the kind ([`IntegrateContext`](crate::IntegrateContext) for
//! states, [`RateContext`](crate::RateContext) for rates), which also
//! republishes the values to the registry.
//!
//! [`Params<P>`] wraps a parameter struct and is read-only once built.

use std::fmt;
use std::marker::PhantomData;
use std::ops::Deref;

use agrosim_core::{ComponentId, ParameterError, ParameterSet, Value, VarKind};
use agrosim_kiosk::{KioskError, VariableKiosk};

/// A struct of named variables that can be published to the registry.
///
/// Usually implemented with [`variable_set!`](crate::variable_set).
pub trait VariableSet {
    /// Visit every variable as `(registry name, current value)`.
    fn visit(&self, f: &mut dyn FnMut(&'static str, Value));
}

/// Implement [`VariableSet`] for a struct by mapping fields to registry names.
///
/// ```
/// use agrosim_component::variable_set;
///
/// #[derive(Default)]
/// struct Pheno {
///     dvs: f64,
///     tsum: f64,
/// }
/// variable_set!(Pheno { dvs => "DVS", tsum => "TSUM" });
/// ```
#[macro_export]
macro_rules! variable_set {
    ($ty:ty { $($field:ident => $name:literal),* $(,)? }) => {
        impl $crate::VariableSet for $ty {
            fn visit(&self, f: &mut dyn FnMut(&'static str, $crate::__private::Value)) {
                $( f($name, $crate::__private::Value::from(self.$field.clone())); )*
            }
        }
    };
}

mod sealed {
    pub trait Sealed {}
}

/// Marker for the kind of variables held in a [`Vars`].
pub trait KindMarker: sealed::Sealed {
    /// Registry kind of the variables.
    const KIND: VarKind;
}

/// Marker for state variables.
#[derive(Debug)]
pub enum StateKind {}

/// Marker for rate variables.
#[derive(Debug)]
pub enum RateKind {}

impl sealed::Sealed for StateKind {}
impl sealed::Sealed for RateKind {}

impl KindMarker for StateKind {
    const KIND: VarKind = VarKind::State;
}

impl KindMarker for RateKind {
    const KIND: VarKind = VarKind::Rate;
}

/// Variables of one kind owned by a component.
pub struct Vars<T, K> {
    inner: T,
    _kind: PhantomData<K>,
}

/// State variables, writable only during integration.
pub type States<T> = Vars<T, StateKind>;

/// Rate variables, writable only during rate computation.
pub type Rates<T> = Vars<T, RateKind>;

impl<T: VariableSet, K: KindMarker> Vars<T, K> {
    pub(crate) fn new(inner: T) -> Self {
        Self {
            inner,
            _kind: PhantomData,
        }
    }

    pub(crate) fn inner_mut(&mut self) -> &mut T {
        &mut self.inner
    }

    pub(crate) fn register(
        &self,
        kiosk: &mut VariableKiosk,
        owner: ComponentId,
    ) -> Result<(), KioskError> {
        let mut result = Ok(());
        self.inner.visit(&mut |name, _| {
            if result.is_ok() {
                result = kiosk.register(name, owner, K::KIND);
            }
        });
        result
    }

    pub(crate) fn publish(
        &self,
        kiosk: &mut VariableKiosk,
        owner: ComponentId,
    ) -> Result<(), KioskError> {
        let mut result = Ok(());
        self.inner.visit(&mut |name, value| {
            if result.is_ok() {
                result = kiosk.publish(owner, name, value);
            }
        });
        result
    }

    /// Registry names of the wrapped variables.
    pub fn names(&self) -> Vec<&'static str> {
        let mut names = Vec::new();
        self.inner.visit(&mut |name, _| names.push(name));
        names
    }
}

impl<T, K> Deref for Vars<T, K> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.inner
    }
}

impl<T: fmt::Debug, K: KindMarker> fmt::Debug for Vars<T, K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Vars")
            .field("kind", &K::KIND)
            .field("inner", &self.inner)
            .finish()
    }
}

// ── Params ──────────────────────────────────────────────────────

/// A parameter struct built from a [`ParameterSet`].
pub trait FromParameters: Sized {
    /// Read every required parameter, failing on the first missing one.
    fn from_parameters(params: &ParameterSet) -> Result<Self, ParameterError>;
}

/// Read-only parameters of a component.
#[derive(Clone, Debug)]
pub struct Params<P>(P);

impl<P> Params<P> {
    pub(crate) fn new(inner: P) -> Self {
        Self(inner)
    }
}

impl<P> Deref for Params<P> {
    type Target = P;

    fn deref(&self) -> &P {
        &self.0
    }
}
