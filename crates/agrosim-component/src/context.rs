//! Phase contexts passed to components.
//!
//! Each lifecycle operation receives its own context type. A context
//! carries the component's identity, the simulated day, read access to the
//! registry and an outbox for signals. Write access depends on the phase:
//!
//! | context | may write |
//! |---|---|
//! | [`InitContext`] | registers and publishes initial states and rates |
//! | [`RateContext`] | [`Rates`] only |
//! | [`IntegrateContext`] | [`States`] only |
//! | [`FinalizeContext`] | [`States`] only |
//! | [`OverrideContext`] | [`States`] only |
//! | [`SignalContext`] | nothing |
//!
//! Writing the wrong kind through the typed API does not compile:
//!
//! ```compile_fail
//! use agrosim_component::{variable_set, RateContext, States};
//!
//! #[derive(Clone, Default)]
//! struct Pheno { dvs: f64 }
//! variable_set!(Pheno { dvs => "DVS" });
//!
//! fn advance(ctx: &mut RateContext<'_>, states: &mut States<Pheno>) {
//!     ctx.update(states, |s| s.dvs += 0.1);
//! }
//! ```
//!
//! Raw [`publish`](RateContext::publish) calls are checked by the registry
//! and fail with a phase violation instead.

use agrosim_core::{ComponentId, Day, DrivingData, Outbox, ParameterSet, Signal, Value, VarKind};
use agrosim_kiosk::{KioskError, VariableKiosk};

use crate::error::ComponentError;
use crate::vars::{FromParameters, Params, Rates, States, VariableSet, Vars};

macro_rules! shared_accessors {
    ($ctx:ident) => {
        impl $ctx<'_> {
            /// Simulated day of this call.
            pub fn day(&self) -> Day {
                self.day
            }

            /// Id of the component being called.
            pub fn id(&self) -> ComponentId {
                self.owner
            }

            /// Read a variable published by any component of this run.
            pub fn get(&self, name: &str) -> Result<&Value, KioskError> {
                self.kiosk.get(name)
            }

            /// Read a numeric variable.
            pub fn get_f64(&self, name: &str) -> Result<f64, KioskError> {
                self.kiosk.get_f64(name)
            }

            /// Read a variable, `None` if undefined.
            pub fn try_get(&self, name: &str) -> Option<&Value> {
                self.kiosk.try_get(name)
            }

            /// Queue a signal. The engine dispatches it once the current
            /// phase has run on every component.
            pub fn send(&mut self, signal: Signal) {
                self.outbox.send(signal);
            }
        }
    };
}

// ── InitContext ─────────────────────────────────────────────────

/// Context for [`Component::initialize`](crate::Component::initialize).
pub struct InitContext<'a> {
    owner: ComponentId,
    day: Day,
    kiosk: &'a mut VariableKiosk,
    params: &'a ParameterSet,
    outbox: &'a mut Outbox,
}

impl<'a> InitContext<'a> {
    /// Construct a new init context.
    ///
    /// Typically called by the [`ComponentTree`](crate::ComponentTree).
    pub fn new(
        owner: ComponentId,
        day: Day,
        kiosk: &'a mut VariableKiosk,
        params: &'a ParameterSet,
        outbox: &'a mut Outbox,
    ) -> Self {
        Self {
            owner,
            day,
            kiosk,
            params,
            outbox,
        }
    }

    /// The raw parameter bundle.
    pub fn parameters(&self) -> &ParameterSet {
        self.params
    }

    /// Build the component's read-only parameter struct.
    pub fn params<P: FromParameters>(&self) -> Result<Params<P>, ComponentError> {
        Ok(Params::new(P::from_parameters(self.params)?))
    }

    /// Register state variables and publish their initial values.
    ///
    /// Initial values are mandatory: the wrapper can only be built from a
    /// fully initialized `T`.
    pub fn states<T: VariableSet>(&mut self, initial: T) -> Result<States<T>, ComponentError> {
        let states = Vars::new(initial);
        states.register(self.kiosk, self.owner)?;
        states.publish(self.kiosk, self.owner)?;
        Ok(states)
    }

    /// Register rate variables and publish their initial values.
    pub fn rates<T: VariableSet>(&mut self, initial: T) -> Result<Rates<T>, ComponentError> {
        let rates = Vars::new(initial);
        rates.register(self.kiosk, self.owner)?;
        rates.publish(self.kiosk, self.owner)?;
        Ok(rates)
    }

    /// Register a single variable outside a [`VariableSet`].
    pub fn register(&mut self, name: &str, kind: VarKind) -> Result<(), ComponentError> {
        Ok(self.kiosk.register(name, self.owner, kind)?)
    }

    /// Publish a single registered variable.
    pub fn publish(&mut self, name: &str, value: impl Into<Value>) -> Result<(), ComponentError> {
        Ok(self.kiosk.publish(self.owner, name, value)?)
    }
}

shared_accessors!(InitContext);

// ── RateContext ─────────────────────────────────────────────────

/// Context for [`Component::calc_rates`](crate::Component::calc_rates).
pub struct RateContext<'a> {
    owner: ComponentId,
    day: Day,
    kiosk: &'a mut VariableKiosk,
    drv: &'a DrivingData,
    outbox: &'a mut Outbox,
}

impl<'a> RateContext<'a> {
    /// Construct a new rate context.
    pub fn new(
        owner: ComponentId,
        day: Day,
        kiosk: &'a mut VariableKiosk,
        drv: &'a DrivingData,
        outbox: &'a mut Outbox,
    ) -> Self {
        Self {
            owner,
            day,
            kiosk,
            drv,
            outbox,
        }
    }

    /// Driving data for the current day.
    pub fn drv(&self) -> &DrivingData {
        self.drv
    }

    /// Mutate rates and republish them.
    pub fn update<T: VariableSet>(
        &mut self,
        rates: &mut Rates<T>,
        f: impl FnOnce(&mut T),
    ) -> Result<(), ComponentError> {
        f(rates.inner_mut());
        Ok(rates.publish(self.kiosk, self.owner)?)
    }

    /// Reset every rate to its default (zero) and republish.
    pub fn zerofy<T: VariableSet + Default>(
        &mut self,
        rates: &mut Rates<T>,
    ) -> Result<(), ComponentError> {
        self.update(rates, |r| *r = T::default())
    }

    /// Publish a single variable. Only rate variables are accepted.
    pub fn publish(&mut self, name: &str, value: impl Into<Value>) -> Result<(), ComponentError> {
        Ok(self.kiosk.publish(self.owner, name, value)?)
    }
}

shared_accessors!(RateContext);

// ── IntegrateContext ────────────────────────────────────────────

/// Context for [`Component::integrate`](crate::Component::integrate).
pub struct IntegrateContext<'a> {
    owner: ComponentId,
    day: Day,
    kiosk: &'a mut VariableKiosk,
    delta: f64,
    outbox: &'a mut Outbox,
}

impl<'a> IntegrateContext<'a> {
    /// Construct a new integration context.
    pub fn new(
        owner: ComponentId,
        day: Day,
        kiosk: &'a mut VariableKiosk,
        delta: f64,
        outbox: &'a mut Outbox,
    ) -> Self {
        Self {
            owner,
            day,
            kiosk,
            delta,
            outbox,
        }
    }

    /// Integration time step in days.
    pub fn delta(&self) -> f64 {
        self.delta
    }

    /// Mutate states and republish them.
    pub fn update<T: VariableSet>(
        &mut self,
        states: &mut States<T>,
        f: impl FnOnce(&mut T),
    ) -> Result<(), ComponentError> {
        f(states.inner_mut());
        Ok(states.publish(self.kiosk, self.owner)?)
    }

    /// Republish states without changing them.
    ///
    /// States are invalidated once rates are computed; a state that is
    /// neither updated nor touched stays undefined until the next update.
    pub fn touch<T: VariableSet>(&mut self, states: &States<T>) -> Result<(), ComponentError> {
        Ok(states.publish(self.kiosk, self.owner)?)
    }

    /// Publish a single variable. Only state variables are accepted.
    pub fn publish(&mut self, name: &str, value: impl Into<Value>) -> Result<(), ComponentError> {
        Ok(self.kiosk.publish(self.owner, name, value)?)
    }
}

shared_accessors!(IntegrateContext);

// ── FinalizeContext ─────────────────────────────────────────────

/// Context for [`Component::finalize`](crate::Component::finalize).
pub struct FinalizeContext<'a> {
    owner: ComponentId,
    day: Day,
    kiosk: &'a mut VariableKiosk,
    outbox: &'a mut Outbox,
}

impl<'a> FinalizeContext<'a> {
    /// Construct a new finalize context.
    pub fn new(
        owner: ComponentId,
        day: Day,
        kiosk: &'a mut VariableKiosk,
        outbox: &'a mut Outbox,
    ) -> Self {
        Self {
            owner,
            day,
            kiosk,
            outbox,
        }
    }

    /// Mutate states (end-of-life values such as harvest index) and
    /// republish them.
    pub fn update<T: VariableSet>(
        &mut self,
        states: &mut States<T>,
        f: impl FnOnce(&mut T),
    ) -> Result<(), ComponentError> {
        f(states.inner_mut());
        Ok(states.publish(self.kiosk, self.owner)?)
    }

    /// Republish states without changing them.
    pub fn touch<T: VariableSet>(&mut self, states: &States<T>) -> Result<(), ComponentError> {
        Ok(states.publish(self.kiosk, self.owner)?)
    }
}

shared_accessors!(FinalizeContext);

// ── OverrideContext ─────────────────────────────────────────────

/// Context for [`Component::set_variable`](crate::Component::set_variable).
pub struct OverrideContext<'a> {
    owner: ComponentId,
    day: Day,
    kiosk: &'a mut VariableKiosk,
    outbox: &'a mut Outbox,
}

impl<'a> OverrideContext<'a> {
    /// Construct a new override context.
    pub fn new(
        owner: ComponentId,
        day: Day,
        kiosk: &'a mut VariableKiosk,
        outbox: &'a mut Outbox,
    ) -> Self {
        Self {
            owner,
            day,
            kiosk,
            outbox,
        }
    }

    /// Mutate states and republish them.
    pub fn update<T: VariableSet>(
        &mut self,
        states: &mut States<T>,
        f: impl FnOnce(&mut T),
    ) -> Result<(), ComponentError> {
        f(states.inner_mut());
        Ok(states.publish(self.kiosk, self.owner)?)
    }

    /// Publish a single state variable.
    pub fn publish(&mut self, name: &str, value: impl Into<Value>) -> Result<(), ComponentError> {
        Ok(self.kiosk.publish(self.owner, name, value)?)
    }
}

shared_accessors!(OverrideContext);

// ── SignalContext ───────────────────────────────────────────────

/// Context for [`Component::on_signal`](crate::Component::on_signal).
///
/// Read-only: components record what they need and act on it in their
/// next `calc_rates`.
pub struct SignalContext<'a> {
    owner: ComponentId,
    day: Day,
    kiosk: &'a VariableKiosk,
    outbox: &'a mut Outbox,
}

impl<'a> SignalContext<'a> {
    /// Construct a new signal context.
    pub fn new(
        owner: ComponentId,
        day: Day,
        kiosk: &'a VariableKiosk,
        outbox: &'a mut Outbox,
    ) -> Self {
        Self {
            owner,
            day,
            kiosk,
            outbox,
        }
    }
}

shared_accessors!(SignalContext);
