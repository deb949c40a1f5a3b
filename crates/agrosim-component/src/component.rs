//! The [`Component`] trait.

use agrosim_core::{Signal, SignalKind};

use crate::context::{
    FinalizeContext, InitContext, IntegrateContext, OverrideContext, RateContext, SignalContext,
};
use crate::error::ComponentError;
use crate::tree::Increments;

/// A unit of biophysical computation driven by the engine.
///
/// # Contract
///
/// Per step the engine calls `calc_rates` and then `integrate`, never
/// interleaved with other lifecycle calls on the same component.
///
/// - `initialize` runs once, before the first `calc_rates`. It builds the
///   read-only parameters and the state and rate containers.
/// - `calc_rates` computes rates from current states and driving data. It
///   must be idempotent for identical inputs: no hidden counters.
/// - `integrate` applies `state += rate * delta` for every owned state and
///   republishes it. A state neither updated nor touched stays undefined in
///   the registry until the next update.
/// - `finalize` runs once at end of life. No rate or integrate call follows.
///
/// Missing parameters, duplicate variable names and writes outside the
/// permitted phase are contract errors that abort the run.
///
/// # Object safety
///
/// This trait is object-safe; the [`ComponentTree`](crate::ComponentTree)
/// stores components as `Box<dyn Component>`.
///
/// # Examples
///
/// A thermal-time accumulator:
///
/// ```
/// use agrosim_component::{
///     variable_set, Component, ComponentError, InitContext, IntegrateContext, RateContext,
///     Rates, States,
/// };
///
/// #[derive(Clone, Default)]
/// struct Tsum { tsum: f64 }
/// variable_set!(Tsum { tsum => "TSUM" });
///
/// #[derive(Clone, Default)]
/// struct DTsum { dtsum: f64 }
/// variable_set!(DTsum { dtsum => "DTSUM" });
///
/// #[derive(Default)]
/// struct ThermalTime {
///     states: Option<States<Tsum>>,
///     rates: Option<Rates<DTsum>>,
/// }
///
/// impl Component for ThermalTime {
///     fn name(&self) -> &str { "thermal_time" }
///
///     fn initialize(&mut self, ctx: &mut InitContext<'_>) -> Result<(), ComponentError> {
///         self.states = Some(ctx.states(Tsum::default())?);
///         self.rates = Some(ctx.rates(DTsum::default())?);
///         Ok(())
///     }
///
///     fn calc_rates(&mut self, ctx: &mut RateContext<'_>) -> Result<(), ComponentError> {
///         let temp = ctx.drv().temp();
///         let rates = self.rates.as_mut().ok_or_else(|| ComponentError::failed("not initialized"))?;
///         ctx.update(rates, |r| r.dtsum = temp.max(0.0))
///     }
///
///     fn integrate(&mut self, ctx: &mut IntegrateContext<'_>) -> Result<(), ComponentError> {
///         let (Some(states), Some(rates)) = (self.states.as_mut(), self.rates.as_ref()) else {
///             return Err(ComponentError::failed("not initialized"));
///         };
///         let delta = ctx.delta();
///         ctx.update(states, |s| s.tsum += rates.dtsum * delta)
///     }
/// }
///
/// assert_eq!(ThermalTime::default().name(), "thermal_time");
/// ```
pub trait Component: 'static {
    /// Human-readable name for error reporting and logging.
    fn name(&self) -> &str;

    /// Signal topics this component wants to receive via
    /// [`on_signal`](Self::on_signal).
    fn subscriptions(&self) -> &[SignalKind] {
        &[]
    }

    /// Allocate parameters, states and rates; publish initial values.
    fn initialize(&mut self, ctx: &mut InitContext<'_>) -> Result<(), ComponentError>;

    /// Compute and publish rates. States are read-only here.
    fn calc_rates(&mut self, ctx: &mut RateContext<'_>) -> Result<(), ComponentError>;

    /// Integrate and republish states. Rates are read-only here.
    fn integrate(&mut self, ctx: &mut IntegrateContext<'_>) -> Result<(), ComponentError>;

    /// End-of-life bookkeeping.
    fn finalize(&mut self, _ctx: &mut FinalizeContext<'_>) -> Result<(), ComponentError> {
        Ok(())
    }

    /// React to a subscribed signal.
    fn on_signal(
        &mut self,
        _signal: &Signal,
        _ctx: &mut SignalContext<'_>,
    ) -> Result<(), ComponentError> {
        Ok(())
    }

    /// Force state variable `name` to `value` from outside the step loop.
    ///
    /// Called only on the component that owns `name`. Returns the
    /// increments applied to every state the override touched.
    fn set_variable(
        &mut self,
        name: &str,
        _value: f64,
        _ctx: &mut OverrideContext<'_>,
    ) -> Result<Increments, ComponentError> {
        Err(ComponentError::UnknownVariable {
            name: name.to_owned(),
        })
    }
}
