//! Reusable component fixtures.
//!
//! - [`ConstantRate`]: a state driven by a fixed rate, with configurable names.
//! - [`DevelopmentStage`]: a typed phenology stand-in that signals maturity.
//! - [`WaterBucket`]: a typed soil water store that reacts to irrigation.
//! - [`SequencePublisher`]: publishes a scripted state sequence.
//! - [`StateInRates`] / [`RateInIntegrate`]: write outside their phase.
//! - [`Recording`]: logs lifecycle calls and received signals.
//! - [`Failing`]: fails deterministically after N rate calls.

use std::cell::RefCell;
use std::rc::Rc;

use agrosim_component::{
    variable_set, Component, ComponentError, FinalizeContext, FromParameters, Increments,
    InitContext, IntegrateContext, OverrideContext, Params, RateContext, Rates, SignalContext,
    States,
};
use agrosim_core::{
    CropFinish, Day, FinishType, ParameterError, ParameterSet, Signal, SignalKind, VarKind,
};

/// Shared event log written by [`Recording`] components.
pub type Log = Rc<RefCell<Vec<(Day, String)>>>;

fn not_initialized() -> ComponentError {
    ComponentError::failed("component used before initialize")
}

// ── ConstantRate ───────────────────────────────────────────────

/// Integrates `state += rate * delta` with a constant `rate`.
///
/// Registers one state and one rate under caller-chosen names through the
/// raw publish path. A [`forgetful`](ConstantRate::forgetful) instance
/// skips republishing the state when the rate is zero.
pub struct ConstantRate {
    pub name: String,
    pub state: String,
    pub rate: String,
    pub value: f64,
    pub rate_value: f64,
    pub forgetful: bool,
}

impl ConstantRate {
    pub fn new(
        name: impl Into<String>,
        state: impl Into<String>,
        rate: impl Into<String>,
        initial: f64,
        rate_value: f64,
    ) -> Self {
        Self {
            name: name.into(),
            state: state.into(),
            rate: rate.into(),
            value: initial,
            rate_value,
            forgetful: false,
        }
    }

    pub fn forgetful(mut self) -> Self {
        self.forgetful = true;
        self
    }
}

impl Component for ConstantRate {
    fn name(&self) -> &str {
        &self.name
    }

    fn initialize(&mut self, ctx: &mut InitContext<'_>) -> Result<(), ComponentError> {
        ctx.register(&self.state, VarKind::State)?;
        ctx.register(&self.rate, VarKind::Rate)?;
        ctx.publish(&self.state, self.value)?;
        Ok(())
    }

    fn calc_rates(&mut self, ctx: &mut RateContext<'_>) -> Result<(), ComponentError> {
        ctx.publish(&self.rate, self.rate_value)
    }

    fn integrate(&mut self, ctx: &mut IntegrateContext<'_>) -> Result<(), ComponentError> {
        if self.forgetful && self.rate_value == 0.0 {
            return Ok(());
        }
        self.value += self.rate_value * ctx.delta();
        ctx.publish(&self.state, self.value)
    }

    fn set_variable(
        &mut self,
        name: &str,
        value: f64,
        ctx: &mut OverrideContext<'_>,
    ) -> Result<Increments, ComponentError> {
        if name != self.state {
            return Err(ComponentError::UnknownVariable {
                name: name.to_owned(),
            });
        }
        let increment = value - self.value;
        self.value = value;
        ctx.publish(&self.state, value)?;
        Ok([(name.to_owned(), increment)].into_iter().collect())
    }
}

// ── DevelopmentStage ───────────────────────────────────────────

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Dvs {
    pub dvs: f64,
}
variable_set!(Dvs { dvs => "DVS" });

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Dvr {
    pub dvr: f64,
}
variable_set!(Dvr { dvr => "DVR" });

/// Development rate per day, read from parameter `DVR`.
#[derive(Clone, Debug)]
pub struct DevelopmentParams {
    pub dvr: f64,
}

impl FromParameters for DevelopmentParams {
    fn from_parameters(params: &ParameterSet) -> Result<Self, ParameterError> {
        Ok(Self {
            dvr: params.require_f64("DVR")?,
        })
    }
}

/// Development stage from 0 to 2 at a constant daily rate.
///
/// Sends a maturity [`CropFinish`] once `DVS` reaches 2.
#[derive(Default)]
pub struct DevelopmentStage {
    params: Option<Params<DevelopmentParams>>,
    states: Option<States<Dvs>>,
    rates: Option<Rates<Dvr>>,
    matured: bool,
}

impl DevelopmentStage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Component for DevelopmentStage {
    fn name(&self) -> &str {
        "development_stage"
    }

    fn initialize(&mut self, ctx: &mut InitContext<'_>) -> Result<(), ComponentError> {
        self.params = Some(ctx.params()?);
        self.states = Some(ctx.states(Dvs::default())?);
        self.rates = Some(ctx.rates(Dvr::default())?);
        Ok(())
    }

    fn calc_rates(&mut self, ctx: &mut RateContext<'_>) -> Result<(), ComponentError> {
        let (Some(params), Some(rates)) = (self.params.as_ref(), self.rates.as_mut()) else {
            return Err(not_initialized());
        };
        let dvr = if self.matured { 0.0 } else { params.dvr };
        ctx.update(rates, |r| r.dvr = dvr)
    }

    fn integrate(&mut self, ctx: &mut IntegrateContext<'_>) -> Result<(), ComponentError> {
        let (Some(states), Some(rates)) = (self.states.as_mut(), self.rates.as_ref()) else {
            return Err(not_initialized());
        };
        let delta = ctx.delta();
        ctx.update(states, |s| s.dvs = (s.dvs + rates.dvr * delta).min(2.0))?;
        if states.dvs >= 2.0 && !self.matured {
            self.matured = true;
            ctx.send(Signal::CropFinish(CropFinish {
                finish_type: FinishType::Maturity,
                crop_delete: true,
            }));
        }
        Ok(())
    }

    fn finalize(&mut self, ctx: &mut FinalizeContext<'_>) -> Result<(), ComponentError> {
        let states = self.states.as_ref().ok_or_else(not_initialized)?;
        ctx.touch(states)
    }

    fn set_variable(
        &mut self,
        name: &str,
        value: f64,
        ctx: &mut OverrideContext<'_>,
    ) -> Result<Increments, ComponentError> {
        if name != "DVS" {
            return Err(ComponentError::UnknownVariable {
                name: name.to_owned(),
            });
        }
        let states = self.states.as_mut().ok_or_else(not_initialized)?;
        let increment = value - states.dvs;
        ctx.update(states, |s| s.dvs = value)?;
        Ok([("DVS".to_owned(), increment)].into_iter().collect())
    }
}

// ── WaterBucket ────────────────────────────────────────────────

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Bucket {
    pub sm: f64,
    pub total_irrigation: f64,
}
variable_set!(Bucket { sm => "SM", total_irrigation => "TOTIRR" });

#[derive(Clone, Debug, Default, PartialEq)]
pub struct BucketRates {
    pub dsm: f64,
}
variable_set!(BucketRates { dsm => "DSM" });

/// Initial and maximum water content, parameters `SM0` and `SMFCF`.
#[derive(Clone, Debug)]
pub struct BucketParams {
    pub sm0: f64,
    pub smfcf: f64,
}

impl FromParameters for BucketParams {
    fn from_parameters(params: &ParameterSet) -> Result<Self, ParameterError> {
        Ok(Self {
            sm0: params.require_f64("SM0")?,
            smfcf: params.require_f64("SMFCF")?,
        })
    }
}

/// Soil water store: rain and irrigation in, reference evapotranspiration
/// out, bounded by `[0, SMFCF]`.
#[derive(Default)]
pub struct WaterBucket {
    params: Option<Params<BucketParams>>,
    states: Option<States<Bucket>>,
    rates: Option<Rates<BucketRates>>,
    pending_irrigation: f64,
    irrigated_today: f64,
}

impl WaterBucket {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Component for WaterBucket {
    fn name(&self) -> &str {
        "water_bucket"
    }

    fn subscriptions(&self) -> &[SignalKind] {
        &[SignalKind::Irrigate]
    }

    fn initialize(&mut self, ctx: &mut InitContext<'_>) -> Result<(), ComponentError> {
        let params: Params<BucketParams> = ctx.params()?;
        self.states = Some(ctx.states(Bucket {
            sm: params.sm0,
            total_irrigation: 0.0,
        })?);
        self.rates = Some(ctx.rates(BucketRates::default())?);
        self.params = Some(params);
        Ok(())
    }

    fn calc_rates(&mut self, ctx: &mut RateContext<'_>) -> Result<(), ComponentError> {
        let (Some(params), Some(states), Some(rates)) =
            (self.params.as_ref(), self.states.as_ref(), self.rates.as_mut())
        else {
            return Err(not_initialized());
        };
        self.irrigated_today = std::mem::take(&mut self.pending_irrigation);
        let drv = ctx.drv();
        let inflow = drv.rain + self.irrigated_today;
        let dsm = (inflow - drv.et0).clamp(-states.sm, params.smfcf - states.sm);
        ctx.update(rates, |r| r.dsm = dsm)
    }

    fn integrate(&mut self, ctx: &mut IntegrateContext<'_>) -> Result<(), ComponentError> {
        let (Some(states), Some(rates)) = (self.states.as_mut(), self.rates.as_ref()) else {
            return Err(not_initialized());
        };
        let delta = ctx.delta();
        let irrigated = self.irrigated_today;
        ctx.update(states, |s| {
            s.sm += rates.dsm * delta;
            s.total_irrigation += irrigated;
        })
    }

    fn on_signal(
        &mut self,
        signal: &Signal,
        _ctx: &mut SignalContext<'_>,
    ) -> Result<(), ComponentError> {
        if let Signal::Irrigate(irrigate) = signal {
            self.pending_irrigation += irrigate.amount * irrigate.efficiency;
        }
        Ok(())
    }

    fn set_variable(
        &mut self,
        name: &str,
        value: f64,
        ctx: &mut OverrideContext<'_>,
    ) -> Result<Increments, ComponentError> {
        if name != "SM" {
            return Err(ComponentError::UnknownVariable {
                name: name.to_owned(),
            });
        }
        let states = self.states.as_mut().ok_or_else(not_initialized)?;
        let increment = value - states.sm;
        ctx.update(states, |s| s.sm = value)?;
        Ok([("SM".to_owned(), increment)].into_iter().collect())
    }
}

// ── SequencePublisher ──────────────────────────────────────────

/// Publishes `values[i]` as state `variable` after the i-th integration,
/// starting with `values[0]` at initialization. Holds the last value once
/// the sequence runs out.
pub struct SequencePublisher {
    pub name: String,
    pub variable: String,
    pub values: Vec<f64>,
    position: usize,
}

impl SequencePublisher {
    pub fn new(name: impl Into<String>, variable: impl Into<String>, values: Vec<f64>) -> Self {
        Self {
            name: name.into(),
            variable: variable.into(),
            values,
            position: 0,
        }
    }

    fn current(&self) -> f64 {
        self.values
            .get(self.position)
            .or(self.values.last())
            .copied()
            .unwrap_or_default()
    }
}

impl Component for SequencePublisher {
    fn name(&self) -> &str {
        &self.name
    }

    fn initialize(&mut self, ctx: &mut InitContext<'_>) -> Result<(), ComponentError> {
        ctx.register(&self.variable, VarKind::State)?;
        ctx.publish(&self.variable, self.current())
    }

    fn calc_rates(&mut self, _ctx: &mut RateContext<'_>) -> Result<(), ComponentError> {
        Ok(())
    }

    fn integrate(&mut self, ctx: &mut IntegrateContext<'_>) -> Result<(), ComponentError> {
        self.position += 1;
        ctx.publish(&self.variable, self.current())
    }
}

// ── Contract violators ─────────────────────────────────────────

/// Writes its state variable while rates are computed.
pub struct StateInRates {
    pub name: String,
}

impl StateInRates {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl Component for StateInRates {
    fn name(&self) -> &str {
        &self.name
    }

    fn initialize(&mut self, ctx: &mut InitContext<'_>) -> Result<(), ComponentError> {
        ctx.register("ROGUE_STATE", VarKind::State)?;
        ctx.publish("ROGUE_STATE", 0.0)
    }

    fn calc_rates(&mut self, ctx: &mut RateContext<'_>) -> Result<(), ComponentError> {
        ctx.publish("ROGUE_STATE", 1.0)
    }

    fn integrate(&mut self, _ctx: &mut IntegrateContext<'_>) -> Result<(), ComponentError> {
        Ok(())
    }
}

/// Writes its rate variable while states are integrated.
pub struct RateInIntegrate {
    pub name: String,
}

impl RateInIntegrate {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl Component for RateInIntegrate {
    fn name(&self) -> &str {
        &self.name
    }

    fn initialize(&mut self, ctx: &mut InitContext<'_>) -> Result<(), ComponentError> {
        ctx.register("ROGUE_RATE", VarKind::Rate)
    }

    fn calc_rates(&mut self, ctx: &mut RateContext<'_>) -> Result<(), ComponentError> {
        ctx.publish("ROGUE_RATE", 0.5)
    }

    fn integrate(&mut self, ctx: &mut IntegrateContext<'_>) -> Result<(), ComponentError> {
        ctx.publish("ROGUE_RATE", 0.0)
    }
}

// ── Recording ──────────────────────────────────────────────────

/// Appends `"<name>:<event>"` to a shared [`Log`] for every lifecycle call
/// and every received signal.
pub struct Recording {
    pub name: String,
    pub topics: Vec<SignalKind>,
    pub log: Log,
}

impl Recording {
    pub fn new(name: impl Into<String>, topics: &[SignalKind], log: &Log) -> Self {
        Self {
            name: name.into(),
            topics: topics.to_vec(),
            log: Rc::clone(log),
        }
    }

    fn record(&self, day: Day, event: impl std::fmt::Display) {
        self.log
            .borrow_mut()
            .push((day, format!("{}:{event}", self.name)));
    }
}

impl Component for Recording {
    fn name(&self) -> &str {
        &self.name
    }

    fn subscriptions(&self) -> &[SignalKind] {
        &self.topics
    }

    fn initialize(&mut self, ctx: &mut InitContext<'_>) -> Result<(), ComponentError> {
        self.record(ctx.day(), "initialize");
        Ok(())
    }

    fn calc_rates(&mut self, ctx: &mut RateContext<'_>) -> Result<(), ComponentError> {
        self.record(ctx.day(), "calc_rates");
        Ok(())
    }

    fn integrate(&mut self, ctx: &mut IntegrateContext<'_>) -> Result<(), ComponentError> {
        self.record(ctx.day(), "integrate");
        Ok(())
    }

    fn finalize(&mut self, ctx: &mut FinalizeContext<'_>) -> Result<(), ComponentError> {
        self.record(ctx.day(), "finalize");
        Ok(())
    }

    fn on_signal(
        &mut self,
        signal: &Signal,
        ctx: &mut SignalContext<'_>,
    ) -> Result<(), ComponentError> {
        self.record(ctx.day(), signal.kind());
        Ok(())
    }
}

// ── Failing ────────────────────────────────────────────────────

/// Fails on the `(fail_after + 1)`-th rate call.
pub struct Failing {
    pub name: String,
    pub fail_after: usize,
    calls: usize,
}

impl Failing {
    pub fn new(name: impl Into<String>, fail_after: usize) -> Self {
        Self {
            name: name.into(),
            fail_after,
            calls: 0,
        }
    }
}

impl Component for Failing {
    fn name(&self) -> &str {
        &self.name
    }

    fn initialize(&mut self, _ctx: &mut InitContext<'_>) -> Result<(), ComponentError> {
        Ok(())
    }

    fn calc_rates(&mut self, _ctx: &mut RateContext<'_>) -> Result<(), ComponentError> {
        self.calls += 1;
        if self.calls > self.fail_after {
            return Err(ComponentError::failed(format!(
                "failed after {} calls",
                self.fail_after
            )));
        }
        Ok(())
    }

    fn integrate(&mut self, _ctx: &mut IntegrateContext<'_>) -> Result<(), ComponentError> {
        Ok(())
    }
}
