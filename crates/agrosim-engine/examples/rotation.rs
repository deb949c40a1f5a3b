//! Two-crop rotation driven by a YAML agromanagement schedule.
//!
//! Demonstrates:
//!   1. Loading a schedule and an output configuration from YAML
//!   2. Writing a typed crop component (temperature-sum phenology)
//!   3. Building crops on demand through a crop factory
//!   4. Observing signals on the engine's bus
//!   5. Reading daily, summary and terminal output
//!
//! Run with:
//!   RUST_LOG=info cargo run --example rotation

use std::error::Error;

use agrosim_agro::Schedule;
use agrosim_component::{
    variable_set, Component, ComponentError, FinalizeContext, FromParameters, InitContext,
    IntegrateContext, Params, RateContext, Rates, States, Subtree,
};
use agrosim_core::{
    CropFinish, CropStart, FinishType, ParameterError, ParameterSet, ParameterSource, Signal,
    SignalKind,
};
use agrosim_engine::{Engine, EngineConfig, OutputConfig};
use agrosim_test_utils::{day, synthetic_weather, WaterBucket};
use tracing_subscriber::EnvFilter;

const SCHEDULE: &str = "
AgroManagement:
- 2021-03-01:
    CropCalendar:
      crop_name: barley
      variety_name: spring
      crop_start_date: 2021-03-20
      crop_start_type: emergence
      crop_end_date:
      crop_end_type: maturity
      max_duration: 180
    TimedEvents:
    - event_signal: irrigate
      name: establishment
      comment: cm
      events_table:
      - 2021-04-10: {amount: 2.5, efficiency: 0.8}
    StateEvents:
- 2021-09-01:
    CropCalendar:
      crop_name: rapeseed
      variety_name: winter
      crop_start_date: 2021-09-05
      crop_start_type: sowing
      crop_end_date: 2022-02-28
      crop_end_type: earliest
      max_duration: 250
    TimedEvents:
    StateEvents:
- 2022-03-01:
";

const OUTPUT: &str = "
output_vars: [DVS, TSUM, SM]
summary_vars: [DVS, TSUM]
terminal_vars: [SM, TOTIRR]
interval: monthly
";

// ─── Phenology ──────────────────────────────────────────────────

#[derive(Clone, Debug, Default)]
struct PhenoStates {
    dvs: f64,
    tsum: f64,
}
variable_set!(PhenoStates { dvs => "DVS", tsum => "TSUM" });

#[derive(Clone, Debug, Default)]
struct PhenoRates {
    dtsum: f64,
}
variable_set!(PhenoRates { dtsum => "DTSUM" });

#[derive(Clone, Debug)]
struct PhenoParams {
    tbase: f64,
    tsum_mature: f64,
}

impl FromParameters for PhenoParams {
    fn from_parameters(params: &ParameterSet) -> Result<Self, ParameterError> {
        Ok(Self {
            tbase: params.require_f64("TBASE")?,
            tsum_mature: params.require_f64("TSUM_MATURE")?,
        })
    }
}

/// Development driven by daily temperature above a base temperature.
#[derive(Default)]
struct Phenology {
    params: Option<Params<PhenoParams>>,
    states: Option<States<PhenoStates>>,
    rates: Option<Rates<PhenoRates>>,
    mature: bool,
}

impl Component for Phenology {
    fn name(&self) -> &str {
        "phenology"
    }

    fn initialize(&mut self, ctx: &mut InitContext<'_>) -> Result<(), ComponentError> {
        self.params = Some(ctx.params()?);
        self.states = Some(ctx.states(PhenoStates::default())?);
        self.rates = Some(ctx.rates(PhenoRates::default())?);
        Ok(())
    }

    fn calc_rates(&mut self, ctx: &mut RateContext<'_>) -> Result<(), ComponentError> {
        let (Some(params), Some(rates)) = (&self.params, &mut self.rates) else {
            return Err(ComponentError::failed("not initialized"));
        };
        let dtsum = (ctx.drv().temp() - params.tbase).max(0.0);
        ctx.update(rates, |r| r.dtsum = dtsum)
    }

    fn integrate(&mut self, ctx: &mut IntegrateContext<'_>) -> Result<(), ComponentError> {
        let (Some(params), Some(states), Some(rates)) =
            (&self.params, &mut self.states, &self.rates)
        else {
            return Err(ComponentError::failed("not initialized"));
        };
        let tsum = states.tsum + rates.dtsum * ctx.delta();
        let dvs = (tsum / params.tsum_mature).min(1.0) * 2.0;
        ctx.update(states, |s| {
            s.tsum = tsum;
            s.dvs = dvs;
        })?;
        if dvs >= 2.0 && !self.mature {
            self.mature = true;
            ctx.send(Signal::CropFinish(CropFinish {
                finish_type: FinishType::Maturity,
                crop_delete: true,
            }));
        }
        Ok(())
    }

    fn finalize(&mut self, ctx: &mut FinalizeContext<'_>) -> Result<(), ComponentError> {
        match &self.states {
            Some(states) => ctx.touch(states),
            None => Ok(()),
        }
    }
}

fn build_crop(start: &CropStart) -> Result<Subtree, ComponentError> {
    tracing::info!(crop = %start.crop_name, "building crop");
    Ok(Subtree::new(Phenology::default()))
}

fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .init();

    let mut parameters = ParameterSet::new();
    parameters.add_crop("barley", "spring", [("TBASE", 0.0), ("TSUM_MATURE", 1400.0)])?;
    parameters.add_crop("rapeseed", "winter", [("TBASE", 3.0), ("TSUM_MATURE", 900.0)])?;
    parameters.insert(ParameterSource::Soil, "SM0", 0.3)?;
    parameters.insert(ParameterSource::Soil, "SMFCF", 0.45)?;

    let config = EngineConfig::new(
        parameters,
        synthetic_weather(7, day(2021, 3, 1), 400),
        Schedule::from_yaml_str(SCHEDULE)?,
    )
    .with_soil(Subtree::new(WaterBucket::new()))
    .with_crop(build_crop)
    .with_output(OutputConfig::from_yaml_str(OUTPUT)?);

    let mut engine = Engine::new(config)?;
    engine.connect(SignalKind::CropFinish, |env| {
        if let Signal::CropFinish(finish) = env.signal {
            println!("{}: crop finished ({})", env.day, finish.finish_type);
        }
        Ok(())
    });

    let reason = engine.run_till_terminate()?;
    println!("run ended on {:?} after {} days: {reason:?}", engine.day(), engine.steps());

    println!("\nmonthly output:");
    for record in engine.output() {
        println!(
            "  {}  DVS={:>5}  SM={:.3}",
            record.day,
            record
                .get_f64("DVS")
                .map_or_else(|| "-".to_owned(), |v| format!("{v:.2}")),
            record.get_f64("SM").unwrap_or(f64::NAN),
        );
    }

    println!("\ncrop summaries:");
    for record in engine.summary_output() {
        println!(
            "  {}  DVS={:.2}  TSUM={:.0}",
            record.day,
            record.get_f64("DVS").unwrap_or(f64::NAN),
            record.get_f64("TSUM").unwrap_or(f64::NAN),
        );
    }

    if let Some(record) = engine.terminal_output().first() {
        println!("\nterminal: {}", serde_yaml::to_string(record)?);
    }
    Ok(())
}
