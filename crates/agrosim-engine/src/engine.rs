//! The day-stepping engine.
//!
//! [`Engine`] owns everything one simulation run needs: the variable
//! registry, the signal bus, the agromanagement scheduler, the component
//! tree and the clock. Each [`step()`](Engine::step) runs one simulated
//! day to completion:
//!
//! 1. advance the clock (queues output and terminate signals),
//! 2. fetch the day's driving data,
//! 3. scheduling: evaluate the schedule and dispatch signals, starting and
//!    finishing crops,
//! 4. rates on every active component,
//! 5. invalidate states,
//! 6. integrate every active component,
//! 7. record the output snapshot if requested,
//! 8. invalidate rates,
//! 9. terminate if requested or if the step guard is exceeded.
//!
//! Signals raised during a phase are queued and dispatched at the end of
//! that phase, in the order they were raised.
//!
//! # Ownership model
//!
//! `Engine` is neither `Send` nor `Sync`: components are plain trait
//! objects and bus handlers share state through `Rc`. Several engines may
//! coexist in one thread; each owns its registry and bus, so nothing is
//! shared between them.

use std::cell::Cell;
use std::rc::Rc;

use agrosim_agro::{AgroManager, ScheduleError};
use agrosim_component::{
    ComponentError, ComponentFailure, ComponentTree, Increments, Placement,
};
use agrosim_core::{
    ComponentId, CropFinish, CropStart, Day, Envelope, EngineId, HandlerId, Outbox,
    ParameterError, ParameterSet, Signal, SignalBus, SignalError, SignalKind, Value, VarKind,
    WeatherError, WeatherProvider,
};
use agrosim_kiosk::{KioskError, Phase, VariableKiosk};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::{ConfigError, CropFactory, EngineConfig, OutputConfig};
use crate::output::OutputRecord;
use crate::timer::Timer;

// ── Errors and reports ─────────────────────────────────────────

/// Why a run ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TerminationReason {
    /// A terminate signal: the end date was reached or the schedule ran out.
    Scheduled,
    /// The step guard was exceeded.
    GuardExceeded,
}

/// Errors that abort a step.
///
/// The engine is left on the failing day; the run should be abandoned.
#[derive(Debug, Error)]
pub enum StepError {
    /// The run has already terminated.
    #[error("engine has terminated")]
    Terminated,
    /// The clock ran past the last representable day.
    #[error("calendar exhausted")]
    CalendarExhausted,
    /// The weather provider has no usable data for the day.
    #[error("driving data for {day}: {source}")]
    Weather {
        /// The day being simulated.
        day: Day,
        /// The provider error.
        #[source]
        source: WeatherError,
    },
    /// A component failed in some phase.
    #[error(transparent)]
    Component(#[from] ComponentFailure),
    /// A bus handler failed.
    #[error("handler for '{topic}' on {day}: {source}")]
    Signal {
        /// The day being simulated.
        day: Day,
        /// Topic being delivered.
        topic: SignalKind,
        /// The handler error.
        #[source]
        source: SignalError,
    },
    /// A crop start arrived while another crop is still growing.
    #[error("cannot start '{crop}' on {day}: another crop is still active")]
    CropAlreadyActive {
        /// The day being simulated.
        day: Day,
        /// The crop that was to start.
        crop: String,
    },
    /// A crop start arrived but no crop factory is configured.
    #[error("cannot start '{crop}': no crop factory configured")]
    NoCropFactory {
        /// The crop that was to start.
        crop: String,
    },
    /// The crop factory failed or built an unusable subtree.
    #[error("building crop '{crop}': {source}")]
    CropBuild {
        /// The crop that was to start.
        crop: String,
        /// The underlying error.
        #[source]
        source: ComponentError,
    },
    /// Agromanagement could not evaluate its event tables.
    #[error(transparent)]
    Schedule(#[from] ScheduleError),
    /// Crop parameters could not be activated.
    #[error(transparent)]
    Parameter(#[from] ParameterError),
    /// An external override named a variable nobody registered.
    #[error("cannot set '{name}': variable is not registered")]
    UnknownVariable {
        /// The variable name.
        name: String,
    },
}

/// Summary of one completed step.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StepReport {
    /// The simulated day.
    pub day: Day,
    /// Signals dispatched during the step.
    pub signals: usize,
    /// Set when this step ended the run.
    pub terminated: Option<TerminationReason>,
}

/// Requests raised by engine-level bus handlers during a step.
#[derive(Debug, Default)]
struct Flags {
    terminate: Cell<bool>,
    output: Cell<bool>,
    summary: Cell<bool>,
}

// ── Engine ─────────────────────────────────────────────────────

/// One simulation run.
///
/// Created from an [`EngineConfig`] via [`new()`](Engine::new).
///
/// # Example
///
/// ```ignore
/// let mut engine = Engine::new(config)?;
/// let reason = engine.run_till_terminate()?;
/// for record in engine.output() {
///     println!("{} {:?}", record.day, record.get_f64("DVS"));
/// }
/// ```
pub struct Engine {
    id: EngineId,
    kiosk: VariableKiosk,
    bus: SignalBus,
    outbox: Outbox,
    flags: Rc<Flags>,
    agro: AgroManager,
    tree: ComponentTree,
    parameters: ParameterSet,
    weather: Box<dyn WeatherProvider>,
    crop_factory: Option<Box<dyn CropFactory>>,
    crop: Option<ComponentId>,
    finished_crop: Option<ComponentId>,
    timer: Timer,
    output_config: OutputConfig,
    output: Vec<OutputRecord>,
    summary: Vec<OutputRecord>,
    terminal: Vec<OutputRecord>,
    day: Option<Day>,
    steps: u32,
    max_steps: u32,
    terminated: Option<TerminationReason>,
}

impl Engine {
    /// Create an engine from `config`.
    ///
    /// Validates the configuration, resolves the run's start and end dates
    /// from the schedule and initializes the soil subtree on the start
    /// date. Crops are built later, when their calendars start them.
    pub fn new(config: EngineConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let agro = AgroManager::new(&config.schedule)?;

        let id = EngineId::next();
        let mut kiosk = VariableKiosk::new(id);
        let mut bus = SignalBus::new(id);
        let flags = Rc::new(Flags::default());
        connect_flag(&mut bus, SignalKind::Terminate, &flags, |f| &f.terminate);
        connect_flag(&mut bus, SignalKind::Output, &flags, |f| &f.output);
        connect_flag(&mut bus, SignalKind::SummaryOutput, &flags, |f| &f.summary);

        let start = agro.start_date();
        let mut tree = ComponentTree::new();
        let mut outbox = Outbox::new();
        if let Some(soil) = config.soil {
            let root = tree.insert(Placement::First, soil)?;
            tree.initialize(root, start, &mut kiosk, &config.parameters, &mut outbox)?;
        }
        let timer = Timer::new(start, agro.end_date(), config.output.interval);

        info!(
            engine = %id,
            start = %start,
            end = %agro.end_date(),
            components = tree.len(),
            "engine created"
        );
        Ok(Self {
            id,
            kiosk,
            bus,
            outbox,
            flags,
            agro,
            tree,
            parameters: config.parameters,
            weather: config.weather,
            crop_factory: config.crop,
            crop: None,
            finished_crop: None,
            timer,
            output_config: config.output,
            output: Vec::new(),
            summary: Vec::new(),
            terminal: Vec::new(),
            day: None,
            steps: 0,
            max_steps: config.max_steps,
            terminated: None,
        })
    }

    // ── Stepping ────────────────────────────────────────────────

    /// Simulate one day.
    ///
    /// # Errors
    ///
    /// Returns [`StepError::Terminated`] once the run has ended. Any other
    /// error is a contract or data failure on the current day; the run
    /// cannot continue meaningfully.
    pub fn step(&mut self) -> Result<StepReport, StepError> {
        if self.terminated.is_some() {
            return Err(StepError::Terminated);
        }
        let mut signals = 0;

        // 1. Advance the clock.
        let day = self
            .timer
            .advance(&mut self.outbox)
            .ok_or(StepError::CalendarExhausted)?;
        self.day = Some(day);
        debug!(engine = %self.id, %day, "step");

        // 2. Driving data.
        let drv = self
            .weather
            .driving_data(day)
            .map_err(|source| StepError::Weather { day, source })?
            .with_derived();

        // 3. Scheduling.
        self.kiosk.set_phase(Phase::Scheduling);
        self.agro.step(day, &self.kiosk, &mut self.outbox)?;
        signals += self.dispatch(day)?;

        // 4. Rates.
        self.kiosk.set_phase(Phase::Rates);
        self.tree
            .calc_rates(day, &drv, &mut self.kiosk, &mut self.outbox)?;
        signals += self.dispatch(day)?;

        // 5. States are stale once rates are computed.
        self.kiosk.invalidate(VarKind::State);

        // 6. Integrate.
        self.kiosk.set_phase(Phase::Integrate);
        self.tree
            .integrate(day, 1.0, &mut self.kiosk, &mut self.outbox)?;
        signals += self.dispatch(day)?;

        // 7. Output, while both states and rates of the day are defined.
        if self.flags.output.take() {
            self.output.push(OutputRecord::capture(
                day,
                &self.output_config.output_vars,
                &self.kiosk,
            ));
        }
        if self.flags.summary.take() {
            self.record_summary(day);
        }

        // 8. Rates are stale once integrated.
        self.kiosk.invalidate(VarKind::Rate);
        self.steps += 1;

        // 9. Termination.
        if self.flags.terminate.take() {
            self.terminate(day, TerminationReason::Scheduled)?;
        } else if self.steps >= self.max_steps {
            warn!(
                engine = %self.id,
                %day,
                max_steps = self.max_steps,
                "step guard exceeded, terminating run"
            );
            self.terminate(day, TerminationReason::GuardExceeded)?;
        }

        Ok(StepReport {
            day,
            signals,
            terminated: self.terminated,
        })
    }

    /// Simulate up to `days` days, stopping early if the run terminates.
    ///
    /// Returns the number of days simulated.
    pub fn run(&mut self, days: u32) -> Result<u32, StepError> {
        let mut done = 0;
        while done < days && self.terminated.is_none() {
            self.step()?;
            done += 1;
        }
        Ok(done)
    }

    /// Simulate until `day` has been completed or the run terminates.
    pub fn run_till(&mut self, day: Day) -> Result<(), StepError> {
        while self.terminated.is_none() && self.day.is_none_or(|current| current < day) {
            self.step()?;
        }
        Ok(())
    }

    /// Simulate until the run terminates.
    pub fn run_till_terminate(&mut self) -> Result<TerminationReason, StepError> {
        loop {
            if let Some(reason) = self.terminated {
                return Ok(reason);
            }
            self.step()?;
        }
    }

    // ── Signals ─────────────────────────────────────────────────

    /// Dispatch every queued signal: bus handlers first, then subscribed
    /// components, then the engine's own crop lifecycle handling. Signals
    /// raised while dispatching are dispatched in the same pass.
    fn dispatch(&mut self, day: Day) -> Result<usize, StepError> {
        let mut count = 0;
        while let Some(signal) = self.outbox.pop() {
            count += 1;
            self.bus
                .send(day, &signal)
                .map_err(|source| StepError::Signal {
                    day,
                    topic: signal.kind(),
                    source,
                })?;
            self.tree
                .deliver(&signal, day, &self.kiosk, &mut self.outbox)?;
            match &signal {
                Signal::CropStart(start) => self.start_crop(day, start)?,
                Signal::CropFinish(finish) => self.finish_crop(day, finish)?,
                _ => {}
            }
        }
        Ok(count)
    }

    /// Connect an observer to this engine's bus.
    pub fn connect<F>(&mut self, kind: SignalKind, handler: F) -> HandlerId
    where
        F: FnMut(&Envelope<'_>) -> Result<(), SignalError> + 'static,
    {
        self.bus.connect(kind, handler)
    }

    /// Disconnect an observer.
    pub fn disconnect(&mut self, handler: HandlerId) -> bool {
        self.bus.disconnect(handler)
    }

    /// Hand an envelope to this engine's bus.
    ///
    /// Envelopes sent by another engine are dropped; returns the number of
    /// handlers invoked.
    pub fn deliver(&mut self, envelope: &Envelope<'_>) -> Result<usize, SignalError> {
        self.bus.deliver(envelope)
    }

    // ── Crop lifecycle ──────────────────────────────────────────

    fn start_crop(&mut self, day: Day, start: &CropStart) -> Result<(), StepError> {
        if self.crop.is_some() {
            return Err(StepError::CropAlreadyActive {
                day,
                crop: start.crop_name.clone(),
            });
        }
        if let Some(old) = self.finished_crop.take() {
            self.remove_subtree(old)?;
        }
        let Some(factory) = &self.crop_factory else {
            return Err(StepError::NoCropFactory {
                crop: start.crop_name.clone(),
            });
        };
        self.parameters.set_active_crop(
            &start.crop_name,
            &start.variety_name,
            start.start_type,
            start.end_type,
        )?;
        let build_err = |source| StepError::CropBuild {
            crop: start.crop_name.clone(),
            source,
        };
        let subtree = factory.build(start).map_err(build_err)?;
        let root = self
            .tree
            .insert(Placement::Last, subtree)
            .map_err(build_err)?;
        // Registered before initializing so a failure still gets cleaned up.
        self.crop = Some(root);

        let previous = self.kiosk.phase();
        self.kiosk.set_phase(Phase::Setup);
        let result = self.tree.initialize(
            root,
            day,
            &mut self.kiosk,
            &self.parameters,
            &mut self.outbox,
        );
        self.kiosk.set_phase(previous);
        result?;

        info!(
            engine = %self.id,
            crop = %start.crop_name,
            variety = %start.variety_name,
            %day,
            "crop started"
        );
        Ok(())
    }

    fn finish_crop(&mut self, day: Day, finish: &CropFinish) -> Result<(), StepError> {
        let Some(root) = self.crop.take() else {
            debug!(engine = %self.id, %day, "crop finish without an active crop");
            return Ok(());
        };
        self.finalize(Some(root), day)?;
        self.record_summary(day);
        if finish.crop_delete {
            self.remove_subtree(root)?;
        } else {
            self.finished_crop = Some(root);
        }
        self.agro
            .on_crop_finish(day, finish.finish_type, &mut self.outbox);
        info!(
            engine = %self.id,
            %day,
            finish_type = %finish.finish_type,
            deleted = finish.crop_delete,
            "crop finished"
        );
        Ok(())
    }

    fn remove_subtree(&mut self, root: ComponentId) -> Result<(), StepError> {
        let name = self.tree.name(root).unwrap_or_default().to_owned();
        let removed = self.tree.remove(root).map_err(|source| ComponentFailure {
            name,
            id: root,
            phase: self.kiosk.phase(),
            source,
        })?;
        let names: usize = removed
            .iter()
            .map(|id| self.kiosk.deregister_owner(*id))
            .sum();
        debug!(engine = %self.id, components = removed.len(), names, "subtree removed");
        Ok(())
    }

    fn finalize(&mut self, root: Option<ComponentId>, day: Day) -> Result<(), StepError> {
        let previous = self.kiosk.phase();
        self.kiosk.set_phase(Phase::Finalize);
        let result = self
            .tree
            .finalize(root, day, &mut self.kiosk, &mut self.outbox);
        self.kiosk.set_phase(previous);
        Ok(result?)
    }

    fn terminate(&mut self, day: Day, reason: TerminationReason) -> Result<(), StepError> {
        self.finalize(None, day)?;
        if self.crop.take().is_some() {
            self.record_summary(day);
        }
        let dropped = self.outbox.drain().count();
        if dropped > 0 {
            debug!(engine = %self.id, dropped, "signals raised during finalize were not dispatched");
        }
        self.terminal.push(OutputRecord::capture(
            day,
            &self.output_config.terminal_vars,
            &self.kiosk,
        ));
        self.agro.close();
        self.terminated = Some(reason);
        info!(engine = %self.id, %day, steps = self.steps, ?reason, "run terminated");
        Ok(())
    }

    fn record_summary(&mut self, day: Day) {
        self.summary.push(OutputRecord::capture(
            day,
            &self.output_config.summary_vars,
            &self.kiosk,
        ));
    }

    // ── Variables ───────────────────────────────────────────────

    /// Current value of a registry variable.
    pub fn get_variable(&self, name: &str) -> Result<&Value, KioskError> {
        self.kiosk.get(name)
    }

    /// Force state variable `name` to `value` between steps.
    ///
    /// The request is routed to the component that owns `name`, which
    /// decides how to apply it. Returns the increments applied to every
    /// state it touched. Signals raised by the override are dispatched in
    /// the next step.
    pub fn set_variable(&mut self, name: &str, value: f64) -> Result<Increments, StepError> {
        let owner = self
            .kiosk
            .owner_of(name)
            .ok_or_else(|| StepError::UnknownVariable {
                name: name.to_owned(),
            })?;
        let day = self.day.unwrap_or_else(|| self.timer.start());
        let previous = self.kiosk.phase();
        self.kiosk.set_phase(Phase::Override);
        let result = self.tree.set_variable(
            owner,
            name,
            value,
            day,
            &mut self.kiosk,
            &mut self.outbox,
        );
        self.kiosk.set_phase(previous);
        let increments = result?;
        info!(engine = %self.id, %day, name, value, "state override applied");
        Ok(increments)
    }

    // ── Accessors ───────────────────────────────────────────────

    /// This engine instance's id.
    pub fn id(&self) -> EngineId {
        self.id
    }

    /// The last simulated day, `None` before the first step.
    pub fn day(&self) -> Option<Day> {
        self.day
    }

    /// Number of completed steps.
    pub fn steps(&self) -> u32 {
        self.steps
    }

    /// Why the run ended, `None` while it is still running.
    pub fn terminated(&self) -> Option<TerminationReason> {
        self.terminated
    }

    /// Whether a crop is currently growing.
    pub fn crop_active(&self) -> bool {
        self.crop.is_some()
    }

    /// The variable registry.
    pub fn kiosk(&self) -> &VariableKiosk {
        &self.kiosk
    }

    /// The agromanagement scheduler.
    pub fn agro(&self) -> &AgroManager {
        &self.agro
    }

    /// The component tree.
    pub fn tree(&self) -> &ComponentTree {
        &self.tree
    }

    /// The parameter bundle.
    pub fn parameters(&self) -> &ParameterSet {
        &self.parameters
    }

    /// Regular output snapshots.
    pub fn output(&self) -> &[OutputRecord] {
        &self.output
    }

    /// Snapshots taken when crops finished or a summary was requested.
    pub fn summary_output(&self) -> &[OutputRecord] {
        &self.summary
    }

    /// Snapshot taken when the run terminated.
    pub fn terminal_output(&self) -> &[OutputRecord] {
        &self.terminal
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("id", &self.id)
            .field("day", &self.day)
            .field("steps", &self.steps)
            .field("tree", &self.tree)
            .field("terminated", &self.terminated)
            .finish()
    }
}

fn connect_flag(
    bus: &mut SignalBus,
    kind: SignalKind,
    flags: &Rc<Flags>,
    select: fn(&Flags) -> &Cell<bool>,
) {
    let flags = Rc::clone(flags);
    bus.connect(kind, move |_| {
        select(&flags).set(true);
        Ok(())
    });
}
