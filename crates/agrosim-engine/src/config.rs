//! Engine configuration, validation, and error types.
//!
//! [`EngineConfig`] is the input for constructing an [`Engine`](crate::Engine).
//! [`validate()`](EngineConfig::validate) checks structural invariants at
//! startup; the engine constructor then resolves the schedule and
//! initializes the soil subtree, either of which can still fail.

use agrosim_agro::{Schedule, ScheduleError};
use agrosim_component::{ComponentError, ComponentFailure, Subtree};
use agrosim_core::{CropStart, ParameterSet, WeatherProvider};
use chrono::Weekday;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default cap on the number of steps in one run (about a century).
pub const DEFAULT_MAX_STEPS: u32 = 36_500;

// ── CropFactory ────────────────────────────────────────────────

/// Builds the component subtree of a crop when its calendar starts it.
///
/// Implemented for any `Fn(&CropStart) -> Result<Subtree, ComponentError>`.
pub trait CropFactory {
    /// Build the crop described by `start`.
    fn build(&self, start: &CropStart) -> Result<Subtree, ComponentError>;
}

impl<F> CropFactory for F
where
    F: Fn(&CropStart) -> Result<Subtree, ComponentError>,
{
    fn build(&self, start: &CropStart) -> Result<Subtree, ComponentError> {
        self(start)
    }
}

// ── OutputConfig ───────────────────────────────────────────────

/// When the timer requests a regular output snapshot.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputInterval {
    /// Every `every` days, counted from the first day of the run.
    Daily {
        /// Interval in days. Must be at least 1.
        every: u32,
    },
    /// On one day of the week.
    Weekly {
        /// The day of the week.
        weekday: Weekday,
    },
    /// On the 10th, the 20th and the last day of each month.
    Dekadal,
    /// On the last day of each month.
    Monthly,
}

impl Default for OutputInterval {
    fn default() -> Self {
        Self::Daily { every: 1 }
    }
}

/// Which registry variables are recorded, and when.
///
/// ```
/// use agrosim_engine::{OutputConfig, OutputInterval};
///
/// let cfg = OutputConfig::from_yaml_str(
///     "output_vars: [DVS, TAGP]\nsummary_vars: [TAGP]\ninterval: dekadal\n",
/// )
/// .unwrap();
/// assert_eq!(cfg.interval, OutputInterval::Dekadal);
/// assert!(cfg.terminal_vars.is_empty());
/// ```
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Variables recorded on every output step.
    #[serde(default)]
    pub output_vars: Vec<String>,
    /// Variables recorded when a crop finishes or a summary is requested.
    #[serde(default)]
    pub summary_vars: Vec<String>,
    /// Variables recorded once when the run terminates.
    #[serde(default)]
    pub terminal_vars: Vec<String>,
    /// Output interval. Unit intervals are written as a plain string
    /// (`dekadal`), the others as a single-key map (`daily: {every: 5}`).
    #[serde(default, with = "serde_yaml::with::singleton_map")]
    pub interval: OutputInterval,
}

impl OutputConfig {
    /// Parse an output configuration from YAML.
    pub fn from_yaml_str(text: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(text)
    }
}

// ── ConfigError ────────────────────────────────────────────────

/// Errors detected while constructing an [`Engine`](crate::Engine).
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The agromanagement schedule is invalid.
    #[error("schedule: {0}")]
    Schedule(#[from] ScheduleError),
    /// `max_steps` is zero.
    #[error("max_steps must be at least 1")]
    ZeroMaxSteps,
    /// A daily output interval of zero days.
    #[error("daily output interval must be at least 1 day")]
    ZeroOutputInterval,
    /// A variable is listed twice in one output list.
    #[error("output variable '{name}' is listed more than once in {list}")]
    DuplicateOutputVar {
        /// The repeated name.
        name: String,
        /// Which list it is repeated in.
        list: &'static str,
    },
    /// The schedule starts crops but no crop factory is configured.
    #[error("schedule starts crop '{crop}' but no crop factory is configured")]
    MissingCropFactory {
        /// First crop named by the schedule.
        crop: String,
    },
    /// The soil subtree could not be inserted.
    #[error("setup: {0}")]
    Component(#[from] ComponentError),
    /// The soil subtree failed to initialize.
    #[error("setup: {0}")]
    Setup(#[from] ComponentFailure),
}

// ── EngineConfig ───────────────────────────────────────────────

/// Complete configuration for constructing an engine.
///
/// Consumed by [`Engine::new`](crate::Engine::new).
pub struct EngineConfig {
    /// Site, timer, soil and crop parameters.
    pub parameters: ParameterSet,
    /// Daily driving data.
    pub weather: Box<dyn WeatherProvider>,
    /// Parsed agromanagement schedule.
    pub schedule: Schedule,
    /// Components that live for the whole run, inserted ahead of any crop.
    pub soil: Option<Subtree>,
    /// Builds a crop subtree on each crop start.
    pub crop: Option<Box<dyn CropFactory>>,
    /// Output variables and interval.
    pub output: OutputConfig,
    /// Safety cap on the number of steps. Default: [`DEFAULT_MAX_STEPS`].
    pub max_steps: u32,
}

impl EngineConfig {
    /// A configuration with no soil, no crop factory and default output.
    pub fn new(
        parameters: ParameterSet,
        weather: impl WeatherProvider + 'static,
        schedule: Schedule,
    ) -> Self {
        Self {
            parameters,
            weather: Box::new(weather),
            schedule,
            soil: None,
            crop: None,
            output: OutputConfig::default(),
            max_steps: DEFAULT_MAX_STEPS,
        }
    }

    /// Set the run-long soil subtree.
    pub fn with_soil(mut self, soil: Subtree) -> Self {
        self.soil = Some(soil);
        self
    }

    /// Set the crop factory.
    pub fn with_crop(mut self, factory: impl CropFactory + 'static) -> Self {
        self.crop = Some(Box::new(factory));
        self
    }

    /// Set the output configuration.
    pub fn with_output(mut self, output: OutputConfig) -> Self {
        self.output = output;
        self
    }

    /// Set the step cap.
    pub fn with_max_steps(mut self, max_steps: u32) -> Self {
        self.max_steps = max_steps;
        self
    }

    /// Validate structural invariants that do not need the schedule resolved.
    pub fn validate(&self) -> Result<(), ConfigError> {
        // 1. Step cap.
        if self.max_steps == 0 {
            return Err(ConfigError::ZeroMaxSteps);
        }
        // 2. Output interval.
        if self.output.interval == (OutputInterval::Daily { every: 0 }) {
            return Err(ConfigError::ZeroOutputInterval);
        }
        // 3. Output lists must not repeat names.
        for (list, names) in [
            ("output_vars", &self.output.output_vars),
            ("summary_vars", &self.output.summary_vars),
            ("terminal_vars", &self.output.terminal_vars),
        ] {
            for (i, name) in names.iter().enumerate() {
                if names[..i].contains(name) {
                    return Err(ConfigError::DuplicateOutputVar {
                        name: name.clone(),
                        list,
                    });
                }
            }
        }
        // 4. A schedule with crops needs something to build them.
        if self.crop.is_none() {
            let first_crop = self
                .schedule
                .campaigns
                .iter()
                .find_map(|c| c.crop_calendar.as_ref());
            if let Some(calendar) = first_crop {
                return Err(ConfigError::MissingCropFactory {
                    crop: calendar.crop_name.clone(),
                });
            }
        }
        Ok(())
    }
}

impl std::fmt::Debug for EngineConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineConfig")
            .field("parameters", &self.parameters.len())
            .field("campaigns", &self.schedule.campaigns.len())
            .field("soil", &self.soil.as_ref().map(Subtree::len))
            .field("crop", &self.crop.is_some())
            .field("output", &self.output)
            .field("max_steps", &self.max_steps)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agrosim_agro::{CampaignDef, CropCalendarDef};
    use agrosim_core::{Day, EndType, StartType, WeatherTable};

    fn start() -> Day {
        Day::from_ymd_opt(2022, 4, 1).unwrap()
    }

    fn config() -> EngineConfig {
        EngineConfig::new(
            ParameterSet::new(),
            WeatherTable::new(),
            Schedule::new(vec![CampaignDef::empty(start())]),
        )
    }

    #[test]
    fn defaults_validate() {
        let cfg = config();
        assert_eq!(cfg.max_steps, DEFAULT_MAX_STEPS);
        assert_eq!(cfg.output.interval, OutputInterval::Daily { every: 1 });
        cfg.validate().unwrap();
    }

    #[test]
    fn zero_max_steps_rejected() {
        let cfg = config().with_max_steps(0);
        assert!(matches!(cfg.validate(), Err(ConfigError::ZeroMaxSteps)));
    }

    #[test]
    fn zero_daily_interval_rejected() {
        let cfg = config().with_output(OutputConfig {
            interval: OutputInterval::Daily { every: 0 },
            ..OutputConfig::default()
        });
        assert!(matches!(cfg.validate(), Err(ConfigError::ZeroOutputInterval)));
    }

    #[test]
    fn duplicate_output_var_rejected() {
        let cfg = config().with_output(OutputConfig {
            summary_vars: vec!["TAGP".into(), "TWSO".into(), "TAGP".into()],
            ..OutputConfig::default()
        });
        match cfg.validate() {
            Err(ConfigError::DuplicateOutputVar { name, list }) => {
                assert_eq!(name, "TAGP");
                assert_eq!(list, "summary_vars");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn crops_need_a_factory() {
        let mut campaign = CampaignDef::empty(start());
        campaign.crop_calendar = Some(CropCalendarDef {
            crop_name: "barley".into(),
            variety_name: "spring".into(),
            crop_start_date: start(),
            crop_start_type: StartType::Sowing,
            crop_end_date: None,
            crop_end_type: EndType::Maturity,
            max_duration: 120,
        });
        let cfg = EngineConfig::new(ParameterSet::new(), WeatherTable::new(), Schedule::new(vec![campaign]));
        assert!(matches!(
            cfg.validate(),
            Err(ConfigError::MissingCropFactory { crop }) if crop == "barley"
        ));
    }

    #[test]
    fn output_config_from_yaml() {
        let cfg = OutputConfig::from_yaml_str(
            "output_vars: [DVS, LAI]\nterminal_vars: [TWSO]\ninterval: {weekly: {weekday: Mon}}\n",
        )
        .unwrap();
        assert_eq!(cfg.output_vars, vec!["DVS", "LAI"]);
        assert_eq!(cfg.terminal_vars, vec!["TWSO"]);
        assert_eq!(cfg.interval, OutputInterval::Weekly { weekday: Weekday::Mon });
    }

    #[test]
    fn output_interval_accepts_map_and_plain_forms() {
        let interval = |yaml: &str| OutputConfig::from_yaml_str(yaml).unwrap().interval;
        assert_eq!(
            interval("interval:\n  daily:\n    every: 5\n"),
            OutputInterval::Daily { every: 5 }
        );
        assert_eq!(
            interval("interval: {weekly: {weekday: Fri}}\n"),
            OutputInterval::Weekly { weekday: Weekday::Fri }
        );
        assert_eq!(interval("interval: monthly\n"), OutputInterval::Monthly);
        assert_eq!(interval("output_vars: [DVS]\n"), OutputInterval::Daily { every: 1 });
        assert!(OutputConfig::from_yaml_str("interval: fortnightly\n").is_err());
    }

    #[test]
    fn output_interval_serializes_as_single_key_map() {
        let cfg = OutputConfig {
            interval: OutputInterval::Daily { every: 3 },
            ..OutputConfig::default()
        };
        let yaml = serde_yaml::to_string(&cfg).unwrap();
        assert!(yaml.contains("daily:"), "{yaml}");
        assert_eq!(OutputConfig::from_yaml_str(&yaml).unwrap(), cfg);
    }
}
