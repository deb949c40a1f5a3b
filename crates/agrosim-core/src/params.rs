//! The parameter bundle handed to components at initialization.
//!
//! [`ParameterSet`] merges independently-sourced site, timer, soil and crop
//! parameters into one flat name-to-value lookup. Names must be unique
//! across those sources; an override layer takes precedence over all of
//! them and is meant for calibration and sensitivity runs.

use std::fmt;

use indexmap::{IndexMap, IndexSet};
use tracing::debug;

use crate::error::ParameterError;
use crate::signal::{EndType, StartType};
use crate::value::Value;

/// Where a parameter comes from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ParameterSource {
    /// Site-specific data (initial water, fixed site constants).
    Site,
    /// Timer and calendar data, including the active crop's start/end modes.
    Timer,
    /// Soil physical data.
    Soil,
    /// Parameters of the active crop.
    Crop,
    /// Values computed from other parameters. Not checked for uniqueness.
    Derived,
}

impl ParameterSource {
    fn as_str(self) -> &'static str {
        match self {
            Self::Site => "site",
            Self::Timer => "timer",
            Self::Soil => "soil",
            Self::Crop => "crop",
            Self::Derived => "derived",
        }
    }
}

impl fmt::Display for ParameterSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug)]
struct CropSet {
    crop_name: String,
    variety_name: String,
    values: IndexMap<String, Value>,
}

/// Layered, read-only-after-setup parameter lookup.
///
/// Lookup order is override, site, timer, soil, active crop, derived.
#[derive(Clone, Debug, Default)]
pub struct ParameterSet {
    site: IndexMap<String, Value>,
    timer: IndexMap<String, Value>,
    soil: IndexMap<String, Value>,
    derived: IndexMap<String, Value>,
    crops: Vec<CropSet>,
    active_crop: Option<usize>,
    overrides: IndexMap<String, Value>,
}

impl ParameterSet {
    /// Create an empty bundle.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a parameter from `source`.
    ///
    /// Fails with [`ParameterError::Duplicate`] when another non-override
    /// source already provides `name`. Crop parameters go to the active
    /// crop set, creating an anonymous one if none exists.
    pub fn insert(
        &mut self,
        source: ParameterSource,
        name: impl Into<String>,
        value: impl Into<Value>,
    ) -> Result<(), ParameterError> {
        let name = name.into();
        if source != ParameterSource::Derived {
            self.check_unique(&name, source)?;
        }
        let value = value.into();
        match source {
            ParameterSource::Site => {
                self.site.insert(name, value);
            }
            ParameterSource::Timer => {
                self.timer.insert(name, value);
            }
            ParameterSource::Soil => {
                self.soil.insert(name, value);
            }
            ParameterSource::Derived => {
                self.derived.insert(name, value);
            }
            ParameterSource::Crop => {
                let idx = match self.active_crop {
                    Some(idx) => idx,
                    None => {
                        self.crops.push(CropSet {
                            crop_name: String::new(),
                            variety_name: String::new(),
                            values: IndexMap::new(),
                        });
                        let idx = self.crops.len() - 1;
                        self.active_crop = Some(idx);
                        idx
                    }
                };
                self.crops[idx].values.insert(name, value);
            }
        }
        Ok(())
    }

    /// Builder-style [`insert`](Self::insert) for a batch of values.
    pub fn with<I, K, V>(mut self, source: ParameterSource, values: I) -> Result<Self, ParameterError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        for (k, v) in values {
            self.insert(source, k, v)?;
        }
        Ok(self)
    }

    /// Register a parameter set for one crop variety.
    ///
    /// The first set added becomes active. Further sets are selected with
    /// [`set_active_crop`](Self::set_active_crop) when a rotation starts a
    /// new crop.
    pub fn add_crop<I, K, V>(
        &mut self,
        crop_name: impl Into<String>,
        variety_name: impl Into<String>,
        values: I,
    ) -> Result<(), ParameterError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        self.crops.push(CropSet {
            crop_name: crop_name.into(),
            variety_name: variety_name.into(),
            values: values.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
        });
        if self.active_crop.is_none() {
            self.active_crop = Some(self.crops.len() - 1);
            self.check_active_crop()?;
        }
        Ok(())
    }

    /// Activate the parameters for a crop that is about to start.
    ///
    /// Records the start and end modes as `CROP_START_TYPE` and
    /// `CROP_END_TYPE` timer parameters. When only a single crop set exists
    /// it stays active regardless of the requested names.
    pub fn set_active_crop(
        &mut self,
        crop_name: &str,
        variety_name: &str,
        start_type: StartType,
        end_type: EndType,
    ) -> Result<(), ParameterError> {
        self.timer
            .insert("CROP_START_TYPE".to_owned(), start_type.to_string().into());
        self.timer
            .insert("CROP_END_TYPE".to_owned(), end_type.to_string().into());

        if self.crops.len() > 1 {
            let idx = self
                .crops
                .iter()
                .position(|c| c.crop_name == crop_name && c.variety_name == variety_name)
                .ok_or_else(|| ParameterError::UnknownCrop {
                    crop: crop_name.to_owned(),
                    variety: variety_name.to_owned(),
                })?;
            self.active_crop = Some(idx);
        }
        debug!(crop = crop_name, variety = variety_name, "activated crop parameters");
        self.check_active_crop()
    }

    /// Override the value of `name`.
    ///
    /// With `check`, the name must already be provided by some source.
    pub fn set_override(
        &mut self,
        name: impl Into<String>,
        value: impl Into<Value>,
        check: bool,
    ) -> Result<(), ParameterError> {
        let name = name.into();
        if check && !self.contains(&name) {
            return Err(ParameterError::UnknownOverride { name });
        }
        self.overrides.insert(name, value.into());
        Ok(())
    }

    /// Remove one override, or all of them when `name` is `None`.
    pub fn clear_override(&mut self, name: Option<&str>) -> Result<(), ParameterError> {
        match name {
            None => {
                self.overrides.clear();
                Ok(())
            }
            Some(name) => self
                .overrides
                .shift_remove(name)
                .map(|_| ())
                .ok_or_else(|| ParameterError::NotOverridden {
                    name: name.to_owned(),
                }),
        }
    }

    /// Number of overridden parameters.
    pub fn override_count(&self) -> usize {
        self.overrides.len()
    }

    /// Look up a parameter through all layers.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.layers().find_map(|layer| layer.get(name))
    }

    /// Whether any layer provides `name`.
    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Look up a parameter that must exist.
    pub fn require(&self, name: &str) -> Result<&Value, ParameterError> {
        self.get(name).ok_or_else(|| ParameterError::Missing {
            name: name.to_owned(),
        })
    }

    /// Numeric parameter that must exist.
    pub fn require_f64(&self, name: &str) -> Result<f64, ParameterError> {
        let v = self.require(name)?;
        v.as_f64().ok_or_else(|| wrong_type(name, "float", v))
    }

    /// Text parameter that must exist.
    pub fn require_str(&self, name: &str) -> Result<&str, ParameterError> {
        let v = self.require(name)?;
        v.as_str().ok_or_else(|| wrong_type(name, "text", v))
    }

    /// Series parameter that must exist.
    pub fn require_series(&self, name: &str) -> Result<&[f64], ParameterError> {
        let v = self.require(name)?;
        v.as_series().ok_or_else(|| wrong_type(name, "series", v))
    }

    /// Number of distinct parameter names across all layers.
    pub fn len(&self) -> usize {
        self.layers()
            .flat_map(|layer| layer.keys())
            .collect::<IndexSet<_>>()
            .len()
    }

    /// Whether no parameters are present.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn active_crop_values(&self) -> Option<&IndexMap<String, Value>> {
        self.active_crop.map(|idx| &self.crops[idx].values)
    }

    fn layers(&self) -> impl Iterator<Item = &IndexMap<String, Value>> {
        [&self.overrides, &self.site, &self.timer, &self.soil]
            .into_iter()
            .chain(self.active_crop_values())
            .chain(std::iter::once(&self.derived))
    }

    fn sources(&self) -> impl Iterator<Item = (ParameterSource, &IndexMap<String, Value>)> {
        [
            (ParameterSource::Site, &self.site),
            (ParameterSource::Timer, &self.timer),
            (ParameterSource::Soil, &self.soil),
        ]
        .into_iter()
        .chain(self.active_crop_values().map(|m| (ParameterSource::Crop, m)))
    }

    fn check_unique(&self, name: &str, source: ParameterSource) -> Result<(), ParameterError> {
        match self
            .sources()
            .find(|(s, map)| *s != source && map.contains_key(name))
        {
            Some((first, _)) => Err(ParameterError::Duplicate {
                name: name.to_owned(),
                first: first.as_str(),
                second: source.as_str(),
            }),
            None => Ok(()),
        }
    }

    fn check_active_crop(&self) -> Result<(), ParameterError> {
        let Some(values) = self.active_crop_values() else {
            return Ok(());
        };
        for name in values.keys() {
            self.check_unique(name, ParameterSource::Crop)?;
        }
        Ok(())
    }
}

fn wrong_type(name: &str, expected: &'static str, found: &Value) -> ParameterError {
    ParameterError::WrongType {
        name: name.to_owned(),
        expected,
        found: found.type_name(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bundle() -> ParameterSet {
        ParameterSet::new()
            .with(ParameterSource::Site, [("WAV", 10.0)])
            .unwrap()
            .with(ParameterSource::Soil, [("SMFCF", 0.3), ("SM0", 0.4)])
            .unwrap()
            .with(ParameterSource::Crop, [("TSUM1", 800.0)])
            .unwrap()
    }

    #[test]
    fn lookup_across_layers() {
        let p = bundle();
        assert_eq!(p.require_f64("WAV").unwrap(), 10.0);
        assert_eq!(p.require_f64("TSUM1").unwrap(), 800.0);
        assert_eq!(p.len(), 4);
    }

    #[test]
    fn missing_parameter_is_named() {
        let p = bundle();
        let err = p.require_f64("TSUM2").unwrap_err();
        assert_eq!(err.to_string(), "value for parameter 'TSUM2' missing");
    }

    #[test]
    fn duplicate_across_sources_fails() {
        let mut p = bundle();
        let err = p.insert(ParameterSource::Site, "SM0", 0.5).unwrap_err();
        assert_eq!(
            err,
            ParameterError::Duplicate {
                name: "SM0".into(),
                first: "soil",
                second: "site"
            }
        );
    }

    #[test]
    fn override_takes_precedence_and_clears() {
        let mut p = bundle();
        p.set_override("TSUM1", 900.0, true).unwrap();
        assert_eq!(p.require_f64("TSUM1").unwrap(), 900.0);
        assert_eq!(p.override_count(), 1);
        p.clear_override(Some("TSUM1")).unwrap();
        assert_eq!(p.require_f64("TSUM1").unwrap(), 800.0);
        assert!(matches!(
            p.clear_override(Some("TSUM1")),
            Err(ParameterError::NotOverridden { .. })
        ));
    }

    #[test]
    fn checked_override_requires_existing_name() {
        let mut p = bundle();
        assert!(matches!(
            p.set_override("NOPE", 1.0, true),
            Err(ParameterError::UnknownOverride { .. })
        ));
        p.set_override("NOPE", 1.0, false).unwrap();
        assert!(p.contains("NOPE"));
    }

    #[test]
    fn active_crop_selects_variety_and_records_modes() {
        let mut p = ParameterSet::new();
        p.add_crop("wheat", "winter", [("TSUM1", 900.0)]).unwrap();
        p.add_crop("maize", "grain", [("TSUM1", 700.0)]).unwrap();
        assert_eq!(p.require_f64("TSUM1").unwrap(), 900.0);

        p.set_active_crop("maize", "grain", StartType::Sowing, EndType::Maturity)
            .unwrap();
        assert_eq!(p.require_f64("TSUM1").unwrap(), 700.0);
        assert_eq!(p.require_str("CROP_START_TYPE").unwrap(), "sowing");
        assert_eq!(p.require_str("CROP_END_TYPE").unwrap(), "maturity");

        assert!(matches!(
            p.set_active_crop("rice", "x", StartType::Sowing, EndType::Maturity),
            Err(ParameterError::UnknownCrop { .. })
        ));
    }

    #[test]
    fn wrong_type_is_reported() {
        let p = ParameterSet::new()
            .with(ParameterSource::Site, [("NAME", "plot 4")])
            .unwrap();
        assert!(matches!(
            p.require_f64("NAME"),
            Err(ParameterError::WrongType { expected: "float", found: "text", .. })
        ));
    }
}
