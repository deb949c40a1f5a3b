//! Output snapshots of registry variables.

use agrosim_core::{Day, Value};
use agrosim_kiosk::VariableKiosk;
use indexmap::IndexMap;
use serde::Serialize;

/// Values of the configured variables on one day.
///
/// A variable that is not registered or currently undefined (e.g. a crop
/// state outside the crop cycle) is recorded as `None`.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct OutputRecord {
    /// Simulated day of the snapshot.
    pub day: Day,
    /// Variable values in configuration order.
    pub values: IndexMap<String, Option<Value>>,
}

impl OutputRecord {
    /// Snapshot `names` from the registry.
    pub fn capture(day: Day, names: &[String], kiosk: &VariableKiosk) -> Self {
        let values = names
            .iter()
            .map(|name| (name.clone(), kiosk.try_get(name).cloned()))
            .collect();
        Self { day, values }
    }

    /// Numeric value of `name`, if recorded and defined.
    pub fn get_f64(&self, name: &str) -> Option<f64> {
        self.values.get(name)?.as_ref()?.as_f64()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agrosim_core::{ComponentId, EngineId, VarKind};

    #[test]
    fn undefined_and_unknown_are_none() {
        let mut kiosk = VariableKiosk::new(EngineId::next());
        let owner = ComponentId(0);
        kiosk.register("LAI", owner, VarKind::State).unwrap();
        kiosk.register("SM", owner, VarKind::State).unwrap();
        kiosk.publish(owner, "SM", 0.3).unwrap();

        let day = Day::from_ymd_opt(2020, 6, 1).unwrap();
        let names = vec!["SM".to_owned(), "LAI".to_owned(), "TAGP".to_owned()];
        let record = OutputRecord::capture(day, &names, &kiosk);

        assert_eq!(record.values.keys().collect::<Vec<_>>(), vec!["SM", "LAI", "TAGP"]);
        assert_eq!(record.get_f64("SM"), Some(0.3));
        assert_eq!(record.values["LAI"], None);
        assert_eq!(record.get_f64("TAGP"), None);
    }
}
