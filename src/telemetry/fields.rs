//! Cockpit telemetry items used by the display.

use crate::error::AppResult;
use crate::telemetry::{FieldKind, FieldRegistry};
use serde::{Deserialize, Serialize};

/// Source names of the telemetry items the display is built from.
///
/// The defaults match the names exposed by [`SimulatedSource`](super::SimulatedSource);
/// a binding to a real simulator maps its own identifiers onto them via configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CockpitFields {
    /// Heading in degrees (true)
    pub heading: String,
    /// Magnetic variation in degrees
    pub magnetic_variation: String,
    /// COM1 active frequency, raw integer
    pub com1_frequency: String,
    /// COM1 standby frequency, raw integer
    pub com1_standby: String,
    /// Nose gear position, 0..=16383
    pub gear_nose: String,
    /// Left gear position, 0..=16383
    pub gear_left: String,
    /// Right gear position, 0..=16383
    pub gear_right: String,
}

impl Default for CockpitFields {
    fn default() -> Self {
        Self {
            heading: "aircraft.heading".to_string(),
            magnetic_variation: "aircraft.magnetic_variation".to_string(),
            com1_frequency: "com1.frequency".to_string(),
            com1_standby: "com1.standby".to_string(),
            gear_nose: "gear.nose".to_string(),
            gear_left: "gear.left".to_string(),
            gear_right: "gear.right".to_string(),
        }
    }
}

impl CockpitFields {
    /// All names in display order of their consumers.
    pub fn all(&self) -> [&str; 7] {
        [
            &self.heading,
            &self.magnetic_variation,
            &self.com1_frequency,
            &self.com1_standby,
            &self.gear_nose,
            &self.gear_left,
            &self.gear_right,
        ]
    }

    /// Declare every cockpit item in `registry`.
    pub fn register_into(&self, registry: &mut FieldRegistry) -> AppResult<()> {
        registry.register_with_unit(&self.heading, FieldKind::Float32, "deg")?;
        registry.register_with_unit(&self.magnetic_variation, FieldKind::Float32, "deg")?;
        registry.register_with_unit(&self.com1_frequency, FieldKind::Int32, "Hz")?;
        registry.register_with_unit(&self.com1_standby, FieldKind::Int32, "Hz")?;
        registry.register(&self.gear_nose, FieldKind::Int32)?;
        registry.register(&self.gear_left, FieldKind::Int32)?;
        registry.register(&self.gear_right, FieldKind::Int32)?;
        Ok(())
    }

    /// Registry holding exactly the cockpit items.
    pub fn registry(&self) -> AppResult<FieldRegistry> {
        let mut registry = FieldRegistry::new();
        self.register_into(&mut registry)?;
        Ok(registry)
    }
}

/// Items read once after each connect and logged (simulator version, situation file).
pub fn default_identity_fields() -> Vec<String> {
    vec!["sim.version".to_string(), "sim.situation_file".to_string()]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_declares_all_seven_items() {
        let fields = CockpitFields::default();
        let registry = fields.registry().unwrap();
        assert_eq!(registry.len(), 7);
        assert_eq!(
            registry.get("com1.frequency").unwrap().kind(),
            FieldKind::Int32
        );
        assert_eq!(registry.get("aircraft.heading").unwrap().unit(), Some("deg"));
    }

    #[test]
    fn shared_name_with_conflicting_kind_is_rejected() {
        let fields = CockpitFields {
            gear_nose: "aircraft.heading".to_string(),
            ..CockpitFields::default()
        };
        assert!(fields.registry().is_err());
    }
}
