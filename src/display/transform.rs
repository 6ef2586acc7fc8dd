//! Snapshot to display conversion.
//!
//! Pure and deterministic: the same snapshot and settings always give the same frame.
//!
//! - Heading: `round(heading - magnetic_variation)`, corrected by a single ±360 step
//!   (not a modulo), zero-padded on the left to three digits
//! - Frequencies: `raw / frequency_divisor`, truncated to three decimals
//! - Gear: `0` is `On`, `16383` is `Off`, anything else is `Moving`

use crate::display::frame::{DisplayFrame, GearState};
use crate::error::{AppResult, BridgeError};
use crate::telemetry::fields::CockpitFields;
use crate::telemetry::Snapshot;

/// Raw gear position of a leg that is down and locked.
pub const GEAR_EXTENDED: i64 = 0;

/// Raw gear position of a fully retracted leg.
pub const GEAR_RETRACTED: i64 = 16383;

/// Default divisor turning raw COM values (Hz) into MHz.
pub const DEFAULT_FREQUENCY_DIVISOR: f64 = 1_000_000.0;

/// Classify a raw gear position.
pub fn gear_state(position: i64) -> GearState {
    match position {
        GEAR_EXTENDED => GearState::On,
        GEAR_RETRACTED => GearState::Off,
        _ => GearState::Moving,
    }
}

/// Magnetic heading in whole degrees.
///
/// Rounds half up, then applies one wrap correction: values above 359 lose 360,
/// values below 0 gain 360. Inputs more than one turn out of range stay out of range.
pub fn magnetic_heading(heading_deg: f64, magnetic_variation_deg: f64) -> i64 {
    let mut heading = (heading_deg - magnetic_variation_deg + 0.5).floor() as i64;
    if heading > 359 {
        heading -= 360;
    } else if heading < 0 {
        heading += 360;
    }
    heading
}

/// Three-digit, left zero-padded heading text.
pub fn format_heading(heading: i64) -> String {
    format!("{heading:03}")
}

/// Frequency text with three decimals.
///
/// Digits below the third decimal are dropped, not rounded: a radio tuned to
/// 118.016667 MHz shows `118.016`.
pub fn format_frequency(raw: i64, divisor: f64) -> String {
    let thousandths = (raw as f64 * 1000.0 / divisor).floor();
    format!("{:.3}", thousandths / 1000.0)
}

/// Builds display frames from snapshots.
#[derive(Debug, Clone)]
pub struct Transformer {
    fields: CockpitFields,
    frequency_divisor: f64,
}

impl Transformer {
    /// Transformer reading the given field names with the default frequency scale.
    pub fn new(fields: CockpitFields) -> Self {
        Self {
            fields,
            frequency_divisor: DEFAULT_FREQUENCY_DIVISOR,
        }
    }

    /// Builder: set the divisor applied to raw COM values.
    pub fn with_frequency_divisor(mut self, divisor: f64) -> Self {
        self.frequency_divisor = divisor;
        self
    }

    /// Field names this transformer reads.
    pub fn fields(&self) -> &CockpitFields {
        &self.fields
    }

    /// Render one frame.
    ///
    /// # Errors
    /// `MissingField` naming every cockpit item absent from the snapshot, or
    /// `FieldType` when an item has the wrong kind.
    pub fn render(&self, snapshot: &Snapshot) -> AppResult<DisplayFrame> {
        let missing: Vec<String> = self
            .fields
            .all()
            .iter()
            .filter(|name| snapshot.get(name).is_none())
            .map(|name| name.to_string())
            .collect();
        if !missing.is_empty() {
            return Err(BridgeError::MissingField(missing));
        }

        let f = &self.fields;
        let heading = magnetic_heading(
            snapshot.number(&f.heading)?,
            snapshot.number(&f.magnetic_variation)?,
        );

        Ok(DisplayFrame {
            com1_frequency: format_frequency(
                snapshot.integer(&f.com1_frequency)?,
                self.frequency_divisor,
            ),
            com1_standby: format_frequency(
                snapshot.integer(&f.com1_standby)?,
                self.frequency_divisor,
            ),
            heading: format_heading(heading),
            nose_gear: gear_state(snapshot.integer(&f.gear_nose)?),
            left_gear: gear_state(snapshot.integer(&f.gear_left)?),
            right_gear: gear_state(snapshot.integer(&f.gear_right)?),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telemetry::TelemetryValue;
    use chrono::Utc;

    fn snapshot(heading: f32, mag_var: f32, nose: i32, left: i32, right: i32) -> Snapshot {
        let f = CockpitFields::default();
        Snapshot::from_values(
            Utc::now(),
            [
                (f.heading, TelemetryValue::Float32(heading)),
                (f.magnetic_variation, TelemetryValue::Float32(mag_var)),
                (f.com1_frequency, TelemetryValue::Int32(118_000_000)),
                (f.com1_standby, TelemetryValue::Int32(121_500_000)),
                (f.gear_nose, TelemetryValue::Int32(nose)),
                (f.gear_left, TelemetryValue::Int32(left)),
                (f.gear_right, TelemetryValue::Int32(right)),
            ],
        )
    }

    #[test]
    fn heading_wraps_exactly_once() {
        for h in 0..719 {
            let expected = if h < 360 { h } else { h - 360 };
            assert_eq!(magnetic_heading(h as f64, 0.0), expected, "heading {h}");
            assert_eq!(
                format_heading(magnetic_heading(h as f64, 0.0)),
                format!("{expected:03}")
            );
        }
        // A second turn is deliberately not folded back.
        assert_eq!(magnetic_heading(725.0, 0.0), 365);
    }

    #[test]
    fn heading_rounds_half_up_and_pads_left() {
        assert_eq!(magnetic_heading(50.0, 5.0), 45);
        assert_eq!(magnetic_heading(6.5, 0.0), 7);
        assert_eq!(magnetic_heading(359.6, 0.0), 0);
        assert_eq!(format_heading(7), "007");
        assert_eq!(format_heading(45), "045");
        assert_eq!(format_heading(123), "123");
    }

    #[test]
    fn negative_heading_gains_one_turn() {
        assert_eq!(magnetic_heading(2.0, 5.0), 357);
        assert_eq!(magnetic_heading(0.0, 15.5), 345);
    }

    #[test]
    fn gear_classification_is_total() {
        for v in GEAR_EXTENDED..=GEAR_RETRACTED {
            let state = gear_state(v);
            let expected = match v {
                0 => GearState::On,
                16383 => GearState::Off,
                _ => GearState::Moving,
            };
            assert_eq!(state, expected);
            assert_eq!(gear_state(v), state);
        }
    }

    #[test]
    fn frequency_scale_is_configurable() {
        assert_eq!(format_frequency(118_000_000, DEFAULT_FREQUENCY_DIVISOR), "118.000");
        assert_eq!(format_frequency(121_500_000, DEFAULT_FREQUENCY_DIVISOR), "121.500");
        assert_eq!(format_frequency(118_008_333, DEFAULT_FREQUENCY_DIVISOR), "118.008");
        assert_eq!(format_frequency(118_016_667, DEFAULT_FREQUENCY_DIVISOR), "118.016");
        assert_eq!(format_frequency(118_999_999, DEFAULT_FREQUENCY_DIVISOR), "118.999");
        assert_eq!(format_frequency(119_025_000, DEFAULT_FREQUENCY_DIVISOR), "119.025");
        assert_eq!(format_frequency(118_250, 1_000.0), "118.250");
    }

    #[test]
    fn renders_reference_frame() {
        let transformer = Transformer::new(CockpitFields::default());
        let frame = transformer.render(&snapshot(50.0, 5.0, 0, 16383, 8192)).unwrap();
        assert_eq!(frame.com1_frequency, "118.000");
        assert_eq!(frame.com1_standby, "121.500");
        assert_eq!(frame.heading, "045");
        assert_eq!(frame.nose_gear, GearState::On);
        assert_eq!(frame.left_gear, GearState::Off);
        assert_eq!(frame.right_gear, GearState::Moving);
    }

    #[test]
    fn render_names_all_absent_items() {
        let f = CockpitFields::default();
        let partial = Snapshot::from_values(
            Utc::now(),
            [(f.heading.clone(), TelemetryValue::Float32(1.0))],
        );
        match Transformer::new(f).render(&partial) {
            Err(BridgeError::MissingField(names)) => assert_eq!(names.len(), 6),
            other => panic!("unexpected result: {:?}", other),
        }
    }
}
