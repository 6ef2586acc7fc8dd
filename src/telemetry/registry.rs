//! Field Registry
//!
//! Declares the telemetry items the bridge needs and keeps the latest sampled value of
//! each. One uniform keyed container replaces a dedicated variable per telemetry item.
//!
//! Sampling reads every registered field, commits the resolved values with one shared
//! timestamp and hands out an immutable [`Snapshot`]. A field that cannot be committed
//! (unresolvable name, value of the wrong kind, failed read) does not abort the pass:
//! all of them are reported together in a single [`IncompleteSample`] that still
//! carries the partial snapshot.

use crate::error::{AppResult, BridgeError};
use crate::telemetry::{FieldKind, TelemetrySource, TelemetryValue};
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use tracing::{debug, warn};

/// A declared telemetry item and its latest sampled value.
#[derive(Debug, Clone)]
pub struct Field {
    name: String,
    kind: FieldKind,
    unit: Option<String>,
    latest: Option<TelemetryValue>,
    last_sampled_at: Option<DateTime<Utc>>,
}

impl Field {
    /// Field name as understood by the telemetry source.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declared storage kind.
    pub fn kind(&self) -> FieldKind {
        self.kind
    }

    /// Physical unit, if declared (e.g. "deg", "Hz").
    pub fn unit(&self) -> Option<&str> {
        self.unit.as_deref()
    }

    /// Latest sampled value, if any sample resolved this field yet.
    pub fn latest(&self) -> Option<&TelemetryValue> {
        self.latest.as_ref()
    }

    /// Time of the sample that produced `latest`.
    pub fn last_sampled_at(&self) -> Option<DateTime<Utc>> {
        self.last_sampled_at
    }
}

/// Immutable copy of field values taken during one sample.
///
/// Snapshots live for one tick only; the controller drops them once the frame for
/// that tick has been rendered.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    taken_at: DateTime<Utc>,
    values: BTreeMap<String, TelemetryValue>,
}

impl Snapshot {
    /// Create a snapshot from explicit values.
    pub fn from_values<I, S>(taken_at: DateTime<Utc>, values: I) -> Self
    where
        I: IntoIterator<Item = (S, TelemetryValue)>,
        S: Into<String>,
    {
        Self {
            taken_at,
            values: values.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }

    /// When the values were read.
    pub fn taken_at(&self) -> DateTime<Utc> {
        self.taken_at
    }

    /// Value of a field, if present.
    pub fn get(&self, name: &str) -> Option<&TelemetryValue> {
        self.values.get(name)
    }

    /// Numeric value of a field.
    pub fn number(&self, name: &str) -> AppResult<f64> {
        self.require(name)?
            .as_f64()
            .ok_or_else(|| BridgeError::FieldType {
                name: name.to_string(),
                expected: "numeric",
            })
    }

    /// Integer value of a field.
    pub fn integer(&self, name: &str) -> AppResult<i64> {
        self.require(name)?
            .as_i64()
            .ok_or_else(|| BridgeError::FieldType {
                name: name.to_string(),
                expected: "integer",
            })
    }

    /// Number of values in the snapshot.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether the snapshot holds no values.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Iterate over `(name, value)` pairs in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &TelemetryValue)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }

    fn require(&self, name: &str) -> AppResult<&TelemetryValue> {
        self.values
            .get(name)
            .ok_or_else(|| BridgeError::MissingField(vec![name.to_string()]))
    }
}

/// A sampled value whose kind differs from the field's declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KindMismatch {
    /// Field name
    pub name: String,
    /// Kind the field was registered with
    pub declared: FieldKind,
    /// Kind the source returned
    pub received: FieldKind,
}

/// Consolidated report of the fields a sample could not commit.
#[derive(Debug, Clone)]
pub struct IncompleteSample {
    /// Names the source could not resolve, in registration order
    pub missing: Vec<String>,
    /// Values of the wrong kind; `latest` is left untouched for these fields
    pub mismatched: Vec<KindMismatch>,
    /// Reads that failed for another reason, with the cause
    pub failed: Vec<(String, String)>,
    /// Values of the fields that did resolve
    pub partial: Snapshot,
}

impl IncompleteSample {
    /// Number of fields that were not committed.
    pub fn len(&self) -> usize {
        self.missing.len() + self.mismatched.len() + self.failed.len()
    }

    /// Whether every field was committed.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Display for IncompleteSample {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = Vec::new();
        if !self.missing.is_empty() {
            parts.push(format!("unresolved: {}", self.missing.join(", ")));
        }
        for m in &self.mismatched {
            parts.push(format!(
                "wrong kind: {} (declared {}, got {})",
                m.name, m.declared, m.received
            ));
        }
        for (name, cause) in &self.failed {
            parts.push(format!("read failed: {name} ({cause})"));
        }
        write!(f, "{} telemetry field(s) not sampled; {}", self.len(), parts.join("; "))
    }
}

impl std::error::Error for IncompleteSample {}

impl From<IncompleteSample> for BridgeError {
    fn from(value: IncompleteSample) -> Self {
        if value.mismatched.is_empty() && value.failed.is_empty() {
            BridgeError::MissingField(value.missing)
        } else {
            BridgeError::SampleIncomplete(value.to_string())
        }
    }
}

/// Keyed container of declared telemetry fields.
#[derive(Debug, Clone, Default)]
pub struct FieldRegistry {
    fields: Vec<Field>,
    index: HashMap<String, usize>,
}

impl FieldRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a field.
    ///
    /// Registering the same name with the same kind again is a no-op. Registering it
    /// with a different kind fails with `DuplicateField`.
    pub fn register(&mut self, name: impl Into<String>, kind: FieldKind) -> AppResult<()> {
        self.insert(name.into(), kind, None)
    }

    /// Declare a field with a physical unit.
    pub fn register_with_unit(
        &mut self,
        name: impl Into<String>,
        kind: FieldKind,
        unit: impl Into<String>,
    ) -> AppResult<()> {
        self.insert(name.into(), kind, Some(unit.into()))
    }

    fn insert(&mut self, name: String, kind: FieldKind, unit: Option<String>) -> AppResult<()> {
        if let Some(&idx) = self.index.get(&name) {
            let existing = &mut self.fields[idx];
            if existing.kind != kind {
                return Err(BridgeError::DuplicateField {
                    name,
                    registered: existing.kind,
                    requested: kind,
                });
            }
            if existing.unit.is_none() {
                existing.unit = unit;
            }
            return Ok(());
        }

        self.index.insert(name.clone(), self.fields.len());
        self.fields.push(Field {
            name,
            kind,
            unit,
            latest: None,
            last_sampled_at: None,
        });
        Ok(())
    }

    /// Look up a declared field.
    pub fn get(&self, name: &str) -> Option<&Field> {
        self.index.get(name).map(|&idx| &self.fields[idx])
    }

    /// Declared field names in registration order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|f| f.name.as_str())
    }

    /// Number of declared fields.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Whether no field has been declared.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Read every declared field from `source`.
    ///
    /// All reads are issued together and committed with one timestamp. On success the
    /// snapshot holds exactly one value per declared field. Only values of the
    /// declared kind are committed.
    pub async fn sample(&mut self, source: &dyn TelemetrySource) -> Result<Snapshot, IncompleteSample> {
        let reads = self.fields.iter().map(|f| source.read_value(&f.name));
        let results = futures::future::join_all(reads).await;
        let taken_at = Utc::now();

        let mut values = BTreeMap::new();
        let mut missing = Vec::new();
        let mut mismatched = Vec::new();
        let mut failed = Vec::new();
        for (field, result) in self.fields.iter_mut().zip(results) {
            match result {
                Ok(value) if value.kind() == field.kind => {
                    field.latest = Some(value.clone());
                    field.last_sampled_at = Some(taken_at);
                    values.insert(field.name.clone(), value);
                }
                Ok(value) => {
                    warn!(
                        field = %field.name,
                        declared = %field.kind,
                        received = %value.kind(),
                        "Telemetry value has the wrong kind"
                    );
                    mismatched.push(KindMismatch {
                        name: field.name.clone(),
                        declared: field.kind,
                        received: value.kind(),
                    });
                }
                Err(BridgeError::MissingField(_)) => {
                    debug!(field = %field.name, "Telemetry name not resolvable");
                    missing.push(field.name.clone());
                }
                Err(err) => {
                    warn!(field = %field.name, error = %err, "Telemetry read failed");
                    failed.push((field.name.clone(), err.to_string()));
                }
            }
        }

        let report = IncompleteSample {
            missing,
            mismatched,
            failed,
            partial: Snapshot { taken_at, values },
        };
        if report.is_empty() {
            Ok(report.partial)
        } else {
            Err(report)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telemetry::MockTelemetrySource;

    #[test]
    fn register_is_idempotent() {
        let mut registry = FieldRegistry::new();
        registry.register("heading", FieldKind::Float32).unwrap();
        registry.register("heading", FieldKind::Float32).unwrap();
        registry.register("gear.nose", FieldKind::Int32).unwrap();
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.names().collect::<Vec<_>>(), vec!["heading", "gear.nose"]);
    }

    #[test]
    fn register_rejects_kind_change() {
        let mut registry = FieldRegistry::new();
        registry.register("gear.nose", FieldKind::Int32).unwrap();
        let err = registry.register("gear.nose", FieldKind::Float32).unwrap_err();
        assert!(matches!(
            err,
            BridgeError::DuplicateField {
                registered: FieldKind::Int32,
                requested: FieldKind::Float32,
                ..
            }
        ));
    }

    #[test]
    fn later_registration_can_add_unit() {
        let mut registry = FieldRegistry::new();
        registry.register("heading", FieldKind::Float32).unwrap();
        registry
            .register_with_unit("heading", FieldKind::Float32, "deg")
            .unwrap();
        assert_eq!(registry.get("heading").unwrap().unit(), Some("deg"));
    }

    #[tokio::test]
    async fn sample_returns_one_value_per_field() {
        let source = MockTelemetrySource::new()
            .with_value("heading", TelemetryValue::Float32(90.0))
            .with_value("gear.nose", TelemetryValue::Int32(0))
            .with_value("unused", TelemetryValue::Int16(7));

        let mut registry = FieldRegistry::new();
        registry.register("heading", FieldKind::Float32).unwrap();
        registry.register("gear.nose", FieldKind::Int32).unwrap();

        let snapshot = registry.sample(&source).await.unwrap();
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot.number("heading").unwrap(), 90.0);
        assert_eq!(snapshot.integer("gear.nose").unwrap(), 0);

        let field = registry.get("heading").unwrap();
        assert_eq!(field.latest(), Some(&TelemetryValue::Float32(90.0)));
        assert_eq!(field.last_sampled_at(), Some(snapshot.taken_at()));
    }

    #[tokio::test]
    async fn sample_reports_all_missing_names_together() {
        let source = MockTelemetrySource::new().with_value("heading", TelemetryValue::Float32(10.0));

        let mut registry = FieldRegistry::new();
        registry.register("heading", FieldKind::Float32).unwrap();
        registry.register("com1.active", FieldKind::Int32).unwrap();
        registry.register("gear.left", FieldKind::Int32).unwrap();

        let report = registry.sample(&source).await.unwrap_err();
        assert_eq!(report.missing, vec!["com1.active", "gear.left"]);
        assert_eq!(report.partial.len(), 1);
        assert!(report.partial.get("heading").is_some());
        assert!(registry.get("com1.active").unwrap().latest().is_none());
        assert!(matches!(
            BridgeError::from(report),
            BridgeError::MissingField(names) if names == vec!["com1.active", "gear.left"]
        ));
    }

    #[tokio::test]
    async fn sample_rejects_values_of_the_wrong_kind() {
        let source = MockTelemetrySource::new().with_value("gear.nose", TelemetryValue::Int32(0));
        let mut registry = FieldRegistry::new();
        registry.register("gear.nose", FieldKind::Int32).unwrap();
        registry.register("heading", FieldKind::Float32).unwrap();
        source.set_value("heading", TelemetryValue::Float32(90.0));
        registry.sample(&source).await.unwrap();

        source.set_value("gear.nose", TelemetryValue::Text("down".into()));
        source.remove_value("heading");
        let report = registry.sample(&source).await.unwrap_err();
        assert_eq!(report.missing, vec!["heading"]);
        assert_eq!(
            report.mismatched,
            vec![KindMismatch {
                name: "gear.nose".into(),
                declared: FieldKind::Int32,
                received: FieldKind::Text,
            }]
        );
        assert!(report.partial.is_empty());

        let nose = registry.get("gear.nose").unwrap();
        assert_eq!(nose.latest(), Some(&TelemetryValue::Int32(0)));

        let message = BridgeError::from(report).to_string();
        assert!(message.contains("unresolved: heading"));
        assert!(message.contains("wrong kind: gear.nose (declared int32, got string)"));
    }

    #[tokio::test]
    async fn source_errors_keep_their_cause() {
        let sim = crate::telemetry::SimulatedSource::new(
            crate::telemetry::fields::CockpitFields::default(),
            std::time::Duration::from_millis(250),
        );
        let mut registry = FieldRegistry::new();
        registry.register("aircraft.heading", FieldKind::Float32).unwrap();

        let report = registry.sample(&sim).await.unwrap_err();
        assert!(report.missing.is_empty());
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].0, "aircraft.heading");
        assert!(report.failed[0].1.contains("simulator not connected"));
        assert!(matches!(
            BridgeError::from(report),
            BridgeError::SampleIncomplete(message) if message.contains("read failed: aircraft.heading")
        ));
    }

    #[test]
    fn snapshot_type_errors() {
        let snapshot = Snapshot::from_values(
            Utc::now(),
            [("sim.version", TelemetryValue::Text("FSX".into()))],
        );
        assert!(matches!(
            snapshot.number("sim.version"),
            Err(BridgeError::FieldType { .. })
        ));
        assert!(matches!(
            snapshot.integer("absent"),
            Err(BridgeError::MissingField(names)) if names == vec!["absent".to_string()]
        ));
    }
}
