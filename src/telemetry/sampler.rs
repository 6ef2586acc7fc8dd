//! Per-tick sampling with a time budget.
//!
//! A source read may block. The sampler bounds each pass with `tokio::time::timeout`
//! so a stalled source turns into a failed tick instead of starving the ticks behind it.

use crate::error::{AppResult, BridgeError};
use crate::telemetry::{FieldRegistry, Snapshot, TelemetrySource, TelemetryValue};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Takes one snapshot per tick within a fixed budget.
#[derive(Debug, Clone, Copy)]
pub struct Sampler {
    budget: Duration,
}

impl Sampler {
    /// Create a sampler whose reads must finish within `budget`.
    pub fn new(budget: Duration) -> Self {
        Self { budget }
    }

    /// Budget derived from the tick interval, e.g. 80% of 250 ms.
    pub fn for_interval(tick_interval: Duration, ratio: f64) -> Self {
        let nanos = (tick_interval.as_nanos() as f64 * ratio).round() as u64;
        Self::new(Duration::from_nanos(nanos))
    }

    /// Time allowed for one sample.
    pub fn budget(&self) -> Duration {
        self.budget
    }

    /// Sample every registered field.
    ///
    /// # Errors
    /// - `SampleTimeout` when the source does not answer within the budget
    /// - `MissingField` naming every unresolvable field of the pass
    /// - `SampleIncomplete` when values had the wrong kind or reads failed outright
    pub async fn tick(
        &self,
        source: &dyn TelemetrySource,
        registry: &mut FieldRegistry,
    ) -> AppResult<Snapshot> {
        match tokio::time::timeout(self.budget, registry.sample(source)).await {
            Ok(Ok(snapshot)) => Ok(snapshot),
            Ok(Err(report)) => {
                debug!(resolved = report.partial.len(), "Sample incomplete: {report}");
                Err(report.into())
            }
            Err(_) => Err(BridgeError::SampleTimeout(self.budget)),
        }
    }

    /// One-shot reads, used after a connect to log simulator identity.
    ///
    /// Failures are logged and skipped.
    pub async fn read_once(
        &self,
        source: &dyn TelemetrySource,
        names: &[String],
    ) -> Vec<(String, TelemetryValue)> {
        let mut values = Vec::with_capacity(names.len());
        for name in names {
            match tokio::time::timeout(self.budget, source.read_value(name)).await {
                Ok(Ok(value)) => {
                    info!(field = %name, value = %value, "Simulator info");
                    values.push((name.clone(), value));
                }
                Ok(Err(e)) => warn!(field = %name, error = %e, "One-time read failed"),
                Err(_) => warn!(field = %name, "One-time read timed out"),
            }
        }
        values
    }
}
