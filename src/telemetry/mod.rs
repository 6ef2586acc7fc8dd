//! Telemetry Source Capability
//!
//! The bridge never talks to a simulator directly. It depends on the small
//! [`TelemetrySource`] capability defined here: named value reads plus a stream of
//! [`LinkEvent`] notifications for connect, disconnect, failures and processing ticks.
//!
//! # Design
//!
//! - Async (uses #[async_trait]) so a read can be bounded by a timeout
//! - Thread-safe (requires Send + Sync)
//! - Notifications are delivered over a `tokio::sync::broadcast` channel rather than
//!   registered callbacks, so the controller can serialize them with its own timer
//!
//! # Modules
//!
//! - `registry` - declared fields, latest values, consistent snapshots
//! - `sampler` - bounded per-tick sampling
//! - `fields` - names of the cockpit items the display needs
//! - `mock` - scriptable source for tests
//! - `simulated` - a slowly evolving flight used by the demo binary

pub mod fields;
pub mod mock;
pub mod registry;
pub mod sampler;
pub mod simulated;

pub use mock::MockTelemetrySource;
pub use registry::{Field, FieldRegistry, IncompleteSample, KindMismatch, Snapshot};
pub use sampler::Sampler;
pub use simulated::SimulatedSource;

use crate::error::AppResult;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::broadcast;

/// Storage type of a telemetry item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldKind {
    /// Signed 16-bit integer
    Int16,
    /// Signed 32-bit integer
    Int32,
    /// 32-bit float
    Float32,
    /// 64-bit float
    Float64,
    /// Text (simulator version, situation file, ...)
    Text,
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FieldKind::Int16 => "int16",
            FieldKind::Int32 => "int32",
            FieldKind::Float32 => "float32",
            FieldKind::Float64 => "float64",
            FieldKind::Text => "string",
        };
        f.write_str(name)
    }
}

/// A value read from the telemetry source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TelemetryValue {
    /// Signed 16-bit integer
    Int16(i16),
    /// Signed 32-bit integer
    Int32(i32),
    /// 32-bit float
    Float32(f32),
    /// 64-bit float
    Float64(f64),
    /// Text
    Text(String),
}

impl TelemetryValue {
    /// Kind tag of this value.
    pub fn kind(&self) -> FieldKind {
        match self {
            TelemetryValue::Int16(_) => FieldKind::Int16,
            TelemetryValue::Int32(_) => FieldKind::Int32,
            TelemetryValue::Float32(_) => FieldKind::Float32,
            TelemetryValue::Float64(_) => FieldKind::Float64,
            TelemetryValue::Text(_) => FieldKind::Text,
        }
    }

    /// Numeric view of the value; `None` for text.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            TelemetryValue::Int16(v) => Some(f64::from(*v)),
            TelemetryValue::Int32(v) => Some(f64::from(*v)),
            TelemetryValue::Float32(v) => Some(f64::from(*v)),
            TelemetryValue::Float64(v) => Some(*v),
            TelemetryValue::Text(_) => None,
        }
    }

    /// Integer view of the value; floats are not converted.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            TelemetryValue::Int16(v) => Some(i64::from(*v)),
            TelemetryValue::Int32(v) => Some(i64::from(*v)),
            _ => None,
        }
    }

    /// Text view of the value.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            TelemetryValue::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for TelemetryValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TelemetryValue::Int16(v) => write!(f, "{v}"),
            TelemetryValue::Int32(v) => write!(f, "{v}"),
            TelemetryValue::Float32(v) => write!(f, "{v}"),
            TelemetryValue::Float64(v) => write!(f, "{v}"),
            TelemetryValue::Text(s) => f.write_str(s),
        }
    }
}

/// Notification emitted by a telemetry source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkEvent {
    /// The simulator link is up and values can be read
    Connected,
    /// The simulator link went away
    Disconnected,
    /// The source finished one of its own processing passes
    ProcessTick,
    /// A source call failed; informational only
    Failure {
        /// Source-specific result code
        code: i32,
        /// Human-readable description
        message: String,
    },
}

/// Capability: Named Telemetry Reads
///
/// A provider of live named values (heading, radio frequencies, gear positions...)
/// together with a connect/disconnect notification stream.
///
/// # Contract
/// - `connect` starts (or retries) the link; success is announced with
///   [`LinkEvent::Connected`] on the event stream, not by the return value alone
/// - `read_value` returns `BridgeError::MissingField` for names it cannot resolve
/// - `read_value` may block; callers bound it with a timeout
#[async_trait]
pub trait TelemetrySource: Send + Sync {
    /// Try to establish the simulator link.
    async fn connect(&self) -> AppResult<()>;

    /// Tear down the simulator link.
    async fn disconnect(&self) -> AppResult<()>;

    /// Subscribe to link notifications.
    fn subscribe(&self) -> broadcast::Receiver<LinkEvent>;

    /// Read the current value of one named item.
    async fn read_value(&self, name: &str) -> AppResult<TelemetryValue>;

    /// Short description for logs.
    fn describe(&self) -> String {
        "telemetry source".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_views() {
        assert_eq!(TelemetryValue::Int16(-3).as_f64(), Some(-3.0));
        assert_eq!(TelemetryValue::Int32(16383).as_i64(), Some(16383));
        assert_eq!(TelemetryValue::Float32(1.5).as_i64(), None);
        assert_eq!(TelemetryValue::Text("P3D".into()).as_f64(), None);
        assert_eq!(TelemetryValue::Text("P3D".into()).as_text(), Some("P3D"));
    }

    #[test]
    fn kind_matches_variant() {
        assert_eq!(TelemetryValue::Float64(0.0).kind(), FieldKind::Float64);
        assert_eq!(TelemetryValue::Text(String::new()).kind(), FieldKind::Text);
        assert_eq!(FieldKind::Text.to_string(), "string");
    }
}
