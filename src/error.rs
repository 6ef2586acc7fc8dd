//! Custom error types for the bridge.
//!
//! This module defines the primary error type, `BridgeError`, for the whole crate.
//! Using the `thiserror` crate, it provides a centralized and consistent way to handle
//! the different failures that can occur while moving telemetry to the display, from
//! unresolvable telemetry names to a serial port that refuses to open.
//!
//! ## Error Hierarchy
//!
//! - **`MissingField`**: One or more registered telemetry names could not be resolved by
//!   the source during a sample. All missing names of a pass are reported together.
//! - **`SampleIncomplete`**: A sample returned values of the wrong kind or reads that
//!   failed for another reason; the message names each field and its cause.
//! - **`SampleTimeout`**: The source did not answer within the sample budget.
//! - **`SinkOpenFailure`**: The display transport could not be opened. The connection
//!   sequence is aborted and the bridge returns to idle.
//! - **`SinkWriteFailure`**: A frame could not be written. The frame is dropped; repeated
//!   failures make the controller recycle the sink.
//! - **`DuplicateField`** / **`FieldType`**: Registry misuse, e.g. registering a name twice
//!   with different kinds or reading a text field as a number.
//! - **`Config`** / **`Configuration`**: Parse errors from `figment` and semantic errors
//!   found by validation.
//!
//! Per-tick errors are never returned to a caller by the controller; it records them in
//! the bridge status and the structured log instead.

use crate::telemetry::FieldKind;
use std::time::Duration;
use thiserror::Error;

/// Convenience alias for results using the bridge error type.
pub type AppResult<T> = std::result::Result<T, BridgeError>;

/// Every failure the bridge can report.
#[derive(Error, Debug)]
pub enum BridgeError {
    /// The source could not resolve these names
    #[error("Telemetry field(s) not resolvable: {}", .0.join(", "))]
    MissingField(Vec<String>),

    /// A sample could not be committed for reasons other than unresolved names
    #[error("Telemetry sample incomplete: {0}")]
    SampleIncomplete(String),

    /// The source did not answer within the sample budget
    #[error("Telemetry sample timed out after {0:?}")]
    SampleTimeout(Duration),

    /// The display transport refused to open
    #[error("Failed to open display sink '{port}': {reason}")]
    SinkOpenFailure {
        /// Port or device name
        port: String,
        /// Driver message
        reason: String,
    },

    /// A frame could not be written
    #[error("Failed to write frame to display sink: {0}")]
    SinkWriteFailure(String),

    /// Write attempted on a closed sink
    #[error("Display sink is not open")]
    SinkNotOpen,

    /// A name was registered twice with different kinds
    #[error("Field '{name}' already registered as {registered:?}, cannot register as {requested:?}")]
    DuplicateField {
        /// Field name
        name: String,
        /// Kind of the existing registration
        registered: FieldKind,
        /// Kind of the rejected registration
        requested: FieldKind,
    },

    /// A snapshot value was read with the wrong accessor
    #[error("Field '{name}' does not hold a {expected} value")]
    FieldType {
        /// Field name
        name: String,
        /// What the caller asked for
        expected: &'static str,
    },

    /// The telemetry source failed
    #[error("Telemetry source error: {0}")]
    Source(String),

    /// Configuration could not be parsed
    #[error("Configuration error: {0}")]
    Config(#[from] Box<figment::Error>),

    /// Configuration parsed but is not usable
    #[error("Configuration validation error: {0}")]
    Configuration(String),

    /// Underlying I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serial output requested from a build without the `serial` feature
    #[error("Serial support not enabled. Rebuild with --features serial")]
    SerialFeatureDisabled,

    /// The bridge task panicked or was cancelled
    #[error("Bridge task failed: {0}")]
    Task(String),
}

impl From<figment::Error> for BridgeError {
    fn from(value: figment::Error) -> Self {
        BridgeError::Config(Box::new(value))
    }
}

impl BridgeError {
    /// Whether the error came from reading telemetry for a tick rather than from
    /// writing its frame.
    pub fn is_sample_failure(&self) -> bool {
        matches!(
            self,
            BridgeError::MissingField(_)
                | BridgeError::SampleIncomplete(_)
                | BridgeError::SampleTimeout(_)
                | BridgeError::FieldType { .. }
                | BridgeError::Source(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_field_lists_every_name() {
        let err = BridgeError::MissingField(vec!["com1.active".into(), "gear.nose".into()]);
        let message = err.to_string();
        assert!(message.contains("com1.active"));
        assert!(message.contains("gear.nose"));
    }

    #[test]
    fn open_failure_names_port() {
        let err = BridgeError::SinkOpenFailure {
            port: "COM5".into(),
            reason: "access denied".into(),
        };
        assert_eq!(
            err.to_string(),
            "Failed to open display sink 'COM5': access denied"
        );
        assert!(!err.is_sample_failure());
    }

    #[test]
    fn sample_failures_are_told_apart_from_write_failures() {
        assert!(BridgeError::SampleTimeout(Duration::from_millis(200)).is_sample_failure());
        assert!(BridgeError::SampleIncomplete("wrong kind".into()).is_sample_failure());
        assert!(!BridgeError::SinkWriteFailure("broken pipe".into()).is_sample_failure());
        assert!(!BridgeError::SinkNotOpen.is_sample_failure());
    }
}
