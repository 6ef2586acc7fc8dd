//! Display Sinks
//!
//! The bridge hands encoded frames to a [`ByteSink`]: a configure/open/close/write
//! abstraction over the serial line to the display (or anything that behaves like one).
//!
//! # Available Sinks
//!
//! - `SerialSink` - tokio-serial port (feature `serial`)
//! - `LogSink` - writes frames to the log instead of a port (dry runs)
//! - `MockByteSink` - records every call, with write/open failure injection

pub mod log_sink;
pub mod mock;
#[cfg(feature = "serial")]
pub mod serial;

pub use log_sink::LogSink;
pub use mock::{MockByteSink, SinkCall};
#[cfg(feature = "serial")]
pub use serial::SerialSink;

use crate::error::AppResult;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Parity setting of the serial line.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Parity {
    /// No parity bit
    #[default]
    None,
    /// Odd parity
    Odd,
    /// Even parity
    Even,
}

/// Transport parameters of the display link.
///
/// Defaults are the usual Arduino settings: 9600 baud, 8N1, blocking writes, and a
/// four second pause after opening while the board resets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SerialSettings {
    /// Port path (e.g. "COM5", "/dev/ttyACM0")
    pub port: String,
    /// Line speed
    pub baud_rate: u32,
    /// Data bits per character (5-8)
    pub data_bits: u8,
    /// Stop bits (1 or 2)
    pub stop_bits: u8,
    /// Parity
    pub parity: Parity,
    /// Grace period after opening before the first frame
    #[serde(with = "humantime_serde")]
    pub settle: Duration,
    /// Upper bound for one write; `None` blocks until the bytes are accepted
    #[serde(with = "humantime_serde")]
    pub write_timeout: Option<Duration>,
}

impl Default for SerialSettings {
    fn default() -> Self {
        Self {
            port: default_port(),
            baud_rate: 9600,
            data_bits: 8,
            stop_bits: 1,
            parity: Parity::None,
            settle: Duration::from_secs(4),
            write_timeout: None,
        }
    }
}

#[cfg(windows)]
fn default_port() -> String {
    "COM5".to_string()
}

#[cfg(not(windows))]
fn default_port() -> String {
    "/dev/ttyACM0".to_string()
}

/// Capability: Byte Output
///
/// The controller owns its sink exclusively and never issues overlapping writes.
///
/// # Contract
/// - `configure` only records parameters; they apply on the next `open`
/// - `open` fails with `SinkOpenFailure`; opening an open sink is a no-op
/// - `write` fails with `SinkNotOpen` before `open` and `SinkWriteFailure` on I/O errors
/// - `close` on a closed sink is a no-op
#[async_trait]
pub trait ByteSink: Send {
    /// Set transport parameters for the next `open`.
    fn configure(&mut self, settings: &SerialSettings);

    /// Open the transport.
    async fn open(&mut self) -> AppResult<()>;

    /// Close the transport.
    async fn close(&mut self) -> AppResult<()>;

    /// Write a whole frame.
    async fn write(&mut self, bytes: &[u8]) -> AppResult<()>;

    /// Whether the transport is open.
    fn is_open(&self) -> bool;

    /// Short description for logs, e.g. "serial COM5 @ 9600".
    fn describe(&self) -> String;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_arduino_8n1() {
        let settings = SerialSettings::default();
        assert_eq!(settings.baud_rate, 9600);
        assert_eq!(settings.data_bits, 8);
        assert_eq!(settings.stop_bits, 1);
        assert_eq!(settings.parity, Parity::None);
        assert_eq!(settings.settle, Duration::from_secs(4));
        assert!(settings.write_timeout.is_none());
    }

    #[test]
    fn settings_parse_humantime() {
        let settings: SerialSettings = toml::from_str(
            r#"
            port = "COM7"
            parity = "even"
            settle = "1500ms"
            write_timeout = "2s"
            "#,
        )
        .unwrap();
        assert_eq!(settings.port, "COM7");
        assert_eq!(settings.parity, Parity::Even);
        assert_eq!(settings.settle, Duration::from_millis(1500));
        assert_eq!(settings.write_timeout, Some(Duration::from_secs(2)));
        assert_eq!(settings.baud_rate, 9600);
    }
}
