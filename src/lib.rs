//! # Cockpit Bridge
//!
//! Polls flight-simulator telemetry at a fixed rate, turns it into the values a
//! home-built cockpit display shows (COM1 active/standby, magnetic heading, three
//! landing gear indicators) and writes them as `#`-delimited ASCII frames to a
//! serial-attached board.
//!
//! ## Crate Structure
//!
//! - **`telemetry`**: The `TelemetrySource` capability, the field registry with
//!   consistent snapshots, the budgeted sampler, plus mock and simulated sources.
//! - **`display`**: Pure transformation from snapshots to `DisplayFrame`s and the
//!   wire encoder.
//! - **`sink`**: The `ByteSink` capability with serial, logging and mock sinks.
//! - **`bridge`**: The controller state machine driving source, transform and sink
//!   from one tokio task.
//! - **`config`**: Figment-based configuration (TOML + environment).
//! - **`logging`**: `tracing-subscriber` setup.
//! - **`error`**: The crate-wide `BridgeError` and `AppResult` alias.

pub mod bridge;
pub mod config;
pub mod display;
pub mod error;
pub mod logging;
pub mod sink;
pub mod telemetry;

pub use bridge::{BridgeController, BridgeHandle, BridgeState, BridgeStatus};
pub use config::BridgeConfig;
pub use error::{AppResult, BridgeError};
