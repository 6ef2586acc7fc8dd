//! Configuration System using Figment
//!
//! Strongly-typed configuration for the bridge. Values are layered:
//! 1. Built-in defaults (every key has one)
//! 2. A TOML file, `config/bridge.toml` by default
//! 3. Environment variables prefixed with `COCKPIT_BRIDGE_`, `__` separating sections
//!
//! # Example
//! ```no_run
//! use cockpit_bridge::config::BridgeConfig;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! // COCKPIT_BRIDGE_SERIAL__PORT=COM7 overrides [serial] port
//! let config = BridgeConfig::load()?;
//! config.validate()?;
//! println!("Display on {}", config.serial.port);
//! # Ok(())
//! # }
//! ```

use crate::display::ChecksumMode;
use crate::display::transform::DEFAULT_FREQUENCY_DIVISOR;
use crate::error::{AppResult, BridgeError};
use crate::logging::OutputFormat;
use crate::sink::SerialSettings;
use crate::telemetry::fields::{default_identity_fields, CockpitFields};
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

/// Default configuration file location.
pub const DEFAULT_CONFIG_PATH: &str = "config/bridge.toml";

/// Environment variable prefix.
pub const ENV_PREFIX: &str = "COCKPIT_BRIDGE_";

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Application settings
    pub application: ApplicationConfig,
    /// Display transport settings
    pub serial: SerialSettings,
    /// Controller timing and recovery
    pub bridge: BridgeOptions,
    /// Frame rendering
    pub display: DisplayOptions,
    /// Telemetry item names
    pub fields: CockpitFields,
}

/// Application-level configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApplicationConfig {
    /// Application name
    pub name: String,
    /// Logging level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Log output format
    pub log_format: OutputFormat,
    /// Colored log output (ignored for JSON)
    pub log_ansi: bool,
}

impl Default for ApplicationConfig {
    fn default() -> Self {
        Self {
            name: "Cockpit Bridge".to_string(),
            log_level: "info".to_string(),
            log_format: OutputFormat::Compact,
            log_ansi: true,
        }
    }
}

/// What drives the tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TickDriver {
    /// Controller-owned interval timer
    #[default]
    Timer,
    /// The source's `ProcessTick` notifications
    Source,
}

/// Controller configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeOptions {
    /// Period between frames
    #[serde(with = "humantime_serde")]
    pub tick_interval: Duration,
    /// Share of the tick interval a sample may take, in (0, 1]
    pub sample_budget_ratio: f64,
    /// Consecutive write failures before the sink is closed and reopened
    pub write_failure_limit: u32,
    /// Delay between connection attempts while the simulator is unavailable
    #[serde(with = "humantime_serde")]
    pub reconnect_interval: Duration,
    /// Keep asking the source to connect while disconnected
    pub auto_connect: bool,
    /// Tick source
    pub tick_driver: TickDriver,
    /// Items read once after each connect and logged
    pub identity_fields: Vec<String>,
}

impl Default for BridgeOptions {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_millis(250),
            sample_budget_ratio: 0.8,
            write_failure_limit: 3,
            reconnect_interval: Duration::from_secs(5),
            auto_connect: true,
            tick_driver: TickDriver::Timer,
            identity_fields: default_identity_fields(),
        }
    }
}

/// Frame rendering configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayOptions {
    /// Raw frequency units per MHz
    pub frequency_divisor: f64,
    /// Optional trailing checksum
    pub checksum: ChecksumMode,
}

impl Default for DisplayOptions {
    fn default() -> Self {
        Self {
            frequency_divisor: DEFAULT_FREQUENCY_DIVISOR,
            checksum: ChecksumMode::None,
        }
    }
}

impl BridgeConfig {
    /// Load configuration from `config/bridge.toml` and environment variables
    ///
    /// Environment variables override the file with prefix `COCKPIT_BRIDGE_`.
    /// Example: `COCKPIT_BRIDGE_APPLICATION__LOG_LEVEL=debug`
    pub fn load() -> AppResult<Self> {
        Self::load_from(DEFAULT_CONFIG_PATH)
    }

    /// Load configuration from a specific file path
    ///
    /// A missing file is not an error; defaults and environment still apply.
    pub fn load_from<P: AsRef<Path>>(path: P) -> AppResult<Self> {
        Ok(Self::figment(path.as_ref()).extract()?)
    }

    fn figment(path: &Path) -> Figment {
        Figment::new()
            .merge(Serialized::defaults(BridgeConfig::default()))
            .merge(Toml::file(path))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    /// Validate configuration after loading
    pub fn validate(&self) -> AppResult<()> {
        let invalid = |msg: String| Err(BridgeError::Configuration(msg));

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.application.log_level.to_lowercase().as_str()) {
            return invalid(format!(
                "Invalid log_level '{}'. Must be one of: {}",
                self.application.log_level,
                valid_levels.join(", ")
            ));
        }

        if self.serial.port.trim().is_empty() {
            return invalid("serial.port must not be empty".to_string());
        }
        if self.serial.baud_rate == 0 {
            return invalid("serial.baud_rate must be positive".to_string());
        }
        if !(5..=8).contains(&self.serial.data_bits) {
            return invalid(format!(
                "Invalid serial.data_bits {}. Must be 5-8",
                self.serial.data_bits
            ));
        }
        if !(1..=2).contains(&self.serial.stop_bits) {
            return invalid(format!(
                "Invalid serial.stop_bits {}. Must be 1 or 2",
                self.serial.stop_bits
            ));
        }

        let bridge = &self.bridge;
        if bridge.tick_interval.is_zero() {
            return invalid("bridge.tick_interval must be non-zero".to_string());
        }
        if bridge.reconnect_interval.is_zero() {
            return invalid("bridge.reconnect_interval must be non-zero".to_string());
        }
        if !(bridge.sample_budget_ratio > 0.0 && bridge.sample_budget_ratio <= 1.0) {
            return invalid(format!(
                "Invalid bridge.sample_budget_ratio {}. Must be in (0, 1]",
                bridge.sample_budget_ratio
            ));
        }
        if bridge.write_failure_limit == 0 {
            return invalid("bridge.write_failure_limit must be at least 1".to_string());
        }

        if !(self.display.frequency_divisor.is_finite() && self.display.frequency_divisor > 0.0) {
            return invalid(format!(
                "Invalid display.frequency_divisor {}. Must be positive",
                self.display.frequency_divisor
            ));
        }

        let mut names = HashSet::new();
        for name in self.fields.all() {
            if name.trim().is_empty() {
                return invalid("Telemetry field names must not be empty".to_string());
            }
            if !names.insert(name) {
                return invalid(format!("Duplicate telemetry field name: {name}"));
            }
        }

        Ok(())
    }

    /// Render as TOML, e.g. for `check-config`.
    pub fn to_toml(&self) -> AppResult<String> {
        toml::to_string_pretty(self).map_err(|e| BridgeError::Configuration(e.to_string()))
    }
}
