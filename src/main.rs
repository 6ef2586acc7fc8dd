//! CLI Entry Point for cockpit-bridge
//!
//! Provides command-line interface for:
//! - Running the bridge (simulated flight to a serial display, or a dry run)
//! - Rendering a single frame from values given on the command line
//! - Listing serial ports and checking configuration
//!
//! # Usage
//!
//! Drive the display on COM5:
//! ```bash
//! cockpit-bridge run --port COM5
//! ```
//!
//! See what would be sent:
//! ```bash
//! cockpit-bridge frame --heading 50 --mag-var 5 --com1 118000000 --standby 121500000 \
//!     --nose 0 --left 16383 --right 8192
//! ```

// Global allocator (Microsoft Rust Guidelines: M-MIMALLOC-APPS)
#[cfg(not(test))]
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

use anyhow::Result;
use chrono::Utc;
use clap::{Parser, Subcommand};
use cockpit_bridge::config::{BridgeConfig, DEFAULT_CONFIG_PATH};
use cockpit_bridge::display::{FrameEncoder, Transformer};
use cockpit_bridge::logging;
use cockpit_bridge::sink::{ByteSink, LogSink};
use cockpit_bridge::telemetry::{SimulatedSource, Snapshot, TelemetryValue};
use cockpit_bridge::BridgeController;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;

#[derive(Parser)]
#[command(name = "cockpit-bridge")]
#[command(about = "Flight-simulator telemetry to a serial cockpit display", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the bridge against the simulated flight until Ctrl+C
    Run {
        /// Configuration file
        #[arg(long)]
        config: Option<PathBuf>,

        /// Serial port, overrides [serial] port
        #[arg(long)]
        port: Option<String>,

        /// Log frames instead of opening the serial port
        #[arg(long)]
        dry_run: bool,
    },

    /// Render one frame from raw telemetry values
    Frame {
        /// Configuration file (field names, frequency divisor, checksum)
        #[arg(long)]
        config: Option<PathBuf>,

        /// True heading in degrees
        #[arg(long, allow_hyphen_values = true)]
        heading: f32,

        /// Magnetic variation in degrees (east positive)
        #[arg(long, allow_hyphen_values = true)]
        mag_var: f32,

        /// COM1 active frequency, raw units
        #[arg(long)]
        com1: i32,

        /// COM1 standby frequency, raw units
        #[arg(long)]
        standby: i32,

        /// Nose gear position (0 = down, 16383 = up)
        #[arg(long)]
        nose: i32,

        /// Left gear position
        #[arg(long)]
        left: i32,

        /// Right gear position
        #[arg(long)]
        right: i32,
    },

    /// List serial ports
    ListPorts,

    /// Load, validate and print the configuration
    CheckConfig {
        /// Configuration file
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            config,
            port,
            dry_run,
        } => run_bridge(config, port, dry_run).await,
        Commands::Frame {
            config,
            heading,
            mag_var,
            com1,
            standby,
            nose,
            left,
            right,
        } => {
            let config = load_config(config)?;
            let values = [heading, mag_var]
                .map(TelemetryValue::Float32)
                .into_iter()
                .chain([com1, standby, nose, left, right].map(TelemetryValue::Int32));
            render_frame(&config, values)
        }
        Commands::ListPorts => list_ports(),
        Commands::CheckConfig { config } => {
            let config = load_config(config)?;
            config.validate()?;
            println!("✅ Configuration valid");
            println!();
            print!("{}", config.to_toml()?);
            Ok(())
        }
    }
}

fn load_config(path: Option<PathBuf>) -> Result<BridgeConfig> {
    let path = path.unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH));
    Ok(BridgeConfig::load_from(path)?)
}

async fn run_bridge(config_path: Option<PathBuf>, port: Option<String>, dry_run: bool) -> Result<()> {
    let mut config = load_config(config_path)?;
    if let Some(port) = port {
        config.serial.port = port;
    }
    config.validate()?;
    logging::init_from_config(&config)?;

    println!("🛫 {}", config.application.name);
    let source = Arc::new(SimulatedSource::new(
        config.fields.clone(),
        config.bridge.tick_interval,
    ));
    let sink: Box<dyn ByteSink> = if dry_run {
        println!("📝 Dry run: frames go to the log");
        Box::new(LogSink::new())
    } else {
        println!("🔌 Display on {} @ {} baud", config.serial.port, config.serial.baud_rate);
        serial_sink(&config)?
    };

    let handle = BridgeController::new(&config, source, sink)?.start();
    println!("📡 Bridge running, press Ctrl+C to stop");

    signal::ctrl_c().await?;
    println!("\n🛑 Shutdown signal received, cleaning up...");

    let status = handle.stop().await?;
    println!("{}", serde_json::to_string_pretty(&status)?);
    Ok(())
}

#[cfg(feature = "serial")]
fn serial_sink(config: &BridgeConfig) -> Result<Box<dyn ByteSink>> {
    Ok(Box::new(cockpit_bridge::sink::SerialSink::new(
        config.serial.clone(),
    )))
}

#[cfg(not(feature = "serial"))]
fn serial_sink(_config: &BridgeConfig) -> Result<Box<dyn ByteSink>> {
    Err(cockpit_bridge::BridgeError::SerialFeatureDisabled.into())
}

/// Values arrive in `CockpitFields::all()` order.
fn render_frame(config: &BridgeConfig, values: impl Iterator<Item = TelemetryValue>) -> Result<()> {
    let names = config.fields.all();
    let snapshot = Snapshot::from_values(Utc::now(), names.into_iter().zip(values));

    let frame = Transformer::new(config.fields.clone())
        .with_frequency_divisor(config.display.frequency_divisor)
        .render(&snapshot)?;
    let bytes = FrameEncoder::with_checksum(config.display.checksum).encode(&frame);

    println!("{}", String::from_utf8_lossy(&bytes));
    Ok(())
}

#[cfg(feature = "serial")]
fn list_ports() -> Result<()> {
    use tokio_serial::SerialPortType;

    let ports = tokio_serial::available_ports()?;
    if ports.is_empty() {
        println!("No serial ports found");
        return Ok(());
    }
    for port in ports {
        match port.port_type {
            SerialPortType::UsbPort(usb) => println!(
                "  {} (USB {:04x}:{:04x} {})",
                port.port_name,
                usb.vid,
                usb.pid,
                usb.product.unwrap_or_default()
            ),
            _ => println!("  {}", port.port_name),
        }
    }
    Ok(())
}

#[cfg(not(feature = "serial"))]
fn list_ports() -> Result<()> {
    Err(cockpit_bridge::BridgeError::SerialFeatureDisabled.into())
}
