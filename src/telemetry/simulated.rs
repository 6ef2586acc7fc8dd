//! Simulated flight used by the demo binary.
//!
//! Produces a slow right-hand turn, a gear cycle and a rotating set of COM1
//! frequencies so a display can be exercised without a simulator running.
//! It exposes the default [`CockpitFields`](super::fields::CockpitFields) names plus the
//! `sim.version` / `sim.situation_file` identity items.

use crate::error::{AppResult, BridgeError};
use crate::telemetry::fields::CockpitFields;
use crate::telemetry::{LinkEvent, TelemetrySource, TelemetryValue};
use async_trait::async_trait;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::info;

/// Full travel of a gear leg in source units.
const GEAR_TRAVEL: f64 = 16383.0;

/// Frequencies (Hz) the simulated pilot tunes through.
const FREQUENCIES_HZ: [i32; 4] = [118_000_000, 121_500_000, 124_350_000, 119_025_000];

struct LinkState {
    connected_at: Option<Instant>,
    ticker: Option<JoinHandle<()>>,
}

/// Deterministic simulated telemetry source.
#[derive(Clone)]
pub struct SimulatedSource {
    fields: CockpitFields,
    events: broadcast::Sender<LinkEvent>,
    state: Arc<Mutex<LinkState>>,
    process_interval: Duration,
    turn_rate_deg_s: f64,
    magnetic_variation: f32,
    gear_cycle: Duration,
    tuning_period: Duration,
}

impl SimulatedSource {
    /// Create a simulated source for the given field names.
    ///
    /// `process_interval` is the cadence of its `ProcessTick` notifications.
    pub fn new(fields: CockpitFields, process_interval: Duration) -> Self {
        let (events, _) = broadcast::channel(64);
        Self {
            fields,
            events,
            state: Arc::new(Mutex::new(LinkState {
                connected_at: None,
                ticker: None,
            })),
            process_interval,
            turn_rate_deg_s: 3.0,
            magnetic_variation: -15.5,
            gear_cycle: Duration::from_secs(40),
            tuning_period: Duration::from_secs(15),
        }
    }

    /// Builder: set the magnetic variation reported by the source.
    pub fn with_magnetic_variation(mut self, degrees: f32) -> Self {
        self.magnetic_variation = degrees;
        self
    }

    fn elapsed(&self) -> AppResult<Duration> {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state
            .connected_at
            .map(|t| t.elapsed())
            .ok_or_else(|| BridgeError::Source("simulator not connected".to_string()))
    }

    fn heading(&self, t: f64) -> f32 {
        ((90.0 + self.turn_rate_deg_s * t) % 360.0) as f32
    }

    /// Gear leg position: down for the first quarter of the cycle, travelling up,
    /// up for a quarter, travelling down.
    fn gear_position(&self, t: f64, lag: f64) -> i32 {
        let cycle = self.gear_cycle.as_secs_f64();
        let phase = ((t + lag) % cycle) / cycle;
        let travel = match phase {
            p if p < 0.25 => 0.0,
            p if p < 0.5 => (p - 0.25) * 4.0,
            p if p < 0.75 => 1.0,
            p => 1.0 - (p - 0.75) * 4.0,
        };
        (travel * GEAR_TRAVEL).round() as i32
    }

    fn frequency(&self, t: f64, offset: usize) -> i32 {
        let slot = (t / self.tuning_period.as_secs_f64()) as usize;
        FREQUENCIES_HZ[(slot + offset) % FREQUENCIES_HZ.len()]
    }
}

#[async_trait]
impl TelemetrySource for SimulatedSource {
    async fn connect(&self) -> AppResult<()> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if state.connected_at.is_some() {
            // Already running; re-announce so late subscribers learn about it.
            drop(state);
            let _ = self.events.send(LinkEvent::Connected);
            return Ok(());
        }
        state.connected_at = Some(Instant::now());

        let events = self.events.clone();
        let period = self.process_interval;
        state.ticker = Some(tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            loop {
                interval.tick().await;
                let _ = events.send(LinkEvent::ProcessTick);
            }
        }));
        drop(state);

        info!("Simulated flight started");
        let _ = self.events.send(LinkEvent::Connected);
        Ok(())
    }

    async fn disconnect(&self) -> AppResult<()> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if state.connected_at.take().is_none() {
            return Ok(());
        }
        if let Some(ticker) = state.ticker.take() {
            ticker.abort();
        }
        drop(state);

        let _ = self.events.send(LinkEvent::Disconnected);
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<LinkEvent> {
        self.events.subscribe()
    }

    async fn read_value(&self, name: &str) -> AppResult<TelemetryValue> {
        let t = self.elapsed()?.as_secs_f64();
        let f = &self.fields;
        let value = match name {
            n if n == f.heading => TelemetryValue::Float32(self.heading(t)),
            n if n == f.magnetic_variation => TelemetryValue::Float32(self.magnetic_variation),
            n if n == f.com1_frequency => TelemetryValue::Int32(self.frequency(t, 0)),
            n if n == f.com1_standby => TelemetryValue::Int32(self.frequency(t, 1)),
            n if n == f.gear_nose => TelemetryValue::Int32(self.gear_position(t, 0.0)),
            n if n == f.gear_left => TelemetryValue::Int32(self.gear_position(t, 0.4)),
            n if n == f.gear_right => TelemetryValue::Int32(self.gear_position(t, 0.8)),
            "sim.version" => TelemetryValue::Text("Simulated flight".to_string()),
            "sim.situation_file" => TelemetryValue::Text("simulated.flt".to_string()),
            _ => return Err(BridgeError::MissingField(vec![name.to_string()])),
        };
        Ok(value)
    }

    fn describe(&self) -> String {
        "simulated flight".to_string()
    }
}
