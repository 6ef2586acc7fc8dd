//! Mock Telemetry Source
//!
//! Scriptable source for tests. Values are set by name; connect/disconnect
//! notifications are injected explicitly with [`MockTelemetrySource::emit`].
//! All state sits behind `Arc`, so a clone kept by the test observes and drives the
//! instance handed to the controller.
//!
//! All delays use `tokio::time::sleep`, never `std::thread::sleep`, so tests can run
//! on paused time.

use crate::error::{AppResult, BridgeError};
use crate::telemetry::{LinkEvent, TelemetrySource, TelemetryValue};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::broadcast;

/// Scriptable in-memory telemetry source.
#[derive(Clone)]
pub struct MockTelemetrySource {
    values: Arc<Mutex<HashMap<String, TelemetryValue>>>,
    events: broadcast::Sender<LinkEvent>,
    read_delay: Arc<Mutex<Duration>>,
    connect_failures: Arc<AtomicU32>,
    connect_attempts: Arc<AtomicU32>,
    reads: Arc<AtomicU64>,
    announce_on_connect: bool,
}

impl MockTelemetrySource {
    /// Create an empty source that announces `Connected` whenever `connect` succeeds.
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(64);
        Self {
            values: Arc::new(Mutex::new(HashMap::new())),
            events,
            read_delay: Arc::new(Mutex::new(Duration::ZERO)),
            connect_failures: Arc::new(AtomicU32::new(0)),
            connect_attempts: Arc::new(AtomicU32::new(0)),
            reads: Arc::new(AtomicU64::new(0)),
            announce_on_connect: true,
        }
    }

    /// Builder: preset a value.
    pub fn with_value(self, name: impl Into<String>, value: TelemetryValue) -> Self {
        self.set_value(name, value);
        self
    }

    /// Builder: delay every read by `delay`.
    pub fn with_read_delay(self, delay: Duration) -> Self {
        self.set_read_delay(delay);
        self
    }

    /// Builder: fail the first `count` connect attempts.
    pub fn with_connect_failures(self, count: u32) -> Self {
        self.connect_failures.store(count, Ordering::SeqCst);
        self
    }

    /// Builder: do not emit `Connected` from `connect`; tests emit it themselves.
    pub fn without_announce(mut self) -> Self {
        self.announce_on_connect = false;
        self
    }

    /// Set or replace a value.
    pub fn set_value(&self, name: impl Into<String>, value: TelemetryValue) {
        self.values
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.into(), value);
    }

    /// Make a name unresolvable.
    pub fn remove_value(&self, name: &str) {
        self.values
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(name);
    }

    /// Change the read delay.
    pub fn set_read_delay(&self, delay: Duration) {
        *self.read_delay.lock().unwrap_or_else(PoisonError::into_inner) = delay;
    }

    /// Push a notification to every subscriber.
    ///
    /// Returns the number of subscribers that received it.
    pub fn emit(&self, event: LinkEvent) -> usize {
        self.events.send(event).unwrap_or(0)
    }

    /// Number of `connect` calls so far.
    pub fn connect_attempts(&self) -> u32 {
        self.connect_attempts.load(Ordering::SeqCst)
    }

    /// Number of `read_value` calls so far.
    pub fn reads(&self) -> u64 {
        self.reads.load(Ordering::SeqCst)
    }
}

impl Default for MockTelemetrySource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TelemetrySource for MockTelemetrySource {
    async fn connect(&self) -> AppResult<()> {
        self.connect_attempts.fetch_add(1, Ordering::SeqCst);
        let remaining = self.connect_failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.connect_failures.store(remaining - 1, Ordering::SeqCst);
            return Err(BridgeError::Source("simulator not running".to_string()));
        }
        if self.announce_on_connect {
            self.emit(LinkEvent::Connected);
        }
        Ok(())
    }

    async fn disconnect(&self) -> AppResult<()> {
        self.emit(LinkEvent::Disconnected);
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<LinkEvent> {
        self.events.subscribe()
    }

    async fn read_value(&self, name: &str) -> AppResult<TelemetryValue> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        let delay = *self.read_delay.lock().unwrap_or_else(PoisonError::into_inner);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        self.values
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
            .ok_or_else(|| BridgeError::MissingField(vec![name.to_string()]))
    }

    fn describe(&self) -> String {
        "mock telemetry source".to_string()
    }
}
