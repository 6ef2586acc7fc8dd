//! Bridge Controller
//!
//! Owns the sink, the field registry and the state machine, and runs them on a
//! single tokio task. Link notifications from the telemetry source and the tick
//! timer are serialized through one `select!` loop, so a tick never races a
//! disconnect: events that arrive while a sample is in flight are queued, and a
//! `Disconnected` among them abandons the tick before anything is written.
//! A shutdown request also cuts short a settle pause or a stalled write.
//!
//! # Lifecycle
//!
//! - `Connected` event: configure and open the sink, wait for the board to settle,
//!   log the simulator identity, start ticking.
//! - Tick: sample within budget, render, encode, write. A failed tick degrades the
//!   state and skips the frame; the next good tick recovers.
//! - `write_failure_limit` consecutive write failures close and reopen the sink.
//! - `Disconnected` event: stop ticking, close the sink, go idle and (optionally)
//!   keep asking the source to reconnect.
//!
//! # Example
//! ```no_run
//! use cockpit_bridge::bridge::BridgeController;
//! use cockpit_bridge::config::BridgeConfig;
//! use cockpit_bridge::sink::LogSink;
//! use cockpit_bridge::telemetry::SimulatedSource;
//! use std::sync::Arc;
//!
//! # async fn example() -> cockpit_bridge::error::AppResult<()> {
//! let config = BridgeConfig::default();
//! let source = Arc::new(SimulatedSource::new(config.fields.clone(), config.bridge.tick_interval));
//! let handle = BridgeController::new(&config, source, Box::new(LogSink::new()))?.start();
//!
//! tokio::signal::ctrl_c().await?;
//! let status = handle.stop().await?;
//! println!("{} frames sent", status.stats.frames_sent);
//! # Ok(())
//! # }
//! ```

use crate::bridge::state::{BridgeState, BridgeStatus};
use crate::config::{BridgeConfig, BridgeOptions, TickDriver};
use crate::display::{FrameEncoder, Transformer};
use crate::error::{AppResult, BridgeError};
use crate::sink::{ByteSink, SerialSettings};
use crate::telemetry::{FieldRegistry, LinkEvent, Sampler, TelemetrySource};
use chrono::Utc;
use std::collections::VecDeque;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::broadcast::{
    self,
    error::{RecvError, TryRecvError},
};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tracing::{debug, error, info, warn, Instrument};

/// Link events and the shutdown request, shared by every wait of the run loop.
struct Signals {
    events: broadcast::Receiver<LinkEvent>,
    shutdown: watch::Receiver<bool>,
    /// Shutdown arrived while the controller was busy
    stopping: bool,
}

/// What woke the run loop.
enum Wake {
    Shutdown,
    Link(LinkEvent),
    Tick,
    RetrySink,
}

/// Drives telemetry from a source to a display sink.
pub struct BridgeController {
    source: Arc<dyn TelemetrySource>,
    sink: Box<dyn ByteSink>,
    registry: FieldRegistry,
    sampler: Sampler,
    transformer: Transformer,
    encoder: FrameEncoder,
    serial: SerialSettings,
    options: BridgeOptions,
    state: BridgeState,
    /// Source reported `Connected` and has not disconnected since
    link_up: bool,
    ticker: Option<Interval>,
    sink_retry_at: Option<Instant>,
    consecutive_write_failures: u32,
    connector: Option<JoinHandle<()>>,
    status: watch::Sender<BridgeStatus>,
}

impl BridgeController {
    /// Build a controller from configuration.
    ///
    /// # Errors
    /// `Configuration` when the config does not validate, `DuplicateField` when two
    /// cockpit items map to one name with different kinds.
    pub fn new(
        config: &BridgeConfig,
        source: Arc<dyn TelemetrySource>,
        sink: Box<dyn ByteSink>,
    ) -> AppResult<Self> {
        config.validate()?;
        let registry = config.fields.registry()?;
        let (status, _) = watch::channel(BridgeStatus::default());

        Ok(Self {
            source,
            sink,
            registry,
            sampler: Sampler::for_interval(
                config.bridge.tick_interval,
                config.bridge.sample_budget_ratio,
            ),
            transformer: Transformer::new(config.fields.clone())
                .with_frequency_divisor(config.display.frequency_divisor),
            encoder: FrameEncoder::with_checksum(config.display.checksum),
            serial: config.serial.clone(),
            options: config.bridge.clone(),
            state: BridgeState::Idle,
            link_up: false,
            ticker: None,
            sink_retry_at: None,
            consecutive_write_failures: 0,
            connector: None,
            status,
        })
    }

    /// Current state.
    pub fn state(&self) -> BridgeState {
        self.state
    }

    /// Observe status changes.
    pub fn subscribe(&self) -> watch::Receiver<BridgeStatus> {
        self.status.subscribe()
    }

    /// Spawn the controller on the current runtime.
    ///
    /// The link event subscription is taken before this returns, so notifications
    /// sent right after `start` are not lost.
    pub fn start(self) -> BridgeHandle {
        let events = self.source.subscribe();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let status = self.status.subscribe();
        let task = tokio::spawn(self.run_with(events, shutdown_rx).in_current_span());
        BridgeHandle {
            status,
            shutdown: shutdown_tx,
            task,
        }
    }

    /// Run until `shutdown` changes (or its sender is dropped) or the source
    /// closes its event stream. Returns the final status.
    pub async fn run(self, shutdown: watch::Receiver<bool>) -> BridgeStatus {
        let events = self.source.subscribe();
        self.run_with(events, shutdown).await
    }

    async fn run_with(
        mut self,
        events: broadcast::Receiver<LinkEvent>,
        shutdown: watch::Receiver<bool>,
    ) -> BridgeStatus {
        let mut signals = Signals {
            events,
            shutdown,
            stopping: false,
        };
        info!(
            source = %self.source.describe(),
            sink = %self.sink.describe(),
            tick = ?self.options.tick_interval,
            "Bridge started"
        );
        if self.options.auto_connect {
            self.spawn_connector();
        }

        loop {
            let wake = tokio::select! {
                biased;
                _ = signals.shutdown.changed() => Wake::Shutdown,
                received = signals.events.recv() => match received {
                    Ok(event) => Wake::Link(event),
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "Link events dropped; bridge fell behind");
                        continue;
                    }
                    Err(RecvError::Closed) => {
                        info!("Telemetry source closed its event stream");
                        Wake::Shutdown
                    }
                },
                () = next_tick(&mut self.ticker) => Wake::Tick,
                () = retry_due(self.sink_retry_at) => Wake::RetrySink,
            };

            let mut pending = VecDeque::new();
            match wake {
                Wake::Shutdown => break,
                Wake::Link(event) => pending.push_back(event),
                Wake::Tick => pending.extend(self.tick(&mut signals).await),
                Wake::RetrySink => {
                    self.sink_retry_at = None;
                    if self.link_up && self.state == BridgeState::Idle {
                        pending.extend(self.connect_sink(&mut signals).await);
                    }
                }
            }
            self.dispatch(pending, &mut signals).await;
            if signals.stopping {
                break;
            }
        }

        self.stop().await;
        let status = self.status.borrow().clone();
        status
    }

    /// Handle link events in arrival order, including any that queue up meanwhile.
    async fn dispatch(&mut self, mut pending: VecDeque<LinkEvent>, signals: &mut Signals) {
        while let Some(event) = pending.pop_front() {
            if signals.stopping {
                break;
            }
            let deferred = match event {
                LinkEvent::Connected => self.on_connected(signals).await,
                LinkEvent::Disconnected => {
                    self.on_disconnected().await;
                    Vec::new()
                }
                LinkEvent::ProcessTick => {
                    if self.options.tick_driver == TickDriver::Source && self.state.is_ticking() {
                        self.tick(signals).await
                    } else {
                        Vec::new()
                    }
                }
                LinkEvent::Failure { code, message } => {
                    warn!(code, %message, "Telemetry source reported a failure");
                    self.update(|s| s.last_error = Some(format!("source failure {code}: {message}")));
                    Vec::new()
                }
            };
            pending.extend(deferred);
        }
    }

    async fn on_connected(&mut self, signals: &mut Signals) -> Vec<LinkEvent> {
        self.link_up = true;
        if let Some(connector) = self.connector.take() {
            connector.abort();
        }
        if self.state != BridgeState::Idle {
            debug!(state = %self.state, "Connected event while already connected");
            return Vec::new();
        }

        info!(source = %self.source.describe(), "Simulator connected");
        self.update(|s| s.stats.connects += 1);
        self.connect_sink(signals).await
    }

    async fn on_disconnected(&mut self) {
        self.link_up = false;
        self.sink_retry_at = None;
        if self.state != BridgeState::Idle {
            info!("Simulator disconnected");
            self.update(|s| s.stats.disconnects += 1);
            self.release_sink().await;
        }
        if self.options.auto_connect {
            self.spawn_connector();
        }
    }

    /// `Idle -> Connecting -> Connected`.
    ///
    /// Returns link events that arrived while the sink was settling.
    async fn connect_sink(&mut self, signals: &mut Signals) -> Vec<LinkEvent> {
        self.set_state(BridgeState::Connecting);
        self.sink.configure(&self.serial);

        if let Err(e) = self.sink.open().await {
            error!(error = %e, sink = %self.sink.describe(), "Display sink failed to open");
            let message = e.to_string();
            self.update(|s| {
                s.stats.open_failures += 1;
                s.last_error = Some(message);
            });
            self.set_state(BridgeState::Idle);
            if self.link_up {
                self.sink_retry_at = Some(Instant::now() + self.options.reconnect_interval);
            }
            return Vec::new();
        }
        info!(sink = %self.sink.describe(), "Display sink opened");

        let mut deferred = Vec::new();
        if !self.serial.settle.is_zero() {
            debug!(settle = ?self.serial.settle, "Waiting for display to settle");
            let settled = tokio::time::sleep(self.serial.settle);
            if while_linked(settled, signals, &mut deferred).await.is_none() {
                // Still Connecting; the queued Disconnected (or stop) releases the sink.
                return deferred;
            }
        }

        self.sampler
            .read_once(self.source.as_ref(), &self.options.identity_fields)
            .await;

        self.consecutive_write_failures = 0;
        self.start_ticking();
        self.set_state(BridgeState::Connected);
        deferred
    }

    /// Stop ticking, close the sink, go idle.
    async fn release_sink(&mut self) {
        self.ticker = None;
        self.consecutive_write_failures = 0;
        if let Err(e) = self.sink.close().await {
            warn!(error = %e, "Failed to close display sink");
        }
        self.set_state(BridgeState::Idle);
    }

    fn start_ticking(&mut self) {
        if self.options.tick_driver != TickDriver::Timer {
            return;
        }
        let period = self.options.tick_interval;
        let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        self.ticker = Some(ticker);
    }

    /// One sample/render/write pass.
    ///
    /// Returns link events that arrived meanwhile; the caller handles them after
    /// the tick.
    async fn tick(&mut self, signals: &mut Signals) -> Vec<LinkEvent> {
        let mut deferred = Vec::new();
        if !self.state.is_ticking() {
            return deferred;
        }
        self.update(|s| s.stats.ticks += 1);

        let sample = self.sampler.tick(self.source.as_ref(), &mut self.registry);
        let Some(sampled) = while_linked(sample, signals, &mut deferred).await else {
            debug!("Link lost or shutdown during sample; tick abandoned");
            return deferred;
        };
        drain_pending(&mut signals.events, &mut deferred);
        if deferred.contains(&LinkEvent::Disconnected) {
            debug!("Link lost after sample; frame discarded");
            return deferred;
        }

        let frame = match sampled.and_then(|snapshot| self.transformer.render(&snapshot)) {
            Ok(frame) => frame,
            Err(e) => {
                self.tick_failed(&e);
                return deferred;
            }
        };

        let bytes = self.encoder.encode(&frame);
        let Some(written) = until_shutdown(self.sink.write(&bytes), signals).await else {
            debug!("Shutdown during write; frame abandoned");
            return deferred;
        };
        match written {
            Ok(()) => self.frame_sent(&bytes),
            Err(e) => {
                self.consecutive_write_failures += 1;
                self.update(|s| s.stats.write_failures += 1);
                self.tick_failed(&e);
                if self.consecutive_write_failures >= self.options.write_failure_limit {
                    deferred.extend(self.recycle_sink(signals).await);
                }
            }
        }
        deferred
    }

    fn frame_sent(&mut self, bytes: &[u8]) {
        self.consecutive_write_failures = 0;
        let text = String::from_utf8_lossy(bytes).into_owned();
        debug!(frame = %text, "Frame sent");
        self.update(|s| {
            s.stats.frames_sent += 1;
            s.last_frame = Some(text);
        });
        if self.state == BridgeState::Degraded {
            self.set_state(BridgeState::Connected);
        }
    }

    fn tick_failed(&mut self, e: &BridgeError) {
        warn!(error = %e, "Tick failed; frame skipped");
        let sample_failure = e.is_sample_failure();
        let message = e.to_string();
        self.update(|s| {
            s.stats.degraded_ticks += 1;
            if sample_failure {
                s.stats.sample_failures += 1;
            }
            s.last_error = Some(message);
        });
        if self.state == BridgeState::Connected {
            self.set_state(BridgeState::Degraded);
        }
    }

    /// Close and reopen the sink after repeated write failures.
    async fn recycle_sink(&mut self, signals: &mut Signals) -> Vec<LinkEvent> {
        warn!(
            failures = self.consecutive_write_failures,
            sink = %self.sink.describe(),
            "Repeated write failures; reopening display sink"
        );
        self.update(|s| s.stats.sink_recycles += 1);
        self.release_sink().await;
        self.connect_sink(signals).await
    }

    /// Ask the source to connect every `reconnect_interval` until it accepts.
    fn spawn_connector(&mut self) {
        if self
            .connector
            .as_ref()
            .is_some_and(|task| !task.is_finished())
        {
            return;
        }

        let source = Arc::clone(&self.source);
        let retry = self.options.reconnect_interval;
        self.connector = Some(tokio::spawn(async move {
            let mut attempts: u32 = 0;
            loop {
                attempts += 1;
                match source.connect().await {
                    Ok(()) => {
                        debug!(attempts, "Telemetry source accepted connection");
                        break;
                    }
                    Err(e) if attempts == 1 => {
                        info!(error = %e, retry_in = ?retry, "Waiting for simulator");
                    }
                    Err(e) => debug!(error = %e, attempts, "Simulator still unavailable"),
                }
                tokio::time::sleep(retry).await;
            }
        }));
    }

    async fn stop(&mut self) {
        if let Some(connector) = self.connector.take() {
            connector.abort();
        }
        self.sink_retry_at = None;
        if self.state != BridgeState::Idle || self.sink.is_open() {
            self.release_sink().await;
        }
        if self.link_up {
            self.link_up = false;
            if let Err(e) = self.source.disconnect().await {
                warn!(error = %e, "Failed to disconnect telemetry source");
            }
        }
        let stats = self.status.borrow().stats.clone();
        info!(
            frames = stats.frames_sent,
            degraded = stats.degraded_ticks,
            "Bridge stopped"
        );
    }

    fn set_state(&mut self, next: BridgeState) {
        if self.state == next {
            return;
        }
        info!(from = %self.state, to = %next, "Bridge state changed");
        self.state = next;
        self.status.send_modify(|s| {
            s.state = next;
            s.since = Utc::now();
        });
    }

    fn update(&self, f: impl FnOnce(&mut BridgeStatus)) {
        self.status.send_modify(f);
    }
}

/// Drive `work` to completion while queueing link events.
///
/// `ProcessTick` notifications are dropped; the work they would start is already
/// running. Returns `None` as soon as the link goes down or shutdown is requested.
async fn while_linked<F: Future>(
    work: F,
    signals: &mut Signals,
    deferred: &mut Vec<LinkEvent>,
) -> Option<F::Output> {
    tokio::pin!(work);
    loop {
        tokio::select! {
            biased;
            _ = signals.shutdown.changed() => {
                signals.stopping = true;
                return None;
            }
            received = signals.events.recv() => match received {
                Ok(LinkEvent::ProcessTick) => {}
                Ok(LinkEvent::Disconnected) => {
                    deferred.push(LinkEvent::Disconnected);
                    return None;
                }
                Ok(event) => deferred.push(event),
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Link events dropped while busy");
                }
                Err(RecvError::Closed) => return None,
            },
            output = &mut work => return Some(output),
        }
    }
}

/// Drive `work` unless shutdown is requested first.
async fn until_shutdown<F: Future>(work: F, signals: &mut Signals) -> Option<F::Output> {
    tokio::select! {
        biased;
        _ = signals.shutdown.changed() => {
            signals.stopping = true;
            None
        }
        output = work => Some(output),
    }
}

/// Queue whatever arrived without waiting.
fn drain_pending(events: &mut broadcast::Receiver<LinkEvent>, deferred: &mut Vec<LinkEvent>) {
    loop {
        match events.try_recv() {
            Ok(LinkEvent::ProcessTick) => {}
            Ok(event) => deferred.push(event),
            Err(TryRecvError::Lagged(_)) => continue,
            Err(TryRecvError::Empty | TryRecvError::Closed) => break,
        }
    }
}

async fn next_tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(ticker) => {
            ticker.tick().await;
        }
        None => futures::future::pending::<()>().await,
    }
}

async fn retry_due(at: Option<Instant>) {
    match at {
        Some(at) => tokio::time::sleep_until(at).await,
        None => futures::future::pending::<()>().await,
    }
}

/// Handle to a running controller.
///
/// Dropping the handle stops the bridge.
pub struct BridgeHandle {
    status: watch::Receiver<BridgeStatus>,
    shutdown: watch::Sender<bool>,
    task: JoinHandle<BridgeStatus>,
}

impl BridgeHandle {
    /// Latest published status.
    pub fn status(&self) -> BridgeStatus {
        self.status.borrow().clone()
    }

    /// Status receiver for `changed()`/`wait_for()`.
    pub fn subscribe(&self) -> watch::Receiver<BridgeStatus> {
        self.status.clone()
    }

    /// Request a graceful shutdown: close the sink and disconnect the source.
    pub fn shutdown(&self) {
        let _ = self.shutdown.send(true);
    }

    /// Wait for the controller task to finish.
    ///
    /// Only returns once shutdown was requested or the source closed its events.
    pub async fn join(self) -> AppResult<BridgeStatus> {
        self.task
            .await
            .map_err(|e| BridgeError::Task(e.to_string()))
    }

    /// `shutdown` followed by `join`.
    pub async fn stop(self) -> AppResult<BridgeStatus> {
        self.shutdown();
        self.join().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::state::ConnectionState;
    use crate::sink::{MockByteSink, SinkCall};
    use crate::telemetry::{MockTelemetrySource, TelemetryValue};
    use std::time::Duration;

    fn test_config() -> BridgeConfig {
        let mut config = BridgeConfig::default();
        config.serial.settle = Duration::ZERO;
        config.bridge.identity_fields.clear();
        config.bridge.auto_connect = false;
        config
    }

    fn cockpit() -> MockTelemetrySource {
        MockTelemetrySource::new()
            .without_announce()
            .with_value("aircraft.heading", TelemetryValue::Float32(50.0))
            .with_value("aircraft.magnetic_variation", TelemetryValue::Float32(5.0))
            .with_value("com1.frequency", TelemetryValue::Int32(118_000_000))
            .with_value("com1.standby", TelemetryValue::Int32(121_500_000))
            .with_value("gear.nose", TelemetryValue::Int32(0))
            .with_value("gear.left", TelemetryValue::Int32(16383))
            .with_value("gear.right", TelemetryValue::Int32(8192))
    }

    fn start(config: &BridgeConfig, source: &MockTelemetrySource, sink: &MockByteSink) -> BridgeHandle {
        BridgeController::new(config, Arc::new(source.clone()), Box::new(sink.clone()))
            .unwrap()
            .start()
    }

    #[tokio::test(start_paused = true)]
    async fn writes_one_frame_per_tick_once_connected() {
        let source = cockpit();
        let sink = MockByteSink::new();
        let handle = start(&test_config(), &source, &sink);

        tokio::time::sleep(Duration::from_millis(600)).await;
        assert!(sink.frames().is_empty(), "no frames before the link is up");

        source.emit(LinkEvent::Connected);
        tokio::time::sleep(Duration::from_millis(800)).await;

        let frames = sink.frames();
        assert_eq!(frames.len(), 3);
        assert!(frames.iter().all(|f| f == "118.000#121.500#045#On#Off#Moving#"));

        let status = handle.status();
        assert_eq!(status.state, BridgeState::Connected);
        assert_eq!(status.connection(), ConnectionState::Connected);
        assert_eq!(status.stats.frames_sent, 3);
        assert_eq!(status.last_frame.as_deref(), Some("118.000#121.500#045#On#Off#Moving#"));

        handle.stop().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn repeated_write_failures_recycle_the_sink() {
        let source = cockpit();
        let sink = MockByteSink::new();
        sink.fail_next_writes(3);
        let handle = start(&test_config(), &source, &sink);

        source.emit(LinkEvent::Connected);
        tokio::time::sleep(Duration::from_millis(1100)).await;

        let status = handle.status();
        assert_eq!(status.state, BridgeState::Connected);
        assert_eq!(status.stats.write_failures, 3);
        assert_eq!(status.stats.sink_recycles, 1);
        assert_eq!(sink.open_count(), 2);
        assert_eq!(sink.close_count(), 1);
        assert_eq!(sink.frames().len(), 1);

        let calls = sink.calls();
        let close = calls.iter().position(|c| *c == SinkCall::Close).unwrap();
        assert_eq!(
            calls[..close].iter().filter(|c| **c == SinkCall::WriteFailed).count(),
            3
        );
        assert!(matches!(calls[close + 1], SinkCall::Configure(_)));
        assert_eq!(calls[close + 2], SinkCall::Open);

        handle.stop().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn source_driven_ticks_follow_process_notifications() {
        let mut config = test_config();
        config.bridge.tick_driver = TickDriver::Source;
        let source = cockpit();
        let sink = MockByteSink::new();
        let handle = start(&config, &source, &sink);

        source.emit(LinkEvent::Connected);
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert!(sink.frames().is_empty(), "no timer in source mode");

        source.emit(LinkEvent::ProcessTick);
        tokio::time::sleep(Duration::from_millis(10)).await;
        source.emit(LinkEvent::ProcessTick);
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(sink.frames().len(), 2);

        handle.stop().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn failure_notification_is_reported() {
        let source = cockpit();
        let sink = MockByteSink::new();
        let handle = start(&test_config(), &source, &sink);

        source.emit(LinkEvent::Failure {
            code: 12,
            message: "link lost".to_string(),
        });
        tokio::time::sleep(Duration::from_millis(10)).await;

        let status = handle.status();
        assert_eq!(status.state, BridgeState::Idle);
        assert_eq!(status.last_error.as_deref(), Some("source failure 12: link lost"));

        handle.stop().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_closes_sink_and_disconnects_source() {
        let source = cockpit();
        let sink = MockByteSink::new();
        let mut events = source.subscribe();
        let handle = start(&test_config(), &source, &sink);

        source.emit(LinkEvent::Connected);
        assert_eq!(events.recv().await.unwrap(), LinkEvent::Connected);
        tokio::time::sleep(Duration::from_millis(300)).await;

        let status = handle.stop().await.unwrap();
        assert_eq!(status.state, BridgeState::Idle);
        assert_eq!(sink.calls().last(), Some(&SinkCall::Close));
        assert_eq!(events.recv().await.unwrap(), LinkEvent::Disconnected);
    }

    #[tokio::test(start_paused = true)]
    async fn settle_period_delays_first_frame() {
        let mut config = test_config();
        config.serial.settle = Duration::from_secs(4);
        let source = cockpit();
        let sink = MockByteSink::new();
        let handle = start(&config, &source, &sink);

        source.emit(LinkEvent::Connected);
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(handle.status().state, BridgeState::Connecting);
        assert_eq!(sink.open_count(), 1);
        assert!(sink.frames().is_empty());

        tokio::time::sleep(Duration::from_millis(2300)).await;
        assert_eq!(handle.status().state, BridgeState::Connected);
        assert_eq!(sink.frames().len(), 1);

        handle.stop().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn stop_cuts_the_settle_pause_short() {
        let mut config = test_config();
        config.serial.settle = Duration::from_secs(4);
        let source = cockpit();
        let sink = MockByteSink::new();
        let handle = start(&config, &source, &sink);

        source.emit(LinkEvent::Connected);
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(handle.status().state, BridgeState::Connecting);

        let stopping_at = Instant::now();
        let status = handle.stop().await.unwrap();
        assert!(stopping_at.elapsed() < Duration::from_millis(100));
        assert_eq!(status.state, BridgeState::Idle);
        assert_eq!(sink.calls().last(), Some(&SinkCall::Close));
        assert!(sink.frames().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn stop_abandons_a_stalled_write() {
        let source = cockpit();
        let sink = MockByteSink::new();
        sink.stall_writes();
        let handle = start(&test_config(), &source, &sink);

        source.emit(LinkEvent::Connected);
        tokio::time::sleep(Duration::from_millis(300)).await;
        assert_eq!(handle.status().stats.ticks, 1);

        let stopping_at = Instant::now();
        let status = handle.stop().await.unwrap();
        assert!(stopping_at.elapsed() < Duration::from_millis(100));
        assert_eq!(status.stats.frames_sent, 0);
        assert_eq!(sink.close_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn write_failures_are_not_counted_as_sample_failures() {
        let source = cockpit();
        let sink = MockByteSink::new();
        sink.fail_next_writes(1);
        let handle = start(&test_config(), &source, &sink);

        source.emit(LinkEvent::Connected);
        tokio::time::sleep(Duration::from_millis(300)).await;
        let status = handle.status();
        assert_eq!(status.stats.degraded_ticks, 1);
        assert_eq!(status.stats.sample_failures, 0);

        source.remove_value("gear.nose");
        tokio::time::sleep(Duration::from_millis(250)).await;
        let status = handle.status();
        assert_eq!(status.stats.degraded_ticks, 2);
        assert_eq!(status.stats.sample_failures, 1);

        handle.stop().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn run_ends_when_shutdown_sender_is_dropped() {
        let source = cockpit();
        let sink = MockByteSink::new();
        let controller =
            BridgeController::new(&test_config(), Arc::new(source.clone()), Box::new(sink.clone()))
                .unwrap();
        assert_eq!(controller.state(), BridgeState::Idle);
        let observer = controller.subscribe();

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        drop(shutdown_tx);
        let status = controller.run(shutdown_rx).await;

        assert_eq!(status.state, BridgeState::Idle);
        assert_eq!(observer.borrow().stats.ticks, 0);
        assert!(sink.calls().is_empty());
    }

    #[test]
    fn invalid_config_is_rejected() {
        let mut config = test_config();
        config.bridge.sample_budget_ratio = 0.0;
        let result = BridgeController::new(
            &config,
            Arc::new(MockTelemetrySource::new()),
            Box::new(MockByteSink::new()),
        );
        assert!(matches!(result, Err(BridgeError::Configuration(_))));
    }
}
