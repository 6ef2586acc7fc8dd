//! Mock Display Sink
//!
//! Records every call in order and can be told to fail upcoming opens or writes, or to
//! stall writes the way a wedged serial port does.
//! Clones share state, so a test keeps one clone for inspection and hands the other
//! to the controller.

use crate::error::{AppResult, BridgeError};
use crate::sink::{ByteSink, SerialSettings};
use async_trait::async_trait;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// One recorded sink call.
#[derive(Debug, Clone, PartialEq)]
pub enum SinkCall {
    /// `configure` with these settings
    Configure(SerialSettings),
    /// successful `open`
    Open,
    /// failed `open`
    OpenFailed,
    /// `close`
    Close,
    /// successful `write` of these bytes
    Write(Vec<u8>),
    /// failed `write`
    WriteFailed,
}

#[derive(Debug, Default)]
struct MockSinkState {
    settings: SerialSettings,
    open: bool,
    calls: Vec<SinkCall>,
    open_failures: u32,
    write_failures: u32,
    stall_writes: bool,
}

/// Recording sink with failure injection.
#[derive(Debug, Clone, Default)]
pub struct MockByteSink {
    state: Arc<Mutex<MockSinkState>>,
}

impl MockByteSink {
    /// Create a closed mock sink.
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, MockSinkState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Fail the next `count` opens.
    pub fn fail_next_opens(&self, count: u32) {
        self.state().open_failures = count;
    }

    /// Fail the next `count` writes.
    pub fn fail_next_writes(&self, count: u32) {
        self.state().write_failures = count;
    }

    /// Make every following write hang until the sink is dropped.
    pub fn stall_writes(&self) {
        self.state().stall_writes = true;
    }

    /// Every call so far, in order.
    pub fn calls(&self) -> Vec<SinkCall> {
        self.state().calls.clone()
    }

    /// Successfully written frames as text.
    pub fn frames(&self) -> Vec<String> {
        self.state()
            .calls
            .iter()
            .filter_map(|c| match c {
                SinkCall::Write(bytes) => Some(String::from_utf8_lossy(bytes).into_owned()),
                _ => None,
            })
            .collect()
    }

    /// Number of successful opens.
    pub fn open_count(&self) -> usize {
        self.count(|c| matches!(c, SinkCall::Open))
    }

    /// Number of closes.
    pub fn close_count(&self) -> usize {
        self.count(|c| matches!(c, SinkCall::Close))
    }

    fn count(&self, pred: impl Fn(&SinkCall) -> bool) -> usize {
        self.state().calls.iter().filter(|c| pred(c)).count()
    }
}

#[async_trait]
impl ByteSink for MockByteSink {
    fn configure(&mut self, settings: &SerialSettings) {
        let mut state = self.state();
        state.settings = settings.clone();
        state.calls.push(SinkCall::Configure(settings.clone()));
    }

    async fn open(&mut self) -> AppResult<()> {
        let mut state = self.state();
        if state.open_failures > 0 {
            state.open_failures -= 1;
            state.calls.push(SinkCall::OpenFailed);
            return Err(BridgeError::SinkOpenFailure {
                port: state.settings.port.clone(),
                reason: "injected open failure".to_string(),
            });
        }
        if !state.open {
            state.open = true;
            state.calls.push(SinkCall::Open);
        }
        Ok(())
    }

    async fn close(&mut self) -> AppResult<()> {
        let mut state = self.state();
        state.open = false;
        state.calls.push(SinkCall::Close);
        Ok(())
    }

    async fn write(&mut self, bytes: &[u8]) -> AppResult<()> {
        let stalled = self.state().stall_writes;
        if stalled {
            futures::future::pending::<()>().await;
        }
        let mut state = self.state();
        if !state.open {
            return Err(BridgeError::SinkNotOpen);
        }
        if state.write_failures > 0 {
            state.write_failures -= 1;
            state.calls.push(SinkCall::WriteFailed);
            return Err(BridgeError::SinkWriteFailure("injected write failure".to_string()));
        }
        state.calls.push(SinkCall::Write(bytes.to_vec()));
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.state().open
    }

    fn describe(&self) -> String {
        format!("mock sink ({})", self.state().settings.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn records_calls_in_order() {
        let mut sink = MockByteSink::new();
        let recorder = sink.clone();

        sink.configure(&SerialSettings::default());
        sink.open().await.unwrap();
        sink.write(b"a#").await.unwrap();
        sink.close().await.unwrap();

        let calls = recorder.calls();
        assert_eq!(calls.len(), 4);
        assert_eq!(calls[1], SinkCall::Open);
        assert_eq!(recorder.frames(), vec!["a#".to_string()]);
        assert!(!recorder.is_open());
    }

    #[tokio::test]
    async fn injected_failures_are_consumed() {
        let mut sink = MockByteSink::new();
        sink.fail_next_opens(1);
        assert!(sink.open().await.is_err());
        sink.open().await.unwrap();

        sink.fail_next_writes(1);
        assert!(matches!(
            sink.write(b"x").await,
            Err(BridgeError::SinkWriteFailure(_))
        ));
        assert!(sink.write(b"y").await.is_ok());
        assert_eq!(sink.frames(), vec!["y".to_string()]);
    }
}
