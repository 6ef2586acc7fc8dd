//! Dry-run sink that writes frames to the log.

use crate::error::{AppResult, BridgeError};
use crate::sink::{ByteSink, SerialSettings};
use async_trait::async_trait;
use tracing::info;

/// Sink that logs each frame instead of sending it.
#[derive(Debug, Default)]
pub struct LogSink {
    settings: SerialSettings,
    open: bool,
    frames: u64,
}

impl LogSink {
    /// Create a closed log sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Frames written so far.
    pub fn frames(&self) -> u64 {
        self.frames
    }
}

#[async_trait]
impl ByteSink for LogSink {
    fn configure(&mut self, settings: &SerialSettings) {
        self.settings = settings.clone();
    }

    async fn open(&mut self) -> AppResult<()> {
        self.open = true;
        info!(port = %self.settings.port, "Dry run: frames are logged, not sent");
        Ok(())
    }

    async fn close(&mut self) -> AppResult<()> {
        self.open = false;
        Ok(())
    }

    async fn write(&mut self, bytes: &[u8]) -> AppResult<()> {
        if !self.open {
            return Err(BridgeError::SinkNotOpen);
        }
        self.frames += 1;
        info!(frame = %String::from_utf8_lossy(bytes), n = self.frames, "Frame");
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.open
    }

    fn describe(&self) -> String {
        format!("log (dry run for {})", self.settings.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_test::traced_test;

    #[tokio::test]
    #[traced_test]
    async fn logs_frames_once_open() {
        let mut sink = LogSink::new();
        assert!(sink.write(b"x#").await.is_err());

        sink.open().await.unwrap();
        sink.write(b"118.000#121.500#045#On#On#On#").await.unwrap();
        assert_eq!(sink.frames(), 1);
        assert!(logs_contain("118.000#121.500#045#On#On#On#"));
    }
}
