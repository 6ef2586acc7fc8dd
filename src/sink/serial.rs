//! Serial Display Sink
//!
//! Async serial output to the display board via `tokio-serial`.
//!
//! Protocol overview:
//! - Baud: 9600, 8N1, no flow control (configurable)
//! - Frames are written whole and flushed; nothing is read back
//! - Opening the port resets most Arduino boards, hence the settle period handled by
//!   the controller after `open`

use crate::error::{AppResult, BridgeError};
use crate::sink::{ByteSink, Parity, SerialSettings};
use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio_serial::{SerialPortBuilderExt, SerialStream};
use tracing::debug;

/// Display sink backed by a serial port.
pub struct SerialSink {
    settings: SerialSettings,
    port: Option<SerialStream>,
}

impl SerialSink {
    /// Create a closed sink with the given settings.
    pub fn new(settings: SerialSettings) -> Self {
        Self {
            settings,
            port: None,
        }
    }

    fn data_bits(&self) -> AppResult<tokio_serial::DataBits> {
        match self.settings.data_bits {
            5 => Ok(tokio_serial::DataBits::Five),
            6 => Ok(tokio_serial::DataBits::Six),
            7 => Ok(tokio_serial::DataBits::Seven),
            8 => Ok(tokio_serial::DataBits::Eight),
            other => Err(self.open_failure(format!("unsupported data bits {other}"))),
        }
    }

    fn stop_bits(&self) -> AppResult<tokio_serial::StopBits> {
        match self.settings.stop_bits {
            1 => Ok(tokio_serial::StopBits::One),
            2 => Ok(tokio_serial::StopBits::Two),
            other => Err(self.open_failure(format!("unsupported stop bits {other}"))),
        }
    }

    fn parity(&self) -> tokio_serial::Parity {
        match self.settings.parity {
            Parity::None => tokio_serial::Parity::None,
            Parity::Odd => tokio_serial::Parity::Odd,
            Parity::Even => tokio_serial::Parity::Even,
        }
    }

    fn open_failure(&self, reason: String) -> BridgeError {
        BridgeError::SinkOpenFailure {
            port: self.settings.port.clone(),
            reason,
        }
    }
}

#[async_trait]
impl ByteSink for SerialSink {
    fn configure(&mut self, settings: &SerialSettings) {
        self.settings = settings.clone();
    }

    async fn open(&mut self) -> AppResult<()> {
        if self.port.is_some() {
            return Ok(());
        }

        let port = tokio_serial::new(&self.settings.port, self.settings.baud_rate)
            .data_bits(self.data_bits()?)
            .parity(self.parity())
            .stop_bits(self.stop_bits()?)
            .flow_control(tokio_serial::FlowControl::None)
            .open_native_async()
            .map_err(|e| self.open_failure(e.to_string()))?;

        self.port = Some(port);
        debug!(
            "Serial port '{}' opened at {} baud",
            self.settings.port, self.settings.baud_rate
        );
        Ok(())
    }

    async fn close(&mut self) -> AppResult<()> {
        if self.port.take().is_some() {
            debug!("Serial port '{}' closed", self.settings.port);
        }
        Ok(())
    }

    async fn write(&mut self, bytes: &[u8]) -> AppResult<()> {
        let write_timeout = self.settings.write_timeout;
        let port = self.port.as_mut().ok_or(BridgeError::SinkNotOpen)?;

        let write = async {
            port.write_all(bytes).await?;
            port.flush().await
        };
        let result = match write_timeout {
            Some(limit) => tokio::time::timeout(limit, write)
                .await
                .map_err(|_| BridgeError::SinkWriteFailure(format!("write timed out after {limit:?}")))?,
            None => write.await,
        };
        result.map_err(|e| BridgeError::SinkWriteFailure(e.to_string()))
    }

    fn is_open(&self) -> bool {
        self.port.is_some()
    }

    fn describe(&self) -> String {
        format!(
            "serial {} @ {} baud",
            self.settings.port, self.settings.baud_rate
        )
    }
}
