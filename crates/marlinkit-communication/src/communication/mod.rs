//! Byte-stream transports
//!
//! A [`Transport`] is a duplex line-oriented link to one printer. The session
//! layer is the only caller; it serializes all reads and writes on a link.

pub mod serial;
pub mod virtual_port;

use async_trait::async_trait;
use marlinkit_core::{ConnectionError, TransportError};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default baud rate for Marlin boards
pub const DEFAULT_BAUD_RATE: u32 = 115_200;

/// Parameters for opening a printer link
///
/// Framing (8 data bits, no parity, 1 stop bit, RTS and DTR asserted) is
/// fixed by the firmware family and not configurable here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionParams {
    /// Port identifier (e.g., "/dev/ttyUSB0", "COM3")
    pub port: String,
    /// Baud rate
    pub baud_rate: u32,
}

impl ConnectionParams {
    /// Create parameters for a port
    pub fn new(port: impl Into<String>, baud_rate: u32) -> Self {
        Self {
            port: port.into(),
            baud_rate,
        }
    }

    /// Check the parameters before touching the port
    pub fn validate(&self) -> Result<(), ConnectionError> {
        if self.port.trim().is_empty() {
            return Err(ConnectionError::InvalidParameters {
                reason: "port must not be empty".to_string(),
            });
        }
        if self.baud_rate == 0 {
            return Err(ConnectionError::InvalidParameters {
                reason: "baud rate must be > 0".to_string(),
            });
        }
        Ok(())
    }
}

impl Default for ConnectionParams {
    fn default() -> Self {
        Self::new("", DEFAULT_BAUD_RATE)
    }
}

/// Duplex line link to one printer
#[async_trait]
pub trait Transport: Send {
    /// Port identifier this transport is bound to
    fn port_name(&self) -> &str;

    /// Open the link
    async fn open(&mut self, params: &ConnectionParams) -> Result<(), ConnectionError>;

    /// Close the link. Closing a closed link is a no-op.
    async fn close(&mut self);

    /// Whether the link is open
    fn is_open(&self) -> bool;

    /// True iff bytes are buffered and a read would return data
    fn is_readable(&mut self) -> Result<bool, TransportError>;

    /// Write one line; the transport appends the line terminator
    async fn write_line(&mut self, line: &str) -> Result<(), TransportError>;

    /// Return everything currently buffered without waiting; empty if nothing
    async fn read_available(&mut self) -> Result<String, TransportError>;

    /// Wait up to `timeout` for one complete line, returned without terminator
    async fn read_line(&mut self, timeout: Duration) -> Result<String, TransportError>;
}

/// Split complete lines off the front of `buffer`, leaving any partial tail.
///
/// Lines are returned without `\r`/`\n` terminators; blank lines are dropped.
pub fn drain_lines(buffer: &mut String) -> Vec<String> {
    let mut lines = Vec::new();
    while let Some(pos) = buffer.find('\n') {
        let line = buffer[..pos].trim_end_matches('\r').to_string();
        buffer.drain(..=pos);
        if !line.trim().is_empty() {
            lines.push(line);
        }
    }
    lines
}
