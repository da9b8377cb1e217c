//! In-memory transport
//!
//! A `VirtualTransport` behaves like a serial link without hardware: the
//! paired [`VirtualPortHandle`] plays the printer side, queueing inbound text
//! and inspecting what the host wrote. An optional responder produces
//! firmware replies for every written line, which is enough to simulate an
//! SD upload conversation.

use super::{ConnectionParams, Transport};
use async_trait::async_trait;
use marlinkit_core::{ConnectionError, TransportError};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

/// Replies produced for one written line
pub type Responder = Box<dyn FnMut(&str) -> Vec<String> + Send>;

const LINE_POLL_DELAY: Duration = Duration::from_millis(1);

#[derive(Default)]
struct PortState {
    inbound: VecDeque<String>,
    written: Vec<String>,
    fail_open: bool,
    fail_writes: bool,
    fail_reads: bool,
    open_count: usize,
}

/// Printer-side handle to a [`VirtualTransport`]
#[derive(Clone)]
pub struct VirtualPortHandle {
    state: Arc<Mutex<PortState>>,
}

impl VirtualPortHandle {
    /// Queue one line of firmware output (terminator added)
    pub fn push_line(&self, line: &str) {
        self.state.lock().inbound.push_back(format!("{}\n", line));
    }

    /// Queue several lines in order
    pub fn push_lines<I, S>(&self, lines: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut state = self.state.lock();
        for line in lines {
            state.inbound.push_back(format!("{}\n", line.as_ref()));
        }
    }

    /// Queue raw text exactly as given, possibly a partial line
    pub fn push_raw(&self, text: &str) {
        self.state.lock().inbound.push_back(text.to_string());
    }

    /// Everything the host has written, one entry per line
    pub fn written(&self) -> Vec<String> {
        self.state.lock().written.clone()
    }

    /// Forget recorded writes
    pub fn clear_written(&self) {
        self.state.lock().written.clear();
    }

    /// Make the next `open` fail
    pub fn set_fail_open(&self, fail: bool) {
        self.state.lock().fail_open = fail;
    }

    /// Make writes fail with an I/O error
    pub fn set_fail_writes(&self, fail: bool) {
        self.state.lock().fail_writes = fail;
    }

    /// Make reads fail with an I/O error (simulates unplugging the board)
    pub fn set_fail_reads(&self, fail: bool) {
        self.state.lock().fail_reads = fail;
    }

    /// How many times the transport has been opened
    pub fn open_count(&self) -> usize {
        self.state.lock().open_count
    }

    /// Number of queued inbound chunks not yet read by the host
    pub fn pending_inbound(&self) -> usize {
        self.state.lock().inbound.len()
    }
}

/// Hardware-free transport
pub struct VirtualTransport {
    port_name: String,
    open: bool,
    state: Arc<Mutex<PortState>>,
    responder: Option<Responder>,
    pending: String,
}

impl VirtualTransport {
    /// Create a transport and its printer-side handle
    pub fn new(port_name: impl Into<String>) -> (Self, VirtualPortHandle) {
        let state = Arc::new(Mutex::new(PortState::default()));
        let transport = Self {
            port_name: port_name.into(),
            open: false,
            state: state.clone(),
            responder: None,
            pending: String::new(),
        };
        (transport, VirtualPortHandle { state })
    }

    /// Install a responder called with every written line
    pub fn with_responder<F>(mut self, responder: F) -> Self
    where
        F: FnMut(&str) -> Vec<String> + Send + 'static,
    {
        self.responder = Some(Box::new(responder));
        self
    }

    fn io_error(&self, reason: &str) -> TransportError {
        TransportError::Io {
            port: self.port_name.clone(),
            reason: reason.to_string(),
        }
    }

    fn ensure_readable(&self) -> Result<(), TransportError> {
        if !self.open {
            return Err(TransportError::Closed);
        }
        if self.state.lock().fail_reads {
            return Err(self.io_error("simulated read failure"));
        }
        Ok(())
    }

    /// Move every queued inbound chunk into `pending`
    fn fill_pending(&mut self) {
        let mut state = self.state.lock();
        while let Some(chunk) = state.inbound.pop_front() {
            self.pending.push_str(&chunk);
        }
    }
}

#[async_trait]
impl Transport for VirtualTransport {
    fn port_name(&self) -> &str {
        &self.port_name
    }

    async fn open(&mut self, params: &ConnectionParams) -> Result<(), ConnectionError> {
        params.validate()?;
        let mut state = self.state.lock();
        if state.fail_open {
            return Err(ConnectionError::FailedToOpen {
                port: params.port.clone(),
                reason: "simulated open failure".to_string(),
            });
        }
        if self.open {
            return Err(ConnectionError::PortInUse {
                port: self.port_name.clone(),
            });
        }
        state.open_count += 1;
        drop(state);

        self.port_name = params.port.clone();
        self.open = true;
        Ok(())
    }

    async fn close(&mut self) {
        self.open = false;
        self.pending.clear();
    }

    fn is_open(&self) -> bool {
        self.open
    }

    fn is_readable(&mut self) -> Result<bool, TransportError> {
        self.ensure_readable()?;
        Ok(!self.pending.is_empty() || !self.state.lock().inbound.is_empty())
    }

    async fn write_line(&mut self, line: &str) -> Result<(), TransportError> {
        if !self.open {
            return Err(TransportError::Closed);
        }
        if self.state.lock().fail_writes {
            return Err(self.io_error("simulated write failure"));
        }

        let replies = match self.responder.as_mut() {
            Some(responder) => responder(line),
            None => Vec::new(),
        };

        let mut state = self.state.lock();
        state.written.push(line.to_string());
        for reply in replies {
            state.inbound.push_back(format!("{}\n", reply));
        }
        Ok(())
    }

    async fn read_available(&mut self) -> Result<String, TransportError> {
        self.ensure_readable()?;
        self.fill_pending();
        Ok(std::mem::take(&mut self.pending))
    }

    async fn read_line(&mut self, timeout: Duration) -> Result<String, TransportError> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            self.ensure_readable()?;
            self.fill_pending();
            if let Some(pos) = self.pending.find('\n') {
                let line = self.pending[..pos].trim_end_matches('\r').to_string();
                self.pending.drain(..=pos);
                return Ok(line);
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(TransportError::Timeout {
                    timeout_ms: timeout.as_millis() as u64,
                });
            }
            tokio::time::sleep(LINE_POLL_DELAY).await;
        }
    }
}
