//! Event type definitions for the session event bus.
//!
//! Events are cloneable and serializable so subscribers can log or replay them.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::data::{PrintHistoryEntry, TelemetryFact};

/// Root event enum for everything a session publishes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SessionEvent {
    /// Link attach/detach
    Connection(ConnectionEvent),
    /// Busy/idle transitions
    Link(LinkEvent),
    /// Decoded telemetry
    Telemetry(TelemetryFact),
    /// Raw line traffic
    Communication(CommunicationEvent),
    /// SD upload progress
    Upload(UploadEvent),
    /// SD print progress
    Print(PrintEvent),
    /// Error and diagnostic events
    Error(ErrorEvent),
}

impl SessionEvent {
    /// Get the category of this event
    pub fn category(&self) -> EventCategory {
        match self {
            SessionEvent::Connection(_) => EventCategory::Connection,
            SessionEvent::Link(_) => EventCategory::Link,
            SessionEvent::Telemetry(_) => EventCategory::Telemetry,
            SessionEvent::Communication(_) => EventCategory::Communication,
            SessionEvent::Upload(_) => EventCategory::Upload,
            SessionEvent::Print(_) => EventCategory::Print,
            SessionEvent::Error(_) => EventCategory::Error,
        }
    }

    /// Get a short description of this event for logging
    pub fn description(&self) -> String {
        match self {
            SessionEvent::Connection(e) => e.description(),
            SessionEvent::Link(e) => e.description(),
            SessionEvent::Telemetry(fact) => format!("Telemetry: {:?}", fact),
            SessionEvent::Communication(e) => e.description(),
            SessionEvent::Upload(e) => e.description(),
            SessionEvent::Print(e) => e.description(),
            SessionEvent::Error(e) => e.description(),
        }
    }
}

/// Event category for filtering
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventCategory {
    /// Attach/detach events.
    Connection,
    /// Busy/idle events.
    Link,
    /// Decoded telemetry facts.
    Telemetry,
    /// Raw line traffic.
    Communication,
    /// SD upload events.
    Upload,
    /// SD print progress events.
    Print,
    /// Error and diagnostic events.
    Error,
}

impl std::fmt::Display for EventCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EventCategory::Connection => write!(f, "Connection"),
            EventCategory::Link => write!(f, "Link"),
            EventCategory::Telemetry => write!(f, "Telemetry"),
            EventCategory::Communication => write!(f, "Communication"),
            EventCategory::Upload => write!(f, "Upload"),
            EventCategory::Print => write!(f, "Print"),
            EventCategory::Error => write!(f, "Error"),
        }
    }
}

/// Reason for detaching
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DetachReason {
    /// Caller requested disconnect
    UserRequested,
    /// Transport failed while polling
    TransportFailed(String),
}

/// Connection-related events
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ConnectionEvent {
    /// Link opened.
    Attached {
        /// Port that was opened.
        port: String,
        /// Baud rate in use.
        baud_rate: u32,
    },
    /// Link closed.
    Detached {
        /// Port that was closed.
        port: String,
        /// Why it closed.
        reason: DetachReason,
    },
}

impl ConnectionEvent {
    fn description(&self) -> String {
        match self {
            ConnectionEvent::Attached { port, baud_rate } => {
                format!("Attached to {} at {} baud", port, baud_rate)
            }
            ConnectionEvent::Detached { port, reason } => {
                format!("Detached from {}: {:?}", port, reason)
            }
        }
    }
}

/// Busy/idle transitions driven by the firmware's busy marker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LinkEvent {
    /// Firmware reported it is processing.
    Busy,
    /// Debounce window elapsed without another busy marker.
    Idle,
}

impl LinkEvent {
    fn description(&self) -> String {
        match self {
            LinkEvent::Busy => "Printer busy".to_string(),
            LinkEvent::Idle => "Printer idle".to_string(),
        }
    }
}

/// Raw line traffic
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CommunicationEvent {
    /// A line was written to the printer.
    LineSent {
        /// Line text without terminator.
        line: String,
    },
    /// A line was read from the printer.
    LineReceived {
        /// Line text without terminator.
        line: String,
    },
}

impl CommunicationEvent {
    fn description(&self) -> String {
        match self {
            CommunicationEvent::LineSent { line } => format!(">> {}", line),
            CommunicationEvent::LineReceived { line } => format!("<< {}", line),
        }
    }
}

/// Progress snapshot published after every uploaded line
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadProgress {
    /// Target file name on the printer
    pub file_name: String,
    /// 1-based wire line number just acknowledged
    pub line: usize,
    /// Number of lines in the transfer
    pub total_lines: usize,
    /// Percent complete, one decimal place
    pub percent: f64,
    /// Time since the transfer started
    pub elapsed: Duration,
    /// Estimated time to completion
    pub remaining: Duration,
}

/// SD upload events
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum UploadEvent {
    /// Transfer began.
    Started {
        /// Target file name on the printer.
        file_name: String,
        /// Lines to send.
        total_lines: usize,
    },
    /// A line was acknowledged.
    Progress(UploadProgress),
    /// Firmware requested a line again.
    ResendRequested {
        /// Requested line number.
        line: usize,
    },
    /// A line exhausted its retries; the transfer continued.
    LineFailed {
        /// Line number that failed.
        line: usize,
        /// Attempts made.
        attempts: u32,
    },
    /// Transfer completed.
    Finished {
        /// Target file name on the printer.
        file_name: String,
        /// Number of lines in the file.
        lines: usize,
        /// Resend directives honoured.
        resends: usize,
        /// Lines that exhausted their retries.
        failed_lines: usize,
        /// Total transfer time.
        elapsed: Duration,
    },
    /// Transfer aborted.
    Aborted {
        /// Target file name on the printer.
        file_name: String,
        /// Why it aborted.
        reason: String,
    },
}

impl UploadEvent {
    fn description(&self) -> String {
        match self {
            UploadEvent::Started {
                file_name,
                total_lines,
            } => format!("Upload of {} started ({} lines)", file_name, total_lines),
            UploadEvent::Progress(p) => format!(
                "Upload {}: line {}/{} ({:.1}%)",
                p.file_name, p.line, p.total_lines, p.percent
            ),
            UploadEvent::ResendRequested { line } => format!("Resend requested: {}", line),
            UploadEvent::LineFailed { line, attempts } => {
                format!("Line {} failed after {} attempts", line, attempts)
            }
            UploadEvent::Finished {
                file_name,
                lines,
                elapsed,
                ..
            } => format!(
                "Upload of {} finished: {} lines in {:.1}s",
                file_name,
                lines,
                elapsed.as_secs_f64()
            ),
            UploadEvent::Aborted { file_name, reason } => {
                format!("Upload of {} aborted: {}", file_name, reason)
            }
        }
    }
}

/// SD print progress events
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PrintEvent {
    /// A print job was picked up.
    Started {
        /// File being printed.
        file_name: String,
        /// File size in bytes.
        total_bytes: u64,
    },
    /// Byte progress advanced.
    Progress {
        /// Percent complete, rounded.
        percent: u8,
        /// Bytes consumed.
        current_bytes: u64,
        /// File size in bytes.
        total_bytes: u64,
        /// Estimated time remaining; zero until enough samples exist.
        remaining: Duration,
    },
    /// The job finalized. Published exactly once per job.
    Finished(PrintHistoryEntry),
}

impl PrintEvent {
    fn description(&self) -> String {
        match self {
            PrintEvent::Started {
                file_name,
                total_bytes,
            } => format!("Printing {} ({} bytes)", file_name, total_bytes),
            PrintEvent::Progress {
                percent, remaining, ..
            } => format!(
                "Print {}% ({}s remaining)",
                percent,
                remaining.as_secs()
            ),
            PrintEvent::Finished(entry) => format!("Print of {} finished", entry.file_name),
        }
    }
}

/// Error severity levels
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ErrorSeverity {
    /// Recoverable, no state change.
    Warning,
    /// Failed operation; the link is still usable.
    Error,
    /// The link is gone.
    Critical,
}

/// Error and diagnostic events
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ErrorEvent {
    /// Warning (non-blocking).
    Warning {
        /// Warning code identifier.
        code: String,
        /// Human-readable warning message.
        message: String,
    },
    /// Error (the operation failed, the link survives).
    Error {
        /// Error code identifier.
        code: String,
        /// Human-readable error message.
        message: String,
    },
    /// Critical error (the link is gone).
    Critical {
        /// Critical error code identifier.
        code: String,
        /// Human-readable critical error message.
        message: String,
    },
}

impl ErrorEvent {
    fn description(&self) -> String {
        match self {
            ErrorEvent::Warning { code, message } => {
                format!("Warning [{}]: {}", code, message)
            }
            ErrorEvent::Error { code, message } => {
                format!("Error [{}]: {}", code, message)
            }
            ErrorEvent::Critical { code, message } => {
                format!("Critical [{}]: {}", code, message)
            }
        }
    }

    /// Get the severity of this error event
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            ErrorEvent::Warning { .. } => ErrorSeverity::Warning,
            ErrorEvent::Error { .. } => ErrorSeverity::Error,
            ErrorEvent::Critical { .. } => ErrorSeverity::Critical,
        }
    }

    /// Build an event from an engine error, graded by what it means for the link
    pub fn from_error(code: &str, err: &crate::Error) -> Self {
        let message = err.to_string();
        let code = code.to_string();
        if err.is_link_fatal() {
            ErrorEvent::Critical { code, message }
        } else if err.is_timeout() {
            ErrorEvent::Warning { code, message }
        } else {
            ErrorEvent::Error { code, message }
        }
    }
}
