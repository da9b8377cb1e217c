//! Error handling for MarlinKit
//!
//! Errors are grouped by the layer that produces them:
//! - Connection errors (opening a printer link)
//! - Transport errors (I/O and timeouts on an open link)
//! - Protocol errors (unparseable firmware directives)
//! - Upload errors (SD transfer failures that are not protocol or I/O faults)
//!
//! All error types use `thiserror` for ergonomic error handling.

use thiserror::Error;

/// Connection error type
///
/// Raised while attaching to a printer. None of these leave a half-open link
/// behind.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConnectionError {
    /// Port not found
    #[error("Port not found: {port}")]
    PortNotFound {
        /// The name of the port that was not found.
        port: String,
    },

    /// Port is already in use
    #[error("Port already in use: {port}")]
    PortInUse {
        /// The name of the port that is in use.
        port: String,
    },

    /// Access to the port was denied by the operating system
    #[error("Permission denied opening {port}")]
    PermissionDenied {
        /// The name of the port.
        port: String,
    },

    /// Failed to open port
    #[error("Failed to open port {port}: {reason}")]
    FailedToOpen {
        /// The name of the port that failed to open.
        port: String,
        /// The reason the port failed to open.
        reason: String,
    },

    /// Invalid connection parameters
    #[error("Invalid connection parameters: {reason}")]
    InvalidParameters {
        /// The reason the parameters are invalid.
        reason: String,
    },

    /// Operation needs an open link
    #[error("Not connected")]
    NotConnected,

    /// Port is already attached to a session
    #[error("Port {port} is already attached")]
    AlreadyAttached {
        /// The port that is attached.
        port: String,
    },
}

/// Transport error type
///
/// `Io` degrades the link to broken; `Timeout` is recoverable and leaves
/// the link state untouched.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// Read or write failed on an open link
    #[error("I/O error on {port}: {reason}")]
    Io {
        /// Port the failure happened on.
        port: String,
        /// The reason for the failure.
        reason: String,
    },

    /// No complete line arrived within the wait bound
    #[error("Read timed out after {timeout_ms}ms")]
    Timeout {
        /// The timeout duration in milliseconds.
        timeout_ms: u64,
    },

    /// The link was closed
    #[error("Transport is closed")]
    Closed,
}

/// Protocol error type
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// A resend directive did not carry a parseable line number
    #[error("Malformed resend directive: {response:?}")]
    MalformedResend {
        /// The raw firmware response.
        response: String,
    },

    /// Firmware asked for a line that was never part of the transfer
    #[error("Resend requested for line {line}, transfer has {total} lines")]
    ResendOutOfRange {
        /// The requested line number.
        line: usize,
        /// Number of lines in the transfer.
        total: usize,
    },

    /// Firmware keeps asking for a line that already used its attempts
    #[error("Firmware still requests line {line} after it failed")]
    ResendLoop {
        /// The line the firmware is stuck on.
        line: usize,
    },

    /// More frames were written than every line's attempts allow
    #[error("Transfer stalled after {frames} frames for {total} lines")]
    TransferStalled {
        /// Frames written so far.
        frames: usize,
        /// Number of lines in the transfer.
        total: usize,
    },
}

/// Upload error type
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum UploadError {
    /// Source file does not exist
    #[error("File not found: {path}")]
    FileNotFound {
        /// The missing path.
        path: String,
    },

    /// Source file could not be read
    #[error("Failed to read {path}: {reason}")]
    ReadFailed {
        /// The path being read.
        path: String,
        /// The reason for the failure.
        reason: String,
    },

    /// The transfer was aborted by the caller
    #[error("Upload of {file_name} cancelled at line {line}")]
    Cancelled {
        /// Target file name on the printer.
        file_name: String,
        /// Last line number sent.
        line: usize,
    },

    /// Another transfer is already running on this link
    #[error("An upload is already in progress")]
    AlreadyRunning,
}

/// Main error type for MarlinKit
///
/// A unified error type that can represent any error from all layers.
#[derive(Error, Debug)]
pub enum Error {
    /// Connection error
    #[error(transparent)]
    Connection(#[from] ConnectionError),

    /// Transport error
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Protocol error
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// Upload error
    #[error(transparent)]
    Upload(#[from] UploadError),

    /// Standard I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create an error from a string message
    pub fn other(msg: impl Into<String>) -> Self {
        Error::Other(msg.into())
    }

    /// Check if this is a timeout error
    pub fn is_timeout(&self) -> bool {
        matches!(self, Error::Transport(TransportError::Timeout { .. }))
    }

    /// Check if this is a connection error
    pub fn is_connection_error(&self) -> bool {
        matches!(self, Error::Connection(_))
    }

    /// Check if this is a protocol error
    pub fn is_protocol_error(&self) -> bool {
        matches!(self, Error::Protocol(_))
    }

    /// Check if this error means the link itself is dead.
    ///
    /// Only transport I/O failures end a session's poll loop.
    pub fn is_link_fatal(&self) -> bool {
        matches!(
            self,
            Error::Transport(TransportError::Io { .. } | TransportError::Closed)
        )
    }
}

/// Result type using Error
pub type Result<T> = std::result::Result<T, Error>;
