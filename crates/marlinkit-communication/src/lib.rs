//! # MarlinKit Communication
//!
//! Printer link engine for Marlin-dialect firmware: byte-stream transports,
//! the G-code command encoder, the checksummed SD upload protocol, telemetry
//! decoding, print progress tracking, and per-printer sessions.

pub mod communication;
pub mod firmware;
pub mod progress;
pub mod session;

pub use communication::{
    drain_lines,
    serial::{list_port_names, list_ports, SerialPortInfo, SerialTransport},
    virtual_port::{VirtualPortHandle, VirtualTransport},
    ConnectionParams, Transport, DEFAULT_BAUD_RATE,
};

pub use firmware::marlin::{
    decode, decode_buffer, decode_line, encode, encode_set_point, encode_verbatim,
    BedLevelCapture, CancelFlag, Command, FirmwareCapabilities, Instruction, LineUploader, Prefix,
    UploadConfig, UploadObserver, UploadSummary,
};

pub use progress::{JobTracker, PrintJobState, ProgressSample};

pub use session::{
    LinkState, Session, SessionConfig, SessionId, SessionManager, UploadHandle,
    DEFAULT_POLL_INTERVAL,
};
