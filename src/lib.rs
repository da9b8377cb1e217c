//! # MarlinKit
//!
//! A host-side link engine for Marlin-dialect 3D printers with support for:
//! - Serial links, plus an in-memory virtual port for simulation
//! - G-code command encoding from a closed instruction catalog
//! - Checksummed SD-card upload with resend handling
//! - Telemetry decoding, bed-level capture and print progress tracking
//!
//! ## Architecture
//!
//! MarlinKit is organized as a workspace with multiple crates:
//!
//! 1. **marlinkit-core** - Error taxonomy, telemetry data model, event bus
//! 2. **marlinkit-communication** - Transports, Marlin protocol, sessions
//! 3. **marlinkit-settings** - Engine configuration files
//! 4. **marlinkit** - Re-exports, logging setup and the headless monitor

pub mod engine;

pub use marlinkit_communication::{communication, firmware, progress, session};
pub use marlinkit_core::{data, event_bus};

pub use marlinkit_core::{
    BedLevelGrid, CommunicationEvent, ConnectionError, ConnectionEvent, DetachReason, Error,
    ErrorEvent, EventBus, EventCategory, EventFilter, LinkEvent, PrintEvent, PrintHistoryEntry,
    ProtocolError, Result, SessionEvent, SubscriptionId, TelemetryFact, TransportError,
    UploadError, UploadEvent, UploadProgress,
};

pub use marlinkit_communication::{
    list_port_names, list_ports, BedLevelCapture, CancelFlag, Command, ConnectionParams,
    FirmwareCapabilities, Instruction, JobTracker, LinkState, PrintJobState, SerialPortInfo,
    SerialTransport, Session, SessionConfig, SessionId, SessionManager, Transport, UploadConfig,
    UploadHandle, UploadSummary, VirtualPortHandle, VirtualTransport,
};

pub use marlinkit_settings::{EngineConfig, PrinterProfile, SettingsError};

pub use engine::{connection_params, session_config, upload_config};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Build date (set at compile time)
pub const BUILD_DATE: &str = env!("BUILD_DATE");

/// Environment variable selecting the log output format
pub const LOG_FORMAT_ENV: &str = "MARLINKIT_LOG_FORMAT";

/// Initialize logging with the default configuration
///
/// Sets up structured logging with:
/// - Console output, human readable, or JSON lines when
///   `MARLINKIT_LOG_FORMAT=json`
/// - RUST_LOG environment variable support, `info` by default
/// - UTC timestamps
pub fn init_logging() -> anyhow::Result<()> {
    use tracing_subscriber::fmt;
    use tracing_subscriber::prelude::*;
    use tracing_subscriber::EnvFilter;

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(tracing::Level::INFO.to_string()));

    let json = std::env::var(LOG_FORMAT_ENV).is_ok_and(|v| v.eq_ignore_ascii_case("json"));
    if json {
        let fmt_layer = fmt::layer()
            .json()
            .with_writer(std::io::stdout)
            .with_target(true)
            .with_level(true)
            .with_thread_names(true)
            .with_current_span(false);

        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt_layer)
            .try_init()?;
    } else {
        let fmt_layer = fmt::layer()
            .with_writer(std::io::stdout)
            .with_target(true)
            .with_level(true)
            .with_thread_ids(true)
            .with_thread_names(true)
            .with_line_number(true);

        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt_layer)
            .try_init()?;
    }

    Ok(())
}
