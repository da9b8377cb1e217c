//! # MarlinKit Core
//!
//! Core types shared by the MarlinKit crates: the error taxonomy, the
//! telemetry data model, and the per-session event bus.

pub mod data;
pub mod error;
pub mod event_bus;

pub use data::{AxisValue, BedLevelGrid, PidDomain, PrintHistoryEntry, TelemetryFact};

pub use error::{ConnectionError, Error, ProtocolError, Result, TransportError, UploadError};

pub use event_bus::{
    CommunicationEvent, ConnectionEvent, DetachReason, ErrorEvent, ErrorSeverity, EventBus,
    EventBusConfig, EventBusError, EventCategory, EventFilter, LinkEvent, PrintEvent,
    SessionEvent, SubscriptionId, UploadEvent, UploadProgress,
};
