//! Data models shared between the link engine and its subscribers
//!
//! This module provides:
//! - Typed telemetry facts decoded from firmware output
//! - Bed-leveling grids
//! - Print history records handed to persistence collaborators

mod history;
mod telemetry;

pub use history::PrintHistoryEntry;
pub use telemetry::{AxisValue, BedLevelGrid, PidDomain, TelemetryFact};
