//! Firmware dialects
//!
//! Supported firmware:
//! - Marlin: G-code dialect used by most FDM printer boards

pub mod marlin;

pub use marlin::{BedLevelCapture, Command, FirmwareCapabilities, Instruction, Prefix};
