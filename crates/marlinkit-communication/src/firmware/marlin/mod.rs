//! Marlin firmware support
//!
//! This module provides:
//! - The instruction catalog and command encoder
//! - The checksummed SD upload protocol
//! - Telemetry decoding and bed-level capture
//! - A capability record built from `M115`

pub mod bed_level;
pub mod capabilities;
pub mod command;
pub mod instructions;
pub mod telemetry;
pub mod upload;

pub use bed_level::BedLevelCapture;
pub use capabilities::FirmwareCapabilities;
pub use command::{encode, encode_set_point, encode_verbatim, Command};
pub use instructions::{Instruction, Prefix};
pub use telemetry::{decode, decode_buffer, decode_line, is_busy_marker, BUSY_MARKER};
pub use upload::{
    checksum, clean_source, frame_line, parse_resend, target_file_name, upload_percent,
    CancelFlag, LineUploader, UploadConfig, UploadObserver, UploadSummary,
};
