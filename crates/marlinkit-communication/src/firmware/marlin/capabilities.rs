//! Firmware capability record built from `M115` output

use marlinkit_core::TelemetryFact;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Capabilities reported by the firmware
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FirmwareCapabilities {
    /// `FIRMWARE_NAME` value
    pub firmware_name: Option<String>,
    /// Capability flags keyed by name
    pub flags: BTreeMap<String, bool>,
}

impl FirmwareCapabilities {
    /// Create an empty record
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold a fact into the record; returns true if it changed anything
    pub fn apply(&mut self, fact: &TelemetryFact) -> bool {
        match fact {
            TelemetryFact::CapabilityFlag { name, enabled } => {
                self.flags.insert(name.clone(), *enabled) != Some(*enabled)
            }
            TelemetryFact::FirmwareName { name } => {
                let changed = self.firmware_name.as_deref() != Some(name.as_str());
                self.firmware_name = Some(name.clone());
                changed
            }
            _ => false,
        }
    }

    /// Whether a capability is reported and enabled
    pub fn supports(&self, name: &str) -> bool {
        self.flags.get(name).copied().unwrap_or(false)
    }

    /// Temperature auto-report (`M155`)
    pub fn supports_temperature_autoreport(&self) -> bool {
        self.supports("AUTOREPORT_TEMP")
    }

    /// SD status auto-report (`M27 S`)
    pub fn supports_sd_autoreport(&self) -> bool {
        self.supports("AUTOREPORT_SD_STATUS")
    }

    /// Host keepalive busy messages
    pub fn supports_busy_protocol(&self) -> bool {
        self.supports("BUSY_PROTOCOL")
    }

    /// True once anything has been reported
    pub fn is_known(&self) -> bool {
        self.firmware_name.is_some() || !self.flags.is_empty()
    }
}
