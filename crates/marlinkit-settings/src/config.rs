//! Engine configuration for MarlinKit
//!
//! Configuration is organized into logical sections:
//! - Connection defaults (baud rate)
//! - Session behaviour (polling, busy debounce, auto-reports)
//! - Upload protocol tuning (retries, acknowledgement timeout)
//! - Printer profiles, one per link
//!
//! Files may be TOML or JSON; the format follows the file extension.

use crate::error::{ConfigError, SettingsError, SettingsResult};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Connection defaults
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionSettings {
    /// Baud rate used when a profile does not name one
    pub baud_rate: u32,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self { baud_rate: 115200 }
    }
}

/// Session behaviour
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionSettings {
    /// How often each link is polled, in milliseconds
    pub poll_interval_ms: u64,
    /// Quiet time after the last busy marker, in milliseconds
    pub busy_debounce_ms: u64,
    /// Temperature auto-report period in seconds (`M155 S<n>`)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature_report_interval_s: Option<u32>,
    /// SD status auto-report period in seconds (`M27 S<n>`)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sd_status_interval_s: Option<u32>,
    /// Send `M115` when a link attaches
    pub query_capabilities_on_attach: bool,
    /// Capacity of each session's async event channel
    pub event_capacity: usize,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            poll_interval_ms: 100,
            busy_debounce_ms: 2000,
            temperature_report_interval_s: None,
            sd_status_interval_s: None,
            query_capabilities_on_attach: true,
            event_capacity: 1024,
        }
    }
}

impl SessionSettings {
    /// Poll interval as a duration
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Busy debounce window as a duration
    pub fn busy_debounce(&self) -> Duration {
        Duration::from_millis(self.busy_debounce_ms)
    }
}

/// SD upload tuning
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UploadSettings {
    /// Sends allowed per line before it is reported as failed
    pub max_retries: u32,
    /// Acknowledgement timeout in milliseconds
    pub ack_timeout_ms: u64,
    /// Extension given to files written to the SD card
    pub file_extension: String,
}

impl Default for UploadSettings {
    fn default() -> Self {
        Self {
            max_retries: 3,
            ack_timeout_ms: 5000,
            file_extension: "gco".to_string(),
        }
    }
}

impl UploadSettings {
    /// Acknowledgement timeout as a duration
    pub fn ack_timeout(&self) -> Duration {
        Duration::from_millis(self.ack_timeout_ms)
    }
}

/// One configured printer link
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrinterProfile {
    /// Display name, unique across profiles
    pub name: String,
    /// Serial port path
    pub port: String,
    /// Baud rate override
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub baud_rate: Option<u32>,
}

impl PrinterProfile {
    /// Create a profile using the default baud rate
    pub fn new(name: impl Into<String>, port: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            port: port.into(),
            baud_rate: None,
        }
    }

    /// Baud rate for this printer, falling back to `default`
    pub fn baud_rate_or(&self, default: u32) -> u32 {
        self.baud_rate.unwrap_or(default)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ConfigFormat {
    Toml,
    Json,
}

impl ConfigFormat {
    fn from_path(path: &Path) -> Result<Self, ConfigError> {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("toml") => Ok(Self::Toml),
            Some("json") => Ok(Self::Json),
            other => Err(ConfigError::UnsupportedFormat(
                other.unwrap_or("<none>").to_string(),
            )),
        }
    }
}

/// Complete engine configuration
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Connection defaults
    pub connection: ConnectionSettings,
    /// Session behaviour
    pub session: SessionSettings,
    /// Upload tuning
    pub upload: UploadSettings,
    /// Printer links
    pub printers: Vec<PrinterProfile>,
}

impl EngineConfig {
    /// Create new config with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Load config from file (JSON or TOML)
    pub fn load_from_file(path: &Path) -> SettingsResult<Self> {
        let format = ConfigFormat::from_path(path)?;
        let content = std::fs::read_to_string(path).map_err(|e| SettingsError::LoadError {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;

        let config: Self = match format {
            ConfigFormat::Json => serde_json::from_str(&content)?,
            ConfigFormat::Toml => toml::from_str(&content)?,
        };

        config.validate()?;
        tracing::info!(
            "Loaded configuration from {} ({} printers)",
            path.display(),
            config.printers.len()
        );
        Ok(config)
    }

    /// Load `path` if given, else the default location if a file exists
    /// there, else defaults
    pub fn load_or_default(path: Option<&Path>) -> SettingsResult<Self> {
        if let Some(path) = path {
            return Self::load_from_file(path);
        }
        match default_config_path() {
            Ok(path) if path.exists() => Self::load_from_file(&path),
            Ok(_) => Ok(Self::default()),
            Err(e) => {
                tracing::warn!("No configuration directory, using defaults: {}", e);
                Ok(Self::default())
            }
        }
    }

    /// Save config to file (JSON or TOML)
    pub fn save_to_file(&self, path: &Path) -> SettingsResult<()> {
        self.validate()?;

        let content = match ConfigFormat::from_path(path)? {
            ConfigFormat::Json => serde_json::to_string_pretty(self)?,
            ConfigFormat::Toml => toml::to_string_pretty(self)?,
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content).map_err(|e| SettingsError::SaveError {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;

        tracing::debug!("Saved configuration to {}", path.display());
        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.connection.baud_rate == 0 {
            return Err(out_of_range("connection.baud_rate", 0));
        }

        if self.session.poll_interval_ms == 0 {
            return Err(out_of_range("session.poll_interval_ms", 0));
        }
        if self.session.event_capacity == 0 {
            return Err(out_of_range("session.event_capacity", 0));
        }

        if self.upload.max_retries == 0 {
            return Err(out_of_range("upload.max_retries", 0));
        }
        if self.upload.ack_timeout_ms == 0 {
            return Err(out_of_range("upload.ack_timeout_ms", 0));
        }
        if self.upload.file_extension.trim_start_matches('.').is_empty() {
            return Err(ConfigError::MissingKey("upload.file_extension".to_string()));
        }

        let mut names = HashSet::new();
        let mut ports = HashSet::new();
        for printer in &self.printers {
            if printer.name.trim().is_empty() {
                return Err(ConfigError::MissingKey("printers.name".to_string()));
            }
            if printer.port.trim().is_empty() {
                return Err(ConfigError::MissingKey(format!(
                    "printers.{}.port",
                    printer.name
                )));
            }
            if printer.baud_rate == Some(0) {
                return Err(out_of_range(&format!("printers.{}.baud_rate", printer.name), 0));
            }
            if !names.insert(printer.name.as_str()) {
                return Err(ConfigError::DuplicatePrinter(printer.name.clone()));
            }
            if !ports.insert(printer.port.as_str()) {
                return Err(ConfigError::DuplicatePort {
                    port: printer.port.clone(),
                });
            }
        }

        Ok(())
    }

    /// Look up a printer profile by name
    pub fn printer(&self, name: &str) -> Option<&PrinterProfile> {
        self.printers.iter().find(|p| p.name == name)
    }
}

fn out_of_range(key: &str, value: impl ToString) -> ConfigError {
    ConfigError::ValueOutOfRange {
        key: key.to_string(),
        value: value.to_string(),
    }
}

/// Platform location of the configuration file
pub fn default_config_path() -> SettingsResult<PathBuf> {
    dirs::config_dir()
        .map(|dir| dir.join("marlinkit").join("config.toml"))
        .ok_or_else(|| {
            SettingsError::ConfigDirectory("platform has no configuration directory".to_string())
        })
}
