//! MarlinKit Settings Crate
//!
//! Engine configuration: file loading and saving (TOML or JSON), validation,
//! and the platform default location.

pub mod config;
pub mod error;

pub use config::{
    default_config_path, ConnectionSettings, EngineConfig, PrinterProfile, SessionSettings,
    UploadSettings,
};
pub use error::{ConfigError, ConfigResult, SettingsError, SettingsResult};
