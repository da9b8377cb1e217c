//! Conversions from file configuration to the runtime types sessions use

use marlinkit_communication::{ConnectionParams, SessionConfig, UploadConfig};
use marlinkit_settings::{EngineConfig, PrinterProfile, UploadSettings};

/// Upload tuning for sessions
pub fn upload_config(settings: &UploadSettings) -> UploadConfig {
    UploadConfig {
        max_retries: settings.max_retries,
        ack_timeout: settings.ack_timeout(),
        file_extension: settings.file_extension.clone(),
    }
}

/// Session configuration shared by every configured printer
pub fn session_config(config: &EngineConfig) -> SessionConfig {
    let session = &config.session;
    SessionConfig {
        poll_interval: session.poll_interval(),
        busy_debounce: session.busy_debounce(),
        temperature_report_interval: session.temperature_report_interval_s,
        sd_status_interval: session.sd_status_interval_s,
        query_capabilities_on_attach: session.query_capabilities_on_attach,
        event_capacity: session.event_capacity,
        upload: upload_config(&config.upload),
    }
}

/// Link parameters for one printer
pub fn connection_params(config: &EngineConfig, printer: &PrinterProfile) -> ConnectionParams {
    ConnectionParams::new(
        printer.port.clone(),
        printer.baud_rate_or(config.connection.baud_rate),
    )
}
