//! Headless printer monitor
//!
//! `marlinkit [config.toml]` attaches every configured printer, logs its
//! events and detaches on Ctrl-C.

use anyhow::Context;
use marlinkit::{
    connection_params, init_logging, list_port_names, session_config, EngineConfig,
    EventCategory, EventFilter, SerialTransport, SessionEvent, SessionManager, BUILD_DATE,
    VERSION,
};
use std::path::PathBuf;

fn log_event(printer: &str, event: &SessionEvent) {
    match event.category() {
        EventCategory::Error => tracing::warn!("[{}] {}", printer, event.description()),
        EventCategory::Communication => tracing::trace!("[{}] {}", printer, event.description()),
        EventCategory::Telemetry => tracing::debug!("[{}] {}", printer, event.description()),
        _ => tracing::info!("[{}] {}", printer, event.description()),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging()?;
    tracing::info!("MarlinKit {} (built {})", VERSION, BUILD_DATE);

    let path = std::env::args_os().nth(1).map(PathBuf::from);
    let config =
        EngineConfig::load_or_default(path.as_deref()).context("Failed to load configuration")?;

    if config.printers.is_empty() {
        match list_port_names() {
            Ok(ports) if !ports.is_empty() => {
                tracing::warn!("No printers configured. Available ports: {}", ports.join(", "))
            }
            Ok(_) => tracing::warn!("No printers configured and no ports found"),
            Err(e) => tracing::warn!("No printers configured; port listing failed: {}", e),
        }
        return Ok(());
    }

    let manager = SessionManager::new(session_config(&config));
    for printer in &config.printers {
        let params = connection_params(&config, printer);
        let transport = Box::new(SerialTransport::new(params.port.clone()));
        let session = match manager.create(transport, params) {
            Ok(session) => session,
            Err(e) => {
                tracing::error!("Skipping {}: {}", printer.name, e);
                continue;
            }
        };

        let name = printer.name.clone();
        session.subscribe(EventFilter::All, move |event| log_event(&name, &event));

        if let Err(e) = session.connect().await {
            tracing::error!("Failed to attach {} on {}: {}", printer.name, printer.port, e);
            if let Err(e) = manager.detach(session.id()).await {
                tracing::debug!("Cleanup of {} failed: {}", printer.name, e);
            }
        }
    }

    if manager.is_empty() {
        anyhow::bail!("No printer could be attached");
    }
    tracing::info!("Monitoring {} printer(s); press Ctrl-C to stop", manager.len());

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;
    tracing::info!("Shutting down");
    manager.detach_all().await;
    Ok(())
}
