//! Shared fixtures for the Marlin integration tests

use marlinkit_communication::{
    ConnectionParams, Session, SessionConfig, Transport, VirtualPortHandle, VirtualTransport,
};
use marlinkit_core::{EventFilter, SessionEvent};
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::time::Instant;

pub const PORT: &str = "/dev/ttyVIRT0";

pub fn params() -> ConnectionParams {
    ConnectionParams::new(PORT, 115_200)
}

/// Open a virtual port that answers every write through `responder`
pub async fn open_virtual<F>(responder: F) -> (VirtualTransport, VirtualPortHandle)
where
    F: FnMut(&str) -> Vec<String> + Send + 'static,
{
    let (transport, handle) = VirtualTransport::new(PORT);
    let mut transport = transport.with_responder(responder);
    transport
        .open(&params())
        .await
        .expect("virtual port opens");
    (transport, handle)
}

/// Firmware that acknowledges everything
pub fn always_ok(_line: &str) -> Vec<String> {
    vec!["ok".to_string()]
}

/// Line number of a checksummed frame, `None` for plain commands
pub fn frame_number(line: &str) -> Option<usize> {
    line.strip_prefix('N')?.split(' ').next()?.parse().ok()
}

/// Line numbers of every frame written, in order
pub fn frame_numbers(written: &[String]) -> Vec<usize> {
    written.iter().filter_map(|l| frame_number(l)).collect()
}

/// Session config that writes nothing on attach
pub fn quiet_config() -> SessionConfig {
    SessionConfig {
        query_capabilities_on_attach: false,
        ..SessionConfig::default()
    }
}

/// A session over a virtual port, already connected
pub async fn attached_session<F>(
    config: SessionConfig,
    responder: F,
) -> (Session, VirtualPortHandle)
where
    F: FnMut(&str) -> Vec<String> + Send + 'static,
{
    let (transport, handle) = VirtualTransport::new(PORT);
    let transport = transport.with_responder(responder);
    let session = Session::new(Box::new(transport), params(), config);
    session.connect().await.expect("session attaches");
    (session, handle)
}

/// Events seen by a handler, with the time they were published
pub type EventLog = Arc<Mutex<Vec<(Instant, SessionEvent)>>>;

/// Subscribe a handler that records every event matching `filter`
pub fn record(session: &Session, filter: EventFilter) -> EventLog {
    let log: EventLog = Arc::new(Mutex::new(Vec::new()));
    let sink = log.clone();
    session.subscribe(filter, move |event| {
        sink.lock().push((Instant::now(), event));
    });
    log
}

/// Recorded events without timestamps
pub fn events(log: &EventLog) -> Vec<SessionEvent> {
    log.lock().iter().map(|(_, e)| e.clone()).collect()
}
