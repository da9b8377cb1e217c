use crate::support::{always_ok, quiet_config};
use marlinkit_communication::{
    ConnectionParams, SessionManager, VirtualPortHandle, VirtualTransport,
};
use marlinkit_core::{ConnectionError, Error, EventCategory, EventFilter, LinkEvent, SessionEvent};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

fn virtual_port(port: &str) -> (Box<VirtualTransport>, VirtualPortHandle, ConnectionParams) {
    let (transport, handle) = VirtualTransport::new(port);
    (
        Box::new(transport.with_responder(always_ok)),
        handle,
        ConnectionParams::new(port, 115_200),
    )
}

#[tokio::test(start_paused = true)]
async fn test_duplicate_port_rejected() {
    let manager = SessionManager::new(quiet_config());
    let (transport, _handle, params) = virtual_port("/dev/ttyACM0");
    manager.attach(transport, params).await.expect("first attach");

    let (transport, handle, params) = virtual_port("/dev/ttyACM0");
    let err = manager
        .attach(transport, params)
        .await
        .expect_err("port already attached");

    assert!(matches!(
        err,
        Error::Connection(ConnectionError::AlreadyAttached { .. })
    ));
    assert_eq!(handle.open_count(), 0);
    assert_eq!(manager.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_failed_attach_is_forgotten() {
    let manager = SessionManager::new(quiet_config());
    let (transport, handle, params) = virtual_port("/dev/ttyACM1");
    handle.set_fail_open(true);

    assert!(manager.attach(transport, params).await.is_err());
    assert!(manager.is_empty());

    let (transport, _handle, params) = virtual_port("/dev/ttyACM1");
    manager.attach(transport, params).await.expect("port is free again");
}

#[tokio::test(start_paused = true)]
async fn test_failed_link_releases_port() {
    let manager = SessionManager::new(quiet_config());
    let (transport, handle, params) = virtual_port("/dev/ttyACM2");
    let first = manager.attach(transport, params).await.expect("attach");

    handle.set_fail_reads(true);
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert!(!first.is_attached());

    let (transport, _handle, params) = virtual_port("/dev/ttyACM2");
    let second = manager.attach(transport, params).await.expect("reattach");
    assert_ne!(first.id(), second.id());
    assert!(manager.get(first.id()).is_none());
    assert_eq!(manager.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_sessions_are_independent() {
    let manager = SessionManager::new(quiet_config());
    let (transport, left_port, params) = virtual_port("/dev/ttyUSB0");
    let left = manager.create(transport, params).expect("create");
    let (transport, right_port, params) = virtual_port("/dev/ttyUSB1");
    let right = manager.create(transport, params).expect("create");

    let left_events = Arc::new(Mutex::new(Vec::new()));
    let sink = left_events.clone();
    left.subscribe(
        EventFilter::Categories(vec![EventCategory::Link]),
        move |event| sink.lock().push(event),
    );

    left.connect().await.expect("connect");
    right.connect().await.expect("connect");

    right_port.push_line("echo:busy: processing");
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert!(right.is_busy());
    assert!(!left.is_busy());
    assert!(left_events.lock().is_empty());

    left_port.push_line("echo:busy: processing");
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(
        *left_events.lock(),
        vec![SessionEvent::Link(LinkEvent::Busy)]
    );

    assert_eq!(
        manager.find_by_port("/dev/ttyUSB1").map(|s| s.id()),
        Some(right.id())
    );
}

#[tokio::test(start_paused = true)]
async fn test_detach_all() {
    let manager = SessionManager::new(quiet_config());
    let mut sessions = Vec::new();
    for port in ["/dev/ttyUSB0", "/dev/ttyUSB1", "/dev/ttyUSB2"] {
        let (transport, _handle, params) = virtual_port(port);
        sessions.push(manager.attach(transport, params).await.expect("attach"));
    }
    assert_eq!(manager.sessions().len(), 3);

    manager.detach_all().await;

    assert!(manager.is_empty());
    assert!(sessions.iter().all(|s| !s.is_attached()));
}

#[tokio::test(start_paused = true)]
async fn test_detach_unknown_session() {
    let manager = SessionManager::new(quiet_config());
    let (transport, _handle, params) = virtual_port("/dev/ttyUSB0");
    let session = manager.attach(transport, params).await.expect("attach");

    manager.detach(session.id()).await.expect("detach");
    assert!(!session.is_attached());
    assert!(matches!(
        manager.detach(session.id()).await,
        Err(Error::Connection(ConnectionError::NotConnected))
    ));
}
