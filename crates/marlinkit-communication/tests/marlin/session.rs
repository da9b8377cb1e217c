use crate::support::{
    always_ok, attached_session, events, frame_numbers, params, quiet_config, record, PORT,
};
use marlinkit_communication::{LinkState, Session, SessionConfig, VirtualTransport};
use marlinkit_core::{
    CommunicationEvent, ConnectionError, ConnectionEvent, DetachReason, Error, ErrorEvent,
    EventCategory, EventFilter, LinkEvent, PrintEvent, SessionEvent, TelemetryFact, UploadError,
    UploadEvent,
};
use std::time::Duration;

const BUSY: &str = "echo:busy: processing";

fn silent(_line: &str) -> Vec<String> {
    Vec::new()
}

fn telemetry_only() -> EventFilter {
    EventFilter::Categories(vec![EventCategory::Telemetry])
}

#[tokio::test(start_paused = true)]
async fn test_busy_debounce_idles_after_quiet_window() {
    let config = quiet_config();
    let window = config.busy_debounce;
    let poll = config.poll_interval;
    let (session, handle) = attached_session(config, silent).await;
    let log = record(
        &session,
        EventFilter::Categories(vec![EventCategory::Link, EventCategory::Communication]),
    );

    handle.push_line(BUSY);
    tokio::time::sleep(Duration::from_millis(500)).await;
    assert_eq!(session.link_state(), LinkState::Busy);
    handle.push_line(BUSY);
    tokio::time::sleep(Duration::from_millis(1500)).await;
    assert!(session.is_busy());
    tokio::time::sleep(Duration::from_secs(3)).await;
    assert_eq!(session.link_state(), LinkState::Idle);

    let entries = log.lock().clone();
    let transitions: Vec<_> = entries
        .iter()
        .filter_map(|(at, e)| match e {
            SessionEvent::Link(link) => Some((*at, link.clone())),
            _ => None,
        })
        .collect();
    assert_eq!(transitions.len(), 2);
    assert_eq!(transitions[0].1, LinkEvent::Busy);
    assert_eq!(transitions[1].1, LinkEvent::Idle);

    let last_marker = entries
        .iter()
        .filter(|(_, e)| {
            matches!(e, SessionEvent::Communication(CommunicationEvent::LineReceived { line }) if line == BUSY)
        })
        .map(|(at, _)| *at)
        .last()
        .expect("marker received");
    let idle_at = transitions[1].0;
    assert!(idle_at - last_marker >= window);
    assert!(idle_at - last_marker < window + poll);
}

#[tokio::test(start_paused = true)]
async fn test_subscribers_see_telemetry_in_order() {
    let (session, handle) = attached_session(quiet_config(), silent).await;
    let first = record(&session, telemetry_only());
    let second = record(&session, telemetry_only());

    handle.push_lines([
        "ok T:210.00 /215.00 B:60.00 /60.00 @:127 B@:0",
        "X:1.00 Y:2.00 Z:3.00 E:0.00 Count X:80 Y:160 Z:1200",
    ]);
    tokio::time::sleep(Duration::from_millis(300)).await;

    let seen = events(&first);
    assert_eq!(seen, events(&second));
    let kinds: Vec<&str> = seen
        .iter()
        .map(|e| match e {
            SessionEvent::Telemetry(fact) => fact.kind(),
            _ => "other",
        })
        .collect();
    assert_eq!(kinds.len(), 3);
    assert!(matches!(
        seen[0],
        SessionEvent::Telemetry(TelemetryFact::HotendTemperature { current, target })
            if current == 210.0 && target == 215.0
    ));
    assert!(matches!(
        seen[1],
        SessionEvent::Telemetry(TelemetryFact::BedTemperature { target: Some(_), .. })
    ));
    assert!(matches!(
        seen[2],
        SessionEvent::Telemetry(TelemetryFact::Position { x, .. }) if x == 1.0
    ));
}

#[tokio::test(start_paused = true)]
async fn test_partial_lines_wait_for_terminator() {
    let (session, handle) = attached_session(quiet_config(), silent).await;
    let log = record(&session, telemetry_only());

    handle.push_raw("ok T:20");
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert!(log.lock().is_empty());

    handle.push_raw("0.00 /0.00\n");
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert!(matches!(
        events(&log)[..],
        [SessionEvent::Telemetry(TelemetryFact::HotendTemperature { current, .. })] if current == 200.0
    ));
}

#[tokio::test(start_paused = true)]
async fn test_attach_queries_capabilities() {
    let (transport, handle) = VirtualTransport::new(PORT);
    let transport = transport.with_responder(|line| {
        if line == "M115;" {
            vec![
                "FIRMWARE_NAME:Marlin 2.1.2 (Github) SOURCE_CODE_URL:github.com/MarlinFirmware/Marlin PROTOCOL_VERSION:1.0 MACHINE_TYPE:Ender-3".to_string(),
                "Cap:AUTOREPORT_TEMP:1".to_string(),
                "Cap:EEPROM:0".to_string(),
                "ok".to_string(),
            ]
        } else {
            vec!["ok".to_string()]
        }
    });
    let config = SessionConfig {
        temperature_report_interval: Some(2),
        ..SessionConfig::default()
    };
    let session = Session::new(Box::new(transport), params(), config);
    let mut rx = session.receiver();

    session.connect().await.expect("attach");
    assert_eq!(handle.written(), vec!["M115;", "M155 S2;"]);

    let attached = rx.recv().await.expect("event");
    assert_eq!(
        attached,
        SessionEvent::Connection(ConnectionEvent::Attached {
            port: PORT.to_string(),
            baud_rate: 115_200,
        })
    );
    let sent = rx.recv().await.expect("event");
    assert_eq!(
        sent,
        SessionEvent::Communication(CommunicationEvent::LineSent {
            line: "M115;".to_string()
        })
    );

    tokio::time::sleep(Duration::from_millis(300)).await;
    let caps = session.capabilities();
    assert_eq!(caps.firmware_name.as_deref(), Some("Marlin 2.1.2 (Github)"));
    assert!(caps.supports_temperature_autoreport());
    assert!(!caps.supports("EEPROM"));
}

#[tokio::test(start_paused = true)]
async fn test_connect_twice_is_rejected() {
    let (session, _handle) = attached_session(quiet_config(), silent).await;
    let err = session.connect().await.expect_err("already attached");
    assert!(matches!(
        err,
        Error::Connection(ConnectionError::AlreadyAttached { .. })
    ));
}

#[tokio::test(start_paused = true)]
async fn test_failed_open_leaves_session_detached() {
    let (transport, handle) = VirtualTransport::new(PORT);
    handle.set_fail_open(true);
    let session = Session::new(Box::new(transport), params(), quiet_config());

    assert!(session.connect().await.is_err());
    assert_eq!(session.link_state(), LinkState::Detached);
    assert!(matches!(
        session.send_raw("M105;").await,
        Err(Error::Connection(ConnectionError::NotConnected))
    ));
}

#[tokio::test(start_paused = true)]
async fn test_disconnect_publishes_user_detach() {
    let (session, handle) = attached_session(quiet_config(), silent).await;
    let log = record(&session, EventFilter::Categories(vec![EventCategory::Connection]));

    session.disconnect().await.expect("detach");
    session.disconnect().await.expect("second detach is a no-op");

    assert_eq!(
        events(&log),
        vec![SessionEvent::Connection(ConnectionEvent::Detached {
            port: PORT.to_string(),
            reason: DetachReason::UserRequested,
        })]
    );
    assert_eq!(session.link_state(), LinkState::Detached);

    handle.push_line(BUSY);
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert!(!session.is_busy());
}

#[tokio::test(start_paused = true)]
async fn test_read_failure_detaches_link() {
    let (session, handle) = attached_session(quiet_config(), silent).await;
    let log = record(&session, EventFilter::All);

    handle.push_line(BUSY);
    tokio::time::sleep(Duration::from_millis(300)).await;
    handle.set_fail_reads(true);
    tokio::time::sleep(Duration::from_millis(300)).await;

    let seen = events(&log);
    assert!(seen.iter().any(|e| matches!(
        e,
        SessionEvent::Error(ErrorEvent::Critical { code, .. }) if code == "TRANSPORT_FAILED"
    )));
    assert!(seen.iter().any(|e| matches!(
        e,
        SessionEvent::Connection(ConnectionEvent::Detached {
            reason: DetachReason::TransportFailed(_),
            ..
        })
    )));
    assert_eq!(session.link_state(), LinkState::Detached);
    assert!(session.last_error().is_some());

    let err = session.send_raw("M105;").await.expect_err("link is down");
    assert!(matches!(
        err,
        Error::Connection(ConnectionError::NotConnected)
    ));
}

#[tokio::test(start_paused = true)]
async fn test_write_failure_detaches_link() {
    let (session, handle) = attached_session(quiet_config(), silent).await;
    handle.set_fail_writes(true);

    let err = session
        .send_command(&marlinkit_communication::Command::report_temperatures())
        .await
        .expect_err("write fails");
    assert!(err.is_link_fatal());
    assert!(!session.is_attached());
}

#[tokio::test(start_paused = true)]
async fn test_send_command_publishes_line() {
    let (session, handle) = attached_session(quiet_config(), silent).await;
    let log = record(&session, EventFilter::Categories(vec![EventCategory::Communication]));

    session
        .send_command(&marlinkit_communication::Command::set_hotend_temperature(200.0))
        .await
        .expect("send");

    assert_eq!(handle.written(), vec!["M104 S200;"]);
    assert_eq!(
        events(&log),
        vec![SessionEvent::Communication(CommunicationEvent::LineSent {
            line: "M104 S200;".to_string()
        })]
    );
}

#[tokio::test(start_paused = true)]
async fn test_print_job_lifecycle() {
    let (session, handle) = attached_session(quiet_config(), silent).await;
    let log = record(&session, EventFilter::Categories(vec![EventCategory::Print]));

    handle.push_lines([
        "File opened: cube.gco Size: 2000",
        "File selected",
        "SD printing byte 1000/2000",
    ]);
    tokio::time::sleep(Duration::from_millis(300)).await;
    let job = session.job().expect("job running");
    assert!(job.is_printing());
    assert_eq!(job.percent(), 50);

    handle.push_lines(["Done printing file", "Done printing file"]);
    tokio::time::sleep(Duration::from_millis(300)).await;

    let seen = events(&log);
    assert_eq!(seen.len(), 3);
    assert!(matches!(
        &seen[0],
        SessionEvent::Print(PrintEvent::Started { file_name, total_bytes: 2000 }) if file_name == "cube.gco"
    ));
    assert!(matches!(
        seen[1],
        SessionEvent::Print(PrintEvent::Progress { percent: 50, .. })
    ));
    assert!(matches!(
        &seen[2],
        SessionEvent::Print(PrintEvent::Finished(entry)) if entry.file_name == "cube.gco"
    ));
    assert!(session.job().is_some_and(|j| j.is_finalized()));
}

#[tokio::test(start_paused = true)]
async fn test_bed_level_report_through_session() {
    let (session, handle) = attached_session(quiet_config(), silent).await;
    let log = record(&session, telemetry_only());

    handle.push_lines([
        "Bilinear Leveling Grid:",
        "0 1.000 1.200",
        "1 1.100 1.300",
        "X:0.00 Y:0.00 Z:0.00",
        "echo:Settings Stored",
    ]);
    tokio::time::sleep(Duration::from_millis(300)).await;

    let grids: Vec<_> = events(&log)
        .into_iter()
        .filter_map(|e| match e {
            SessionEvent::Telemetry(TelemetryFact::BedLevelGrid(grid)) => Some(grid),
            _ => None,
        })
        .collect();
    assert_eq!(grids.len(), 1);
    assert_eq!(grids[0].csv, "0,1.000,1.200\n1,1.100,1.300");
}

#[tokio::test(start_paused = true)]
async fn test_upload_publishes_progress() {
    let (session, handle) = attached_session(quiet_config(), always_ok).await;
    let log = record(&session, EventFilter::Categories(vec![EventCategory::Upload]));

    let summary = session
        .upload_text("cube.gcode", "G28\n; layer 1\nG1 X10 Y10\n")
        .await
        .expect("upload");

    assert_eq!(summary.file_name, "cube.gco");
    assert_eq!(summary.lines, 2);
    let written = handle.written();
    assert_eq!(written.first().map(String::as_str), Some("M110 N0;"));
    assert_eq!(written.get(1).map(String::as_str), Some("M28 cube.gco;"));
    assert_eq!(frame_numbers(&written), vec![1, 2]);
    assert_eq!(written.last().map(String::as_str), Some("M29;"));

    let seen = events(&log);
    assert!(matches!(
        &seen[0],
        SessionEvent::Upload(UploadEvent::Started { total_lines: 2, .. })
    ));
    let percents: Vec<f64> = seen
        .iter()
        .filter_map(|e| match e {
            SessionEvent::Upload(UploadEvent::Progress(p)) => Some(p.percent),
            _ => None,
        })
        .collect();
    assert_eq!(percents, vec![0.0, 100.0]);
    assert!(matches!(
        seen.last(),
        Some(SessionEvent::Upload(UploadEvent::Finished { lines: 2, resends: 0, .. }))
    ));
    assert!(session.is_attached());
}

#[tokio::test(start_paused = true)]
async fn test_upload_from_disk() {
    let (session, handle) = attached_session(quiet_config(), always_ok).await;
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("bracket.gcode");
    std::fs::write(&path, "G28\nG1 Z5\n").unwrap();

    let summary = session.upload_file(&path).await.expect("upload");
    assert_eq!(summary.file_name, "bracket.gco");
    assert_eq!(frame_numbers(&handle.written()), vec![1, 2]);
}

#[tokio::test(start_paused = true)]
async fn test_upload_missing_file_sends_nothing() {
    let (session, handle) = attached_session(quiet_config(), always_ok).await;
    let log = record(&session, EventFilter::Categories(vec![EventCategory::Error]));

    let err = session
        .upload_file("/nonexistent/part.gcode")
        .await
        .expect_err("missing file");

    assert!(matches!(
        err,
        Error::Upload(UploadError::FileNotFound { .. })
    ));
    assert!(handle.written().is_empty());
    assert!(matches!(
        &events(&log)[..],
        [SessionEvent::Error(ErrorEvent::Error { code, .. })] if code == "UPLOAD_SOURCE"
    ));
    assert!(session.is_attached());
}

#[tokio::test(start_paused = true)]
async fn test_second_upload_rejected_and_first_cancelled() {
    let (session, handle) = attached_session(quiet_config(), silent).await;
    let uploads = session.upload_handle();
    assert!(!uploads.is_running());

    let (first, second) = tokio::join!(session.upload_text("cube", "G28\nG1 X1\n"), async {
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(uploads.is_running());
        let second = session.upload_text("other", "G28\n").await;
        assert!(uploads.cancel());
        second
    });

    assert!(matches!(second, Err(Error::Upload(UploadError::AlreadyRunning))));
    assert!(matches!(
        first,
        Err(Error::Upload(UploadError::Cancelled { line: 1, .. }))
    ));
    assert_eq!(handle.written(), vec!["M110 N0;", "M28 cube.gco;", "M29;"]);
    assert!(!uploads.is_running());
    assert!(session.is_attached());
}

#[tokio::test(start_paused = true)]
async fn test_aborted_upload_task_still_stops_write() {
    let (session, handle) = attached_session(quiet_config(), silent).await;
    let session = std::sync::Arc::new(session);
    let uploads = session.upload_handle();

    let task = tokio::spawn({
        let session = session.clone();
        async move { session.upload_text("part", "G28\nG1 X1\n").await }
    });

    // Both header commands wait out the ack timeout before the first frame
    tokio::time::sleep(Duration::from_secs(11)).await;
    assert_eq!(frame_numbers(&handle.written()), vec![1]);

    task.abort();
    assert!(task.await.is_err_and(|e| e.is_cancelled()));
    tokio::time::sleep(Duration::from_millis(10)).await;

    let written = handle.written();
    assert_eq!(written.last().map(String::as_str), Some("M29;"));
    assert_eq!(written.iter().filter(|l| *l == "M29;").count(), 1);
    assert!(!uploads.is_running());
    assert!(session.is_attached());
}
