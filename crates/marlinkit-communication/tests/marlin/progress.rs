use chrono::{DateTime, TimeZone, Utc};
use marlinkit_communication::{JobTracker, PrintJobState};
use marlinkit_core::{PrintEvent, TelemetryFact};
use std::time::Duration;

fn at(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
}

fn progress(current: u64, total: u64) -> TelemetryFact {
    TelemetryFact::PrintByteProgress { current, total }
}

fn finished_count(events: &[PrintEvent]) -> usize {
    events
        .iter()
        .filter(|e| matches!(e, PrintEvent::Finished(_)))
        .count()
}

#[test]
fn test_estimate_uses_average_rate() {
    let mut job = PrintJobState::new("cube.gco", 8000, at(0));
    for i in 0..5 {
        job.record_sample(i * 1000, at(i as i64));
    }
    assert_eq!(job.estimate_remaining(), Duration::from_secs(4));
    assert_eq!(job.percent(), 50);
}

#[test]
fn test_estimate_needs_five_samples() {
    let mut job = PrintJobState::new("cube.gco", 8000, at(0));
    for i in 0..4 {
        job.record_sample(i * 1000, at(i as i64));
    }
    assert_eq!(job.estimate_remaining(), Duration::ZERO);
}

#[test]
fn test_finalize_is_idempotent() {
    let mut job = PrintJobState::new("cube.gco", 8000, at(0));
    job.record_sample(4000, at(10));

    let entry = job.finalize(at(20)).expect("first finalize");
    assert_eq!(entry.file_name, "cube.gco");
    assert_eq!(entry.duration(), chrono::Duration::seconds(20));
    assert_eq!(job.current_bytes(), 0);
    assert!(!job.is_printing());

    assert!(job.finalize(at(30)).is_none());
    assert_eq!(job.finished_at(), Some(at(20)));
}

#[test]
fn test_job_lifecycle_from_telemetry() {
    let mut tracker = JobTracker::new();
    let mut events = tracker.observe(
        &TelemetryFact::FileOpened {
            name: "cube.gco".to_string(),
            size: 2000,
        },
        at(0),
    );
    events.extend(tracker.observe(&progress(1000, 2000), at(5)));
    events.extend(tracker.observe(&TelemetryFact::PrintDone, at(10)));

    assert!(matches!(
        &events[0],
        PrintEvent::Started { file_name, total_bytes: 2000 } if file_name == "cube.gco"
    ));
    assert!(matches!(
        events[1],
        PrintEvent::Progress { percent: 50, current_bytes: 1000, .. }
    ));
    assert_eq!(finished_count(&events), 1);
    assert!(tracker.job().is_some_and(|j| j.is_finalized()));
}

#[test]
fn test_repeated_print_done_finishes_once() {
    let mut tracker = JobTracker::new();
    tracker.observe(&progress(100, 1000), at(0));

    let mut events = tracker.observe(&TelemetryFact::PrintDone, at(1));
    events.extend(tracker.observe(&TelemetryFact::PrintDone, at(2)));
    assert_eq!(finished_count(&events), 1);
}

#[test]
fn test_full_progress_then_print_done_finishes_once() {
    let mut tracker = JobTracker::new();
    let mut events = tracker.observe(&progress(500, 1000), at(0));
    events.extend(tracker.observe(&progress(1000, 1000), at(1)));
    events.extend(tracker.observe(&progress(1000, 1000), at(2)));
    events.extend(tracker.observe(&TelemetryFact::PrintDone, at(3)));
    assert_eq!(finished_count(&events), 1);
}

#[test]
fn test_progress_after_finish_starts_new_job() {
    let mut tracker = JobTracker::new();
    tracker.observe(&progress(1000, 1000), at(0));
    assert!(tracker.job().is_some_and(|j| j.is_finalized()));

    let events = tracker.observe(&progress(10, 3000), at(60));
    assert!(matches!(
        events[0],
        PrintEvent::Started { total_bytes: 3000, .. }
    ));
    let job = tracker.job().expect("new job");
    assert!(job.is_printing());
    assert_eq!(job.current_bytes(), 10);
}

#[test]
fn test_unrelated_facts_are_ignored() {
    let mut tracker = JobTracker::new();
    let events = tracker.observe(
        &TelemetryFact::FirmwareName {
            name: "Marlin".to_string(),
        },
        at(0),
    );
    assert!(events.is_empty());
    assert!(tracker.job().is_none());
}

#[test]
fn test_reports_past_rounded_finish_do_not_start_a_job() {
    let mut tracker = JobTracker::new();
    let mut events = tracker.observe(
        &TelemetryFact::FileOpened {
            name: "cube.gco".to_string(),
            size: 1_000_000,
        },
        at(0),
    );
    events.extend(tracker.observe(&progress(995_500, 1_000_000), at(10)));
    events.extend(tracker.observe(&progress(998_000, 1_000_000), at(12)));
    events.extend(tracker.observe(&TelemetryFact::PrintDone, at(14)));

    let started = events
        .iter()
        .filter(|e| matches!(e, PrintEvent::Started { .. }))
        .count();
    assert_eq!(started, 1);
    assert_eq!(finished_count(&events), 1);
    assert!(events.iter().all(|e| match e {
        PrintEvent::Finished(entry) => entry.file_name == "cube.gco",
        _ => true,
    }));
}

#[test]
fn test_reprint_of_same_file_starts_new_job() {
    let mut tracker = JobTracker::new();
    tracker.observe(&progress(1000, 1000), at(0));
    assert!(tracker.job().is_some_and(|j| j.is_finalized()));

    let events = tracker.observe(&progress(20, 1000), at(60));
    assert!(matches!(
        events[0],
        PrintEvent::Started { total_bytes: 1000, .. }
    ));
    assert!(tracker.job().is_some_and(|j| j.is_printing()));
}
