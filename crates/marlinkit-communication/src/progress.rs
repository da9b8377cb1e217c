//! Print progress tracking
//!
//! A [`PrintJobState`] keeps a bounded window of byte-progress samples and
//! derives percent complete and time remaining. [`JobTracker`] drives the
//! job lifecycle from decoded telemetry.

use chrono::{DateTime, Utc};
use marlinkit_core::{PrintEvent, PrintHistoryEntry, TelemetryFact};
use std::collections::VecDeque;
use std::time::Duration;

/// Samples kept per job; the oldest is dropped beyond this
pub const MAX_PROGRESS_SAMPLES: usize = 100;

/// Samples needed before a remaining-time estimate is made
pub const MIN_ESTIMATE_SAMPLES: usize = 5;

/// Bytes printed at a point in time
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgressSample {
    /// Bytes consumed by the firmware
    pub bytes_printed: u64,
    /// When the report was read
    pub timestamp: DateTime<Utc>,
}

/// Live state of one print job
#[derive(Debug, Clone, PartialEq)]
pub struct PrintJobState {
    file_name: String,
    total_bytes: u64,
    current_bytes: u64,
    started_at: DateTime<Utc>,
    finished_at: Option<DateTime<Utc>>,
    samples: VecDeque<ProgressSample>,
    is_printing: bool,
    finalized: bool,
}

impl PrintJobState {
    /// Start tracking a job
    pub fn new(file_name: impl Into<String>, total_bytes: u64, started_at: DateTime<Utc>) -> Self {
        Self {
            file_name: file_name.into(),
            total_bytes,
            current_bytes: 0,
            started_at,
            finished_at: None,
            samples: VecDeque::with_capacity(MAX_PROGRESS_SAMPLES),
            is_printing: true,
            finalized: false,
        }
    }

    /// File being printed
    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    /// File size in bytes
    pub fn total_bytes(&self) -> u64 {
        self.total_bytes
    }

    /// Bytes printed so far; zero once finalized
    pub fn current_bytes(&self) -> u64 {
        self.current_bytes
    }

    /// When the job was picked up
    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// When the job finalized
    pub fn finished_at(&self) -> Option<DateTime<Utc>> {
        self.finished_at
    }

    /// Whether the job is still running
    pub fn is_printing(&self) -> bool {
        self.is_printing
    }

    /// Whether the one-time finalize has run
    pub fn is_finalized(&self) -> bool {
        self.finalized
    }

    /// Recorded samples, oldest first
    pub fn samples(&self) -> impl Iterator<Item = &ProgressSample> {
        self.samples.iter()
    }

    /// Number of recorded samples
    pub fn sample_count(&self) -> usize {
        self.samples.len()
    }

    /// Byte count of the newest sample; kept after finalize
    pub fn last_sample_bytes(&self) -> Option<u64> {
        self.samples.back().map(|s| s.bytes_printed)
    }

    pub(crate) fn set_total_bytes(&mut self, total_bytes: u64) {
        self.total_bytes = total_bytes;
    }

    /// Record a progress report.
    ///
    /// Samples older than the newest one are rejected so the window stays
    /// in timestamp order.
    pub fn record_sample(&mut self, bytes_printed: u64, timestamp: DateTime<Utc>) {
        if self
            .samples
            .back()
            .is_some_and(|last| timestamp < last.timestamp)
        {
            tracing::warn!("Ignoring out-of-order progress sample for {}", self.file_name);
            return;
        }

        if self.samples.len() == MAX_PROGRESS_SAMPLES {
            self.samples.pop_front();
        }
        self.samples.push_back(ProgressSample {
            bytes_printed,
            timestamp,
        });
        self.current_bytes = bytes_printed;
    }

    /// Percent complete, rounded to the nearest whole number
    pub fn percent(&self) -> u8 {
        if self.total_bytes == 0 {
            return 0;
        }
        let percent = (self.current_bytes as f64 / self.total_bytes as f64 * 100.0).round();
        percent.clamp(0.0, 100.0) as u8
    }

    /// Estimated time to completion.
    ///
    /// Zero until [`MIN_ESTIMATE_SAMPLES`] samples exist, or when the
    /// observed rate is not positive.
    pub fn estimate_remaining(&self) -> Duration {
        if self.samples.len() < MIN_ESTIMATE_SAMPLES {
            return Duration::ZERO;
        }

        let (bytes, seconds) = self
            .samples
            .iter()
            .zip(self.samples.iter().skip(1))
            .fold((0.0_f64, 0.0_f64), |(bytes, seconds), (prev, next)| {
                let delta_bytes = next.bytes_printed as f64 - prev.bytes_printed as f64;
                let delta_secs =
                    (next.timestamp - prev.timestamp).num_milliseconds() as f64 / 1000.0;
                (bytes + delta_bytes, seconds + delta_secs)
            });

        if seconds <= 0.0 {
            return Duration::ZERO;
        }
        let rate = bytes / seconds;
        if !rate.is_finite() || rate <= 0.0 {
            return Duration::ZERO;
        }

        let last = self.samples.back().map_or(0, |s| s.bytes_printed);
        let remaining_bytes = self.total_bytes.saturating_sub(last) as f64;
        Duration::from_secs_f64(remaining_bytes / rate)
    }

    /// Finish the job.
    ///
    /// Returns the history entry the first time only; later calls are no-ops.
    pub fn finalize(&mut self, at: DateTime<Utc>) -> Option<PrintHistoryEntry> {
        if self.finalized {
            return None;
        }
        self.finalized = true;
        self.is_printing = false;
        self.finished_at = Some(at);
        self.current_bytes = 0;

        Some(PrintHistoryEntry {
            file_name: self.file_name.clone(),
            total_bytes: self.total_bytes,
            started_at: self.started_at,
            finished_at: at,
        })
    }
}

/// Drives print jobs from telemetry
#[derive(Debug, Clone, Default)]
pub struct JobTracker {
    job: Option<PrintJobState>,
}

impl JobTracker {
    /// Create a tracker with no job
    pub fn new() -> Self {
        Self::default()
    }

    /// Current or last job
    pub fn job(&self) -> Option<&PrintJobState> {
        self.job.as_ref()
    }

    /// Feed one fact; returns the print events it caused
    pub fn observe(&mut self, fact: &TelemetryFact, now: DateTime<Utc>) -> Vec<PrintEvent> {
        match fact {
            TelemetryFact::FileOpened { name, size } => {
                tracing::info!("Print job started: {} ({} bytes)", name, size);
                self.job = Some(PrintJobState::new(name.clone(), *size, now));
                vec![PrintEvent::Started {
                    file_name: name.clone(),
                    total_bytes: *size,
                }]
            }
            TelemetryFact::PrintByteProgress { current, total } => {
                self.on_progress(*current, *total, now)
            }
            TelemetryFact::PrintDone => self.finish(now).into_iter().collect(),
            _ => Vec::new(),
        }
    }

    fn on_progress(&mut self, current: u64, total: u64, now: DateTime<Utc>) -> Vec<PrintEvent> {
        let mut events = Vec::new();

        let needs_new_job = match &self.job {
            None => true,
            // A finished job keeps reporting near its last byte count; a
            // different file size or a report behind the last sample means
            // a new print began.
            Some(job) => {
                job.is_finalized()
                    && (total != job.total_bytes()
                        || current < job.last_sample_bytes().unwrap_or(total))
            }
        };
        if needs_new_job {
            tracing::info!("Print job detected from progress report ({} bytes)", total);
            self.job = Some(PrintJobState::new(String::new(), total, now));
            events.push(PrintEvent::Started {
                file_name: String::new(),
                total_bytes: total,
            });
        }

        let Some(job) = self.job.as_mut() else {
            return events;
        };
        if job.is_finalized() {
            return events;
        }
        if job.total_bytes() != total {
            job.set_total_bytes(total);
        }

        job.record_sample(current, now);
        events.push(PrintEvent::Progress {
            percent: job.percent(),
            current_bytes: current,
            total_bytes: total,
            remaining: job.estimate_remaining(),
        });

        if job.percent() >= 100 {
            events.extend(self.finish(now));
        }
        events
    }

    fn finish(&mut self, now: DateTime<Utc>) -> Option<PrintEvent> {
        let entry = self.job.as_mut()?.finalize(now)?;
        tracing::info!("Print job finished: {}", entry.file_name);
        Some(PrintEvent::Finished(entry))
    }
}
