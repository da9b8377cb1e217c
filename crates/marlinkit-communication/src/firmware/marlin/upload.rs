//! Checksummed SD upload with resend recovery
//!
//! Wire sequence:
//!
//! ```text
//! M110 N0          reset line numbering
//! M28 <name>.gco   begin writing to the SD card
//! N1 <line>*<cs>   one frame per cleaned source line
//! ...
//! M29              stop writing (sent on every exit path)
//! ```
//!
//! The checksum is the XOR of every byte of `"N<i> <line>"`. The firmware may
//! answer any frame with `Resend: <n>`, after which the transfer continues
//! forward from line `n`. A line that used its attempts is skipped; if the
//! firmware keeps asking for it anyway the transfer is aborted.

use crate::communication::Transport;
use marlinkit_core::{Error, ProtocolError, Result, TransportError, UploadError, UploadProgress};
use regex::Regex;
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tokio::time::Instant;

use super::command::Command;

/// Attempts per line number before the line is reported as failed
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// How long to wait for the firmware to acknowledge a frame
pub const DEFAULT_ACK_TIMEOUT: Duration = Duration::from_secs(5);

/// Extension Marlin expects for files written over serial
pub const DEFAULT_FILE_EXTENSION: &str = "gco";

/// Upload tuning
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadConfig {
    /// Attempts per line number, first send included. A transfer writes at
    /// most `lines * max_retries` frames.
    pub max_retries: u32,
    /// Bound on waiting for `ok`
    pub ack_timeout: Duration,
    /// Extension given to the target file
    pub file_extension: String,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            ack_timeout: DEFAULT_ACK_TIMEOUT,
            file_extension: DEFAULT_FILE_EXTENSION.to_string(),
        }
    }
}

/// Strip comments and blank lines from G-code source.
///
/// Everything from the first `;` on a line is dropped, then the line is
/// trimmed; empty results are removed.
pub fn clean_source(source: &str) -> Vec<String> {
    source
        .lines()
        .map(|line| match line.find(';') {
            Some(pos) => &line[..pos],
            None => line,
        })
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

/// XOR of every byte in `text`
pub fn checksum(text: &str) -> u8 {
    text.bytes().fold(0, |acc, b| acc ^ b)
}

/// Build the numbered, checksummed frame for one line.
///
/// Stray `;` and `,` characters are removed from the payload first.
pub fn frame_line(number: usize, line: &str) -> String {
    let payload: String = line.chars().filter(|c| *c != ';' && *c != ',').collect();
    let body = format!("N{} {}", number, payload.trim());
    let cs = checksum(&body);
    format!("{}*{}", body, cs)
}

/// Name the file will get on the printer: the source stem plus `extension`
pub fn target_file_name(name: &str, extension: &str) -> String {
    let stem = Path::new(name)
        .file_stem()
        .and_then(|s| s.to_str())
        .filter(|s| !s.is_empty())
        .unwrap_or("upload");
    let extension = extension.trim_start_matches('.');
    format!("{}.{}", stem, extension)
}

/// Extract the line number from a `Resend:` directive
pub fn parse_resend(response: &str) -> std::result::Result<usize, ProtocolError> {
    static RESEND_REGEX: OnceLock<Regex> = OnceLock::new();
    let re = RESEND_REGEX
        .get_or_init(|| Regex::new(r"Resend:\s*(\d+)").expect("invalid regex pattern"));

    re.captures(response)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse::<usize>().ok())
        .ok_or_else(|| ProtocolError::MalformedResend {
            response: response.to_string(),
        })
}

/// Percent complete after acknowledging the zero-based line `index`,
/// rounded to one decimal place
pub fn upload_percent(index: usize, total: usize) -> f64 {
    if total <= 1 {
        return 100.0;
    }
    let percent = index as f64 / (total - 1) as f64 * 100.0;
    (percent * 10.0).round() / 10.0
}

/// Callbacks fired while a transfer runs
///
/// All methods default to no-ops.
pub trait UploadObserver: Send {
    /// A line was written to the link
    fn on_line_sent(&mut self, _line: &str) {}

    /// A line arrived that is not an acknowledgement
    fn on_unsolicited(&mut self, _line: &str) {}

    /// A frame was acknowledged
    fn on_progress(&mut self, _progress: &UploadProgress) {}

    /// The firmware asked for a line again
    fn on_resend(&mut self, _line: usize) {}

    /// A line used up its attempts; the transfer moves on
    fn on_line_failed(&mut self, _line: usize, _attempts: u32) {}
}

impl UploadObserver for () {}

/// Shared flag used to abort a running transfer
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    /// Create an unset flag
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Whether cancellation was requested
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Outcome of a completed transfer
#[derive(Debug, Clone, PartialEq)]
pub struct UploadSummary {
    /// Target file name on the printer
    pub file_name: String,
    /// Lines transferred
    pub lines: usize,
    /// Resend directives honoured
    pub resends: usize,
    /// Line numbers that exhausted their attempts
    pub failed_lines: Vec<usize>,
    /// Wall time from header to stop-write
    pub elapsed: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Ack {
    Ok,
    Resend(usize),
    Timeout,
}

/// Runs one transfer over an exclusively borrowed transport
pub struct LineUploader<'a> {
    transport: &'a mut dyn Transport,
    config: &'a UploadConfig,
    observer: &'a mut dyn UploadObserver,
    cancel: CancelFlag,
}

impl<'a> LineUploader<'a> {
    /// Create an uploader
    pub fn new(
        transport: &'a mut dyn Transport,
        config: &'a UploadConfig,
        observer: &'a mut dyn UploadObserver,
        cancel: CancelFlag,
    ) -> Self {
        Self {
            transport,
            config,
            observer,
            cancel,
        }
    }

    /// Transfer `lines` (already cleaned) into `file_name` on the SD card.
    ///
    /// `M29` is written after the transfer whatever its outcome.
    pub async fn run(mut self, file_name: &str, lines: &[String]) -> Result<UploadSummary> {
        let started = Instant::now();
        tracing::info!(
            "Uploading {} ({} lines) to {}",
            file_name,
            lines.len(),
            self.transport.port_name()
        );

        let result = self.transfer(file_name, lines, started).await;
        self.finish_write().await;
        let elapsed = started.elapsed();

        match result {
            Ok((resends, failed_lines)) => {
                tracing::info!(
                    "Upload of {} finished in {:.1}s ({} resends, {} failed lines)",
                    file_name,
                    elapsed.as_secs_f64(),
                    resends,
                    failed_lines.len()
                );
                Ok(UploadSummary {
                    file_name: file_name.to_string(),
                    lines: lines.len(),
                    resends,
                    failed_lines,
                    elapsed,
                })
            }
            Err(e) => {
                tracing::error!("Upload of {} aborted: {}", file_name, e);
                Err(e)
            }
        }
    }

    async fn transfer(
        &mut self,
        file_name: &str,
        lines: &[String],
        started: Instant,
    ) -> Result<(usize, Vec<usize>)> {
        let total = lines.len();
        self.send_header(file_name).await?;

        let mut cursor = 1usize;
        let mut attempts: HashMap<usize, u32> = HashMap::new();
        let mut resends = 0usize;
        let mut failed_lines = Vec::new();
        let mut frames = 0usize;
        let frame_budget = total.saturating_mul(self.config.max_retries.max(1) as usize);

        while cursor <= total {
            if self.cancel.is_cancelled() {
                tracing::warn!("Upload of {} cancelled at line {}", file_name, cursor);
                return Err(UploadError::Cancelled {
                    file_name: file_name.to_string(),
                    line: cursor,
                }
                .into());
            }

            if frames >= frame_budget {
                return Err(ProtocolError::TransferStalled { frames, total }.into());
            }

            let frame = frame_line(cursor, &lines[cursor - 1]);
            *attempts.entry(cursor).or_insert(0) += 1;
            frames += 1;
            self.send(&frame).await?;

            match self.await_ack().await? {
                Ack::Ok => {
                    let progress = progress_for(file_name, cursor, total, started.elapsed());
                    self.observer.on_progress(&progress);
                    cursor += 1;
                }
                Ack::Resend(line) => {
                    if line == 0 || line > total {
                        return Err(ProtocolError::ResendOutOfRange { line, total }.into());
                    }
                    if failed_lines.contains(&line) {
                        tracing::error!("Firmware still requests failed line {}", line);
                        return Err(ProtocolError::ResendLoop { line }.into());
                    }
                    tracing::debug!("Firmware requested resend of line {}", line);
                    resends += 1;
                    self.observer.on_resend(line);
                    cursor = self.next_after_retry(line, &attempts, &mut failed_lines);
                }
                Ack::Timeout => {
                    tracing::warn!("No acknowledgement for line {}", cursor);
                    cursor = self.next_after_retry(cursor, &attempts, &mut failed_lines);
                }
            }
        }

        Ok((resends, failed_lines))
    }

    /// Retry `line` unless it has used its attempts, in which case report it
    /// and move past it.
    fn next_after_retry(
        &mut self,
        line: usize,
        attempts: &HashMap<usize, u32>,
        failed_lines: &mut Vec<usize>,
    ) -> usize {
        let used = attempts.get(&line).copied().unwrap_or(0);
        if used >= self.config.max_retries {
            tracing::error!("Line {} failed after {} attempts", line, used);
            failed_lines.push(line);
            self.observer.on_line_failed(line, used);
            line + 1
        } else {
            line
        }
    }

    async fn send_header(&mut self, file_name: &str) -> Result<()> {
        for command in [
            Command::set_line_number(0),
            Command::start_sd_write(file_name),
        ] {
            self.send(&command.encode()).await?;
            if self.await_ack().await? == Ack::Timeout {
                tracing::warn!("No acknowledgement for {}", command.instruction());
            }
        }
        Ok(())
    }

    async fn finish_write(&mut self) {
        let stop = Command::stop_sd_write().encode();
        if let Err(e) = self.send(&stop).await {
            tracing::error!("Failed to send stop-write: {}", e);
            return;
        }
        if let Err(e) = self.await_ack().await {
            tracing::warn!("Stop-write not acknowledged: {}", e);
        }
    }

    async fn send(&mut self, line: &str) -> Result<()> {
        self.transport.write_line(line).await?;
        tracing::trace!(">> {}", line);
        self.observer.on_line_sent(line);
        Ok(())
    }

    /// Read until `ok`, remembering any resend directive seen on the way
    async fn await_ack(&mut self) -> Result<Ack> {
        let deadline = Instant::now() + self.config.ack_timeout;
        let mut resend: Option<usize> = None;

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Ok(resend.map_or(Ack::Timeout, Ack::Resend));
            }

            match self.transport.read_line(remaining).await {
                Ok(line) => {
                    let line = line.trim();
                    tracing::trace!("<< {}", line);
                    if line.contains("Resend") {
                        resend = Some(parse_resend(line)?);
                    } else if line.starts_with("ok") {
                        return Ok(resend.map_or(Ack::Ok, Ack::Resend));
                    } else {
                        self.observer.on_unsolicited(line);
                    }
                }
                Err(TransportError::Timeout { .. }) => {
                    return Ok(resend.map_or(Ack::Timeout, Ack::Resend));
                }
                Err(e) => return Err(Error::from(e)),
            }
        }
    }
}

fn progress_for(file_name: &str, line: usize, total: usize, elapsed: Duration) -> UploadProgress {
    let time_per_line = elapsed / line.max(1) as u32;
    let remaining = time_per_line * total.saturating_sub(line) as u32;
    UploadProgress {
        file_name: file_name.to_string(),
        line,
        total_lines: total,
        percent: upload_percent(line - 1, total),
        elapsed,
        remaining,
    }
}
