//! Bilinear bed-leveling capture
//!
//! Marlin prints a mesh over many lines with no explicit terminator:
//!
//! ```text
//! Bilinear Leveling Grid:
//!       0      1      2
//!  0 +0.100 +0.050 -0.020
//!  1 +0.080 +0.010 -0.040
//! X:110.00 Y:110.00 Z:10.00 E:0.00 Count X:8800 Y:8800 Z:4000
//! ```
//!
//! Capture starts on the `Bilinear` line and ends on the first line that
//! contains `X:` or `echo`.

use marlinkit_core::BedLevelGrid;

/// Marker that opens a capture
pub const START_MARKER: &str = "Bilinear";

/// Summary lines the firmware prints after the grid
const TRAILING_SUMMARY_LINES: usize = 4;

/// A report longer than this is abandoned
const MAX_CAPTURE_LINES: usize = 512;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum CaptureState {
    #[default]
    Idle,
    Capturing,
}

/// Line-fed accumulator for a leveling report
#[derive(Debug, Clone, Default)]
pub struct BedLevelCapture {
    state: CaptureState,
    buffer: String,
    lines: usize,
}

impl BedLevelCapture {
    /// Create an idle accumulator
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a report is being accumulated
    pub fn is_capturing(&self) -> bool {
        self.state == CaptureState::Capturing
    }

    /// Feed one line of firmware output.
    ///
    /// Returns the grid when this line completes a report. Lines seen while
    /// idle are ignored unless they open a report.
    pub fn feed_line(&mut self, line: &str) -> Option<BedLevelGrid> {
        match self.state {
            CaptureState::Idle => {
                if line.contains(START_MARKER) {
                    tracing::debug!("Bed-level capture started");
                    self.state = CaptureState::Capturing;
                    self.append(line);
                }
                None
            }
            CaptureState::Capturing => {
                self.append(line);
                if line.contains("X:") || line.contains("echo") {
                    return self.finish();
                }
                if self.lines > MAX_CAPTURE_LINES {
                    tracing::warn!(
                        "Bed-level report exceeded {} lines, discarding",
                        MAX_CAPTURE_LINES
                    );
                    self.reset();
                }
                None
            }
        }
    }

    /// Drop any partial report
    pub fn reset(&mut self) {
        self.state = CaptureState::Idle;
        self.buffer.clear();
        self.lines = 0;
    }

    fn append(&mut self, line: &str) {
        self.buffer.push_str(line);
        self.buffer.push('\n');
        self.lines += 1;
    }

    fn finish(&mut self) -> Option<BedLevelGrid> {
        let rows = grid_rows(&self.buffer);
        self.reset();

        if rows.is_empty() {
            tracing::warn!("Bed-level report contained no grid rows");
            return None;
        }
        tracing::info!("Captured bed-level grid with {} rows", rows.len());
        Some(BedLevelGrid::from_csv_rows(&rows))
    }
}

/// Turn a raw report into CSV rows
fn grid_rows(report: &str) -> Vec<String> {
    let report = match report.find("X:") {
        Some(pos) => &report[..pos],
        None => report,
    };

    let mut lines: Vec<&str> = report.lines().collect();
    let mut dropped = 0;
    while dropped < TRAILING_SUMMARY_LINES
        && lines.last().is_some_and(|line| !starts_with_digit(line))
    {
        lines.pop();
        dropped += 1;
    }

    lines
        .into_iter()
        .map(str::trim)
        .filter(|line| starts_with_digit(line))
        .filter(|line| !is_column_header(line))
        .map(|line| line.split_whitespace().collect::<Vec<_>>().join(","))
        .collect()
}

fn starts_with_digit(line: &str) -> bool {
    line.trim_start()
        .chars()
        .next()
        .is_some_and(|c| c.is_ascii_digit())
}

/// Header rows list bare column indices
fn is_column_header(line: &str) -> bool {
    let mut tokens = line.split_whitespace().peekable();
    tokens.peek().is_some() && tokens.all(|t| t.parse::<u32>().is_ok())
}
