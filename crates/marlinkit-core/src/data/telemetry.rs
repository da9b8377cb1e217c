//! Telemetry facts
//!
//! A fact is one typed observation extracted from the printer's text output.
//! Facts are immutable once produced.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Heater a set of PID constants belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PidDomain {
    /// Hotend heater (`M301`)
    Hotend,
    /// Heated bed (`M304`)
    Bed,
}

impl fmt::Display for PidDomain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PidDomain::Hotend => write!(f, "hotend"),
            PidDomain::Bed => write!(f, "bed"),
        }
    }
}

/// A per-axis value from a stepper driver report (`M906 X800 Y800`)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AxisValue {
    /// Axis letter, upper case
    pub axis: char,
    /// Reported value
    pub value: f64,
}

impl AxisValue {
    /// Create a new axis value
    pub fn new(axis: char, value: f64) -> Self {
        Self {
            axis: axis.to_ascii_uppercase(),
            value,
        }
    }
}

/// Measured bed mesh
///
/// `rows` holds the parsed numbers, `csv` the comma-joined text of each row
/// exactly as reported (one row per line).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BedLevelGrid {
    /// Parsed rows, in report order
    pub rows: Vec<Vec<f64>>,
    /// CSV rendering of the rows
    pub csv: String,
}

impl BedLevelGrid {
    /// Build a grid from CSV rows. Cells that are not numbers are skipped.
    pub fn from_csv_rows(csv_rows: &[String]) -> Self {
        let rows = csv_rows
            .iter()
            .map(|row| {
                row.split(',')
                    .filter_map(|cell| cell.trim().parse::<f64>().ok())
                    .collect()
            })
            .collect();

        Self {
            rows,
            csv: csv_rows.join("\n"),
        }
    }

    /// Number of rows
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// True when no rows were captured
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Spread between the highest and lowest probed offsets.
    ///
    /// The first column of each row is the row index and is not counted.
    pub fn deviation(&self) -> Option<f64> {
        let offsets = self.rows.iter().flat_map(|r| r.iter().skip(1).copied());
        let (min, max) = offsets.fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
            (lo.min(v), hi.max(v))
        });
        (min.is_finite() && max.is_finite()).then_some(max - min)
    }
}

/// One decoded observation from the firmware
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TelemetryFact {
    /// Heated bed temperature; target is absent on bare `B:<n>` reports
    BedTemperature {
        /// Measured temperature in °C
        current: f64,
        /// Set point in °C
        target: Option<f64>,
    },
    /// Hotend temperature
    HotendTemperature {
        /// Measured temperature in °C
        current: f64,
        /// Set point in °C
        target: f64,
    },
    /// Position report (`M114`)
    Position {
        /// X in mm
        x: f64,
        /// Y in mm
        y: f64,
        /// Z in mm
        z: f64,
        /// Extruder position in mm
        e: Option<f64>,
    },
    /// PID constants echoed by `M503`
    PidValues {
        /// Heater these constants drive
        domain: PidDomain,
        /// Proportional term
        p: f64,
        /// Integral term
        i: f64,
        /// Derivative term
        d: f64,
    },
    /// Capability probe line from `M115`
    CapabilityFlag {
        /// Capability name, e.g. `AUTOREPORT_TEMP`
        name: String,
        /// Whether the firmware has it enabled
        enabled: bool,
    },
    /// Firmware identification from `M115`
    FirmwareName {
        /// Name and version string
        name: String,
    },
    /// Completed bed-leveling capture
    BedLevelGrid(BedLevelGrid),
    /// SD print progress in bytes (`M27`)
    PrintByteProgress {
        /// Bytes consumed so far
        current: u64,
        /// File size in bytes
        total: u64,
    },
    /// A file on the SD card was opened for printing
    FileOpened {
        /// File name as reported
        name: String,
        /// File size in bytes
        size: u64,
    },
    /// The firmware finished printing the selected file
    PrintDone,
    /// Printable volume reported as `Max: X.. Y.. Z..`
    BedVolume {
        /// X extent in mm
        x: f64,
        /// Y extent in mm
        y: f64,
        /// Z extent in mm
        z: f64,
    },
    /// Stepper driver currents (`M906`)
    StepperCurrent {
        /// Current per axis in mA
        values: Vec<AxisValue>,
    },
    /// Stepper driver chopper mode (`M569`)
    StepperMode {
        /// true for stealthChop, false for spreadCycle
        stealth_chop: bool,
        /// Axes the mode applies to
        axes: Vec<char>,
    },
    /// Sensorless homing stall thresholds (`M914`)
    StallThreshold {
        /// Threshold per axis
        values: Vec<AxisValue>,
    },
    /// Free-form text the firmware wants surfaced to the user
    Notification {
        /// Message text
        text: String,
    },
}

impl TelemetryFact {
    /// Short name used in logs
    pub fn kind(&self) -> &'static str {
        match self {
            TelemetryFact::BedTemperature { .. } => "bed_temperature",
            TelemetryFact::HotendTemperature { .. } => "hotend_temperature",
            TelemetryFact::Position { .. } => "position",
            TelemetryFact::PidValues { .. } => "pid_values",
            TelemetryFact::CapabilityFlag { .. } => "capability",
            TelemetryFact::FirmwareName { .. } => "firmware_name",
            TelemetryFact::BedLevelGrid(_) => "bed_level_grid",
            TelemetryFact::PrintByteProgress { .. } => "print_byte_progress",
            TelemetryFact::FileOpened { .. } => "file_opened",
            TelemetryFact::PrintDone => "print_done",
            TelemetryFact::BedVolume { .. } => "bed_volume",
            TelemetryFact::StepperCurrent { .. } => "stepper_current",
            TelemetryFact::StepperMode { .. } => "stepper_mode",
            TelemetryFact::StallThreshold { .. } => "stall_threshold",
            TelemetryFact::Notification { .. } => "notification",
        }
    }
}
