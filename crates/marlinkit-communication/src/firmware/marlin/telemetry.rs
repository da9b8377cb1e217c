//! Telemetry decoder
//!
//! Marlin reports state as free-form text. Each fact type has exactly one
//! extraction rule in [`RULES`]; a line that matches nothing is ignored.
//!
//! Bed-leveling reports span many lines and are handled separately by
//! [`BedLevelCapture`](super::bed_level::BedLevelCapture).

use marlinkit_core::{AxisValue, PidDomain, TelemetryFact};
use regex::{Captures, Regex};
use std::sync::OnceLock;

/// Literal line Marlin sends while it cannot accept input
pub const BUSY_MARKER: &str = "echo:busy: processing";

/// True when `text` contains the firmware busy marker
pub fn is_busy_marker(text: &str) -> bool {
    text.contains(BUSY_MARKER)
}

/// One declarative extraction rule
struct Rule {
    kind: &'static str,
    pattern: &'static str,
    build: fn(&Captures<'_>) -> Option<TelemetryFact>,
}

const NUM: &str = r"-?\d+(?:\.\d+)?";

static RULES: &[Rule] = &[
    Rule {
        kind: "hotend_temperature",
        pattern: r"(?:^|\s)T:(-?\d+(?:\.\d+)?)\s*/\s*(-?\d+(?:\.\d+)?)",
        build: |c| {
            Some(TelemetryFact::HotendTemperature {
                current: number(c, 1)?,
                target: number(c, 2)?,
            })
        },
    },
    Rule {
        kind: "bed_temperature",
        pattern: r"(?:^|\s)B:(-?\d+(?:\.\d+)?)(?:\s*/\s*(-?\d+(?:\.\d+)?))?",
        build: |c| {
            Some(TelemetryFact::BedTemperature {
                current: number(c, 1)?,
                target: number(c, 2),
            })
        },
    },
    Rule {
        kind: "position",
        pattern: r"(?:^|\s)X:(-?\d+(?:\.\d+)?)\s+Y:(-?\d+(?:\.\d+)?)\s+Z:(-?\d+(?:\.\d+)?)(?:\s+E:(-?\d+(?:\.\d+)?))?",
        build: |c| {
            Some(TelemetryFact::Position {
                x: number(c, 1)?,
                y: number(c, 2)?,
                z: number(c, 3)?,
                e: number(c, 4),
            })
        },
    },
    Rule {
        kind: "pid_values",
        pattern: r"M30([14])\s+P(-?\d+(?:\.\d+)?)\s+I(-?\d+(?:\.\d+)?)\s+D(-?\d+(?:\.\d+)?)",
        build: |c| {
            let domain = match c.get(1)?.as_str() {
                "1" => PidDomain::Hotend,
                _ => PidDomain::Bed,
            };
            Some(TelemetryFact::PidValues {
                domain,
                p: number(c, 2)?,
                i: number(c, 3)?,
                d: number(c, 4)?,
            })
        },
    },
    Rule {
        kind: "capability",
        pattern: r"^(?:Cap:)?([A-Z][A-Z0-9_]+):(\d+)$",
        build: |c| {
            Some(TelemetryFact::CapabilityFlag {
                name: c.get(1)?.as_str().to_string(),
                enabled: c.get(2)?.as_str() != "0",
            })
        },
    },
    Rule {
        kind: "firmware_name",
        pattern: r"FIRMWARE_NAME:\s*(.+?)(?:\s+(?:SOURCE_CODE_URL|PROTOCOL_VERSION|MACHINE_TYPE):|$)",
        build: |c| {
            Some(TelemetryFact::FirmwareName {
                name: c.get(1)?.as_str().trim().to_string(),
            })
        },
    },
    Rule {
        kind: "bed_volume",
        pattern: r"Max:\s*X(-?\d+(?:\.\d+)?)\s*Y(-?\d+(?:\.\d+)?)\s*Z(-?\d+(?:\.\d+)?)",
        build: |c| {
            Some(TelemetryFact::BedVolume {
                x: number(c, 1)?,
                y: number(c, 2)?,
                z: number(c, 3)?,
            })
        },
    },
    Rule {
        kind: "print_byte_progress",
        pattern: r"SD printing byte (\d+)/(\d+)",
        build: |c| {
            Some(TelemetryFact::PrintByteProgress {
                current: c.get(1)?.as_str().parse().ok()?,
                total: c.get(2)?.as_str().parse().ok()?,
            })
        },
    },
    Rule {
        kind: "file_opened",
        pattern: r"File opened:\s*(\S+)\s+Size:\s*(\d+)",
        build: |c| {
            Some(TelemetryFact::FileOpened {
                name: c.get(1)?.as_str().to_string(),
                size: c.get(2)?.as_str().parse().ok()?,
            })
        },
    },
    Rule {
        kind: "print_done",
        pattern: r"Done printing file",
        build: |_| Some(TelemetryFact::PrintDone),
    },
    Rule {
        kind: "stepper_current",
        pattern: r"M906((?:\s+[A-Z]-?\d+(?:\.\d+)?)+)",
        build: |c| {
            let values = axis_values(c.get(1)?.as_str());
            (!values.is_empty()).then_some(TelemetryFact::StepperCurrent { values })
        },
    },
    Rule {
        kind: "stepper_mode",
        pattern: r"M569\s+S([01])((?:\s+[XYZE]\d*)*)",
        build: |c| {
            let axes = c
                .get(2)
                .map(|m| {
                    m.as_str()
                        .split_whitespace()
                        .filter_map(|token| token.chars().next())
                        .collect()
                })
                .unwrap_or_default();
            Some(TelemetryFact::StepperMode {
                stealth_chop: c.get(1)?.as_str() == "1",
                axes,
            })
        },
    },
    Rule {
        kind: "stall_threshold",
        pattern: r"M914((?:\s+[A-Z]-?\d+(?:\.\d+)?)+)",
        build: |c| {
            let values = axis_values(c.get(1)?.as_str());
            (!values.is_empty()).then_some(TelemetryFact::StallThreshold { values })
        },
    },
    Rule {
        kind: "notification",
        pattern: r"//action:notification\s+(.+)$",
        build: |c| {
            Some(TelemetryFact::Notification {
                text: c.get(1)?.as_str().trim().to_string(),
            })
        },
    },
];

fn compiled_rules() -> &'static [(Regex, &'static Rule)] {
    static COMPILED: OnceLock<Vec<(Regex, &'static Rule)>> = OnceLock::new();
    COMPILED.get_or_init(|| {
        RULES
            .iter()
            .map(|rule| (Regex::new(rule.pattern).expect("invalid regex pattern"), rule))
            .collect()
    })
}

fn number(caps: &Captures<'_>, index: usize) -> Option<f64> {
    caps.get(index)?.as_str().parse().ok()
}

/// Per-axis values from tokens like `X800 Y800 E650`.
///
/// Only motion axes are kept; tool and index selectors (`T0`, `I1`) are not.
fn axis_values(tokens: &str) -> Vec<AxisValue> {
    static AXIS_REGEX: OnceLock<Regex> = OnceLock::new();
    let re = AXIS_REGEX.get_or_init(|| {
        Regex::new(&format!(r"\b([XYZE])({})\b", NUM)).expect("invalid regex pattern")
    });

    re.captures_iter(tokens)
        .filter_map(|c| {
            let axis = c.get(1)?.as_str().chars().next()?;
            let value = c.get(2)?.as_str().parse().ok()?;
            Some(AxisValue::new(axis, value))
        })
        .collect()
}

/// Decode the first fact a line carries
pub fn decode(line: &str) -> Option<TelemetryFact> {
    let line = line.trim();
    compiled_rules()
        .iter()
        .find_map(|(re, rule)| re.captures(line).and_then(|c| (rule.build)(&c)))
}

/// Decode every fact a line carries, in rule order.
///
/// A temperature report yields both hotend and bed facts.
pub fn decode_line(line: &str) -> Vec<TelemetryFact> {
    let line = line.trim();
    compiled_rules()
        .iter()
        .filter_map(|(re, rule)| {
            let fact = re.captures(line).and_then(|c| (rule.build)(&c))?;
            tracing::trace!("Decoded {} from {:?}", rule.kind, line);
            Some(fact)
        })
        .collect()
}

/// Decode a multi-line blob such as an `M503` settings dump
pub fn decode_buffer(text: &str) -> Vec<TelemetryFact> {
    text.lines().flat_map(decode_line).collect()
}
