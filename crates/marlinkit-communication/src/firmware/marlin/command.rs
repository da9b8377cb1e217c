//! Command encoder
//!
//! Builds immutable command values from the instruction catalog and renders
//! them to the wire form `"{prefix}{code} {params...};"`.

use super::instructions::{Instruction, Prefix};
use marlinkit_core::PidDomain;
use std::fmt;

/// Payload carried after the instruction mnemonic
#[derive(Debug, Clone, PartialEq)]
enum Body {
    /// Ordered optional tokens; unset tokens are omitted when rendering
    Parameters(Vec<Option<String>>),
    /// Free text sent as-is (file names, LCD messages)
    Verbatim(String),
    /// Single `S<value>` set point
    SetPoint(f64),
}

/// A command ready to be written to the printer
#[derive(Debug, Clone, PartialEq)]
pub struct Command {
    instruction: Instruction,
    body: Body,
}

impl Command {
    /// Create a command with no parameters
    pub fn new(instruction: Instruction) -> Self {
        Self {
            instruction,
            body: Body::Parameters(Vec::new()),
        }
    }

    /// Create a command from a raw prefix and code.
    ///
    /// Returns `None` when the code is not in the catalog.
    pub fn from_code(prefix: Prefix, code: u16) -> Option<Self> {
        Instruction::lookup(prefix, code).map(Self::new)
    }

    /// Create a command carrying a verbatim payload
    pub fn verbatim(instruction: Instruction, text: impl Into<String>) -> Self {
        Self {
            instruction,
            body: Body::Verbatim(text.into()),
        }
    }

    /// Create a set-point command, rendered as `S<value>`
    pub fn set_point(instruction: Instruction, value: f64) -> Self {
        Self {
            instruction,
            body: Body::SetPoint(value),
        }
    }

    /// Append a parameter token
    pub fn param(self, token: impl Into<String>) -> Self {
        self.param_opt(Some(token))
    }

    /// Append a parameter token that may be unset
    pub fn param_opt<S: Into<String>>(mut self, token: Option<S>) -> Self {
        if let Body::Parameters(params) = &mut self.body {
            params.push(token.map(Into::into));
        } else {
            tracing::warn!(
                "Ignoring parameter on {} with a fixed payload",
                self.instruction
            );
        }
        self
    }

    /// Append `{letter}{value}` when a value is given
    pub fn axis(self, letter: char, value: Option<f64>) -> Self {
        self.param_opt(value.map(|v| format!("{}{}", letter, v)))
    }

    /// The catalogued instruction
    pub fn instruction(&self) -> Instruction {
        self.instruction
    }

    /// Render to wire text, without the line terminator
    pub fn encode(&self) -> String {
        match &self.body {
            Body::Parameters(params) => render_parameters(self.instruction, params),
            Body::Verbatim(text) => encode_verbatim(self.instruction, text),
            Body::SetPoint(value) => encode_set_point(self.instruction, *value),
        }
    }

    // Convenience constructors

    /// `G28`, all axes when `axes` is empty
    pub fn home(axes: &[char]) -> Self {
        axes.iter()
            .fold(Self::new(Instruction::AutoHome), |cmd, axis| {
                cmd.param(axis.to_string())
            })
    }

    /// `G1` linear move; unset axes are left out
    pub fn linear_move(
        x: Option<f64>,
        y: Option<f64>,
        z: Option<f64>,
        feed_rate: Option<f64>,
    ) -> Self {
        Self::new(Instruction::LinearMove)
            .axis('X', x)
            .axis('Y', y)
            .axis('Z', z)
            .axis('F', feed_rate)
    }

    /// `G29` probe the bed
    pub fn bed_leveling() -> Self {
        Self::new(Instruction::BedLeveling)
    }

    /// `M104 S<temp>`
    pub fn set_hotend_temperature(celsius: f64) -> Self {
        Self::set_point(Instruction::SetHotendTemperature, celsius)
    }

    /// `M109 S<temp>`
    pub fn wait_hotend_temperature(celsius: f64) -> Self {
        Self::set_point(Instruction::WaitHotendTemperature, celsius)
    }

    /// `M140 S<temp>`
    pub fn set_bed_temperature(celsius: f64) -> Self {
        Self::set_point(Instruction::SetBedTemperature, celsius)
    }

    /// `M190 S<temp>`
    pub fn wait_bed_temperature(celsius: f64) -> Self {
        Self::set_point(Instruction::WaitBedTemperature, celsius)
    }

    /// `M106 S<0-255>`
    pub fn set_fan_speed(speed: u8) -> Self {
        Self::set_point(Instruction::SetFanSpeed, f64::from(speed))
    }

    /// `M107`
    pub fn fan_off() -> Self {
        Self::new(Instruction::FanOff)
    }

    /// `M105`
    pub fn report_temperatures() -> Self {
        Self::new(Instruction::ReportTemperatures)
    }

    /// `M114`
    pub fn report_position() -> Self {
        Self::new(Instruction::GetPosition)
    }

    /// `M503`
    pub fn report_settings() -> Self {
        Self::new(Instruction::ReportSettings)
    }

    /// `M115`
    pub fn firmware_info() -> Self {
        Self::new(Instruction::FirmwareInfo)
    }

    /// `M155 S<seconds>`; zero disables auto-reporting
    pub fn temperature_auto_report(interval_s: u32) -> Self {
        Self::set_point(Instruction::TemperatureAutoReport, f64::from(interval_s))
    }

    /// `M27 S<seconds>`; zero disables auto-reporting
    pub fn sd_status_auto_report(interval_s: u32) -> Self {
        Self::set_point(Instruction::ReportSdStatus, f64::from(interval_s))
    }

    /// `M27`
    pub fn report_sd_status() -> Self {
        Self::new(Instruction::ReportSdStatus)
    }

    /// `M20`
    pub fn list_sd_card() -> Self {
        Self::new(Instruction::ListSdCard)
    }

    /// `M23 <file>`
    pub fn select_sd_file(file_name: &str) -> Self {
        Self::verbatim(Instruction::SelectSdFile, file_name)
    }

    /// `M24`
    pub fn start_sd_print() -> Self {
        Self::new(Instruction::StartSdPrint)
    }

    /// `M25`
    pub fn pause_sd_print() -> Self {
        Self::new(Instruction::PauseSdPrint)
    }

    /// `M524`
    pub fn abort_sd_print() -> Self {
        Self::new(Instruction::AbortSdPrint)
    }

    /// `M30 <file>`
    pub fn delete_sd_file(file_name: &str) -> Self {
        Self::verbatim(Instruction::DeleteSdFile, file_name)
    }

    /// `M110 N<line>`
    pub fn set_line_number(line: usize) -> Self {
        Self::new(Instruction::SetLineNumber).param(format!("N{}", line))
    }

    /// `M28 <file>`
    pub fn start_sd_write(file_name: &str) -> Self {
        Self::verbatim(Instruction::StartSdWrite, file_name)
    }

    /// `M29`
    pub fn stop_sd_write() -> Self {
        Self::new(Instruction::StopSdWrite)
    }

    /// `M303 E<heater> S<temp> C<cycles> U1`
    pub fn pid_autotune(domain: PidDomain, celsius: f64, cycles: u32) -> Self {
        let heater = match domain {
            PidDomain::Hotend => "E0",
            PidDomain::Bed => "E-1",
        };
        Self::new(Instruction::PidAutotune)
            .param(heater)
            .param(format!("S{}", celsius))
            .param(format!("C{}", cycles))
            .param("U1")
    }

    /// `M301`/`M304 P<p> I<i> D<d>`
    pub fn set_pid(domain: PidDomain, p: f64, i: f64, d: f64) -> Self {
        let instruction = match domain {
            PidDomain::Hotend => Instruction::SetHotendPid,
            PidDomain::Bed => Instruction::SetBedPid,
        };
        Self::new(instruction)
            .param(format!("P{}", p))
            .param(format!("I{}", i))
            .param(format!("D{}", d))
    }

    /// `M500`
    pub fn save_settings() -> Self {
        Self::new(Instruction::SaveSettings)
    }

    /// `M502`
    pub fn factory_reset() -> Self {
        Self::new(Instruction::FactoryReset)
    }

    /// `M600`
    pub fn filament_change() -> Self {
        Self::new(Instruction::FilamentChange)
    }

    /// `M117 <text>`
    pub fn display_message(text: &str) -> Self {
        Self::verbatim(Instruction::SetLcdMessage, text)
    }

    /// `M112`
    pub fn emergency_stop() -> Self {
        Self::new(Instruction::EmergencyStop)
    }

    /// `M18`
    pub fn disable_steppers() -> Self {
        Self::new(Instruction::DisableSteppers)
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encode())
    }
}

impl From<Instruction> for Command {
    fn from(instruction: Instruction) -> Self {
        Self::new(instruction)
    }
}

fn render_parameters(instruction: Instruction, params: &[Option<String>]) -> String {
    let tokens: Vec<&str> = params
        .iter()
        .filter_map(|p| p.as_deref())
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .collect();

    let text = if tokens.is_empty() {
        format!("{};", instruction)
    } else {
        format!("{} {};", instruction, tokens.join(" "))
    };
    text.to_uppercase()
}

/// Render `"{prefix}{code} {params...};"`, upper-cased, with unset
/// parameters left out
pub fn encode(instruction: Instruction, params: &[Option<&str>]) -> String {
    let owned: Vec<Option<String>> = params.iter().map(|p| p.map(str::to_string)).collect();
    render_parameters(instruction, &owned)
}

/// Render `"{prefix}{code} {text};"` with the text untouched
pub fn encode_verbatim(instruction: Instruction, text: &str) -> String {
    let text = text.trim();
    if text.is_empty() {
        format!("{};", instruction)
    } else {
        format!("{} {};", instruction, text)
    }
}

/// Render `"{prefix}{code} S{value};"`
pub fn encode_set_point(instruction: Instruction, value: f64) -> String {
    format!("{} S{};", instruction, value)
}
