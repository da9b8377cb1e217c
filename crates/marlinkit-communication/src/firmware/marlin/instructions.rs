//! Marlin instruction catalog
//!
//! The closed set of G- and M-codes the engine may emit. The numeric codes
//! are the firmware's wire identifiers and must not change.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Command letter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Prefix {
    /// Motion and geometry
    G,
    /// Machine functions
    M,
}

impl fmt::Display for Prefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Prefix::G => write!(f, "G"),
            Prefix::M => write!(f, "M"),
        }
    }
}

macro_rules! instruction_catalog {
    ($( $(#[$doc:meta])* $name:ident => ($prefix:ident, $code:literal, $desc:literal), )*) => {
        /// A catalogued Marlin instruction
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum Instruction {
            $( $(#[$doc])* $name, )*
        }

        impl Instruction {
            /// Every catalogued instruction, in catalog order
            pub const ALL: &'static [Instruction] = &[ $( Instruction::$name, )* ];

            /// Command letter
            pub const fn prefix(self) -> Prefix {
                match self {
                    $( Instruction::$name => Prefix::$prefix, )*
                }
            }

            /// Numeric code
            pub const fn code(self) -> u16 {
                match self {
                    $( Instruction::$name => $code, )*
                }
            }

            /// Human-readable description
            pub const fn description(self) -> &'static str {
                match self {
                    $( Instruction::$name => $desc, )*
                }
            }
        }
    };
}

instruction_catalog! {
    // Motion
    /// `G0` rapid move
    RapidMove => (G, 0, "Rapid move"),
    /// `G1` linear move
    LinearMove => (G, 1, "Linear move"),
    /// `G2` clockwise arc
    ArcClockwise => (G, 2, "Clockwise arc move"),
    /// `G3` counter-clockwise arc
    ArcCounterClockwise => (G, 3, "Counter-clockwise arc move"),
    /// `G4` dwell
    Dwell => (G, 4, "Dwell"),
    /// `G10` firmware retract
    Retract => (G, 10, "Firmware retract"),
    /// `G11` firmware recover
    Recover => (G, 11, "Firmware recover"),
    /// `G20` inch units
    InchUnits => (G, 20, "Set units to inches"),
    /// `G21` millimetre units
    MillimetreUnits => (G, 21, "Set units to millimetres"),
    /// `G27` park toolhead
    ParkToolhead => (G, 27, "Park toolhead"),
    /// `G28` auto home
    AutoHome => (G, 28, "Auto home"),
    /// `G29` bed leveling
    BedLeveling => (G, 29, "Bed leveling"),
    /// `G30` single Z probe
    SingleZProbe => (G, 30, "Single Z-probe"),
    /// `G90` absolute positioning
    AbsolutePositioning => (G, 90, "Absolute positioning"),
    /// `G91` relative positioning
    RelativePositioning => (G, 91, "Relative positioning"),
    /// `G92` set position
    SetPosition => (G, 92, "Set position"),

    // Machine control
    /// `M0` unconditional stop
    UnconditionalStop => (M, 0, "Unconditional stop"),
    /// `M17` enable steppers
    EnableSteppers => (M, 17, "Enable steppers"),
    /// `M18` disable steppers
    DisableSteppers => (M, 18, "Disable steppers"),
    /// `M84` disable steppers after idle
    StepperIdleTimeout => (M, 84, "Disable steppers / idle timeout"),
    /// `M82` absolute extrusion
    AbsoluteExtrusion => (M, 82, "E absolute"),
    /// `M83` relative extrusion
    RelativeExtrusion => (M, 83, "E relative"),
    /// `M92` set axis steps per unit
    SetStepsPerUnit => (M, 92, "Set axis steps-per-unit"),
    /// `M112` emergency stop
    EmergencyStop => (M, 112, "Emergency stop"),
    /// `M400` finish moves
    FinishMoves => (M, 400, "Finish moves"),
    /// `M410` quickstop
    Quickstop => (M, 410, "Quickstop"),

    // SD card
    /// `M20` list SD card
    ListSdCard => (M, 20, "List SD card"),
    /// `M21` init SD card
    InitSdCard => (M, 21, "Init SD card"),
    /// `M22` release SD card
    ReleaseSdCard => (M, 22, "Release SD card"),
    /// `M23` select SD file
    SelectSdFile => (M, 23, "Select SD file"),
    /// `M24` start or resume SD print
    StartSdPrint => (M, 24, "Start or resume SD print"),
    /// `M25` pause SD print
    PauseSdPrint => (M, 25, "Pause SD print"),
    /// `M26` set SD position
    SetSdPosition => (M, 26, "Set SD position"),
    /// `M27` report SD print status
    ReportSdStatus => (M, 27, "Report SD print status"),
    /// `M28` start SD write
    StartSdWrite => (M, 28, "Start SD write"),
    /// `M29` stop SD write
    StopSdWrite => (M, 29, "Stop SD write"),
    /// `M30` delete SD file
    DeleteSdFile => (M, 30, "Delete SD file"),
    /// `M31` print time
    PrintTime => (M, 31, "Print time"),
    /// `M32` select and start
    SelectAndStart => (M, 32, "Select and start"),
    /// `M33` get long path
    GetLongPath => (M, 33, "Get long path"),
    /// `M524` abort SD print
    AbortSdPrint => (M, 524, "Abort SD print"),

    // Temperature
    /// `M104` set hotend temperature
    SetHotendTemperature => (M, 104, "Set hotend temperature"),
    /// `M105` report temperatures
    ReportTemperatures => (M, 105, "Report temperatures"),
    /// `M109` wait for hotend temperature
    WaitHotendTemperature => (M, 109, "Wait for hotend temperature"),
    /// `M140` set bed temperature
    SetBedTemperature => (M, 140, "Set bed temperature"),
    /// `M155` temperature auto-report
    TemperatureAutoReport => (M, 155, "Temperature auto-report"),
    /// `M190` wait for bed temperature
    WaitBedTemperature => (M, 190, "Wait for bed temperature"),

    // Fans
    /// `M106` set fan speed
    SetFanSpeed => (M, 106, "Set fan speed"),
    /// `M107` fan off
    FanOff => (M, 107, "Fan off"),

    // Host protocol
    /// `M110` set line number
    SetLineNumber => (M, 110, "Set line number"),
    /// `M111` debug level
    DebugLevel => (M, 111, "Debug level"),
    /// `M113` host keepalive
    HostKeepalive => (M, 113, "Host keepalive"),
    /// `M114` get current position
    GetPosition => (M, 114, "Get current position"),
    /// `M115` firmware info
    FirmwareInfo => (M, 115, "Firmware info"),
    /// `M117` set LCD message
    SetLcdMessage => (M, 117, "Set LCD message"),
    /// `M118` serial print
    SerialPrint => (M, 118, "Serial print"),
    /// `M300` play tone
    PlayTone => (M, 300, "Play tone"),

    // Endstops
    /// `M119` endstop states
    EndstopStates => (M, 119, "Endstop states"),
    /// `M120` enable endstops
    EnableEndstops => (M, 120, "Enable endstops"),
    /// `M121` disable endstops
    DisableEndstops => (M, 121, "Disable endstops"),

    // Motion tuning
    /// `M201` max acceleration
    SetMaxAcceleration => (M, 201, "Set max acceleration"),
    /// `M203` max feedrate
    SetMaxFeedrate => (M, 203, "Set max feedrate"),
    /// `M204` starting acceleration
    SetStartingAcceleration => (M, 204, "Set starting acceleration"),
    /// `M205` advanced settings (jerk)
    SetAdvancedSettings => (M, 205, "Set advanced settings (jerk)"),
    /// `M206` home offsets
    SetHomeOffsets => (M, 206, "Set home offsets"),
    /// `M220` feedrate percentage
    SetFeedratePercentage => (M, 220, "Set feedrate percentage"),
    /// `M221` flow percentage
    SetFlowPercentage => (M, 221, "Set flow percentage"),
    /// `M290` babystep
    Babystep => (M, 290, "Babystep"),
    /// `M900` linear advance factor
    LinearAdvance => (M, 900, "Linear advance factor"),

    // PID
    /// `M301` set hotend PID
    SetHotendPid => (M, 301, "Set hotend PID"),
    /// `M303` PID autotune
    PidAutotune => (M, 303, "PID autotune"),
    /// `M304` set bed PID
    SetBedPid => (M, 304, "Set bed PID"),

    // Bed leveling & probe
    /// `M420` bed leveling state
    BedLevelingState => (M, 420, "Bed leveling state"),
    /// `M401` deploy probe
    DeployProbe => (M, 401, "Deploy probe"),
    /// `M402` stow probe
    StowProbe => (M, 402, "Stow probe"),
    /// `M851` Z probe offsets
    SetProbeOffset => (M, 851, "Set probe offsets"),

    // EEPROM
    /// `M500` save settings
    SaveSettings => (M, 500, "Save settings"),
    /// `M501` restore settings
    RestoreSettings => (M, 501, "Restore settings"),
    /// `M502` factory reset
    FactoryReset => (M, 502, "Factory reset"),
    /// `M503` report settings
    ReportSettings => (M, 503, "Report settings"),

    // Filament
    /// `M600` filament change
    FilamentChange => (M, 600, "Filament change"),
    /// `M701` load filament
    LoadFilament => (M, 701, "Load filament"),
    /// `M702` unload filament
    UnloadFilament => (M, 702, "Unload filament"),

    // Stepper drivers
    /// `M122` TMC debugging
    TmcDebug => (M, 122, "TMC debugging"),
    /// `M569` stepping mode
    SetSteppingMode => (M, 569, "Set TMC stepping mode"),
    /// `M906` stepper motor current
    SetStepperCurrent => (M, 906, "Set stepper motor current"),
    /// `M913` hybrid threshold
    SetHybridThreshold => (M, 913, "Set hybrid threshold speed"),
    /// `M914` bump sensitivity
    SetBumpSensitivity => (M, 914, "Set sensorless homing sensitivity"),
}

impl Instruction {
    /// Find the catalogued instruction for a prefix and code
    pub fn lookup(prefix: Prefix, code: u16) -> Option<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|i| i.prefix() == prefix && i.code() == code)
    }

    /// Wire mnemonic, e.g. `G28`
    pub fn mnemonic(self) -> String {
        format!("{}{}", self.prefix(), self.code())
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.prefix(), self.code())
    }
}
