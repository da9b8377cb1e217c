use marlinkit_communication::firmware::marlin::{decode, decode_buffer, decode_line};
use marlinkit_core::{AxisValue, PidDomain, TelemetryFact};

#[test]
fn test_temperature_report_yields_hotend_and_bed() {
    let facts = decode_line("ok T:210.00 /215.00 B:60.00 /60.00 @:127 B@:0");
    assert_eq!(
        facts,
        vec![
            TelemetryFact::HotendTemperature {
                current: 210.0,
                target: 215.0,
            },
            TelemetryFact::BedTemperature {
                current: 60.0,
                target: Some(60.0),
            },
        ]
    );
}

#[test]
fn test_bare_bed_temperature() {
    assert_eq!(
        decode("B:45"),
        Some(TelemetryFact::BedTemperature {
            current: 45.0,
            target: None,
        })
    );
}

#[test]
fn test_position_report() {
    assert_eq!(
        decode("X:10.00 Y:20.50 Z:0.20 E:3.10 Count X:800 Y:1640 Z:80"),
        Some(TelemetryFact::Position {
            x: 10.0,
            y: 20.5,
            z: 0.2,
            e: Some(3.1),
        })
    );
}

#[test]
fn test_pid_echo_lines() {
    assert_eq!(
        decode("echo:  M301 P22.20 I1.08 D114.00"),
        Some(TelemetryFact::PidValues {
            domain: PidDomain::Hotend,
            p: 22.2,
            i: 1.08,
            d: 114.0,
        })
    );
    assert!(matches!(
        decode("echo:  M304 P462.10 I85.47 D624.59"),
        Some(TelemetryFact::PidValues {
            domain: PidDomain::Bed,
            ..
        })
    ));
}

#[test]
fn test_capability_lines() {
    assert_eq!(
        decode("Cap:AUTOREPORT_TEMP:1"),
        Some(TelemetryFact::CapabilityFlag {
            name: "AUTOREPORT_TEMP".to_string(),
            enabled: true,
        })
    );
    assert_eq!(
        decode("EEPROM:0"),
        Some(TelemetryFact::CapabilityFlag {
            name: "EEPROM".to_string(),
            enabled: false,
        })
    );
}

#[test]
fn test_firmware_name() {
    let line = "FIRMWARE_NAME:Marlin bugfix-2.1.x (Jan  1 2024 12:00:00) SOURCE_CODE_URL:github.com/MarlinFirmware/Marlin PROTOCOL_VERSION:1.0 MACHINE_TYPE:Ender-3 EXTRUDER_COUNT:1";
    assert_eq!(
        decode(line),
        Some(TelemetryFact::FirmwareName {
            name: "Marlin bugfix-2.1.x (Jan  1 2024 12:00:00)".to_string(),
        })
    );
}

#[test]
fn test_bed_volume() {
    assert_eq!(
        decode("Max: X235.00 Y235.00 Z250.00"),
        Some(TelemetryFact::BedVolume {
            x: 235.0,
            y: 235.0,
            z: 250.0,
        })
    );
}

#[test]
fn test_sd_print_lines() {
    assert_eq!(
        decode("SD printing byte 2048/8192"),
        Some(TelemetryFact::PrintByteProgress {
            current: 2048,
            total: 8192,
        })
    );
    assert_eq!(
        decode("File opened: BENCHY.GCO Size: 8192"),
        Some(TelemetryFact::FileOpened {
            name: "BENCHY.GCO".to_string(),
            size: 8192,
        })
    );
    assert_eq!(decode("Done printing file"), Some(TelemetryFact::PrintDone));
    assert_eq!(decode("Not SD printing"), None);
}

#[test]
fn test_stepper_driver_lines() {
    assert_eq!(
        decode("echo:  M906 X580 Y580 Z580"),
        Some(TelemetryFact::StepperCurrent {
            values: vec![
                AxisValue::new('X', 580.0),
                AxisValue::new('Y', 580.0),
                AxisValue::new('Z', 580.0),
            ],
        })
    );
    assert_eq!(
        decode("echo:  M569 S1 X Y Z"),
        Some(TelemetryFact::StepperMode {
            stealth_chop: true,
            axes: vec!['X', 'Y', 'Z'],
        })
    );
    assert_eq!(
        decode("echo:  M914 X90 Y100"),
        Some(TelemetryFact::StallThreshold {
            values: vec![AxisValue::new('X', 90.0), AxisValue::new('Y', 100.0)],
        })
    );
}

#[test]
fn test_notification() {
    assert_eq!(
        decode("//action:notification Heating done"),
        Some(TelemetryFact::Notification {
            text: "Heating done".to_string(),
        })
    );
}

#[test]
fn test_unmatched_lines_yield_nothing() {
    assert_eq!(decode("ok"), None);
    assert_eq!(decode("echo:busy: processing"), None);
    assert_eq!(decode("start"), None);
    assert!(decode_line("").is_empty());
}

#[test]
fn test_settings_dump_buffer() {
    let dump = "echo:; Hotend PID:\n\
                echo:  M301 P22.20 I1.08 D114.00\n\
                echo:; Bed PID:\n\
                echo:  M304 P462.10 I85.47 D624.59\n\
                echo:; Stepper driver current:\n\
                echo:  M906 X580 Y580 Z580\n\
                echo:  M906 T0 E650\n";
    let facts = decode_buffer(dump);
    assert_eq!(facts.len(), 4);
    assert!(matches!(facts[0], TelemetryFact::PidValues { domain: PidDomain::Hotend, .. }));
    assert!(matches!(facts[1], TelemetryFact::PidValues { domain: PidDomain::Bed, .. }));
    assert_eq!(
        facts[3],
        TelemetryFact::StepperCurrent {
            values: vec![AxisValue::new('E', 650.0)],
        }
    );
}
