use marlinkit_communication::BedLevelCapture;
use marlinkit_core::BedLevelGrid;

fn feed_all(capture: &mut BedLevelCapture, lines: &[&str]) -> Vec<BedLevelGrid> {
    lines.iter().filter_map(|l| capture.feed_line(l)).collect()
}

#[test]
fn test_grid_excludes_position_report() {
    let mut capture = BedLevelCapture::new();
    let grids = feed_all(
        &mut capture,
        &[
            "Bilinear Leveling Grid:",
            "0 1.000 1.200",
            "1 1.100 1.300",
            "X:0.00 Y:0.00 Z:0.00",
            "echo:Settings Stored (598 bytes)",
        ],
    );

    assert_eq!(grids.len(), 1);
    let grid = &grids[0];
    assert_eq!(grid.csv, "0,1.000,1.200\n1,1.100,1.300");
    assert_eq!(grid.rows, vec![vec![0.0, 1.0, 1.2], vec![1.0, 1.1, 1.3]]);
    assert!(!capture.is_capturing());
}

#[test]
fn test_marlin_report_with_column_header() {
    let mut capture = BedLevelCapture::new();
    let grids = feed_all(
        &mut capture,
        &[
            "G29 Auto Bed Leveling",
            "Bilinear Leveling Grid:",
            "      0      1      2",
            " 0 +0.100 +0.050 -0.020",
            " 1 +0.080 +0.010 -0.040",
            " 2 +0.060 -0.010 -0.070",
            "X:110.00 Y:110.00 Z:10.00 E:0.00 Count X:8800 Y:8800 Z:4000",
        ],
    );

    assert_eq!(grids.len(), 1);
    assert_eq!(grids[0].row_count(), 3);
    assert_eq!(grids[0].rows[2], vec![2.0, 0.06, -0.01, -0.07]);
}

#[test]
fn test_echo_line_ends_capture() {
    let mut capture = BedLevelCapture::new();
    let grids = feed_all(
        &mut capture,
        &["Bilinear Leveling Grid:", "0 0.500 0.600", "echo:; Unified Bed Leveling"],
    );
    assert_eq!(grids.len(), 1);
    assert_eq!(grids[0].csv, "0,0.500,0.600");
}

#[test]
fn test_report_without_rows_yields_nothing() {
    let mut capture = BedLevelCapture::new();
    let grids = feed_all(
        &mut capture,
        &["Bilinear Leveling Grid:", "no mesh stored", "X:0.00 Y:0.00 Z:0.00"],
    );
    assert!(grids.is_empty());
    assert!(!capture.is_capturing());
}

#[test]
fn test_unrelated_traffic_is_ignored() {
    let mut capture = BedLevelCapture::new();
    let grids = feed_all(
        &mut capture,
        &[
            "ok T:210.00 /210.00 B:60.00 /60.00",
            "X:0.00 Y:0.00 Z:0.00 E:0.00",
            "echo:busy: processing",
            "ok",
        ],
    );
    assert!(grids.is_empty());
    assert!(!capture.is_capturing());
}

#[test]
fn test_capture_restarts_after_reset() {
    let mut capture = BedLevelCapture::new();
    capture.feed_line("Bilinear Leveling Grid:");
    capture.feed_line("0 9.999 9.999");
    capture.reset();
    assert!(!capture.is_capturing());

    let grids = feed_all(
        &mut capture,
        &["Bilinear Leveling Grid:", "0 0.100 0.200", "X:0.00"],
    );
    assert_eq!(grids.len(), 1);
    assert_eq!(grids[0].csv, "0,0.100,0.200");
}
