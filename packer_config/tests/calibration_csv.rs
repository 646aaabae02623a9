use std::fs::File;
use std::io::Write;

use packer_config::{CalibrationRow, CameraFit, load_ratio_csv};
use rstest::rstest;
use tempfile::tempdir;

fn row(pixels: f64, cm: f64) -> CalibrationRow {
    CalibrationRow { pixels, cm }
}

#[rstest]
fn fit_two_points_exact() {
    let fit = CameraFit::from_rows(&[row(100.0, 6.0), row(200.0, 12.0)]).unwrap();
    assert!((fit.ratio_cm_per_px - 0.06).abs() < 1e-12);
    assert!(fit.offset_cm.abs() < 1e-9);
    assert_eq!(fit.inliers, 2);
}

#[rstest]
fn fit_recovers_offset() {
    // cm = 0.04 * px - 0.3
    let rows: Vec<_> = [100.0, 150.0, 250.0, 400.0]
        .iter()
        .map(|&p| row(p, 0.04 * p - 0.3))
        .collect();
    let fit = CameraFit::from_rows(&rows).unwrap();
    assert!((fit.ratio_cm_per_px - 0.04).abs() < 1e-9);
    assert!((fit.offset_cm + 0.3).abs() < 1e-9);
}

#[rstest]
#[case(vec![row(100.0, 6.0), row(100.0, 6.1)], "duplicate pixel")]
#[case(vec![row(100.0, 6.0), row(200.0, 12.0), row(150.0, 9.0)], "strictly increasing")]
#[case(vec![row(100.0, 6.0)], "at least two rows")]
#[case(vec![row(100.0, 6.0), row(200.0, -1.0)], "positive pixels and cm")]
#[case(vec![row(100.0, 5.0), row(200.0, 5.0), row(300.0, 5.0)], "non-positive ratio")]
fn fit_rejects_bad_rows(#[case] rows: Vec<CalibrationRow>, #[case] needle: &str) {
    let err = CameraFit::from_rows(&rows).expect_err("should fail");
    let msg = format!("{err}");
    assert!(msg.contains(needle), "expected '{needle}' in: {msg}");
}

#[rstest]
fn fit_with_noise_and_outliers_recovers_ratio() {
    // Ground truth: cm = 0.06 * px + 0.2
    let mut rows = Vec::new();
    for i in 0..50u32 {
        let px = 80.0 + f64::from(i) * 8.0;
        let noise = (f64::from(i) * 37.0).sin() * 0.02;
        rows.push(row(px, 0.06 * px + 0.2 + noise));
    }
    rows[15].cm = 60.0;
    rows[35].cm = 0.5;

    let fit = CameraFit::from_rows(&rows).unwrap();
    let rel = (fit.ratio_cm_per_px - 0.06).abs() / 0.06;
    assert!(rel <= 0.01, "ratio rel err {rel}");
    assert!((fit.offset_cm - 0.2).abs() < 0.1, "offset {}", fit.offset_cm);
    assert_eq!(fit.inliers, 48);
}

#[rstest]
fn csv_with_wrong_headers_errors() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("bad_headers.csv");
    let mut f = File::create(&path).unwrap();
    writeln!(f, "px,centimeters").unwrap();
    writeln!(f, "100,6.0").unwrap();

    let err = load_ratio_csv(&path).expect_err("should error on bad headers");
    assert!(format!("{err}").contains("headers 'pixels,cm'"));
}

#[rstest]
fn csv_with_non_numeric_errors() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("bad_numeric.csv");
    let mut f = File::create(&path).unwrap();
    writeln!(f, "pixels,cm").unwrap();
    writeln!(f, "abc,xyz").unwrap();

    let err = load_ratio_csv(&path).expect_err("should error on non-numeric");
    assert!(format!("{err}").contains("invalid CSV row 2"));
}

#[rstest]
fn csv_round_trip_fit() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("front.csv");
    let mut f = File::create(&path).unwrap();
    writeln!(f, "pixels, cm").unwrap();
    writeln!(f, "120, 7.2").unwrap();
    writeln!(f, "200, 12.0").unwrap();
    writeln!(f, "310, 18.6").unwrap();

    let fit = load_ratio_csv(&path).unwrap();
    assert!((fit.ratio_cm_per_px - 0.06).abs() < 1e-9);
}
