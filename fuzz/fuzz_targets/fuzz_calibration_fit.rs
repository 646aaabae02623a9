#![no_main]
use libfuzzer_sys::fuzz_target;
use packer_config::{CalibrationRow, CameraFit};

fuzz_target!(|pairs: Vec<(f64, f64)>| {
    let rows: Vec<CalibrationRow> = pairs
        .into_iter()
        .map(|(pixels, cm)| CalibrationRow { pixels, cm })
        .collect();
    if let Ok(fit) = CameraFit::from_rows(&rows) {
        assert!(fit.ratio_cm_per_px > 0.0);
        assert!(fit.inliers >= 2 && fit.inliers <= rows.len());
    }
});
