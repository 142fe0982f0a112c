//! Common utilities for spotwatch integration tests

use ndarray::Array2;
use spotwatch::{MockFrameProvider, PipelineConfig};
use std::path::Path;
use tempfile::TempDir;
use test_helpers::{night_timestamp, render_spot_frame, write_text, SyntheticSpot};

pub const FRAME_WIDTH: usize = 1024;
pub const FRAME_HEIGHT: usize = 640;
pub const BASELINE: f64 = 50.0;
pub const AMPLITUDE: f64 = 1000.0;
pub const SIGMA: f64 = 1.5;

/// True centers of the three calibration spots
pub const SPOT_CENTERS: [(f64, f64); 3] = [(100.3, 200.7), (500.0, 500.0), (900.9, 100.1)];

/// Frame with the calibration spots shifted by `(dx, dy)` pixels
pub fn calibration_frame(dx: f64, dy: f64) -> Array2<f64> {
    let spots: Vec<SyntheticSpot> = SPOT_CENTERS
        .iter()
        .map(|&(x, y)| SyntheticSpot::new(x + dx, y + dy, AMPLITUDE, SIGMA))
        .collect();
    render_spot_frame(FRAME_WIDTH, FRAME_HEIGHT, BASELINE, &spots).unwrap()
}

/// Approximate catalog a few pixels off the true centers
pub fn approx_catalog_text() -> String {
    let mut text = String::from("@id,posX,posY\n");
    for (i, (x, y)) in SPOT_CENTERS.iter().enumerate() {
        text.push_str(&format!("spot{:02},{},{}\n", i + 1, (x + 2.0).round(), (y - 1.0).round()));
    }
    text
}

/// Configuration rooted in `dir`, with the approximate catalog written
pub fn pipeline_config(dir: &Path, workers: Option<usize>) -> PipelineConfig {
    let approx = write_text(dir, "spots.txt", &approx_catalog_text()).unwrap();
    PipelineConfig {
        window_half_width: 10,
        approx_catalog_path: approx,
        reference_catalog_path: dir.join("input_spot.txt"),
        reference_frame_id: "reference.fits".to_string(),
        observation_dir: dir.join("observations"),
        ledger_path: dir.join("spot_ledger.txt"),
        workers,
        ..Default::default()
    }
}

/// Provider holding the reference frame plus `count` night frames made by
/// `make_frame`, ten minutes apart, named `frame_NNN.fits`
pub fn provider_with_night(
    count: usize,
    make_frame: impl Fn(usize) -> Array2<f64>,
) -> (MockFrameProvider, Vec<String>) {
    let mut provider = MockFrameProvider::new();
    provider.insert("reference.fits", calibration_frame(0.0, 0.0), night_timestamp(-60));

    let ids: Vec<String> = (0..count).map(|i| format!("frame_{i:03}.fits")).collect();
    for (i, id) in ids.iter().enumerate() {
        provider.insert(id.clone(), make_frame(i), night_timestamp(10 * i as i64));
    }
    (provider, ids)
}

/// Fresh temporary workspace
pub fn workspace() -> TempDir {
    TempDir::new().unwrap()
}
