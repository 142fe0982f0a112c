//! Test helpers for spotwatch
//!
//! Synthetic spot frames with known centers, optional seeded noise, and
//! small filesystem conveniences shared by the workspace's tests.

use chrono::{DateTime, TimeZone, Utc};
use ndarray::Array2;
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal};
use std::path::{Path, PathBuf};

/// Error type for test helper operations
#[derive(thiserror::Error, Debug)]
pub enum TestHelperError {
    #[error("invalid spot parameter: {0}")]
    InvalidSpot(String),

    #[error("invalid noise level {0}")]
    InvalidNoise(f64),

    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// A circular Gaussian spot with its peak height above the baseline.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SyntheticSpot {
    /// Column coordinate of the center
    pub x: f64,
    /// Row coordinate of the center
    pub y: f64,
    /// Peak value above the baseline
    pub amplitude: f64,
    /// Standard deviation in pixels
    pub sigma: f64,
}

impl SyntheticSpot {
    pub fn new(x: f64, y: f64, amplitude: f64, sigma: f64) -> Self {
        Self {
            x,
            y,
            amplitude,
            sigma,
        }
    }
}

/// Render spots onto a constant baseline.
///
/// Each spot is evaluated out to ten sigma, far enough that the truncated
/// tail is below f64 resolution of any realistic baseline.
///
/// # Arguments
/// * `width` - Number of columns
/// * `height` - Number of rows
/// * `baseline` - Constant background level
/// * `spots` - Spots to add
pub fn render_spot_frame(
    width: usize,
    height: usize,
    baseline: f64,
    spots: &[SyntheticSpot],
) -> Result<Array2<f64>, TestHelperError> {
    let mut frame = Array2::from_elem((height, width), baseline);

    for spot in spots {
        if !(spot.sigma.is_finite() && spot.sigma > 0.0) {
            return Err(TestHelperError::InvalidSpot(format!(
                "sigma must be positive, got {}",
                spot.sigma
            )));
        }

        let reach = (10.0 * spot.sigma).ceil() + 1.0;
        let col_start = (spot.x - reach).floor().max(0.0) as usize;
        let col_end = ((spot.x + reach).ceil().max(0.0) as usize).min(width);
        let row_start = (spot.y - reach).floor().max(0.0) as usize;
        let row_end = ((spot.y + reach).ceil().max(0.0) as usize).min(height);
        let two_sigma_sq = 2.0 * spot.sigma * spot.sigma;

        for row in row_start..row_end {
            for col in col_start..col_end {
                let dx = col as f64 - spot.x;
                let dy = row as f64 - spot.y;
                frame[[row, col]] += spot.amplitude * (-(dx * dx + dy * dy) / two_sigma_sq).exp();
            }
        }
    }

    Ok(frame)
}

/// Add zero-mean Gaussian noise with a fixed seed.
pub fn add_gaussian_noise(
    frame: &mut Array2<f64>,
    sigma: f64,
    seed: u64,
) -> Result<(), TestHelperError> {
    let normal = Normal::new(0.0, sigma).map_err(|_| TestHelperError::InvalidNoise(sigma))?;
    let mut rng = StdRng::seed_from_u64(seed);
    frame.mapv_inplace(|v| v + normal.sample(&mut rng));
    Ok(())
}

/// A capture time on the test night (2016-07-21 UTC), offset by `minutes`.
pub fn night_timestamp(minutes: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2016, 7, 21, 3, 0, 0)
        .single()
        .map(|t| t + chrono::Duration::minutes(minutes))
        .unwrap_or_default()
}

/// Write a text file under `dir`, returning its path.
pub fn write_text(dir: &Path, name: &str, contents: &str) -> Result<PathBuf, TestHelperError> {
    let path = dir.join(name);
    std::fs::write(&path, contents).map_err(|source| TestHelperError::Write {
        path: path.clone(),
        source,
    })?;
    Ok(path)
}
