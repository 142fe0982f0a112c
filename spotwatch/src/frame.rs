//! Frames, frame sources, timestamps and window cropping.
//!
//! Pixel arrays are indexed `[row, col]`. Throughout the crate `x` is the
//! column coordinate and `y` the row coordinate, and pixel `i` is centered
//! on coordinate `i`.

use chrono::{DateTime, Utc};
use ndarray::{s, Array2, ArrayView2};
use thiserror::Error;

/// A decoded detector frame plus its capture timestamp.
#[derive(Debug, Clone)]
pub struct Frame {
    pub pixels: Array2<f64>,
    pub captured_at: DateTime<Utc>,
}

impl Frame {
    pub fn new(pixels: Array2<f64>, captured_at: DateTime<Utc>) -> Self {
        Self {
            pixels,
            captured_at,
        }
    }

    /// Number of columns
    pub fn width(&self) -> usize {
        self.pixels.ncols()
    }

    /// Number of rows
    pub fn height(&self) -> usize {
        self.pixels.nrows()
    }
}

/// Failures reported by a [`FrameProvider`].
#[derive(Error, Debug)]
pub enum FrameError {
    #[error("frame {0} not found")]
    NotFound(String),

    #[error("failed to read frame {id}: {reason}")]
    Unreadable { id: String, reason: String },
}

/// Source of decoded frames, keyed by frame identifier.
///
/// Image decoding lives behind this trait; the pipeline only ever sees pixel
/// arrays and timestamps.
pub trait FrameProvider {
    fn load(&self, frame_id: &str) -> Result<Frame, FrameError>;
}

/// Converts frame timestamps into Julian Dates.
pub trait TimeService {
    fn to_julian_date(&self, timestamp: &DateTime<Utc>) -> f64;
}

/// Julian Date of the Unix epoch (1970-01-01T00:00:00 UTC)
const UNIX_EPOCH_JD: f64 = 2_440_587.5;

const MICROS_PER_DAY: f64 = 86_400_000_000.0;

/// UTC-based Julian Date clock. Leap seconds are ignored.
#[derive(Debug, Clone, Copy, Default)]
pub struct UtcJulianClock;

impl TimeService for UtcJulianClock {
    fn to_julian_date(&self, timestamp: &DateTime<Utc>) -> f64 {
        timestamp.timestamp_micros() as f64 / MICROS_PER_DAY + UNIX_EPOCH_JD
    }
}

/// A square window that does not fit inside its frame.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{size}x{size} window at ({x}, {y}) exceeds {width}x{height} frame")]
pub struct WindowError {
    pub x: i64,
    pub y: i64,
    pub size: usize,
    pub width: usize,
    pub height: usize,
}

/// Borrow the `size`×`size` window whose top-left pixel is `(x, y)`.
///
/// A window that is not entirely inside the frame is rejected rather than
/// truncated, so every crop handed to the centroid stages has the same shape.
pub fn crop_window(
    pixels: &Array2<f64>,
    x: i64,
    y: i64,
    size: usize,
) -> Result<ArrayView2<'_, f64>, WindowError> {
    let (height, width) = pixels.dim();
    let error = || WindowError {
        x,
        y,
        size,
        width,
        height,
    };

    if size == 0 || x < 0 || y < 0 {
        return Err(error());
    }
    let (col, row) = (x as usize, y as usize);
    if col + size > width || row + size > height {
        return Err(error());
    }

    Ok(pixels.slice(s![row..row + size, col..col + size]))
}
