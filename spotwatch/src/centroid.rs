//! Two-stage sub-pixel spot centroiding.
//!
//! The coarse stage is an intensity-weighted center of mass. It re-anchors
//! the window on the spot. The refine stage collapses the window into its
//! column and row marginal profiles and fits each with a Gaussian plus
//! constant. A fit that fails to converge falls back to the center of mass
//! and is reported through [`FitOutcome::Diverged`].

use ndarray::{Array2, ArrayView2, Axis};
use spot_math::{fit_gaussian, FitConfig, FitError, Gaussian1D};

use crate::frame::{crop_window, WindowError};

/// Result of a computation that can fall back when the model fit fails.
///
/// Callers must branch on this: a `Diverged` value is usable but less
/// precise, and carries a human-readable warning.
#[derive(Debug, Clone, PartialEq)]
pub enum FitOutcome<T> {
    Converged(T),
    Diverged { fallback: T, warning: String },
}

impl<T> FitOutcome<T> {
    pub fn value(&self) -> &T {
        match self {
            FitOutcome::Converged(value) => value,
            FitOutcome::Diverged { fallback, .. } => fallback,
        }
    }

    pub fn into_value(self) -> T {
        match self {
            FitOutcome::Converged(value) => value,
            FitOutcome::Diverged { fallback, .. } => fallback,
        }
    }

    pub fn is_converged(&self) -> bool {
        matches!(self, FitOutcome::Converged(_))
    }

    pub fn warning(&self) -> Option<&str> {
        match self {
            FitOutcome::Converged(_) => None,
            FitOutcome::Diverged { warning, .. } => Some(warning),
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> FitOutcome<U> {
        match self {
            FitOutcome::Converged(value) => FitOutcome::Converged(f(value)),
            FitOutcome::Diverged { fallback, warning } => FitOutcome::Diverged {
                fallback: f(fallback),
                warning,
            },
        }
    }
}

/// A sub-pixel position, `x` along columns and `y` along rows.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Centroid {
    pub x: f64,
    pub y: f64,
}

impl Centroid {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Translate by a window origin to get frame coordinates.
    pub fn offset_by(self, origin_x: i64, origin_y: i64) -> Self {
        Self {
            x: self.x + origin_x as f64,
            y: self.y + origin_y as f64,
        }
    }
}

/// A refined spot together with the window it was measured in.
#[derive(Debug, Clone, PartialEq)]
pub struct LocatedSpot {
    /// Top-left column of the refined window
    pub window_x: i64,
    /// Top-left row of the refined window
    pub window_y: i64,
    /// Frame-coordinate centroid
    pub centroid: FitOutcome<Centroid>,
    /// Sum of all pixels in the refined window
    pub intensity: f64,
}

/// Locates spots inside fixed-size square windows.
#[derive(Debug, Clone)]
pub struct CentroidExtractor {
    half_width: usize,
    fit: FitConfig,
}

impl CentroidExtractor {
    /// Create an extractor for windows of `2 * half_width` pixels per side.
    pub fn new(half_width: usize, fit: FitConfig) -> Self {
        Self { half_width, fit }
    }

    pub fn half_width(&self) -> usize {
        self.half_width
    }

    /// Side length of every window this extractor crops
    pub fn window_size(&self) -> usize {
        2 * self.half_width
    }

    /// Top-left corner of the window centered on `(x, y)`.
    pub fn window_origin(&self, x: f64, y: f64) -> (i64, i64) {
        let half = self.half_width as f64;
        ((x - half).floor() as i64, (y - half).floor() as i64)
    }

    /// Coarse stage: center of mass of the window, in window coordinates.
    ///
    /// A window with no positive flux returns its geometric center.
    pub fn coarse(&self, window: &ArrayView2<f64>) -> Centroid {
        center_of_mass(window)
    }

    /// Refine stage: Gaussian fits of both marginal profiles, in window
    /// coordinates. Falls back to the center of mass if either fit fails.
    pub fn refine(&self, window: &ArrayView2<f64>) -> FitOutcome<Centroid> {
        let (x_profile, y_profile) = marginal_profiles(window);

        let fit_x = self.fit_profile(&x_profile);
        let fit_y = self.fit_profile(&y_profile);

        match (fit_x, fit_y) {
            (Ok(x), Ok(y)) => FitOutcome::Converged(Centroid::new(x, y)),
            (x, y) => {
                let reasons: Vec<String> = [("x", x), ("y", y)]
                    .into_iter()
                    .filter_map(|(axis, fit)| fit.err().map(|e| format!("{axis} profile: {e}")))
                    .collect();
                FitOutcome::Diverged {
                    fallback: center_of_mass(window),
                    warning: format!(
                        "Gaussian fit failed ({}), using center of mass",
                        reasons.join("; ")
                    ),
                }
            }
        }
    }

    /// Full two-stage location around an approximate frame position.
    ///
    /// The coarse window is centered on the approximate position. The refine
    /// window is re-centered on the coarse centroid. Either window leaving the
    /// frame is an error.
    pub fn locate(
        &self,
        pixels: &Array2<f64>,
        approx_x: f64,
        approx_y: f64,
    ) -> Result<LocatedSpot, WindowError> {
        let (coarse_x, coarse_y) = self.window_origin(approx_x, approx_y);
        let coarse_window = crop_window(pixels, coarse_x, coarse_y, self.window_size())?;
        let anchor = self.coarse(&coarse_window).offset_by(coarse_x, coarse_y);

        let (window_x, window_y) = self.window_origin(anchor.x, anchor.y);
        self.measure_at(pixels, window_x, window_y)
    }

    /// Refine stage on the window whose top-left corner is fixed.
    pub fn measure_at(
        &self,
        pixels: &Array2<f64>,
        window_x: i64,
        window_y: i64,
    ) -> Result<LocatedSpot, WindowError> {
        let window = crop_window(pixels, window_x, window_y, self.window_size())?;
        let centroid = self
            .refine(&window)
            .map(|c| c.offset_by(window_x, window_y));

        Ok(LocatedSpot {
            window_x,
            window_y,
            centroid,
            intensity: window.sum(),
        })
    }

    fn fit_profile(&self, profile: &[f64]) -> Result<f64, FitError> {
        let center = (profile.len() / 2) as f64;
        let guess = Gaussian1D::initial_guess(profile, center);
        fit_gaussian(profile, guess, &self.fit).map(|fit| fit.model.center)
    }
}

/// Column (x) and row (y) marginal profiles of a window.
pub fn marginal_profiles(window: &ArrayView2<f64>) -> (Vec<f64>, Vec<f64>) {
    let x_profile = window.sum_axis(Axis(0)).to_vec();
    let y_profile = window.sum_axis(Axis(1)).to_vec();
    (x_profile, y_profile)
}

/// Intensity-weighted center of mass of a window.
pub fn center_of_mass(window: &ArrayView2<f64>) -> Centroid {
    let mut total = 0.0;
    let mut x_sum = 0.0;
    let mut y_sum = 0.0;

    for ((row, col), &value) in window.indexed_iter() {
        total += value;
        x_sum += col as f64 * value;
        y_sum += row as f64 * value;
    }

    if !total.is_finite() || total <= f64::EPSILON {
        let (rows, cols) = window.dim();
        return Centroid::new(
            cols.saturating_sub(1) as f64 / 2.0,
            rows.saturating_sub(1) as f64 / 2.0,
        );
    }

    Centroid::new(x_sum / total, y_sum / total)
}
