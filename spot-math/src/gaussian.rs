//! 1-D Gaussian-plus-offset profile model and fitting.
//!
//! The model is the area-normalized form
//!
//! ```text
//! f(t) = amplitude / (sqrt(2π) · width) · exp(−(t − center)² / (2 · width²)) + level
//! ```
//!
//! so `amplitude` is the integrated flux above `level`. Profiles are sampled at
//! integer coordinates `0..n`, pixel `i` being centered on `t = i`.

use crate::lm::{minimize, FitConfig, FitError, ProfileModel};
use crate::stats::median;
use nalgebra::Vector4;
use serde::{Deserialize, Serialize};

const SQRT_2PI: f64 = 2.506_628_274_631_000_2;

/// Smallest width the optimizer is allowed to step to
const MIN_WIDTH: f64 = 1e-6;

/// Width used as the starting guess for every profile fit (pixels)
pub const INITIAL_WIDTH: f64 = 2.0;

/// Gaussian-plus-constant model parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Gaussian1D {
    /// Integrated flux above the baseline
    pub amplitude: f64,
    /// Peak position in profile coordinates
    pub center: f64,
    /// Standard deviation (pixels)
    pub width: f64,
    /// Constant baseline
    pub level: f64,
}

impl Gaussian1D {
    /// Starting point for a fit: amplitude = max − median, center at the
    /// supplied guess, width = 2 px, baseline = median of the profile.
    pub fn initial_guess(profile: &[f64], center: f64) -> Self {
        let level = median(profile).unwrap_or(0.0);
        let peak = profile.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let amplitude = if peak.is_finite() { peak - level } else { 0.0 };

        Self {
            amplitude,
            center,
            width: INITIAL_WIDTH,
            level,
        }
    }

    /// Evaluate the model at coordinate `t`.
    pub fn evaluate(&self, t: f64) -> f64 {
        GaussianProfile.evaluate(t, &self.to_params())
    }

    fn to_params(self) -> Vector4<f64> {
        Vector4::new(self.amplitude, self.center, self.width, self.level)
    }

    fn from_params(params: &Vector4<f64>) -> Self {
        Self {
            amplitude: params[0],
            center: params[1],
            width: params[2],
            level: params[3],
        }
    }
}

/// Result of a successful profile fit.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GaussianFit {
    pub model: Gaussian1D,
    pub chi2: f64,
    pub iterations: usize,
}

struct GaussianProfile;

impl ProfileModel for GaussianProfile {
    fn evaluate(&self, t: f64, p: &Vector4<f64>) -> f64 {
        let (amplitude, center, width, level) = (p[0], p[1], p[2], p[3]);
        let z = (t - center) / width;
        amplitude / (SQRT_2PI * width) * (-0.5 * z * z).exp() + level
    }

    fn jacobian_row(&self, t: f64, p: &Vector4<f64>) -> Vector4<f64> {
        let (amplitude, center, width) = (p[0], p[1], p[2]);
        let offset = t - center;
        let z = offset / width;
        let shape = (-0.5 * z * z).exp() / (SQRT_2PI * width);
        let peak = amplitude * shape;

        Vector4::new(
            shape,
            peak * offset / (width * width),
            peak * (offset * offset / (width * width * width) - 1.0 / width),
            1.0,
        )
    }

    fn constrain(&self, p: &mut Vector4<f64>) {
        // (a, w) and (−a, −w) describe the same curve; keep the width positive
        if p[2] < 0.0 {
            p[2] = -p[2];
            p[0] = -p[0];
        }
        if p[2] < MIN_WIDTH {
            p[2] = MIN_WIDTH;
        }
    }
}

/// Fit a Gaussian-plus-offset model to a profile sampled at `0..profile.len()`.
///
/// Besides optimizer failures, a solution is rejected when its amplitude or
/// width is not positive or its center falls outside the sampled support.
/// Flat, saturated and multi-peaked profiles end up here.
pub fn fit_gaussian(
    profile: &[f64],
    initial: Gaussian1D,
    config: &FitConfig,
) -> Result<GaussianFit, FitError> {
    let coords: Vec<f64> = (0..profile.len()).map(|i| i as f64).collect();
    let solution = minimize(
        &GaussianProfile,
        &coords,
        profile,
        initial.to_params(),
        config,
    )?;

    let model = Gaussian1D::from_params(&solution.params);
    check_solution(&model, profile.len())?;

    Ok(GaussianFit {
        model,
        chi2: solution.chi2,
        iterations: solution.iterations,
    })
}

fn check_solution(model: &Gaussian1D, samples: usize) -> Result<(), FitError> {
    if model.amplitude.is_nan() || model.amplitude <= 0.0 {
        return Err(FitError::NonPositiveAmplitude {
            amplitude: model.amplitude,
        });
    }
    if !model.width.is_finite() || model.width <= MIN_WIDTH {
        return Err(FitError::InvalidWidth { width: model.width });
    }

    let upper = samples.saturating_sub(1) as f64;
    if !model.center.is_finite() || model.center < 0.0 || model.center > upper {
        return Err(FitError::CenterOutsideSupport {
            center: model.center,
            upper,
        });
    }

    Ok(())
}
