//! Levenberg-Marquardt least squares for 4-parameter profile models.
//!
//! The damped normal equations are solved with nalgebra's LU decomposition.
//! Damping scales the diagonal of JᵀJ (Marquardt), so an amplitude in the
//! thousands and a sub-pixel center are stepped on comparable terms.

use nalgebra::{Matrix4, Vector4};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Configuration for Levenberg-Marquardt optimization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FitConfig {
    /// Maximum number of iterations before giving up
    pub max_iterations: usize,
    /// Relative step size below which the fit is considered converged
    pub step_tolerance: f64,
    /// Relative chi² decrease below which the fit is considered converged
    pub chi2_tolerance: f64,
    /// Initial damping parameter
    pub initial_lambda: f64,
    /// Factor applied to lambda after a rejected step
    pub lambda_up: f64,
    /// Factor applied to lambda after an accepted step
    pub lambda_down: f64,
}

impl Default for FitConfig {
    fn default() -> Self {
        Self {
            max_iterations: 200,
            step_tolerance: 1e-10,
            chi2_tolerance: 1e-14,
            initial_lambda: 1e-3,
            lambda_up: 10.0,
            lambda_down: 0.1,
        }
    }
}

/// Damping above which the optimizer stops trying to find a downhill step.
const MAX_LAMBDA: f64 = 1e12;

/// Reasons a profile fit can fail to produce a usable solution.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FitError {
    /// Fewer samples than free parameters
    #[error("need at least {required} samples, got {samples}")]
    TooFewSamples { samples: usize, required: usize },

    /// Coordinate and value slices differ in length
    #[error("sample length mismatch: {coords} coordinates vs {values} values")]
    LengthMismatch { coords: usize, values: usize },

    /// Normal equations could not be solved
    #[error("singular normal equations at iteration {iteration}")]
    SingularSystem { iteration: usize },

    /// Iteration budget or damping range exhausted
    #[error("no convergence after {iterations} iterations (chi2={chi2:.6e})")]
    NotConverged { iterations: usize, chi2: f64 },

    /// Model produced NaN or infinite residuals
    #[error("non-finite residuals at iteration {iteration}")]
    NonFinite { iteration: usize },

    /// Fitted width is zero, negative or not finite
    #[error("fitted width {width:.4} is not positive")]
    InvalidWidth { width: f64 },

    /// Fitted profile has no positive bump above its baseline
    #[error("fitted amplitude {amplitude:.4} is not positive")]
    NonPositiveAmplitude { amplitude: f64 },

    /// Fitted center lies outside the sampled support
    #[error("fitted center {center:.4} lies outside [0, {upper}]")]
    CenterOutsideSupport { center: f64, upper: f64 },
}

/// A 4-parameter model of a 1-D profile that can be fit with [`minimize`].
pub trait ProfileModel {
    /// Evaluate the model at coordinate `t`.
    fn evaluate(&self, t: f64, params: &Vector4<f64>) -> f64;

    /// Partial derivatives of the model with respect to each parameter at `t`.
    fn jacobian_row(&self, t: f64, params: &Vector4<f64>) -> Vector4<f64>;

    /// Apply parameter constraints after an update.
    fn constrain(&self, _params: &mut Vector4<f64>) {}
}

/// Converged least-squares solution.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LmSolution {
    pub params: Vector4<f64>,
    /// Sum of squared residuals at `params`
    pub chi2: f64,
    pub iterations: usize,
}

/// Fit `model` to the samples `(coords[i], values[i])` starting from `initial`.
///
/// Returns `Err` when the system is singular, the residuals become non-finite,
/// or no convergence criterion is met within the configured budget. Callers
/// decide how to recover; this function never panics on bad data.
pub fn minimize<M: ProfileModel>(
    model: &M,
    coords: &[f64],
    values: &[f64],
    initial: Vector4<f64>,
    config: &FitConfig,
) -> Result<LmSolution, FitError> {
    if coords.len() != values.len() {
        return Err(FitError::LengthMismatch {
            coords: coords.len(),
            values: values.len(),
        });
    }
    if coords.len() < 4 {
        return Err(FitError::TooFewSamples {
            samples: coords.len(),
            required: 4,
        });
    }

    let mut params = initial;
    model.constrain(&mut params);
    let mut lambda = config.initial_lambda;
    let mut chi2 = chi_squared(model, coords, values, &params);
    if !chi2.is_finite() {
        return Err(FitError::NonFinite { iteration: 0 });
    }

    for iteration in 1..=config.max_iterations {
        if chi2 == 0.0 {
            return Ok(LmSolution {
                params,
                chi2,
                iterations: iteration - 1,
            });
        }

        let (hessian, gradient) = normal_equations(model, coords, values, &params);

        let mut damped = hessian;
        for i in 0..4 {
            damped[(i, i)] *= 1.0 + lambda;
        }

        let Some(delta) = damped.lu().solve(&gradient) else {
            return Err(FitError::SingularSystem { iteration });
        };
        if delta.iter().any(|d| !d.is_finite()) {
            return Err(FitError::NonFinite { iteration });
        }

        let step_is_small = delta
            .iter()
            .zip(params.iter())
            .all(|(d, p)| d.abs() <= config.step_tolerance * (p.abs() + config.step_tolerance));

        let mut candidate = params + delta;
        model.constrain(&mut candidate);
        let candidate_chi2 = chi_squared(model, coords, values, &candidate);

        if candidate_chi2.is_finite() && candidate_chi2 < chi2 {
            let improvement = chi2 - candidate_chi2;
            let previous = chi2;
            params = candidate;
            chi2 = candidate_chi2;
            lambda *= config.lambda_down;

            if step_is_small || improvement <= config.chi2_tolerance * previous {
                return Ok(LmSolution {
                    params,
                    chi2,
                    iterations: iteration,
                });
            }
        } else {
            // Nowhere downhill left to go within numerical precision
            if step_is_small {
                return Ok(LmSolution {
                    params,
                    chi2,
                    iterations: iteration,
                });
            }
            lambda *= config.lambda_up;
            if lambda > MAX_LAMBDA {
                return Err(FitError::NotConverged {
                    iterations: iteration,
                    chi2,
                });
            }
        }
    }

    Err(FitError::NotConverged {
        iterations: config.max_iterations,
        chi2,
    })
}

fn chi_squared<M: ProfileModel>(
    model: &M,
    coords: &[f64],
    values: &[f64],
    params: &Vector4<f64>,
) -> f64 {
    coords
        .iter()
        .zip(values.iter())
        .map(|(&t, &v)| {
            let residual = v - model.evaluate(t, params);
            residual * residual
        })
        .sum()
}

/// Accumulate JᵀJ and Jᵀr for the current parameters.
fn normal_equations<M: ProfileModel>(
    model: &M,
    coords: &[f64],
    values: &[f64],
    params: &Vector4<f64>,
) -> (Matrix4<f64>, Vector4<f64>) {
    let mut hessian = Matrix4::<f64>::zeros();
    let mut gradient = Vector4::<f64>::zeros();

    for (&t, &v) in coords.iter().zip(values.iter()) {
        let row = model.jacobian_row(t, params);
        let residual = v - model.evaluate(t, params);
        hessian += row * row.transpose();
        gradient += row * residual;
    }

    (hessian, gradient)
}
