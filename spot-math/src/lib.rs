//! spot-math - Numerical building blocks for spot centroiding
//!
//! This crate provides the small, dependency-light numerical core used by
//! the spot drift pipeline:
//!
//! - **Gaussian** - 1-D Gaussian-plus-offset profile model and initial guesses
//! - **LM** - Levenberg-Marquardt least-squares fitting of 4-parameter models
//! - **Statistics** - Median, percentiles, robust scatter and fixed rounding
//!
//! # Example
//!
//! ```text
//! use spot_math::{fit_gaussian, FitConfig, Gaussian1D};
//!
//! let profile = vec![10.0, 12.0, 40.0, 90.0, 41.0, 12.0, 10.0];
//! let guess = Gaussian1D::initial_guess(&profile, 3.0);
//! let fit = fit_gaussian(&profile, guess, &FitConfig::default())?;
//! println!("center = {:.4}", fit.model.center);
//! ```

pub mod gaussian;
pub mod lm;
pub mod stats;

pub use gaussian::{fit_gaussian, Gaussian1D, GaussianFit};
pub use lm::{minimize, FitConfig, FitError, LmSolution, ProfileModel};
pub use stats::{mean, median, percentile, round_to, sigma_g};
