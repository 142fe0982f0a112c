//! Pass/fail classification of nightly drift and brightness.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::ledger::LedgerRow;
use crate::night::NightSummary;

/// Acceptance limits for one night.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QualityThresholds {
    /// Largest accepted |mean dX| (pixels)
    pub max_abs_dx: f64,
    /// Largest accepted |mean dY| (pixels)
    pub max_abs_dy: f64,
    /// Lower bound of the accepted normalized intensity (exclusive)
    pub min_intensity: f64,
    /// Upper bound of the accepted normalized intensity (exclusive)
    pub max_intensity: f64,
}

impl Default for QualityThresholds {
    fn default() -> Self {
        Self {
            max_abs_dx: 0.02,
            max_abs_dy: 0.02,
            min_intensity: 0.99,
            max_intensity: 1.01,
        }
    }
}

/// Outcome of one check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Pass,
    Fail,
}

impl Verdict {
    fn from_bool(ok: bool) -> Self {
        if ok {
            Verdict::Pass
        } else {
            Verdict::Fail
        }
    }

    pub fn is_pass(self) -> bool {
        self == Verdict::Pass
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Verdict::Pass => f.write_str("OK"),
            Verdict::Fail => f.write_str("NO OK - CHECK"),
        }
    }
}

/// Verdicts for the three nightly quantities, with the values checked.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QualityReport {
    pub mean_dx: f64,
    pub mean_dy: f64,
    pub normalized_intensity: f64,
    pub dx: Verdict,
    pub dy: Verdict,
    pub intensity: Verdict,
}

impl QualityReport {
    pub fn all_pass(&self) -> bool {
        self.dx.is_pass() && self.dy.is_pass() && self.intensity.is_pass()
    }
}

impl fmt::Display for QualityReport {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        writeln!(f, "Mean dX = {:.4} px: {}", self.mean_dx, self.dx)?;
        writeln!(f, "Mean dY = {:.4} px: {}", self.mean_dy, self.dy)?;
        write!(
            f,
            "Normalized intensity = {:.6}: {}",
            self.normalized_intensity, self.intensity
        )
    }
}

/// Applies [`QualityThresholds`] to nightly values.
#[derive(Debug, Clone, Copy, Default)]
pub struct QualityGate {
    thresholds: QualityThresholds,
}

impl QualityGate {
    pub fn new(thresholds: QualityThresholds) -> Self {
        Self { thresholds }
    }

    /// Classify raw nightly values. Bounds are strict and NaN always fails.
    pub fn check_values(&self, mean_dx: f64, mean_dy: f64, normalized_intensity: f64) -> QualityReport {
        let t = &self.thresholds;
        QualityReport {
            mean_dx,
            mean_dy,
            normalized_intensity,
            dx: Verdict::from_bool(mean_dx.abs() < t.max_abs_dx),
            dy: Verdict::from_bool(mean_dy.abs() < t.max_abs_dy),
            intensity: Verdict::from_bool(
                normalized_intensity > t.min_intensity && normalized_intensity < t.max_intensity,
            ),
        }
    }

    pub fn check(&self, summary: &NightSummary) -> QualityReport {
        self.check_values(summary.mean_dx, summary.mean_dy, summary.normalized_intensity)
    }

    pub fn check_row(&self, row: &LedgerRow) -> QualityReport {
        self.check_values(row.mean_dx, row.mean_dy, row.normalized_intensity)
    }
}
