//! Pipeline configuration and night manifests.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use spot_math::FitConfig;

use crate::error::{InputKind, Result, SpotwatchError};
use crate::quality::QualityThresholds;
use crate::records::{data_lines, read_required, write_atomically};

/// Everything a run needs, passed explicitly into each component.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Half-width W of the 2W×2W spot windows (pixels)
    pub window_half_width: usize,
    /// Hand-picked approximate spot positions
    pub approx_catalog_path: PathBuf,
    /// Persisted reference catalog
    pub reference_catalog_path: PathBuf,
    /// Frame the reference catalog is built from
    pub reference_frame_id: String,
    /// Root directory for per-frame observation files
    pub observation_dir: PathBuf,
    /// Master ledger file
    pub ledger_path: PathBuf,
    pub thresholds: QualityThresholds,
    pub fit: FitConfig,
    /// Worker threads for per-frame spot measurement; `None` uses rayon's default
    pub workers: Option<usize>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            window_half_width: 10,
            approx_catalog_path: PathBuf::from("spots.txt"),
            reference_catalog_path: PathBuf::from("input_spot.txt"),
            reference_frame_id: String::new(),
            observation_dir: PathBuf::from("spot_observations"),
            ledger_path: PathBuf::from("spot_ledger.txt"),
            thresholds: QualityThresholds::default(),
            fit: FitConfig::default(),
            workers: None,
        }
    }
}

impl PipelineConfig {
    /// Check values that serde cannot.
    pub fn validate(&self) -> Result<()> {
        // Each marginal profile needs at least as many samples as fit parameters
        if self.window_half_width < 2 {
            return Err(SpotwatchError::InvalidConfig(format!(
                "window_half_width must be at least 2, got {}",
                self.window_half_width
            )));
        }
        if self.reference_frame_id.trim().is_empty() {
            return Err(SpotwatchError::InvalidConfig(
                "reference_frame_id must be set".to_string(),
            ));
        }
        if self.workers == Some(0) {
            return Err(SpotwatchError::InvalidConfig(
                "workers must be positive when set".to_string(),
            ));
        }
        if self.fit.max_iterations == 0 {
            return Err(SpotwatchError::InvalidConfig(
                "fit.max_iterations must be positive".to_string(),
            ));
        }

        let t = &self.thresholds;
        let positive = |v: f64| v.is_finite() && v > 0.0;
        if !positive(t.max_abs_dx) || !positive(t.max_abs_dy) {
            return Err(SpotwatchError::InvalidConfig(format!(
                "displacement thresholds must be positive, got dX {} dY {}",
                t.max_abs_dx, t.max_abs_dy
            )));
        }
        if !(t.min_intensity.is_finite() && t.max_intensity.is_finite())
            || t.min_intensity >= t.max_intensity
        {
            return Err(SpotwatchError::InvalidConfig(format!(
                "intensity bounds must satisfy min < max, got ({}, {})",
                t.min_intensity, t.max_intensity
            )));
        }

        Ok(())
    }

    /// Load and validate a JSON configuration file.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let contents = read_required(path, InputKind::Config)?;
        let config: Self = serde_json::from_str(&contents).map_err(|source| SpotwatchError::Json {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Save as pretty-printed JSON.
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self).map_err(|source| SpotwatchError::Json {
            path: path.to_path_buf(),
            source,
        })?;
        write_atomically(path, &json)
    }
}

/// Ordered frame ids making up one night.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NightManifest {
    /// Label used for the night's observation directory and file names
    pub night_token: String,
    pub frames: Vec<String>,
}

impl NightManifest {
    pub fn new(night_token: impl Into<String>, frames: Vec<String>) -> Self {
        Self {
            night_token: night_token.into(),
            frames,
        }
    }

    /// Read a manifest with one frame id per line. Blank and `@` lines are
    /// skipped. The night token defaults to the file stem.
    pub fn load_from_file(path: &Path, night_token: Option<&str>) -> Result<Self> {
        let contents = read_required(path, InputKind::Manifest)?;
        let frames = data_lines(&contents)
            .map(|(_, line)| line.to_string())
            .collect();

        let night_token = match night_token {
            Some(token) => token.to_string(),
            None => path
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .ok_or_else(|| {
                    SpotwatchError::InvalidConfig(format!(
                        "cannot derive night token from {}",
                        path.display()
                    ))
                })?,
        };

        Ok(Self::new(night_token, frames))
    }

    /// Write the manifest back out, one id per line.
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        let mut contents = format!("@night {}\n", self.night_token);
        for frame in &self.frames {
            contents.push_str(frame);
            contents.push('\n');
        }
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| SpotwatchError::io(parent, e))?;
        }
        fs::write(path, contents).map_err(|e| SpotwatchError::io(path, e))
    }
}
