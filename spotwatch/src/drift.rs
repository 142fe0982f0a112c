//! Per-frame displacement measurement against the reference catalog.
//!
//! Observation files, one per frame:
//!
//! ```text
//! @id,centroidX,centroidY,dX,dY,intensity,julianDate
//! s001,100.3012,200.6990,-0.0012,0.0008,15140.0021,2457590.654321
//! ```
//!
//! Displacements are `reference − measured` in pixels.

use std::path::{Path, PathBuf};

use rayon::prelude::*;
use spot_math::round_to;

use crate::catalog::{ReferenceCatalog, SpotDescriptor, VALUE_DECIMALS};
use crate::centroid::{CentroidExtractor, FitOutcome};
use crate::error::{InputKind, Result, SpotwatchError};
use crate::frame::Frame;
use crate::records::{data_lines, fixed, read_required, write_atomically, Record};

/// Decimal places kept for Julian Dates
pub const JD_DECIMALS: u32 = 6;

/// Header line of an observation file
pub const OBSERVATION_HEADER: &str = "@id,centroidX,centroidY,dX,dY,intensity,julianDate";

/// File extension of observation files
pub const OBSERVATION_EXTENSION: &str = "spot";

/// One spot measured in one frame.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameObservation {
    pub id: String,
    pub centroid_x: f64,
    pub centroid_y: f64,
    /// Reference minus measured column position
    pub dx: f64,
    /// Reference minus measured row position
    pub dy: f64,
    pub intensity: f64,
    pub julian_date: f64,
}

impl FrameObservation {
    fn to_line(&self) -> String {
        format!(
            "{},{},{},{},{},{},{}",
            self.id,
            fixed(self.centroid_x, VALUE_DECIMALS),
            fixed(self.centroid_y, VALUE_DECIMALS),
            fixed(self.dx, VALUE_DECIMALS),
            fixed(self.dy, VALUE_DECIMALS),
            fixed(self.intensity, VALUE_DECIMALS),
            fixed(self.julian_date, JD_DECIMALS),
        )
    }
}

/// All spots of one frame, in catalog order.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameMeasurement {
    pub julian_date: f64,
    pub observations: Vec<FrameObservation>,
    /// Spots whose fit fell back to the center of mass
    pub fallbacks: usize,
}

/// Measures catalog spots in later frames using the reference windows.
#[derive(Debug)]
pub struct DriftMeasurer {
    extractor: CentroidExtractor,
    pool: rayon::ThreadPool,
}

impl DriftMeasurer {
    /// Create a measurer. `workers` sizes the per-frame thread pool; `None`
    /// lets rayon pick.
    pub fn new(extractor: CentroidExtractor, workers: Option<usize>) -> Result<Self> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers.unwrap_or(0))
            .thread_name(|idx| format!("spot-measure-{idx}"))
            .build()
            .map_err(|e| SpotwatchError::InvalidConfig(format!("thread pool: {e}")))?;
        Ok(Self { extractor, pool })
    }

    /// Measure one spot in the window stored in its descriptor.
    pub fn measure(
        &self,
        descriptor: &SpotDescriptor,
        frame: &Frame,
        julian_date: f64,
    ) -> Result<FitOutcome<FrameObservation>> {
        let located = self
            .extractor
            .measure_at(&frame.pixels, descriptor.window_x, descriptor.window_y)
            .map_err(|source| SpotwatchError::OutOfBounds {
                spot: descriptor.id.clone(),
                source,
            })?;
        let intensity = located.intensity;

        Ok(located.centroid.map(|c| FrameObservation {
            id: descriptor.id.clone(),
            centroid_x: round_to(c.x, VALUE_DECIMALS),
            centroid_y: round_to(c.y, VALUE_DECIMALS),
            dx: round_to(descriptor.centroid_x - c.x, VALUE_DECIMALS),
            dy: round_to(descriptor.centroid_y - c.y, VALUE_DECIMALS),
            intensity: round_to(intensity, VALUE_DECIMALS),
            julian_date: round_to(julian_date, JD_DECIMALS),
        }))
    }

    /// Measure every catalog spot in a frame.
    ///
    /// Spots are measured in parallel; results keep catalog order. Any spot
    /// window leaving the frame fails the whole frame.
    pub fn measure_frame(
        &self,
        catalog: &ReferenceCatalog,
        frame: &Frame,
        julian_date: f64,
    ) -> Result<FrameMeasurement> {
        if catalog.half_width() != self.extractor.half_width() {
            return Err(SpotwatchError::InvalidConfig(format!(
                "catalog built with half-width {}, measuring with {}",
                catalog.half_width(),
                self.extractor.half_width()
            )));
        }

        let outcomes: Vec<FitOutcome<FrameObservation>> = self.pool.install(|| {
            catalog
                .spots()
                .par_iter()
                .map(|descriptor| self.measure(descriptor, frame, julian_date))
                .collect::<Result<Vec<_>>>()
        })?;

        let mut fallbacks = 0;
        let observations = outcomes
            .into_iter()
            .map(|outcome| {
                if let FitOutcome::Diverged { fallback, warning } = &outcome {
                    log::warn!("Spot {}: {}", fallback.id, warning);
                    fallbacks += 1;
                }
                outcome.into_value()
            })
            .collect();

        Ok(FrameMeasurement {
            julian_date: round_to(julian_date, JD_DECIMALS),
            observations,
            fallbacks,
        })
    }
}

/// Path of the observation file for `frame_id` within a night.
///
/// `<dir>/<night_token>/<frame_stem>_<night_token>.spot`
pub fn observation_path(dir: &Path, night_token: &str, frame_id: &str) -> PathBuf {
    let stem = Path::new(frame_id)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| frame_id.to_string());
    dir.join(night_token)
        .join(format!("{stem}_{night_token}.{OBSERVATION_EXTENSION}"))
}

/// Write one frame's observations, replacing any existing file.
pub fn write_observations(path: &Path, observations: &[FrameObservation]) -> Result<()> {
    let mut contents = String::with_capacity(96 * (observations.len() + 1));
    contents.push_str(OBSERVATION_HEADER);
    contents.push('\n');
    for observation in observations {
        contents.push_str(&observation.to_line());
        contents.push('\n');
    }
    write_atomically(path, &contents)
}

/// Read an observation file back.
pub fn read_observations(path: &Path) -> Result<Vec<FrameObservation>> {
    let contents = read_required(path, InputKind::Observations)?;

    data_lines(&contents)
        .map(|(line, text)| {
            let record = Record::parse(path, line, text, 7)?;
            Ok(FrameObservation {
                id: record.text(0, "id")?.to_string(),
                centroid_x: record.float(1, "centroid x")?,
                centroid_y: record.float(2, "centroid y")?,
                dx: record.float(3, "dX")?,
                dy: record.float(4, "dY")?,
                intensity: record.float(5, "intensity")?,
                julian_date: record.float(6, "julian date")?,
            })
        })
        .collect()
}
