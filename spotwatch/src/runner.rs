//! Sequencing of the reference build and a night's run.

use std::collections::HashSet;
use std::path::PathBuf;

use crate::catalog::{load_approx_catalog, ReferenceCatalog};
use crate::centroid::CentroidExtractor;
use crate::config::{NightManifest, PipelineConfig};
use crate::drift::{observation_path, write_observations, DriftMeasurer};
use crate::error::{Result, SpotwatchError};
use crate::frame::{FrameProvider, TimeService};
use crate::ledger::{LedgerOutcome, MasterLedger};
use crate::night::{FrameJitter, NightAggregator, NightSummary};
use crate::quality::{QualityGate, QualityReport};
use crate::reference::ReferenceBuilder;

/// Everything a night's run produced.
#[derive(Debug, Clone)]
pub struct NightReport {
    pub summary: NightSummary,
    pub ledger: LedgerOutcome,
    pub quality: QualityReport,
    pub jitter: Vec<FrameJitter>,
    /// Observation files written, in manifest order
    pub observation_files: Vec<PathBuf>,
    /// Frames dropped at load, measurement or aggregation
    pub frames_omitted: usize,
    /// Spot fits that fell back to the center of mass
    pub diverged_fits: usize,
}

/// Drives the pipeline components with one validated configuration.
#[derive(Debug)]
pub struct NightRunner {
    config: PipelineConfig,
    builder: ReferenceBuilder,
    measurer: DriftMeasurer,
    gate: QualityGate,
}

impl NightRunner {
    pub fn new(config: PipelineConfig) -> Result<Self> {
        config.validate()?;

        let extractor = CentroidExtractor::new(config.window_half_width, config.fit.clone());
        let builder = ReferenceBuilder::new(extractor.clone());
        let measurer = DriftMeasurer::new(extractor, config.workers)?;
        let gate = QualityGate::new(config.thresholds);

        Ok(Self {
            config,
            builder,
            measurer,
            gate,
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Build and persist the reference catalog from the configured
    /// reference frame.
    pub fn build_reference<F: FrameProvider>(&self, frames: &F) -> Result<ReferenceCatalog> {
        let entries = load_approx_catalog(&self.config.approx_catalog_path)?;
        log::info!(
            "Building reference catalog from frame {} with {} approximate spots",
            self.config.reference_frame_id,
            entries.len()
        );

        let frame = frames.load(&self.config.reference_frame_id)?;
        self.builder
            .build_and_save(&entries, &frame, &self.config.reference_catalog_path)
    }

    /// Measure, aggregate, record and judge one night.
    ///
    /// A frame that cannot be loaded or whose windows leave the frame is
    /// dropped and counted. So is a frame whose observation file name was
    /// already written this night (a repeated id or file stem). A missing reference catalog or a filesystem
    /// failure aborts the run. The ledger is touched only after aggregation
    /// succeeds.
    pub fn run_night<F: FrameProvider, T: TimeService>(
        &self,
        manifest: &NightManifest,
        frames: &F,
        clock: &T,
        ledger: &mut MasterLedger,
    ) -> Result<NightReport> {
        let catalog = ReferenceCatalog::load(
            &self.config.reference_catalog_path,
            self.config.window_half_width,
        )?;
        log::info!(
            "Night {}: {} frames against {} reference spots",
            manifest.night_token,
            manifest.frames.len(),
            catalog.len()
        );

        let mut observation_files = Vec::with_capacity(manifest.frames.len());
        let mut dropped = 0;
        let mut diverged_fits = 0;
        let mut written = HashSet::new();

        for frame_id in &manifest.frames {
            let path = observation_path(
                &self.config.observation_dir,
                &manifest.night_token,
                frame_id,
            );
            if written.contains(&path) {
                log::warn!(
                    "Dropping frame {}: {} already written this night",
                    frame_id,
                    path.display()
                );
                dropped += 1;
                continue;
            }

            let frame = match frames.load(frame_id) {
                Ok(frame) => frame,
                Err(e) => {
                    log::warn!("Dropping frame {}: {}", frame_id, e);
                    dropped += 1;
                    continue;
                }
            };

            let julian_date = clock.to_julian_date(&frame.captured_at);
            let measurement = match self.measurer.measure_frame(&catalog, &frame, julian_date) {
                Ok(measurement) => measurement,
                Err(e @ SpotwatchError::OutOfBounds { .. }) => {
                    log::warn!("Dropping frame {}: {}", frame_id, e);
                    dropped += 1;
                    continue;
                }
                Err(e) => return Err(e),
            };
            diverged_fits += measurement.fallbacks;

            write_observations(&path, &measurement.observations)?;
            log::debug!(
                "Frame {} (JD {:.6}) -> {}",
                frame_id,
                measurement.julian_date,
                path.display()
            );
            written.insert(path.clone());
            observation_files.push(path);
        }

        let aggregate = NightAggregator::new(&catalog).aggregate(&observation_files, &manifest.night_token)?;
        let mut summary = aggregate.summary;
        summary.frames_omitted += dropped;

        let ledger_outcome = ledger.append_if_absent(&summary)?;
        let quality = self.gate.check(&summary);
        for line in quality.to_string().lines() {
            log::info!("Night {}: {}", summary.night_id, line);
        }

        Ok(NightReport {
            frames_omitted: summary.frames_omitted,
            summary,
            ledger: ledger_outcome,
            quality,
            jitter: aggregate.jitter,
            observation_files,
            diverged_fits,
        })
    }
}
