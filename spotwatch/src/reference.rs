//! Reference catalog construction from the reference frame.

use std::path::Path;

use crate::catalog::{ApproxEntry, ReferenceCatalog, SpotDescriptor};
use crate::centroid::{CentroidExtractor, FitOutcome};
use crate::error::{Result, SpotwatchError};
use crate::frame::Frame;

/// Turns approximate spot positions into a reference catalog.
#[derive(Debug, Clone)]
pub struct ReferenceBuilder {
    extractor: CentroidExtractor,
}

impl ReferenceBuilder {
    pub fn new(extractor: CentroidExtractor) -> Self {
        Self { extractor }
    }

    /// Locate every approximate entry in the reference frame.
    ///
    /// The output has one descriptor per entry, in input order. A spot whose
    /// window leaves the frame aborts the build with the spot's id.
    pub fn build(&self, entries: &[ApproxEntry], frame: &Frame) -> Result<ReferenceCatalog> {
        let mut spots = Vec::with_capacity(entries.len());
        let mut fallbacks = 0;

        for entry in entries {
            let located = self
                .extractor
                .locate(&frame.pixels, entry.x, entry.y)
                .map_err(|source| SpotwatchError::OutOfBounds {
                    spot: entry.id.clone(),
                    source,
                })?;

            if let FitOutcome::Diverged { warning, .. } = &located.centroid {
                log::warn!("Reference spot {}: {}", entry.id, warning);
                fallbacks += 1;
            }

            let centroid = located.centroid.value();
            log::debug!(
                "Reference spot {} at ({:.4}, {:.4}), window ({}, {})",
                entry.id,
                centroid.x,
                centroid.y,
                located.window_x,
                located.window_y
            );

            spots.push(SpotDescriptor::new(
                entry.id.clone(),
                located.window_x,
                located.window_y,
                centroid.x,
                centroid.y,
                located.intensity,
            ));
        }

        log::info!(
            "Built reference catalog with {} spots ({} center-of-mass fallbacks)",
            spots.len(),
            fallbacks
        );
        Ok(ReferenceCatalog::new(self.extractor.half_width(), spots))
    }

    /// Build the catalog and persist it to `path`.
    pub fn build_and_save(
        &self,
        entries: &[ApproxEntry],
        frame: &Frame,
        path: &Path,
    ) -> Result<ReferenceCatalog> {
        let catalog = self.build(entries, frame)?;
        catalog.save(path)?;
        log::info!("Saved reference catalog to {}", path.display());
        Ok(catalog)
    }
}
