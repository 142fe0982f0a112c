//! Reduction of a night's observation files to one summary row.
//!
//! Besides the nightly means, each usable frame gets an intra-night jitter
//! record: robust statistics of how far its spots sit from their own
//! per-night median positions.

use std::collections::{HashMap, HashSet};
use std::path::Path;

use spot_math::{mean, median, sigma_g};

use crate::catalog::ReferenceCatalog;
use crate::drift::{read_observations, FrameObservation};
use crate::error::{Result, SpotwatchError};

/// One night reduced to its mean drift and relative brightness.
#[derive(Debug, Clone, PartialEq)]
pub struct NightSummary {
    /// Integer part of the Julian Date of the first usable frame
    pub night_id: i64,
    pub mean_dx: f64,
    pub mean_dy: f64,
    /// Night mean intensity over the reference mean intensity
    pub normalized_intensity: f64,
    pub frames_used: usize,
    pub frames_omitted: usize,
}

/// Spread of spot positions within one frame relative to the night.
///
/// Offsets are in millipixels from each spot's per-night median position.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameJitter {
    pub julian_date: f64,
    pub median_dx_mpix: f64,
    pub sigma_dx_mpix: f64,
    pub median_dy_mpix: f64,
    pub sigma_dy_mpix: f64,
    pub median_intensity: f64,
    pub sigma_intensity: f64,
}

/// Summary plus per-frame jitter for one night.
#[derive(Debug, Clone, PartialEq)]
pub struct NightAggregate {
    pub summary: NightSummary,
    pub jitter: Vec<FrameJitter>,
}

/// Per-frame means of a usable observation file.
struct FrameMeans {
    julian_date: f64,
    dx: f64,
    dy: f64,
    intensity: f64,
}

/// Averages observation files against a reference catalog.
pub struct NightAggregator<'a> {
    catalog: &'a ReferenceCatalog,
}

impl<'a> NightAggregator<'a> {
    pub fn new(catalog: &'a ReferenceCatalog) -> Self {
        Self { catalog }
    }

    /// Aggregate a night's observation files.
    ///
    /// Files that cannot be read, or whose spot set does not match the
    /// catalog, are skipped and counted in `frames_omitted`. Every frame mean
    /// divides by the catalog size, never by a row count.
    pub fn aggregate<P: AsRef<Path>>(&self, files: &[P], night_token: &str) -> Result<NightAggregate> {
        let reference_mean = self
            .catalog
            .mean_intensity()
            .filter(|m| *m > 0.0)
            .ok_or_else(|| {
                SpotwatchError::InvalidConfig(
                    "reference catalog mean intensity must be positive".to_string(),
                )
            })?;

        let mut frames = Vec::with_capacity(files.len());
        let mut omitted = 0;
        for path in files {
            let path = path.as_ref();
            match self.load_frame(path) {
                Ok(rows) => frames.push(rows),
                Err(e) => {
                    log::warn!("Skipping observation file {}: {}", path.display(), e);
                    omitted += 1;
                }
            }
        }

        if frames.is_empty() {
            return Err(SpotwatchError::NoUsableFrames {
                night_token: night_token.to_string(),
            });
        }

        let spot_count = self.catalog.len() as f64;
        let means: Vec<FrameMeans> = frames
            .iter()
            .map(|rows| FrameMeans {
                julian_date: rows[0].julian_date,
                dx: rows.iter().map(|r| r.dx).sum::<f64>() / spot_count,
                dy: rows.iter().map(|r| r.dy).sum::<f64>() / spot_count,
                intensity: rows.iter().map(|r| r.intensity).sum::<f64>() / spot_count,
            })
            .collect();

        let frame_count = means.len() as f64;
        let night_intensity = means.iter().map(|m| m.intensity).sum::<f64>() / frame_count;
        let summary = NightSummary {
            night_id: means[0].julian_date.trunc() as i64,
            mean_dx: means.iter().map(|m| m.dx).sum::<f64>() / frame_count,
            mean_dy: means.iter().map(|m| m.dy).sum::<f64>() / frame_count,
            normalized_intensity: night_intensity / reference_mean,
            frames_used: frames.len(),
            frames_omitted: omitted,
        };

        log::info!(
            "Night {} ({}): dX={:.4} dY={:.4} I={:.4} from {} frames, {} omitted",
            night_token,
            summary.night_id,
            summary.mean_dx,
            summary.mean_dy,
            summary.normalized_intensity,
            summary.frames_used,
            summary.frames_omitted
        );

        Ok(NightAggregate {
            summary,
            jitter: frame_jitter(&frames),
        })
    }

    fn load_frame(&self, path: &Path) -> Result<Vec<FrameObservation>> {
        let rows = read_observations(path)?;

        if rows.len() != self.catalog.len() {
            return Err(SpotwatchError::malformed(
                path,
                0,
                format!(
                    "{} observations for a {}-spot catalog",
                    rows.len(),
                    self.catalog.len()
                ),
            ));
        }

        let mut seen = HashSet::with_capacity(rows.len());
        for row in &rows {
            if !self.catalog.contains(&row.id) || !seen.insert(row.id.as_str()) {
                return Err(SpotwatchError::malformed(
                    path,
                    0,
                    format!("unexpected spot id {:?}", row.id),
                ));
            }
        }

        Ok(rows)
    }
}

/// Per-spot night reference: median position and mean intensity.
struct SpotNightStats {
    x: f64,
    y: f64,
    intensity: f64,
}

fn frame_jitter(frames: &[Vec<FrameObservation>]) -> Vec<FrameJitter> {
    let mut per_spot: HashMap<&str, (Vec<f64>, Vec<f64>, Vec<f64>)> = HashMap::new();
    for row in frames.iter().flatten() {
        let entry = per_spot.entry(row.id.as_str()).or_default();
        entry.0.push(row.centroid_x);
        entry.1.push(row.centroid_y);
        entry.2.push(row.intensity);
    }

    let stats: HashMap<&str, SpotNightStats> = per_spot
        .into_iter()
        .map(|(id, (xs, ys, intensities))| {
            let stats = SpotNightStats {
                x: median(&xs).unwrap_or(f64::NAN),
                y: median(&ys).unwrap_or(f64::NAN),
                intensity: mean(&intensities).unwrap_or(f64::NAN),
            };
            (id, stats)
        })
        .collect();

    frames
        .iter()
        .map(|rows| {
            let mut dx = Vec::with_capacity(rows.len());
            let mut dy = Vec::with_capacity(rows.len());
            let mut intensity = Vec::with_capacity(rows.len());

            for row in rows {
                let Some(spot) = stats.get(row.id.as_str()) else {
                    continue;
                };
                dx.push((row.centroid_x - spot.x) * 1000.0);
                dy.push((row.centroid_y - spot.y) * 1000.0);
                intensity.push(if spot.intensity > 0.0 {
                    row.intensity / spot.intensity
                } else {
                    f64::NAN
                });
            }

            FrameJitter {
                julian_date: rows[0].julian_date,
                median_dx_mpix: median(&dx).unwrap_or(f64::NAN),
                sigma_dx_mpix: sigma_g(&dx).unwrap_or(f64::NAN),
                median_dy_mpix: median(&dy).unwrap_or(f64::NAN),
                sigma_dy_mpix: sigma_g(&dy).unwrap_or(f64::NAN),
                median_intensity: median(&intensity).unwrap_or(f64::NAN),
                sigma_intensity: sigma_g(&intensity).unwrap_or(f64::NAN),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::SpotDescriptor;
    use crate::drift::{observation_path, write_observations};
    use approx::assert_relative_eq;
    use std::fs;
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn catalog(n: usize, intensity: f64) -> ReferenceCatalog {
        ReferenceCatalog::new(
            10,
            (0..n)
                .map(|i| SpotDescriptor::new(format!("s{i}"), 0, 0, 10.0, 10.0, intensity))
                .collect(),
        )
    }

    fn observation(id: &str, dx: f64, dy: f64, intensity: f64, jd: f64) -> FrameObservation {
        FrameObservation {
            id: id.to_string(),
            centroid_x: 10.0 - dx,
            centroid_y: 10.0 - dy,
            dx,
            dy,
            intensity,
            julian_date: jd,
        }
    }

    fn write_frame(dir: &Path, name: &str, rows: &[FrameObservation]) -> PathBuf {
        let path = observation_path(dir, "n1", name);
        write_observations(&path, rows).unwrap();
        path
    }

    #[test]
    fn test_aggregate_means_and_night_id() {
        let dir = TempDir::new().unwrap();
        let catalog = catalog(2, 1000.0);

        let f1 = write_frame(
            dir.path(),
            "f1",
            &[
                observation("s0", 0.01, -0.02, 1000.0, 2_457_590.7),
                observation("s1", 0.03, 0.00, 1020.0, 2_457_590.7),
            ],
        );
        let f2 = write_frame(
            dir.path(),
            "f2",
            &[
                observation("s0", 0.02, -0.01, 990.0, 2_457_591.1),
                observation("s1", 0.04, 0.01, 1010.0, 2_457_591.1),
            ],
        );

        let aggregate = NightAggregator::new(&catalog)
            .aggregate(&[f1, f2], "n1")
            .unwrap();
        let summary = aggregate.summary;

        assert_eq!(summary.night_id, 2_457_590);
        assert_relative_eq!(summary.mean_dx, 0.025, epsilon = 1e-12);
        assert_relative_eq!(summary.mean_dy, -0.005, epsilon = 1e-12);
        assert_relative_eq!(summary.normalized_intensity, 1.005, epsilon = 1e-12);
        assert_eq!(summary.frames_used, 2);
        assert_eq!(summary.frames_omitted, 0);
        assert_eq!(aggregate.jitter.len(), 2);
    }

    #[test]
    fn test_incomplete_and_missing_files_are_omitted() {
        let dir = TempDir::new().unwrap();
        let catalog = catalog(2, 1000.0);

        let good = write_frame(
            dir.path(),
            "good",
            &[
                observation("s0", 0.01, 0.01, 1000.0, 2_457_590.7),
                observation("s1", 0.01, 0.01, 1000.0, 2_457_590.7),
            ],
        );
        let short = write_frame(
            dir.path(),
            "short",
            &[observation("s0", 5.0, 5.0, 1000.0, 2_457_590.8)],
        );
        let foreign = write_frame(
            dir.path(),
            "foreign",
            &[
                observation("s0", 5.0, 5.0, 1000.0, 2_457_590.8),
                observation("zz", 5.0, 5.0, 1000.0, 2_457_590.8),
            ],
        );
        let missing = dir.path().join("nope.spot");
        let garbage = dir.path().join("garbage.spot");
        fs::write(&garbage, "not,a,record\n").unwrap();

        let aggregate = NightAggregator::new(&catalog)
            .aggregate(&[short, missing, good, foreign, garbage], "n1")
            .unwrap();

        assert_eq!(aggregate.summary.frames_used, 1);
        assert_eq!(aggregate.summary.frames_omitted, 4);
        assert_relative_eq!(aggregate.summary.mean_dx, 0.01, epsilon = 1e-12);
    }

    #[test]
    fn test_no_usable_frames_is_an_error() {
        let dir = TempDir::new().unwrap();
        let catalog = catalog(1, 1000.0);
        let files = [dir.path().join("missing.spot")];

        assert!(matches!(
            NightAggregator::new(&catalog).aggregate(&files, "n1"),
            Err(SpotwatchError::NoUsableFrames { night_token }) if night_token == "n1"
        ));
        assert!(matches!(
            NightAggregator::new(&catalog).aggregate::<PathBuf>(&[], "n1"),
            Err(SpotwatchError::NoUsableFrames { .. })
        ));
    }

    #[test]
    fn test_zero_reference_intensity_is_rejected() {
        let catalog = catalog(1, 0.0);
        assert!(matches!(
            NightAggregator::new(&catalog).aggregate::<PathBuf>(&[], "n1"),
            Err(SpotwatchError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_jitter_relative_to_night_medians() {
        let frames = vec![
            vec![
                observation("s0", 0.0, 0.0, 100.0, 1.0),
                observation("s1", 0.0, 0.0, 200.0, 1.0),
            ],
            vec![
                observation("s0", -0.002, 0.0, 100.0, 2.0),
                observation("s1", -0.002, 0.0, 200.0, 2.0),
            ],
            vec![
                observation("s0", -0.004, 0.0, 100.0, 3.0),
                observation("s1", -0.004, 0.0, 200.0, 3.0),
            ],
        ];

        let jitter = frame_jitter(&frames);

        assert_eq!(jitter.len(), 3);
        // Middle frame sits on the per-spot median
        assert_relative_eq!(jitter[1].median_dx_mpix, 0.0, epsilon = 1e-6);
        assert_relative_eq!(jitter[0].median_dx_mpix, -2.0, epsilon = 1e-6);
        assert_relative_eq!(jitter[2].median_dx_mpix, 2.0, epsilon = 1e-6);
        assert_relative_eq!(jitter[2].sigma_dx_mpix, 0.0, epsilon = 1e-6);
        assert_relative_eq!(jitter[0].median_dy_mpix, 0.0, epsilon = 1e-9);
        assert_relative_eq!(jitter[0].median_intensity, 1.0, epsilon = 1e-12);
        assert_eq!(jitter[2].julian_date, 3.0);
    }
}
