//! SPOTWATCH - spectrograph spot drift monitoring
//!
//! Tracks the sub-pixel positions of calibration spots across exposures and
//! nights. Frames flow through:
//!
//! - **ReferenceBuilder** - locates hand-picked spots once in a reference
//!   frame and persists their windows, centroids and intensities
//! - **DriftMeasurer** - re-measures every spot in its fixed window for each
//!   frame of a night and writes one observation file per frame
//! - **NightAggregator** - reduces the night's files to mean drift and
//!   normalized intensity, plus per-frame jitter
//! - **MasterLedger** - appends one row per night, at most once
//! - **QualityGate** - judges each night against fixed thresholds
//!
//! [`NightRunner`] sequences them with one [`PipelineConfig`].
//!
//! # Example
//!
//! ```text
//! use spotwatch::{MasterLedger, NightManifest, NightRunner, PipelineConfig, UtcJulianClock};
//!
//! let config = PipelineConfig::load_from_file(Path::new("spotwatch.json"))?;
//! let runner = NightRunner::new(config.clone())?;
//! runner.build_reference(&frames)?;
//!
//! let manifest = NightManifest::load_from_file(Path::new("20160721.txt"), None)?;
//! let mut ledger = MasterLedger::open(&config.ledger_path)?;
//! let report = runner.run_night(&manifest, &frames, &UtcJulianClock, &mut ledger)?;
//! println!("{}", report.quality);
//! ```

pub mod catalog;
pub mod centroid;
pub mod config;
pub mod drift;
pub mod error;
pub mod frame;
pub mod ledger;
pub mod mock_frames;
pub mod night;
pub mod quality;
pub mod reference;
pub mod runner;

mod records;

// Re-export commonly used types
pub use catalog::{load_approx_catalog, ApproxEntry, ReferenceCatalog, SpotDescriptor};
pub use centroid::{Centroid, CentroidExtractor, FitOutcome, LocatedSpot};
pub use config::{NightManifest, PipelineConfig};
pub use drift::{
    observation_path, read_observations, write_observations, DriftMeasurer, FrameMeasurement,
    FrameObservation,
};
pub use error::{InputKind, Result, SpotwatchError};
pub use frame::{crop_window, Frame, FrameError, FrameProvider, TimeService, UtcJulianClock, WindowError};
pub use ledger::{LedgerOutcome, LedgerRow, MasterLedger};
pub use mock_frames::MockFrameProvider;
pub use night::{FrameJitter, NightAggregate, NightAggregator, NightSummary};
pub use quality::{QualityGate, QualityReport, QualityThresholds, Verdict};
pub use records::COMMENT_SENTINEL;
pub use reference::ReferenceBuilder;
pub use runner::{NightReport, NightRunner};
pub use spot_math::FitConfig;
