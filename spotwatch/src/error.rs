use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

use crate::frame::{FrameError, WindowError};

/// Which required input a [`SpotwatchError::MissingInput`] refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputKind {
    ApproxCatalog,
    ReferenceCatalog,
    Manifest,
    Ledger,
    Config,
    Observations,
}

impl fmt::Display for InputKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            InputKind::ApproxCatalog => "approximate catalog",
            InputKind::ReferenceCatalog => "reference catalog",
            InputKind::Manifest => "night manifest",
            InputKind::Ledger => "master ledger",
            InputKind::Config => "configuration",
            InputKind::Observations => "observation",
        };
        f.write_str(name)
    }
}

/// Errors produced by the spot drift pipeline.
///
/// Fit divergence is deliberately absent: it is carried by
/// [`crate::centroid::FitOutcome::Diverged`] and recovered where it happens.
/// A night already present in the ledger is reported as
/// [`crate::ledger::LedgerOutcome::SkippedDuplicate`], not as an error.
#[derive(Error, Debug)]
pub enum SpotwatchError {
    /// A required input file does not exist.
    #[error("missing {kind} file: {}", .path.display())]
    MissingInput {
        /// Role of the missing file.
        kind: InputKind,
        /// Path that was looked up.
        path: PathBuf,
    },

    /// A spot window does not fit inside the frame.
    #[error("spot {spot}: {source}")]
    OutOfBounds {
        /// Catalog id of the spot whose window was rejected.
        spot: String,
        /// Window geometry that failed.
        source: WindowError,
    },

    /// A text record could not be parsed into typed fields.
    #[error("{}:{line}: {reason}", .path.display())]
    MalformedRecord {
        /// File containing the record.
        path: PathBuf,
        /// 1-based line number (0 for whole-file problems).
        line: usize,
        /// What was wrong with it.
        reason: String,
    },

    /// Configuration validation failure.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Filesystem failure on a specific path.
    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// JSON (de)serialization failure on a specific path.
    #[error("JSON error in {}: {source}", .path.display())]
    Json {
        path: PathBuf,
        source: serde_json::Error,
    },

    /// The frame provider could not deliver a frame.
    #[error(transparent)]
    Frame(#[from] FrameError),

    /// Every frame of the night was dropped before aggregation.
    #[error("no usable frames for night {night_token}")]
    NoUsableFrames { night_token: String },
}

impl SpotwatchError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        SpotwatchError::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn malformed(path: impl Into<PathBuf>, line: usize, reason: impl Into<String>) -> Self {
        SpotwatchError::MalformedRecord {
            path: path.into(),
            line,
            reason: reason.into(),
        }
    }
}

/// Result type for pipeline operations
pub type Result<T> = std::result::Result<T, SpotwatchError>;
