//! In-memory frame provider for testing

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};

use chrono::{DateTime, Utc};
use ndarray::Array2;

use crate::frame::{Frame, FrameError, FrameProvider};

/// Frame provider backed by a map of frame id to frame
#[derive(Debug, Default)]
pub struct MockFrameProvider {
    frames: HashMap<String, Frame>,
    unreadable: HashSet<String>,
    loads: AtomicUsize,
}

impl MockFrameProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a frame under `frame_id`
    pub fn insert(&mut self, frame_id: impl Into<String>, pixels: Array2<f64>, captured_at: DateTime<Utc>) {
        self.frames
            .insert(frame_id.into(), Frame::new(pixels, captured_at));
    }

    /// Builder form of [`MockFrameProvider::insert`]
    pub fn with_frame(
        mut self,
        frame_id: impl Into<String>,
        pixels: Array2<f64>,
        captured_at: DateTime<Utc>,
    ) -> Self {
        self.insert(frame_id, pixels, captured_at);
        self
    }

    /// Make `frame_id` fail as if its file were corrupt
    pub fn mark_unreadable(&mut self, frame_id: impl Into<String>) {
        self.unreadable.insert(frame_id.into());
    }

    /// Number of `load` calls so far
    pub fn load_count(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }
}

impl FrameProvider for MockFrameProvider {
    fn load(&self, frame_id: &str) -> Result<Frame, FrameError> {
        self.loads.fetch_add(1, Ordering::SeqCst);

        if self.unreadable.contains(frame_id) {
            return Err(FrameError::Unreadable {
                id: frame_id.to_string(),
                reason: "mock frame marked unreadable".to_string(),
            });
        }
        self.frames
            .get(frame_id)
            .cloned()
            .ok_or_else(|| FrameError::NotFound(frame_id.to_string()))
    }
}
