//! Approximate spot positions and the persisted reference catalog.
//!
//! Approximate catalog, one spot per line:
//!
//! ```text
//! @id,posX,posY
//! s001,100,200
//! ```
//!
//! Reference catalog, written once from the reference frame. The leading
//! comment records the window half-width the catalog was built with:
//!
//! ```text
//! @halfWidth=10
//! @id,winX,winY,centroidX,centroidY,intensity
//! s001,90,191,100.3001,200.6998,15137.2210
//! ```

use std::collections::HashSet;
use std::path::Path;

use spot_math::{mean, round_to};

use crate::error::{InputKind, Result, SpotwatchError};
use crate::records::{data_lines, fixed, read_required, write_atomically, Record};

/// Decimal places kept for centroids, displacements and intensities
pub const VALUE_DECIMALS: u32 = 4;

/// Header line of a reference catalog file
pub const REFERENCE_HEADER: &str = "@id,winX,winY,centroidX,centroidY,intensity";

/// Prefix of the comment line carrying the build half-width
pub const HALF_WIDTH_TAG: &str = "@halfWidth=";

/// An approximate spot position supplied by the operator.
#[derive(Debug, Clone, PartialEq)]
pub struct ApproxEntry {
    pub id: String,
    pub x: f64,
    pub y: f64,
}

/// Load the approximate catalog. Comment lines are skipped; any other line
/// must be `id,x,y`.
pub fn load_approx_catalog(path: &Path) -> Result<Vec<ApproxEntry>> {
    let contents = read_required(path, InputKind::ApproxCatalog)?;

    let mut entries = Vec::new();
    for (line, text) in data_lines(&contents) {
        let record = Record::parse(path, line, text, 3)?;
        entries.push(ApproxEntry {
            id: record.text(0, "id")?.to_string(),
            x: record.float(1, "x")?,
            y: record.float(2, "y")?,
        });
    }
    check_unique_ids(path, entries.iter().map(|e| e.id.as_str()))?;

    Ok(entries)
}

/// Reference geometry and brightness of one spot.
#[derive(Debug, Clone, PartialEq)]
pub struct SpotDescriptor {
    pub id: String,
    /// Top-left column of the measurement window
    pub window_x: i64,
    /// Top-left row of the measurement window
    pub window_y: i64,
    pub centroid_x: f64,
    pub centroid_y: f64,
    /// Sum of pixel values in the window
    pub intensity: f64,
}

impl SpotDescriptor {
    /// Build a descriptor with values rounded to their persisted precision,
    /// so an in-memory catalog and its reloaded file agree exactly.
    pub fn new(
        id: impl Into<String>,
        window_x: i64,
        window_y: i64,
        centroid_x: f64,
        centroid_y: f64,
        intensity: f64,
    ) -> Self {
        Self {
            id: id.into(),
            window_x,
            window_y,
            centroid_x: round_to(centroid_x, VALUE_DECIMALS),
            centroid_y: round_to(centroid_y, VALUE_DECIMALS),
            intensity: round_to(intensity, VALUE_DECIMALS),
        }
    }

    fn to_line(&self) -> String {
        format!(
            "{},{},{},{},{},{}",
            self.id,
            self.window_x,
            self.window_y,
            fixed(self.centroid_x, VALUE_DECIMALS),
            fixed(self.centroid_y, VALUE_DECIMALS),
            fixed(self.intensity, VALUE_DECIMALS),
        )
    }
}

/// Ordered set of spot descriptors plus the window half-width they were
/// built with. Order is the catalog order and is kept in every per-frame
/// output.
#[derive(Debug, Clone, PartialEq)]
pub struct ReferenceCatalog {
    half_width: usize,
    spots: Vec<SpotDescriptor>,
}

impl ReferenceCatalog {
    pub fn new(half_width: usize, spots: Vec<SpotDescriptor>) -> Self {
        Self { half_width, spots }
    }

    pub fn half_width(&self) -> usize {
        self.half_width
    }

    pub fn spots(&self) -> &[SpotDescriptor] {
        &self.spots
    }

    pub fn len(&self) -> usize {
        self.spots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.spots.is_empty()
    }

    /// Mean reference intensity across all spots
    pub fn mean_intensity(&self) -> Option<f64> {
        let intensities: Vec<f64> = self.spots.iter().map(|s| s.intensity).collect();
        mean(&intensities)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.spots.iter().any(|s| s.id == id)
    }

    /// Persist the catalog, replacing any existing file.
    pub fn save(&self, path: &Path) -> Result<()> {
        let mut contents = String::with_capacity(64 * (self.spots.len() + 2));
        contents.push_str(&format!("{HALF_WIDTH_TAG}{}\n", self.half_width));
        contents.push_str(REFERENCE_HEADER);
        contents.push('\n');
        for spot in &self.spots {
            contents.push_str(&spot.to_line());
            contents.push('\n');
        }
        write_atomically(path, &contents)
    }

    /// Load a persisted catalog that must have been built with windows of
    /// half-width `half_width`.
    ///
    /// An absent file, a malformed line, a duplicated id or an empty catalog
    /// are errors. A recorded half-width different from `half_width` is
    /// `InvalidConfig`: the windows would no longer match the reference. A
    /// file without the half-width line is taken at `half_width`.
    pub fn load(path: &Path, half_width: usize) -> Result<Self> {
        let contents = read_required(path, InputKind::ReferenceCatalog)?;

        match recorded_half_width(path, &contents)? {
            Some(recorded) if recorded != half_width => {
                return Err(SpotwatchError::InvalidConfig(format!(
                    "reference catalog {} was built with half-width {recorded}, configured half-width is {half_width}; recalibrate to change it",
                    path.display()
                )));
            }
            Some(_) => {}
            None => log::warn!(
                "Reference catalog {} does not record its half-width, assuming {}",
                path.display(),
                half_width
            ),
        }

        let mut spots = Vec::new();
        for (line, text) in data_lines(&contents) {
            let record = Record::parse(path, line, text, 6)?;
            let intensity = record.float(5, "intensity")?;
            if intensity < 0.0 {
                return Err(record.error(format!("negative intensity {intensity}")));
            }
            spots.push(SpotDescriptor {
                id: record.text(0, "id")?.to_string(),
                window_x: record.integer(1, "window x")?,
                window_y: record.integer(2, "window y")?,
                centroid_x: record.float(3, "centroid x")?,
                centroid_y: record.float(4, "centroid y")?,
                intensity,
            });
        }

        if spots.is_empty() {
            return Err(SpotwatchError::malformed(path, 0, "catalog contains no spots"));
        }
        check_unique_ids(path, spots.iter().map(|s| s.id.as_str()))?;

        Ok(Self { half_width, spots })
    }
}

/// Half-width from the first `@halfWidth=` comment line, if any.
fn recorded_half_width(path: &Path, contents: &str) -> Result<Option<usize>> {
    for (idx, line) in contents.lines().enumerate() {
        if let Some(value) = line.trim().strip_prefix(HALF_WIDTH_TAG) {
            return value.trim().parse::<usize>().map(Some).map_err(|_| {
                SpotwatchError::malformed(path, idx + 1, format!("invalid half-width {value:?}"))
            });
        }
    }
    Ok(None)
}

fn check_unique_ids<'a>(path: &Path, ids: impl Iterator<Item = &'a str>) -> Result<()> {
    let mut seen = HashSet::new();
    for id in ids {
        if !seen.insert(id) {
            return Err(SpotwatchError::malformed(
                path,
                0,
                format!("duplicate spot id {id:?}"),
            ));
        }
    }
    Ok(())
}
