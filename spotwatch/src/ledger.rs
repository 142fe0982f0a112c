//! Append-only master ledger with one row per night.
//!
//! ```text
//! @juldate,meanDX,meanDY,normalizedIntensity
//! 2457590,0.0012,-0.0034,0.998713
//! ```
//!
//! A night id is written at most once. The ledger is loaded into memory when
//! opened; the owning [`MasterLedger`] is the only writer.

use std::collections::HashSet;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use spot_math::round_to;

use crate::catalog::VALUE_DECIMALS;
use crate::error::{InputKind, Result, SpotwatchError};
use crate::night::NightSummary;
use crate::records::{data_lines, fixed, read_required, write_atomically, Record};

/// Header line of the master ledger
pub const LEDGER_HEADER: &str = "@juldate,meanDX,meanDY,normalizedIntensity";

/// Decimal places kept for normalized intensity
pub const INTENSITY_DECIMALS: u32 = 6;

/// One persisted night.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LedgerRow {
    pub night_id: i64,
    pub mean_dx: f64,
    pub mean_dy: f64,
    pub normalized_intensity: f64,
}

impl LedgerRow {
    fn to_line(self) -> String {
        format!(
            "{},{},{},{}\n",
            self.night_id,
            fixed(self.mean_dx, VALUE_DECIMALS),
            fixed(self.mean_dy, VALUE_DECIMALS),
            fixed(self.normalized_intensity, INTENSITY_DECIMALS),
        )
    }
}

impl From<&NightSummary> for LedgerRow {
    fn from(summary: &NightSummary) -> Self {
        Self {
            night_id: summary.night_id,
            mean_dx: round_to(summary.mean_dx, VALUE_DECIMALS),
            mean_dy: round_to(summary.mean_dy, VALUE_DECIMALS),
            normalized_intensity: round_to(summary.normalized_intensity, INTENSITY_DECIMALS),
        }
    }
}

/// What an append attempt did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedgerOutcome {
    Written,
    SkippedDuplicate,
}

/// In-memory view of the ledger file plus its writer.
#[derive(Debug)]
pub struct MasterLedger {
    path: PathBuf,
    rows: Vec<LedgerRow>,
    nights: HashSet<i64>,
    /// Existing file does not end in a newline
    unterminated: bool,
}

impl MasterLedger {
    /// Open a ledger, treating an absent file as empty.
    pub fn open(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self {
                path: path.to_path_buf(),
                rows: Vec::new(),
                nights: HashSet::new(),
                unterminated: false,
            });
        }
        Self::open_existing(path)
    }

    /// Open a ledger that must already exist.
    pub fn open_existing(path: &Path) -> Result<Self> {
        let contents = read_required(path, InputKind::Ledger)?;

        let mut rows = Vec::new();
        let mut nights = HashSet::new();
        for (line, text) in data_lines(&contents) {
            let record = Record::parse(path, line, text, 4)?;
            let row = LedgerRow {
                night_id: record.integer(0, "night id")?,
                mean_dx: record.float(1, "mean dX")?,
                mean_dy: record.float(2, "mean dY")?,
                normalized_intensity: record.float(3, "normalized intensity")?,
            };
            if !nights.insert(row.night_id) {
                log::warn!(
                    "{}:{}: night {} appears more than once",
                    path.display(),
                    line,
                    row.night_id
                );
                continue;
            }
            rows.push(row);
        }

        let unterminated = !contents.is_empty() && !contents.ends_with('\n');
        if unterminated {
            log::warn!("{} does not end in a newline", path.display());
        }

        log::debug!("Loaded {} ledger rows from {}", rows.len(), path.display());
        Ok(Self {
            path: path.to_path_buf(),
            rows,
            nights,
            unterminated,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Rows in file order
    pub fn rows(&self) -> &[LedgerRow] {
        &self.rows
    }

    pub fn contains(&self, night_id: i64) -> bool {
        self.nights.contains(&night_id)
    }

    /// Rows with `night_id >= since`, in file order.
    pub fn history(&self, since: i64) -> impl Iterator<Item = &LedgerRow> {
        self.rows.iter().filter(move |row| row.night_id >= since)
    }

    /// Append a night unless its id is already present.
    ///
    /// A new ledger is created with its header in one atomic write. Later
    /// rows are appended with a single write followed by a data sync. If the
    /// file's last line is unterminated, the same write closes it first.
    pub fn append_if_absent(&mut self, summary: &NightSummary) -> Result<LedgerOutcome> {
        let row = LedgerRow::from(summary);
        if self.contains(row.night_id) {
            log::info!("Night {} already in ledger, skipping", row.night_id);
            return Ok(LedgerOutcome::SkippedDuplicate);
        }

        let mut line = row.to_line();
        if self.path.exists() {
            if self.unterminated {
                line.insert(0, '\n');
            }
            let mut file = OpenOptions::new()
                .append(true)
                .open(&self.path)
                .map_err(|e| SpotwatchError::io(&self.path, e))?;
            file.write_all(line.as_bytes())
                .and_then(|_| file.sync_data())
                .map_err(|e| SpotwatchError::io(&self.path, e))?;
        } else {
            write_atomically(&self.path, &format!("{LEDGER_HEADER}\n{line}"))?;
        }
        self.unterminated = false;

        self.nights.insert(row.night_id);
        self.rows.push(row);
        log::info!("Appended night {} to {}", row.night_id, self.path.display());
        Ok(LedgerOutcome::Written)
    }
}
