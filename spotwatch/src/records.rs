//! Plain-text record plumbing shared by every file the pipeline reads or writes.
//!
//! All formats are comma-separated, one record per line. Lines whose first
//! non-blank character is [`COMMENT_SENTINEL`] are headers or comments.

use std::fs;
use std::io::Write;
use std::path::Path;

use spot_math::round_to;

use crate::error::{InputKind, Result, SpotwatchError};

/// Marks header and comment lines in every text format
pub const COMMENT_SENTINEL: char = '@';

/// Read a required input, mapping a missing file to `MissingInput`.
pub(crate) fn read_required(path: &Path, kind: InputKind) -> Result<String> {
    if !path.exists() {
        return Err(SpotwatchError::MissingInput {
            kind,
            path: path.to_path_buf(),
        });
    }
    fs::read_to_string(path).map_err(|e| SpotwatchError::io(path, e))
}

/// Iterate `(line_number, trimmed_line)` over data lines, skipping blanks and
/// comments. Line numbers are 1-based.
pub(crate) fn data_lines(contents: &str) -> impl Iterator<Item = (usize, &str)> {
    contents
        .lines()
        .enumerate()
        .map(|(idx, line)| (idx + 1, line.trim()))
        .filter(|(_, line)| !line.is_empty() && !line.starts_with(COMMENT_SENTINEL))
}

/// Comma-separated fields of one record, with typed accessors that report
/// the offending file and line.
#[derive(Debug)]
pub(crate) struct Record<'a> {
    path: &'a Path,
    line: usize,
    fields: Vec<&'a str>,
}

impl<'a> Record<'a> {
    /// Split a record and require exactly `expected` fields.
    pub fn parse(path: &'a Path, line: usize, text: &'a str, expected: usize) -> Result<Self> {
        let fields: Vec<&str> = text.split(',').map(str::trim).collect();
        if fields.len() != expected {
            return Err(SpotwatchError::malformed(
                path,
                line,
                format!("expected {expected} fields, found {}", fields.len()),
            ));
        }
        Ok(Self { path, line, fields })
    }

    pub fn text(&self, idx: usize, name: &str) -> Result<&'a str> {
        let field = self.fields[idx];
        if field.is_empty() {
            return Err(self.error(format!("empty {name}")));
        }
        Ok(field)
    }

    pub fn float(&self, idx: usize, name: &str) -> Result<f64> {
        let field = self.text(idx, name)?;
        match field.parse::<f64>() {
            Ok(value) if value.is_finite() => Ok(value),
            _ => Err(self.error(format!("invalid {name} {field:?}"))),
        }
    }

    pub fn integer(&self, idx: usize, name: &str) -> Result<i64> {
        let field = self.text(idx, name)?;
        field
            .parse::<i64>()
            .map_err(|_| self.error(format!("invalid {name} {field:?}")))
    }

    pub fn error(&self, reason: String) -> SpotwatchError {
        SpotwatchError::malformed(self.path, self.line, reason)
    }
}

/// Format a value with a fixed number of decimals after rounding, so `-0.0`
/// never reaches a file.
pub(crate) fn fixed(value: f64, decimals: u32) -> String {
    format!("{:.*}", decimals as usize, round_to(value, decimals))
}

/// Write a whole file through a sibling temporary file and a rename, creating
/// parent directories as needed.
pub(crate) fn write_atomically(path: &Path, contents: &str) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| SpotwatchError::io(parent, e))?;
    }

    let mut tmp_name = path.as_os_str().to_owned();
    tmp_name.push(".tmp");
    let tmp_path = Path::new(&tmp_name);

    let mut file = fs::File::create(tmp_path).map_err(|e| SpotwatchError::io(tmp_path, e))?;
    file.write_all(contents.as_bytes())
        .and_then(|_| file.sync_all())
        .map_err(|e| SpotwatchError::io(tmp_path, e))?;
    drop(file);

    fs::rename(tmp_path, path).map_err(|e| SpotwatchError::io(path, e))
}
