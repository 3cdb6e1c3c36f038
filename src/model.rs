/// Core data types for the radar archive wrangler.
///
/// This module defines the shared domain model imported by all other modules:
/// events and their windows, archive entries, grid keys, artifacts, and the
/// crate-wide error type. It performs no I/O.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;

// ---------------------------------------------------------------------------
// Grid constants
// ---------------------------------------------------------------------------

/// Hours between local time (event table) and archive-native time (file names).
pub const ARCHIVE_OFFSET_HOURS: i64 = 8;

/// Cadence of the expected grid, in minutes.
pub const GRID_STEP_MINUTES: i64 = 10;

/// Upper bound on grid points enumerated per event (~166 hours at 10 minutes).
pub const MAX_GRID_STEPS: usize = 1000;

/// Timestamp layout embedded in archive file names, e.g. `20150807.1230`.
pub const ARCHIVE_STAMP_FORMAT: &str = "%Y%m%d.%H%M";

/// Timestamp layout used in artifact file names, e.g. `201508072030`.
pub const GRID_STAMP_FORMAT: &str = "%Y%m%d%H%M";

/// Suffix of raw archive files. The embedded timestamp sits right before it.
pub const ARCHIVE_SUFFIX: &str = ".gz";

/// Suffix of artifact blobs in the store.
pub const ARTIFACT_SUFFIX: &str = ".grid.gz";

// ---------------------------------------------------------------------------
// Category
// ---------------------------------------------------------------------------

/// The three radar products carried by the archive.
///
/// Ordering is QPE < QPF < RAD and drives report ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Category {
    /// Quantitative precipitation estimate, file prefix `C`.
    #[serde(rename = "QPE")]
    Qpe,
    /// Quantitative precipitation forecast, file prefix `q`.
    #[serde(rename = "QPF")]
    Qpf,
    /// Radar reflectivity mosaic, file prefix `M`.
    #[serde(rename = "RAD")]
    Rad,
}

impl Category {
    pub const ALL: [Category; 3] = [Category::Qpe, Category::Qpf, Category::Rad];

    /// Maps the first character of an archive file name to its category.
    pub fn from_prefix(prefix: char) -> Option<Category> {
        match prefix {
            'C' => Some(Category::Qpe),
            'q' => Some(Category::Qpf),
            'M' => Some(Category::Rad),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Category::Qpe => "QPE",
            Category::Qpf => "QPF",
            Category::Rad => "RAD",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = WranglerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "QPE" => Ok(Category::Qpe),
            "QPF" => Ok(Category::Qpf),
            "RAD" => Ok(Category::Rad),
            other => Err(WranglerError::Config(format!("unknown category '{}'", other))),
        }
    }
}

// ---------------------------------------------------------------------------
// Events and windows
// ---------------------------------------------------------------------------

/// A named storm event, as read from one row of the event table.
///
/// Times are local (the event table's timezone).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub name: String,
    pub issue_time: NaiveDateTime,
    pub cancel_time: NaiveDateTime,
}

impl Event {
    /// `"{issue_year}.{name}"`, e.g. `2015.SOUDELOR`. Names the staging
    /// directory and the event component of every grid key.
    pub fn label(&self) -> String {
        format!("{}.{}", self.issue_time.format("%Y"), self.name)
    }
}

/// Closed interval `[start, end]` in archive-native time for one event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Window {
    /// Label of the event this window was derived from.
    pub label: String,
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
}

impl Window {
    /// Inclusive at both ends, minute precision.
    pub fn contains(&self, ts: NaiveDateTime) -> bool {
        self.start <= ts && ts <= self.end
    }

    /// Inclusive day-level check used for date-partitioned directories.
    pub fn contains_day(&self, day: chrono::NaiveDate) -> bool {
        self.start.date() <= day && day <= self.end.date()
    }
}

// ---------------------------------------------------------------------------
// Archive entries
// ---------------------------------------------------------------------------

/// One raw file in the archive timeline (or its staged copy).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveEntry {
    pub raw_path: PathBuf,
    /// Archive-native time parsed from the file name.
    pub embedded_timestamp: NaiveDateTime,
    pub category: Category,
}

impl ArchiveEntry {
    /// Parses category and timestamp out of a file name such as
    /// `CB_20150807.1230.gz`. Returns `None` when the name does not follow
    /// the archive convention.
    pub fn from_path(path: &Path) -> Option<ArchiveEntry> {
        let name = path.file_name()?.to_str()?;
        let category = Category::from_prefix(name.chars().next()?)?;
        let embedded_timestamp = parse_archive_stamp(name)?;
        Some(ArchiveEntry {
            raw_path: path.to_path_buf(),
            embedded_timestamp,
            category,
        })
    }

    pub fn file_name(&self) -> String {
        self.raw_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

/// Extracts the `YYYYMMDD.HHMM` stamp that precedes the `.gz` suffix.
pub fn parse_archive_stamp(file_name: &str) -> Option<NaiveDateTime> {
    let stem = file_name.strip_suffix(ARCHIVE_SUFFIX)?;
    let stamp_len = "YYYYMMDD.HHMM".len();
    if stem.len() < stamp_len || !stem.is_char_boundary(stem.len() - stamp_len) {
        return None;
    }
    let stamp = &stem[stem.len() - stamp_len..];
    NaiveDateTime::parse_from_str(stamp, ARCHIVE_STAMP_FORMAT).ok()
}

// ---------------------------------------------------------------------------
// Grid keys and artifacts
// ---------------------------------------------------------------------------

/// Identifies one normalized array slot. Timestamps are local time.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct GridKey {
    pub event_name: String,
    pub category: Category,
    pub timestamp: NaiveDateTime,
}

impl GridKey {
    pub fn new(event_name: impl Into<String>, category: Category, timestamp: NaiveDateTime) -> Self {
        Self {
            event_name: event_name.into(),
            category,
            timestamp,
        }
    }

    /// Same event and category, shifted by `minutes`.
    pub fn shifted(&self, minutes: i64) -> GridKey {
        GridKey {
            event_name: self.event_name.clone(),
            category: self.category,
            timestamp: self.timestamp + chrono::Duration::minutes(minutes),
        }
    }

    /// Artifact file name within the category directory,
    /// e.g. `2015.SOUDELOR.201508072030.grid.gz`.
    pub fn file_name(&self) -> String {
        format!(
            "{}.{}{}",
            self.event_name,
            self.timestamp.format(GRID_STAMP_FORMAT),
            ARTIFACT_SUFFIX
        )
    }

    /// Inverse of [`GridKey::file_name`].
    pub fn from_file_name(category: Category, file_name: &str) -> Option<GridKey> {
        let stem = file_name.strip_suffix(ARTIFACT_SUFFIX)?;
        let (event_name, stamp) = stem.rsplit_once('.')?;
        if event_name.is_empty() {
            return None;
        }
        let timestamp = NaiveDateTime::parse_from_str(stamp, GRID_STAMP_FORMAT).ok()?;
        Some(GridKey::new(event_name, category, timestamp))
    }
}

impl fmt::Display for GridKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}/{}",
            self.category,
            self.event_name,
            self.timestamp.format(GRID_STAMP_FORMAT)
        )
    }
}

/// A dense row-major 2D array of values.
#[derive(Debug, Clone, PartialEq)]
pub struct Raster {
    pub rows: usize,
    pub cols: usize,
    pub data: Vec<f64>,
}

impl Raster {
    /// Returns `None` if `data.len() != rows * cols`.
    pub fn new(rows: usize, cols: usize, data: Vec<f64>) -> Option<Raster> {
        (rows.checked_mul(cols)? == data.len()).then_some(Raster { rows, cols, data })
    }

    pub fn shape(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }

    /// Element-wise arithmetic mean of two equally shaped rasters.
    pub fn mean_with(&self, other: &Raster) -> Option<Raster> {
        if self.shape() != other.shape() {
            return None;
        }
        let data = self
            .data
            .iter()
            .zip(&other.data)
            .map(|(a, b)| (a + b) / 2.0)
            .collect();
        Some(Raster {
            rows: self.rows,
            cols: self.cols,
            data,
        })
    }

    pub fn min(&self) -> Option<f64> {
        self.data.iter().copied().reduce(f64::min)
    }

    pub fn max(&self) -> Option<f64> {
        self.data.iter().copied().reduce(f64::max)
    }
}

/// One decoded or interpolated array at its grid slot.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedArtifact {
    pub key: GridKey,
    pub data: Raster,
}

/// A grid slot with no artifact, found by gap detection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MissingRecord {
    pub category: Category,
    pub key: GridKey,
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Errors raised anywhere in the pipeline. Each variant names the
/// event, category, timestamp or file it concerns.
#[derive(Error, Debug)]
pub enum WranglerError {
    /// Malformed configuration or event table row. Aborts the run.
    #[error("config error: {0}")]
    Config(String),

    /// Filesystem failure while selecting, staging or writing. Aborts the run.
    #[error("I/O error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The converter failed for one entry. The entry is skipped.
    #[error("decode error for {category} file {file}: {message}")]
    Decode {
        category: Category,
        file: String,
        message: String,
    },

    /// A missing slot could not be synthesized from its neighbors.
    #[error("interpolation error at {key}: {reason}")]
    Interpolation { key: GridKey, reason: String },

    /// An artifact blob exists but cannot be read back.
    #[error("corrupt artifact {}: {message}", path.display())]
    Store { path: PathBuf, message: String },

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl WranglerError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        WranglerError::Io {
            path: path.into(),
            source,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
