/// Gap detection and interpolation over the 10-minute grid.
///
/// For every event and every enabled category the expected grid is
/// `issue, issue + step, ...` up to and including `cancel` (capped at
/// `max_grid_steps` points). Grid slots with no artifact in the store are
/// missing. Each missing slot is repaired by the element-wise mean of the
/// artifacts one step earlier and one step later.
///
/// A repair only ever reads original neighbors: if either neighbor is itself
/// missing (two consecutive gaps, or a gap on the first or last slot) the
/// slot fails with an `Interpolation` error and stays missing.
///
/// Gap filling must run after every decode for the run has been written,
/// and running it twice is a no-op the second time.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

use crate::config::GridConfig;
use crate::logging::{self, Stage};
use crate::model::{Category, Event, GridKey, MissingRecord, NormalizedArtifact, WranglerError};
use crate::report;
use crate::store::ArtifactStore;

// ---------------------------------------------------------------------------
// Expected grid
// ---------------------------------------------------------------------------

/// Grid timestamps for one event, in local time.
pub fn expected_grid(event: &Event, grid: &GridConfig) -> Vec<NaiveDateTime> {
    let step = grid.step();
    let mut times = Vec::new();
    let mut next = Some(event.issue_time);
    while let Some(t) = next {
        if t > event.cancel_time {
            break;
        }
        if times.len() == grid.max_grid_steps {
            logging::warn(
                Stage::GapFill,
                Some(&event.label()),
                &format!(
                    "grid truncated at {} steps before cancel time {}",
                    grid.max_grid_steps, event.cancel_time
                ),
            );
            break;
        }
        times.push(t);
        next = t.checked_add_signed(step);
    }
    times
}

// ---------------------------------------------------------------------------
// Detection
// ---------------------------------------------------------------------------

/// Missing grid keys per category, each list in discovery order
/// (event table order, then time).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MissingReport {
    pub missing: BTreeMap<Category, Vec<GridKey>>,
}

impl MissingReport {
    pub fn total(&self) -> usize {
        self.missing.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }

    /// Flattened records, category order then discovery order.
    pub fn records(&self) -> impl Iterator<Item = MissingRecord> + '_ {
        self.missing.iter().flat_map(|(category, keys)| {
            keys.iter().map(move |key| MissingRecord {
                category: *category,
                key: key.clone(),
            })
        })
    }
}

pub fn detect_missing(
    events: &[Event],
    store: &ArtifactStore,
    grid: &GridConfig,
) -> MissingReport {
    let mut report = MissingReport::default();
    for category in &grid.enabled_categories {
        let slot = report.missing.entry(*category).or_default();
        for event in events {
            let label = event.label();
            for ts in expected_grid(event, grid) {
                let key = GridKey::new(label.clone(), *category, ts);
                if !store.contains(&key) {
                    slot.push(key);
                }
            }
        }
    }
    report
}

// ---------------------------------------------------------------------------
// Repair
// ---------------------------------------------------------------------------

/// Synthesizes the artifact for one missing key from its two neighbors.
pub fn interpolate(
    store: &ArtifactStore,
    key: &GridKey,
    grid: &GridConfig,
) -> Result<NormalizedArtifact, WranglerError> {
    let earlier_key = key.shifted(-grid.step_minutes);
    let later_key = key.shifted(grid.step_minutes);

    let earlier = read_neighbor(store, key, &earlier_key)?.ok_or_else(|| {
        WranglerError::Interpolation {
            key: key.clone(),
            reason: format!("earlier neighbor {} is missing", earlier_key),
        }
    })?;
    let later = read_neighbor(store, key, &later_key)?.ok_or_else(|| {
        WranglerError::Interpolation {
            key: key.clone(),
            reason: format!("later neighbor {} is missing", later_key),
        }
    })?;

    let data = earlier
        .data
        .mean_with(&later.data)
        .ok_or_else(|| WranglerError::Interpolation {
            key: key.clone(),
            reason: format!(
                "neighbor shapes differ: {:?} vs {:?}",
                earlier.data.shape(),
                later.data.shape()
            ),
        })?;

    Ok(NormalizedArtifact {
        key: key.clone(),
        data,
    })
}

/// A corrupt neighbor blob fails the repair of `key`, not the run. Only
/// filesystem errors pass through unchanged.
fn read_neighbor(
    store: &ArtifactStore,
    key: &GridKey,
    neighbor: &GridKey,
) -> Result<Option<NormalizedArtifact>, WranglerError> {
    store.read(neighbor).map_err(|e| match e {
        WranglerError::Io { .. } => e,
        other => WranglerError::Interpolation {
            key: key.clone(),
            reason: format!("cannot read neighbor {}: {}", neighbor, other),
        },
    })
}

/// Keys that were repaired and keys that could not be.
#[derive(Debug, Default)]
pub struct FillOutcome {
    pub filled: Vec<GridKey>,
    /// One entry per unrepaired key, with the reason.
    pub failures: Vec<(GridKey, WranglerError)>,
}

/// Repairs every missing key in report order.
///
/// Per-key failures are collected and do not stop the run. Filesystem
/// errors while writing are fatal.
pub fn fill_missing(
    report: &MissingReport,
    store: &ArtifactStore,
    grid: &GridConfig,
) -> Result<FillOutcome, WranglerError> {
    let mut outcome = FillOutcome::default();
    for record in report.records() {
        let context = record.key.to_string();
        match interpolate(store, &record.key, grid) {
            Ok(artifact) => {
                store.write(&artifact)?;
                logging::debug(Stage::GapFill, Some(&context), "filled from neighbors");
                outcome.filled.push(record.key);
            }
            Err(e @ WranglerError::Io { .. }) => return Err(e),
            Err(e) => {
                logging::error(Stage::GapFill, Some(&context), &e.to_string());
                outcome.failures.push((record.key, e));
            }
        }
    }
    logging::log_stage_summary(
        Stage::GapFill,
        report.total(),
        outcome.filled.len(),
        outcome.failures.len(),
    );
    Ok(outcome)
}

/// Detection, audit table, then repair.
///
/// The missing-files table is written to `report_path` before any artifact
/// is synthesized.
pub fn detect_and_fill(
    events: &[Event],
    store: &ArtifactStore,
    grid: &GridConfig,
    report_path: &Path,
) -> Result<(MissingReport, FillOutcome), WranglerError> {
    let missing = detect_missing(events, store, grid);
    for (category, keys) in &missing.missing {
        logging::info(
            Stage::GapFill,
            None,
            &format!("{} missing files in {}", keys.len(), category),
        );
        for key in keys {
            logging::debug(Stage::GapFill, Some(category.as_str()), &key.file_name());
        }
    }
    report::write_missing_files(&missing, report_path)?;

    let outcome = fill_missing(&missing, store, grid)?;
    Ok((missing, outcome))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
