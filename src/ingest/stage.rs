/// Copies selected archive entries into a per-event staging directory.
///
/// Staging is a plain filesystem copy into `staging_root/<label>/`. Copying
/// the same entry twice overwrites the earlier copy; two selected entries
/// with the same file name from different archive directories collapse
/// into one staged file.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::logging::{self, Stage};
use crate::model::{ArchiveEntry, Category, WranglerError};

/// An archive entry together with the event it was selected for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedEntry {
    pub event_label: String,
    /// `raw_path` points at the staged copy.
    pub entry: ArchiveEntry,
}

/// Per-category counts of staged files for one event.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StagedCounts {
    pub by_category: BTreeMap<Category, usize>,
}

impl StagedCounts {
    pub fn total(&self) -> usize {
        self.by_category.values().sum()
    }
}

pub fn event_dir(staging_root: &Path, label: &str) -> PathBuf {
    staging_root.join(label)
}

/// Copies every entry into `staging_root/<label>/<file name>`.
///
/// Any filesystem error aborts staging.
pub fn stage_entries<I>(
    entries: I,
    staging_root: &Path,
    label: &str,
) -> Result<Vec<StagedEntry>, WranglerError>
where
    I: IntoIterator<Item = Result<ArchiveEntry, WranglerError>>,
{
    let out_dir = event_dir(staging_root, label);
    fs::create_dir_all(&out_dir).map_err(|e| WranglerError::io(&out_dir, e))?;

    let mut staged = Vec::new();
    for entry in entries {
        let entry = entry?;
        let target = out_dir.join(entry.file_name());
        fs::copy(&entry.raw_path, &target).map_err(|e| WranglerError::io(&entry.raw_path, e))?;
        logging::debug(
            Stage::Stage,
            Some(label),
            &format!("{} -> {}", entry.raw_path.display(), target.display()),
        );
        staged.push(StagedEntry {
            event_label: label.to_string(),
            entry: ArchiveEntry {
                raw_path: target,
                ..entry
            },
        });
    }
    Ok(staged)
}

/// Lists the staged entries of every event directory, sorted by label and
/// then file name. Unrecognized files are skipped with a warning.
pub fn list_staged(staging_root: &Path) -> Result<Vec<StagedEntry>, WranglerError> {
    if !staging_root.exists() {
        logging::warn(
            Stage::Stage,
            None,
            &format!("nothing staged yet under {}", staging_root.display()),
        );
        return Ok(Vec::new());
    }
    let mut labels = Vec::new();
    for dir_entry in fs::read_dir(staging_root).map_err(|e| WranglerError::io(staging_root, e))? {
        let dir_entry = dir_entry.map_err(|e| WranglerError::io(staging_root, e))?;
        if dir_entry.path().is_dir() {
            labels.push(dir_entry.file_name().to_string_lossy().into_owned());
        }
    }
    labels.sort();

    let mut staged = Vec::new();
    for label in labels {
        let dir = event_dir(staging_root, &label);
        let mut paths = Vec::new();
        for file in fs::read_dir(&dir).map_err(|e| WranglerError::io(&dir, e))? {
            let file = file.map_err(|e| WranglerError::io(&dir, e))?;
            paths.push(file.path());
        }
        paths.sort();

        for path in paths {
            match ArchiveEntry::from_path(&path) {
                Some(entry) => staged.push(StagedEntry {
                    event_label: label.clone(),
                    entry,
                }),
                None => logging::warn(
                    Stage::Stage,
                    Some(&label),
                    &format!("ignoring unrecognized staged file {}", path.display()),
                ),
            }
        }
    }
    Ok(staged)
}

/// Counts staged entries per category for one event.
pub fn count_by_category(staged: &[StagedEntry]) -> StagedCounts {
    let mut counts = StagedCounts::default();
    for s in staged {
        *counts.by_category.entry(s.entry.category).or_insert(0) += 1;
    }
    counts
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn raw(dir: &Path, name: &str) -> ArchiveEntry {
        fs::create_dir_all(dir).unwrap();
        let path = dir.join(name);
        fs::write(&path, name.as_bytes()).unwrap();
        ArchiveEntry::from_path(&path).unwrap()
    }

    #[test]
    fn test_stage_copies_into_event_directory() {
        let tmp = TempDir::new().unwrap();
        let src = tmp.path().join("archive");
        let staging = tmp.path().join("staging");
        let entries = vec![
            Ok(raw(&src, "C_20150806.1600.gz")),
            Ok(raw(&src, "M_20150806.1600.gz")),
        ];

        let staged = stage_entries(entries, &staging, "2015.SOUDELOR").unwrap();
        assert_eq!(staged.len(), 2);
        for s in &staged {
            assert!(s.entry.raw_path.starts_with(staging.join("2015.SOUDELOR")));
            assert!(s.entry.raw_path.exists());
        }
        let counts = count_by_category(&staged);
        assert_eq!(counts.by_category.get(&Category::Qpe), Some(&1));
        assert_eq!(counts.by_category.get(&Category::Rad), Some(&1));
        assert_eq!(counts.total(), 2);
    }

    #[test]
    fn test_restaging_overwrites_without_duplicating() {
        let tmp = TempDir::new().unwrap();
        let src = tmp.path().join("archive");
        let staging = tmp.path().join("staging");
        let entry = raw(&src, "C_20150806.1600.gz");

        stage_entries(vec![Ok(entry.clone())], &staging, "2015.SOUDELOR").unwrap();
        stage_entries(vec![Ok(entry)], &staging, "2015.SOUDELOR").unwrap();

        let listed = list_staged(&staging).unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].event_label, "2015.SOUDELOR");
    }

    #[test]
    fn test_selection_error_aborts_staging() {
        let tmp = TempDir::new().unwrap();
        let entries = vec![Err(WranglerError::Config("boom".to_string()))];
        assert!(stage_entries(entries, tmp.path(), "2015.SOUDELOR").is_err());
    }

    #[test]
    fn test_list_staged_without_staging_area_is_empty() {
        let tmp = TempDir::new().unwrap();
        assert!(list_staged(&tmp.path().join("absent")).unwrap().is_empty());
    }

    #[test]
    fn test_list_staged_is_sorted_and_skips_foreign_files() {
        let tmp = TempDir::new().unwrap();
        let staging = tmp.path();
        raw(&staging.join("2016.MEGI"), "M_20160926.0030.gz");
        raw(&staging.join("2015.SOUDELOR"), "M_20150806.1610.gz");
        raw(&staging.join("2015.SOUDELOR"), "C_20150806.1600.gz");
        fs::write(staging.join("2015.SOUDELOR").join("notes.txt"), b"x").unwrap();

        let listed = list_staged(staging).unwrap();
        let names: Vec<_> = listed
            .iter()
            .map(|s| format!("{}/{}", s.event_label, s.entry.file_name()))
            .collect();
        assert_eq!(
            names,
            vec![
                "2015.SOUDELOR/C_20150806.1600.gz",
                "2015.SOUDELOR/M_20150806.1610.gz",
                "2016.MEGI/M_20160926.0030.gz",
            ]
        );
    }
}
