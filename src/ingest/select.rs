/// Archive timeline file selection.
///
/// The archive is laid out as `root/<year>/<YYYYMMDD>/.../<file>`, where each
/// leaf file name carries a category prefix and a `YYYYMMDD.HHMM` stamp in
/// archive-native time. Selection walks that tree lazily: a date directory is
/// entered only if its label falls inside the window's day range, and a leaf
/// is yielded only if its stamp lies inside the window at minute precision.
///
/// Both window edges are inclusive. Output order follows directory listing
/// order and is not chronological.

use chrono::{Datelike, NaiveDate};
use std::fs::{self, ReadDir};
use std::ops::RangeInclusive;
use std::path::{Path, PathBuf};

use crate::logging::{self, Stage};
use crate::model::{ArchiveEntry, Window, WranglerError};

/// Root of a dated archive tree.
#[derive(Debug, Clone)]
pub struct ArchiveTimeline {
    root: PathBuf,
}

impl ArchiveTimeline {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Fails up front if the archive root is not a readable directory.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, WranglerError> {
        let timeline = Self::new(root);
        fs::read_dir(&timeline.root).map_err(|e| WranglerError::io(&timeline.root, e))?;
        Ok(timeline)
    }

    /// Entries of this timeline that fall inside `window`.
    pub fn select<'a>(&'a self, window: &'a Window) -> Selection<'a> {
        Selection {
            timeline: self,
            window,
        }
    }
}

/// A restartable selection: every call to [`Selection::iter`] walks the
/// archive afresh.
#[derive(Debug, Clone, Copy)]
pub struct Selection<'a> {
    timeline: &'a ArchiveTimeline,
    window: &'a Window,
}

impl<'a> Selection<'a> {
    pub fn iter(&self) -> SelectionIter<'a> {
        SelectionIter {
            root: &self.timeline.root,
            window: self.window,
            years: self.window.start.year()..=self.window.end.year(),
            multi_year: self.window.start.year() != self.window.end.year(),
            found_year: false,
            stack: Vec::new(),
        }
    }
}

impl<'a> IntoIterator for Selection<'a> {
    type Item = Result<ArchiveEntry, WranglerError>;
    type IntoIter = SelectionIter<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl<'a> IntoIterator for &Selection<'a> {
    type Item = Result<ArchiveEntry, WranglerError>;
    type IntoIter = SelectionIter<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

enum Level {
    /// Listing of one year directory; children are date directories.
    Days { path: PathBuf, listing: ReadDir },
    /// Listing somewhere below a selected date directory.
    Nested { path: PathBuf, listing: ReadDir },
}

/// Depth-first walk over the candidate part of the archive.
///
/// Yields `Err` for filesystem failures; callers treat those as fatal. A
/// window that spans New Year tolerates one of its year directories being
/// absent, but not all of them.
pub struct SelectionIter<'a> {
    root: &'a Path,
    window: &'a Window,
    years: RangeInclusive<i32>,
    multi_year: bool,
    found_year: bool,
    stack: Vec<Level>,
}

impl SelectionIter<'_> {
    fn open(path: PathBuf) -> Result<ReadDir, WranglerError> {
        fs::read_dir(&path).map_err(|e| WranglerError::io(path, e))
    }
}

impl Iterator for SelectionIter<'_> {
    type Item = Result<ArchiveEntry, WranglerError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let Some(level) = self.stack.last_mut() else {
                let year = self.years.next()?;
                let path = self.root.join(year.to_string());
                let last_year = self.years.is_empty();
                if self.multi_year && !path.is_dir() && !(last_year && !self.found_year) {
                    logging::debug(
                        Stage::Select,
                        Some(&self.window.label),
                        &format!("no year directory {}", path.display()),
                    );
                    continue;
                }
                match Self::open(path.clone()) {
                    Ok(listing) => {
                        self.found_year = true;
                        self.stack.push(Level::Days { path, listing });
                    }
                    Err(e) => return Some(Err(e)),
                }
                continue;
            };

            match level {
                Level::Days { path, listing } => {
                    let Some(next) = listing.next() else {
                        self.stack.pop();
                        continue;
                    };
                    let entry = match next {
                        Ok(entry) => entry,
                        Err(e) => return Some(Err(WranglerError::io(path.clone(), e))),
                    };
                    let day_path = entry.path();
                    if !day_path.is_dir() {
                        continue;
                    }
                    let name = entry.file_name();
                    let Some(day) = name
                        .to_str()
                        .and_then(|n| NaiveDate::parse_from_str(n, "%Y%m%d").ok())
                    else {
                        continue;
                    };
                    if !self.window.contains_day(day) {
                        continue;
                    }
                    match Self::open(day_path.clone()) {
                        Ok(listing) => self.stack.push(Level::Nested {
                            path: day_path,
                            listing,
                        }),
                        Err(e) => return Some(Err(e)),
                    }
                }
                Level::Nested { path, listing } => {
                    let Some(next) = listing.next() else {
                        self.stack.pop();
                        continue;
                    };
                    let entry = match next {
                        Ok(entry) => entry,
                        Err(e) => return Some(Err(WranglerError::io(path.clone(), e))),
                    };
                    let child = entry.path();
                    if child.is_dir() {
                        match Self::open(child.clone()) {
                            Ok(listing) => self.stack.push(Level::Nested {
                                path: child,
                                listing,
                            }),
                            Err(e) => return Some(Err(e)),
                        }
                        continue;
                    }
                    match ArchiveEntry::from_path(&child) {
                        Some(archive_entry) if self.window.contains(archive_entry.embedded_timestamp) => {
                            return Some(Ok(archive_entry));
                        }
                        Some(_) => {}
                        None => logging::warn(
                            Stage::Select,
                            Some(&self.window.label),
                            &format!("skipping unrecognized archive file {}", child.display()),
                        ),
                    }
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDateTime;
    use std::collections::BTreeSet;
    use tempfile::TempDir;

    fn at(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, mo, d)
            .unwrap()
            .and_hms_opt(h, mi, 0)
            .unwrap()
    }

    /// Creates `root/<year>/<date>/<sub>/<name>` with placeholder content.
    fn touch(root: &Path, date: &str, sub: &str, name: &str) {
        let dir = root.join(&date[..4]).join(date).join(sub);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join(name), b"raw").unwrap();
    }

    fn window(start: NaiveDateTime, end: NaiveDateTime) -> Window {
        Window {
            label: "2015.SOUDELOR".to_string(),
            start,
            end,
        }
    }

    fn selected_names(timeline: &ArchiveTimeline, window: &Window) -> BTreeSet<String> {
        timeline
            .select(window)
            .iter()
            .map(|r| r.expect("selection should not fail").file_name())
            .collect()
    }

    #[test]
    fn test_files_exactly_on_window_edges_are_selected() {
        let tmp = TempDir::new().unwrap();
        touch(tmp.path(), "20150806", "CB", "C_20150806.1530.gz");
        touch(tmp.path(), "20150806", "CB", "C_20150806.1529.gz");
        touch(tmp.path(), "20150807", "CB", "C_20150807.0030.gz");
        touch(tmp.path(), "20150807", "CB", "C_20150807.0031.gz");

        let timeline = ArchiveTimeline::new(tmp.path());
        let w = window(at(2015, 8, 6, 15, 30), at(2015, 8, 7, 0, 30));
        let names = selected_names(&timeline, &w);

        assert!(names.contains("C_20150806.1530.gz"), "start edge must be included");
        assert!(names.contains("C_20150807.0030.gz"), "end edge must be included");
        assert!(!names.contains("C_20150806.1529.gz"), "one minute before start is outside");
        assert!(!names.contains("C_20150807.0031.gz"), "one minute after end is outside");
    }

    #[test]
    fn test_date_directories_outside_window_are_not_entered() {
        let tmp = TempDir::new().unwrap();
        // Misfiled: stamp is inside the window but the directory date is not.
        touch(tmp.path(), "20150808", "CB", "C_20150806.1600.gz");
        touch(tmp.path(), "20150806", "CB", "C_20150806.1600.gz");

        let timeline = ArchiveTimeline::new(tmp.path());
        let w = window(at(2015, 8, 6, 15, 30), at(2015, 8, 7, 0, 30));
        let entries: Vec<_> = timeline.select(&w).iter().map(|r| r.unwrap()).collect();
        assert_eq!(entries.len(), 1);
        assert!(entries[0].raw_path.to_string_lossy().contains("20150806"));
    }

    #[test]
    fn test_duplicate_names_in_different_directories_are_both_yielded() {
        let tmp = TempDir::new().unwrap();
        touch(tmp.path(), "20150806", "CB", "M_20150806.1600.gz");
        touch(tmp.path(), "20150806", "MREF", "M_20150806.1600.gz");

        let timeline = ArchiveTimeline::new(tmp.path());
        let w = window(at(2015, 8, 6, 15, 30), at(2015, 8, 7, 0, 30));
        assert_eq!(timeline.select(&w).iter().count(), 2);
    }

    #[test]
    fn test_selection_is_restartable() {
        let tmp = TempDir::new().unwrap();
        touch(tmp.path(), "20150806", "CB", "C_20150806.1600.gz");
        touch(tmp.path(), "20150806", "CB", "M_20150806.1610.gz");

        let timeline = ArchiveTimeline::new(tmp.path());
        let w = window(at(2015, 8, 6, 15, 30), at(2015, 8, 7, 0, 30));
        let selection = timeline.select(&w);
        let first: BTreeSet<_> = selection.iter().map(|r| r.unwrap().file_name()).collect();
        let second: BTreeSet<_> = selection.iter().map(|r| r.unwrap().file_name()).collect();
        assert_eq!(first.len(), 2);
        assert_eq!(first, second);
    }

    #[test]
    fn test_unknown_prefix_and_non_dated_directories_are_skipped() {
        let tmp = TempDir::new().unwrap();
        touch(tmp.path(), "20150806", "CB", "X_20150806.1600.gz");
        touch(tmp.path(), "20150806", "CB", "readme.txt");
        fs::create_dir_all(tmp.path().join("2015").join("scratch")).unwrap();

        let timeline = ArchiveTimeline::new(tmp.path());
        let w = window(at(2015, 8, 6, 15, 30), at(2015, 8, 7, 0, 30));
        assert_eq!(timeline.select(&w).iter().count(), 0);
    }

    #[test]
    fn test_window_spanning_new_year_reads_both_year_directories() {
        let tmp = TempDir::new().unwrap();
        touch(tmp.path(), "20151231", "CB", "C_20151231.2350.gz");
        touch(tmp.path(), "20160101", "CB", "C_20160101.0010.gz");

        let timeline = ArchiveTimeline::new(tmp.path());
        let w = window(at(2015, 12, 31, 23, 0), at(2016, 1, 1, 1, 0));
        assert_eq!(selected_names(&timeline, &w).len(), 2);
    }

    #[test]
    fn test_new_year_window_skips_absent_earlier_year() {
        let tmp = TempDir::new().unwrap();
        touch(tmp.path(), "20160101", "CB", "C_20160101.0010.gz");

        let timeline = ArchiveTimeline::new(tmp.path());
        let w = window(at(2015, 12, 31, 23, 0), at(2016, 1, 1, 1, 0));
        let names = selected_names(&timeline, &w);
        assert_eq!(names.into_iter().collect::<Vec<_>>(), vec!["C_20160101.0010.gz"]);
    }

    #[test]
    fn test_new_year_window_skips_absent_later_year() {
        let tmp = TempDir::new().unwrap();
        touch(tmp.path(), "20151231", "CB", "C_20151231.2350.gz");

        let timeline = ArchiveTimeline::new(tmp.path());
        let w = window(at(2015, 12, 31, 23, 0), at(2016, 1, 1, 1, 0));
        assert_eq!(selected_names(&timeline, &w).len(), 1);
    }

    #[test]
    fn test_new_year_window_with_no_year_directories_is_an_error() {
        let tmp = TempDir::new().unwrap();
        let timeline = ArchiveTimeline::new(tmp.path());
        let w = window(at(2015, 12, 31, 23, 0), at(2016, 1, 1, 1, 0));
        let results: Vec<_> = timeline.select(&w).iter().collect();
        assert_eq!(results.len(), 1);
        assert!(matches!(results[0], Err(WranglerError::Io { .. })));
    }

    #[test]
    fn test_missing_year_directory_is_an_error() {
        let tmp = TempDir::new().unwrap();
        let timeline = ArchiveTimeline::new(tmp.path());
        let w = window(at(2015, 8, 6, 15, 30), at(2015, 8, 7, 0, 30));
        let results: Vec<_> = timeline.select(&w).iter().collect();
        assert_eq!(results.len(), 1);
        assert!(matches!(results[0], Err(WranglerError::Io { .. })));
    }

    #[test]
    fn test_open_rejects_missing_root() {
        let tmp = TempDir::new().unwrap();
        assert!(ArchiveTimeline::open(tmp.path().join("absent")).is_err());
    }
}
