//! Summary statistics over the wrangled store.
//!
//! Per category: population mean and standard deviation over every value of
//! every artifact. Per event within a category: the smallest and largest
//! value and the artifact holding each.

use serde::{Deserialize, Serialize};

use crate::logging::{self, Stage};
use crate::model::{Category, WranglerError};
use crate::store::ArtifactStore;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventExtremes {
    pub event_name: String,
    pub min: f64,
    pub min_file: String,
    pub max: f64,
    pub max_file: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategorySummary {
    pub category: Category,
    pub artifacts: usize,
    pub values: usize,
    pub mean: f64,
    pub std: f64,
    /// Ordered by event label.
    pub events: Vec<EventExtremes>,
}

/// Two passes over the category: sums and extremes, then squared deviations.
/// Returns `None` for a category with no artifacts or only empty ones.
pub fn summarize_category(
    store: &ArtifactStore,
    category: Category,
) -> Result<Option<CategorySummary>, WranglerError> {
    let keys = store.keys(category)?;

    let mut sum = 0.0;
    let mut count = 0usize;
    let mut events: Vec<EventExtremes> = Vec::new();

    for key in &keys {
        let Some(artifact) = store.read(key)? else {
            continue;
        };
        let (Some(min), Some(max)) = (artifact.data.min(), artifact.data.max()) else {
            continue;
        };
        sum += artifact.data.data.iter().sum::<f64>();
        count += artifact.data.data.len();

        let file = key.file_name();
        match events.last_mut() {
            Some(ext) if ext.event_name == key.event_name => {
                if min < ext.min {
                    ext.min = min;
                    ext.min_file = file.clone();
                }
                if max > ext.max {
                    ext.max = max;
                    ext.max_file = file;
                }
            }
            _ => events.push(EventExtremes {
                event_name: key.event_name.clone(),
                min,
                min_file: file.clone(),
                max,
                max_file: file,
            }),
        }
    }

    if count == 0 {
        return Ok(None);
    }
    let mean = sum / count as f64;

    let mut sq = 0.0;
    for key in &keys {
        if let Some(artifact) = store.read(key)? {
            sq += artifact
                .data
                .data
                .iter()
                .map(|v| (v - mean) * (v - mean))
                .sum::<f64>();
        }
    }
    let std = (sq / count as f64).sqrt();

    Ok(Some(CategorySummary {
        category,
        artifacts: keys.len(),
        values: count,
        mean,
        std,
        events,
    }))
}

/// Summaries for every category present in the store.
pub fn summarize(store: &ArtifactStore) -> Result<Vec<CategorySummary>, WranglerError> {
    let mut summaries = Vec::new();
    for category in store.categories() {
        match summarize_category(store, category)? {
            Some(summary) => {
                logging::info(
                    Stage::Summary,
                    Some(category.as_str()),
                    &format!(
                        "{} artifacts | mu {:.3} | std {:.3}",
                        summary.artifacts, summary.mean, summary.std
                    ),
                );
                summaries.push(summary);
            }
            None => logging::warn(Stage::Summary, Some(category.as_str()), "no values to summarize"),
        }
    }
    Ok(summaries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{GridKey, NormalizedArtifact, Raster};
    use chrono::NaiveDate;
    use tempfile::TempDir;

    fn put(store: &ArtifactStore, event: &str, minute: u32, values: Vec<f64>) {
        let ts = NaiveDate::from_ymd_opt(2015, 8, 7)
            .unwrap()
            .and_hms_opt(0, minute, 0)
            .unwrap();
        let cols = values.len();
        store
            .write(&NormalizedArtifact {
                key: GridKey::new(event, Category::Qpe, ts),
                data: Raster::new(1, cols, values).unwrap(),
            })
            .unwrap();
    }

    #[test]
    fn test_mean_and_population_std_span_all_artifacts() {
        let tmp = TempDir::new().unwrap();
        let store = ArtifactStore::new(tmp.path());
        put(&store, "2015.SOUDELOR", 0, vec![2.0, 4.0]);
        put(&store, "2015.SOUDELOR", 10, vec![4.0, 4.0]);
        put(&store, "2016.MEGI", 0, vec![5.0, 5.0, 7.0, 9.0]);

        let summary = summarize_category(&store, Category::Qpe).unwrap().unwrap();
        assert_eq!(summary.artifacts, 3);
        assert_eq!(summary.values, 8);
        assert!((summary.mean - 5.0).abs() < 1e-12);
        assert!((summary.std - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_extremes_are_tracked_per_event_with_their_files() {
        let tmp = TempDir::new().unwrap();
        let store = ArtifactStore::new(tmp.path());
        put(&store, "2015.SOUDELOR", 0, vec![1.0, 3.0]);
        put(&store, "2015.SOUDELOR", 10, vec![0.5, 9.0]);
        put(&store, "2016.MEGI", 0, vec![2.0]);

        let summary = summarize_category(&store, Category::Qpe).unwrap().unwrap();
        assert_eq!(summary.events.len(), 2);
        let soudelor = &summary.events[0];
        assert_eq!(soudelor.event_name, "2015.SOUDELOR");
        assert_eq!(soudelor.min, 0.5);
        assert_eq!(soudelor.max, 9.0);
        assert_eq!(soudelor.max_file, "2015.SOUDELOR.201508070010.grid.gz");
        assert_eq!(summary.events[1].min_file, summary.events[1].max_file);
    }

    #[test]
    fn test_empty_store_has_no_summaries() {
        let tmp = TempDir::new().unwrap();
        let store = ArtifactStore::new(tmp.path());
        assert!(summarize(&store).unwrap().is_empty());
        assert!(summarize_category(&store, Category::Rad).unwrap().is_none());
    }
}
