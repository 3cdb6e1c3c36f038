//! Grid normalization: decoded payload → keyed artifact.

use chrono::{Duration, NaiveDateTime};

use crate::model::{ArchiveEntry, GridKey, NormalizedArtifact, Raster};

/// Archive-native time back to local time. Inverse of the window shift.
pub fn to_local(archive_time: NaiveDateTime, offset: Duration) -> NaiveDateTime {
    archive_time + offset
}

/// Builds the artifact for one decoded entry.
///
/// `event_label` is the label of the window the entry was selected under;
/// it is passed through, never re-derived from the timestamp.
pub fn normalize(
    event_label: &str,
    entry: &ArchiveEntry,
    decoded: Raster,
    offset: Duration,
) -> NormalizedArtifact {
    NormalizedArtifact {
        key: GridKey::new(
            event_label,
            entry.category,
            to_local(entry.embedded_timestamp, offset),
        ),
        data: decoded,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GridConfig;
    use crate::events::resolve;
    use crate::model::{Category, Event};
    use chrono::NaiveDate;
    use std::path::Path;

    fn at(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, mo, d)
            .unwrap()
            .and_hms_opt(h, mi, 0)
            .unwrap()
    }

    #[test]
    fn test_archive_stamp_lands_eight_hours_later() {
        let entry = ArchiveEntry::from_path(Path::new("M_20150806.1600.gz")).unwrap();
        let raster = Raster::new(1, 1, vec![7.0]).unwrap();
        let artifact = normalize("2015.SOUDELOR", &entry, raster, GridConfig::default().archive_offset());
        assert_eq!(artifact.key.category, Category::Rad);
        assert_eq!(artifact.key.event_name, "2015.SOUDELOR");
        assert_eq!(artifact.key.timestamp, at(2015, 8, 7, 0, 0));
    }

    #[test]
    fn test_window_shift_and_normalize_round_trip_exactly() {
        let grid = GridConfig::default();
        let local = at(2015, 8, 7, 2, 40);
        let events = [Event {
            name: "SOUDELOR".to_string(),
            issue_time: local,
            cancel_time: local + Duration::hours(1),
        }];
        let window = &resolve(&events, &grid).unwrap()[0];

        let name = format!("C_{}.gz", window.start.format("%Y%m%d.%H%M"));
        let entry = ArchiveEntry::from_path(Path::new(&name)).unwrap();
        assert!(window.contains(entry.embedded_timestamp));

        let artifact = normalize(
            &window.label,
            &entry,
            Raster::new(1, 1, vec![0.0]).unwrap(),
            grid.archive_offset(),
        );
        assert_eq!(artifact.key.timestamp, local);
    }
}
