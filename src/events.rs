/// Event table loading and window resolution.
///
/// The event table is the single source of truth for which storms are
/// wrangled. Each row becomes an [`Event`] in local time; [`resolve`] turns
/// every event into a closed [`Window`] in archive-native time by subtracting
/// the configured offset (8 hours by default).

use chrono::{Duration, NaiveDateTime, Timelike};
use serde::Deserialize;
use std::collections::HashSet;
use std::fs::File;
use std::io::Read;
use std::path::Path;

use crate::config::GridConfig;
use crate::logging::{self, Stage};
use crate::model::{Event, Window, WranglerError};

/// Timestamp layouts accepted in the event table.
const TABLE_TIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%Y/%m/%d %H:%M:%S",
    "%Y/%m/%d %H:%M",
];

#[derive(Debug, Deserialize)]
struct EventRow {
    #[serde(rename = "Time of issuing")]
    issue: String,
    #[serde(rename = "Time of canceling")]
    cancel: String,
    #[serde(rename = "En name")]
    name: String,
}

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

/// Reads the event table from a CSV file.
pub fn load_events(path: &Path) -> Result<Vec<Event>, WranglerError> {
    let file = File::open(path).map_err(|e| WranglerError::io(path, e))?;
    parse_events(file)
}

/// Parses event rows in table order. Any malformed row aborts the load.
pub fn parse_events<R: Read>(reader: R) -> Result<Vec<Event>, WranglerError> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(reader);

    let mut events = Vec::new();
    for (i, record) in csv_reader.deserialize::<EventRow>().enumerate() {
        // Header is line 1
        let line = i + 2;
        let row = record.map_err(|e| {
            WranglerError::Config(format!("event table line {}: {}", line, e))
        })?;

        if row.name.is_empty() {
            return Err(WranglerError::Config(format!(
                "event table line {}: empty 'En name'",
                line
            )));
        }
        let issue_time = parse_table_time(&row.issue).ok_or_else(|| {
            WranglerError::Config(format!(
                "event '{}' (line {}): unparseable issue time '{}'",
                row.name, line, row.issue
            ))
        })?;
        let cancel_time = parse_table_time(&row.cancel).ok_or_else(|| {
            WranglerError::Config(format!(
                "event '{}' (line {}): unparseable cancel time '{}'",
                row.name, line, row.cancel
            ))
        })?;

        events.push(Event {
            name: row.name,
            issue_time,
            cancel_time,
        });
    }
    Ok(events)
}

fn parse_table_time(text: &str) -> Option<NaiveDateTime> {
    TABLE_TIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(text.trim(), fmt).ok())
}

// ---------------------------------------------------------------------------
// Window resolution
// ---------------------------------------------------------------------------

/// Derives one archive-native window per event, in input order.
///
/// Fails with `Config` on the first event whose issue time is after its
/// cancel time, or whose shifted times fall outside the representable range.
pub fn resolve(events: &[Event], grid: &GridConfig) -> Result<Vec<Window>, WranglerError> {
    let offset = Duration::try_hours(grid.archive_offset_hours).ok_or_else(|| {
        WranglerError::Config(format!(
            "archive offset of {} hours is out of range",
            grid.archive_offset_hours
        ))
    })?;
    let mut seen = HashSet::new();
    let mut windows = Vec::with_capacity(events.len());

    for event in events {
        if event.issue_time > event.cancel_time {
            return Err(WranglerError::Config(format!(
                "event '{}': issue time {} is after cancel time {}",
                event.name, event.issue_time, event.cancel_time
            )));
        }

        let label = event.label();
        if !seen.insert(label.clone()) {
            logging::warn(
                Stage::Events,
                Some(&label),
                "duplicate event label; artifacts of both rows share one grid",
            );
        }

        let to_archive = |ts: NaiveDateTime| {
            ts.checked_sub_signed(offset)
                .map(truncate_to_minute)
                .ok_or_else(|| {
                    WranglerError::Config(format!(
                        "event '{}': {} shifted by {}h is out of range",
                        event.name, ts, grid.archive_offset_hours
                    ))
                })
        };
        let window = Window {
            start: to_archive(event.issue_time)?,
            end: to_archive(event.cancel_time)?,
            label,
        };
        logging::info(
            Stage::Events,
            Some(&window.label),
            &format!(
                "start {} {} | end {} {}",
                window.start.format("%Y%m%d"),
                window.start.format("%H%M"),
                window.end.format("%Y%m%d"),
                window.end.format("%H%M"),
            ),
        );
        windows.push(window);
    }
    Ok(windows)
}

fn truncate_to_minute(ts: NaiveDateTime) -> NaiveDateTime {
    ts.with_second(0)
        .and_then(|t| t.with_nanosecond(0))
        .unwrap_or(ts)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, mo, d)
            .unwrap()
            .and_hms_opt(h, mi, 0)
            .unwrap()
    }

    fn event(name: &str, issue: NaiveDateTime, cancel: NaiveDateTime) -> Event {
        Event {
            name: name.to_string(),
            issue_time: issue,
            cancel_time: cancel,
        }
    }

    // --- Loading ------------------------------------------------------------

    #[test]
    fn test_parse_events_reads_named_columns_and_ignores_extras() {
        let table = "\
No,Time of issuing,Time of canceling,En name,Ch name
1,2015-08-06 23:30:00,2015-08-09 08:30:00,SOUDELOR,x
2,2016/09/26 08:30,2016/09/29 08:30,MEGI,y
";
        let events = parse_events(table.as_bytes()).expect("table should parse");
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].name, "SOUDELOR");
        assert_eq!(events[0].issue_time, at(2015, 8, 6, 23, 30));
        assert_eq!(events[1].cancel_time, at(2016, 9, 29, 8, 30));
    }

    #[test]
    fn test_unparseable_time_names_the_event() {
        let table = "Time of issuing,Time of canceling,En name\nsoon,2015-08-09 08:30,SOUDELOR\n";
        let err = parse_events(table.as_bytes()).unwrap_err();
        assert!(matches!(err, WranglerError::Config(_)));
        assert!(err.to_string().contains("SOUDELOR"), "got: {}", err);
    }

    #[test]
    fn test_empty_name_is_config_error() {
        let table = "Time of issuing,Time of canceling,En name\n2015-08-06 23:30,2015-08-09 08:30,\n";
        assert!(matches!(
            parse_events(table.as_bytes()),
            Err(WranglerError::Config(_))
        ));
    }

    #[test]
    fn test_missing_column_is_config_error() {
        let table = "Time of issuing,En name\n2015-08-06 23:30,SOUDELOR\n";
        assert!(parse_events(table.as_bytes()).is_err());
    }

    // --- Resolution ---------------------------------------------------------

    #[test]
    fn test_resolve_subtracts_eight_hours() {
        let events = [event("SOUDELOR", at(2015, 8, 6, 23, 30), at(2015, 8, 9, 8, 30))];
        let windows = resolve(&events, &GridConfig::default()).unwrap();
        assert_eq!(windows[0].label, "2015.SOUDELOR");
        assert_eq!(windows[0].start, at(2015, 8, 6, 15, 30));
        assert_eq!(windows[0].end, at(2015, 8, 9, 0, 30));
    }

    #[test]
    fn test_resolve_crosses_midnight_backwards() {
        // 05:00 local is 21:00 the previous day in archive time.
        let events = [event("NEWYEAR", at(2016, 1, 1, 5, 0), at(2016, 1, 1, 6, 0))];
        let windows = resolve(&events, &GridConfig::default()).unwrap();
        assert_eq!(windows[0].start, at(2015, 12, 31, 21, 0));
        assert_eq!(windows[0].start.date(), NaiveDate::from_ymd_opt(2015, 12, 31).unwrap());
    }

    #[test]
    fn test_every_window_starts_before_it_ends() {
        let events = [
            event("A", at(2015, 8, 6, 0, 0), at(2015, 8, 6, 0, 0)),
            event("B", at(2015, 8, 6, 0, 0), at(2015, 8, 7, 0, 0)),
        ];
        for window in resolve(&events, &GridConfig::default()).unwrap() {
            assert!(window.start <= window.end, "window {:?} is inverted", window);
        }
    }

    #[test]
    fn test_issue_after_cancel_is_config_error() {
        let events = [
            event("GOOD", at(2015, 8, 6, 0, 0), at(2015, 8, 7, 0, 0)),
            event("BAD", at(2015, 8, 8, 0, 0), at(2015, 8, 7, 0, 0)),
        ];
        let err = resolve(&events, &GridConfig::default()).unwrap_err();
        assert!(matches!(err, WranglerError::Config(_)));
        assert!(err.to_string().contains("BAD"));
    }

    #[test]
    fn test_shift_past_earliest_date_is_config_error() {
        let earliest = NaiveDate::MIN.and_hms_opt(0, 0, 0).unwrap();
        let events = [event("ANCIENT", earliest, earliest + chrono::Duration::hours(1))];
        let err = resolve(&events, &GridConfig::default()).unwrap_err();
        assert!(matches!(err, WranglerError::Config(_)));
        assert!(err.to_string().contains("ANCIENT"), "got: {}", err);
    }

    #[test]
    fn test_unbounded_offset_is_config_error_not_panic() {
        let grid = GridConfig {
            archive_offset_hours: 10_000_000_000,
            ..GridConfig::default()
        };
        let events = [event("SOUDELOR", at(2015, 8, 6, 23, 30), at(2015, 8, 9, 8, 30))];
        assert!(matches!(resolve(&events, &grid), Err(WranglerError::Config(_))));
    }

    #[test]
    fn test_seconds_are_truncated_to_minute_precision() {
        let issue = at(2015, 8, 6, 23, 30) + chrono::Duration::seconds(42);
        let events = [event("SOUDELOR", issue, at(2015, 8, 9, 8, 30))];
        let windows = resolve(&events, &GridConfig::default()).unwrap();
        assert_eq!(windows[0].start, at(2015, 8, 6, 15, 30));
    }
}
