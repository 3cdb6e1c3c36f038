/// Stage orchestration.
///
/// Runs the wrangler stages in order: resolve windows, select and stage
/// archive entries, decode and normalize into the store, detect and fill
/// gaps, then summarize. Each stage is also callable on its own.
///
/// Stages are sequential and single-writer. Gap filling starts only after the
/// decode stage has finished for every event.

use std::collections::BTreeMap;

use crate::analysis::gaps::{self, FillOutcome, MissingReport};
use crate::analysis::normalize::normalize;
use crate::analysis::summary::{self, CategorySummary};
use crate::config::WranglerConfig;
use crate::events;
use crate::ingest::decode::{Converter, decode_entry};
use crate::ingest::select::ArchiveTimeline;
use crate::ingest::stage::{self, StagedEntry};
use crate::logging::{self, Stage};
use crate::model::{Event, Window, WranglerError};
use crate::report::{self, DecodeFailure, ExtractionRecord, RunReport};
use crate::store::ArtifactStore;

/// Which stages [`run`] repeats when their outputs already exist.
#[derive(Debug, Clone, Copy, Default)]
pub struct RunOptions {
    /// Re-extract and re-decode even if the staging area and store exist.
    pub force: bool,
}

/// Loads the event table and resolves one window per event.
pub fn load_windows(config: &WranglerConfig) -> Result<(Vec<Event>, Vec<Window>), WranglerError> {
    let events = events::load_events(&config.paths.event_table)?;
    let windows = events::resolve(&events, &config.grid)?;
    logging::info(
        Stage::Events,
        None,
        &format!("{} events loaded from {}", events.len(), config.paths.event_table.display()),
    );
    Ok((events, windows))
}

// ---------------------------------------------------------------------------
// Extract: select + stage
// ---------------------------------------------------------------------------

/// Selects every window's entries from the archive and copies them into the
/// staging area. Any filesystem error aborts the stage.
pub fn extract(
    config: &WranglerConfig,
    windows: &[Window],
    report: &mut RunReport,
) -> Result<Vec<StagedEntry>, WranglerError> {
    let timeline = ArchiveTimeline::open(&config.paths.archive_root)?;
    let mut all = Vec::new();

    for window in windows {
        let selection = timeline.select(window);
        let staged = stage::stage_entries(selection.iter(), &config.paths.staging_root, &window.label)?;

        let mut distinct: BTreeMap<String, StagedEntry> = BTreeMap::new();
        for s in &staged {
            distinct.insert(s.entry.file_name(), s.clone());
        }
        let distinct: Vec<StagedEntry> = distinct.into_values().collect();
        let counts = stage::count_by_category(&distinct);

        if staged.len() != distinct.len() {
            logging::warn(
                Stage::Select,
                Some(&window.label),
                &format!(
                    "{} selected entries share a file name with another entry",
                    staged.len() - distinct.len()
                ),
            );
        }
        logging::info(
            Stage::Stage,
            Some(&window.label),
            &format!("{} files staged {:?}", counts.total(), counts.by_category),
        );

        report.summary.selected += staged.len();
        report.summary.staged += distinct.len();
        report.extraction.push(ExtractionRecord {
            event: window.label.clone(),
            window_start: window.start.format("%Y%m%d.%H%M").to_string(),
            window_end: window.end.format("%Y%m%d.%H%M").to_string(),
            staged: counts,
        });
        all.extend(distinct);
    }
    Ok(all)
}

// ---------------------------------------------------------------------------
// Decode + normalize
// ---------------------------------------------------------------------------

/// Decodes every staged entry and writes its artifact into the store.
///
/// A decode failure is logged, recorded in the report and skipped; the gap
/// it leaves is picked up by gap detection. Store write failures abort.
pub fn decode_staged(
    config: &WranglerConfig,
    converter: &dyn Converter,
    report: &mut RunReport,
) -> Result<usize, WranglerError> {
    let staged = stage::list_staged(&config.paths.staging_root)?;
    let store = ArtifactStore::new(&config.paths.store_root);
    let offset = config.grid.archive_offset();
    let mut decoded = 0usize;

    for s in &staged {
        let file = s.entry.file_name();
        match decode_entry(&s.entry, converter) {
            Ok(raster) => {
                let artifact = normalize(&s.event_label, &s.entry, raster, offset);
                store.write(&artifact)?;
                logging::debug(Stage::Normalize, Some(&artifact.key.to_string()), &file);
                decoded += 1;
            }
            Err(e) => {
                logging::log_decode_failure(&format!("{}/{}", s.event_label, file), &e);
                report.decode_failures.push(DecodeFailure {
                    event: s.event_label.clone(),
                    file,
                    error_message: e.to_string(),
                });
            }
        }
    }

    logging::log_stage_summary(Stage::Decode, staged.len(), decoded, staged.len() - decoded);
    report.summary.decoded += decoded;
    report.summary.decode_failed += staged.len() - decoded;
    Ok(decoded)
}

// ---------------------------------------------------------------------------
// Gap fill + summary
// ---------------------------------------------------------------------------

/// Writes the missing-files table, then fills every gap it can and records
/// how many artifacts each event ends up with.
pub fn fill_gaps(
    config: &WranglerConfig,
    events: &[Event],
    report: &mut RunReport,
) -> Result<(MissingReport, FillOutcome), WranglerError> {
    let store = ArtifactStore::new(&config.paths.store_root);
    let path = config.paths.report_dir.join(report::MISSING_FILES_NAME);
    let (missing, outcome) = gaps::detect_and_fill(events, &store, &config.grid, &path)?;
    report.record_gap_fill(&missing, &outcome);

    for event in events {
        let label = event.label();
        let mut counts = BTreeMap::new();
        for category in &config.grid.enabled_categories {
            counts.insert(*category, store.count(*category, &label)?);
        }
        logging::info(
            Stage::GapFill,
            Some(&label),
            &format!("{:?} artifacts stored", counts),
        );
        report.stored.insert(label, counts);
    }
    Ok((missing, outcome))
}

/// Computes and writes the summary statistics.
pub fn summarize(config: &WranglerConfig) -> Result<Vec<CategorySummary>, WranglerError> {
    let store = ArtifactStore::new(&config.paths.store_root);
    let summaries = summary::summarize(&store)?;
    report::write_summaries(&summaries, &config.paths.report_dir)?;
    Ok(summaries)
}

// ---------------------------------------------------------------------------
// Full run
// ---------------------------------------------------------------------------

/// Runs every stage. Extraction is skipped when the staging area exists and
/// decoding when the store exists, unless `options.force` is set.
pub fn run(
    config: &WranglerConfig,
    converter: &dyn Converter,
    options: RunOptions,
) -> Result<RunReport, WranglerError> {
    let mut report = RunReport::new();
    let (events, windows) = load_windows(config)?;
    report.summary.events = events.len();

    if config.paths.staging_root.is_dir() && !options.force {
        logging::info(Stage::Stage, None, "Already extracted original data");
    } else {
        extract(config, &windows, &mut report)?;
    }

    if ArtifactStore::new(&config.paths.store_root).exists() && !options.force {
        logging::info(Stage::Decode, None, "Already decoded staged files");
    } else {
        decode_staged(config, converter, &mut report)?;
    }

    fill_gaps(config, &events, &mut report)?;
    summarize(config)?;

    report::write_run_report(
        &report,
        &config.paths.report_dir.join(report::RUN_REPORT_NAME),
    )?;
    Ok(report)
}
