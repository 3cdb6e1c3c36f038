//! Run reports
//!
//! Everything the pipeline writes for human audit: the missing-files table
//! (written before any gap is repaired), the summary statistics files, and a
//! JSON run report with per-stage counts.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::analysis::gaps::{FillOutcome, MissingReport};
use crate::analysis::summary::CategorySummary;
use crate::ingest::stage::StagedCounts;
use crate::model::{Category, WranglerError};

pub const MISSING_FILES_NAME: &str = "missing_files.csv";
pub const MU_STD_NAME: &str = "mu_std.txt";
pub const OVERALL_NAME: &str = "overall.txt";
pub const RUN_REPORT_NAME: &str = "run_report.json";

// ============================================================================
// Run report
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub timestamp: String,
    pub extraction: Vec<ExtractionRecord>,
    pub decode_failures: Vec<DecodeFailure>,
    pub missing: BTreeMap<Category, usize>,
    pub interpolation_failures: Vec<InterpolationFailure>,
    /// Artifacts in the store per event and category after gap filling.
    #[serde(default)]
    pub stored: BTreeMap<String, BTreeMap<Category, usize>>,
    pub summary: RunSummary,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunSummary {
    pub events: usize,
    pub selected: usize,
    pub staged: usize,
    pub decoded: usize,
    pub decode_failed: usize,
    pub missing: usize,
    pub filled: usize,
    pub fill_failed: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionRecord {
    pub event: String,
    pub window_start: String,
    pub window_end: String,
    pub staged: StagedCounts,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecodeFailure {
    pub event: String,
    pub file: String,
    pub error_message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InterpolationFailure {
    pub key: String,
    pub error_message: String,
}

impl RunReport {
    pub fn new() -> Self {
        Self {
            timestamp: Utc::now().to_rfc3339(),
            extraction: Vec::new(),
            decode_failures: Vec::new(),
            missing: BTreeMap::new(),
            interpolation_failures: Vec::new(),
            stored: BTreeMap::new(),
            summary: RunSummary::default(),
        }
    }

    pub fn record_gap_fill(&mut self, missing: &MissingReport, outcome: &FillOutcome) {
        self.missing = missing
            .missing
            .iter()
            .map(|(category, keys)| (*category, keys.len()))
            .collect();
        self.summary.missing = missing.total();
        self.summary.filled = outcome.filled.len();
        self.summary.fill_failed = outcome.failures.len();
        self.interpolation_failures = outcome
            .failures
            .iter()
            .map(|(key, e)| InterpolationFailure {
                key: key.to_string(),
                error_message: e.to_string(),
            })
            .collect();
    }
}

impl Default for RunReport {
    fn default() -> Self {
        Self::new()
    }
}

pub fn write_run_report(report: &RunReport, path: &Path) -> Result<(), WranglerError> {
    let mut writer = BufWriter::new(create(path)?);
    serde_json::to_writer_pretty(&mut writer, report)?;
    writer.flush().map_err(|e| WranglerError::io(path, e))?;
    Ok(())
}

pub fn print_summary(report: &RunReport) {
    let s = &report.summary;
    println!("\n════════════════════════════════════════════════════════════");
    println!("📊 RUN SUMMARY");
    println!("════════════════════════════════════════════════════════════");
    println!();
    println!("Events:           {}", s.events);
    println!("Selected/Staged:  {}/{}", s.selected, s.staged);
    println!("Decoded:          {}  ({} failed)", s.decoded, s.decode_failed);
    for (category, count) in &report.missing {
        println!("Missing {}:      {}", category, count);
    }
    println!("Gap fill:         {}/{} filled  ({} failed)", s.filled, s.missing, s.fill_failed);
    for (event, counts) in &report.stored {
        let parts: Vec<String> = counts.iter().map(|(c, n)| format!("{} {}", c, n)).collect();
        println!("Stored {:<18} {}", event, parts.join(" | "));
    }
    println!();

    if !report.decode_failures.is_empty() {
        println!("❌ DECODE FAILURES ({}):", report.decode_failures.len());
        for failure in &report.decode_failures {
            println!("   - {} {}: {}", failure.event, failure.file, failure.error_message);
        }
    }
    if !report.interpolation_failures.is_empty() {
        println!("❌ UNFILLED GAPS ({}):", report.interpolation_failures.len());
        for failure in &report.interpolation_failures {
            println!("   - {}", failure.error_message);
        }
    }
    println!("════════════════════════════════════════════════════════════");
}

// ============================================================================
// Missing-files table
// ============================================================================

/// Writes `category,file_name` rows, categories in order, keys in
/// discovery order. Overwrites the previous run's table.
pub fn write_missing_files(missing: &MissingReport, path: &Path) -> Result<(), WranglerError> {
    let file = create(path)?;
    let mut writer = csv::Writer::from_writer(file);
    writer.write_record(["category", "file_name"])?;
    for record in missing.records() {
        writer.write_record([record.category.as_str(), record.key.file_name().as_str()])?;
    }
    writer.flush().map_err(|e| WranglerError::io(path, e))?;
    Ok(())
}

// ============================================================================
// Summary statistics files
// ============================================================================

/// Writes `mu_std.txt` and `overall.txt` into `dir`.
pub fn write_summaries(summaries: &[CategorySummary], dir: &Path) -> Result<(), WranglerError> {
    let mu_std_path = dir.join(MU_STD_NAME);
    let mut mu_std = BufWriter::new(create(&mu_std_path)?);
    for s in summaries {
        writeln!(mu_std, "{:>5}: |mu: {:6.3} |std: {:6.3}", s.category.as_str(), s.mean, s.std)
            .map_err(|e| WranglerError::io(&mu_std_path, e))?;
    }
    mu_std.flush().map_err(|e| WranglerError::io(&mu_std_path, e))?;

    let overall_path = dir.join(OVERALL_NAME);
    let mut overall = BufWriter::new(create(&overall_path)?);
    let rule = "-".repeat(125);
    for s in summaries {
        let mut block = format!("{}\n{}\n", rule, s.category);
        for e in &s.events {
            block.push_str(&format!(
                "{:<18}\t|min:{:7.2}\tfile_min:{:28}\t|max:{:7.2} file_max:{}\n",
                e.event_name, e.min, e.min_file, e.max, e.max_file
            ));
        }
        overall
            .write_all(block.as_bytes())
            .map_err(|e| WranglerError::io(&overall_path, e))?;
    }
    overall.flush().map_err(|e| WranglerError::io(&overall_path, e))?;
    Ok(())
}

fn create(path: &Path) -> Result<File, WranglerError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| WranglerError::io(parent, e))?;
    }
    File::create(path).map_err(|e| WranglerError::io(path, e))
}

// ============================================================================
// Tests
// ============================================================================
