//! Run configuration.
//!
//! A single immutable [`WranglerConfig`] is built once at startup from a TOML
//! file and handed by reference to every stage. Grid policy constants live
//! here rather than in the stages so tests can tighten them.
//!
//! ```toml
//! [paths]
//! event_table = "data/ty_list.csv"
//! archive_root = "/mnt/radar/original"
//! staging_root = "data/compressed"
//! store_root = "data/numpy"
//! report_dir = "data/reports"
//! converter_dir = "fortran"
//!
//! [grid]
//! enabled_categories = ["QPE", "RAD"]
//! ```

use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use crate::model::{
    ARCHIVE_OFFSET_HOURS, Category, GRID_STEP_MINUTES, MAX_GRID_STEPS, WranglerError,
};

/// Environment variable consulted when no `--config` flag is given.
pub const CONFIG_ENV_VAR: &str = "WRANGLER_CONFIG";

/// Fallback config location, relative to the working directory.
pub const DEFAULT_CONFIG_PATH: &str = "./wrangler.toml";

/// Largest accepted shift between local and archive time.
pub const MAX_ARCHIVE_OFFSET_HOURS: i64 = 24;

/// Largest accepted grid cadence (one day).
pub const MAX_STEP_MINUTES: i64 = 1440;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WranglerConfig {
    pub paths: PathsConfig,
    #[serde(default)]
    pub grid: GridConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    /// CSV with `Time of issuing`, `Time of canceling`, `En name` columns.
    pub event_table: PathBuf,
    /// Root of the `year/date/.../file` archive timeline.
    pub archive_root: PathBuf,
    /// Per-event copies of selected entries land here.
    pub staging_root: PathBuf,
    /// Artifact store, one directory per category.
    pub store_root: PathBuf,
    /// Missing-files table, summaries and the run report.
    pub report_dir: PathBuf,
    /// Holds one `<CATEGORY>.out` converter executable per category.
    pub converter_dir: PathBuf,
    /// Parent of the converter's scratch directory; system temp when unset.
    #[serde(default)]
    pub scratch_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GridConfig {
    #[serde(default = "GridConfig::default_archive_offset_hours")]
    pub archive_offset_hours: i64,
    #[serde(default = "GridConfig::default_step_minutes")]
    pub step_minutes: i64,
    #[serde(default = "GridConfig::default_max_grid_steps")]
    pub max_grid_steps: usize,
    /// Categories covered by gap detection. QPF decodes but is not gap-filled
    /// by default.
    #[serde(default = "GridConfig::default_enabled_categories")]
    pub enabled_categories: BTreeSet<Category>,
}

impl GridConfig {
    fn default_archive_offset_hours() -> i64 {
        ARCHIVE_OFFSET_HOURS
    }
    fn default_step_minutes() -> i64 {
        GRID_STEP_MINUTES
    }
    fn default_max_grid_steps() -> usize {
        MAX_GRID_STEPS
    }
    fn default_enabled_categories() -> BTreeSet<Category> {
        [Category::Qpe, Category::Rad].into_iter().collect()
    }

    /// Local time minus this is archive-native time. Callers rely on
    /// [`WranglerConfig::validate`] having bounded the offset.
    pub fn archive_offset(&self) -> Duration {
        Duration::hours(self.archive_offset_hours)
    }

    pub fn step(&self) -> Duration {
        Duration::minutes(self.step_minutes)
    }
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            archive_offset_hours: Self::default_archive_offset_hours(),
            step_minutes: Self::default_step_minutes(),
            max_grid_steps: Self::default_max_grid_steps(),
            enabled_categories: Self::default_enabled_categories(),
        }
    }
}

impl WranglerConfig {
    /// Conventional layout under one directory, with default grid policy.
    pub fn rooted(root: &Path) -> Self {
        Self {
            paths: PathsConfig {
                event_table: root.join("events.csv"),
                archive_root: root.join("archive"),
                staging_root: root.join("staging"),
                store_root: root.join("store"),
                report_dir: root.join("reports"),
                converter_dir: root.join("converter"),
                scratch_dir: None,
            },
            grid: GridConfig::default(),
        }
    }

    pub fn from_toml_str(text: &str) -> Result<Self, WranglerError> {
        let config: WranglerConfig = toml::from_str(text)
            .map_err(|e| WranglerError::Config(format!("invalid config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, WranglerError> {
        let text = fs::read_to_string(path).map_err(|e| WranglerError::io(path, e))?;
        Self::from_toml_str(&text)
    }

    pub fn validate(&self) -> Result<(), WranglerError> {
        if !(-MAX_ARCHIVE_OFFSET_HOURS..=MAX_ARCHIVE_OFFSET_HOURS).contains(&self.grid.archive_offset_hours) {
            return Err(WranglerError::Config(format!(
                "grid.archive_offset_hours must be within ±{}, got {}",
                MAX_ARCHIVE_OFFSET_HOURS, self.grid.archive_offset_hours
            )));
        }
        if !(1..=MAX_STEP_MINUTES).contains(&self.grid.step_minutes) {
            return Err(WranglerError::Config(format!(
                "grid.step_minutes must be between 1 and {}, got {}",
                MAX_STEP_MINUTES, self.grid.step_minutes
            )));
        }
        if self.grid.max_grid_steps == 0 {
            return Err(WranglerError::Config(
                "grid.max_grid_steps must be at least 1".to_string(),
            ));
        }
        if self.grid.enabled_categories.is_empty() {
            return Err(WranglerError::Config(
                "grid.enabled_categories must name at least one category".to_string(),
            ));
        }
        Ok(())
    }
}

/// Picks the config file: explicit flag, then `WRANGLER_CONFIG` (a `.env`
/// file is honored), then `./wrangler.toml`.
pub fn resolve_config_path(flag: Option<&Path>) -> PathBuf {
    if let Some(path) = flag {
        return path.to_path_buf();
    }
    dotenv::dotenv().ok();
    std::env::var(CONFIG_ENV_VAR)
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
