//! Radar archive wrangler.
//!
//! Pulls per-event radar products (QPE, QPF, RAD) out of a dated archive,
//! converts them to numeric rasters on a fixed 10-minute local-time grid,
//! repairs single-step gaps by neighbor averaging and summarizes the result.
//!
//! Modules, leaves first:
//! - `model` — shared types and the crate error.
//! - `config` — the immutable run configuration.
//! - `logging` — stage-tagged structured logging.
//! - `events` — event table loading and window resolution.
//! - `ingest` — archive selection, staging and decoding.
//! - `store` — the on-disk artifact store.
//! - `analysis` — grid normalization, gap repair and statistics.
//! - `report` — audit tables and the run report.
//! - `pipeline` — stage orchestration.

pub mod analysis;
pub mod config;
pub mod events;
pub mod ingest;
pub mod logging;
pub mod model;
pub mod pipeline;
pub mod report;
pub mod store;
