/// Grid organization and repair for the wrangled store.
///
/// Decoding and conversion happen in `ingest`; everything here works on
/// keyed artifacts.
///
/// Submodules:
/// - `normalize` — maps a decoded entry onto its local-time grid key.
/// - `gaps` — expected grid, missing-slot detection and interpolation.
/// - `summary` — per-category statistics over the finished store.

pub mod gaps;
pub mod normalize;
pub mod summary;
