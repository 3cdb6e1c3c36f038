/// Getting raw products out of the archive and into numeric form.
///
/// Submodules:
/// - `select` — lazy, window-bounded walk of the dated archive tree.
/// - `stage` — per-event copies of the selected files.
/// - `decode` — gunzip plus the external converter boundary.

pub mod decode;
pub mod select;
pub mod stage;
