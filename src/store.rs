/// Filesystem artifact store.
///
/// Layout: `<root>/<CATEGORY>/<event>.<YYYYMMDDHHMM>.grid.gz`, one blob per
/// [`GridKey`]. A blob is gzip over `rows: u32 LE`, `cols: u32 LE` and then
/// `rows * cols` little-endian `f64` values in row-major order. The gzip
/// header carries no timestamp, so writing the same artifact twice yields
/// byte-identical files.
///
/// Writes go to a sibling temp file and are renamed into place, so a key is
/// either absent or holds a complete blob.

use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use std::fs::{self, File};
use std::io::{BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use crate::model::{Category, GridKey, NormalizedArtifact, Raster, WranglerError};

#[derive(Debug, Clone)]
pub struct ArtifactStore {
    root: PathBuf,
}

impl ArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn exists(&self) -> bool {
        self.root.is_dir()
    }

    pub fn category_dir(&self, category: Category) -> PathBuf {
        self.root.join(category.as_str())
    }

    pub fn path_for(&self, key: &GridKey) -> PathBuf {
        self.category_dir(key.category).join(key.file_name())
    }

    pub fn contains(&self, key: &GridKey) -> bool {
        self.path_for(key).is_file()
    }

    /// Writes (or overwrites) the artifact at its key.
    pub fn write(&self, artifact: &NormalizedArtifact) -> Result<PathBuf, WranglerError> {
        let dir = self.category_dir(artifact.key.category);
        fs::create_dir_all(&dir).map_err(|e| WranglerError::io(&dir, e))?;

        let path = self.path_for(&artifact.key);
        let tmp = path.with_extension("gz.partial");
        write_blob(&tmp, &artifact.data).map_err(|e| WranglerError::io(&tmp, e))?;
        fs::rename(&tmp, &path).map_err(|e| WranglerError::io(&path, e))?;
        Ok(path)
    }

    /// Returns `Ok(None)` when no artifact exists at `key`.
    pub fn read(&self, key: &GridKey) -> Result<Option<NormalizedArtifact>, WranglerError> {
        let path = self.path_for(key);
        if !path.is_file() {
            return Ok(None);
        }
        let data = read_blob(&path)?;
        Ok(Some(NormalizedArtifact {
            key: key.clone(),
            data,
        }))
    }

    /// Every key stored under `category`, sorted by event then timestamp.
    pub fn keys(&self, category: Category) -> Result<Vec<GridKey>, WranglerError> {
        let dir = self.category_dir(category);
        if !dir.is_dir() {
            return Ok(Vec::new());
        }
        let mut keys = Vec::new();
        for entry in fs::read_dir(&dir).map_err(|e| WranglerError::io(&dir, e))? {
            let entry = entry.map_err(|e| WranglerError::io(&dir, e))?;
            let name = entry.file_name();
            if let Some(key) = name
                .to_str()
                .and_then(|n| GridKey::from_file_name(category, n))
            {
                keys.push(key);
            }
        }
        keys.sort();
        Ok(keys)
    }

    /// Categories that have a directory in the store, in category order.
    pub fn categories(&self) -> Vec<Category> {
        Category::ALL
            .into_iter()
            .filter(|c| self.category_dir(*c).is_dir())
            .collect()
    }

    pub fn count(&self, category: Category, event_name: &str) -> Result<usize, WranglerError> {
        Ok(self
            .keys(category)?
            .iter()
            .filter(|k| k.event_name == event_name)
            .count())
    }
}

// ---------------------------------------------------------------------------
// Blob encoding
// ---------------------------------------------------------------------------

fn write_blob(path: &Path, raster: &Raster) -> std::io::Result<()> {
    let rows = u32::try_from(raster.rows)
        .map_err(|_| std::io::Error::new(std::io::ErrorKind::InvalidInput, "too many rows"))?;
    let cols = u32::try_from(raster.cols)
        .map_err(|_| std::io::Error::new(std::io::ErrorKind::InvalidInput, "too many columns"))?;

    let file = BufWriter::new(File::create(path)?);
    let mut encoder = GzEncoder::new(file, Compression::default());
    encoder.write_all(&rows.to_le_bytes())?;
    encoder.write_all(&cols.to_le_bytes())?;
    for value in &raster.data {
        encoder.write_all(&value.to_le_bytes())?;
    }
    encoder.finish()?.flush()
}

fn read_blob(path: &Path) -> Result<Raster, WranglerError> {
    let corrupt = |message: String| WranglerError::Store {
        path: path.to_path_buf(),
        message,
    };

    let file = File::open(path).map_err(|e| WranglerError::io(path, e))?;
    let mut bytes = Vec::new();
    GzDecoder::new(file)
        .read_to_end(&mut bytes)
        .map_err(|e| corrupt(format!("gzip: {}", e)))?;

    if bytes.len() < 8 {
        return Err(corrupt("truncated header".to_string()));
    }
    let (header, body) = bytes.split_at(8);
    let rows = u32::from_le_bytes([header[0], header[1], header[2], header[3]]) as usize;
    let cols = u32::from_le_bytes([header[4], header[5], header[6], header[7]]) as usize;
    if body.len() % 8 != 0 {
        return Err(corrupt(format!("body length {} is not a multiple of 8", body.len())));
    }

    let data: Vec<f64> = body
        .chunks_exact(8)
        .map(|c| f64::from_le_bytes([c[0], c[1], c[2], c[3], c[4], c[5], c[6], c[7]]))
        .collect();
    let len = data.len();
    Raster::new(rows, cols, data)
        .ok_or_else(|| corrupt(format!("{}x{} header but {} values", rows, cols, len)))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use tempfile::TempDir;

    fn key(event: &str, category: Category, h: u32, mi: u32) -> GridKey {
        let ts = NaiveDate::from_ymd_opt(2015, 8, 7)
            .unwrap()
            .and_hms_opt(h, mi, 0)
            .unwrap();
        GridKey::new(event, category, ts)
    }

    fn artifact(key: GridKey, data: Vec<f64>) -> NormalizedArtifact {
        let cols = data.len();
        NormalizedArtifact {
            key,
            data: Raster::new(1, cols, data).unwrap(),
        }
    }

    #[test]
    fn test_written_artifact_reads_back_identically() {
        let tmp = TempDir::new().unwrap();
        let store = ArtifactStore::new(tmp.path());
        let a = NormalizedArtifact {
            key: key("2015.SOUDELOR", Category::Qpe, 12, 0),
            data: Raster::new(2, 2, vec![0.0, -1.25, 3.5, f64::MAX]).unwrap(),
        };
        let path = store.write(&a).unwrap();
        assert!(path.ends_with("QPE/2015.SOUDELOR.201508071200.grid.gz"));
        assert_eq!(store.read(&a.key).unwrap(), Some(a));
    }

    #[test]
    fn test_read_of_absent_key_is_none() {
        let tmp = TempDir::new().unwrap();
        let store = ArtifactStore::new(tmp.path());
        assert!(store.read(&key("2015.SOUDELOR", Category::Rad, 12, 0)).unwrap().is_none());
    }

    #[test]
    fn test_rewriting_a_key_is_byte_identical() {
        let tmp = TempDir::new().unwrap();
        let store = ArtifactStore::new(tmp.path());
        let a = artifact(key("2015.SOUDELOR", Category::Rad, 12, 10), vec![1.0, 2.0]);
        let path = store.write(&a).unwrap();
        let first = fs::read(&path).unwrap();
        store.write(&a).unwrap();
        assert_eq!(fs::read(&path).unwrap(), first);
        assert_eq!(store.keys(Category::Rad).unwrap().len(), 1);
    }

    #[test]
    fn test_keys_are_sorted_and_scoped_by_category() {
        let tmp = TempDir::new().unwrap();
        let store = ArtifactStore::new(tmp.path());
        store.write(&artifact(key("2015.SOUDELOR", Category::Qpe, 12, 20), vec![1.0])).unwrap();
        store.write(&artifact(key("2015.SOUDELOR", Category::Qpe, 12, 0), vec![1.0])).unwrap();
        store.write(&artifact(key("2016.MEGI", Category::Qpe, 0, 0), vec![1.0])).unwrap();
        store.write(&artifact(key("2015.SOUDELOR", Category::Rad, 12, 0), vec![1.0])).unwrap();

        let keys = store.keys(Category::Qpe).unwrap();
        assert_eq!(keys.len(), 3);
        assert!(keys.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(store.count(Category::Qpe, "2015.SOUDELOR").unwrap(), 2);
        assert_eq!(store.categories(), vec![Category::Qpe, Category::Rad]);
    }

    #[test]
    fn test_corrupt_blob_is_store_error() {
        let tmp = TempDir::new().unwrap();
        let store = ArtifactStore::new(tmp.path());
        let k = key("2015.SOUDELOR", Category::Qpe, 12, 0);
        fs::create_dir_all(store.category_dir(Category::Qpe)).unwrap();
        fs::write(store.path_for(&k), b"garbage").unwrap();
        assert!(matches!(store.read(&k), Err(WranglerError::Store { .. })));
    }

    #[test]
    fn test_partial_files_are_not_listed_as_keys() {
        let tmp = TempDir::new().unwrap();
        let store = ArtifactStore::new(tmp.path());
        let k = key("2015.SOUDELOR", Category::Qpe, 12, 0);
        fs::create_dir_all(store.category_dir(Category::Qpe)).unwrap();
        fs::write(store.path_for(&k).with_extension("gz.partial"), b"half").unwrap();
        assert!(store.keys(Category::Qpe).unwrap().is_empty());
        assert!(!store.contains(&k));
    }
}
