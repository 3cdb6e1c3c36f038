/// Decompression and numeric conversion of staged entries.
///
/// Staged entries are gzip blobs holding a legacy binary product. The blob is
/// decompressed here, handed to a [`Converter`] which yields
/// whitespace-delimited text, and the text is parsed into a [`Raster`].
///
/// Every failure on this path is a `Decode` error for the one entry; the
/// pipeline logs it and moves on.

use flate2::read::MultiGzDecoder;
use std::fs::{self, File};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

use crate::model::{ArchiveEntry, Category, Raster, WranglerError};

// ---------------------------------------------------------------------------
// Converter boundary
// ---------------------------------------------------------------------------

/// Turns one decompressed product into tabular text.
pub trait Converter {
    fn convert(&self, category: Category, raw: &[u8]) -> Result<String, String>;
}

impl<F> Converter for F
where
    F: Fn(Category, &[u8]) -> Result<String, String>,
{
    fn convert(&self, category: Category, raw: &[u8]) -> Result<String, String> {
        self(category, raw)
    }
}

/// Runs the per-category converter program `<dir>/<CAT>.out <input> <output>`.
///
/// The raw bytes and the converter's output live in a private scratch
/// directory that is removed when the converter is dropped.
pub struct ExternalConverter {
    program_dir: PathBuf,
    scratch: TempDir,
}

impl ExternalConverter {
    pub fn new(program_dir: &Path, scratch_parent: Option<&Path>) -> Result<Self, WranglerError> {
        let scratch = match scratch_parent {
            Some(parent) => {
                fs::create_dir_all(parent).map_err(|e| WranglerError::io(parent, e))?;
                TempDir::new_in(parent).map_err(|e| WranglerError::io(parent, e))?
            }
            None => TempDir::new().map_err(|e| WranglerError::io(std::env::temp_dir(), e))?,
        };
        Ok(Self {
            program_dir: program_dir.to_path_buf(),
            scratch,
        })
    }

    pub fn program_for(&self, category: Category) -> PathBuf {
        self.program_dir.join(format!("{}.out", category))
    }
}

impl Converter for ExternalConverter {
    fn convert(&self, category: Category, raw: &[u8]) -> Result<String, String> {
        let input = self.scratch.path().join(category.as_str());
        let output = self.scratch.path().join(format!("{}.txt", category));
        fs::write(&input, raw).map_err(|e| format!("cannot write scratch input: {}", e))?;
        // A stale output from the previous entry must not be mistaken for this one
        let _ = fs::remove_file(&output);

        let program = self.program_for(category);
        let result = Command::new(&program)
            .arg(&input)
            .arg(&output)
            .output()
            .map_err(|e| format!("failed to spawn {}: {}", program.display(), e))?;

        if !result.status.success() {
            let stderr = String::from_utf8_lossy(&result.stderr);
            return Err(format!(
                "converter {} exited with {}: {}",
                program.display(),
                result.status,
                stderr.trim()
            ));
        }

        let text = fs::read_to_string(&output)
            .map_err(|e| format!("converter produced no output at {}: {}", output.display(), e))?;
        let _ = fs::remove_file(&input);
        let _ = fs::remove_file(&output);
        Ok(text)
    }
}

// ---------------------------------------------------------------------------
// Decoding
// ---------------------------------------------------------------------------

/// Reads and decompresses a gzip file.
pub fn gunzip(path: &Path) -> std::io::Result<Vec<u8>> {
    let file = File::open(path)?;
    let mut decoder = MultiGzDecoder::new(file);
    let mut buf = Vec::new();
    decoder.read_to_end(&mut buf)?;
    Ok(buf)
}

/// Parses whitespace-delimited numeric rows into a rectangular raster.
///
/// Blank lines are ignored. Every row must have the same number of columns.
pub fn parse_table(text: &str) -> Result<Raster, String> {
    let mut cols = None;
    let mut rows = 0usize;
    let mut data = Vec::new();

    for (line_no, line) in text.lines().enumerate() {
        let start = data.len();
        for token in line.split_whitespace() {
            let value: f64 = token
                .parse()
                .map_err(|_| format!("line {}: non-numeric token '{}'", line_no + 1, token))?;
            data.push(value);
        }
        let width = data.len() - start;
        if width == 0 {
            continue;
        }
        match cols {
            None => cols = Some(width),
            Some(expected) if expected != width => {
                return Err(format!(
                    "line {} has {} columns, expected {}",
                    line_no + 1,
                    width,
                    expected
                ));
            }
            Some(_) => {}
        }
        rows += 1;
    }

    let cols = cols.ok_or_else(|| "empty table".to_string())?;
    Raster::new(rows, cols, data).ok_or_else(|| "table shape mismatch".to_string())
}

/// Decompresses one staged entry, converts it and parses the result.
pub fn decode_entry(entry: &ArchiveEntry, converter: &dyn Converter) -> Result<Raster, WranglerError> {
    let fail = |message: String| WranglerError::Decode {
        category: entry.category,
        file: entry.file_name(),
        message,
    };

    let raw = gunzip(&entry.raw_path).map_err(|e| fail(format!("gunzip failed: {}", e)))?;
    if raw.is_empty() {
        return Err(fail("empty payload".to_string()));
    }
    let text = converter.convert(entry.category, &raw).map_err(&fail)?;
    parse_table(&text).map_err(fail)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
