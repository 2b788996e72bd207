//! PL-008: Delimited input reader.
//!
//! Columns are addressed by header name. The file is opened once per pass
//! (pre-flight, then load) so rows are streamed rather than held in memory.

use super::error::LoadError;
use super::types::SourceRow;
use std::fs::File;
use std::path::{Path, PathBuf};

const BOM: char = '\u{feff}';

/// A header-first delimited file.
#[derive(Debug, Clone)]
pub struct InputTable {
    path: PathBuf,
    delimiter: u8,
    headers: Vec<String>,
}

impl InputTable {
    /// Open `path` and read its header row.
    pub fn open(path: &Path, delimiter: u8) -> Result<Self, LoadError> {
        let mut reader = reader(path, delimiter)?;
        let headers: Vec<String> = reader
            .headers()?
            .iter()
            .enumerate()
            .map(|(i, h)| {
                if i == 0 {
                    h.trim_start_matches(BOM).to_string()
                } else {
                    h.to_string()
                }
            })
            .collect();

        if headers.iter().all(|h| h.trim().is_empty()) {
            return Err(LoadError::Input(format!(
                "{} has no header row",
                path.display()
            )));
        }

        Ok(Self {
            path: path.to_path_buf(),
            delimiter,
            headers,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn delimiter(&self) -> u8 {
        self.delimiter
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    /// Stream the data rows from the top of the file.
    pub fn rows(&self) -> Result<impl Iterator<Item = Result<SourceRow, LoadError>>, LoadError> {
        let reader = reader(&self.path, self.delimiter)?;
        let headers = self.headers.clone();
        Ok(reader.into_records().map(move |record| {
            let record = record?;
            Ok(headers
                .iter()
                .cloned()
                .zip(record.iter().map(str::to_string))
                .collect())
        }))
    }
}

fn reader(path: &Path, delimiter: u8) -> Result<csv::Reader<File>, LoadError> {
    let file = File::open(path)
        .map_err(|e| LoadError::Input(format!("cannot open {}: {}", path.display(), e)))?;
    Ok(csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(true)
        .flexible(false)
        .from_reader(file))
}

/// Parse a one-character delimiter argument (`\t` and `tab` name a tab).
pub fn parse_delimiter(s: &str) -> Result<u8, String> {
    match s {
        "\\t" | "tab" => Ok(b'\t'),
        _ if s.len() == 1 && s.is_ascii() => Ok(s.as_bytes()[0]),
        _ => Err(format!("delimiter must be a single ASCII character, got '{}'", s)),
    }
}
