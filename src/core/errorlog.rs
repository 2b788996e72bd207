//! PL-009: Append-only error sink for failed rows.
//!
//! One file per input, next to it: `users.csv` → `users_error.csv`. Each
//! failed row is written with every field quoted, in input column order,
//! followed by the extracted error message. The file is created on the
//! first failure only.

use super::types::SourceRow;
use serde_json::Value;
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};

/// Derive the error sink path for an input file.
pub fn error_log_path(input: &Path) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "input".to_string());
    let name = match input.extension() {
        Some(ext) => format!("{}_error.{}", stem, ext.to_string_lossy()),
        None => format!("{}_error", stem),
    };
    input.with_file_name(name)
}

/// Error sink bound to one input file's header order.
#[derive(Debug)]
pub struct ErrorLog {
    path: PathBuf,
    columns: Vec<String>,
    delimiter: u8,
}

impl ErrorLog {
    pub fn new(input: &Path, columns: &[String], delimiter: u8) -> Self {
        Self {
            path: error_log_path(input),
            columns: columns.to_vec(),
            delimiter,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one failed row and its message.
    pub fn append(&self, row: &SourceRow, message: &str) -> Result<(), String> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| format!("cannot open error log {}: {}", self.path.display(), e))?;

        let mut writer = csv::WriterBuilder::new()
            .delimiter(self.delimiter)
            .quote_style(csv::QuoteStyle::Always)
            .has_headers(false)
            .from_writer(file);

        let fields = self
            .columns
            .iter()
            .map(|c| row.get(c).map(String::as_str).unwrap_or(""))
            .chain(std::iter::once(message));
        writer
            .write_record(fields)
            .map_err(|e| format!("write error: {}", e))?;
        writer.flush().map_err(|e| format!("write error: {}", e))?;
        Ok(())
    }
}

/// Best-effort human-readable message from an error response body.
///
/// Looks for `subErrors[0].message`, then `status`, then `errorMessage` or
/// `message`; otherwise returns the trimmed raw body.
pub fn extract_error_message(status: u16, body: &str) -> String {
    let trimmed = body.trim();
    if let Ok(Value::Object(obj)) = serde_json::from_str::<Value>(trimmed) {
        let sub = obj
            .get("subErrors")
            .and_then(|v| v.get(0))
            .and_then(|v| v.get("message"));
        let candidates = [
            sub,
            obj.get("status"),
            obj.get("errorMessage"),
            obj.get("message"),
        ];
        for value in candidates.into_iter().flatten() {
            match value {
                Value::String(s) if !s.trim().is_empty() => return s.trim().to_string(),
                Value::Number(n) => return n.to_string(),
                _ => {}
            }
        }
    }
    if trimmed.is_empty() {
        format!("HTTP {}", status)
    } else {
        trimmed.to_string()
    }
}
