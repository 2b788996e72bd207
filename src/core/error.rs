//! PL-002: Error taxonomy for a load run.
//!
//! Fatal errors abort the run and surface from `main` as exit status 1.
//! Per-field coercion failures and per-row transport failures are not
//! errors here: the mapper omits the field, the executor records the row.

use crate::transport::TransportError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LoadError {
    /// Malformed or incomplete configuration, detected before any row is read.
    #[error("configuration error: {0}")]
    Config(String),

    /// Mapping/header/type mismatch found by the strict pre-flight pass.
    #[error("validation error: {0}")]
    Validation(String),

    /// The platform rejected the API key.
    #[error("authentication failed: {0}")]
    Authentication(String),

    /// The schema metadata could not be retrieved or parsed.
    #[error("schema fetch failed: {0}")]
    SchemaFetch(String),

    /// A mapped record lacks its key field: the mapping itself is broken.
    #[error("row {row}: {message}")]
    RowFatal { row: usize, message: String },

    /// The input file could not be read or is not well-formed.
    #[error("input error: {0}")]
    Input(String),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl From<csv::Error> for LoadError {
    fn from(e: csv::Error) -> Self {
        Self::Input(e.to_string())
    }
}
