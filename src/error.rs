//! Error types for the sync ledger

use thiserror::Error;

/// Result type alias for ledger operations
pub type Result<T> = std::result::Result<T, LedgerError>;

/// Main error type for the sync ledger
///
/// `Unavailable` is kept apart from `Database` so that callers can tell
/// "the row is not there" (`Ok(None)`) from "the store could not be reached"
/// and retry later instead of treating the record as missing.
#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Invalid data: {0}")]
    InvalidData(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl LedgerError {
    /// True when the store could not be opened at all
    pub fn is_unavailable(&self) -> bool {
        matches!(self, LedgerError::Unavailable(_))
    }

    /// Check if error is retryable
    pub fn is_retryable(&self) -> bool {
        match self {
            LedgerError::Unavailable(_) | LedgerError::Io(_) => true,
            LedgerError::Database(rusqlite::Error::SqliteFailure(err, _)) => matches!(
                err.code,
                rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked
            ),
            _ => false,
        }
    }
}
