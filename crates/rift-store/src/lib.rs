//! SQLite access for the changeset engine: schema discovery, keyed row
//! reads and writes, and whole-file copies.

pub mod db;
pub mod sql;

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database file not found: {}", .0.display())]
    NotFound(PathBuf),
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Reading and opening failures surface as I/O errors.
impl From<StoreError> for rift_core::Error {
    fn from(e: StoreError) -> Self {
        rift_core::Error::Io(e.to_string())
    }
}

impl StoreError {
    /// Failure while replaying changes inside a transaction.
    pub fn into_apply(self) -> rift_core::Error {
        rift_core::Error::Apply(self.to_string())
    }
}
