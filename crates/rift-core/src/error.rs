//! Error taxonomy shared by every rift crate.
//!
//! Ordinary merge conflicts are not errors; they travel as data in a
//! [`ConflictReport`](crate::conflict::ConflictReport). Only structural
//! failures end up here.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// A file is missing, unreadable or unwritable.
    #[error("IO error: {0}")]
    Io(String),

    /// Two snapshots disagree on the definition of a shared table.
    #[error("Schema mismatch: {0}")]
    SchemaMismatch(String),

    /// Malformed binary changeset.
    #[error("Corrupt changeset at byte {offset}: {reason}")]
    CorruptChangeset { offset: usize, reason: String },

    /// Unrecoverable failure while replaying a changeset; the transaction
    /// was rolled back.
    #[error("Apply error: {0}")]
    Apply(String),

    /// Invalid argument combination.
    #[error("Usage error: {0}")]
    Usage(String),

    /// Invalid configuration file or environment setting.
    #[error("Config error: {0}")]
    Config(String),
}

/// Flat discriminant of [`Error`], convenient for exit codes and bindings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Io,
    SchemaMismatch,
    CorruptChangeset,
    Apply,
    Usage,
    Config,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Io(_) => ErrorKind::Io,
            Error::SchemaMismatch(_) => ErrorKind::SchemaMismatch,
            Error::CorruptChangeset { .. } => ErrorKind::CorruptChangeset,
            Error::Apply(_) => ErrorKind::Apply,
            Error::Usage(_) => ErrorKind::Usage,
            Error::Config(_) => ErrorKind::Config,
        }
    }

    pub fn corrupt(offset: usize, reason: impl Into<String>) -> Self {
        Error::CorruptChangeset {
            offset,
            reason: reason.into(),
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Io(format!("JSON output failed: {}", err))
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_and_message() {
        let err = Error::corrupt(12, "unknown operation tag 9");
        assert_eq!(err.kind(), ErrorKind::CorruptChangeset);
        assert_eq!(
            err.to_string(),
            "Corrupt changeset at byte 12: unknown operation tag 9"
        );
    }

    #[test]
    fn test_io_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: Error = io.into();
        assert_eq!(err.kind(), ErrorKind::Io);
    }
}
