//! Error types for revisr operations.

use serde::Serialize;
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, RevisrError>;

/// A single table that failed during a multi-table step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableFailure {
    pub table: String,
    pub reason: String,
}

impl TableFailure {
    pub fn new(table: impl Into<String>, reason: impl ToString) -> Self {
        Self {
            table: table.into(),
            reason: reason.to_string(),
        }
    }
}

impl fmt::Display for TableFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.table, self.reason)
    }
}

fn join_failures(failed: &[TableFailure]) -> String {
    failed
        .iter()
        .map(|f| f.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

#[derive(Debug, Error)]
pub enum RevisrError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The external tool could not be started at all.
    #[error("failed to run `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// The external tool ran and exited unsuccessfully.
    #[error("`{program}` failed ({status}): {stderr}")]
    Command {
        program: String,
        status: String,
        stderr: String,
    },

    #[error("version control error: {0}")]
    Vcs(String),

    #[error("database error: {0}")]
    Database(String),

    #[error("unsupported database target '{0}'")]
    UnsupportedDatabase(String),

    #[error("invalid database target '{target}': {reason}")]
    InvalidTarget { target: String, reason: String },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("snapshot for table '{table}' is not usable: {reason}")]
    Integrity { table: String, reason: String },

    #[error("backup failed for {} table(s): {}", failed.len(), join_failures(failed))]
    DumpFailed { failed: Vec<TableFailure> },

    #[error("import failed for {} table(s): {}", failed.len(), join_failures(failed))]
    ImportFailed { failed: Vec<TableFailure> },

    #[error(
        "another revisr operation is in progress (lock held at {0:?}); \
         if none is running, delete that file and retry"
    )]
    Locked(PathBuf),
}

impl RevisrError {
    /// Per-table failures carried by this error, if any.
    pub fn table_failures(&self) -> &[TableFailure] {
        match self {
            RevisrError::DumpFailed { failed } | RevisrError::ImportFailed { failed } => failed,
            _ => &[],
        }
    }
}
