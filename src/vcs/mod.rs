//! Version-control seam.
//!
//! The core only ever appends history through this trait: it stages snapshot
//! files, commits them, and checks historical snapshot files back out into the
//! working tree. It also uses the backend's configuration store to persist
//! the tracking settings outside the database.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use std::path::Path;

use crate::error::Result;

pub mod git;

pub use git::GitAdapter;

/// Full identifier of a commit as reported by the backend.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct CommitId(String);

impl CommitId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Abbreviated form for display.
    pub fn short(&self) -> &str {
        &self.0[..7.min(self.0.len())]
    }
}

impl fmt::Display for CommitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Commit metadata consumed by callers for display.
#[derive(Debug, Clone, Serialize)]
pub struct Commit {
    pub hash: CommitId,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    pub branch: Option<String>,
    pub files: Vec<String>,
}

pub trait VersionControl: Send + Sync {
    fn name(&self) -> &'static str;

    /// Stage a single file.
    fn add_file(&self, path: &Path) -> Result<()>;

    /// Whether anything is staged for the next commit.
    fn has_staged_changes(&self) -> Result<bool>;

    /// Commit the staged changes and return the new commit's id.
    fn commit(&self, message: &str) -> Result<CommitId>;

    fn current_commit_id(&self) -> Result<CommitId>;

    /// Resolve a user-supplied revision (hash, abbreviation, ref) to a commit.
    fn resolve(&self, rev: &str) -> Result<CommitId>;

    /// Restore one file's content as of `commit` into the working tree,
    /// leaving the commit graph untouched.
    fn checkout_path_at_commit(&self, commit: &CommitId, path: &Path) -> Result<()>;

    fn get_config(&self, section: &str, key: &str) -> Result<Option<String>>;

    fn get_config_all(&self, section: &str, key: &str) -> Result<Vec<String>>;

    fn set_config(&self, section: &str, key: &str, value: &str) -> Result<()>;

    /// Replace every value of a multi-valued key.
    fn set_config_all(&self, section: &str, key: &str, values: &[String]) -> Result<()>;

    fn read_commit(&self, commit: &CommitId) -> Result<Commit>;

    /// Most recent commits touching `path`, newest first.
    fn history(&self, path: &Path, limit: usize) -> Result<Vec<Commit>>;
}
