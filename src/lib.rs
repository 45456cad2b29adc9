//! # revisr
//!
//! Table-granular database versioning on top of git.
//!
//! Each tracked table is dumped to `revisr-backups/revisr_<table>.sql` and the
//! dumps are committed. Any earlier commit can be restored: revisr first
//! commits a safety backup of the current state, checks the historical dumps
//! out of git and loads them back, and hands back a reference that undoes the
//! restore.
//!
//! ```text
//!            RevertOrchestrator
//!           /        |         \
//!   BackupEngine  ImportEngine  VersionControl (git)
//!           \        |
//!          TableAction::{Backup, Import}
//!           /                  \
//!   DatabaseDriver        SnapshotStore
//!   (mysql/postgres/sqlite)  (revisr-backups/)
//! ```
//!
//! Collaborators are passed in by reference; settings are loaded once into a
//! [`RevisrConfig`] and handed to every operation.
//!
//! ```rust,ignore
//! use revisr::{GitAdapter, RevertOrchestrator, RevisrConfig, SnapshotStore};
//! use revisr::drivers::selector::select_driver_for_target;
//!
//! let git = GitAdapter::new("/srv/site");
//! let db = select_driver_for_target("mysql://wp@localhost/wordpress", None)?;
//! let store = SnapshotStore::new(git.work_tree());
//! let config = RevisrConfig::load(&git)?;
//!
//! let outcome = RevertOrchestrator::new(&git, db.as_ref(), &store).restore("HEAD~2", &config);
//! ```

pub mod action;
pub mod backup;
pub mod config;
pub mod drivers;
pub mod error;
pub mod import;
pub mod revert;
pub mod storage;
pub mod tracker;
pub mod utils;
pub mod vcs;

#[cfg(test)]
mod testing;

pub use action::TableAction;
pub use backup::{BackupEngine, BackupReport, BackupRequest};
pub use config::{RevisrConfig, Substitution, TrackingConfig, TrackingMode};
pub use drivers::{DatabaseDriver, TableInfo};
pub use error::{Result, RevisrError, TableFailure};
pub use import::{ImportEngine, ImportReport};
pub use revert::{RestoreOutcome, RevertOrchestrator, UndoReference};
pub use storage::{SnapshotStatus, SnapshotStore};
pub use tracker::{TableStatus, TableTracker};
pub use vcs::{Commit, CommitId, GitAdapter, VersionControl};
