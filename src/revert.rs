//! Restoring the database to the state recorded in an earlier commit.
//!
//! A restore runs strictly in order:
//!
//! 1. take a safety backup of every table about to be replaced and commit it,
//!    so the restore can be undone;
//! 2. check out each table's snapshot file as of the target commit;
//! 3. if any checkout failed, stop before touching the database;
//! 4. import the checked-out snapshots;
//! 5. hand back an [`UndoReference`] pointing at the safety backup.
//!
//! Every call starts over from step 1.

use serde::Serialize;
use std::fmt;
use tracing::{error, info, warn};

use crate::backup::{BackupEngine, BackupRequest};
use crate::config::RevisrConfig;
use crate::drivers::DatabaseDriver;
use crate::error::TableFailure;
use crate::import::ImportEngine;
use crate::storage::{SnapshotStore, StoreLock};
use crate::tracker::TableTracker;
use crate::vcs::{CommitId, VersionControl};

/// Points at the safety backup taken before a restore; restoring it undoes
/// the restore.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UndoReference {
    pub commit: CommitId,
}

impl UndoReference {
    /// The command that performs the undo.
    pub fn command(&self) -> String {
        format!("revisr restore {}", self.commit)
    }
}

impl fmt::Display for UndoReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.command())
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RestoreOutcome {
    Success {
        target: CommitId,
        tables: Vec<String>,
        undo: UndoReference,
    },
    /// The restore stopped. `undo` is set once the database may already
    /// have been modified.
    Aborted {
        reason: String,
        failed_tables: Vec<TableFailure>,
        undo: Option<UndoReference>,
    },
    /// No safety backup could be made, so nothing was attempted.
    Fatal { reason: String },
}

impl RestoreOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, RestoreOutcome::Success { .. })
    }

    fn aborted(reason: impl Into<String>) -> Self {
        RestoreOutcome::Aborted {
            reason: reason.into(),
            failed_tables: Vec::new(),
            undo: None,
        }
    }
}

pub struct RevertOrchestrator<'a> {
    vcs: &'a dyn VersionControl,
    store: &'a SnapshotStore,
    tracker: TableTracker<'a>,
    backup: BackupEngine<'a>,
    import: ImportEngine<'a>,
}

impl<'a> RevertOrchestrator<'a> {
    pub fn new(
        vcs: &'a dyn VersionControl,
        db: &'a dyn DatabaseDriver,
        store: &'a SnapshotStore,
    ) -> Self {
        Self {
            vcs,
            store,
            tracker: TableTracker::new(db),
            backup: BackupEngine::new(vcs, db, store),
            import: ImportEngine::new(db, store),
        }
    }

    pub fn restore(&self, target: &str, config: &RevisrConfig) -> RestoreOutcome {
        let lock = match self.store.lock() {
            Ok(lock) => lock,
            Err(e) => return RestoreOutcome::aborted(e.to_string()),
        };
        let outcome = self.restore_locked(&lock, target, config);
        match &outcome {
            RestoreOutcome::Success { target, undo, .. } => {
                info!(target = %target.short(), undo = %undo.commit.short(), "restore complete")
            }
            RestoreOutcome::Aborted { reason, .. } => warn!(%reason, "restore aborted"),
            RestoreOutcome::Fatal { reason } => error!(%reason, "restore failed"),
        }
        outcome
    }

    fn restore_locked(
        &self,
        lock: &StoreLock,
        target: &str,
        config: &RevisrConfig,
    ) -> RestoreOutcome {
        let target = match self.vcs.resolve(target) {
            Ok(id) => id,
            Err(e) => return RestoreOutcome::aborted(format!("cannot restore '{}': {}", target, e)),
        };
        let tables: Vec<String> = match self.tracker.effective_tables(&config.tracking) {
            Ok(t) => t.into_iter().collect(),
            Err(e) => return RestoreOutcome::aborted(format!("cannot list tables: {}", e)),
        };
        // The import below must only ever see files checked out from the
        // target; with no tables there is nothing it could restore.
        if tables.is_empty() {
            return RestoreOutcome::aborted(
                "no live tables to restore; recreate them with `revisr import -t <table>` first",
            );
        }
        info!(target = %target.short(), tables = tables.len(), "restoring database");

        // 1. safety backup
        let request = BackupRequest {
            tables: Some(tables.clone()),
            message: Some(format!(
                "Backed up the database before restoring commit {}.",
                target.short()
            )),
            commit: true,
        };
        let safety = match self.backup.backup_locked(lock, &request, config) {
            Ok(report) => match report.commit {
                Some(commit) => commit,
                None => {
                    return RestoreOutcome::Fatal {
                        reason: "safety backup produced no commit".to_string(),
                    };
                }
            },
            Err(e) => {
                return RestoreOutcome::Fatal {
                    reason: format!("safety backup failed: {}", e),
                };
            }
        };
        let undo = UndoReference { commit: safety.clone() };

        // 2. checkout
        let mut checked_out = Vec::new();
        let mut failed = Vec::new();
        for table in &tables {
            let path = self.store.snapshot_path(table);
            match self.vcs.checkout_path_at_commit(&target, &path) {
                Ok(()) => checked_out.push(table.clone()),
                Err(e) => failed.push(TableFailure::new(table.clone(), e)),
            }
        }

        // 3. all-or-nothing gate
        if !failed.is_empty() {
            self.return_to_safety(&safety, &checked_out);
            return RestoreOutcome::Aborted {
                reason: format!(
                    "could not check out {} table(s) at {}; the database was not changed",
                    failed.len(),
                    target.short()
                ),
                failed_tables: failed,
                undo: None,
            };
        }

        // 4. import
        match self.import.import_locked(lock, Some(tables), config) {
            // 5. completion
            Ok(report) => RestoreOutcome::Success {
                target,
                tables: report.tables,
                undo,
            },
            Err(e) => RestoreOutcome::Aborted {
                reason: format!("import failed after checkout of {}: {}", target.short(), e),
                failed_tables: e.table_failures().to_vec(),
                undo: Some(undo),
            },
        }
    }

    /// Put snapshot files that were already checked out back to their
    /// safety-backup content so an aborted restore leaves the working tree
    /// as it found it.
    fn return_to_safety(&self, safety: &CommitId, tables: &[String]) {
        for table in tables {
            let path = self.store.snapshot_path(table);
            if let Err(e) = self.vcs.checkout_path_at_commit(safety, &path) {
                warn!(
                    table = %table,
                    error = %e,
                    "could not reset snapshot file after aborted restore"
                );
            }
        }
    }
}
