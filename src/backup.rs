//! Dumps tables into the snapshot store and records them as a commit.

use serde::Serialize;
use tracing::{debug, info};

use crate::action::{ActionContext, TableAction};
use crate::config::RevisrConfig;
use crate::drivers::DatabaseDriver;
use crate::error::Result;
use crate::storage::{SnapshotStore, StoreLock};
use crate::tracker::TableTracker;
use crate::vcs::{CommitId, VersionControl};

#[derive(Debug, Clone)]
pub struct BackupRequest {
    /// Explicit tables, taken as given even when empty; `None` means the
    /// tracked tables.
    pub tables: Option<Vec<String>>,
    pub message: Option<String>,
    pub commit: bool,
}

impl Default for BackupRequest {
    fn default() -> Self {
        Self {
            tables: None,
            message: None,
            commit: true,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct BackupReport {
    pub tables: Vec<String>,
    /// The commit holding the snapshots, when a commit was requested.
    pub commit: Option<CommitId>,
}

pub fn default_message() -> String {
    format!(
        "Backed up the database with Revisr ({}).",
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S")
    )
}

pub struct BackupEngine<'a> {
    vcs: &'a dyn VersionControl,
    db: &'a dyn DatabaseDriver,
    store: &'a SnapshotStore,
}

impl<'a> BackupEngine<'a> {
    pub fn new(
        vcs: &'a dyn VersionControl,
        db: &'a dyn DatabaseDriver,
        store: &'a SnapshotStore,
    ) -> Self {
        Self { vcs, db, store }
    }

    pub fn backup(&self, request: &BackupRequest, config: &RevisrConfig) -> Result<BackupReport> {
        let lock = self.store.lock()?;
        self.backup_locked(&lock, request, config)
    }

    /// Backup for callers that already hold the store lock.
    pub(crate) fn backup_locked(
        &self,
        _lock: &StoreLock,
        request: &BackupRequest,
        config: &RevisrConfig,
    ) -> Result<BackupReport> {
        self.store.ensure_directory()?;

        let tables: Vec<String> = match &request.tables {
            Some(explicit) => explicit.clone(),
            None => TableTracker::new(self.db)
                .effective_tables(&config.tracking)?
                .into_iter()
                .collect(),
        };
        info!(tables = tables.len(), commit = request.commit, "backing up database");

        let ctx = ActionContext {
            db: self.db,
            store: self.store,
            substitution: None,
        };
        let tables = TableAction::Backup.run(&ctx, &tables)?;

        if !request.commit {
            return Ok(BackupReport {
                tables,
                commit: None,
            });
        }

        for table in &tables {
            self.vcs.add_file(&self.store.snapshot_path(table))?;
        }
        let commit = if self.vcs.has_staged_changes()? {
            let message = request.message.clone().unwrap_or_else(default_message);
            self.vcs.commit(&message)?
        } else {
            // identical to what HEAD already records
            debug!("snapshots unchanged since last commit");
            self.vcs.current_commit_id()?
        };
        info!(commit = %commit.short(), tables = tables.len(), "backup committed");

        Ok(BackupReport {
            tables,
            commit: Some(commit),
        })
    }
}
