//! Loads stored snapshots back into the live database.

use serde::Serialize;
use std::collections::BTreeSet;
use tracing::{info, warn};

use crate::action::{ActionContext, TableAction};
use crate::config::RevisrConfig;
use crate::drivers::DatabaseDriver;
use crate::error::Result;
use crate::storage::{SnapshotStore, StoreLock};
use crate::tracker::TableTracker;

#[derive(Debug, Clone, Serialize)]
pub struct ImportReport {
    pub tables: Vec<String>,
    /// Default-set tables passed over because their snapshot is missing or
    /// too small to trust.
    pub skipped: Vec<String>,
}

pub struct ImportEngine<'a> {
    db: &'a dyn DatabaseDriver,
    store: &'a SnapshotStore,
}

impl<'a> ImportEngine<'a> {
    pub fn new(db: &'a dyn DatabaseDriver, store: &'a SnapshotStore) -> Self {
        Self { db, store }
    }

    /// Tables imported when none are named: every orphan snapshot plus every
    /// tracked table.
    pub fn default_tables(&self, config: &RevisrConfig) -> Result<BTreeSet<String>> {
        let tracker = TableTracker::new(self.db);
        let live = tracker.live_table_names()?;
        let mut tables = self.store.list_orphan_tables(&live)?;
        tables.extend(crate::tracker::resolve_tracked(&config.tracking, &live));
        Ok(tables)
    }

    pub fn import(
        &self,
        tables: Option<Vec<String>>,
        config: &RevisrConfig,
    ) -> Result<ImportReport> {
        let lock = self.store.lock()?;
        self.import_locked(&lock, tables, config)
    }

    pub(crate) fn import_locked(
        &self,
        _lock: &StoreLock,
        tables: Option<Vec<String>>,
        config: &RevisrConfig,
    ) -> Result<ImportReport> {
        // an explicit list, even an empty one, is taken as given
        let (tables, skipped) = match tables {
            Some(explicit) => (explicit, Vec::new()),
            None => {
                let (ready, skipped): (Vec<String>, Vec<String>) = self
                    .default_tables(config)?
                    .into_iter()
                    .partition(|t| self.store.verify(t));
                for table in &skipped {
                    let status = self.store.status(table).describe();
                    warn!(table = %table, status = %status, "skipping import");
                }
                (ready, skipped)
            }
        };
        info!(
            tables = tables.len(),
            substitution = config.substitution.is_some(),
            "importing snapshots"
        );

        let ctx = ActionContext {
            db: self.db,
            store: self.store,
            substitution: config.substitution.as_ref(),
        };
        let tables = TableAction::Import.run(&ctx, &tables)?;
        Ok(ImportReport { tables, skipped })
    }
}
