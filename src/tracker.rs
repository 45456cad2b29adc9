//! Decides which live tables are subject to versioning.

use serde::Serialize;
use std::collections::BTreeSet;
use tracing::debug;

use crate::config::{TrackingConfig, TrackingMode};
use crate::drivers::{DatabaseDriver, TableInfo};
use crate::error::Result;
use crate::storage::{SnapshotStatus, SnapshotStore};

/// One row of the table overview.
#[derive(Debug, Clone, Serialize)]
pub struct TableStatus {
    pub name: String,
    pub size_bytes: Option<u64>,
    pub tracked: bool,
    pub snapshot: SnapshotStatus,
}

pub struct TableTracker<'a> {
    db: &'a dyn DatabaseDriver,
}

impl<'a> TableTracker<'a> {
    pub fn new(db: &'a dyn DatabaseDriver) -> Self {
        Self { db }
    }

    pub fn live_tables(&self) -> Result<Vec<TableInfo>> {
        self.db.list_tables()
    }

    pub fn live_table_names(&self) -> Result<BTreeSet<String>> {
        Ok(self.live_tables()?.into_iter().map(|t| t.name).collect())
    }

    /// Tables currently tracked under `config`. Always a subset of the live
    /// tables at call time.
    pub fn tracked_tables(&self, config: &TrackingConfig) -> Result<BTreeSet<String>> {
        let live = self.live_table_names()?;
        Ok(resolve_tracked(config, &live))
    }

    /// Tracked tables, or every live table when nothing is tracked, so that a
    /// requested backup is never a silent no-op.
    pub fn effective_tables(&self, config: &TrackingConfig) -> Result<BTreeSet<String>> {
        let live = self.live_table_names()?;
        let tracked = resolve_tracked(config, &live);
        if tracked.is_empty() {
            debug!(mode = %config.mode, "no tracked tables; using every live table");
            return Ok(live);
        }
        Ok(tracked)
    }

    pub fn table_statuses(
        &self,
        config: &TrackingConfig,
        store: &SnapshotStore,
    ) -> Result<Vec<TableStatus>> {
        let live = self.live_tables()?;
        let names: BTreeSet<String> = live.iter().map(|t| t.name.clone()).collect();
        let tracked = resolve_tracked(config, &names);
        Ok(live
            .into_iter()
            .map(|t| TableStatus {
                tracked: tracked.contains(&t.name),
                snapshot: store.status(&t.name),
                name: t.name,
                size_bytes: t.size_bytes,
            })
            .collect())
    }
}

pub fn resolve_tracked(config: &TrackingConfig, live: &BTreeSet<String>) -> BTreeSet<String> {
    match config.mode {
        TrackingMode::AllTables => live.clone(),
        TrackingMode::None => BTreeSet::new(),
        TrackingMode::Custom => {
            let mut tracked = BTreeSet::new();
            for name in &config.custom_tables {
                if live.contains(name) {
                    tracked.insert(name.clone());
                } else {
                    debug!(table = %name, "configured table no longer exists");
                }
            }
            tracked
        }
    }
}
