//! Per-table work shared by backup and import.

use tracing::{debug, warn};

use crate::config::Substitution;
use crate::drivers::DatabaseDriver;
use crate::error::{Result, RevisrError, TableFailure};
use crate::storage::SnapshotStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableAction {
    /// Dump a live table into its snapshot file.
    Backup,
    /// Load a snapshot file into the live table.
    Import,
}

pub struct ActionContext<'a> {
    pub db: &'a dyn DatabaseDriver,
    pub store: &'a SnapshotStore,
    /// Applied to snapshot content before an import.
    pub substitution: Option<&'a Substitution>,
}

impl TableAction {
    pub fn verb(&self) -> &'static str {
        match self {
            TableAction::Backup => "backup",
            TableAction::Import => "import",
        }
    }

    /// Run the action for each table in order. Every table is attempted; if
    /// any fail, the failures are returned together and the tables that
    /// succeeded are left as they are.
    pub fn run(&self, ctx: &ActionContext<'_>, tables: &[String]) -> Result<Vec<String>> {
        let mut done = Vec::with_capacity(tables.len());
        let mut failed = Vec::new();

        for table in tables {
            let outcome = match self {
                TableAction::Backup => backup_table(ctx, table),
                TableAction::Import => import_table(ctx, table),
            };
            match outcome {
                Ok(()) => {
                    debug!(table = %table, action = self.verb(), "table done");
                    done.push(table.clone());
                }
                Err(e) => {
                    warn!(table = %table, action = self.verb(), error = %e, "table failed");
                    failed.push(TableFailure::new(table.clone(), e));
                }
            }
        }

        if failed.is_empty() {
            return Ok(done);
        }
        Err(match self {
            TableAction::Backup => RevisrError::DumpFailed { failed },
            TableAction::Import => RevisrError::ImportFailed { failed },
        })
    }
}

fn backup_table(ctx: &ActionContext<'_>, table: &str) -> Result<()> {
    let dump = ctx.db.dump_table(table)?;
    ctx.store.write_snapshot(table, &dump)?;
    // a dump the client reported as successful can still be empty
    let status = ctx.store.status(table);
    if !status.is_valid() {
        return Err(RevisrError::Integrity {
            table: table.to_string(),
            reason: status.describe(),
        });
    }
    Ok(())
}

fn import_table(ctx: &ActionContext<'_>, table: &str) -> Result<()> {
    let status = ctx.store.status(table);
    if !status.is_valid() {
        return Err(RevisrError::Integrity {
            table: table.to_string(),
            reason: status.describe(),
        });
    }
    let content = ctx.store.read_snapshot(table)?;
    let content = match ctx.substitution {
        Some(sub) => sub.apply(&content),
        None => content,
    };
    ctx.db.load_table(table, &content)
}
