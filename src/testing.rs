//! In-memory collaborators for unit tests.

use chrono::{TimeZone, Utc};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::drivers::{DatabaseDriver, TableInfo};
use crate::error::{Result, RevisrError};
use crate::vcs::{Commit, CommitId, VersionControl};

const DUMP_HEADER: &str = "-- fake dump generated for unit tests; \
    this header keeps every dump comfortably above the integrity threshold\n";

/// A database whose tables are lists of text rows.
#[derive(Default)]
pub struct FakeDatabase {
    tables: Mutex<BTreeMap<String, Vec<String>>>,
    fail_dump: Mutex<BTreeSet<String>>,
    fail_load: Mutex<BTreeSet<String>>,
    loaded: Mutex<Vec<(String, Vec<u8>)>>,
    dumped: Mutex<Vec<String>>,
}

impl FakeDatabase {
    pub fn with_tables(tables: &[(&str, &[&str])]) -> Self {
        let db = Self::default();
        for (name, rows) in tables {
            db.set_rows(name, rows);
        }
        db
    }

    pub fn set_rows(&self, table: &str, rows: &[&str]) {
        self.tables
            .lock()
            .unwrap()
            .insert(table.to_string(), rows.iter().map(|r| r.to_string()).collect());
    }

    pub fn rows(&self, table: &str) -> Option<Vec<String>> {
        self.tables.lock().unwrap().get(table).cloned()
    }

    pub fn drop_table(&self, table: &str) {
        self.tables.lock().unwrap().remove(table);
    }

    pub fn fail_dump_of(&self, table: &str) {
        self.fail_dump.lock().unwrap().insert(table.to_string());
    }

    pub fn fail_load_of(&self, table: &str) {
        self.fail_load.lock().unwrap().insert(table.to_string());
    }

    /// Tables loaded so far, with the exact bytes each load received.
    pub fn loads(&self) -> Vec<(String, Vec<u8>)> {
        self.loaded.lock().unwrap().clone()
    }

    pub fn dumps(&self) -> Vec<String> {
        self.dumped.lock().unwrap().clone()
    }
}

impl DatabaseDriver for FakeDatabase {
    fn name(&self) -> &'static str {
        "fake"
    }

    fn list_tables(&self) -> Result<Vec<TableInfo>> {
        Ok(self
            .tables
            .lock()
            .unwrap()
            .iter()
            .map(|(name, rows)| TableInfo::new(name.clone(), Some(rows.len() as u64 * 16)))
            .collect())
    }

    fn dump_table(&self, table: &str) -> Result<Vec<u8>> {
        if self.fail_dump.lock().unwrap().contains(table) {
            return Err(RevisrError::Database(format!("dump of {} refused", table)));
        }
        let tables = self.tables.lock().unwrap();
        let rows = tables
            .get(table)
            .ok_or_else(|| RevisrError::Database(format!("no such table {}", table)))?;
        self.dumped.lock().unwrap().push(table.to_string());
        let mut out = String::from(DUMP_HEADER);
        for row in rows {
            out.push_str("ROW\t");
            out.push_str(row);
            out.push('\n');
        }
        Ok(out.into_bytes())
    }

    fn load_table(&self, table: &str, dump: &[u8]) -> Result<()> {
        self.loaded
            .lock()
            .unwrap()
            .push((table.to_string(), dump.to_vec()));
        if self.fail_load.lock().unwrap().contains(table) {
            return Err(RevisrError::Database(format!("load of {} refused", table)));
        }
        let text = String::from_utf8_lossy(dump);
        let rows = text
            .lines()
            .filter_map(|l| l.strip_prefix("ROW\t"))
            .map(str::to_string)
            .collect();
        self.tables.lock().unwrap().insert(table.to_string(), rows);
        Ok(())
    }
}

struct FakeCommit {
    id: CommitId,
    message: String,
    tree: BTreeMap<PathBuf, Vec<u8>>,
    changed: Vec<PathBuf>,
}

/// A version-control backend that keeps full tree copies per commit and
/// reads/writes real files in the working tree.
pub struct FakeVcs {
    work_tree: PathBuf,
    staged: Mutex<BTreeSet<PathBuf>>,
    commits: Mutex<Vec<FakeCommit>>,
    config: Mutex<BTreeMap<String, Vec<String>>>,
    fail_checkout: Mutex<BTreeSet<PathBuf>>,
    fail_commit: Mutex<bool>,
    checkouts: Mutex<Vec<(CommitId, PathBuf)>>,
}

impl FakeVcs {
    pub fn new(work_tree: impl Into<PathBuf>) -> Self {
        Self {
            work_tree: work_tree.into(),
            staged: Mutex::default(),
            commits: Mutex::default(),
            config: Mutex::default(),
            fail_checkout: Mutex::default(),
            fail_commit: Mutex::new(false),
            checkouts: Mutex::default(),
        }
    }

    pub fn work_tree(&self) -> &Path {
        &self.work_tree
    }

    pub fn fail_checkout_of(&self, path: &Path) {
        self.fail_checkout.lock().unwrap().insert(path.to_path_buf());
    }

    pub fn fail_commits(&self) {
        *self.fail_commit.lock().unwrap() = true;
    }

    pub fn commit_count(&self) -> usize {
        self.commits.lock().unwrap().len()
    }

    pub fn commit_message(&self, id: &CommitId) -> Option<String> {
        self.commits
            .lock()
            .unwrap()
            .iter()
            .find(|c| &c.id == id)
            .map(|c| c.message.clone())
    }

    pub fn checkouts(&self) -> Vec<(CommitId, PathBuf)> {
        self.checkouts.lock().unwrap().clone()
    }

    fn key(section: &str, key: &str) -> String {
        format!("{}.{}", section, key)
    }

    fn to_commit(c: &FakeCommit, index: usize) -> Commit {
        Commit {
            hash: c.id.clone(),
            message: c.message.clone(),
            timestamp: Utc
                .timestamp_opt(1_700_000_000 + index as i64 * 60, 0)
                .single()
                .unwrap_or_default(),
            branch: Some("main".to_string()),
            files: c
                .changed
                .iter()
                .map(|p| p.display().to_string())
                .collect(),
        }
    }
}

impl VersionControl for FakeVcs {
    fn name(&self) -> &'static str {
        "fake"
    }

    fn add_file(&self, path: &Path) -> Result<()> {
        if !path.exists() {
            return Err(RevisrError::Vcs(format!("pathspec {} did not match", path.display())));
        }
        self.staged.lock().unwrap().insert(path.to_path_buf());
        Ok(())
    }

    fn has_staged_changes(&self) -> Result<bool> {
        let staged = self.staged.lock().unwrap();
        let commits = self.commits.lock().unwrap();
        let head = commits.last().map(|c| &c.tree);
        for path in staged.iter() {
            let current = fs::read(path)?;
            if head.and_then(|t| t.get(path)) != Some(&current) {
                return Ok(true);
            }
        }
        Ok(false)
    }

    fn commit(&self, message: &str) -> Result<CommitId> {
        if *self.fail_commit.lock().unwrap() {
            return Err(RevisrError::Vcs("commit rejected".into()));
        }
        if !self.has_staged_changes()? {
            return Err(RevisrError::Vcs("nothing to commit".into()));
        }
        let mut staged = self.staged.lock().unwrap();
        let mut commits = self.commits.lock().unwrap();
        let mut tree = commits.last().map(|c| c.tree.clone()).unwrap_or_default();
        let mut changed = Vec::new();
        for path in staged.iter() {
            let content = fs::read(path)?;
            if tree.get(path) != Some(&content) {
                changed.push(path.clone());
            }
            tree.insert(path.clone(), content);
        }
        staged.clear();
        let id = CommitId::new(format!("{:040x}", commits.len() + 1));
        commits.push(FakeCommit {
            id: id.clone(),
            message: message.to_string(),
            tree,
            changed,
        });
        Ok(id)
    }

    fn current_commit_id(&self) -> Result<CommitId> {
        self.commits
            .lock()
            .unwrap()
            .last()
            .map(|c| c.id.clone())
            .ok_or_else(|| RevisrError::Vcs("no commits yet".into()))
    }

    fn resolve(&self, rev: &str) -> Result<CommitId> {
        self.commits
            .lock()
            .unwrap()
            .iter()
            .find(|c| !rev.is_empty() && c.id.as_str().starts_with(rev))
            .map(|c| c.id.clone())
            .ok_or_else(|| RevisrError::Vcs(format!("unknown commit '{}'", rev)))
    }

    fn checkout_path_at_commit(&self, commit: &CommitId, path: &Path) -> Result<()> {
        self.checkouts
            .lock()
            .unwrap()
            .push((commit.clone(), path.to_path_buf()));
        if self.fail_checkout.lock().unwrap().contains(path) {
            return Err(RevisrError::Vcs(format!("checkout of {} failed", path.display())));
        }
        let commits = self.commits.lock().unwrap();
        let content = commits
            .iter()
            .find(|c| &c.id == commit)
            .and_then(|c| c.tree.get(path))
            .ok_or_else(|| {
                RevisrError::Vcs(format!("{} not present at {}", path.display(), commit))
            })?;
        fs::write(path, content)?;
        Ok(())
    }

    fn get_config(&self, section: &str, key: &str) -> Result<Option<String>> {
        Ok(self
            .config
            .lock()
            .unwrap()
            .get(&Self::key(section, key))
            .and_then(|v| v.last().cloned()))
    }

    fn get_config_all(&self, section: &str, key: &str) -> Result<Vec<String>> {
        Ok(self
            .config
            .lock()
            .unwrap()
            .get(&Self::key(section, key))
            .cloned()
            .unwrap_or_default())
    }

    fn set_config(&self, section: &str, key: &str, value: &str) -> Result<()> {
        self.config
            .lock()
            .unwrap()
            .insert(Self::key(section, key), vec![value.to_string()]);
        Ok(())
    }

    fn set_config_all(&self, section: &str, key: &str, values: &[String]) -> Result<()> {
        self.config
            .lock()
            .unwrap()
            .insert(Self::key(section, key), values.to_vec());
        Ok(())
    }

    fn read_commit(&self, commit: &CommitId) -> Result<Commit> {
        let commits = self.commits.lock().unwrap();
        commits
            .iter()
            .enumerate()
            .find(|(_, c)| &c.id == commit)
            .map(|(i, c)| Self::to_commit(c, i))
            .ok_or_else(|| RevisrError::Vcs(format!("commit '{}' not found", commit)))
    }

    fn history(&self, path: &Path, limit: usize) -> Result<Vec<Commit>> {
        let commits = self.commits.lock().unwrap();
        Ok(commits
            .iter()
            .enumerate()
            .rev()
            .filter(|(_, c)| c.changed.iter().any(|p| p.starts_with(path)))
            .take(limit)
            .map(|(i, c)| Self::to_commit(c, i))
            .collect())
    }
}
