#![allow(dead_code)]

use std::collections::BTreeMap;
use std::path::Path;
use std::process::Command;
use std::sync::Mutex;

use revisr::{DatabaseDriver, Result, RevisrError, TableInfo};

pub fn git_available() -> bool {
    Command::new("git")
        .arg("--version")
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

fn git(dir: &Path, args: &[&str]) {
    let status = Command::new("git")
        .arg("-C")
        .arg(dir)
        .args(args)
        .status()
        .expect("failed to run git");
    assert!(status.success(), "git {:?} failed", args);
}

/// A fresh repository with one commit and a committer identity.
pub fn init_repo(dir: &Path) {
    git(dir, &["init", "-q"]);
    git(dir, &["config", "user.name", "Revisr Tests"]);
    git(dir, &["config", "user.email", "tests@example.com"]);
    git(dir, &["config", "commit.gpgsign", "false"]);
    std::fs::write(dir.join("README.md"), "site\n").unwrap();
    git(dir, &["add", "README.md"]);
    git(dir, &["commit", "-q", "-m", "Initial commit"]);
}

/// Tables of text rows, dumped as a padded line-per-row script.
#[derive(Default)]
pub struct MemoryDatabase {
    tables: Mutex<BTreeMap<String, Vec<String>>>,
}

impl MemoryDatabase {
    pub fn set_rows(&self, table: &str, rows: &[&str]) {
        self.tables
            .lock()
            .unwrap()
            .insert(table.to_string(), rows.iter().map(|r| r.to_string()).collect());
    }

    pub fn rows(&self, table: &str) -> Vec<String> {
        self.tables
            .lock()
            .unwrap()
            .get(table)
            .cloned()
            .unwrap_or_default()
    }
}

impl DatabaseDriver for MemoryDatabase {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn list_tables(&self) -> Result<Vec<TableInfo>> {
        Ok(self
            .tables
            .lock()
            .unwrap()
            .keys()
            .map(|name| TableInfo::new(name.clone(), None))
            .collect())
    }

    fn dump_table(&self, table: &str) -> Result<Vec<u8>> {
        let tables = self.tables.lock().unwrap();
        let rows = tables
            .get(table)
            .ok_or_else(|| RevisrError::Database(format!("no such table {}", table)))?;
        let mut out = format!("-- dump of {}\n{}\n", table, "-".repeat(100));
        for row in rows {
            out.push_str(&format!("ROW {}\n", row));
        }
        Ok(out.into_bytes())
    }

    fn load_table(&self, table: &str, dump: &[u8]) -> Result<()> {
        let rows = String::from_utf8_lossy(dump)
            .lines()
            .filter_map(|l| l.strip_prefix("ROW "))
            .map(str::to_string)
            .collect();
        self.tables.lock().unwrap().insert(table.to_string(), rows);
        Ok(())
    }
}
