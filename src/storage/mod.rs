//! The on-disk backup directory: one SQL dump per table, named
//! `revisr_<table>.sql`, living directly under `revisr-backups/`.

use serde::Serialize;
use std::collections::BTreeSet;
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::error::{Result, RevisrError};
use crate::utils::io::{create_if_absent, write_atomic};

pub const BACKUP_DIR_NAME: &str = "revisr-backups";
pub const SNAPSHOT_PREFIX: &str = "revisr_";
pub const SNAPSHOT_EXTENSION: &str = ".sql";
/// Anything smaller is treated as an empty or failed dump.
pub const MIN_SNAPSHOT_BYTES: u64 = 100;

const LOCK_FILE: &str = ".revisr.lock";
const ACCESS_RULE_FILE: &str = ".htaccess";
const ACCESS_RULE: &str = "Order deny,allow\nDeny from all\n";
const LISTING_STUB_FILE: &str = "index.php";
const LISTING_STUB: &str = "<?php\n// Silence is golden.\n";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "bytes", rename_all = "snake_case")]
pub enum SnapshotStatus {
    Missing,
    TooSmall(u64),
    Valid(u64),
}

impl SnapshotStatus {
    pub fn is_valid(&self) -> bool {
        matches!(self, SnapshotStatus::Valid(_))
    }

    pub fn describe(&self) -> String {
        match self {
            SnapshotStatus::Missing => "no snapshot file".to_string(),
            SnapshotStatus::TooSmall(size) => format!(
                "snapshot is {} bytes, below the {} byte minimum",
                size, MIN_SNAPSHOT_BYTES
            ),
            SnapshotStatus::Valid(size) => format!("{} bytes", size),
        }
    }
}

pub struct SnapshotStore {
    dir: PathBuf,
}

impl SnapshotStore {
    /// Store at the conventional location inside a repository work tree.
    pub fn new(repo_root: &Path) -> Self {
        Self::at(repo_root.join(BACKUP_DIR_NAME))
    }

    pub fn at(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Create the directory and its protective marker files if missing.
    /// Existing marker files are left untouched.
    pub fn ensure_directory(&self) -> Result<()> {
        fs::create_dir_all(&self.dir)?;
        if create_if_absent(&self.dir.join(ACCESS_RULE_FILE), ACCESS_RULE.as_bytes())? {
            info!(dir = %self.dir.display(), "created backup directory access rule");
        }
        if create_if_absent(&self.dir.join(LISTING_STUB_FILE), LISTING_STUB.as_bytes())? {
            debug!(dir = %self.dir.display(), "created backup directory listing stub");
        }
        Ok(())
    }

    pub fn snapshot_path(&self, table: &str) -> PathBuf {
        self.dir.join(snapshot_file_name(table))
    }

    pub fn status(&self, table: &str) -> SnapshotStatus {
        match fs::metadata(self.snapshot_path(table)) {
            Ok(md) if md.is_file() && md.len() >= MIN_SNAPSHOT_BYTES => {
                SnapshotStatus::Valid(md.len())
            }
            Ok(md) if md.is_file() => SnapshotStatus::TooSmall(md.len()),
            _ => SnapshotStatus::Missing,
        }
    }

    /// Whether the stored snapshot for `table` can be trusted for an import.
    pub fn verify(&self, table: &str) -> bool {
        self.status(table).is_valid()
    }

    pub fn read_snapshot(&self, table: &str) -> Result<Vec<u8>> {
        Ok(fs::read(self.snapshot_path(table))?)
    }

    /// Replace the snapshot for `table`. The previous file stays intact until
    /// the new one is completely written.
    pub fn write_snapshot(&self, table: &str, contents: &[u8]) -> Result<PathBuf> {
        let path = self.snapshot_path(table);
        write_atomic(&path, contents)?;
        Ok(path)
    }

    /// Table names that have a snapshot file in the directory.
    pub fn list_snapshot_tables(&self) -> Result<BTreeSet<String>> {
        let mut tables = BTreeSet::new();
        if !self.dir.is_dir() {
            return Ok(tables);
        }
        for entry in WalkDir::new(&self.dir).min_depth(1).max_depth(1) {
            let entry = entry.map_err(|e| RevisrError::Io(e.into()))?;
            if !entry.file_type().is_file() {
                continue;
            }
            let Some(name) = entry.file_name().to_str() else {
                continue;
            };
            match table_from_file_name(name) {
                Some(table) => {
                    tables.insert(table);
                }
                None if name.starts_with(SNAPSHOT_PREFIX) => {
                    warn!(file = name, "ignoring snapshot file with an undecodable name");
                }
                None => {}
            }
        }
        Ok(tables)
    }

    /// Snapshots whose table does not exist in the live database.
    pub fn list_orphan_tables(&self, live: &BTreeSet<String>) -> Result<BTreeSet<String>> {
        Ok(self
            .list_snapshot_tables()?
            .into_iter()
            .filter(|t| !live.contains(t))
            .collect())
    }

    /// Take the directory-wide operation lock. Only one backup, import or
    /// restore may run against a backup directory at a time. A lock left by a
    /// process that no longer exists is reclaimed.
    pub fn lock(&self) -> Result<StoreLock> {
        fs::create_dir_all(&self.dir)?;
        let path = self.dir.join(LOCK_FILE);
        match try_create_lock(&path) {
            Err(RevisrError::Locked(_)) if lock_is_stale(&path) => {
                warn!(lock = %path.display(), "removing lock left by a process that has exited");
                fs::remove_file(&path)?;
                try_create_lock(&path)
            }
            other => other,
        }
    }
}

fn try_create_lock(path: &Path) -> Result<StoreLock> {
    match OpenOptions::new().write(true).create_new(true).open(path) {
        Ok(mut file) => {
            writeln!(file, "{}", std::process::id())?;
            debug!(lock = %path.display(), "acquired backup directory lock");
            Ok(StoreLock {
                path: path.to_path_buf(),
            })
        }
        Err(e) if e.kind() == ErrorKind::AlreadyExists => Err(RevisrError::Locked(path.into())),
        Err(e) => Err(e.into()),
    }
}

/// The recorded holder is known to be gone. Only decidable where `/proc`
/// exists; elsewhere, and for unreadable lock files, the lock is kept.
fn lock_is_stale(path: &Path) -> bool {
    let Some(pid) = fs::read_to_string(path)
        .ok()
        .and_then(|s| s.trim().parse::<u32>().ok())
    else {
        return false;
    };
    let proc_root = Path::new("/proc");
    pid != std::process::id()
        && proc_root.join("self").exists()
        && !proc_root.join(pid.to_string()).exists()
}

/// Held for the duration of a mutating operation; releases on drop.
#[derive(Debug)]
pub struct StoreLock {
    path: PathBuf,
}

impl Drop for StoreLock {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.path) {
            warn!(lock = %self.path.display(), error = %e, "failed to release lock");
        }
    }
}

pub fn snapshot_file_name(table: &str) -> String {
    format!("{}{}{}", SNAPSHOT_PREFIX, encode_table_name(table), SNAPSHOT_EXTENSION)
}

pub fn table_from_file_name(file_name: &str) -> Option<String> {
    let encoded = file_name
        .strip_prefix(SNAPSHOT_PREFIX)?
        .strip_suffix(SNAPSHOT_EXTENSION)?;
    if encoded.is_empty() {
        return None;
    }
    decode_table_name(encoded)
}

fn is_plain(b: u8) -> bool {
    b.is_ascii_alphanumeric() || matches!(b, b'_' | b'-' | b'$')
}

/// Escape everything but `[A-Za-z0-9_$-]` as `%XX`, so distinct names never
/// collide and no name can escape the directory.
fn encode_table_name(table: &str) -> String {
    let mut out = String::with_capacity(table.len());
    for &b in table.as_bytes() {
        if is_plain(b) {
            out.push(b as char);
        } else {
            out.push_str(&format!("%{:02X}", b));
        }
    }
    out
}

fn decode_table_name(encoded: &str) -> Option<String> {
    let bytes = encoded.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'%' => {
                let hex = encoded.get(i + 1..i + 3)?;
                out.push(u8::from_str_radix(hex, 16).ok()?);
                i += 3;
            }
            b if is_plain(b) => {
                out.push(b);
                i += 1;
            }
            _ => return None,
        }
    }
    String::from_utf8(out).ok()
}
