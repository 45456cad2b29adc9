use chrono::{DateTime, TimeZone, Utc};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use tracing::{debug, info};

use super::{Commit, CommitId, VersionControl};
use crate::error::{Result, RevisrError};
use crate::utils::process;

const FIELD_SEP: char = '\u{1f}';
const RECORD_SEP: char = '\u{1e}';
const COMMIT_FORMAT: &str = "--format=%H%x1f%s%x1f%ct%x1e";

/// [`VersionControl`] backed by the `git` command-line tool.
pub struct GitAdapter {
    git: PathBuf,
    work_tree: PathBuf,
}

impl GitAdapter {
    pub fn new(work_tree: impl Into<PathBuf>) -> Self {
        Self::with_binary("git", work_tree)
    }

    pub fn with_binary(git: impl Into<PathBuf>, work_tree: impl Into<PathBuf>) -> Self {
        Self {
            git: git.into(),
            work_tree: work_tree.into(),
        }
    }

    pub fn work_tree(&self) -> &Path {
        &self.work_tree
    }

    /// Check that the work tree is inside a git repository.
    pub fn ensure_repository(&self) -> Result<()> {
        let inside = process::run_text(self.cmd().args(["rev-parse", "--is-inside-work-tree"]))
            .map_err(|e| {
                RevisrError::Vcs(format!(
                    "{} is not a git repository: {}",
                    self.work_tree.display(),
                    e
                ))
            })?;
        if inside != "true" {
            return Err(RevisrError::Vcs(format!(
                "{} is not inside a git work tree",
                self.work_tree.display()
            )));
        }
        Ok(())
    }

    fn cmd(&self) -> Command {
        let mut cmd = Command::new(&self.git);
        cmd.arg("-C").arg(&self.work_tree);
        cmd
    }

    fn relative<'a>(&self, path: &'a Path) -> &'a Path {
        path.strip_prefix(&self.work_tree).unwrap_or(path)
    }

    fn config_key(section: &str, key: &str) -> String {
        format!("{}.{}", section, key)
    }

    /// Run a `git config` lookup where exit code 1 means "key not set".
    fn config_lookup(&self, args: &[&str]) -> Result<Option<String>> {
        let mut cmd = self.cmd();
        cmd.arg("config").args(args).stdin(Stdio::null());
        let output = cmd.output().map_err(|e| RevisrError::Spawn {
            program: self.git.display().to_string(),
            source: e,
        })?;
        match output.status.code() {
            Some(0) => Ok(Some(String::from_utf8_lossy(&output.stdout).to_string())),
            Some(1) => Ok(None),
            _ => Err(RevisrError::Command {
                program: self.git.display().to_string(),
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            }),
        }
    }

    fn parse_commits(raw: &str) -> Result<Vec<Commit>> {
        raw.split(RECORD_SEP)
            .map(str::trim)
            .filter(|r| !r.is_empty())
            .map(Self::parse_commit_record)
            .collect()
    }

    fn parse_commit_record(record: &str) -> Result<Commit> {
        let mut fields = record.split(FIELD_SEP);
        let (Some(hash), Some(message), Some(ts)) = (fields.next(), fields.next(), fields.next())
        else {
            return Err(RevisrError::Vcs(format!("unexpected commit record '{}'", record)));
        };
        let secs: i64 = ts
            .trim()
            .parse()
            .map_err(|_| RevisrError::Vcs(format!("invalid commit timestamp '{}'", ts)))?;
        let timestamp: DateTime<Utc> = Utc
            .timestamp_opt(secs, 0)
            .single()
            .ok_or_else(|| RevisrError::Vcs(format!("commit timestamp out of range: {}", secs)))?;
        Ok(Commit {
            hash: CommitId::new(hash.trim()),
            message: message.to_string(),
            timestamp,
            branch: None,
            files: Vec::new(),
        })
    }
}

impl VersionControl for GitAdapter {
    fn name(&self) -> &'static str {
        "git"
    }

    fn add_file(&self, path: &Path) -> Result<()> {
        let rel = self.relative(path);
        debug!(path = %rel.display(), "git add");
        process::run(self.cmd().arg("add").arg("--").arg(rel))?;
        Ok(())
    }

    fn has_staged_changes(&self) -> Result<bool> {
        // `diff --quiet` exits 0 when there is nothing staged
        let clean = process::run_probe(self.cmd().args(["diff", "--cached", "--quiet"]))?;
        Ok(!clean)
    }

    fn commit(&self, message: &str) -> Result<CommitId> {
        process::run(self.cmd().args(["commit", "-q", "-m", message]))?;
        let id = self.current_commit_id()?;
        info!(commit = %id.short(), "created commit");
        Ok(id)
    }

    fn current_commit_id(&self) -> Result<CommitId> {
        let id = process::run_text(self.cmd().args(["rev-parse", "HEAD"]))?;
        if id.is_empty() {
            return Err(RevisrError::Vcs("HEAD does not point at a commit".into()));
        }
        Ok(CommitId::new(id))
    }

    fn resolve(&self, rev: &str) -> Result<CommitId> {
        let spec = format!("{}^{{commit}}", rev);
        let id = process::run_text(self.cmd().args(["rev-parse", "--verify", "--quiet", &spec]))
            .map_err(|_| RevisrError::Vcs(format!("unknown commit '{}'", rev)))?;
        Ok(CommitId::new(id))
    }

    fn checkout_path_at_commit(&self, commit: &CommitId, path: &Path) -> Result<()> {
        let rel = self.relative(path);
        debug!(commit = %commit.short(), path = %rel.display(), "git checkout");
        process::run(
            self.cmd()
                .arg("checkout")
                .arg(commit.as_str())
                .arg("--")
                .arg(rel),
        )?;
        Ok(())
    }

    fn get_config(&self, section: &str, key: &str) -> Result<Option<String>> {
        let key = Self::config_key(section, key);
        Ok(self
            .config_lookup(&["--get", &key])?
            .map(|v| v.trim_end_matches(['\r', '\n']).to_string()))
    }

    fn get_config_all(&self, section: &str, key: &str) -> Result<Vec<String>> {
        let key = Self::config_key(section, key);
        Ok(self
            .config_lookup(&["--get-all", &key])?
            .map(|raw| raw.lines().map(str::to_string).collect())
            .unwrap_or_default())
    }

    fn set_config(&self, section: &str, key: &str, value: &str) -> Result<()> {
        let key = Self::config_key(section, key);
        process::run(self.cmd().args(["config", &key, value]))?;
        Ok(())
    }

    fn set_config_all(&self, section: &str, key: &str, values: &[String]) -> Result<()> {
        let key = Self::config_key(section, key);
        // exit code 5 just means there was nothing to unset
        let mut unset = self.cmd();
        unset.args(["config", "--unset-all", &key]).stdin(Stdio::null());
        let status = unset.output().map_err(|e| RevisrError::Spawn {
            program: self.git.display().to_string(),
            source: e,
        })?;
        if !status.status.success() && status.status.code() != Some(5) {
            return Err(RevisrError::Command {
                program: self.git.display().to_string(),
                status: status.status.to_string(),
                stderr: String::from_utf8_lossy(&status.stderr).trim().to_string(),
            });
        }
        for value in values {
            process::run(self.cmd().args(["config", "--add", &key, value]))?;
        }
        Ok(())
    }

    fn read_commit(&self, commit: &CommitId) -> Result<Commit> {
        let raw =
            process::run_text(self.cmd().args(["show", "-s", COMMIT_FORMAT, commit.as_str()]))?;
        let mut parsed = Self::parse_commits(&raw)?
            .into_iter()
            .next()
            .ok_or_else(|| RevisrError::Vcs(format!("commit '{}' not found", commit)))?;

        let branches = process::run_text(self.cmd().args([
            "branch",
            "--format=%(refname:short)",
            "--contains",
            commit.as_str(),
        ]))?;
        parsed.branch = branches.lines().next().map(|b| b.trim().to_string());

        let files = process::run_text(self.cmd().args([
            "diff-tree",
            "--no-commit-id",
            "--name-only",
            "-r",
            "--root",
            commit.as_str(),
        ]))?;
        parsed.files = files.lines().map(str::to_string).collect();
        Ok(parsed)
    }

    fn history(&self, path: &Path, limit: usize) -> Result<Vec<Commit>> {
        let raw = process::run_text(
            self.cmd()
                .arg("log")
                .arg(format!("-n{}", limit))
                .arg(COMMIT_FORMAT)
                .arg("--")
                .arg(self.relative(path)),
        )?;
        Self::parse_commits(&raw)
    }
}
