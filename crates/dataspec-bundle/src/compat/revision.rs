//! Access to spec files at two revisions

use crate::{BundleError, Result};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::process::Command;

/// Version-control view the compatibility checker diffs against
pub trait RevisionSource {
    /// Repository-relative paths that differ between `base` and `head`
    fn changed_files(&self, base: &str, head: &str) -> Result<Vec<String>>;

    /// Content of `path` at `rev`, `None` when the file does not exist there
    fn file_at(&self, path: &str, rev: &str) -> Result<Option<String>>;
}

/// Runs `git` in a working tree
#[derive(Debug, Clone)]
pub struct GitRevisionSource {
    repo_dir: PathBuf,
}

impl GitRevisionSource {
    pub fn new(repo_dir: impl Into<PathBuf>) -> Self {
        Self {
            repo_dir: repo_dir.into(),
        }
    }

    pub fn repo_dir(&self) -> &Path {
        &self.repo_dir
    }

    fn git(&self, args: &[&str]) -> Result<std::process::Output> {
        Command::new("git")
            .args(args)
            .current_dir(&self.repo_dir)
            .output()
            .map_err(|e| BundleError::Git(format!("failed to run git: {e}")))
    }
}

impl RevisionSource for GitRevisionSource {
    /// Renames are reported as a removal plus an addition, and paths come
    /// back unquoted so non-ASCII channel directories survive.
    fn changed_files(&self, base: &str, head: &str) -> Result<Vec<String>> {
        let range = format!("{base}...{head}");
        let output = self.git(&[
            "-c",
            "core.quotePath=false",
            "diff",
            "--name-only",
            "--no-renames",
            "-z",
            &range,
        ])?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(BundleError::Git(format!(
                "git diff --name-only {range} failed: {}",
                stderr.trim()
            )));
        }

        Ok(String::from_utf8_lossy(&output.stdout)
            .split('\0')
            .filter(|path| !path.is_empty())
            .map(str::to_string)
            .collect())
    }

    fn file_at(&self, path: &str, rev: &str) -> Result<Option<String>> {
        let object = format!("{rev}:{path}");
        let output = self.git(&["show", &object])?;
        if !output.status.success() {
            tracing::debug!(
                object = %object,
                stderr = %String::from_utf8_lossy(&output.stderr).trim(),
                "file absent at revision"
            );
            return Ok(None);
        }
        Ok(Some(String::from_utf8_lossy(&output.stdout).into_owned()))
    }
}

/// Revisions held in memory: revision name -> path -> content
#[derive(Debug, Clone, Default)]
pub struct InMemoryRevisions {
    revisions: HashMap<String, BTreeMap<String, String>>,
}

impl InMemoryRevisions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(
        &mut self,
        rev: impl Into<String>,
        path: impl Into<String>,
        content: impl Into<String>,
    ) -> &mut Self {
        self.revisions
            .entry(rev.into())
            .or_default()
            .insert(path.into(), content.into());
        self
    }

    /// Declare a revision with no files
    pub fn add_revision(&mut self, rev: impl Into<String>) -> &mut Self {
        self.revisions.entry(rev.into()).or_default();
        self
    }

    fn revision(&self, rev: &str) -> Result<&BTreeMap<String, String>> {
        self.revisions
            .get(rev)
            .ok_or_else(|| BundleError::Git(format!("unknown revision '{rev}'")))
    }
}

impl RevisionSource for InMemoryRevisions {
    fn changed_files(&self, base: &str, head: &str) -> Result<Vec<String>> {
        let base = self.revision(base)?;
        let head = self.revision(head)?;
        let paths: BTreeSet<&String> = base.keys().chain(head.keys()).collect();
        Ok(paths
            .into_iter()
            .filter(|path| base.get(*path) != head.get(*path))
            .cloned()
            .collect())
    }

    fn file_at(&self, path: &str, rev: &str) -> Result<Option<String>> {
        Ok(self.revision(rev)?.get(path).cloned())
    }
}
