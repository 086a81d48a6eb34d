//! Test job discovery
//!
//! Enumerates test files from a single file or a recursive directory walk
//! and orders them for scheduling.

use anyhow::{bail, Context, Result};
use clap::ValueEnum;
use ignore::WalkBuilder;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::models::TestJob;

/// Job ordering
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    /// Full path, lexicographic
    #[default]
    Path,
    /// File name, ties broken by path
    Name,
    /// Shuffled once per run
    Random,
}

/// Produces the ordered job list for a run
pub struct JobSource {
    root: PathBuf,
    extensions: Vec<String>,
    sort: SortOrder,
}

impl JobSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            extensions: vec!["yaml".to_string(), "yml".to_string(), "json".to_string()],
            sort: SortOrder::Path,
        }
    }

    pub fn with_extensions(mut self, extensions: Vec<String>) -> Self {
        self.extensions = extensions;
        self
    }

    pub fn with_sort(mut self, sort: SortOrder) -> Self {
        self.sort = sort;
        self
    }

    /// Discover and order jobs
    pub fn jobs(&self) -> Result<Vec<TestJob>> {
        let mut paths = self.discover()?;
        self.order(&mut paths);
        Ok(paths.iter().map(|p| TestJob::from_path(p)).collect())
    }

    fn discover(&self) -> Result<Vec<PathBuf>> {
        if !self.root.exists() {
            bail!("Test path does not exist: {}", self.root.display());
        }

        // An explicit file is always a job, whatever its extension
        if self.root.is_file() {
            return Ok(vec![self.root.clone()]);
        }

        let mut paths = Vec::new();
        let walker = WalkBuilder::new(&self.root)
            .hidden(true)
            .git_ignore(true)
            .follow_links(false)
            .build();

        for entry in walker {
            let entry = entry
                .with_context(|| format!("Failed to walk {}", self.root.display()))?;
            let is_file = entry.file_type().map(|t| t.is_file()).unwrap_or(false);
            if is_file && self.matches_extension(entry.path()) {
                paths.push(entry.into_path());
            }
        }

        if paths.is_empty() {
            warn!("No test files found under {}", self.root.display());
        } else {
            debug!(
                "Discovered {} test files under {}",
                paths.len(),
                self.root.display()
            );
        }

        Ok(paths)
    }

    fn matches_extension(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .map(|e| self.extensions.iter().any(|x| x.eq_ignore_ascii_case(e)))
            .unwrap_or(false)
    }

    fn order(&self, paths: &mut [PathBuf]) {
        match self.sort {
            SortOrder::Path => paths.sort(),
            SortOrder::Name => paths.sort_by(|a, b| {
                a.file_name().cmp(&b.file_name()).then_with(|| a.cmp(b))
            }),
            SortOrder::Random => paths.shuffle(&mut rand::rng()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn fixture() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join("b_users")).unwrap();
        fs::create_dir_all(root.join("a_orders/nested")).unwrap();
        fs::write(root.join("b_users/zeta.yaml"), "endpoint: x").unwrap();
        fs::write(root.join("a_orders/nested/alpha.yml"), "endpoint: x").unwrap();
        fs::write(root.join("a_orders/middle.json"), "{}").unwrap();
        fs::write(root.join("a_orders/readme.md"), "not a test").unwrap();
        dir
    }

    fn names(jobs: &[TestJob]) -> Vec<String> {
        jobs.iter().map(|j| j.display_name.clone()).collect()
    }

    #[test]
    fn test_sort_by_path() {
        let dir = fixture();
        let jobs = JobSource::new(dir.path()).jobs().unwrap();
        assert_eq!(names(&jobs), vec!["middle", "alpha", "zeta"]);
    }

    #[test]
    fn test_sort_by_name() {
        let dir = fixture();
        let jobs = JobSource::new(dir.path())
            .with_sort(SortOrder::Name)
            .jobs()
            .unwrap();
        assert_eq!(names(&jobs), vec!["alpha", "middle", "zeta"]);
    }

    #[test]
    fn test_random_keeps_every_job() {
        let dir = fixture();
        let jobs = JobSource::new(dir.path())
            .with_sort(SortOrder::Random)
            .jobs()
            .unwrap();
        let mut sorted = names(&jobs);
        sorted.sort();
        assert_eq!(sorted, vec!["alpha", "middle", "zeta"]);
    }

    #[test]
    fn test_extension_filter() {
        let dir = fixture();
        let jobs = JobSource::new(dir.path())
            .with_extensions(vec!["json".to_string()])
            .jobs()
            .unwrap();
        assert_eq!(names(&jobs), vec!["middle"]);
    }

    #[test]
    fn test_single_file() {
        let dir = fixture();
        let file = dir.path().join("a_orders/readme.md");
        let jobs = JobSource::new(&file).jobs().unwrap();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].path, file);
    }

    #[test]
    fn test_missing_path() {
        assert!(JobSource::new("/definitely/not/here").jobs().is_err());
    }
}
