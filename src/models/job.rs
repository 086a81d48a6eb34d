//! Test job model

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// One discovered test case, immutable for the lifetime of a run
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TestJob {
    pub id: String,
    pub path: PathBuf,
    pub display_name: String,
}

impl TestJob {
    pub fn new(
        id: impl Into<String>,
        path: impl Into<PathBuf>,
        display_name: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            path: path.into(),
            display_name: display_name.into(),
        }
    }

    /// Build a job from a test file; the path doubles as the unique id
    pub fn from_path(path: &Path) -> Self {
        let display_name = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());

        Self {
            id: path.display().to_string(),
            path: path.to_path_buf(),
            display_name,
        }
    }
}

impl fmt::Display for TestJob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.display_name, self.path.display())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_from_path() {
        let job = TestJob::from_path(Path::new("suite/users/create_user.yaml"));
        assert_eq!(job.id, "suite/users/create_user.yaml");
        assert_eq!(job.display_name, "create_user");
        assert_eq!(
            job.to_string(),
            "create_user (suite/users/create_user.yaml)"
        );
    }
}
