//! Per-run scratch directory.

use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::debug;
use uuid::Uuid;

use forecast_common::ForecastResult;

/// Exclusive temporary directory of one run, removed when dropped.
///
/// Dropping happens on every exit path of a run, including early returns
/// and errors, so nothing is left behind.
#[derive(Debug)]
pub struct RunWorkspace {
    dir: TempDir,
}

impl RunWorkspace {
    /// Create a workspace under `root`, or the system temp dir.
    pub fn create(root: Option<&Path>, job_id: Uuid) -> ForecastResult<Self> {
        let prefix = format!("meteoblue-{}-", job_id.simple());
        let mut builder = tempfile::Builder::new();
        builder.prefix(&prefix);
        let dir = match root {
            Some(root) => {
                std::fs::create_dir_all(root)?;
                builder.tempdir_in(root)?
            }
            None => builder.tempdir()?,
        };
        debug!(path = %dir.path().display(), "Created run workspace");
        Ok(Self { dir })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Path of a file inside the workspace.
    pub fn file(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }
}
