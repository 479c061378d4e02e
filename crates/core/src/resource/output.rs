use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tokio::fs;
use tracing::debug;

/// Keeps an output directory free of files left over from earlier runs.
#[derive(Debug, Clone)]
pub struct OutputDirectory {
    path: PathBuf,
}

impl OutputDirectory {
    /// Manage the directory at `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Managed directory.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Create the directory, or remove every file directly inside it.
    ///
    /// Sub-directories are left alone. Returns the number of removed files.
    pub async fn prepare(&self) -> Result<usize> {
        let exists = fs::try_exists(&self.path)
            .await
            .with_context(|| format!("failed to inspect {}", self.path.display()))?;
        if !exists {
            fs::create_dir_all(&self.path)
                .await
                .with_context(|| format!("failed to create {}", self.path.display()))?;
            return Ok(0);
        }

        let mut removed = 0;
        let mut entries = fs::read_dir(&self.path)
            .await
            .with_context(|| format!("failed to read {}", self.path.display()))?;
        while let Some(entry) = entries
            .next_entry()
            .await
            .with_context(|| format!("failed to read {}", self.path.display()))?
        {
            let path = entry.path();
            let file_type = entry
                .file_type()
                .await
                .with_context(|| format!("failed to inspect {}", path.display()))?;
            if file_type.is_dir() {
                debug!("leaving directory {} in place", path.display());
                continue;
            }
            fs::remove_file(&path)
                .await
                .with_context(|| format!("failed to remove {}", path.display()))?;
            removed += 1;
        }

        Ok(removed)
    }
}
