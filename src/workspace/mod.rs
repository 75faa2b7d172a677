//! Workspace discovery and layout
//!
//! A workspace is any directory with a `.codify/` subdirectory holding the
//! SQLite database and the TOML configuration.

mod config;

pub use config::WorkspaceConfig;

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

/// A back-office workspace on disk
pub struct Workspace {
    root: PathBuf,
    config: WorkspaceConfig,
}

impl Workspace {
    /// Open a workspace rooted at the given path
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let root = path.as_ref().to_path_buf();
        if !root.is_dir() {
            anyhow::bail!("Workspace directory does not exist: {:?}", root);
        }

        let config = WorkspaceConfig::load_or_default(&root)?;
        Ok(Self { root, config })
    }

    /// Get the workspace root path
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Get the path to the .codify directory
    pub fn codify_dir(&self) -> PathBuf {
        self.root.join(".codify")
    }

    /// Get the database path
    pub fn db_path(&self) -> PathBuf {
        self.codify_dir().join(&self.config.db_file)
    }

    /// Get the workspace configuration
    pub fn config(&self) -> &WorkspaceConfig {
        &self.config
    }

    /// Initialize the .codify directory if it doesn't exist
    pub fn init_codify_dir(&self) -> Result<PathBuf> {
        let dir = self.codify_dir();
        if !dir.exists() {
            std::fs::create_dir_all(&dir)
                .with_context(|| format!("Failed to create {:?}", dir))?;
        }
        Ok(dir)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_missing_directory_fails() {
        assert!(Workspace::open("/does/not/exist").is_err());
    }

    #[test]
    fn test_paths() {
        let dir = tempfile::tempdir().unwrap();
        let ws = Workspace::open(dir.path()).unwrap();

        assert_eq!(ws.codify_dir(), dir.path().join(".codify"));
        assert_eq!(ws.db_path(), dir.path().join(".codify").join("codify.db"));
    }
}
