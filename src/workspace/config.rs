//! Workspace configuration for Codify

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Configuration for a back-office workspace
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkspaceConfig {
    /// Database file name inside the .codify directory
    #[serde(default = "default_db_file")]
    pub db_file: String,

    /// Drain the merge outbox right after each mutating command
    #[serde(default = "default_auto_merge")]
    pub auto_merge: bool,

    /// Acting user recorded on library history entries
    #[serde(default)]
    pub actor: Option<String>,
}

fn default_db_file() -> String {
    "codify.db".to_string()
}

fn default_auto_merge() -> bool {
    true
}

impl Default for WorkspaceConfig {
    fn default() -> Self {
        Self {
            db_file: default_db_file(),
            auto_merge: default_auto_merge(),
            actor: None,
        }
    }
}

impl WorkspaceConfig {
    /// Load configuration from the workspace or return defaults
    pub fn load_or_default(root: &Path) -> Result<Self> {
        let config_path = root.join(".codify").join("config.toml");

        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)
                .with_context(|| format!("Failed to read config file: {:?}", config_path))?;
            let config: WorkspaceConfig = toml::from_str(&content)
                .with_context(|| format!("Failed to parse config file: {:?}", config_path))?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to the workspace
    pub fn save(&self, root: &Path) -> Result<()> {
        let codify_dir = root.join(".codify");
        std::fs::create_dir_all(&codify_dir)?;

        let config_path = codify_dir.join("config.toml");
        let content =
            toml::to_string_pretty(self).context("Failed to serialize configuration")?;

        std::fs::write(&config_path, content)
            .with_context(|| format!("Failed to write config file: {:?}", config_path))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = WorkspaceConfig::default();
        assert_eq!(config.db_file, "codify.db");
        assert!(config.auto_merge);
        assert!(config.actor.is_none());
    }

    #[test]
    fn test_config_round_trip() {
        let dir = tempfile::tempdir().unwrap();

        let mut config = WorkspaceConfig::default();
        config.actor = Some("analyst@example.com".to_string());
        config.auto_merge = false;
        config.save(dir.path()).unwrap();

        let loaded = WorkspaceConfig::load_or_default(dir.path()).unwrap();
        assert_eq!(loaded.actor.as_deref(), Some("analyst@example.com"));
        assert!(!loaded.auto_merge);
    }
}
