//! Config store for loading and saving the user config.

use std::path::{Path, PathBuf};

use anyhow::Context;

use super::paths::USER_CONFIG_FILE;
use super::{UserConfig, parser};

#[derive(Debug, Clone)]
pub struct ConfigStore {
    config_path: PathBuf,
}

impl ConfigStore {
    pub fn from_dir(global_dir: impl AsRef<Path>) -> Self {
        Self {
            config_path: global_dir.as_ref().join(USER_CONFIG_FILE),
        }
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    pub fn load(&self) -> anyhow::Result<UserConfig> {
        if !self.config_path.exists() {
            return Ok(UserConfig::new());
        }
        parser::parse_toml_file(&self.config_path)
    }

    pub fn save(&self, config: &UserConfig) -> anyhow::Result<()> {
        let content = parser::to_toml(config).context("Failed to serialize config to TOML")?;
        if let Some(parent) = self.config_path.parent() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }
        std::fs::write(&self.config_path, content).with_context(|| {
            format!("Failed to write config file: {}", self.config_path.display())
        })?;
        Ok(())
    }
}
