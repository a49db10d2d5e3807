//! File name conventions.

use std::path::{Path, PathBuf};

/// Project manifest file name.
pub const MANIFEST_FILE: &str = "keel.toml";

/// User configuration file name.
pub const USER_CONFIG_FILE: &str = "config.toml";

/// Snapshot file name for `network`.
pub fn snapshot_file_name(network: &str) -> String {
    format!("keel.{network}.json")
}

pub fn manifest_path(project_root: &Path) -> PathBuf {
    project_root.join(MANIFEST_FILE)
}

/// Default global configuration directory (`<config_dir>/keel`).
pub fn default_global_dir() -> anyhow::Result<PathBuf> {
    Ok(dirs::config_dir()
        .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?
        .join("keel"))
}
