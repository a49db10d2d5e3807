//! Manifest store for loading and saving keel.toml.

use std::path::{Path, PathBuf};

use anyhow::Context;
use semver::Version;

use super::ProjectManifest;
use crate::config::{manifest_path, parser};

#[derive(Debug, Clone)]
pub struct ManifestStore {
    path: PathBuf,
}

impl ManifestStore {
    /// Store for the manifest at the root of `project_root`.
    pub fn for_project(project_root: &Path) -> Self {
        Self::from_path(manifest_path(project_root))
    }

    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Directory holding the manifest, where snapshots live too.
    pub fn dir(&self) -> &Path {
        self.path.parent().unwrap_or_else(|| Path::new("."))
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    pub fn load(&self) -> anyhow::Result<ProjectManifest> {
        if !self.exists() {
            anyhow::bail!(
                "No project manifest at {}; run `keel init` first",
                self.path.display()
            );
        }
        let manifest: ProjectManifest = parser::parse_toml_file(&self.path)?;
        manifest
            .validate()
            .with_context(|| format!("Invalid manifest: {}", self.path.display()))?;
        Ok(manifest)
    }

    pub fn save(&self, manifest: &ProjectManifest) -> anyhow::Result<()> {
        manifest.validate()?;
        let content = parser::to_toml(manifest).context("Failed to serialize manifest")?;
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create project directory: {}", parent.display())
            })?;
        }
        std::fs::write(&self.path, content)
            .with_context(|| format!("Failed to write manifest: {}", self.path.display()))?;
        Ok(())
    }

    /// Create a new manifest; refuses to overwrite unless `force` is set.
    pub fn init(&self, name: &str, version: Version, force: bool) -> anyhow::Result<ProjectManifest> {
        if self.exists() && !force {
            anyhow::bail!(
                "A project manifest already exists at {}; pass --force to overwrite it",
                self.path.display()
            );
        }
        let manifest = ProjectManifest::new(name, version);
        self.save(&manifest)?;
        Ok(manifest)
    }

    /// Load, apply `change`, save.
    pub fn modify<T>(&self, change: impl FnOnce(&mut ProjectManifest) -> anyhow::Result<T>) -> anyhow::Result<T> {
        let mut manifest = self.load()?;
        let value = change(&mut manifest)?;
        self.save(&manifest)?;
        Ok(value)
    }
}
