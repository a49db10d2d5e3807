//! Resolving linked packages to their manifests and deployments.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use alloy_primitives::Address;
use semver::Version;

use crate::artifacts::BuildDirArtifacts;
use crate::config::MANIFEST_FILE;
use crate::error::{KeelError, Result};
use crate::manifest::{ManifestStore, ProjectManifest};
use crate::snapshot::{NetworkSnapshot, SnapshotStore};
use crate::version::satisfies_version;

/// Where a package's build output lives relative to its manifest.
pub const BUILD_DIR: &str = "build/contracts";

/// Locates an installed package's manifest.
pub trait PackageResolver {
    /// Path of `name`'s keel.toml, if the package is installed.
    fn locate(&self, name: &str) -> Option<PathBuf>;
}

/// Packages installed under a directory such as `node_modules`.
#[derive(Debug, Clone)]
pub struct LocalPackageResolver {
    packages_dir: PathBuf,
}

impl LocalPackageResolver {
    pub fn new(packages_dir: impl Into<PathBuf>) -> Self {
        Self {
            packages_dir: packages_dir.into(),
        }
    }
}

impl PackageResolver for LocalPackageResolver {
    fn locate(&self, name: &str) -> Option<PathBuf> {
        let path = self.packages_dir.join(name).join(MANIFEST_FILE);
        path.exists().then_some(path)
    }
}

/// Explicit name -> manifest path table.
#[derive(Debug, Clone, Default)]
pub struct FixturePackageResolver {
    manifests: BTreeMap<String, PathBuf>,
}

impl FixturePackageResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, manifest: impl Into<PathBuf>) -> Self {
        self.manifests.insert(name.into(), manifest.into());
        self
    }
}

impl PackageResolver for FixturePackageResolver {
    fn locate(&self, name: &str) -> Option<PathBuf> {
        self.manifests.get(name).cloned()
    }
}

/// A dependency whose installed version satisfies the required range.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedDependency {
    pub name: String,
    pub version: Version,
    /// Package address on the target network, when the dependency is deployed there
    pub package: Option<Address>,
}

/// Resolves dependencies for one network.
pub struct DependencyResolver<'a> {
    packages: &'a dyn PackageResolver,
    network: String,
}

impl<'a> DependencyResolver<'a> {
    pub fn new(packages: &'a dyn PackageResolver, network: impl Into<String>) -> Self {
        Self {
            packages,
            network: network.into(),
        }
    }

    pub fn network(&self) -> &str {
        &self.network
    }

    fn manifest_store(&self, name: &str) -> Result<ManifestStore> {
        self.packages
            .locate(name)
            .map(ManifestStore::from_path)
            .ok_or_else(|| KeelError::DependencyNotFound {
                name: name.to_string(),
            })
    }

    /// Directory holding `name`'s manifest.
    pub fn package_dir(&self, name: &str) -> Result<PathBuf> {
        Ok(self.manifest_store(name)?.dir().to_path_buf())
    }

    pub fn load_manifest(&self, name: &str) -> Result<ProjectManifest> {
        let store = self.manifest_store(name)?;
        if !store.exists() {
            return Err(KeelError::DependencyNotFound {
                name: name.to_string(),
            });
        }
        Ok(store.load()?)
    }

    /// Check the installed version of `name` against `range` and look up its
    /// deployment on this network.
    pub fn resolve(&self, name: &str, range: &str) -> Result<ResolvedDependency> {
        let manifest = self.load_manifest(name)?;
        let installed = manifest.version.to_string();
        if !satisfies_version(&installed, range) {
            return Err(KeelError::VersionMismatch {
                name: name.to_string(),
                required: range.to_string(),
                installed,
            });
        }

        let package = self
            .load_snapshot(name)?
            .and_then(|snapshot| snapshot.package_address());
        Ok(ResolvedDependency {
            name: name.to_string(),
            version: manifest.version,
            package,
        })
    }

    /// Snapshot `name` keeps for this network, if it was ever deployed here.
    pub fn load_snapshot(&self, name: &str) -> Result<Option<NetworkSnapshot>> {
        let store = self.snapshot_store(name)?;
        if !store.exists() {
            return Ok(None);
        }
        Ok(Some(store.load()?))
    }

    pub fn snapshot_store(&self, name: &str) -> Result<SnapshotStore> {
        Ok(SnapshotStore::new(self.package_dir(name)?, &self.network))
    }

    /// Deployed implementation of `alias` in dependency `name`.
    pub fn implementation(&self, name: &str, alias: &str) -> Result<Address> {
        let not_deployed = || KeelError::ContractNotDeployed {
            package: name.to_string(),
            alias: alias.to_string(),
        };
        let manifest = self.load_manifest(name)?;
        if !manifest.has_contract(alias) {
            return Err(KeelError::ContractNotFound {
                alias: format!("{name}/{alias}"),
            });
        }
        let snapshot = self.load_snapshot(name)?.ok_or_else(not_deployed)?;
        snapshot
            .contract(alias)
            .map(|record| record.address)
            .ok_or_else(not_deployed)
    }

    /// Compiled artifacts shipped with `name`.
    pub fn artifacts(&self, name: &str) -> Result<BuildDirArtifacts> {
        Ok(BuildDirArtifacts::new(artifacts_dir(&self.package_dir(name)?)))
    }
}

pub fn artifacts_dir(package_dir: &Path) -> PathBuf {
    package_dir.join(BUILD_DIR)
}
