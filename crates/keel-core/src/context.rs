//! Application context for unified dependency injection.

use std::path::{Path, PathBuf};

use alloy_primitives::Address;
use anyhow::Context;
use url::Url;

use crate::artifacts::BuildDirArtifacts;
use crate::chain::RpcChainClient;
use crate::config::paths::default_global_dir;
use crate::config::{ConfigStore, NetworkConfig};
use crate::dependency::LocalPackageResolver;
use crate::dependency::resolver::BUILD_DIR;
use crate::manifest::ManifestStore;
use crate::snapshot::SnapshotStore;

/// Directory installed dependency packages live in, relative to the project root.
pub const PACKAGES_DIR: &str = "node_modules";

/// Network to operate on, with optional overrides of the user config.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkTarget {
    pub name: String,
    pub rpc_url: Option<Url>,
    pub from: Option<Address>,
}

impl NetworkTarget {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            rpc_url: None,
            from: None,
        }
    }

    pub fn with_rpc_url(mut self, rpc_url: Url) -> Self {
        self.rpc_url = Some(rpc_url);
        self
    }

    pub fn with_from(mut self, from: Address) -> Self {
        self.from = Some(from);
        self
    }
}

/// Unified application context for dependency injection.
///
/// Provides access to the stores and services commands need. Frontends
/// create this once and pass it to commands.
#[derive(Debug, Clone)]
pub struct AppContext {
    project_root: PathBuf,
    build_dir: PathBuf,
    system_artifacts_dir: Option<PathBuf>,
    packages_dir: PathBuf,
    global_config_dir: PathBuf,
}

impl AppContext {
    /// Context for the project at `project_root` with default locations.
    pub fn new(project_root: PathBuf) -> anyhow::Result<Self> {
        Ok(Self::with_global_config_dir(project_root, default_global_dir()?))
    }

    /// Create context with custom global config directory (for testing).
    pub fn with_global_config_dir(project_root: PathBuf, global_config_dir: PathBuf) -> Self {
        Self {
            build_dir: project_root.join(BUILD_DIR),
            packages_dir: project_root.join(PACKAGES_DIR),
            system_artifacts_dir: None,
            project_root,
            global_config_dir,
        }
    }

    pub fn with_build_dir(mut self, build_dir: PathBuf) -> Self {
        self.build_dir = build_dir;
        self
    }

    /// Where `ProxyAdmin`, `App` and the other system contracts are found when
    /// the project's own build does not include them.
    pub fn with_system_artifacts_dir(mut self, dir: PathBuf) -> Self {
        self.system_artifacts_dir = Some(dir);
        self
    }

    pub fn project_root(&self) -> &Path {
        &self.project_root
    }

    pub fn build_dir(&self) -> &Path {
        &self.build_dir
    }

    pub fn global_config_dir(&self) -> &Path {
        &self.global_config_dir
    }

    pub fn manifest_store(&self) -> ManifestStore {
        ManifestStore::for_project(&self.project_root)
    }

    pub fn snapshot_store(&self, network: &str) -> SnapshotStore {
        SnapshotStore::new(self.project_root.clone(), network)
    }

    pub fn config_store(&self) -> ConfigStore {
        ConfigStore::from_dir(&self.global_config_dir)
    }

    /// Project artifacts, falling back to the system contracts.
    pub fn artifacts(&self) -> BuildDirArtifacts {
        let artifacts = BuildDirArtifacts::new(self.build_dir.clone());
        match &self.system_artifacts_dir {
            Some(dir) => artifacts.with_fallback(dir.clone()),
            None => artifacts,
        }
    }

    pub fn package_resolver(&self) -> LocalPackageResolver {
        LocalPackageResolver::new(self.packages_dir.clone())
    }

    /// Connection settings for `target`, from the user config with the
    /// target's overrides applied.
    pub fn network_config(&self, target: &NetworkTarget) -> anyhow::Result<NetworkConfig> {
        let config = self.config_store().load()?;
        let mut network = match (config.network(&target.name).cloned(), &target.rpc_url) {
            (Some(mut network), Some(url)) => {
                network.rpc_url = url.clone();
                network
            }
            (None, Some(url)) => NetworkConfig::new(url.clone()),
            (Some(network), None) => network,
            (None, None) => anyhow::bail!(
                "Network '{}' is not configured. Add [networks.{}] to {} or pass --rpc-url.",
                target.name,
                target.name,
                self.config_store().config_path().display()
            ),
        };
        if target.from.is_some() {
            network.from = target.from;
        }
        Ok(network)
    }

    /// Connect to `target` over JSON-RPC.
    pub async fn connect(&self, target: &NetworkTarget) -> anyhow::Result<RpcChainClient> {
        let network = self.network_config(target)?;
        RpcChainClient::connect(network.rpc_url.clone(), network.from, network.receipt_policy())
            .await
            .with_context(|| format!("Failed to connect to network '{}'", target.name))
    }
}
